//! Tracing subscriber setup

use crate::config::{CliConfig, LogFormat};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr so report output on
/// stdout stays machine-readable. `RUST_LOG` overrides the verbosity flags.
/// A second call is a no-op.
pub fn init(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.default_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = match config.log_format {
        LogFormat::Text => builder
            .with_ansi(config.color.should_color())
            .try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
