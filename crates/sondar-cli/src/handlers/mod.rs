//! Command handlers - one module per subcommand
//!
//! Each handler loads the effective configuration, does its work and
//! prints to stdout. Rendering is split into pure functions so it can be
//! tested without a terminal.

pub mod baselines;
pub mod config;
pub mod list;
pub mod rebase;
pub mod run;

pub use baselines::{execute_baselines, render_baselines};
pub use config::{execute_config, render_config};
pub use list::{execute_list, render_list};
pub use rebase::{execute_rebase, rebase_all};
pub use run::execute_run;

use crate::error::{CliError, CliResult};
use sondar::{HarnessConfig, HttpTransport};
use std::path::Path;
use tracing::debug;

/// Configuration file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "sondar.yaml";

/// Load the configuration from `path`, else `./sondar.yaml`, else defaults
///
/// # Errors
///
/// Unreadable or invalid configuration.
pub fn load_config(path: Option<&Path>) -> CliResult<HarnessConfig> {
    let config = match path {
        Some(path) => HarnessConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            HarnessConfig::load(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => HarnessConfig::default(),
    };
    debug!(base_url = %config.base_url, "configuration loaded");
    Ok(config)
}

/// Transport for API scenarios
///
/// # Errors
///
/// [`CliError::Config`] when API scenarios are requested from a build
/// without the `http` feature, or when the HTTP client cannot be built.
pub fn transport(config: &HarnessConfig, needs_api: bool) -> CliResult<Box<dyn HttpTransport>> {
    #[cfg(feature = "http")]
    {
        let _ = needs_api;
        Ok(Box::new(sondar::ReqwestTransport::new(
            config.api.request_timeout(),
            &config.api.user_agent,
        )?))
    }
    #[cfg(not(feature = "http"))]
    {
        let _ = config;
        if needs_api {
            Err(CliError::config(
                "built without the `http` feature; API scenarios cannot run",
            ))
        } else {
            Ok(Box::new(sondar::MockTransport::new()))
        }
    }
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(CliError::from)
}
