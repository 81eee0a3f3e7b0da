//! Sondar CLI Library
//!
//! Command-line front end for the Sondar verification engine, plus the
//! scenario catalog it runs: site checks, visual baselines and API
//! workflows against the Mercedes-Benz Germany site and public vehicle and
//! geo APIs.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

pub mod catalog;
mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;
pub mod pages;
mod runner;

pub use catalog::{Harness, Scenario, Suite};
pub use commands::{
    BaselinesArgs, Cli, ColorArg, Commands, ConfigArgs, ListArgs, LogFormatArg, RebaseArgs,
    RunArgs, SuiteArg,
};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use output::ProgressReporter;
pub use runner::{verdict, write_reports, SuiteRunner};

/// Build the CLI configuration from parsed arguments
#[must_use]
pub fn cli_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.clone().into())
        .with_log_format(cli.log_format.into())
}

/// Dispatch a parsed command line
///
/// # Errors
///
/// Whatever the selected command reports.
pub fn execute(cli: Cli) -> CliResult<()> {
    let config = cli_config(&cli);
    logging::init(&config);
    match cli.command {
        Commands::Run(args) => handlers::execute_run(&config, &args),
        Commands::Rebase(args) => handlers::execute_rebase(&config, &args),
        Commands::Baselines(args) => handlers::execute_baselines(&args),
        Commands::Config(args) => handlers::execute_config(&args),
        Commands::List(args) => handlers::execute_list(&args),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_config_from_flags() {
        let cli = Cli::parse_from(["sondar", "-q", "--color", "never", "list"]);
        let config = cli_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Quiet);
        assert_eq!(config.color, ColorChoice::Never);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(!config.fail_fast);
    }
}
