//! Run command handler

use super::{load_config, runtime, transport};
use crate::catalog::{select, Harness, Scenario, Suite};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::pages::ChromiumLauncher;
use crate::runner::{verdict, write_reports, SuiteRunner};
use crate::RunArgs;
use sondar::HarnessConfig;
use tracing::info;

/// Execute the run command
///
/// # Errors
///
/// Invalid configuration, an empty selection, report I/O, or
/// [`CliError::ScenariosFailed`] when any scenario did not pass.
pub fn execute_run(cli: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let config = effective_config(args)?;
    let scenarios = selection(args)?;
    let needs_api = scenarios.iter().any(|s| s.suite() == Suite::Api);

    let http = transport(&config, needs_api)?;
    let pages = ChromiumLauncher::new(config.browser.clone());
    let harness = Harness::new(&config, &pages, http.as_ref());
    let mut runner = SuiteRunner::new(cli.clone().with_fail_fast(cli.fail_fast || args.fail_fast));

    let report = runtime()?.block_on(runner.run(args.suite.label(), &harness, &scenarios));
    let (json, junit) = write_reports(&report, &config.output_dir)?;
    info!(json = %json.display(), junit = %junit.display(), "reports written");
    runner.reporter().info(&format!("report: {}", json.display()));
    verdict(&report)
}

/// Configuration with command-line overrides applied
///
/// # Errors
///
/// Unreadable or invalid configuration.
pub fn effective_config(args: &RunArgs) -> CliResult<HarnessConfig> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(retries) = args.retries {
        config = config.with_retries(retries);
    }
    if let Some(output) = &args.output {
        config = config.with_output_dir(output.clone());
    }
    Ok(config)
}

/// Scenarios selected by suite and filter
///
/// # Errors
///
/// [`CliError::InvalidArgument`] when nothing matches.
pub fn selection(args: &RunArgs) -> CliResult<Vec<Scenario>> {
    let scenarios = select(&args.suite.suites(), args.filter.as_deref());
    if scenarios.is_empty() {
        return Err(CliError::invalid_argument(format!(
            "no {} scenario matches filter {:?}",
            args.suite.label(),
            args.filter.as_deref().unwrap_or("")
        )));
    }
    Ok(scenarios)
}
