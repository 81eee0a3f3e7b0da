//! Suite runner: executes catalog scenarios and aggregates a report

use crate::catalog::{Harness, Scenario};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use sondar::{FailureMode, ScenarioRunner, SuiteReport};
use std::path::{Path, PathBuf};
use tracing::info;

/// Runs a list of scenarios one after another
#[derive(Debug)]
pub struct SuiteRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl SuiteRunner {
    /// Create a runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let reporter =
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        Self { config, reporter }
    }

    /// Progress reporter
    #[must_use]
    pub const fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    /// Execute every scenario with its own page and resource ledger
    ///
    /// With `fail_fast`, the suite stops at the first scenario that does not
    /// pass; its result is still recorded.
    pub async fn run(
        &mut self,
        suite: &str,
        harness: &Harness<'_>,
        scenarios: &[Scenario],
    ) -> SuiteReport {
        let mode = if self.config.fail_fast {
            FailureMode::AndonCord
        } else {
            FailureMode::CollectAll
        };
        let mut report = SuiteReport::new(suite).with_failure_mode(mode);
        let runner = ScenarioRunner::from_config(harness.config);

        self.reporter.header(&format!("{suite}: {} scenario(s)", scenarios.len()));
        self.reporter.start_progress(scenarios.len() as u64, "starting");
        for &scenario in scenarios {
            let name = scenario.name();
            self.reporter.set_message(&name);
            let result = runner
                .run(&name, |ctx| async move { scenario.execute(harness, &ctx).await })
                .await;
            self.reporter.scenario(&result);
            if let Err(stop) = report.record(result) {
                self.reporter.warning(&stop.to_string());
                break;
            }
        }
        self.reporter.finish();
        self.reporter.summary(&report);
        info!(suite, summary = %report.summary(), "suite finished");
        report
    }
}

/// Write `report.json` and `junit.xml` into `dir`
///
/// # Errors
///
/// I/O or serialization failures.
pub fn write_reports(report: &SuiteReport, dir: &Path) -> CliResult<(PathBuf, PathBuf)> {
    let json = report.write_json(dir)?;
    let junit = report.write_junit(dir)?;
    Ok((json, junit))
}

/// Map a finished report to the process result
///
/// # Errors
///
/// [`CliError::ScenariosFailed`] when any scenario did not pass.
pub fn verdict(report: &SuiteReport) -> CliResult<()> {
    let totals = report.totals();
    if report.all_passed() {
        Ok(())
    } else {
        Err(CliError::ScenariosFailed {
            failed: totals.total - totals.passed,
            total: totals.total,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::{select, Suite};
    use crate::config::{ColorChoice, Verbosity};
    use crate::pages::ScriptedLauncher;
    use serde_json::json;
    use sondar::{HarnessConfig, HttpMethod, MockDriver, MockTransport, UrlPattern};

    fn quiet() -> CliConfig {
        CliConfig::new()
            .with_verbosity(Verbosity::Quiet)
            .with_color(ColorChoice::Never)
    }

    fn vpic() -> MockTransport {
        MockTransport::new().with_fixture(
            HttpMethod::Get,
            UrlPattern::Contains("vpic.nhtsa.dot.gov".into()),
            200,
            json!({"Results": [{"Model_Name": "C-Class", "Make": "MERCEDES-BENZ"}]}),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_all_runs_every_scenario() {
        let config = HarnessConfig::default();
        let launcher = ScriptedLauncher::new(|_| MockDriver::new());
        let http = vpic();
        let harness = Harness::new(&config, &launcher, &http);
        let scenarios = select(&[Suite::Api], Some("nhtsa"));
        assert_eq!(scenarios.len(), 3);

        let mut runner = SuiteRunner::new(quiet());
        let report = runner.run("api", &harness, &scenarios).await;
        assert_eq!(report.totals().total, 3);
        assert!(report.all_passed());
        assert!(verdict(&report).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_stops_after_first_failure() {
        let config = HarnessConfig::default();
        let launcher = ScriptedLauncher::new(|_| MockDriver::new());
        let http = MockTransport::new();
        let harness = Harness::new(&config, &launcher, &http);
        let scenarios = select(&[Suite::Api], Some("nhtsa"));

        let mut runner = SuiteRunner::new(quiet().with_fail_fast(true));
        let report = runner.run("api", &harness, &scenarios).await;
        assert_eq!(report.totals().total, 1);
        assert!(matches!(
            verdict(&report),
            Err(CliError::ScenariosFailed { failed: 1, total: 1 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::default();
        let launcher = ScriptedLauncher::new(|_| MockDriver::new());
        let http = vpic();
        let harness = Harness::new(&config, &launcher, &http);
        let scenarios = select(&[Suite::Api], Some("nhtsa-models"));

        let mut runner = SuiteRunner::new(quiet());
        let report = runner.run("api", &harness, &scenarios).await;
        let (json, junit) = write_reports(&report, dir.path()).unwrap();
        assert!(std::fs::read_to_string(json).unwrap().contains("api/nhtsa-models"));
        assert!(std::fs::read_to_string(junit).unwrap().contains("<testsuite"));
    }
}
