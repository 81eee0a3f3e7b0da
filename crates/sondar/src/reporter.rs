//! Suite reporting with Andon Cord support.
//!
//! A [`SuiteReport`] collects [`ScenarioResult`]s, renders a one-line
//! summary, and persists `report.json` plus a JUnit XML file for CI.
//!
//! ```text
//! ┌────────────────────┐     ┌──────────────────────┐
//! │  FailureMode::     │     │  FailureMode::       │
//! │  AndonCord         │     │  CollectAll          │
//! │                    │     │                      │
//! │  stop the suite on │     │  run every scenario  │
//! │  the first failure │     │  (default)           │
//! └────────────────────┘     └──────────────────────┘
//! ```

use crate::result::{SondarError, SondarResult};
use crate::scenario::{Outcome, ScenarioResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// JSON report file name
pub const REPORT_FILE: &str = "report.json";

/// JUnit report file name
pub const JUNIT_FILE: &str = "junit.xml";

/// How the suite reacts to a non-passing scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Stop on first failure
    AndonCord,
    /// Run everything and report at the end
    #[default]
    CollectAll,
}

/// Outcome counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReportTotals {
    /// Scenarios recorded
    pub total: usize,
    /// Passing scenarios
    pub passed: usize,
    /// Failing scenarios
    pub failed: usize,
    /// Timed out scenarios
    pub timed_out: usize,
    /// Leak artifacts across all scenarios
    pub leaks: usize,
}

#[derive(Serialize)]
struct ReportFile<'a> {
    suite: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    totals: ReportTotals,
    results: &'a [ScenarioResult],
}

/// Aggregated results of a suite run
#[derive(Debug, Clone)]
pub struct SuiteReport {
    suite: String,
    started_at: DateTime<Utc>,
    results: Vec<ScenarioResult>,
    failure_mode: FailureMode,
}

impl SuiteReport {
    /// Create a report in collect-all mode
    #[must_use]
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            started_at: Utc::now(),
            results: Vec::new(),
            failure_mode: FailureMode::CollectAll,
        }
    }

    /// Set the failure mode
    #[must_use]
    pub const fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Suite name
    #[must_use]
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// Record a scenario result
    ///
    /// # Errors
    ///
    /// In [`FailureMode::AndonCord`], returns an error for a non-passing
    /// result after recording it.
    pub fn record(&mut self, result: ScenarioResult) -> SondarResult<()> {
        let stop = (self.failure_mode == FailureMode::AndonCord && !result.outcome.is_pass())
            .then(|| {
                format!(
                    "ANDON CORD PULLED: scenario '{}' {}: {}",
                    result.name,
                    result.outcome,
                    result.details.as_deref().unwrap_or("no details")
                )
            });
        self.results.push(result);
        match stop {
            Some(message) => Err(SondarError::AssertionFailed { message }),
            None => Ok(()),
        }
    }

    /// Recorded results
    #[must_use]
    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }

    /// Non-passing results
    #[must_use]
    pub fn failures(&self) -> Vec<&ScenarioResult> {
        self.results.iter().filter(|r| !r.outcome.is_pass()).collect()
    }

    /// Outcome counts
    #[must_use]
    pub fn totals(&self) -> ReportTotals {
        let count = |o: Outcome| self.results.iter().filter(|r| r.outcome == o).count();
        ReportTotals {
            total: self.results.len(),
            passed: count(Outcome::Pass),
            failed: count(Outcome::Fail),
            timed_out: count(Outcome::Timeout),
            leaks: self.results.iter().map(|r| r.leaks().len()).sum(),
        }
    }

    /// Pass rate (0.0 to 1.0)
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        let totals = self.totals();
        if totals.total == 0 {
            return 1.0;
        }
        totals.passed as f64 / totals.total as f64
    }

    /// True when every scenario passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_pass())
    }

    /// Sum of scenario durations
    #[must_use]
    pub fn total_duration_ms(&self) -> u64 {
        self.results.iter().map(|r| r.duration_ms).sum()
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        let totals = self.totals();
        let mut line = format!(
            "{}: {}/{} passed ({:.1}%)",
            self.suite,
            totals.passed,
            totals.total,
            self.pass_rate() * 100.0
        );
        if totals.failed > 0 {
            line.push_str(&format!(", {} failed", totals.failed));
        }
        if totals.timed_out > 0 {
            line.push_str(&format!(", {} timed out", totals.timed_out));
        }
        if totals.leaks > 0 {
            line.push_str(&format!(", {} leaked resource(s)", totals.leaks));
        }
        line
    }

    /// Render the JSON report
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn render_json(&self) -> SondarResult<String> {
        let file = ReportFile {
            suite: &self.suite,
            started_at: self.started_at,
            finished_at: Utc::now(),
            totals: self.totals(),
            results: &self.results,
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Write `report.json` into `dir`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub fn write_json(&self, dir: &Path) -> SondarResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE);
        std::fs::write(&path, self.render_json()?)?;
        info!(path = %path.display(), "report written");
        Ok(path)
    }

    /// Render JUnit XML content
    #[must_use]
    pub fn render_junit(&self) -> String {
        let totals = self.totals();
        let mut xml = String::new();

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<testsuite name="{}" tests="{}" failures="{}" errors="{}" time="{:.3}">"#,
            escape_xml(&self.suite),
            totals.total,
            totals.failed,
            totals.timed_out,
            self.total_duration_ms() as f64 / 1000.0
        ));
        xml.push('\n');

        for result in &self.results {
            xml.push_str(&format!(
                r#"  <testcase name="{}" time="{:.3}">"#,
                escape_xml(&result.name),
                result.duration_ms as f64 / 1000.0
            ));
            xml.push('\n');

            let details = result.details.as_deref().unwrap_or_default();
            match result.outcome {
                Outcome::Pass => {}
                Outcome::Fail => xml.push_str(&format!(
                    "    <failure message=\"{}\">{}</failure>\n",
                    escape_xml(details),
                    escape_xml(details)
                )),
                Outcome::Timeout => xml.push_str(&format!(
                    "    <error type=\"timeout\" message=\"{}\">{}</error>\n",
                    escape_xml(details),
                    escape_xml(details)
                )),
            }

            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }

    /// Write `junit.xml` into `dir`
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub fn write_junit(&self, dir: &Path) -> SondarResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(JUNIT_FILE);
        std::fs::write(&path, self.render_junit())?;
        Ok(path)
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
