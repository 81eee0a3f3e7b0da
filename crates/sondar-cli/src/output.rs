//! Console output and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use sondar::{Artifact, Outcome, ScenarioResult, SuiteReport};

/// Progress reporter for scenario execution
///
/// Writes to stderr; stdout is reserved for command output such as
/// `config` YAML and `list --json`.
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar for a number of scenarios
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Show which scenario is running
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, text: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.println(text),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    fn prefixed(&self, symbol: &str, plain: &str, color: Style, message: &str) -> String {
        let prefix = if self.use_color {
            color.bold().apply_to(symbol).to_string()
        } else {
            plain.to_string()
        };
        format!("{prefix} {message}")
    }

    /// Print one scenario result and advance the bar
    pub fn scenario(&self, result: &ScenarioResult) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
        }
        let retried = if result.attempts > 1 {
            format!(" after {} attempts", result.attempts)
        } else {
            String::new()
        };
        let head = format!("{} ({} ms){retried}", result.name, result.duration_ms);
        match result.outcome {
            Outcome::Pass => {
                if !self.quiet {
                    self.line(&self.prefixed("✓", "PASS", Style::new().green(), &head));
                }
            }
            Outcome::Fail => self.line(&self.prefixed("✗", "FAIL", Style::new().red(), &head)),
            Outcome::Timeout => {
                self.line(&self.prefixed("⏱", "TIME", Style::new().yellow(), &head));
            }
        }
        if let Some(details) = &result.details {
            self.line(&format!("    {details}"));
        }
        for artifact in &result.artifacts {
            match artifact {
                Artifact::DiffImage { path } => self.line(&format!("    diff: {}", path.display())),
                Artifact::Leak { resource, reason } => {
                    self.line(&format!("    leaked {resource}: {reason}"));
                }
                _ => {}
            }
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line(&self.prefixed("⚠", "WARN", Style::new().yellow(), message));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line(&self.prefixed("ℹ", "INFO", Style::new().blue(), message));
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.line("");
        self.line(&styled);
    }

    /// Print the suite summary
    pub fn summary(&self, report: &SuiteReport) {
        let all_passed = report.all_passed();
        if self.quiet && all_passed {
            return;
        }
        let status = match (self.use_color, all_passed) {
            (true, true) => Style::new().green().bold().apply_to("PASSED").to_string(),
            (true, false) => Style::new().red().bold().apply_to("FAILED").to_string(),
            (false, true) => "PASSED".to_string(),
            (false, false) => "FAILED".to_string(),
        };
        self.line("");
        self.line(&format!(
            "{status} {} in {:.2}s",
            report.summary(),
            report.total_duration_ms() as f64 / 1000.0
        ));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn failed() -> ScenarioResult {
        ScenarioResult {
            name: "visual/header".into(),
            outcome: Outcome::Fail,
            details: Some("3.2% of pixels differ".into()),
            artifacts: vec![Artifact::DiffImage {
                path: PathBuf::from("__diffs__/visual-header/header-diff.png"),
            }],
            duration_ms: 4200,
            attempts: 2,
        }
    }

    #[test]
    fn test_reporter_flags() {
        let reporter = ProgressReporter::new(false, true);
        assert!(reporter.quiet);
        assert!(!reporter.use_color);
        assert!(ProgressReporter::default().use_color);
    }

    #[test]
    fn test_plain_prefix() {
        let reporter = ProgressReporter::new(false, false);
        assert_eq!(
            reporter.prefixed("✓", "PASS", Style::new().green(), "site/https-used"),
            "PASS site/https-used"
        );
    }

    #[test]
    fn test_scenario_and_summary_do_not_panic() {
        let mut reporter = ProgressReporter::new(false, false);
        reporter.start_progress(1, "running");
        reporter.scenario(&failed());
        reporter.finish();

        let mut report = SuiteReport::new("visual");
        report.record(failed()).unwrap();
        reporter.summary(&report);
        reporter.header("visual");
        reporter.warning("baseline created");
        reporter.info("1 scenario");
    }
}
