//! Scenario runner: one bounded task, one terminal outcome.
//!
//! Every scenario runs under an overall timeout with its own
//! [`ScenarioContext`]. Errors are classified at this boundary: a
//! [`SondarError::Timeout`] or the runner's own timeout is
//! [`Outcome::Timeout`], any other error is [`Outcome::Fail`]. Resources
//! still in the scenario's ledger when an attempt ends (typically because
//! the attempt was aborted mid-workflow) are logged and attached as
//! [`Artifact::Leak`].

use crate::config::HarnessConfig;
use crate::result::SondarResult;
use crate::workflow::ResourceLedger;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Terminal outcome of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// All expectations met
    Pass,
    /// An expectation was not met, or the environment failed
    Fail,
    /// A time bound was exceeded
    Timeout,
}

impl Outcome {
    /// Check if outcome is passing
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Timeout => "timeout",
        })
    }
}

/// Evidence attached to a scenario result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// Side-by-side visual diff
    DiffImage {
        /// Image path
        path: PathBuf,
    },
    /// Raw capture
    Capture {
        /// Image path
        path: PathBuf,
    },
    /// Console errors observed on the page
    ConsoleErrors {
        /// Messages
        messages: Vec<String>,
    },
    /// Remote resource left behind
    Leak {
        /// Resource description
        resource: String,
        /// Why it was not cleaned up
        reason: String,
    },
    /// Measured value
    Metric {
        /// Metric name
        name: String,
        /// Value
        value: f64,
        /// Unit
        unit: String,
    },
    /// Free-form note
    Note {
        /// Text
        text: String,
    },
}

/// Per-attempt state handed to a scenario body
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    name: String,
    attempt: u32,
    ledger: ResourceLedger,
    artifacts: Arc<Mutex<Vec<Artifact>>>,
}

impl ScenarioContext {
    /// Fresh context for an attempt
    #[must_use]
    pub fn new(name: impl Into<String>, attempt: u32) -> Self {
        Self {
            name: name.into(),
            attempt,
            ledger: ResourceLedger::new(),
            artifacts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Scenario name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based attempt number
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Ledger for resources created by this attempt
    #[must_use]
    pub fn ledger(&self) -> ResourceLedger {
        self.ledger.clone()
    }

    /// Attach an artifact
    pub fn attach(&self, artifact: Artifact) {
        if let Ok(mut artifacts) = self.artifacts.lock() {
            artifacts.push(artifact);
        }
    }

    /// Attach a note
    pub fn note(&self, text: impl Into<String>) {
        self.attach(Artifact::Note { text: text.into() });
    }

    /// Attach a metric
    pub fn metric(&self, name: impl Into<String>, value: f64, unit: impl Into<String>) {
        self.attach(Artifact::Metric {
            name: name.into(),
            value,
            unit: unit.into(),
        });
    }

    /// Artifacts attached so far
    #[must_use]
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn take_artifacts(&self) -> Vec<Artifact> {
        self.artifacts
            .lock()
            .map(|mut a| std::mem::take(&mut *a))
            .unwrap_or_default()
    }
}

/// Result of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario name
    pub name: String,
    /// Terminal outcome
    pub outcome: Outcome,
    /// Failure details
    pub details: Option<String>,
    /// Evidence
    pub artifacts: Vec<Artifact>,
    /// Duration of the final attempt
    pub duration_ms: u64,
    /// Attempts made
    pub attempts: u32,
}

impl ScenarioResult {
    /// Leak artifacts
    #[must_use]
    pub fn leaks(&self) -> Vec<&Artifact> {
        self.artifacts
            .iter()
            .filter(|a| matches!(a, Artifact::Leak { .. }))
            .collect()
    }
}

/// Runs scenario bodies under a timeout with retries
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    timeout: Duration,
    retries: u32,
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

impl ScenarioRunner {
    /// Create a runner
    #[must_use]
    pub const fn new(timeout: Duration, retries: u32) -> Self {
        Self { timeout, retries }
    }

    /// Runner using the configured scenario timeout and retries
    #[must_use]
    pub const fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            Duration::from_millis(config.scenario_timeout_ms),
            config.retries,
        )
    }

    /// Scenario timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a scenario body until it passes or retries are exhausted
    pub async fn run<F, Fut>(&self, name: &str, body: F) -> ScenarioResult
    where
        F: Fn(ScenarioContext) -> Fut,
        Fut: Future<Output = SondarResult<()>>,
    {
        let mut leaks = Vec::new();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let ctx = ScenarioContext::new(name, attempt);
            let start = Instant::now();
            info!(scenario = name, attempt, "scenario starting");

            let (outcome, details) = match tokio::time::timeout(self.timeout, body(ctx.clone())).await {
                Ok(Ok(())) => (Outcome::Pass, None),
                Ok(Err(e)) if e.is_timeout() => (Outcome::Timeout, Some(e.to_string())),
                Ok(Err(e)) => (Outcome::Fail, Some(e.to_string())),
                Err(_) => (
                    Outcome::Timeout,
                    Some(format!(
                        "scenario exceeded {}ms and was aborted",
                        self.timeout.as_millis()
                    )),
                ),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            for resource in ctx.ledger.outstanding() {
                let reason = match outcome {
                    Outcome::Timeout => "scenario aborted before cleanup",
                    _ => "cleanup not verified",
                };
                error!(scenario = name, resource = %resource, reason, "resource leak");
                leaks.push(Artifact::Leak {
                    resource: resource.to_string(),
                    reason: reason.to_string(),
                });
            }

            if outcome.is_pass() || attempt > self.retries {
                let mut artifacts = ctx.take_artifacts();
                for leak in leaks {
                    if !artifacts.contains(&leak) {
                        artifacts.push(leak);
                    }
                }
                info!(scenario = name, %outcome, attempt, duration_ms, "scenario finished");
                return ScenarioResult {
                    name: name.to_string(),
                    outcome,
                    details,
                    artifacts,
                    duration_ms,
                    attempts: attempt,
                };
            }
            warn!(
                scenario = name,
                %outcome,
                attempt,
                details = details.as_deref().unwrap_or(""),
                "scenario did not pass, retrying"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::result::SondarError;
    use crate::workflow::{RemoteResource, WorkflowStep};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn runner(retries: u32) -> ScenarioRunner {
        ScenarioRunner::new(Duration::from_secs(60), retries)
    }

    mod outcome_tests {
        use super::*;

        #[tokio::test]
        async fn test_ok_is_pass() {
            let result = runner(0)
                .run("ok", |ctx| async move {
                    ctx.note("checked");
                    Ok(())
                })
                .await;
            assert_eq!(result.outcome, Outcome::Pass);
            assert_eq!(result.attempts, 1);
            assert_eq!(
                result.artifacts,
                vec![Artifact::Note {
                    text: "checked".into()
                }]
            );
        }

        #[tokio::test]
        async fn test_assertion_is_fail() {
            let result = runner(0)
                .run("bad", |_| async { Err(SondarError::assertion("no footer")) })
                .await;
            assert_eq!(result.outcome, Outcome::Fail);
            assert!(result.details.unwrap().contains("no footer"));
        }

        #[tokio::test]
        async fn test_timeout_error_is_timeout() {
            let result = runner(0)
                .run("slow", |_| async { Err(SondarError::timeout("networkidle", 60_000)) })
                .await;
            assert_eq!(result.outcome, Outcome::Timeout);
        }

        #[tokio::test(start_paused = true)]
        async fn test_abort_flags_ledger_leaks() {
            let result = ScenarioRunner::new(Duration::from_secs(5), 0)
                .run("aborted", |ctx| async move {
                    ctx.ledger().record(RemoteResource {
                        kind: "user".into(),
                        id: json!(42),
                        created_by: 0,
                        cleanup: WorkflowStep::delete("delete", "https://x/users/{id}"),
                    });
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                })
                .await;
            assert_eq!(result.outcome, Outcome::Timeout);
            assert_eq!(
                result.leaks(),
                vec![&Artifact::Leak {
                    resource: "user 42".into(),
                    reason: "scenario aborted before cleanup".into()
                }]
            );
        }
    }

    mod retry_tests {
        use super::*;

        #[tokio::test]
        async fn test_pass_on_retry_reports_attempts() {
            let calls = AtomicU32::new(0);
            let result = runner(2)
                .run("flaky", |ctx| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if ctx.attempt() < 2 {
                            Err(SondarError::assertion("flaky"))
                        } else {
                            Ok(())
                        }
                    }
                })
                .await;
            assert_eq!(result.outcome, Outcome::Pass);
            assert_eq!(result.attempts, 2);
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_retries_exhausted() {
            let result = runner(1)
                .run("broken", |_| async { Err(SondarError::assertion("always")) })
                .await;
            assert_eq!(result.outcome, Outcome::Fail);
            assert_eq!(result.attempts, 2);
        }
    }

    #[test]
    fn test_from_config() {
        let runner = ScenarioRunner::from_config(&HarnessConfig::default());
        assert_eq!(runner.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_outcome_serde() {
        assert_eq!(serde_json::to_string(&Outcome::Timeout).unwrap(), "\"timeout\"");
    }
}
