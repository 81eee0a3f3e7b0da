//! Transient-element resolution.
//!
//! Cookie banners, consent overlays and similar elements may or may not
//! appear, and may appear late. An [`InteractionAttempt`] polls a set of
//! candidate selectors for a bounded time and clicks the first one that is
//! actionable. Not finding anything is a normal outcome, reported as
//! [`Resolution::Absent`], never as an error.

use crate::driver::PageDriver;
use crate::locator::Selector;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default wait budget for page-level overlays (3 seconds)
pub const DEFAULT_BUDGET_MS: u64 = 3_000;

/// Wait budget for the cookie-consent overlay (5 seconds)
pub const CONSENT_BUDGET_MS: u64 = 5_000;

/// Interval between polls of the candidate set
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Outcome of an interaction attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum Resolution {
    /// A candidate became actionable and was clicked
    Acted {
        /// The candidate that was acted on
        selector: Selector,
        /// Time from start of the attempt to the click
        elapsed: Duration,
    },
    /// No candidate became actionable within the budget
    Absent {
        /// Time spent waiting
        waited: Duration,
    },
}

impl Resolution {
    /// Whether an action was performed
    #[must_use]
    pub const fn is_acted(&self) -> bool {
        matches!(self, Self::Acted { .. })
    }

    /// The selector acted on, if any
    #[must_use]
    pub const fn selector(&self) -> Option<&Selector> {
        match self {
            Self::Acted { selector, .. } => Some(selector),
            Self::Absent { .. } => None,
        }
    }
}

/// Request to locate-and-click one of several candidates within a budget
#[derive(Debug, Clone)]
pub struct InteractionAttempt {
    label: String,
    candidates: Vec<Selector>,
    budget: Duration,
    poll_interval: Duration,
}

impl InteractionAttempt {
    /// Create an attempt over candidates with the default 3 second budget
    #[must_use]
    pub fn new<I, S>(label: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Selector>,
    {
        Self {
            label: label.into(),
            candidates: candidates.into_iter().map(Into::into).collect(),
            budget: Duration::from_millis(DEFAULT_BUDGET_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Consent overlay of the site under test (German and English labels)
    #[must_use]
    pub fn cookie_consent() -> Self {
        Self::new(
            "cookie consent",
            [
                "button:has-text(\"Alle akzeptieren\")",
                "button:has-text(\"Accept All\")",
                "[data-test=\"handle-accept-all-button\"]",
            ],
        )
        .with_budget(Duration::from_millis(CONSENT_BUDGET_MS))
    }

    /// Set the wait budget
    #[must_use]
    pub const fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Candidate selectors in priority order
    #[must_use]
    pub fn candidates(&self) -> &[Selector] {
        &self.candidates
    }

    /// Wait budget
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    /// Poll until a candidate is actionable and click it, or give up.
    ///
    /// The whole attempt, including any in-flight driver call, is cut off at
    /// the budget. Driver errors count as "not actionable yet".
    pub async fn resolve<D>(&self, driver: &mut D) -> Resolution
    where
        D: PageDriver + ?Sized,
    {
        let start = Instant::now();
        if self.candidates.is_empty() {
            return Resolution::Absent {
                waited: Duration::ZERO,
            };
        }

        match tokio::time::timeout(self.budget, self.poll(driver)).await {
            Ok(selector) => {
                let elapsed = start.elapsed();
                info!(attempt = %self.label, %selector, ?elapsed, "transient element dismissed");
                Resolution::Acted { selector, elapsed }
            }
            Err(_) => {
                let waited = start.elapsed();
                warn!(attempt = %self.label, ?waited, "transient element not present, continuing");
                Resolution::Absent { waited }
            }
        }
    }

    async fn poll<D>(&self, driver: &mut D) -> Selector
    where
        D: PageDriver + ?Sized,
    {
        loop {
            for candidate in &self.candidates {
                match driver.is_visible(candidate).await {
                    Ok(true) => match driver.click(candidate).await {
                        Ok(()) => return candidate.clone(),
                        Err(e) => warn!(%candidate, error = %e, "click on visible candidate failed"),
                    },
                    Ok(false) => {}
                    Err(e) => debug!(%candidate, error = %e, "visibility probe failed"),
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
