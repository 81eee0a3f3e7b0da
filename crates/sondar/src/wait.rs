//! Page readiness gate.
//!
//! Playwright-style load states evaluated by polling the driver:
//!
//! - `domcontentloaded`: `document.readyState` is `interactive` or later
//! - `load`: `document.readyState` is `complete`
//! - `networkidle`: `load`, and the resource count has not changed for the
//!   quiet period
//!
//! Every wait has an upper bound. Exceeding it is [`SondarError::Timeout`],
//! or `Ok(None)` through [`ReadinessGate::wait_tolerant`] for checks that
//! should not fail a scenario.

use crate::driver::{PageDriver, ReadyState};
use crate::result::{SondarError, SondarResult};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Network idle threshold (500ms without new resources)
pub const NETWORK_IDLE_THRESHOLD_MS: u64 = 500;

// =============================================================================
// LOAD STATE
// =============================================================================

/// Page load states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// Wait for the `load` event to fire
    #[default]
    Load,
    /// Wait for `DOMContentLoaded` event
    DomContentLoaded,
    /// Wait for network to be idle
    NetworkIdle,
}

impl LoadState {
    /// Event name for this load state
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "domcontentloaded",
            Self::NetworkIdle => "networkidle",
        }
    }

    /// Default timeout for this load state
    #[must_use]
    pub const fn default_timeout_ms(&self) -> u64 {
        match self {
            Self::Load | Self::DomContentLoaded => DEFAULT_WAIT_TIMEOUT_MS,
            Self::NetworkIdle => 60_000,
        }
    }

    const fn required_ready_state(&self) -> ReadyState {
        match self {
            Self::DomContentLoaded => ReadyState::Interactive,
            Self::Load | Self::NetworkIdle => ReadyState::Complete,
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

// =============================================================================
// GATE
// =============================================================================

/// Blocks until a page reaches a load state, within a bound
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    state: LoadState,
    timeout_ms: u64,
    poll_interval_ms: u64,
    quiet_period_ms: u64,
}

impl ReadinessGate {
    /// Gate on a load state with its default timeout
    #[must_use]
    pub const fn new(state: LoadState) -> Self {
        Self {
            state,
            timeout_ms: state.default_timeout_ms(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            quiet_period_ms: NETWORK_IDLE_THRESHOLD_MS,
        }
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set the network quiet period in milliseconds
    #[must_use]
    pub const fn with_quiet_period(mut self, quiet_period_ms: u64) -> Self {
        self.quiet_period_ms = quiet_period_ms;
        self
    }

    /// Load state this gate waits for
    #[must_use]
    pub const fn state(&self) -> LoadState {
        self.state
    }

    /// Timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Wait for the load state, returning how long it took.
    ///
    /// # Errors
    ///
    /// [`SondarError::Timeout`] naming the load state when the bound is hit.
    pub async fn wait<D>(&self, driver: &D) -> SondarResult<Duration>
    where
        D: PageDriver + ?Sized,
    {
        let start = Instant::now();
        tokio::time::timeout(self.timeout(), self.poll(driver))
            .await
            .map_err(|_| SondarError::timeout(self.state.event_name(), self.timeout_ms))?;
        let elapsed = start.elapsed();
        debug!(state = %self.state, ?elapsed, "page ready");
        Ok(elapsed)
    }

    /// Like [`wait`](Self::wait) but a timeout is logged and yields `Ok(None)`
    ///
    /// # Errors
    ///
    /// Only non-timeout failures are returned.
    pub async fn wait_tolerant<D>(&self, driver: &D) -> SondarResult<Option<Duration>>
    where
        D: PageDriver + ?Sized,
    {
        match self.wait(driver).await {
            Ok(elapsed) => Ok(Some(elapsed)),
            Err(e) if e.is_timeout() => {
                warn!(state = %self.state, error = %e, "readiness not reached, continuing");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Navigate and wait, both within the gate's bound.
    ///
    /// Returns the time from navigation start until the page was ready.
    ///
    /// # Errors
    ///
    /// Navigation errors from the driver, or [`SondarError::Timeout`].
    pub async fn navigate<D>(&self, driver: &mut D, url: &str) -> SondarResult<Duration>
    where
        D: PageDriver + ?Sized,
    {
        let start = Instant::now();
        info!(url, state = %self.state, "navigating");
        tokio::time::timeout(self.timeout(), driver.navigate(url))
            .await
            .map_err(|_| SondarError::timeout(format!("navigation to {url}"), self.timeout_ms))??;
        let remaining = self.timeout().saturating_sub(start.elapsed());
        let gate = self
            .clone()
            .with_timeout(u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX));
        gate.wait(driver).await.map_err(|e| match e {
            SondarError::Timeout { operation, .. } => {
                SondarError::timeout(operation, self.timeout_ms)
            }
            other => other,
        })?;
        Ok(start.elapsed())
    }

    async fn poll<D>(&self, driver: &D)
    where
        D: PageDriver + ?Sized,
    {
        let required = self.state.required_ready_state();
        let quiet = Duration::from_millis(self.quiet_period_ms);
        let interval = Duration::from_millis(self.poll_interval_ms);
        let mut last_count: Option<u64> = None;
        let mut stable_since = Instant::now();

        loop {
            let ready = match driver.ready_state().await {
                Ok(state) => state >= required,
                Err(e) => {
                    debug!(error = %e, "readyState probe failed");
                    false
                }
            };

            if self.state == LoadState::NetworkIdle {
                match driver.resource_count().await {
                    Ok(count) if last_count != Some(count) => {
                        last_count = Some(count);
                        stable_since = Instant::now();
                    }
                    Ok(_) if ready && stable_since.elapsed() >= quiet => return,
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "resource count probe failed"),
                }
            } else if ready {
                return;
            }

            tokio::time::sleep(interval).await;
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(LoadState::default())
    }
}

/// Fixed pause after a gate, for animations and lazy content
pub async fn settle(duration: Duration) {
    if !duration.is_zero() {
        debug!(?duration, "settling");
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;

    mod load_state_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            assert_eq!(LoadState::default(), LoadState::Load);
            assert_eq!(LoadState::Load.default_timeout_ms(), 30_000);
            assert_eq!(LoadState::NetworkIdle.default_timeout_ms(), 60_000);
            assert_eq!(LoadState::NetworkIdle.to_string(), "networkidle");
        }

        #[test]
        fn test_required_states() {
            assert_eq!(
                LoadState::DomContentLoaded.required_ready_state(),
                ReadyState::Interactive
            );
            assert_eq!(
                LoadState::NetworkIdle.required_ready_state(),
                ReadyState::Complete
            );
        }
    }

    mod gate_tests {
        use super::*;

        fn slow_page() -> MockDriver {
            MockDriver::new()
                .with_ready_after(Duration::from_millis(300), Duration::from_millis(900))
                .with_network_busy_for(Duration::from_secs(2))
        }

        #[tokio::test(start_paused = true)]
        async fn test_dom_content_loaded_before_load() {
            let mut driver = slow_page();
            driver.navigate("https://example.com").await.unwrap();
            let dom = ReadinessGate::new(LoadState::DomContentLoaded)
                .wait(&driver)
                .await
                .unwrap();
            assert!(dom >= Duration::from_millis(300));
            assert!(dom < Duration::from_millis(900));
            let load = ReadinessGate::new(LoadState::Load).wait(&driver).await.unwrap();
            assert!(dom + load >= Duration::from_millis(900));
        }

        #[tokio::test(start_paused = true)]
        async fn test_network_idle_waits_for_quiet_period() {
            let mut driver = slow_page();
            driver.navigate("https://example.com").await.unwrap();
            let elapsed = ReadinessGate::new(LoadState::NetworkIdle)
                .wait(&driver)
                .await
                .unwrap();
            assert!(elapsed >= Duration::from_millis(2_500));
            assert!(elapsed < Duration::from_secs(4));
        }

        #[tokio::test(start_paused = true)]
        async fn test_timeout_names_state() {
            let mut driver = MockDriver::new().with_network_busy_for(Duration::from_secs(120));
            driver.navigate("https://example.com").await.unwrap();
            let err = ReadinessGate::new(LoadState::NetworkIdle)
                .with_timeout(1_000)
                .wait(&driver)
                .await
                .unwrap_err();
            assert!(err.is_timeout());
            assert!(err.to_string().contains("networkidle"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_tolerant_wait_yields_none() {
            let mut driver = MockDriver::new().with_network_busy_for(Duration::from_secs(120));
            driver.navigate("https://example.com").await.unwrap();
            let outcome = ReadinessGate::new(LoadState::NetworkIdle)
                .with_timeout(1_000)
                .wait_tolerant(&driver)
                .await
                .unwrap();
            assert!(outcome.is_none());
        }

        #[tokio::test(start_paused = true)]
        async fn test_navigate_measures_load_time() {
            let mut driver = slow_page();
            let elapsed = ReadinessGate::new(LoadState::Load)
                .navigate(&mut driver, "https://www.mercedes-benz.de")
                .await
                .unwrap();
            assert!(elapsed >= Duration::from_millis(900));
            assert!(driver.was_called("navigate:https://www.mercedes-benz.de"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_settle_sleeps() {
            let start = Instant::now();
            settle(Duration::from_secs(2)).await;
            assert!(start.elapsed() >= Duration::from_secs(2));
        }
    }
}
