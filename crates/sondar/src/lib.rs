//! Sondar: resilient verification of public web pages and HTTP APIs
//!
//! Sondar (from "sondear", to sound out) drives a browser page through
//! interstitials, waits for it to settle, asserts on its content, guards its
//! rendering against visual baselines, and runs multi-step API workflows
//! that clean up the remote resources they create.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       SONDAR Architecture                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner ── timeout, retries, leak flagging, SuiteReport  │
//! │        │                                                         │
//! │        ├── InteractionAttempt ─┐                                 │
//! │        ├── ReadinessGate ──────┤                                 │
//! │        ├── ContentPredicate ───┼──► PageDriver ──► Chromium/Mock │
//! │        ├── VisualDiffEngine ───┘        │                        │
//! │        │                          BaselineStore (__baselines__)  │
//! │        └── Sequencer ─────────────► HttpTransport ─► reqwest/Mock│
//! │                 │                                                │
//! │           ResourceLedger (reverse-order cleanup)                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sondar::prelude::*;
//!
//! let mut page = ChromiumDriver::launch(&config.browser, config.viewport).await?;
//! ReadinessGate::new(LoadState::Load).navigate(&mut page, &config.base_url).await?;
//! InteractionAttempt::cookie_consent().resolve(&mut page).await;
//! ContentPredicate::any_text(["Impressum", "Datenschutz"])
//!     .check_page(&page)
//!     .await?
//!     .into_result()?;
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod assertion;
#[cfg(feature = "browser")]
mod browser;
mod config;
mod driver;
mod locator;
mod network;
mod reporter;
mod resolver;
mod result;
mod scenario;
mod snapshot;
mod transport;

/// Visual regression: pixel diff, baseline store, diff engine
pub mod visual;

/// Readiness gate: load states, network idle, settle delays
pub mod wait;

/// API workflow sequencing with templated steps and resource cleanup
pub mod workflow;

pub use assertion::{ContentPredicate, Marker, Match, Verdict};
#[cfg(feature = "browser")]
pub use browser::ChromiumDriver;
pub use config::{ApiConfig, BrowserConfig, HarnessConfig, DEFAULT_BASE_URL, DEFAULT_TOKEN_ENV};
pub use driver::{
    ConsoleLevel, ConsoleMessage, MockDriver, MockElement, PageDriver, ReadyState, Region,
    Viewport,
};
pub use locator::{BoundingBox, Selector};
pub use network::{HttpMethod, UrlPattern};
pub use reporter::{FailureMode, ReportTotals, SuiteReport, JUNIT_FILE, REPORT_FILE};
pub use resolver::{InteractionAttempt, Resolution, CONSENT_BUDGET_MS};
pub use result::{ErrorKind, SondarError, SondarResult};
pub use scenario::{Artifact, Outcome, ScenarioContext, ScenarioResult, ScenarioRunner};
pub use snapshot::PageSnapshot;
#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, MockTransport, RequestBody};
pub use visual::{
    BaselineKey, BaselineStore, DiffResult, VisualCheck, VisualConfig, VisualDiffEngine,
    VisualOutcome,
};
pub use wait::{settle, LoadState, ReadinessGate};
pub use workflow::{
    Credential, JsonCheck, RemoteResource, ResourceLedger, Sequencer, StatusClass, Workflow,
    WorkflowContext, WorkflowReport, WorkflowState, WorkflowStep,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::assertion::*;
    #[cfg(feature = "browser")]
    pub use super::browser::*;
    pub use super::config::*;
    pub use super::driver::*;
    pub use super::locator::*;
    pub use super::network::*;
    pub use super::reporter::*;
    pub use super::resolver::{InteractionAttempt, Resolution};
    pub use super::result::*;
    pub use super::scenario::*;
    pub use super::snapshot::*;
    pub use super::transport::*;
    pub use super::visual::{
        BaselineKey, BaselineStore, DiffResult, VisualCheck, VisualConfig, VisualDiffEngine,
        VisualOutcome,
    };
    pub use super::wait::{settle, LoadState, ReadinessGate};
    pub use super::workflow::*;
}
