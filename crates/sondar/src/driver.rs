//! PageDriver - the browser capability surface the engine consumes.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PageDriver (abstract trait)                                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────┐   ┌────────────────────────────┐ │
//! │  │  ChromiumDriver        │   │  MockDriver                │ │
//! │  │  (`browser` feature)   │   │  (scripted page, tests)    │ │
//! │  │  CDP via chromiumoxide │   │  timing relative to goto   │ │
//! │  └────────────────────────┘   └────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolver, readiness gate, snapshot capture and visual capture are all
//! written against this trait, so every engine path runs against
//! [`MockDriver`] in unit tests.

use crate::locator::Selector;
use crate::result::{SondarError, SondarResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Viewport {
    /// Desktop 1080p
    pub const DESKTOP_1080P: Self = Self::new(1920, 1080);

    /// Small phone (iPhone SE portrait)
    pub const MOBILE: Self = Self::new(375, 667);

    /// Create a viewport
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::DESKTOP_1080P
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Region of the page to rasterize
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "selector", rename_all = "snake_case")]
pub enum Region {
    /// Current viewport
    Viewport,
    /// Whole scrollable page
    FullPage,
    /// First element matching a selector
    Element(Selector),
}

impl Region {
    /// Stable label used in logs and mock lookups
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Viewport => "viewport".to_string(),
            Self::FullPage => "full-page".to_string(),
            Self::Element(sel) => format!("element:{sel}"),
        }
    }
}

/// `document.readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    /// Document still parsing
    Loading,
    /// Parsed; sub-resources may still load (`DOMContentLoaded` fired)
    Interactive,
    /// Fully loaded (`load` fired)
    Complete,
}

impl ReadyState {
    /// Parse the DOM string value; unknown values count as loading
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "complete" => Self::Complete,
            "interactive" => Self::Interactive,
            _ => Self::Loading,
        }
    }
}

/// Severity of a captured console message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    /// console.log / console.info / console.debug
    Log,
    /// console.warn
    Warn,
    /// console.error, uncaught errors, unhandled rejections
    Error,
}

impl ConsoleLevel {
    /// Map a console method name to a level
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            _ => Self::Log,
        }
    }
}

/// A console message captured from the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    /// Severity
    pub level: ConsoleLevel,
    /// Message text
    pub text: String,
}

impl ConsoleMessage {
    /// Create a console message
    #[must_use]
    pub fn new(level: ConsoleLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    /// Create an error-level message
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(ConsoleLevel::Error, text)
    }
}

/// Abstract browser page driver
///
/// Every method is a suspension point; callers bound them with timeouts.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to URL
    async fn navigate(&mut self, url: &str) -> SondarResult<()>;

    /// Number of elements matching a selector
    async fn count(&self, selector: &Selector) -> SondarResult<usize>;

    /// Whether the first match is present and rendered
    async fn is_visible(&self, selector: &Selector) -> SondarResult<bool>;

    /// Click the first match
    async fn click(&mut self, selector: &Selector) -> SondarResult<()>;

    /// Current `document.readyState`
    async fn ready_state(&self) -> SondarResult<ReadyState>;

    /// Number of network resources fetched so far
    async fn resource_count(&self) -> SondarResult<u64>;

    /// PNG capture of a region
    async fn screenshot(&self, region: &Region) -> SondarResult<Vec<u8>>;

    /// Serialized markup of the document
    async fn content(&self) -> SondarResult<String>;

    /// Current URL
    async fn current_url(&self) -> SondarResult<String>;

    /// Document title
    async fn title(&self) -> SondarResult<String>;

    /// Resize the viewport
    async fn set_viewport(&mut self, viewport: Viewport) -> SondarResult<()>;

    /// Scroll to the bottom of the document
    async fn scroll_to_bottom(&mut self) -> SondarResult<()>;

    /// Console messages captured since navigation
    async fn console_messages(&self) -> SondarResult<Vec<ConsoleMessage>>;

    /// Close the page
    async fn close(&mut self) -> SondarResult<()>;
}

// =============================================================================
// MOCK DRIVER
// =============================================================================

/// A scripted element on a [`MockDriver`] page
#[derive(Debug, Clone)]
pub struct MockElement {
    /// Selector this element answers to
    pub selector: Selector,
    /// Number of matches once present
    pub count: usize,
    /// Whether the element is rendered
    pub visible: bool,
    /// Delay after navigation before the element exists
    pub appears_after: Duration,
    /// Whether clicking removes the element (overlay dismissal)
    pub dismiss_on_click: bool,
}

impl MockElement {
    /// A single visible element present immediately
    #[must_use]
    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            count: 1,
            visible: true,
            appears_after: Duration::ZERO,
            dismiss_on_click: false,
        }
    }

    /// Set the match count
    #[must_use]
    pub const fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Mark as present but not rendered
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Delay the element's appearance
    #[must_use]
    pub const fn appearing_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    /// Remove the element when clicked
    #[must_use]
    pub const fn dismissable(mut self) -> Self {
        self.dismiss_on_click = true;
        self
    }
}

/// Mock driver for unit testing
///
/// Readiness, network activity and element appearance are scripted as
/// delays relative to the last `navigate` call, measured on tokio's clock so
/// paused-time tests advance them deterministically.
#[derive(Debug, Default)]
pub struct MockDriver {
    /// URL reported after navigation (defaults to the navigated URL)
    pub redirect_to: Option<String>,
    /// Document title
    pub title: String,
    /// Serialized markup
    pub markup: String,
    /// Scripted elements
    pub elements: Vec<MockElement>,
    /// Delay until `DOMContentLoaded`
    pub dom_ready_after: Duration,
    /// Delay until `load`
    pub load_after: Duration,
    /// How long resource fetching continues after navigation
    pub network_busy_for: Duration,
    /// Screenshots keyed by [`Region::label`]
    pub screenshots: HashMap<String, Vec<u8>>,
    /// Console messages emitted by the page
    pub console: Vec<ConsoleMessage>,
    /// Current viewport
    pub viewport: Viewport,
    /// Error returned by every click, if set
    pub click_error: Option<String>,
    url: String,
    navigated_at: Option<Instant>,
    call_history: Mutex<Vec<String>>,
}

impl MockDriver {
    /// Create new mock driver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the markup
    #[must_use]
    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = markup.into();
        self
    }

    /// Add a scripted element
    #[must_use]
    pub fn with_element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Script readiness delays
    #[must_use]
    pub const fn with_ready_after(mut self, dom_ready: Duration, load: Duration) -> Self {
        self.dom_ready_after = dom_ready;
        self.load_after = load;
        self
    }

    /// Keep the network busy for a while after navigation
    #[must_use]
    pub const fn with_network_busy_for(mut self, busy: Duration) -> Self {
        self.network_busy_for = busy;
        self
    }

    /// Register a screenshot for a region
    #[must_use]
    pub fn with_screenshot(mut self, region: &Region, png: Vec<u8>) -> Self {
        self.screenshots.insert(region.label(), png);
        self
    }

    /// Add a console message
    #[must_use]
    pub fn with_console(mut self, message: ConsoleMessage) -> Self {
        self.console.push(message);
        self
    }

    /// Report a different URL after navigation
    #[must_use]
    pub fn with_redirect(mut self, url: impl Into<String>) -> Self {
        self.redirect_to = Some(url.into());
        self
    }

    /// Make every click fail
    #[must_use]
    pub fn with_click_error(mut self, message: impl Into<String>) -> Self {
        self.click_error = Some(message.into());
        self
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.history().iter().any(|c| c.starts_with(method))
    }

    fn record(&self, call: impl Into<String>) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(call.into());
        }
    }

    fn since_navigation(&self) -> Option<Duration> {
        self.navigated_at.map(|at| at.elapsed())
    }

    fn present(&self, selector: &Selector) -> Option<&MockElement> {
        let elapsed = self.since_navigation()?;
        self.elements
            .iter()
            .find(|e| &e.selector == selector && e.count > 0 && elapsed >= e.appears_after)
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&mut self, url: &str) -> SondarResult<()> {
        self.record(format!("navigate:{url}"));
        self.url = self.redirect_to.clone().unwrap_or_else(|| url.to_string());
        self.navigated_at = Some(Instant::now());
        Ok(())
    }

    async fn count(&self, selector: &Selector) -> SondarResult<usize> {
        Ok(self.present(selector).map_or(0, |e| e.count))
    }

    async fn is_visible(&self, selector: &Selector) -> SondarResult<bool> {
        Ok(self.present(selector).is_some_and(|e| e.visible))
    }

    async fn click(&mut self, selector: &Selector) -> SondarResult<()> {
        self.record(format!("click:{selector}"));
        if let Some(message) = &self.click_error {
            return Err(SondarError::driver(message.clone()));
        }
        let dismiss = match self.present(selector) {
            Some(element) => element.dismiss_on_click,
            None => return Err(SondarError::driver(format!("no element matches {selector}"))),
        };
        if dismiss {
            for element in self.elements.iter_mut().filter(|e| &e.selector == selector) {
                element.count = 0;
            }
        }
        Ok(())
    }

    async fn ready_state(&self) -> SondarResult<ReadyState> {
        let Some(elapsed) = self.since_navigation() else {
            return Ok(ReadyState::Loading);
        };
        Ok(if elapsed >= self.load_after.max(self.dom_ready_after) {
            ReadyState::Complete
        } else if elapsed >= self.dom_ready_after {
            ReadyState::Interactive
        } else {
            ReadyState::Loading
        })
    }

    async fn resource_count(&self) -> SondarResult<u64> {
        // One resource per 100ms of activity, then flat.
        let elapsed = self.since_navigation().unwrap_or_default();
        let active = elapsed.min(self.network_busy_for);
        Ok((active.as_millis() / 100) as u64)
    }

    async fn screenshot(&self, region: &Region) -> SondarResult<Vec<u8>> {
        self.record(format!("screenshot:{}", region.label()));
        self.screenshots
            .get(&region.label())
            .cloned()
            .ok_or_else(|| SondarError::Screenshot {
                message: format!("no mock screenshot for {}", region.label()),
            })
    }

    async fn content(&self) -> SondarResult<String> {
        Ok(self.markup.clone())
    }

    async fn current_url(&self) -> SondarResult<String> {
        Ok(self.url.clone())
    }

    async fn title(&self) -> SondarResult<String> {
        Ok(self.title.clone())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> SondarResult<()> {
        self.record(format!("set_viewport:{viewport}"));
        self.viewport = viewport;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> SondarResult<()> {
        self.record("scroll_to_bottom");
        Ok(())
    }

    async fn console_messages(&self) -> SondarResult<Vec<ConsoleMessage>> {
        Ok(self.console.clone())
    }

    async fn close(&mut self) -> SondarResult<()> {
        self.record("close");
        Ok(())
    }
}
