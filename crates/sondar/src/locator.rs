//! Selectors for locating page elements.
//!
//! A [`Selector`] renders to a JavaScript expression so any driver that can
//! evaluate script can resolve it. Playwright-style text filters
//! (`button:has-text("Accept")`) are parsed into [`Selector::CssWithText`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Selector {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// XPath selector
    XPath(String),
    /// Text content selector
    Text(String),
    /// Test ID selector (data-testid attribute)
    TestId(String),
    /// CSS selector filtered by text content
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a CSS selector with a text filter
    #[must_use]
    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// Parse a selector string.
    ///
    /// Recognizes `xpath=...`, `text=...`, `data-testid=...` and a trailing
    /// `:has-text("...")` filter; everything else is treated as CSS.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if let Some(rest) = input.strip_prefix("xpath=") {
            return Self::XPath(rest.to_string());
        }
        if let Some(rest) = input.strip_prefix("text=") {
            return Self::Text(unquote(rest).to_string());
        }
        if let Some(rest) = input.strip_prefix("data-testid=") {
            return Self::TestId(unquote(rest).to_string());
        }
        if let Some(start) = input.find(":has-text(") {
            if let Some(inner) = input[start + ":has-text(".len()..].strip_suffix(')') {
                let css = &input[..start];
                return Self::CssWithText {
                    css: if css.is_empty() { "*" } else { css }.to_string(),
                    text: unquote(inner).to_string(),
                };
            }
        }
        Self::Css(input.to_string())
    }

    /// JavaScript expression yielding the first matching element (or null)
    #[must_use]
    pub fn to_query(&self) -> String {
        match self {
            Self::Css(s) => format!("document.querySelector({s:?})"),
            Self::XPath(s) => {
                format!("document.evaluate({s:?}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue")
            }
            Self::Text(t) => {
                format!("Array.from(document.querySelectorAll('body *')).find(el => el.children.length === 0 && el.textContent.includes({t:?}))")
            }
            Self::TestId(id) => format!("document.querySelector('[data-testid={id:?}]')"),
            Self::CssWithText { css, text } => {
                format!("Array.from(document.querySelectorAll({css:?})).find(el => el.textContent.includes({text:?}))")
            }
        }
    }

    /// JavaScript expression yielding the number of matching elements
    #[must_use]
    pub fn to_count_query(&self) -> String {
        match self {
            Self::Css(s) => format!("document.querySelectorAll({s:?}).length"),
            Self::XPath(s) => {
                format!("document.evaluate({s:?}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength")
            }
            Self::Text(t) => {
                format!("Array.from(document.querySelectorAll('body *')).filter(el => el.children.length === 0 && el.textContent.includes({t:?})).length")
            }
            Self::TestId(id) => format!("document.querySelectorAll('[data-testid={id:?}]').length"),
            Self::CssWithText { css, text } => {
                format!("Array.from(document.querySelectorAll({css:?})).filter(el => el.textContent.includes({text:?})).length")
            }
        }
    }

    /// JavaScript expression that is true when the first match is rendered
    #[must_use]
    pub fn to_visible_query(&self) -> String {
        format!(
            "(() => {{ const el = {}; if (!el) return false; \
             const r = el.getBoundingClientRect(); const s = getComputedStyle(el); \
             return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }})()",
            self.to_query()
        )
    }

    /// JavaScript expression that clicks the first match, yielding whether it existed
    #[must_use]
    pub fn to_click_query(&self) -> String {
        format!(
            "(() => {{ const el = {}; if (!el) return false; el.click(); return true; }})()",
            self.to_query()
        )
    }

    /// JavaScript expression yielding the first match's page-relative bounding box
    #[must_use]
    pub fn to_bounds_query(&self) -> String {
        format!(
            "(() => {{ const el = {}; if (!el) return null; const r = el.getBoundingClientRect(); \
             return {{ x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height }}; }})()",
            self.to_query()
        )
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "{s}"),
            Self::XPath(s) => write!(f, "xpath={s}"),
            Self::Text(t) => write!(f, "text={t:?}"),
            Self::TestId(id) => write!(f, "data-testid={id:?}"),
            Self::CssWithText { css, text } => write!(f, "{css}:has-text({text:?})"),
        }
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// Page-relative element bounds in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the box has a renderable area
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_plain_css() {
            assert_eq!(Selector::parse("nav"), Selector::css("nav"));
            assert_eq!(
                Selector::parse("[data-test=\"handle-accept-all-button\"]"),
                Selector::css("[data-test=\"handle-accept-all-button\"]")
            );
        }

        #[test]
        fn test_parse_has_text() {
            assert_eq!(
                Selector::parse("button:has-text(\"Alle akzeptieren\")"),
                Selector::css_with_text("button", "Alle akzeptieren")
            );
            assert_eq!(
                Selector::parse(":has-text('Accept All')"),
                Selector::css_with_text("*", "Accept All")
            );
        }

        #[test]
        fn test_parse_prefixed_engines() {
            assert_eq!(
                Selector::parse("text=\"Impressum\""),
                Selector::text("Impressum")
            );
            assert_eq!(
                Selector::parse("xpath=//footer"),
                Selector::XPath("//footer".into())
            );
            assert_eq!(
                Selector::parse("data-testid=cookie"),
                Selector::test_id("cookie")
            );
        }

        #[test]
        fn test_display_round_trips_has_text() {
            let sel = Selector::css_with_text("button", "Accept All");
            assert_eq!(Selector::parse(&sel.to_string()), sel);
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn test_css_queries() {
            let sel = Selector::css("img[src]");
            assert_eq!(sel.to_query(), "document.querySelector(\"img[src]\")");
            assert_eq!(
                sel.to_count_query(),
                "document.querySelectorAll(\"img[src]\").length"
            );
        }

        #[test]
        fn test_has_text_query_filters_text() {
            let q = Selector::css_with_text("button", "Alle akzeptieren").to_count_query();
            assert!(q.contains("querySelectorAll(\"button\")"));
            assert!(q.contains("includes(\"Alle akzeptieren\")"));
        }

        #[test]
        fn test_action_queries_wrap_base_query() {
            let sel = Selector::css("footer");
            assert!(sel.to_click_query().contains("el.click()"));
            assert!(sel.to_visible_query().contains("getBoundingClientRect"));
            assert!(sel.to_bounds_query().contains("window.scrollY"));
        }
    }

    #[test]
    fn test_bounding_box_visibility() {
        assert!(BoundingBox::new(0.0, 0.0, 10.0, 10.0).is_visible());
        assert!(!BoundingBox::new(0.0, 0.0, 0.0, 10.0).is_visible());
    }
}
