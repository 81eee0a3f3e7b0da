//! Content assertions over page snapshots.
//!
//! A [`ContentPredicate`] combines [`Marker`]s with [`Match::Any`] or
//! [`Match::All`] and evaluates to a [`Verdict`] that records which markers
//! matched. Markers are literal: a German page needs German markers.

use crate::driver::PageDriver;
use crate::locator::Selector;
use crate::network::UrlPattern;
use crate::result::{SondarError, SondarResult};
use crate::snapshot::PageSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single observable property of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "marker", rename_all = "snake_case")]
pub enum Marker {
    /// Case-sensitive substring of the markup
    Text {
        /// Needle
        text: String,
    },
    /// Case-insensitive substring of the markup
    TextIgnoreCase {
        /// Needle
        text: String,
    },
    /// Case-insensitive substring of the document title
    TitleContains {
        /// Needle
        text: String,
    },
    /// At least `min` elements match the selector
    ElementCount {
        /// Selector to count
        selector: Selector,
        /// Minimum count
        min: usize,
    },
    /// The current URL matches a pattern
    Url {
        /// Pattern
        pattern: UrlPattern,
    },
}

impl Marker {
    /// Case-sensitive markup text marker
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Case-insensitive markup text marker
    #[must_use]
    pub fn text_ignore_case(text: impl Into<String>) -> Self {
        Self::TextIgnoreCase { text: text.into() }
    }

    /// Title marker
    #[must_use]
    pub fn title_contains(text: impl Into<String>) -> Self {
        Self::TitleContains { text: text.into() }
    }

    /// Element count marker
    #[must_use]
    pub fn element_count(selector: impl Into<Selector>, min: usize) -> Self {
        Self::ElementCount {
            selector: selector.into(),
            min,
        }
    }

    /// URL marker
    #[must_use]
    pub const fn url(pattern: UrlPattern) -> Self {
        Self::Url { pattern }
    }

    fn holds(&self, snapshot: &PageSnapshot) -> bool {
        match self {
            Self::Text { text } => snapshot.markup().contains(text.as_str()),
            Self::TextIgnoreCase { text } => snapshot
                .markup()
                .to_lowercase()
                .contains(&text.to_lowercase()),
            Self::TitleContains { text } => snapshot
                .title()
                .to_lowercase()
                .contains(&text.to_lowercase()),
            Self::ElementCount { selector, min } => {
                snapshot.count(selector).unwrap_or(0) >= *min
            }
            Self::Url { pattern } => pattern.matches(snapshot.url()),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text } => write!(f, "text {text:?}"),
            Self::TextIgnoreCase { text } => write!(f, "text {text:?} (any case)"),
            Self::TitleContains { text } => write!(f, "title contains {text:?}"),
            Self::ElementCount { selector, min } => write!(f, "at least {min} x {selector}"),
            Self::Url { pattern } => write!(f, "{pattern}"),
        }
    }
}

/// How marker results combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Match {
    /// At least one marker holds
    Any,
    /// Every marker holds
    All,
}

/// A set of markers and how they combine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPredicate {
    mode: Match,
    markers: Vec<Marker>,
}

impl ContentPredicate {
    /// Create a predicate
    #[must_use]
    pub fn new(mode: Match, markers: impl IntoIterator<Item = Marker>) -> Self {
        Self {
            mode,
            markers: markers.into_iter().collect(),
        }
    }

    /// Passes when any marker holds
    #[must_use]
    pub fn any(markers: impl IntoIterator<Item = Marker>) -> Self {
        Self::new(Match::Any, markers)
    }

    /// Passes when all markers hold
    #[must_use]
    pub fn all(markers: impl IntoIterator<Item = Marker>) -> Self {
        Self::new(Match::All, markers)
    }

    /// Any of several case-sensitive texts
    #[must_use]
    pub fn any_text<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::any(texts.into_iter().map(Marker::text))
    }

    /// Combination mode
    #[must_use]
    pub const fn mode(&self) -> Match {
        self.mode
    }

    /// Markers in declaration order
    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Selectors a snapshot must count for this predicate
    #[must_use]
    pub fn required_selectors(&self) -> Vec<Selector> {
        self.markers
            .iter()
            .filter_map(|m| match m {
                Marker::ElementCount { selector, .. } => Some(selector.clone()),
                _ => None,
            })
            .collect()
    }

    /// Check the predicate is well formed
    ///
    /// # Errors
    ///
    /// [`SondarError::InvalidPredicate`] for an empty marker set or an
    /// invalid URL regex.
    pub fn validate(&self) -> SondarResult<()> {
        if self.markers.is_empty() {
            return Err(SondarError::invalid_predicate("marker set is empty"));
        }
        for marker in &self.markers {
            if let Marker::Url { pattern } = marker {
                pattern.validate()?;
            }
        }
        Ok(())
    }

    /// Evaluate against a snapshot
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate). A predicate that simply does not
    /// hold is `Ok` with a failing verdict.
    pub fn evaluate(&self, snapshot: &PageSnapshot) -> SondarResult<Verdict> {
        self.validate()?;

        let (matched, unmatched): (Vec<&Marker>, Vec<&Marker>) =
            self.markers.iter().partition(|m| m.holds(snapshot));
        let total = self.markers.len();

        let passed = match self.mode {
            Match::Any => !matched.is_empty(),
            Match::All => unmatched.is_empty(),
        };
        let explanation = match (self.mode, passed) {
            (Match::Any, true) => format!("matched {} of {total}: {}", matched.len(), join(&matched)),
            (Match::Any, false) => format!("none of {total} matched: {}", join(&unmatched)),
            (Match::All, true) => format!("all {total} matched: {}", join(&matched)),
            (Match::All, false) => format!(
                "{} of {total} unmatched: {}",
                unmatched.len(),
                join(&unmatched)
            ),
        };

        Ok(Verdict {
            passed,
            matched: matched.iter().map(ToString::to_string).collect(),
            unmatched: unmatched.iter().map(ToString::to_string).collect(),
            explanation,
        })
    }

    /// Snapshot the live page and evaluate
    ///
    /// # Errors
    ///
    /// Driver failures during capture, or an invalid predicate.
    pub async fn check_page<D>(&self, driver: &D) -> SondarResult<Verdict>
    where
        D: PageDriver + ?Sized,
    {
        self.validate()?;
        let snapshot = PageSnapshot::capture(driver, &self.required_selectors()).await?;
        self.evaluate(&snapshot)
    }
}

fn join(markers: &[&Marker]) -> String {
    markers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Outcome of evaluating a predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the predicate held
    pub passed: bool,
    /// Markers that held
    pub matched: Vec<String>,
    /// Markers that did not hold
    pub unmatched: Vec<String>,
    /// Human-readable explanation
    pub explanation: String,
}

impl Verdict {
    /// Turn a failing verdict into an error
    ///
    /// # Errors
    ///
    /// [`SondarError::AssertionFailed`] carrying the explanation.
    pub fn into_result(self) -> SondarResult<Self> {
        if self.passed {
            Ok(self)
        } else {
            Err(SondarError::assertion(self.explanation))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockElement};

    fn footer_page() -> PageSnapshot {
        PageSnapshot::from_parts(
            "<footer><a>Datenschutz</a><a>Kontakt</a></footer>",
            "https://www.mercedes-benz.de/",
            "Mercedes-Benz PKW | Modelle",
        )
        .with_count(Selector::css("img[src]"), 4)
    }

    mod any_tests {
        use super::*;

        #[test]
        fn test_any_cites_matched_marker() {
            let verdict = ContentPredicate::any_text(["Impressum", "Datenschutz"])
                .evaluate(&footer_page())
                .unwrap();
            assert!(verdict.passed);
            assert_eq!(verdict.matched, vec!["text \"Datenschutz\"".to_string()]);
            assert_eq!(verdict.unmatched, vec!["text \"Impressum\"".to_string()]);
            assert!(verdict.explanation.contains("Datenschutz"));
        }

        #[test]
        fn test_any_none_matched_fails() {
            let verdict = ContentPredicate::any_text(["Fahrzeuge", "EQ "])
                .evaluate(&footer_page())
                .unwrap();
            assert!(!verdict.passed);
            assert!(verdict.explanation.starts_with("none of 2 matched"));
            assert!(matches!(
                verdict.into_result(),
                Err(SondarError::AssertionFailed { .. })
            ));
        }

        #[test]
        fn test_case_handling() {
            let snap = footer_page();
            assert!(!ContentPredicate::any([Marker::text("datenschutz")])
                .evaluate(&snap)
                .unwrap()
                .passed);
            assert!(ContentPredicate::any([Marker::text_ignore_case("datenschutz")])
                .evaluate(&snap)
                .unwrap()
                .passed);
            assert!(ContentPredicate::any([Marker::title_contains("mercedes")])
                .evaluate(&snap)
                .unwrap()
                .passed);
        }
    }

    mod all_tests {
        use super::*;

        #[test]
        fn test_all_requires_every_marker() {
            let snap = footer_page();
            let predicate = ContentPredicate::all([
                Marker::url(UrlPattern::Prefix("https://".into())),
                Marker::element_count("img[src]", 1),
                Marker::text("Impressum"),
            ]);
            let verdict = predicate.evaluate(&snap).unwrap();
            assert!(!verdict.passed);
            assert_eq!(verdict.matched.len(), 2);
            assert_eq!(verdict.explanation, "1 of 3 unmatched: text \"Impressum\"");
        }

        #[test]
        fn test_all_pass_names_matched_markers() {
            let verdict = ContentPredicate::all([
                Marker::url(UrlPattern::Prefix("https://".into())),
                Marker::text("Datenschutz"),
            ])
            .evaluate(&footer_page())
            .unwrap();
            assert!(verdict.passed);
            assert!(verdict.explanation.starts_with("all 2 matched: "));
            assert!(verdict.explanation.contains("text \"Datenschutz\""));
        }

        #[test]
        fn test_uncaptured_selector_counts_zero() {
            let verdict = ContentPredicate::all([Marker::element_count("nav", 1)])
                .evaluate(&footer_page())
                .unwrap();
            assert!(!verdict.passed);
        }
    }

    mod invalid_tests {
        use super::*;

        #[test]
        fn test_empty_markers_invalid() {
            let err = ContentPredicate::any(Vec::new())
                .evaluate(&footer_page())
                .unwrap_err();
            assert!(matches!(err, SondarError::InvalidPredicate { .. }));
        }

        #[test]
        fn test_bad_regex_invalid() {
            let err = ContentPredicate::any([Marker::url(UrlPattern::Regex("[".into()))])
                .evaluate(&footer_page())
                .unwrap_err();
            assert!(matches!(err, SondarError::InvalidPredicate { .. }));
        }
    }

    #[tokio::test]
    async fn test_check_page_counts_required_selectors() {
        let mut driver = MockDriver::new()
            .with_markup("<nav></nav>")
            .with_element(MockElement::new("nav").with_count(2));
        driver.navigate("https://www.mercedes-benz.de/").await.unwrap();
        let verdict = ContentPredicate::all([Marker::element_count("nav", 2)])
            .check_page(&driver)
            .await
            .unwrap();
        assert!(verdict.passed);
    }
}
