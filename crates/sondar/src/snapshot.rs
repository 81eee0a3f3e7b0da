//! Immutable captures of a page's materialized content.

use crate::driver::PageDriver;
use crate::locator::Selector;
use crate::result::SondarResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Point-in-time capture of markup, URL, title and element counts
///
/// Assertions evaluate against a snapshot, never the live page, so a verdict
/// always refers to one consistent state.
#[derive(Debug, Clone, Serialize)]
pub struct PageSnapshot {
    markup: String,
    url: String,
    title: String,
    #[serde(skip)]
    counts: HashMap<Selector, usize>,
    captured_at: DateTime<Utc>,
}

impl PageSnapshot {
    /// Capture the live page, counting each of `selectors`
    ///
    /// # Errors
    ///
    /// Propagates driver failures.
    pub async fn capture<D>(driver: &D, selectors: &[Selector]) -> SondarResult<Self>
    where
        D: PageDriver + ?Sized,
    {
        let markup = driver.content().await?;
        let url = driver.current_url().await?;
        let title = driver.title().await?;
        let mut counts = HashMap::with_capacity(selectors.len());
        for selector in selectors {
            let n = driver.count(selector).await?;
            counts.insert(selector.clone(), n);
        }
        tracing::debug!(%url, bytes = markup.len(), selectors = counts.len(), "page snapshot captured");
        Ok(Self {
            markup,
            url,
            title,
            counts,
            captured_at: Utc::now(),
        })
    }

    /// Build a snapshot from already-captured parts
    #[must_use]
    pub fn from_parts(
        markup: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            markup: markup.into(),
            url: url.into(),
            title: title.into(),
            counts: HashMap::new(),
            captured_at: Utc::now(),
        }
    }

    /// Record an element count (construction only)
    #[must_use]
    pub fn with_count(mut self, selector: Selector, count: usize) -> Self {
        self.counts.insert(selector, count);
        self
    }

    /// Serialized markup
    #[must_use]
    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// URL at capture time
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Document title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Count for a selector, if it was captured
    #[must_use]
    pub fn count(&self, selector: &Selector) -> Option<usize> {
        self.counts.get(selector).copied()
    }

    /// Capture timestamp
    #[must_use]
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockElement};

    #[tokio::test]
    async fn test_capture_reads_driver() {
        let mut driver = MockDriver::new()
            .with_title("Mercedes-Benz PKW")
            .with_markup("<footer>Impressum</footer>")
            .with_element(MockElement::new("img[src]").with_count(12));
        driver.navigate("https://www.mercedes-benz.de/").await.unwrap();

        let images = Selector::css("img[src]");
        let nav = Selector::css("nav");
        let snap = PageSnapshot::capture(&driver, &[images.clone(), nav.clone()])
            .await
            .unwrap();

        assert_eq!(snap.title(), "Mercedes-Benz PKW");
        assert_eq!(snap.url(), "https://www.mercedes-benz.de/");
        assert!(snap.markup().contains("Impressum"));
        assert_eq!(snap.count(&images), Some(12));
        assert_eq!(snap.count(&nav), Some(0));
        assert_eq!(snap.count(&Selector::css("header")), None);
    }

    #[test]
    fn test_from_parts() {
        let snap = PageSnapshot::from_parts("<p>x</p>", "https://a.b", "T")
            .with_count(Selector::css("p"), 1);
        assert_eq!(snap.count(&Selector::css("p")), Some(1));
        assert!(snap.captured_at() <= Utc::now());
    }
}
