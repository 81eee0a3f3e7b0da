//! Scenario catalog for the Mercedes-Benz Germany site and related APIs.
//!
//! Three suites: `site` (content and behaviour checks), `visual` (baseline
//! comparisons) and `api` (remote workflows). Scenario names are
//! `<suite>/<slug>` and are what `--filter` matches against.

pub mod api;
pub mod site;
pub mod visual;

use crate::pages::PageLauncher;
use serde::Serialize;
use sondar::{
    HarnessConfig, HttpTransport, PageDriver, ScenarioContext, SondarResult, VisualDiffEngine,
};
use std::fmt;
use tracing::warn;

pub use api::ApiScenario;
pub use site::SiteCheck;
pub use visual::VisualScenario;

/// Scenario suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Suite {
    /// Site content and behaviour
    Site,
    /// Visual regression
    Visual,
    /// API workflows
    Api,
}

impl Suite {
    /// All suites in run order
    pub const ALL: [Self; 3] = [Self::Site, Self::Visual, Self::Api];

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Visual => "visual",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Site check
    Site(SiteCheck),
    /// Visual comparison
    Visual(VisualScenario),
    /// API workflow
    Api(ApiScenario),
}

impl Scenario {
    /// Suite of this scenario
    #[must_use]
    pub const fn suite(self) -> Suite {
        match self {
            Self::Site(_) => Suite::Site,
            Self::Visual(_) => Suite::Visual,
            Self::Api(_) => Suite::Api,
        }
    }

    /// Slug within the suite
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Site(c) => c.slug(),
            Self::Visual(v) => v.slug(),
            Self::Api(a) => a.slug(),
        }
    }

    /// Full name, `<suite>/<slug>`
    #[must_use]
    pub fn name(self) -> String {
        format!("{}/{}", self.suite(), self.slug())
    }

    /// One-line description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Site(c) => c.description(),
            Self::Visual(v) => v.description(),
            Self::Api(a) => a.description(),
        }
    }

    /// Run the scenario body
    ///
    /// # Errors
    ///
    /// The first failed expectation, or an environment failure.
    pub async fn execute(self, harness: &Harness<'_>, ctx: &ScenarioContext) -> SondarResult<()> {
        match self {
            Self::Site(check) => {
                let mut page = harness.pages.open(check.viewport(harness.config)).await?;
                let outcome = check.run(page.as_mut(), harness, ctx).await;
                close_page(page.as_mut()).await;
                outcome
            }
            Self::Visual(scenario) => {
                let mut page = harness.pages.open(harness.config.viewport).await?;
                let outcome = scenario.run(page.as_mut(), harness, ctx).await;
                close_page(page.as_mut()).await;
                outcome
            }
            Self::Api(scenario) => scenario.run(harness, ctx).await,
        }
    }
}

/// Every scenario, in run order
#[must_use]
pub fn all() -> Vec<Scenario> {
    SiteCheck::ALL
        .into_iter()
        .map(Scenario::Site)
        .chain(VisualScenario::ALL.into_iter().map(Scenario::Visual))
        .chain(ApiScenario::ALL.into_iter().map(Scenario::Api))
        .collect()
}

/// Scenarios of the given suites whose name contains `filter`
#[must_use]
pub fn select(suites: &[Suite], filter: Option<&str>) -> Vec<Scenario> {
    all()
        .into_iter()
        .filter(|s| suites.contains(&s.suite()))
        .filter(|s| filter.map_or(true, |f| s.name().contains(f)))
        .collect()
}

pub(crate) async fn close_page(page: &mut dyn PageDriver) {
    if let Err(e) = page.close().await {
        warn!(error = %e, "page did not close cleanly");
    }
}

/// Capabilities shared by scenario bodies
pub struct Harness<'a> {
    /// Effective configuration
    pub config: &'a HarnessConfig,
    /// Page source for site and visual scenarios
    pub pages: &'a dyn PageLauncher,
    /// Transport for API scenarios
    pub http: &'a dyn HttpTransport,
    /// Visual diff engine over the configured baseline store
    pub visual: VisualDiffEngine,
}

impl fmt::Debug for Harness<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("base_url", &self.config.base_url)
            .field("visual", &self.visual)
            .finish_non_exhaustive()
    }
}

impl<'a> Harness<'a> {
    /// Assemble a harness
    #[must_use]
    pub fn new(
        config: &'a HarnessConfig,
        pages: &'a dyn PageLauncher,
        http: &'a dyn HttpTransport,
    ) -> Self {
        Self {
            config,
            pages,
            http,
            visual: VisualDiffEngine::new(config.visual.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_size() {
        let all = all();
        assert_eq!(all.len(), 24);
        assert_eq!(all.iter().filter(|s| s.suite() == Suite::Site).count(), 11);
        assert_eq!(all.iter().filter(|s| s.suite() == Suite::Visual).count(), 3);
        assert_eq!(all.iter().filter(|s| s.suite() == Suite::Api).count(), 10);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<String> = all().into_iter().map(Scenario::name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 24);
    }

    #[test]
    fn test_select_by_suite_and_filter() {
        let api = select(&[Suite::Api], None);
        assert_eq!(api.len(), 10);
        let gorest = select(&Suite::ALL, Some("gorest"));
        assert!(gorest.iter().all(|s| s.name().contains("gorest")));
        assert_eq!(gorest.len(), 2);
        assert!(select(&[Suite::Visual], Some("nhtsa")).is_empty());
    }
}
