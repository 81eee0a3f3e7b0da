//! Visual regression scenarios.
//!
//! Each scenario brings the homepage to a stable state and compares one
//! region against its stored baseline. A missing baseline is created from
//! the capture and the scenario passes with a note; `sondar rebase` is the
//! only way to replace an existing one.

use super::site::{network_idle, open};
use super::Harness;
use sondar::visual::ManifestEntry;
use sondar::{
    settle, Artifact, HarnessConfig, InteractionAttempt, LoadState, PageDriver, Region,
    ScenarioContext, Selector, SondarResult, VisualCheck, VisualOutcome,
};
use std::time::Duration;
use tracing::info;

const RENDER_SETTLE: Duration = Duration::from_millis(2_000);

/// Catalog of visual comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualScenario {
    /// Full homepage, 10% tolerance for rotating content
    Homepage,
    /// Header element, exact
    Header,
    /// Footer element, exact
    Footer,
}

impl VisualScenario {
    /// All visual scenarios in run order
    pub const ALL: [Self; 3] = [Self::Homepage, Self::Header, Self::Footer];

    /// Scenario slug
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Homepage => "homepage",
            Self::Header => "header",
            Self::Footer => "footer",
        }
    }

    /// One-line description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Homepage => "full homepage matches its baseline within 10%",
            Self::Header => "header matches its baseline exactly",
            Self::Footer => "footer matches its baseline exactly",
        }
    }

    /// Region captured by this scenario
    #[must_use]
    pub fn region(self) -> Region {
        match self {
            Self::Homepage => Region::FullPage,
            Self::Header => Region::Element(Selector::css("header")),
            Self::Footer => Region::Element(Selector::css("footer")),
        }
    }

    /// Tolerance recorded when the baseline is first created
    #[must_use]
    pub const fn tolerance(self) -> f64 {
        match self {
            Self::Homepage => 0.10,
            Self::Header | Self::Footer => 0.0,
        }
    }

    /// Baseline check for this scenario
    #[must_use]
    pub fn check(self) -> VisualCheck {
        let region_name = match self {
            Self::Homepage => "full-page",
            other => other.slug(),
        };
        VisualCheck::new(format!("visual-{}", self.slug()), region_name, self.region())
            .with_tolerance(self.tolerance())
    }

    /// Navigate and bring the page to a stable state for capture
    ///
    /// # Errors
    ///
    /// Navigation timeouts and driver failures.
    pub async fn prepare(self, page: &mut dyn PageDriver, config: &HarnessConfig) -> SondarResult<()> {
        open(page, config, LoadState::Load).await?;
        InteractionAttempt::cookie_consent().resolve(&mut *page).await;
        match self {
            Self::Homepage => {
                network_idle(&*page).await?;
                settle(RENDER_SETTLE).await;
            }
            Self::Header => network_idle(&*page).await?,
            Self::Footer => {
                page.scroll_to_bottom().await?;
                settle(RENDER_SETTLE).await;
            }
        }
        Ok(())
    }

    /// Compare the region against its baseline
    ///
    /// # Errors
    ///
    /// [`sondar::SondarError::AssertionFailed`] when the difference exceeds
    /// the baseline's tolerance; capture and storage failures otherwise.
    pub async fn run(
        self,
        page: &mut dyn PageDriver,
        harness: &Harness<'_>,
        ctx: &ScenarioContext,
    ) -> SondarResult<()> {
        self.prepare(page, harness.config).await?;
        let outcome = harness.visual.check(&*page, &self.check()).await?;
        match &outcome {
            VisualOutcome::BaselineCreated { path } => {
                ctx.note(format!("baseline created at {}", path.display()));
            }
            VisualOutcome::Compared(diff) => {
                ctx.metric("diff_ratio", diff.ratio, "ratio");
                if let Some(path) = &diff.diff_path {
                    ctx.attach(Artifact::DiffImage { path: path.clone() });
                }
                if let Some(path) = &diff.actual_path {
                    ctx.attach(Artifact::Capture { path: path.clone() });
                }
            }
        }
        outcome.into_result().map(drop)
    }

    /// Capture the region and replace its baseline
    ///
    /// # Errors
    ///
    /// Navigation, capture and storage failures.
    pub async fn rebase(
        self,
        page: &mut dyn PageDriver,
        harness: &Harness<'_>,
    ) -> SondarResult<ManifestEntry> {
        self.prepare(page, harness.config).await?;
        let entry = harness.visual.rebase(&*page, &self.check()).await?;
        info!(scenario = self.slug(), version = entry.version, "baseline replaced");
        Ok(entry)
    }
}
