//! Site checks against the homepage.
//!
//! Each check opens a fresh page, navigates to `base_url`, dismisses the
//! consent overlay when it shows up, and asserts one thing. Content markers
//! are German with English fallbacks where the site uses both.

use super::Harness;
use sondar::{
    settle, Artifact, ConsoleLevel, ContentPredicate, HarnessConfig, InteractionAttempt, LoadState,
    Marker, PageDriver, ReadinessGate, ScenarioContext, Selector, SondarError, SondarResult,
    UrlPattern, Viewport,
};
use std::time::Duration;
use tracing::info;

/// Upper bound for `DOMContentLoaded` after navigation
pub const MAX_LOAD_TIME_MS: u64 = 15_000;

const CONSENT_BUDGET: Duration = Duration::from_millis(3_000);
const FOOTER_SETTLE: Duration = Duration::from_millis(2_000);
const NAVIGATION_SELECTOR: &str = "nav, [role=\"navigation\"], header";
const VISIBILITY_POLL: Duration = Duration::from_millis(100);

/// Catalog of site checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteCheck {
    /// URL and title identify the site
    HomepageLoads,
    /// Main navigation is rendered
    MainNavigation,
    /// Vehicle model content is present
    VehicleModels,
    /// Search entry point (informational)
    SearchPresent,
    /// Footer legal links are present
    FooterPresent,
    /// Site loads at a phone viewport
    MobileResponsive,
    /// `DOMContentLoaded` within the load budget
    LoadTime,
    /// Console errors are captured as evidence
    ConsoleErrors,
    /// At least one image with a source
    ImagesPresent,
    /// Final URL is HTTPS
    HttpsUsed,
    /// Brand name appears in the markup
    BrandingPresent,
}

impl SiteCheck {
    /// All checks in run order
    pub const ALL: [Self; 11] = [
        Self::HomepageLoads,
        Self::MainNavigation,
        Self::VehicleModels,
        Self::SearchPresent,
        Self::FooterPresent,
        Self::MobileResponsive,
        Self::LoadTime,
        Self::ConsoleErrors,
        Self::ImagesPresent,
        Self::HttpsUsed,
        Self::BrandingPresent,
    ];

    /// Scenario slug
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::HomepageLoads => "homepage-loads",
            Self::MainNavigation => "main-navigation",
            Self::VehicleModels => "vehicle-models",
            Self::SearchPresent => "search-present",
            Self::FooterPresent => "footer-present",
            Self::MobileResponsive => "mobile-responsive",
            Self::LoadTime => "load-time",
            Self::ConsoleErrors => "console-errors",
            Self::ImagesPresent => "images-present",
            Self::HttpsUsed => "https-used",
            Self::BrandingPresent => "branding-present",
        }
    }

    /// One-line description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::HomepageLoads => "homepage loads with a Mercedes URL and title",
            Self::MainNavigation => "main navigation is visible",
            Self::VehicleModels => "vehicle model content is present",
            Self::SearchPresent => "search entry point exists (informational)",
            Self::FooterPresent => "footer shows legal and contact links",
            Self::MobileResponsive => "homepage loads at 375x667",
            Self::LoadTime => "DOMContentLoaded within 15 s",
            Self::ConsoleErrors => "console errors are captured",
            Self::ImagesPresent => "images with a source are present",
            Self::HttpsUsed => "final URL uses HTTPS",
            Self::BrandingPresent => "Mercedes-Benz branding is present",
        }
    }

    /// Viewport the page is opened with
    #[must_use]
    pub const fn viewport(self, config: &HarnessConfig) -> Viewport {
        match self {
            Self::MobileResponsive => config.mobile_viewport,
            _ => config.viewport,
        }
    }

    /// Run the check on a fresh page
    ///
    /// # Errors
    ///
    /// [`SondarError::AssertionFailed`] when the check does not hold,
    /// timeouts and driver failures otherwise.
    pub async fn run(
        self,
        page: &mut dyn PageDriver,
        harness: &Harness<'_>,
        ctx: &ScenarioContext,
    ) -> SondarResult<()> {
        let config = harness.config;
        match self {
            Self::HomepageLoads => {
                open(page, config, LoadState::Load).await?;
                InteractionAttempt::cookie_consent().resolve(&mut *page).await;
                let verdict = ContentPredicate::all([
                    Marker::url(UrlPattern::Contains("mercedes-benz".into())),
                    Marker::title_contains("mercedes"),
                ])
                .check_page(&*page)
                .await?
                .into_result()?;
                ctx.note(format!("title: {}", page.title().await?));
                info!(explanation = %verdict.explanation, "homepage identified");
                Ok(())
            }
            Self::MainNavigation => {
                open_with_consent(page, config).await?;
                let selector = Selector::parse(NAVIGATION_SELECTOR);
                wait_visible(&*page, &selector, config.action_timeout()).await
            }
            Self::VehicleModels => {
                open_with_consent(page, config).await?;
                network_idle(&*page).await?;
                ContentPredicate::any_text(["Fahrzeuge", "Modelle", "PKW", "Mercedes-AMG", "EQ"])
                    .check_page(&*page)
                    .await?
                    .into_result()
                    .map(drop)
            }
            Self::SearchPresent => {
                open_with_consent(page, config).await?;
                network_idle(&*page).await?;
                let verdict = ContentPredicate::any([
                    Marker::text_ignore_case("search"),
                    Marker::text_ignore_case("suche"),
                ])
                .check_page(&*page)
                .await?;
                ctx.note(format!("search: {}", verdict.explanation));
                Ok(())
            }
            Self::FooterPresent => {
                open_with_consent(page, config).await?;
                page.scroll_to_bottom().await?;
                settle(FOOTER_SETTLE).await;
                ContentPredicate::any_text(["Impressum", "Datenschutz", "Kontakt", "© Mercedes"])
                    .check_page(&*page)
                    .await?
                    .into_result()
                    .map(drop)
            }
            Self::MobileResponsive => {
                open_with_consent(page, config).await?;
                network_idle(&*page).await?;
                ContentPredicate::all([Marker::url(UrlPattern::Contains("mercedes-benz".into()))])
                    .check_page(&*page)
                    .await?
                    .into_result()
                    .map(drop)
            }
            Self::LoadTime => {
                let elapsed = open(page, config, LoadState::DomContentLoaded).await?;
                let ms = elapsed.as_millis() as u64;
                ctx.metric("load_time", ms as f64, "ms");
                if ms < MAX_LOAD_TIME_MS {
                    Ok(())
                } else {
                    Err(SondarError::assertion(format!(
                        "DOMContentLoaded after {ms} ms, budget {MAX_LOAD_TIME_MS} ms"
                    )))
                }
            }
            Self::ConsoleErrors => {
                open_with_consent(page, config).await?;
                network_idle(&*page).await?;
                let errors: Vec<String> = page
                    .console_messages()
                    .await?
                    .into_iter()
                    .filter(|m| m.level == ConsoleLevel::Error)
                    .map(|m| m.text)
                    .collect();
                ctx.metric("console_errors", errors.len() as f64, "count");
                if !errors.is_empty() {
                    ctx.attach(Artifact::ConsoleErrors { messages: errors });
                }
                Ok(())
            }
            Self::ImagesPresent => {
                open_with_consent(page, config).await?;
                network_idle(&*page).await?;
                let images = Selector::css("img[src]");
                ctx.metric("images", page.count(&images).await? as f64, "count");
                ContentPredicate::all([Marker::element_count(images, 1)])
                    .check_page(&*page)
                    .await?
                    .into_result()
                    .map(drop)
            }
            Self::HttpsUsed => {
                open(page, config, LoadState::Load).await?;
                ContentPredicate::all([Marker::url(UrlPattern::Regex("^https://".into()))])
                    .check_page(&*page)
                    .await?
                    .into_result()
                    .map(drop)
            }
            Self::BrandingPresent => {
                open_with_consent(page, config).await?;
                ContentPredicate::any_text(["Mercedes-Benz", "mercedes-benz"])
                    .check_page(&*page)
                    .await?
                    .into_result()
                    .map(drop)
            }
        }
    }
}

pub(super) async fn open(
    page: &mut dyn PageDriver,
    config: &HarnessConfig,
    state: LoadState,
) -> SondarResult<Duration> {
    ReadinessGate::new(state)
        .with_timeout(config.navigation_timeout_ms)
        .navigate(&mut *page, &config.base_url)
        .await
}

pub(super) async fn open_with_consent(page: &mut dyn PageDriver, config: &HarnessConfig) -> SondarResult<()> {
    open(page, config, LoadState::Load).await?;
    InteractionAttempt::cookie_consent()
        .with_budget(CONSENT_BUDGET)
        .resolve(&mut *page)
        .await;
    Ok(())
}

/// Busy third-party traffic is tolerated; the assertion that follows decides.
pub(super) async fn network_idle(page: &dyn PageDriver) -> SondarResult<()> {
    ReadinessGate::new(LoadState::NetworkIdle)
        .wait_tolerant(page)
        .await
        .map(drop)
}

async fn wait_visible(page: &dyn PageDriver, selector: &Selector, timeout: Duration) -> SondarResult<()> {
    tokio::time::timeout(timeout, poll_visible(page, selector))
        .await
        .map_err(|_| {
            SondarError::assertion(format!(
                "{selector} not visible within {} ms",
                timeout.as_millis()
            ))
        })?
}

async fn poll_visible(page: &dyn PageDriver, selector: &Selector) -> SondarResult<()> {
    while !page.is_visible(selector).await? {
        tokio::time::sleep(VISIBILITY_POLL).await;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::Scenario;
    use crate::pages::ScriptedLauncher;
    use sondar::{
        ConsoleMessage, MockDriver, MockElement, MockTransport, Outcome, ScenarioResult,
        ScenarioRunner,
    };

    type Script = fn(Viewport) -> MockDriver;

    const HOME: &str = "<html><nav>Fahrzeuge</nav><img src=\"/a.jpg\">\
        <footer>Impressum · Datenschutz · © Mercedes-Benz AG</footer></html>";

    fn homepage(_: Viewport) -> MockDriver {
        MockDriver::new()
            .with_title("Mercedes-Benz Deutschland")
            .with_markup(HOME)
            .with_element(MockElement::new(NAVIGATION_SELECTOR))
            .with_element(MockElement::new("img[src]").with_count(12))
            .with_element(
                MockElement::new("button:has-text(\"Alle akzeptieren\")")
                    .appearing_after(Duration::from_millis(800))
                    .dismissable(),
            )
            .with_console(ConsoleMessage::error("Failed to load resource: 404"))
    }

    fn maintenance(_: Viewport) -> MockDriver {
        MockDriver::new()
            .with_title("Willkommen")
            .with_markup("<html><body>Wartungsarbeiten</body></html>")
            .with_redirect("http://maintenance.example.net/")
    }

    async fn run(check: SiteCheck, script: Script) -> ScenarioResult {
        let config = HarnessConfig::default();
        let launcher = ScriptedLauncher::new(script);
        let http = MockTransport::new();
        let harness = Harness::new(&config, &launcher, &http);
        let scenario = Scenario::Site(check);
        ScenarioRunner::from_config(&config)
            .run(&scenario.name(), |ctx| {
                let harness = &harness;
                async move { scenario.execute(harness, &ctx).await }
            })
            .await
    }

    mod passing_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_every_check_passes_on_homepage() {
            for check in SiteCheck::ALL {
                let result = run(check, homepage).await;
                assert_eq!(
                    result.outcome,
                    Outcome::Pass,
                    "{} failed: {:?}",
                    check.slug(),
                    result.details
                );
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_load_time_metric_recorded() {
            let result = run(SiteCheck::LoadTime, homepage).await;
            assert!(result
                .artifacts
                .iter()
                .any(|a| matches!(a, Artifact::Metric { name, .. } if name == "load_time")));
        }

        #[tokio::test(start_paused = true)]
        async fn test_console_errors_attached() {
            let result = run(SiteCheck::ConsoleErrors, homepage).await;
            assert!(result.outcome.is_pass());
            assert!(result.artifacts.contains(&Artifact::ConsoleErrors {
                messages: vec!["Failed to load resource: 404".into()]
            }));
        }
    }

    mod failing_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_content_checks_fail_on_maintenance_page() {
            for check in [
                SiteCheck::HomepageLoads,
                SiteCheck::VehicleModels,
                SiteCheck::FooterPresent,
                SiteCheck::ImagesPresent,
                SiteCheck::HttpsUsed,
                SiteCheck::BrandingPresent,
                SiteCheck::MobileResponsive,
            ] {
                let result = run(check, maintenance).await;
                assert_eq!(result.outcome, Outcome::Fail, "{} should fail", check.slug());
                assert!(result.details.unwrap().starts_with("Assertion failed"));
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_navigation_not_visible_fails() {
            let result = run(SiteCheck::MainNavigation, maintenance).await;
            assert_eq!(result.outcome, Outcome::Fail);
            assert!(result.details.unwrap().contains("not visible"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_search_is_informational() {
            let result = run(SiteCheck::SearchPresent, maintenance).await;
            assert!(result.outcome.is_pass());
            assert!(result
                .artifacts
                .iter()
                .any(|a| matches!(a, Artifact::Note { text } if text.starts_with("search: none"))));
        }

        #[tokio::test(start_paused = true)]
        async fn test_slow_page_exceeds_load_budget() {
            fn slow(_: Viewport) -> MockDriver {
                MockDriver::new().with_ready_after(Duration::from_secs(16), Duration::from_secs(20))
            }
            let result = run(SiteCheck::LoadTime, slow).await;
            assert_eq!(result.outcome, Outcome::Fail);
        }
    }

    #[test]
    fn test_mobile_viewport_selected() {
        let config = HarnessConfig::default();
        assert_eq!(SiteCheck::MobileResponsive.viewport(&config), Viewport::MOBILE);
        assert_eq!(SiteCheck::LoadTime.viewport(&config), Viewport::DESKTOP_1080P);
    }
}
