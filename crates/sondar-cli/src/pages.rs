//! Page launching for browser scenarios.
//!
//! Every site and visual scenario gets a fresh page from a [`PageLauncher`],
//! so no two scenarios share browser state.

use async_trait::async_trait;
use sondar::{BrowserConfig, PageDriver, SondarResult, Viewport};

/// Source of fresh pages
#[async_trait]
pub trait PageLauncher: Send + Sync {
    /// Open a page at the given viewport
    async fn open(&self, viewport: Viewport) -> SondarResult<Box<dyn PageDriver>>;
}

/// Launches one Chromium instance per page
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    settings: BrowserConfig,
}

impl ChromiumLauncher {
    /// Create a launcher from browser settings
    #[must_use]
    pub const fn new(settings: BrowserConfig) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PageLauncher for ChromiumLauncher {
    async fn open(&self, viewport: Viewport) -> SondarResult<Box<dyn PageDriver>> {
        #[cfg(feature = "browser")]
        {
            let driver = sondar::ChromiumDriver::launch(&self.settings, viewport).await?;
            Ok(Box::new(driver))
        }
        #[cfg(not(feature = "browser"))]
        {
            Err(sondar::SondarError::config(format!(
                "built without the `browser` feature; cannot open a {viewport} page (headless = {})",
                self.settings.headless
            )))
        }
    }
}

/// Launcher backed by a closure, for scripted pages in tests
pub struct ScriptedLauncher<F>(F);

impl<F> ScriptedLauncher<F>
where
    F: Fn(Viewport) -> sondar::MockDriver + Send + Sync,
{
    /// Build pages with `script`
    pub const fn new(script: F) -> Self {
        Self(script)
    }
}

impl<F> std::fmt::Debug for ScriptedLauncher<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScriptedLauncher")
    }
}

#[async_trait]
impl<F> PageLauncher for ScriptedLauncher<F>
where
    F: Fn(Viewport) -> sondar::MockDriver + Send + Sync,
{
    async fn open(&self, viewport: Viewport) -> SondarResult<Box<dyn PageDriver>> {
        let mut page = (self.0)(viewport);
        page.set_viewport(viewport).await?;
        Ok(Box::new(page))
    }
}
