//! Chromium page driver over the Chrome `DevTools` Protocol.
//!
//! [`ChromiumDriver`] implements [`PageDriver`] with chromiumoxide. Element
//! queries run as JavaScript built from [`Selector`]; results are passed
//! back through `JSON.stringify` so `null` survives the CDP round trip.
//! Console output is captured by a script installed before the first
//! navigation.

use crate::config::BrowserConfig;
use crate::driver::{ConsoleLevel, ConsoleMessage, PageDriver, ReadyState, Region, Viewport};
use crate::locator::{BoundingBox, Selector};
use crate::result::{SondarError, SondarResult};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, CaptureScreenshotParams,
    Viewport as ClipRect,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

const CONSOLE_CAPTURE_SCRIPT: &str = r"
(() => {
  if (window.__SONDAR_CONSOLE__) return;
  const log = [];
  window.__SONDAR_CONSOLE__ = log;
  for (const level of ['log', 'info', 'debug', 'warn', 'error']) {
    const original = console[level];
    console[level] = function (...args) {
      try { log.push({ level, text: args.map(a => String(a)).join(' ') }); } catch (_) {}
      return original.apply(this, args);
    };
  }
  window.addEventListener('error', e => log.push({ level: 'error', text: String(e.message) }));
  window.addEventListener('unhandledrejection', e => log.push({ level: 'error', text: 'unhandled rejection: ' + String(e.reason) }));
})();
";

const PAGE_SIZE_QUERY: &str = "({ width: Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0), \
     height: Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0) })";

#[derive(Debug, Deserialize)]
struct PageSize {
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct RawConsoleEntry {
    level: String,
    text: String,
}

fn driver_err(e: impl std::fmt::Display) -> SondarError {
    SondarError::driver(e.to_string())
}

/// Real browser page
#[derive(Debug)]
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: tokio::task::JoinHandle<()>,
    viewport: Viewport,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page at `viewport`
    ///
    /// # Errors
    ///
    /// [`SondarError::Driver`] if Chromium cannot be launched or the page
    /// cannot be prepared.
    pub async fn launch(settings: &BrowserConfig, viewport: Viewport) -> SondarResult<Self> {
        let mut builder = CdpConfig::builder().window_size(viewport.width, viewport.height);
        if !settings.headless {
            builder = builder.with_head();
        }
        if !settings.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = settings.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(driver_err)?;

        let (browser, mut handler) = Browser::launch(cdp_config).await.map_err(driver_err)?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(driver_err)?;
        let capture = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(CONSOLE_CAPTURE_SCRIPT)
            .build()
            .map_err(driver_err)?;
        page.execute(capture).await.map_err(driver_err)?;

        let mut driver = Self {
            browser,
            page,
            handler,
            viewport,
        };
        driver.apply_viewport(viewport).await?;
        info!(%viewport, headless = settings.headless, "chromium launched");
        Ok(driver)
    }

    /// Current viewport
    #[must_use]
    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn apply_viewport(&mut self, viewport: Viewport) -> SondarResult<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(viewport.width))
            .height(i64::from(viewport.height))
            .device_scale_factor(1.0)
            .mobile(viewport.width < 768)
            .build()
            .map_err(driver_err)?;
        self.page.execute(params).await.map_err(driver_err)?;
        self.viewport = viewport;
        Ok(())
    }

    /// Evaluate `expr` and deserialize its JSON form
    async fn eval<T: DeserializeOwned>(&self, expr: &str) -> SondarResult<T> {
        let wrapped = format!("JSON.stringify(({expr}) ?? null)");
        let raw: String = self
            .page
            .evaluate(wrapped)
            .await
            .map_err(driver_err)?
            .into_value()
            .map_err(driver_err)?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn capture(&self, clip: Option<ClipRect>, beyond_viewport: bool) -> SondarResult<Vec<u8>> {
        let mut params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .capture_beyond_viewport(beyond_viewport);
        if let Some(clip) = clip {
            params = params.clip(clip);
        }
        let shot = self
            .page
            .execute(params.build())
            .await
            .map_err(|e| SondarError::Screenshot {
                message: e.to_string(),
            })?;
        base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(|e| SondarError::Screenshot {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> SondarResult<()> {
        debug!(url, "navigating");
        self.page
            .goto(url)
            .await
            .map_err(|e| SondarError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn count(&self, selector: &Selector) -> SondarResult<usize> {
        self.eval(&selector.to_count_query()).await
    }

    async fn is_visible(&self, selector: &Selector) -> SondarResult<bool> {
        self.eval(&selector.to_visible_query()).await
    }

    async fn click(&mut self, selector: &Selector) -> SondarResult<()> {
        let clicked: bool = self.eval(&selector.to_click_query()).await?;
        if clicked {
            Ok(())
        } else {
            Err(SondarError::driver(format!("no element matches {selector}")))
        }
    }

    async fn ready_state(&self) -> SondarResult<ReadyState> {
        let state: String = self.eval("document.readyState").await?;
        Ok(ReadyState::parse(&state))
    }

    async fn resource_count(&self) -> SondarResult<u64> {
        self.eval("performance.getEntriesByType('resource').length")
            .await
    }

    async fn screenshot(&self, region: &Region) -> SondarResult<Vec<u8>> {
        match region {
            Region::Viewport => self.capture(None, false).await,
            Region::FullPage => {
                let size: PageSize = self.eval(PAGE_SIZE_QUERY).await?;
                let clip = ClipRect {
                    x: 0.0,
                    y: 0.0,
                    width: size.width,
                    height: size.height,
                    scale: 1.0,
                };
                self.capture(Some(clip), true).await
            }
            Region::Element(selector) => {
                let bounds: Option<BoundingBox> = self.eval(&selector.to_bounds_query()).await?;
                let bounds = bounds
                    .filter(BoundingBox::is_visible)
                    .ok_or_else(|| SondarError::Screenshot {
                        message: format!("element {selector} is not rendered"),
                    })?;
                let clip = ClipRect {
                    x: bounds.x,
                    y: bounds.y,
                    width: bounds.width,
                    height: bounds.height,
                    scale: 1.0,
                };
                self.capture(Some(clip), true).await
            }
        }
    }

    async fn content(&self) -> SondarResult<String> {
        self.page.content().await.map_err(driver_err)
    }

    async fn current_url(&self) -> SondarResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(driver_err)?
            .unwrap_or_default())
    }

    async fn title(&self) -> SondarResult<String> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(driver_err)?
            .unwrap_or_default())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> SondarResult<()> {
        self.apply_viewport(viewport).await
    }

    async fn scroll_to_bottom(&mut self) -> SondarResult<()> {
        let _: bool = self
            .eval("(() => { window.scrollTo(0, document.body ? document.body.scrollHeight : 0); return true; })()")
            .await?;
        Ok(())
    }

    async fn console_messages(&self) -> SondarResult<Vec<ConsoleMessage>> {
        let raw: Vec<RawConsoleEntry> = self.eval("window.__SONDAR_CONSOLE__ || []").await?;
        Ok(raw
            .into_iter()
            .map(|entry| ConsoleMessage::new(ConsoleLevel::parse(&entry.level), entry.text))
            .collect())
    }

    async fn close(&mut self) -> SondarResult<()> {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "chromium did not close cleanly");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }
}
