//! Harness configuration.
//!
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration. Credentials are never part of the file: the API
//! section only names the environment variable holding the token.

use crate::driver::Viewport;
use crate::result::{SondarError, SondarResult};
use crate::visual::VisualConfig;
use crate::workflow::Credential;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default site under test
pub const DEFAULT_BASE_URL: &str = "https://www.mercedes-benz.de";

/// Default environment variable holding the API bearer token
pub const DEFAULT_TOKEN_ENV: &str = "SONDAR_API_TOKEN";

/// API workflow settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Environment variable holding the bearer token
    pub token_env: String,
    /// Per-request timeout
    pub request_timeout_ms: u64,
    /// User-Agent sent with every request
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            request_timeout_ms: 30_000,
            user_agent: "Sondar/1.0".to_string(),
        }
    }
}

impl ApiConfig {
    /// Set the token variable
    #[must_use]
    pub fn with_token_env(mut self, var: impl Into<String>) -> Self {
        self.token_env = var.into();
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    /// Set the User-Agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Credential resolving the configured variable
    #[must_use]
    pub fn credential(&self) -> Credential {
        Credential::env(self.token_env.clone())
    }

    /// Request timeout as Duration
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Browser launch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run without a window
    pub headless: bool,
    /// Chromium executable (auto-detected when unset)
    pub chromium_path: Option<PathBuf>,
    /// Keep the Chromium sandbox enabled
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set the Chromium executable
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Enable or disable the sandbox
    #[must_use]
    pub const fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }
}

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Site under test
    pub base_url: String,
    /// Desktop viewport
    pub viewport: Viewport,
    /// Viewport for responsive checks
    pub mobile_viewport: Viewport,
    /// Bound for single page actions
    pub action_timeout_ms: u64,
    /// Bound for navigation including readiness
    pub navigation_timeout_ms: u64,
    /// Bound for a whole scenario
    pub scenario_timeout_ms: u64,
    /// Re-runs of a scenario that did not pass
    pub retries: u32,
    /// Where reports are written
    pub output_dir: PathBuf,
    /// Visual regression settings
    pub visual: VisualConfig,
    /// API workflow settings
    pub api: ApiConfig,
    /// Browser settings
    pub browser: BrowserConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            viewport: Viewport::DESKTOP_1080P,
            mobile_viewport: Viewport::MOBILE,
            action_timeout_ms: 15_000,
            navigation_timeout_ms: 30_000,
            scenario_timeout_ms: 60_000,
            retries: 0,
            output_dir: PathBuf::from("sondar-report"),
            visual: VisualConfig::default(),
            api: ApiConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a YAML file
    ///
    /// # Errors
    ///
    /// [`SondarError::Config`] for unreadable or invalid files.
    pub fn load(path: &Path) -> SondarResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SondarError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate YAML
    ///
    /// # Errors
    ///
    /// [`SondarError::Config`] for malformed YAML or invalid values.
    pub fn from_yaml(yaml: &str) -> SondarResult<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml)
                .map_err(|e| SondarError::config(format!("invalid configuration: {e}")))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// [`SondarError::Config`] if serialization fails.
    pub fn to_yaml(&self) -> SondarResult<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| SondarError::config(format!("cannot serialize configuration: {e}")))
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// [`SondarError::Config`] naming the first invalid field.
    pub fn validate(&self) -> SondarResult<()> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(SondarError::config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        for (field, value) in [
            ("action_timeout_ms", self.action_timeout_ms),
            ("navigation_timeout_ms", self.navigation_timeout_ms),
            ("scenario_timeout_ms", self.scenario_timeout_ms),
            ("api.request_timeout_ms", self.api.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(SondarError::config(format!("{field} must be positive")));
            }
        }
        if !(0.0..=1.0).contains(&self.visual.default_tolerance) {
            return Err(SondarError::config(
                "visual.default_tolerance must be within [0, 1]",
            ));
        }
        if self.api.token_env.trim().is_empty() {
            return Err(SondarError::config("api.token_env must name a variable"));
        }
        if self.api.user_agent.trim().is_empty()
            || self.api.user_agent.chars().any(char::is_control)
        {
            return Err(SondarError::config(format!(
                "api.user_agent must be a single non-empty line, got {:?}",
                self.api.user_agent
            )));
        }
        Ok(())
    }

    /// Absolute URL for a path on the site under test
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the scenario timeout
    #[must_use]
    pub const fn with_scenario_timeout_ms(mut self, ms: u64) -> Self {
        self.scenario_timeout_ms = ms;
        self
    }

    /// Set the retry count
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the visual settings
    #[must_use]
    pub fn with_visual(mut self, visual: VisualConfig) -> Self {
        self.visual = visual;
        self
    }

    /// Set the API settings
    #[must_use]
    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    /// Set the browser settings
    #[must_use]
    pub fn with_browser(mut self, browser: BrowserConfig) -> Self {
        self.browser = browser;
        self
    }

    /// Action timeout as Duration
    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    mod defaults_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = HarnessConfig::default();
            assert_eq!(config.base_url, "https://www.mercedes-benz.de");
            assert_eq!(config.viewport, Viewport::new(1920, 1080));
            assert_eq!(config.mobile_viewport, Viewport::new(375, 667));
            assert_eq!(config.action_timeout_ms, 15_000);
            assert_eq!(config.navigation_timeout_ms, 30_000);
            assert_eq!(config.retries, 0);
            assert_eq!(config.visual.color_threshold, 10);
            assert_eq!(config.visual.baseline_dir, PathBuf::from("__baselines__"));
            assert_eq!(config.api.token_env, "SONDAR_API_TOKEN");
            assert!(config.browser.headless);
        }

        #[test]
        fn test_empty_yaml_is_default() {
            assert_eq!(HarnessConfig::from_yaml("").unwrap(), HarnessConfig::default());
        }

        #[test]
        fn test_url_join() {
            let config = HarnessConfig::default().with_base_url("https://example.de/");
            assert_eq!(config.url("/impressum"), "https://example.de/impressum");
        }
    }

    mod yaml_tests {
        use super::*;

        #[test]
        fn test_partial_yaml_overrides() {
            let yaml = r"
base_url: https://www.mercedes-benz.com
retries: 2
visual:
  default_tolerance: 0.05
api:
  token_env: GOREST_TOKEN
browser:
  headless: false
";
            let config = HarnessConfig::from_yaml(yaml).unwrap();
            assert_eq!(config.base_url, "https://www.mercedes-benz.com");
            assert_eq!(config.retries, 2);
            assert_eq!(config.visual.default_tolerance, 0.05);
            assert_eq!(config.visual.color_threshold, 10);
            assert_eq!(config.api.token_env, "GOREST_TOKEN");
            assert_eq!(config.api.user_agent, "Sondar/1.0");
            assert!(!config.browser.headless);
            assert_eq!(config.api.credential(), Credential::env("GOREST_TOKEN"));
        }

        #[test]
        fn test_round_trip_through_file() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("sondar.yaml");
            let config = HarnessConfig::default().with_retries(3);
            std::fs::write(&path, config.to_yaml().unwrap()).unwrap();
            assert_eq!(HarnessConfig::load(&path).unwrap(), config);
        }

        #[test]
        fn test_invalid_values_rejected() {
            assert!(HarnessConfig::from_yaml("base_url: ftp://x").is_err());
            assert!(HarnessConfig::from_yaml("scenario_timeout_ms: 0").is_err());
            assert!(HarnessConfig::from_yaml("visual:\n  default_tolerance: 1.5").is_err());
            assert!(HarnessConfig::from_yaml("retries: [").is_err());
        }

        #[test]
        fn test_user_agent_must_be_header_safe() {
            let err = HarnessConfig::from_yaml("api:\n  user_agent: \"Bad\\nAgent\"").unwrap_err();
            assert!(err.to_string().contains("api.user_agent"));
            assert!(HarnessConfig::from_yaml("api:\n  user_agent: \"  \"").is_err());
            assert!(HarnessConfig::from_yaml("api:\n  user_agent: Custom/2.0").is_ok());
        }

        #[test]
        fn test_missing_file() {
            let err = HarnessConfig::load(Path::new("/nonexistent/sondar.yaml")).unwrap_err();
            assert!(matches!(err, SondarError::Config { .. }));
        }
    }
}
