//! CLI configuration

use serde::{Deserialize, Serialize};

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - failures only
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// Map `-q` and the `-v` count to a level
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Default tracing filter when `RUST_LOG` is unset
    #[must_use]
    pub const fn default_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Log line format
    pub log_format: LogFormat,
    /// Stop the suite on the first non-passing scenario
    pub fail_fast: bool,
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set log format
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Set fail fast mode
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}
