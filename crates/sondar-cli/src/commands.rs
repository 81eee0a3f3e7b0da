//! CLI command definitions using clap

use crate::catalog::Suite;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Sondar: resilient site, visual regression and API workflow checks
#[derive(Parser, Debug)]
#[command(name = "sondar")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (failures and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenarios and write report.json and junit.xml
    Run(RunArgs),

    /// Re-capture visual baselines
    ///
    /// Replaces the stored baseline of every matching visual scenario and
    /// bumps its manifest version. Comparisons never do this on their own.
    Rebase(RebaseArgs),

    /// List the baseline manifest
    Baselines(BaselinesArgs),

    /// Print the effective configuration as YAML
    Config(ConfigArgs),

    /// List scenario names by suite
    List(ListArgs),
}

/// Suite selection
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SuiteArg {
    /// Site content and behaviour
    Site,
    /// Visual regression
    Visual,
    /// API workflows
    Api,
    /// Every suite
    #[default]
    All,
}

impl SuiteArg {
    /// Suites this selection covers
    #[must_use]
    pub fn suites(self) -> Vec<Suite> {
        match self {
            Self::Site => vec![Suite::Site],
            Self::Visual => vec![Suite::Visual],
            Self::Api => vec![Suite::Api],
            Self::All => Suite::ALL.to_vec(),
        }
    }

    /// Report label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Visual => "visual",
            Self::Api => "api",
            Self::All => "all",
        }
    }
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Suite to run
    #[arg(short, long, default_value = "all")]
    pub suite: SuiteArg,

    /// Only scenarios whose name contains this substring
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Configuration file (defaults to ./sondar.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output directory for report.json and junit.xml
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stop at the first scenario that does not pass
    #[arg(long)]
    pub fail_fast: bool,

    /// Re-runs of a non-passing scenario (overrides the config)
    #[arg(long)]
    pub retries: Option<u32>,
}

/// Arguments for the rebase command
#[derive(Parser, Debug)]
pub struct RebaseArgs {
    /// Only visual scenarios whose name contains this substring
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the baselines command
#[derive(Parser, Debug)]
pub struct BaselinesArgs {
    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the manifest as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Suite to list
    #[arg(short, long, default_value = "all")]
    pub suite: SuiteArg,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for crate::config::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}
