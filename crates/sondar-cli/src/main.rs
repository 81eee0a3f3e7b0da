//! Sondar CLI: resilient web and API verification
//!
//! ## Usage
//!
//! ```bash
//! sondar list                              # Scenario catalog
//! sondar run                               # Every suite
//! sondar run --suite api --filter gorest   # Subset
//! sondar rebase --filter header            # Replace a visual baseline
//! sondar baselines                         # Baseline manifest
//! sondar config                            # Effective configuration
//! ```

use clap::Parser;
use sondar_cli::{execute, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    match execute(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
