//! List command handler

use crate::catalog::{select, Suite};
use crate::error::CliResult;
use crate::ListArgs;
use serde::Serialize;
use sondar::SondarError;
use std::fmt::Write as _;

#[derive(Debug, Serialize)]
struct ListEntry {
    name: String,
    suite: Suite,
    description: &'static str,
}

/// Execute the list command
///
/// # Errors
///
/// JSON serialization failure.
pub fn execute_list(args: &ListArgs) -> CliResult<()> {
    print!("{}", render_list(&args.suite.suites(), args.json)?);
    Ok(())
}

/// Scenario names grouped by suite, or a JSON array
///
/// # Errors
///
/// JSON serialization failure.
pub fn render_list(suites: &[Suite], json: bool) -> CliResult<String> {
    let scenarios = select(suites, None);
    if json {
        let entries: Vec<ListEntry> = scenarios
            .iter()
            .map(|s| ListEntry {
                name: s.name(),
                suite: s.suite(),
                description: s.description(),
            })
            .collect();
        let mut out = serde_json::to_string_pretty(&entries).map_err(SondarError::from)?;
        out.push('\n');
        return Ok(out);
    }

    let mut out = String::new();
    for suite in suites {
        let members: Vec<_> = scenarios.iter().filter(|s| s.suite() == *suite).collect();
        let _ = writeln!(out, "{suite} ({})", members.len());
        for scenario in members {
            let _ = writeln!(out, "  {:<32} {}", scenario.name(), scenario.description());
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_text_listing_groups_by_suite() {
        let out = render_list(&Suite::ALL, false).unwrap();
        assert!(out.starts_with("site (11)\n"));
        assert!(out.contains("visual (3)\n"));
        assert!(out.contains("api/gorest-registration"));
    }

    #[test]
    fn test_json_listing() {
        let out = render_list(&[Suite::Visual], true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["name"], "visual/homepage");
        assert_eq!(entries[0]["suite"], "visual");
    }
}
