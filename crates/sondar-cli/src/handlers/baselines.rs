//! Baselines command handler

use super::load_config;
use crate::error::CliResult;
use crate::BaselinesArgs;
use sondar::visual::BaselineManifest;
use sondar::{BaselineStore, SondarError};
use std::fmt::Write as _;

/// Execute the baselines command
///
/// # Errors
///
/// Unreadable configuration or manifest.
pub fn execute_baselines(args: &BaselinesArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    let store = BaselineStore::new(config.visual.baseline_dir.clone());
    print!("{}", render_baselines(&store, &store.manifest()?, args.json)?);
    Ok(())
}

/// Manifest as a table, or as JSON
///
/// # Errors
///
/// JSON serialization failure.
pub fn render_baselines(
    store: &BaselineStore,
    manifest: &BaselineManifest,
    json: bool,
) -> CliResult<String> {
    if json {
        let mut out = serde_json::to_string_pretty(manifest).map_err(SondarError::from)?;
        out.push('\n');
        return Ok(out);
    }
    if manifest.entries.is_empty() {
        return Ok(format!("no baselines in {}\n", store.root().display()));
    }
    let mut out = String::new();
    for (id, entry) in &manifest.entries {
        let _ = writeln!(
            out,
            "{id:<28} v{:<3} {:>5}x{:<5} tolerance {:.2}  {}  {}",
            entry.version,
            entry.width,
            entry.height,
            entry.tolerance,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            &entry.sha256[..12.min(entry.sha256.len())],
        );
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use sondar::visual::encode_png;
    use sondar::BaselineKey;

    #[test]
    fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(dir.path());
        let out = render_baselines(&store, &store.manifest().unwrap(), false).unwrap();
        assert!(out.starts_with("no baselines in"));
    }

    #[test]
    fn test_table_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = BaselineStore::new(dir.path());
        let png = encode_png(&RgbaImage::from_pixel(8, 4, Rgba([0, 0, 0, 255]))).unwrap();
        store
            .create(&BaselineKey::new("visual-header", "header"), &png, 0.0)
            .unwrap();
        let manifest = store.manifest().unwrap();

        let table = render_baselines(&store, &manifest, false).unwrap();
        assert!(table.contains("visual-header/header"));
        assert!(table.contains("v1"));
        assert!(table.contains("8x4"));

        let json = render_baselines(&store, &manifest, true).unwrap();
        assert!(json.contains("\"version\": 1"));
    }
}
