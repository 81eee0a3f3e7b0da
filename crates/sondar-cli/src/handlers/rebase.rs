//! Rebase command handler

use super::{load_config, runtime, transport};
use crate::catalog::{close_page, Harness, Scenario, VisualScenario};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use crate::pages::ChromiumLauncher;
use crate::RebaseArgs;
use sondar::visual::ManifestEntry;

/// Execute the rebase command
///
/// # Errors
///
/// Invalid configuration, an empty selection, or the first capture that
/// could not be stored.
pub fn execute_rebase(cli: &CliConfig, args: &RebaseArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    let targets = targets(args.filter.as_deref())?;

    let http = transport(&config, false)?;
    let pages = ChromiumLauncher::new(config.browser.clone());
    let harness = Harness::new(&config, &pages, http.as_ref());
    let entries = runtime()?.block_on(rebase_all(&harness, &targets))?;

    let reporter = ProgressReporter::new(cli.color.should_color(), cli.verbosity.is_quiet());
    for entry in &entries {
        reporter.info(&format!(
            "{} now at version {} ({}x{})",
            entry.key, entry.version, entry.width, entry.height
        ));
    }
    Ok(())
}

/// Visual scenarios whose name contains `filter`
///
/// # Errors
///
/// [`CliError::InvalidArgument`] when nothing matches.
pub fn targets(filter: Option<&str>) -> CliResult<Vec<VisualScenario>> {
    let targets: Vec<VisualScenario> = VisualScenario::ALL
        .into_iter()
        .filter(|v| filter.map_or(true, |f| Scenario::Visual(*v).name().contains(f)))
        .collect();
    if targets.is_empty() {
        return Err(CliError::invalid_argument(format!(
            "no visual scenario matches filter {:?}",
            filter.unwrap_or("")
        )));
    }
    Ok(targets)
}

/// Re-capture each target on a fresh page
///
/// # Errors
///
/// The first navigation, capture or storage failure.
pub async fn rebase_all(
    harness: &Harness<'_>,
    targets: &[VisualScenario],
) -> CliResult<Vec<ManifestEntry>> {
    let mut entries = Vec::with_capacity(targets.len());
    for &target in targets {
        let mut page = harness.pages.open(harness.config.viewport).await?;
        let outcome = target.rebase(page.as_mut(), harness).await;
        close_page(page.as_mut()).await;
        entries.push(outcome?);
    }
    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pages::ScriptedLauncher;
    use image::{Rgba, RgbaImage};
    use sondar::visual::encode_png;
    use sondar::{HarnessConfig, MockDriver, MockTransport, Viewport, VisualConfig};

    fn captured(_: Viewport) -> MockDriver {
        let png = encode_png(&RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]))).unwrap();
        VisualScenario::ALL
            .into_iter()
            .fold(MockDriver::new(), |d, v| d.with_screenshot(&v.region(), png.clone()))
    }

    #[test]
    fn test_targets_filter() {
        assert_eq!(targets(None).unwrap().len(), 3);
        assert_eq!(targets(Some("footer")).unwrap(), vec![VisualScenario::Footer]);
        assert!(targets(Some("nhtsa")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebase_twice_bumps_versions() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::default()
            .with_visual(VisualConfig::default().with_baseline_dir(dir.path()));
        let launcher = ScriptedLauncher::new(captured);
        let http = MockTransport::new();
        let harness = Harness::new(&config, &launcher, &http);

        let first = rebase_all(&harness, &VisualScenario::ALL).await.unwrap();
        assert!(first.iter().all(|e| e.version == 1));
        let second = rebase_all(&harness, &[VisualScenario::Header]).await.unwrap();
        assert_eq!(second[0].version, 2);
        assert_eq!(harness.visual.store().manifest().unwrap().entries.len(), 3);
    }
}
