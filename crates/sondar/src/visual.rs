//! Visual regression against versioned baselines.
//!
//! Baselines live under `<baseline_dir>/<scenario>/<region>.png` next to a
//! `manifest.json` recording version, SHA-256, dimensions, tolerance and
//! creation time for every key. The first capture for a key becomes its
//! baseline; only an explicit [`VisualDiffEngine::rebase`] replaces it.
//!
//! Comparison counts pixels whose summed RGB distance exceeds the colour
//! threshold. Images of different sizes are compared on the union canvas,
//! where every pixel covered by only one image counts as differing, so
//! `diff(a, b)` and `diff(b, a)` always agree.

use crate::driver::{PageDriver, Region};
use crate::result::{SondarError, SondarResult};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView, ImageEncoder, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Manifest file name inside the baseline directory
pub const MANIFEST_FILE: &str = "manifest.json";

const HIGHLIGHT: Rgba<u8> = Rgba([255, 0, 0, 255]);
const SEPARATOR: Rgba<u8> = Rgba([255, 0, 255, 255]);

// =============================================================================
// CONFIG
// =============================================================================

/// Configuration for visual regression testing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// Directory holding baselines and the manifest
    pub baseline_dir: PathBuf,
    /// Directory receiving diff images on failure
    pub diff_dir: PathBuf,
    /// Per-pixel colour distance (sum of RGB deltas) treated as noise
    pub color_threshold: u32,
    /// Tolerance for checks that do not declare one
    pub default_tolerance: f64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("__baselines__"),
            diff_dir: PathBuf::from("__diffs__"),
            color_threshold: 10,
            default_tolerance: 0.0,
        }
    }
}

impl VisualConfig {
    /// Set the baseline directory
    #[must_use]
    pub fn with_baseline_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.baseline_dir = dir.into();
        self
    }

    /// Set the diff directory
    #[must_use]
    pub fn with_diff_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diff_dir = dir.into();
        self
    }

    /// Set the colour threshold
    #[must_use]
    pub const fn with_color_threshold(mut self, threshold: u32) -> Self {
        self.color_threshold = threshold;
        self
    }

    /// Set the default tolerance
    #[must_use]
    pub const fn with_default_tolerance(mut self, tolerance: f64) -> Self {
        self.default_tolerance = tolerance;
        self
    }
}

// =============================================================================
// PIXEL COMPARISON
// =============================================================================

/// Raw result of comparing two images
#[derive(Debug, Clone)]
pub struct PixelDiff {
    /// Pixels over the colour threshold, plus non-overlapping pixels
    pub differing_pixels: u64,
    /// Pixels of the union canvas
    pub total_pixels: u64,
    /// Whether the two images had different dimensions
    pub dimensions_differ: bool,
    highlight: RgbaImage,
}

impl PixelDiff {
    /// Differing-pixel ratio in `[0, 1]`
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            self.differing_pixels as f64 / self.total_pixels as f64
        }
    }

    /// Highlight image over the union canvas (differences in red)
    #[must_use]
    pub const fn highlight(&self) -> &RgbaImage {
        &self.highlight
    }
}

/// Whether a ratio is within a tolerance (inclusive)
#[must_use]
pub fn within_tolerance(ratio: f64, tolerance: f64) -> bool {
    ratio <= tolerance
}

/// Compare two decoded images on their union canvas
#[must_use]
pub fn diff_images(a: &DynamicImage, b: &DynamicImage, color_threshold: u32) -> PixelDiff {
    let (aw, ah) = a.dimensions();
    let (bw, bh) = b.dimensions();
    let (width, height) = (aw.max(bw), ah.max(bh));
    let a = a.to_rgba8();
    let b = b.to_rgba8();

    let mut highlight = RgbaImage::new(width, height);
    let mut differing = 0u64;

    for y in 0..height {
        for x in 0..width {
            let pa = (x < aw && y < ah).then(|| *a.get_pixel(x, y));
            let pb = (x < bw && y < bh).then(|| *b.get_pixel(x, y));
            let out = match (pa, pb) {
                (Some(pa), Some(pb)) if pixel_diff(pa, pb) <= color_threshold => dim(pa),
                _ => {
                    differing += 1;
                    HIGHLIGHT
                }
            };
            highlight.put_pixel(x, y, out);
        }
    }

    PixelDiff {
        differing_pixels: differing,
        total_pixels: u64::from(width) * u64::from(height),
        dimensions_differ: (aw, ah) != (bw, bh),
        highlight,
    }
}

/// Decode two PNGs and compare them
///
/// # Errors
///
/// [`SondarError::ImageComparison`] if either image cannot be decoded.
pub fn compare_png(baseline: &[u8], actual: &[u8], color_threshold: u32) -> SondarResult<PixelDiff> {
    let baseline = decode(baseline, "baseline")?;
    let actual = decode(actual, "actual")?;
    Ok(diff_images(&baseline, &actual, color_threshold))
}

/// Sum of absolute RGB channel differences
fn pixel_diff(a: Rgba<u8>, b: Rgba<u8>) -> u32 {
    let Rgba([r1, g1, b1, _]) = a;
    let Rgba([r2, g2, b2, _]) = b;
    u32::from(r1.abs_diff(r2)) + u32::from(g1.abs_diff(g2)) + u32::from(b1.abs_diff(b2))
}

fn dim(p: Rgba<u8>) -> Rgba<u8> {
    let Rgba([r, g, b, _]) = p;
    Rgba([r / 3 + 85, g / 3 + 85, b / 3 + 85, 255])
}

fn decode(png: &[u8], which: &str) -> SondarResult<DynamicImage> {
    image::load_from_memory(png).map_err(|e| SondarError::ImageComparison {
        message: format!("Failed to decode {which} image: {e}"),
    })
}

/// Encode an RGBA image as PNG
///
/// # Errors
///
/// [`SondarError::ImageComparison`] if encoding fails.
pub fn encode_png(img: &RgbaImage) -> SondarResult<Vec<u8>> {
    let mut buffer = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buffer)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| SondarError::ImageComparison {
            message: format!("Failed to encode PNG: {e}"),
        })?;
    Ok(buffer)
}

/// Baseline | actual | highlight, separated by one-pixel magenta rules
fn side_by_side(baseline: &DynamicImage, actual: &DynamicImage, highlight: &RgbaImage) -> RgbaImage {
    let panels = [baseline.to_rgba8(), actual.to_rgba8(), highlight.clone()];
    let width = panels.iter().map(RgbaImage::width).sum::<u32>() + 2;
    let height = panels.iter().map(RgbaImage::height).max().unwrap_or(0);
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

    let mut offset = 0;
    for (i, panel) in panels.iter().enumerate() {
        if i > 0 {
            for y in 0..height {
                canvas.put_pixel(offset, y, SEPARATOR);
            }
            offset += 1;
        }
        for (x, y, p) in panel.enumerate_pixels() {
            canvas.put_pixel(offset + x, y, *p);
        }
        offset += panel.width();
    }
    canvas
}

// =============================================================================
// BASELINE STORE
// =============================================================================

/// Identifies a baseline: scenario name plus region name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BaselineKey {
    /// Scenario name
    pub scenario: String,
    /// Region name
    pub region: String,
}

impl BaselineKey {
    /// Create a key
    #[must_use]
    pub fn new(scenario: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            region: region.into(),
        }
    }

    /// Relative path of the baseline PNG
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(slug(&self.scenario)).join(format!("{}.png", slug(&self.region)))
    }

    /// Manifest key
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}/{}", slug(&self.scenario), slug(&self.region))
    }
}

impl std::fmt::Display for BaselineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id())
    }
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Manifest record for one baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Scenario and region
    pub key: BaselineKey,
    /// Starts at 1, incremented by every rebase
    pub version: u32,
    /// Hex SHA-256 of the PNG bytes
    pub sha256: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Maximum differing-pixel ratio that still passes
    pub tolerance: f64,
    /// When this version was captured
    pub created_at: DateTime<Utc>,
}

/// All baselines known to a store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineManifest {
    /// Entries keyed by [`BaselineKey::id`]
    pub entries: BTreeMap<String, ManifestEntry>,
}

/// Baseline PNGs plus their manifest on disk
#[derive(Debug, Clone)]
pub struct BaselineStore {
    root: PathBuf,
}

impl BaselineStore {
    /// Store rooted at a directory (created lazily)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a baseline PNG
    #[must_use]
    pub fn path_for(&self, key: &BaselineKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Read the manifest; a missing file is an empty manifest
    ///
    /// # Errors
    ///
    /// I/O or JSON errors for an unreadable manifest.
    pub fn manifest(&self) -> SondarResult<BaselineManifest> {
        let path = self.root.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(BaselineManifest::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save_manifest(&self, manifest: &BaselineManifest) -> SondarResult<()> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(self.root.join(MANIFEST_FILE), json)?;
        Ok(())
    }

    /// Load a baseline and its manifest entry
    ///
    /// A PNG without a manifest entry is adopted as version 1 with the
    /// supplied tolerance.
    ///
    /// # Errors
    ///
    /// I/O or manifest errors.
    pub fn load(
        &self,
        key: &BaselineKey,
        tolerance: f64,
    ) -> SondarResult<Option<(Vec<u8>, ManifestEntry)>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let png = fs::read(&path)?;
        let entry = match self.manifest()?.entries.remove(&key.id()) {
            Some(entry) => entry,
            None => {
                warn!(%key, "baseline has no manifest entry, adopting it");
                let dimensions = decode(&png, "baseline")?.dimensions();
                self.record(key, &png, dimensions, tolerance, 1)?
            }
        };
        Ok(Some((png, entry)))
    }

    /// Persist a new baseline as version 1
    ///
    /// # Errors
    ///
    /// Undecodable PNG or I/O failure.
    pub fn create(&self, key: &BaselineKey, png: &[u8], tolerance: f64) -> SondarResult<ManifestEntry> {
        let dimensions = decode(png, "baseline")?.dimensions();
        self.write(key, png)?;
        self.record(key, png, dimensions, tolerance, 1)
    }

    /// Replace a baseline, incrementing its version
    ///
    /// Keeps the previous tolerance unless one is given.
    ///
    /// # Errors
    ///
    /// Undecodable PNG or I/O failure.
    pub fn rebase(
        &self,
        key: &BaselineKey,
        png: &[u8],
        tolerance: Option<f64>,
        default_tolerance: f64,
    ) -> SondarResult<ManifestEntry> {
        let previous = self.manifest()?.entries.remove(&key.id());
        let version = previous.as_ref().map_or(1, |e| e.version + 1);
        let tolerance = tolerance
            .or_else(|| previous.as_ref().map(|e| e.tolerance))
            .unwrap_or(default_tolerance);
        let dimensions = decode(png, "baseline")?.dimensions();
        self.write(key, png)?;
        self.record(key, png, dimensions, tolerance, version)
    }

    fn write(&self, key: &BaselineKey, png: &[u8]) -> SondarResult<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, png)?;
        Ok(())
    }

    fn record(
        &self,
        key: &BaselineKey,
        png: &[u8],
        (width, height): (u32, u32),
        tolerance: f64,
        version: u32,
    ) -> SondarResult<ManifestEntry> {
        let entry = ManifestEntry {
            key: key.clone(),
            version,
            sha256: format!("{:x}", Sha256::digest(png)),
            width,
            height,
            tolerance,
            created_at: Utc::now(),
        };
        let mut manifest = self.manifest()?;
        manifest.entries.insert(key.id(), entry.clone());
        self.save_manifest(&manifest)?;
        Ok(entry)
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Outcome of a comparison against an existing baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Whether `ratio <= tolerance`
    pub passed: bool,
    /// Differing-pixel ratio
    pub ratio: f64,
    /// Tolerance applied (from the baseline's manifest entry)
    pub tolerance: f64,
    /// Differing pixel count
    pub differing_pixels: u64,
    /// Total pixel count of the union canvas
    pub total_pixels: u64,
    /// Baseline version compared against
    pub baseline_version: u32,
    /// Side-by-side diff image, written on failure
    pub diff_path: Option<PathBuf>,
    /// Actual capture, written on failure
    pub actual_path: Option<PathBuf>,
}

/// Result of a visual check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VisualOutcome {
    /// No baseline existed; the capture became version 1
    BaselineCreated {
        /// Where it was stored
        path: PathBuf,
    },
    /// Compared against the stored baseline
    Compared(DiffResult),
}

impl VisualOutcome {
    /// Fail on a comparison over tolerance
    ///
    /// # Errors
    ///
    /// [`SondarError::AssertionFailed`] citing the ratio and diff path.
    pub fn into_result(self) -> SondarResult<Self> {
        match &self {
            Self::Compared(diff) if !diff.passed => Err(SondarError::assertion(format!(
                "{:.4}% of pixels differ (tolerance {:.4}%), diff at {}",
                diff.ratio * 100.0,
                diff.tolerance * 100.0,
                diff.diff_path
                    .as_deref()
                    .map_or_else(|| "<none>".to_string(), |p| p.display().to_string())
            ))),
            _ => Ok(self),
        }
    }
}

/// A region of a scenario to compare
#[derive(Debug, Clone)]
pub struct VisualCheck {
    /// Baseline key
    pub key: BaselineKey,
    /// Region to capture
    pub region: Region,
    /// Tolerance for a newly created baseline
    pub tolerance: Option<f64>,
}

impl VisualCheck {
    /// Create a check
    #[must_use]
    pub fn new(scenario: impl Into<String>, region_name: impl Into<String>, region: Region) -> Self {
        Self {
            key: BaselineKey::new(scenario, region_name),
            region,
            tolerance: None,
        }
    }

    /// Set the tolerance
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
}

/// Captures regions and compares them to baselines
#[derive(Debug, Clone)]
pub struct VisualDiffEngine {
    config: VisualConfig,
    store: BaselineStore,
}

impl VisualDiffEngine {
    /// Create an engine
    #[must_use]
    pub fn new(config: VisualConfig) -> Self {
        let store = BaselineStore::new(config.baseline_dir.clone());
        Self { config, store }
    }

    /// Baseline store
    #[must_use]
    pub const fn store(&self) -> &BaselineStore {
        &self.store
    }

    /// Configuration
    #[must_use]
    pub const fn config(&self) -> &VisualConfig {
        &self.config
    }

    /// Capture a region and compare it to its baseline
    ///
    /// # Errors
    ///
    /// Screenshot, decode or I/O failures. A mismatch is a failing
    /// [`DiffResult`], not an error.
    pub async fn check<D>(&self, driver: &D, check: &VisualCheck) -> SondarResult<VisualOutcome>
    where
        D: PageDriver + ?Sized,
    {
        let png = driver.screenshot(&check.region).await?;
        self.compare_capture(check, &png)
    }

    /// Compare an existing capture to its baseline
    ///
    /// # Errors
    ///
    /// Decode or I/O failures.
    pub fn compare_capture(&self, check: &VisualCheck, png: &[u8]) -> SondarResult<VisualOutcome> {
        let tolerance = check.tolerance.unwrap_or(self.config.default_tolerance);
        let Some((baseline, entry)) = self.store.load(&check.key, tolerance)? else {
            let entry = self.store.create(&check.key, png, tolerance)?;
            let path = self.store.path_for(&check.key);
            info!(key = %check.key, width = entry.width, height = entry.height, "baseline created");
            return Ok(VisualOutcome::BaselineCreated { path });
        };

        let baseline_img = decode(&baseline, "baseline")?;
        let actual_img = decode(png, "actual")?;
        let diff = diff_images(&baseline_img, &actual_img, self.config.color_threshold);
        let ratio = diff.ratio();
        let passed = within_tolerance(ratio, entry.tolerance);
        debug!(key = %check.key, ratio, tolerance = entry.tolerance, passed, "visual comparison");

        let (diff_path, actual_path) = if passed {
            (None, None)
        } else {
            if diff.dimensions_differ {
                warn!(
                    key = %check.key,
                    baseline = ?baseline_img.dimensions(),
                    actual = ?actual_img.dimensions(),
                    "capture dimensions differ from baseline"
                );
            }
            let (d, a) = self.write_failure(&check.key, &baseline_img, &actual_img, &diff, png)?;
            (Some(d), Some(a))
        };

        Ok(VisualOutcome::Compared(DiffResult {
            passed,
            ratio,
            tolerance: entry.tolerance,
            differing_pixels: diff.differing_pixels,
            total_pixels: diff.total_pixels,
            baseline_version: entry.version,
            diff_path,
            actual_path,
        }))
    }

    /// Capture a region and replace its baseline
    ///
    /// # Errors
    ///
    /// Screenshot, decode or I/O failures.
    pub async fn rebase<D>(&self, driver: &D, check: &VisualCheck) -> SondarResult<ManifestEntry>
    where
        D: PageDriver + ?Sized,
    {
        let png = driver.screenshot(&check.region).await?;
        let entry = self
            .store
            .rebase(&check.key, &png, check.tolerance, self.config.default_tolerance)?;
        info!(key = %check.key, version = entry.version, "baseline rebased");
        Ok(entry)
    }

    fn write_failure(
        &self,
        key: &BaselineKey,
        baseline: &DynamicImage,
        actual: &DynamicImage,
        diff: &PixelDiff,
        actual_png: &[u8],
    ) -> SondarResult<(PathBuf, PathBuf)> {
        let dir = self.config.diff_dir.join(slug(&key.scenario));
        fs::create_dir_all(&dir)?;
        let region = slug(&key.region);
        let diff_path = dir.join(format!("{region}-diff.png"));
        let actual_path = dir.join(format!("{region}-actual.png"));
        fs::write(&diff_path, encode_png(&side_by_side(baseline, actual, diff.highlight()))?)?;
        fs::write(&actual_path, actual_png)?;
        Ok((diff_path, actual_path))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([color[0], color[1], color[2], 255]))
    }

    /// 10x10 white image with the first `n` pixels (row-major) black
    fn with_black_pixels(n: u32) -> RgbaImage {
        let mut img = solid(10, 10, [255, 255, 255]);
        for i in 0..n {
            img.put_pixel(i % 10, i / 10, Rgba([0, 0, 0, 255]));
        }
        img
    }

    fn engine(dir: &TempDir) -> VisualDiffEngine {
        VisualDiffEngine::new(
            VisualConfig::default()
                .with_baseline_dir(dir.path().join("baselines"))
                .with_diff_dir(dir.path().join("diffs")),
        )
    }

    mod pixel_tests {
        use super::*;

        #[test]
        fn test_identical_images() {
            let img = DynamicImage::ImageRgba8(solid(4, 4, [10, 20, 30]));
            let diff = diff_images(&img, &img, 10);
            assert_eq!(diff.differing_pixels, 0);
            assert_eq!(diff.total_pixels, 16);
            assert_eq!(diff.ratio(), 0.0);
        }

        #[test]
        fn test_color_threshold_ignores_noise() {
            let a = DynamicImage::ImageRgba8(solid(4, 4, [100, 100, 100]));
            let b = DynamicImage::ImageRgba8(solid(4, 4, [103, 103, 104]));
            assert_eq!(diff_images(&a, &b, 10).differing_pixels, 0);
            assert_eq!(diff_images(&a, &b, 9).differing_pixels, 16);
        }

        #[test]
        fn test_dimension_mismatch_uses_union_canvas() {
            let small = DynamicImage::ImageRgba8(solid(10, 10, [0, 0, 0]));
            let tall = DynamicImage::ImageRgba8(solid(10, 20, [0, 0, 0]));
            let diff = diff_images(&small, &tall, 10);
            assert!(diff.dimensions_differ);
            assert_eq!(diff.total_pixels, 200);
            assert_eq!(diff.differing_pixels, 100);
            assert_eq!(diff.ratio(), 0.5);
        }

        #[test]
        fn test_tolerance_boundary() {
            let a = DynamicImage::ImageRgba8(with_black_pixels(0));
            let b = DynamicImage::ImageRgba8(with_black_pixels(10));
            let ratio = diff_images(&a, &b, 10).ratio();
            assert!(within_tolerance(ratio, 0.10));
            assert!(!within_tolerance(0.100_000_1, 0.10));
        }

        #[test]
        fn test_compare_png_rejects_garbage() {
            let png = encode_png(&solid(2, 2, [0, 0, 0])).unwrap();
            assert!(matches!(
                compare_png(&png, b"not a png", 10),
                Err(SondarError::ImageComparison { .. })
            ));
        }

        proptest! {
            #[test]
            fn prop_ratio_symmetric(
                aw in 1u32..12, ah in 1u32..12, bw in 1u32..12, bh in 1u32..12,
                ca in any::<[u8; 3]>(), cb in any::<[u8; 3]>(), threshold in 0u32..40,
            ) {
                let a = DynamicImage::ImageRgba8(solid(aw, ah, ca));
                let b = DynamicImage::ImageRgba8(solid(bw, bh, cb));
                let ab = diff_images(&a, &b, threshold);
                let ba = diff_images(&b, &a, threshold);
                prop_assert_eq!(ab.differing_pixels, ba.differing_pixels);
                prop_assert_eq!(ab.ratio(), ba.ratio());
                prop_assert!(ab.ratio() >= 0.0 && ab.ratio() <= 1.0);
            }
        }
    }

    mod store_tests {
        use super::*;

        #[test]
        fn test_key_paths_are_slugged() {
            let key = BaselineKey::new("Homepage Full", "full-page");
            assert_eq!(key.id(), "homepage-full/full-page");
            assert_eq!(key.relative_path(), PathBuf::from("homepage-full/full-page.png"));
        }

        #[test]
        fn test_create_then_rebase_increments_version() {
            let dir = TempDir::new().unwrap();
            let store = BaselineStore::new(dir.path());
            let key = BaselineKey::new("header", "header");
            let v1 = store
                .create(&key, &encode_png(&solid(3, 2, [1, 2, 3])).unwrap(), 0.0)
                .unwrap();
            assert_eq!(v1.version, 1);
            assert_eq!((v1.width, v1.height), (3, 2));
            assert_eq!(v1.sha256.len(), 64);

            let v2 = store
                .rebase(&key, &encode_png(&solid(4, 4, [9, 9, 9])).unwrap(), None, 0.5)
                .unwrap();
            assert_eq!(v2.version, 2);
            assert_eq!(v2.tolerance, 0.0);
            assert_ne!(v1.sha256, v2.sha256);
            assert_eq!(store.manifest().unwrap().entries["header/header"].version, 2);
        }

        #[test]
        fn test_undecodable_capture_writes_nothing() {
            let dir = TempDir::new().unwrap();
            let store = BaselineStore::new(dir.path());
            let key = BaselineKey::new("header", "header");
            assert!(store.create(&key, b"not a png", 0.0).is_err());
            assert!(!store.path_for(&key).exists());
            assert!(store.manifest().unwrap().entries.is_empty());

            let good = encode_png(&solid(3, 2, [1, 2, 3])).unwrap();
            store.create(&key, &good, 0.0).unwrap();
            assert!(store.rebase(&key, b"not a png", None, 0.0).is_err());
            assert_eq!(fs::read(store.path_for(&key)).unwrap(), good);
            assert_eq!(store.manifest().unwrap().entries["header/header"].version, 1);
        }

        #[test]
        fn test_missing_manifest_is_empty() {
            let dir = TempDir::new().unwrap();
            let store = BaselineStore::new(dir.path().join("nothing"));
            assert!(store.manifest().unwrap().entries.is_empty());
            assert!(store.load(&BaselineKey::new("a", "b"), 0.0).unwrap().is_none());
        }

        #[test]
        fn test_orphan_png_is_adopted() {
            let dir = TempDir::new().unwrap();
            let store = BaselineStore::new(dir.path());
            let key = BaselineKey::new("footer", "footer");
            let path = store.path_for(&key);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, encode_png(&solid(2, 2, [0, 0, 0])).unwrap()).unwrap();
            let (_, entry) = store.load(&key, 0.25).unwrap().unwrap();
            assert_eq!(entry.version, 1);
            assert_eq!(entry.tolerance, 0.25);
        }
    }

    mod engine_tests {
        use super::*;

        #[test]
        fn test_first_capture_creates_baseline() {
            let dir = TempDir::new().unwrap();
            let engine = engine(&dir);
            let check = VisualCheck::new("homepage", "full-page", Region::FullPage).with_tolerance(0.1);
            let png = encode_png(&with_black_pixels(0)).unwrap();
            let outcome = engine.compare_capture(&check, &png).unwrap();
            assert!(matches!(outcome, VisualOutcome::BaselineCreated { .. }));
            assert!(engine.store().path_for(&check.key).exists());
        }

        #[test]
        fn test_tolerance_comes_from_baseline() {
            let dir = TempDir::new().unwrap();
            let engine = engine(&dir);
            let check = VisualCheck::new("homepage", "full-page", Region::FullPage).with_tolerance(0.1);
            engine
                .compare_capture(&check, &encode_png(&with_black_pixels(0)).unwrap())
                .unwrap();

            // A later check declaring a stricter tolerance still uses the stored one.
            let strict = check.clone().with_tolerance(0.0);
            let outcome = engine
                .compare_capture(&strict, &encode_png(&with_black_pixels(10)).unwrap())
                .unwrap();
            let VisualOutcome::Compared(diff) = outcome else {
                panic!("expected comparison");
            };
            assert!(diff.passed);
            assert_eq!(diff.ratio, 0.1);
            assert!(diff.diff_path.is_none());
        }

        #[test]
        fn test_failure_writes_side_by_side_diff() {
            let dir = TempDir::new().unwrap();
            let engine = engine(&dir);
            let check = VisualCheck::new("header", "header", Region::Viewport);
            engine
                .compare_capture(&check, &encode_png(&with_black_pixels(0)).unwrap())
                .unwrap();
            let outcome = engine
                .compare_capture(&check, &encode_png(&with_black_pixels(1)).unwrap())
                .unwrap();
            let VisualOutcome::Compared(diff) = outcome.clone() else {
                panic!("expected comparison");
            };
            assert!(!diff.passed);
            assert_eq!(diff.differing_pixels, 1);

            let diff_png = fs::read(diff.diff_path.unwrap()).unwrap();
            let img = image::load_from_memory(&diff_png).unwrap();
            assert_eq!(img.dimensions(), (32, 10));
            assert!(diff.actual_path.unwrap().exists());
            assert!(matches!(
                outcome.into_result(),
                Err(SondarError::AssertionFailed { .. })
            ));
        }

        #[tokio::test]
        async fn test_check_and_rebase_through_driver() {
            let dir = TempDir::new().unwrap();
            let engine = engine(&dir);
            let check = VisualCheck::new("homepage", "viewport", Region::Viewport);
            let driver = MockDriver::new()
                .with_screenshot(&Region::Viewport, encode_png(&solid(5, 5, [7, 7, 7])).unwrap());

            let first = engine.check(&driver, &check).await.unwrap();
            assert!(matches!(first, VisualOutcome::BaselineCreated { .. }));
            let second = engine.check(&driver, &check).await.unwrap();
            assert!(matches!(second, VisualOutcome::Compared(ref d) if d.passed && d.baseline_version == 1));

            let entry = engine.rebase(&driver, &check).await.unwrap();
            assert_eq!(entry.version, 2);
        }
    }
}
