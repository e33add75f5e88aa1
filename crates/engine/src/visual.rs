//! Visual regression testing with screenshot comparison

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::codecs::png::PngEncoder;
use image::{imageops, ColorType, ImageEncoder, Rgba, RgbaImage};
use locaudit_common::{PageTarget, VisualConfig, VisualDiffResult, VisualStatus, Viewport};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::baseline::key_stem;
use crate::error::{EngineError, EngineResult};

/// Color of differing pixels in the highlight panel
const HIGHLIGHT: [u8; 4] = [255, 0, 0, 255];

/// Canvas color behind panels of unequal height
const BACKGROUND: [u8; 4] = [32, 32, 32, 255];

/// An immutable captured screenshot
#[derive(Debug, Clone)]
pub struct Screenshot {
    image: Arc<RgbaImage>,
    url: String,
    viewport: Viewport,
    captured_at: DateTime<Utc>,
}

impl Screenshot {
    pub fn new(image: RgbaImage, target: &PageTarget, captured_at: DateTime<Utc>) -> Self {
        Self {
            image: Arc::new(image),
            url: target.url.clone(),
            viewport: target.viewport,
            captured_at,
        }
    }

    /// Decode a screenshot file
    pub fn open(
        path: &Path,
        target: &PageTarget,
        captured_at: Option<DateTime<Utc>>,
    ) -> EngineResult<Self> {
        let image = image::open(path)?.to_rgba8();
        let captured_at = match captured_at {
            Some(at) => at,
            None => fs::metadata(path)?.modified()?.into(),
        };
        Ok(Self::new(image, target, captured_at))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// SHA-256 over dimensions and raw RGBA pixels
    pub fn digest(&self) -> String {
        let (width, height) = self.dimensions();
        let mut hasher = Sha256::new();
        hasher.update(width.to_le_bytes());
        hasher.update(height.to_le_bytes());
        hasher.update(self.image.as_raw());
        hex::encode(hasher.finalize())
    }
}

/// Raw pixel comparison counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelDiff {
    pub differing: u64,
    pub total: u64,
}

impl PixelDiff {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.differing as f64 / self.total as f64
        }
    }
}

/// Count differing pixels of two same-sized images; `None` when sizes differ
pub fn diff_pixels(a: &RgbaImage, b: &RgbaImage, tolerance: u8) -> Option<PixelDiff> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let total = a.width() as u64 * a.height() as u64;
    if a.as_raw() == b.as_raw() {
        return Some(PixelDiff { differing: 0, total });
    }

    let differing = a
        .as_raw()
        .chunks_exact(4)
        .zip(b.as_raw().chunks_exact(4))
        .filter(|(pa, pb)| pixel_differs(pa, pb, tolerance))
        .count() as u64;

    Some(PixelDiff { differing, total })
}

/// Any channel differs by more than the noise tolerance
fn pixel_differs(a: &[u8], b: &[u8], tolerance: u8) -> bool {
    a.iter().zip(b).any(|(x, y)| x.abs_diff(*y) > tolerance)
}

/// Verdict plus the rendered artifact, if one is due
#[derive(Debug, Clone)]
pub struct VisualComparison {
    pub result: VisualDiffResult,
    pub artifact: Option<RgbaImage>,
}

/// Compare a capture to its baseline. An artifact is rendered only on failure.
pub fn compare(
    current: &Screenshot,
    baseline: Option<&Screenshot>,
    threshold: f64,
    tolerance: u8,
) -> VisualComparison {
    let (width, height) = current.dimensions();
    let current_pixels = width as u64 * height as u64;

    let Some(baseline) = baseline else {
        return VisualComparison {
            result: VisualDiffResult {
                baseline_exists: false,
                diff_ratio: None,
                diff_threshold: threshold,
                differing_pixels: 0,
                total_pixels: current_pixels,
                passed: true,
                status: VisualStatus::Passed,
                diff_artifact_path: None,
                baseline_path: None,
            },
            artifact: None,
        };
    };

    let (ratio, differing, total, status) =
        match diff_pixels(baseline.image(), current.image(), tolerance) {
            Some(diff) => {
                let ratio = diff.ratio();
                let status = if ratio <= threshold {
                    VisualStatus::Passed
                } else {
                    VisualStatus::Failed
                };
                (ratio, diff.differing, diff.total, status)
            }
            None => {
                let mismatch = EngineError::DimensionMismatch {
                    baseline: format_dims(baseline.dimensions()),
                    current: format_dims(current.dimensions()),
                };
                warn!("{} for {}", mismatch, current.url());
                (1.0, current_pixels, current_pixels, VisualStatus::DimensionMismatch)
            }
        };

    let passed = status == VisualStatus::Passed;
    let artifact = if passed {
        debug!("Screenshot for {} within threshold ({:.4})", current.url(), ratio);
        None
    } else {
        warn!(
            "Visual regression detected in '{}': {:.2}% pixels differ (threshold: {:.2}%)",
            current.url(),
            ratio * 100.0,
            threshold * 100.0
        );
        Some(render_artifact(baseline.image(), current.image(), tolerance))
    };

    VisualComparison {
        result: VisualDiffResult {
            baseline_exists: true,
            diff_ratio: Some(ratio),
            diff_threshold: threshold,
            differing_pixels: differing,
            total_pixels: total,
            passed,
            status,
            diff_artifact_path: None,
            baseline_path: None,
        },
        artifact,
    }
}

fn format_dims((width, height): (u32, u32)) -> String {
    format!("{}x{}", width, height)
}

/// Baseline | current | highlight, tiled horizontally
pub fn render_artifact(baseline: &RgbaImage, current: &RgbaImage, tolerance: u8) -> RgbaImage {
    let (bw, bh) = baseline.dimensions();
    let (cw, ch) = current.dimensions();
    let mut canvas = RgbaImage::from_pixel(bw + cw * 2, bh.max(ch), Rgba(BACKGROUND));

    let overlay = highlight(baseline, current, tolerance);
    imageops::replace(&mut canvas, baseline, 0, 0);
    imageops::replace(&mut canvas, current, bw as i64, 0);
    imageops::replace(&mut canvas, &overlay, (bw + cw) as i64, 0);
    canvas
}

/// Dimmed copy of current with differing pixels in the highlight color.
/// Pixels outside the baseline's bounds count as differing.
fn highlight(baseline: &RgbaImage, current: &RgbaImage, tolerance: u8) -> RgbaImage {
    let (cw, ch) = current.dimensions();
    let (bw, bh) = baseline.dimensions();
    let cur = current.as_raw();
    let base = baseline.as_raw();

    let mut out = Vec::with_capacity(cur.len());
    for y in 0..ch as usize {
        for x in 0..cw as usize {
            let i = (y * cw as usize + x) * 4;
            let px = &cur[i..i + 4];
            let differs = if x < bw as usize && y < bh as usize {
                let j = (y * bw as usize + x) * 4;
                pixel_differs(px, &base[j..j + 4], tolerance)
            } else {
                true
            };
            if differs {
                out.extend_from_slice(&HIGHLIGHT);
            } else {
                out.extend_from_slice(&[px[0] / 2, px[1] / 2, px[2] / 2, 255]);
            }
        }
    }

    RgbaImage::from_raw(cw, ch, out).unwrap_or_else(|| RgbaImage::new(cw, ch))
}

/// Encode an image as PNG into a writer
pub fn write_png<W: Write>(writer: W, image: &RgbaImage) -> EngineResult<()> {
    let mut writer = BufWriter::new(writer);
    PngEncoder::new(&mut writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    writer.flush()?;
    Ok(())
}

/// Compares captures and persists diff artifacts
#[derive(Debug, Clone)]
pub struct VisualDiffer {
    diff_dir: PathBuf,
    threshold: f64,
    tolerance: u8,
}

impl VisualDiffer {
    pub fn new(config: &VisualConfig) -> Self {
        Self {
            diff_dir: config.diff_dir.clone(),
            threshold: config.diff_threshold,
            tolerance: config.channel_tolerance,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn compare(&self, current: &Screenshot, baseline: Option<&Screenshot>) -> VisualComparison {
        compare(current, baseline, self.threshold, self.tolerance)
    }

    pub fn artifact_path(&self, key: &PageTarget) -> PathBuf {
        self.diff_dir.join(format!("{}-diff.png", key_stem(key)))
    }

    /// Write an artifact atomically, replacing any previous one for the key
    pub fn write_artifact(&self, key: &PageTarget, artifact: &RgbaImage) -> EngineResult<PathBuf> {
        let path = self.artifact_path(key);
        let to_error = |reason: String| EngineError::ArtifactWrite {
            path: path.display().to_string(),
            reason,
        };

        fs::create_dir_all(&self.diff_dir).map_err(|e| to_error(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(&self.diff_dir).map_err(|e| to_error(e.to_string()))?;
        write_png(tmp.as_file_mut(), artifact).map_err(|e| to_error(e.to_string()))?;
        tmp.persist(&path).map_err(|e| to_error(e.error.to_string()))?;

        info!("Diff artifact written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(rgba))
    }

    fn shot(image: RgbaImage) -> Screenshot {
        let target = PageTarget::new("https://example.com/", Viewport::new(image.width(), image.height()));
        Screenshot::new(image, &target, Utc::now())
    }

    #[test]
    fn test_identical_images_pass_without_artifact() {
        let current = shot(solid(64, 48, [10, 20, 30, 255]));
        let baseline = current.clone();
        let cmp = compare(&current, Some(&baseline), 0.02, 5);
        assert_eq!(cmp.result.diff_ratio, Some(0.0));
        assert!(cmp.result.passed);
        assert_eq!(cmp.result.status, VisualStatus::Passed);
        assert!(cmp.artifact.is_none());
    }

    #[test]
    fn test_dimension_mismatch_is_full_mismatch() {
        let baseline = shot(solid(1440, 900, [255, 255, 255, 255]));
        let current = shot(solid(1440, 901, [255, 255, 255, 255]));
        let cmp = compare(&current, Some(&baseline), 0.02, 5);
        assert_eq!(cmp.result.diff_ratio, Some(1.0));
        assert!(!cmp.result.passed);
        assert_eq!(cmp.result.status, VisualStatus::DimensionMismatch);
        let artifact = cmp.artifact.unwrap();
        assert_eq!(artifact.dimensions(), (1440 * 3, 901));
    }

    #[test]
    fn test_noise_within_tolerance_is_ignored() {
        let baseline = shot(solid(10, 10, [100, 100, 100, 255]));
        let current = shot(solid(10, 10, [104, 97, 100, 255]));
        let cmp = compare(&current, Some(&baseline), 0.0, 5);
        assert_eq!(cmp.result.differing_pixels, 0);
        assert!(cmp.result.passed);
    }

    #[test]
    fn test_changed_region_fails_with_three_panels() {
        let baseline_img = solid(10, 10, [200, 200, 200, 255]);
        let mut current_img = baseline_img.clone();
        for x in 0..10 {
            current_img.put_pixel(x, 0, Rgba([0, 0, 0, 255]));
        }
        let cmp = compare(&shot(current_img), Some(&shot(baseline_img)), 0.02, 5);

        assert_eq!(cmp.result.differing_pixels, 10);
        assert_eq!(cmp.result.total_pixels, 100);
        assert_eq!(cmp.result.diff_ratio, Some(0.1));
        assert_eq!(cmp.result.status, VisualStatus::Failed);

        let artifact = cmp.artifact.unwrap();
        assert_eq!(artifact.dimensions(), (30, 10));
        assert_eq!(artifact.get_pixel(0, 0), &Rgba([200, 200, 200, 255]));
        assert_eq!(artifact.get_pixel(10, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(artifact.get_pixel(20, 0), &Rgba(HIGHLIGHT));
        assert_eq!(artifact.get_pixel(20, 5), &Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn test_small_change_under_threshold_passes() {
        let baseline_img = solid(100, 100, [0, 0, 0, 255]);
        let mut current_img = baseline_img.clone();
        current_img.put_pixel(50, 50, Rgba([255, 255, 255, 255]));
        let cmp = compare(&shot(current_img), Some(&shot(baseline_img)), 0.02, 5);
        assert_eq!(cmp.result.differing_pixels, 1);
        assert!(cmp.result.passed);
        assert!(cmp.artifact.is_none());
    }

    #[test]
    fn test_missing_baseline_passes() {
        let cmp = compare(&shot(solid(4, 4, [1, 2, 3, 255])), None, 0.02, 5);
        assert!(!cmp.result.baseline_exists);
        assert_eq!(cmp.result.diff_ratio, None);
        assert!(cmp.result.passed);
        assert!(cmp.artifact.is_none());
    }

    #[test]
    fn test_write_artifact_roundtrips_png() {
        let tmp = TempDir::new().unwrap();
        let differ = VisualDiffer::new(&VisualConfig {
            diff_dir: tmp.path().join("diffs"),
            ..VisualConfig::default()
        });
        let target = PageTarget::new("https://example.com/a?b=c", Viewport::default());
        let path = differ.write_artifact(&target, &solid(3, 2, [9, 9, 9, 255])).unwrap();

        assert!(path.ends_with(format!("{}-diff.png", key_stem(&target))));
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(1, 1), &Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn test_digest_depends_on_pixels() {
        let a = shot(solid(2, 2, [0, 0, 0, 255]));
        let b = shot(solid(2, 2, [0, 0, 1, 255]));
        assert_eq!(a.digest(), a.clone().digest());
        assert_ne!(a.digest(), b.digest());
    }
}
