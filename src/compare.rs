//! Deterministic pixel comparison between a baseline and an actual capture.
//!
//! The algorithm is symmetric (`compare(a, b)` and `compare(b, a)` agree) and
//! reproducible across runs: the per-pixel tolerance is a fixed constant, not
//! a tunable. Only the run-level threshold (the fraction of pixels allowed to
//! differ) is caller-controlled.

use std::io::Cursor;
use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VisionError, VisionResult};

/// Per-pixel distance above which a pixel counts as differing.
///
/// Distance is the maximum absolute per-channel delta. Zero requires exact
/// channel equality.
const PIXEL_TOLERANCE: u8 = 0;

/// Outcome of comparing one actual capture against its baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonOutcome {
    /// Whether the images match within the threshold
    #[serde(rename = "match")]
    pub matches: bool,

    /// Absolute count of differing pixels
    pub diff_pixels: u64,

    /// Differing pixels as a percentage of total pixels (0 - 100)
    pub diff_percentage: f64,

    /// Threshold the verdict was computed against (0.0 - 1.0)
    pub threshold: f64,

    /// Width of the compared area in pixels
    pub width: u32,

    /// Height of the compared area in pixels
    pub height: u32,
}

/// Compare two PNG-encoded screenshots.
///
/// Images of differing dimensions are immediately a non-match with
/// `diff_percentage = 100` and `diff_pixels` equal to the larger image's
/// pixel count; no pixel-level comparison is attempted. The threshold is
/// clamped into [0, 1].
pub fn compare(baseline: &[u8], actual: &[u8], threshold: f64) -> VisionResult<ComparisonOutcome> {
    let threshold = threshold.clamp(0.0, 1.0);
    let baseline = decode(baseline, "baseline")?;
    let actual = decode(actual, "actual")?;

    if baseline.dimensions() != actual.dimensions() {
        let baseline_pixels = u64::from(baseline.width()) * u64::from(baseline.height());
        let actual_pixels = u64::from(actual.width()) * u64::from(actual.height());
        let (width, height) = if baseline_pixels >= actual_pixels {
            baseline.dimensions()
        } else {
            actual.dimensions()
        };
        debug!(
            baseline = %format!("{}x{}", baseline.width(), baseline.height()),
            actual = %format!("{}x{}", actual.width(), actual.height()),
            "dimension mismatch, forcing non-match"
        );
        return Ok(ComparisonOutcome {
            matches: false,
            diff_pixels: baseline_pixels.max(actual_pixels),
            diff_percentage: 100.0,
            threshold,
            width,
            height,
        });
    }

    let (width, height) = baseline.dimensions();
    let total = u64::from(width) * u64::from(height);
    let diff_pixels = baseline
        .pixels()
        .zip(actual.pixels())
        .filter(|(a, b)| pixel_distance(a.0, b.0) > PIXEL_TOLERANCE)
        .count() as u64;

    let diff_percentage = if total == 0 {
        0.0
    } else {
        diff_pixels as f64 / total as f64 * 100.0
    };

    Ok(ComparisonOutcome {
        matches: diff_percentage <= threshold * 100.0,
        diff_pixels,
        diff_percentage,
        threshold,
        width,
        height,
    })
}

/// Render a visual diff artifact for operator inspection.
///
/// The actual capture is rendered as dimmed grayscale with differing pixels
/// highlighted in red. On dimension mismatch every pixel is highlighted.
pub fn write_diff_artifact(baseline: &[u8], actual: &[u8], path: &Path) -> VisionResult<()> {
    let baseline = decode(baseline, "baseline")?;
    let actual = decode(actual, "actual")?;

    let same_dimensions = baseline.dimensions() == actual.dimensions();
    let (width, height) = actual.dimensions();
    let mut artifact = RgbImage::new(width, height);

    for (x, y, pixel) in actual.enumerate_pixels() {
        let differs = !same_dimensions
            || pixel_distance(pixel.0, baseline.get_pixel(x, y).0) > PIXEL_TOLERANCE;
        let rendered = if differs {
            image::Rgb([255, 0, 0])
        } else {
            let gray = luma(pixel.0) / 3;
            image::Rgb([gray, gray, gray])
        };
        artifact.put_pixel(x, y, rendered);
    }

    let mut bytes = Vec::new();
    artifact
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| VisionError::Comparison(format!("diff encode: {}", e)))?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn decode(bytes: &[u8], role: &str) -> VisionResult<RgbImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| VisionError::Comparison(format!("failed to decode {} image: {}", role, e)))?;
    Ok(img.to_rgb8())
}

/// Maximum absolute per-channel delta between two pixels
fn pixel_distance(a: [u8; 3], b: [u8; 3]) -> u8 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x.abs_diff(y))
        .max()
        .unwrap_or(0)
}

/// Rec. 601 luma approximation, integer math
fn luma(p: [u8; 3]) -> u8 {
    ((u32::from(p[0]) * 299 + u32::from(p[1]) * 587 + u32::from(p[2]) * 114) / 1000) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::PixelCanvas;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        PixelCanvas::with_color(width, height, color).to_png().unwrap()
    }

    #[test]
    fn test_identity_matches_at_zero_threshold() {
        let png = solid(40, 30, [10, 120, 250]);
        let outcome = compare(&png, &png, 0.0).unwrap();

        assert!(outcome.matches);
        assert_eq!(outcome.diff_pixels, 0);
        assert!((outcome.diff_percentage - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_symmetry() {
        let mut canvas = PixelCanvas::with_color(50, 50, [0, 0, 0]);
        canvas.draw_rect(0, 0, 25, 50, [255, 255, 255]);
        let a = canvas.to_png().unwrap();
        let b = solid(50, 50, [0, 0, 0]);

        for threshold in [0.0, 0.3, 0.5, 1.0] {
            let ab = compare(&a, &b, threshold).unwrap();
            let ba = compare(&b, &a, threshold).unwrap();
            assert_eq!(ab.matches, ba.matches, "threshold {}", threshold);
            assert_eq!(ab.diff_pixels, ba.diff_pixels);
        }
    }

    #[test]
    fn test_dimension_mismatch_is_forced_non_match() {
        let small = solid(10, 10, [0, 0, 0]);
        let large = solid(20, 20, [0, 0, 0]);

        let outcome = compare(&small, &large, 1.0).unwrap();
        assert!(!outcome.matches);
        assert_eq!(outcome.diff_pixels, 400);
        assert!((outcome.diff_percentage - 100.0).abs() < f64::EPSILON);
        assert_eq!((outcome.width, outcome.height), (20, 20));
    }

    #[test]
    fn test_threshold_boundary() {
        // 5 of 100 pixels differ -> 5.0%
        let base = solid(10, 10, [0, 0, 0]);
        let mut canvas = PixelCanvas::with_color(10, 10, [0, 0, 0]);
        canvas.draw_rect(0, 0, 5, 1, [255, 255, 255]);
        let changed = canvas.to_png().unwrap();

        let outcome = compare(&base, &changed, 0.05).unwrap();
        assert!((outcome.diff_percentage - 5.0).abs() < f64::EPSILON);
        assert!(outcome.matches, "5% differing is within threshold 0.05");

        let outcome = compare(&base, &changed, 0.02).unwrap();
        assert!(!outcome.matches, "5% differing exceeds threshold 0.02");
    }

    #[test]
    fn test_threshold_one_always_matches() {
        let black = solid(8, 8, [0, 0, 0]);
        let white = solid(8, 8, [255, 255, 255]);

        let outcome = compare(&black, &white, 1.0).unwrap();
        assert!(outcome.matches);
        assert_eq!(outcome.diff_pixels, 64);
    }

    #[test]
    fn test_undecodable_input_is_comparison_error() {
        let png = solid(4, 4, [0, 0, 0]);
        let err = compare(b"not a png", &png, 0.0).unwrap_err();
        assert!(matches!(err, VisionError::Comparison(_)));
    }

    #[test]
    fn test_outcome_serde_uses_match_key() {
        let png = solid(4, 4, [9, 9, 9]);
        let outcome = compare(&png, &png, 0.1).unwrap();
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"match\":true"));
        assert!(json.contains("\"diffPixels\":0"));
    }

    #[test]
    fn test_diff_artifact_highlights_changes() {
        let dir = tempfile::TempDir::new().unwrap();
        let artifact_path = dir.path().join("diff.png");

        let base = solid(10, 10, [200, 200, 200]);
        let mut canvas = PixelCanvas::with_color(10, 10, [200, 200, 200]);
        canvas.draw_rect(2, 2, 3, 3, [0, 0, 255]);
        let changed = canvas.to_png().unwrap();

        write_diff_artifact(&base, &changed, &artifact_path).unwrap();

        let artifact = PixelCanvas::from_png_bytes(&std::fs::read(&artifact_path).unwrap()).unwrap();
        assert_eq!(artifact.get_pixel(3, 3), [255, 0, 0]);
        let corner = artifact.get_pixel(9, 9);
        assert_eq!(corner[0], corner[1]);
        assert_eq!(corner[1], corner[2]);
    }
}
