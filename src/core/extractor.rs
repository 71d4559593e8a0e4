//! Keypoint detection and descriptor computation. A corner-response scan
//! supplies the quality estimate and the serialized keypoint blob; the
//! descriptor itself is a grid-intensity vector over the processed image.

use crate::core::preprocess;
use crate::model::{BiometricTemplate, Modality};
use chrono::Utc;
use image::{DynamicImage, GrayImage};
use uuid::Uuid;

/// Fixed descriptor length. The 8x8 grid only ever populates the first 64
/// slots; the trailing half stays zero. Kept as-is so stored vectors remain
/// comparable across versions.
pub const VECTOR_LENGTH: usize = 128;

const WINDOW_HALF_SIZE: i64 = 5;
const SCAN_STRIDE: usize = 3;
const HARRIS_K: f64 = 0.04;
const RESPONSE_THRESHOLD: f64 = 100_000.0;
const MAX_KEYPOINTS: usize = 100;
const GRID_SIZE: usize = 8;

#[derive(Debug, Clone)]
pub struct FeaturePoint {
    pub x: u32,
    pub y: u32,
    pub orientation: f64,
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Derive a template from a captured image. Never fails: a degenerate
    /// image yields an all-zero vector and a quality score of 0, which the
    /// enrollment quality gate rejects downstream.
    pub fn extract(&self, image: &DynamicImage, user_id: &str) -> BiometricTemplate {
        let processed = preprocess::preprocess(image);

        let keypoints = detect_keypoints(&processed);
        let feature_vector = compute_feature_vector(&processed);
        let quality_score = quality_score(&keypoints);
        let now = Utc::now();

        tracing::debug!(
            user_id,
            keypoints = keypoints.len(),
            quality = quality_score,
            "extracted biometric features"
        );

        BiometricTemplate {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            modality: Modality::Fingerprint,
            feature_vector,
            keypoint_blob: serialize_keypoints(&keypoints),
            quality_score,
            captured_at: now,
            updated_at: now,
            active: true,
        }
    }
}

/// Scan the image on a fixed stride, keeping window centers whose corner
/// response clears the threshold. Strongest first, capped.
fn detect_keypoints(image: &GrayImage) -> Vec<FeaturePoint> {
    let (width, height) = image.dimensions();
    let margin = WINDOW_HALF_SIZE as u32;

    let mut keypoints = Vec::new();
    if width <= 2 * margin || height <= 2 * margin {
        return keypoints;
    }

    for y in (margin..height - margin).step_by(SCAN_STRIDE) {
        for x in (margin..width - margin).step_by(SCAN_STRIDE) {
            let response = harris_response(image, x, y);
            if response > RESPONSE_THRESHOLD {
                keypoints.push(FeaturePoint {
                    x,
                    y,
                    orientation: orientation(image, x, y),
                    strength: response,
                });
            }
        }
    }

    keypoints.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(std::cmp::Ordering::Equal));
    keypoints.truncate(MAX_KEYPOINTS);
    keypoints
}

/// Corner response from the structure tensor accumulated over the window:
/// det - k * trace^2.
fn harris_response(image: &GrayImage, cx: u32, cy: u32) -> f64 {
    let mut ixx = 0.0f64;
    let mut iyy = 0.0f64;
    let mut ixy = 0.0f64;

    for_each_window_pixel(image, cx, cy, |px, py| {
        let gx = gradient_x(image, px, py);
        let gy = gradient_y(image, px, py);
        ixx += gx * gx;
        iyy += gy * gy;
        ixy += gx * gy;
    });

    let det = ixx * iyy - ixy * ixy;
    let trace = ixx + iyy;
    det - HARRIS_K * trace * trace
}

/// Dominant gradient direction over the window.
fn orientation(image: &GrayImage, cx: u32, cy: u32) -> f64 {
    let mut sum_gx = 0.0f64;
    let mut sum_gy = 0.0f64;

    for_each_window_pixel(image, cx, cy, |px, py| {
        sum_gx += gradient_x(image, px, py);
        sum_gy += gradient_y(image, px, py);
    });

    sum_gy.atan2(sum_gx)
}

fn for_each_window_pixel(image: &GrayImage, cx: u32, cy: u32, mut visit: impl FnMut(u32, u32)) {
    let (width, height) = image.dimensions();
    for dy in -WINDOW_HALF_SIZE..=WINDOW_HALF_SIZE {
        for dx in -WINDOW_HALF_SIZE..=WINDOW_HALF_SIZE {
            let px = (cx as i64 + dx).clamp(0, width as i64 - 1) as u32;
            let py = (cy as i64 + dy).clamp(0, height as i64 - 1) as u32;
            visit(px, py);
        }
    }
}

/// Central difference; zero at the image border.
fn gradient_x(image: &GrayImage, x: u32, y: u32) -> f64 {
    if x == 0 || x == image.width() - 1 {
        return 0.0;
    }
    let left = image.get_pixel(x - 1, y)[0] as f64;
    let right = image.get_pixel(x + 1, y)[0] as f64;
    (right - left) / 2.0
}

fn gradient_y(image: &GrayImage, x: u32, y: u32) -> f64 {
    if y == 0 || y == image.height() - 1 {
        return 0.0;
    }
    let top = image.get_pixel(x, y - 1)[0] as f64;
    let bottom = image.get_pixel(x, y + 1)[0] as f64;
    (bottom - top) / 2.0
}

/// Mean intensity per cell of an 8x8 grid, flattened into the fixed-length
/// vector and L2-normalized. A zero-norm vector is left as all zeros.
fn compute_feature_vector(image: &GrayImage) -> Vec<f64> {
    let mut vector = vec![0.0f64; VECTOR_LENGTH];
    let (width, height) = image.dimensions();

    let cell_width = width as usize / GRID_SIZE;
    let cell_height = height as usize / GRID_SIZE;

    for i in 0..GRID_SIZE {
        for j in 0..GRID_SIZE {
            let start_x = i * cell_width;
            let start_y = j * cell_height;

            let mut sum = 0.0f64;
            let mut count = 0usize;

            let mut y = start_y;
            while y < start_y + cell_height && y < height as usize {
                let mut x = start_x;
                while x < start_x + cell_width && x < width as usize {
                    sum += image.get_pixel(x as u32, y as u32)[0] as f64;
                    count += 1;
                    x += 1;
                }
                y += 1;
            }

            let index = i * GRID_SIZE + j;
            if index < VECTOR_LENGTH {
                vector[index] = if count > 0 { sum / count as f64 } else { 0.0 };
            }
        }
    }

    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn serialize_keypoints(keypoints: &[FeaturePoint]) -> String {
    let mut blob = String::new();
    for kp in keypoints {
        blob.push_str(&format!("{},{},{},{};", kp.x, kp.y, kp.orientation, kp.strength));
    }
    blob
}

/// Quality in [0, 100]: 40% keypoint count against the cap, 60% mean
/// response strength against a 1e6 ceiling. Zero when nothing was found.
fn quality_score(keypoints: &[FeaturePoint]) -> f64 {
    if keypoints.is_empty() {
        return 0.0;
    }

    let mean_strength =
        keypoints.iter().map(|kp| kp.strength).sum::<f64>() / keypoints.len() as f64;

    let quantity_score = (keypoints.len() as f64 / MAX_KEYPOINTS as f64).min(1.0);
    let strength_score = (mean_strength / 1_000_000.0).min(1.0);

    (quantity_score * 0.4 + strength_score * 0.6) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn checkerboard(size: u32, cell: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_fn(size, size, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Luma([230])
            } else {
                Luma([25])
            }
        }))
    }

    fn flat(size: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_pixel(size, size, Luma([value])))
    }

    #[test]
    fn textured_image_yields_normalized_vector() {
        let extractor = FeatureExtractor::new();
        let template = extractor.extract(&checkerboard(128, 8), "user-1");

        assert_eq!(template.feature_vector.len(), VECTOR_LENGTH);
        let norm: f64 = template.feature_vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9, "norm was {}", norm);
    }

    #[test]
    fn trailing_half_of_the_vector_stays_zero() {
        let extractor = FeatureExtractor::new();
        let template = extractor.extract(&checkerboard(128, 8), "user-1");

        for value in &template.feature_vector[GRID_SIZE * GRID_SIZE..] {
            assert_eq!(*value, 0.0);
        }
    }

    #[test]
    fn flat_image_has_no_keypoints_and_zero_quality() {
        let extractor = FeatureExtractor::new();
        let template = extractor.extract(&flat(128, 128), "user-1");

        assert_eq!(template.quality_score, 0.0);
        assert!(template.keypoint_blob.is_empty());
        // Mean intensity is still nonzero, so the descriptor normalizes
        assert!(template.feature_vector.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn black_image_degenerates_to_the_zero_vector() {
        let extractor = FeatureExtractor::new();
        let template = extractor.extract(&flat(128, 0), "user-1");

        assert!(template.feature_vector.iter().all(|v| *v == 0.0));
        assert_eq!(template.quality_score, 0.0);
    }

    #[test]
    fn keypoints_are_capped_and_sorted_by_strength() {
        let processed = preprocess::preprocess(&checkerboard(256, 8));
        let keypoints = detect_keypoints(&processed);

        assert!(!keypoints.is_empty());
        assert!(keypoints.len() <= MAX_KEYPOINTS);
        for pair in keypoints.windows(2) {
            assert!(pair[0].strength >= pair[1].strength);
        }
    }

    #[test]
    fn strong_texture_scores_high_quality() {
        let extractor = FeatureExtractor::new();
        let template = extractor.extract(&checkerboard(128, 8), "user-1");
        assert!(template.quality_score >= 75.0, "quality was {:.2}", template.quality_score);
    }

    #[test]
    fn tiny_image_produces_no_keypoints() {
        let processed = preprocess::preprocess(&checkerboard(10, 2));
        assert!(detect_keypoints(&processed).is_empty());
    }
}
