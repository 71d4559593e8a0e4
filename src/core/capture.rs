//! Image acquisition boundary: file decoding, canonical resize and the
//! capture-quality gate applied before any extraction work.

use crate::common::config::CaptureConfig;
use crate::common::error::{BioGateError, Result};
use image::{imageops::FilterType, DynamicImage};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct BiometricCapture {
    config: CaptureConfig,
}

impl Default for BiometricCapture {
    fn default() -> Self {
        Self::new(&CaptureConfig::default())
    }
}

impl BiometricCapture {
    pub fn new(config: &CaptureConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Decode an image file and bring it to the canonical capture size.
    pub fn capture_from_file(&self, path: &Path) -> Result<DynamicImage> {
        if !path.exists() {
            return Err(BioGateError::InvalidInput(format!(
                "image file not found: {}",
                path.display()
            )));
        }

        let image = image::open(path)?;
        Ok(self.resize(image))
    }

    fn resize(&self, image: DynamicImage) -> DynamicImage {
        let (width, height) = (image.width(), image.height());
        if width == self.config.target_width && height == self.config.target_height {
            return image;
        }
        image.resize_exact(self.config.target_width, self.config.target_height, FilterType::Triangle)
    }

    /// Reject captures that are too small to carry signal, or whose mean
    /// brightness says the sensor was covered or blown out.
    pub fn validate_quality(&self, image: &DynamicImage) -> Result<()> {
        let (width, height) = (image.width(), image.height());

        if width < self.config.min_width || height < self.config.min_height {
            return Err(BioGateError::InvalidInput(format!(
                "image too small: {}x{} (minimum {}x{})",
                width, height, self.config.min_width, self.config.min_height
            )));
        }

        let rgb = image.to_rgb8();
        let mut sum_brightness = 0u64;
        for pixel in rgb.pixels() {
            let [r, g, b] = pixel.0;
            sum_brightness += ((r as u64) + (g as u64) + (b as u64)) / 3;
        }

        let avg_brightness = sum_brightness as f64 / (width as f64 * height as f64);
        if avg_brightness <= self.config.min_brightness || avg_brightness >= self.config.max_brightness {
            return Err(BioGateError::ImageQuality(format!(
                "mean brightness {:.1} outside ({:.0}, {:.0})",
                avg_brightness, self.config.min_brightness, self.config.max_brightness
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn flat(size: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_pixel(size, size, Luma([value])))
    }

    #[test]
    fn undersized_image_is_an_input_error() {
        let capture = BiometricCapture::default();
        let result = capture.validate_quality(&flat(64, 128));
        assert!(matches!(result, Err(BioGateError::InvalidInput(_))));
    }

    #[test]
    fn dark_and_blown_out_images_fail_the_quality_gate() {
        let capture = BiometricCapture::default();
        assert!(matches!(
            capture.validate_quality(&flat(128, 0)),
            Err(BioGateError::ImageQuality(_))
        ));
        assert!(matches!(
            capture.validate_quality(&flat(128, 250)),
            Err(BioGateError::ImageQuality(_))
        ));
    }

    #[test]
    fn normal_capture_passes_validation() {
        let capture = BiometricCapture::default();
        assert!(capture.validate_quality(&flat(128, 128)).is_ok());
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let capture = BiometricCapture::default();
        let result = capture.capture_from_file(Path::new("/nonexistent/image.png"));
        assert!(matches!(result, Err(BioGateError::InvalidInput(_))));
    }
}
