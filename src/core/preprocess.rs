//! Image normalization applied before feature extraction: grayscale
//! reduction, a fixed smoothing kernel and histogram equalization. All
//! operations are pure functions of the pixel data and succeed on any
//! decoded image.

use image::{DynamicImage, GrayImage, Luma};

/// Equal-weighted luminance reduction to a single channel.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut gray = GrayImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let value = (r as u16 + g as u16 + b as u16) / 3;
        gray.put_pixel(x, y, Luma([value as u8]));
    }

    gray
}

/// 3x3 approximate-Gaussian smoothing (1-2-1 / 2-4-2 / 1-2-1, divided by
/// 16). Edge pixels are left untouched rather than extrapolated.
pub fn gaussian_blur(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();

    if width < 3 || height < 3 {
        return out;
    }

    const KERNEL: [[u32; 3]; 3] = [[1, 2, 1], [2, 4, 2], [1, 2, 1]];

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut sum = 0u32;
            for (ky, row) in KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let px = x + kx as u32 - 1;
                    let py = y + ky as u32 - 1;
                    sum += weight * image.get_pixel(px, py)[0] as u32;
                }
            }
            out.put_pixel(x, y, Luma([(sum / 16) as u8]));
        }
    }

    out
}

/// Histogram equalization via a CDF remap scaled to [0, 255], using the
/// minimum nonzero CDF bucket as the floor. A uniform image is returned
/// unchanged (the remap denominator would be zero).
pub fn equalize_histogram(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let total = (width as u64) * (height as u64);
    if total == 0 {
        return image.clone();
    }

    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let mut cdf = [0u64; 256];
    let mut running = 0u64;
    for (i, count) in histogram.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if cdf_min == total {
        // Single uniform color
        return image.clone();
    }

    let scale = 255.0 / (total - cdf_min) as f64;
    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let remapped = ((cdf[pixel[0] as usize] - cdf_min) as f64 * scale) as i64;
        out.put_pixel(x, y, Luma([remapped.clamp(0, 255) as u8]));
    }

    out
}

/// The default pipeline: grayscale, smooth, equalize.
pub fn preprocess(image: &DynamicImage) -> GrayImage {
    let gray = to_grayscale(image);
    let smoothed = gaussian_blur(&gray);
    equalize_histogram(&smoothed)
}

/// Sobel gradient magnitude map. Diagnostics only, not part of the default
/// pipeline; border pixels stay zero.
pub fn sobel_edges(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut edges = GrayImage::new(width, height);

    if width < 3 || height < 3 {
        return edges;
    }

    const SOBEL_X: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
    const SOBEL_Y: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut gx = 0i32;
            let mut gy = 0i32;

            for ky in 0..3 {
                for kx in 0..3 {
                    let value = image.get_pixel(x + kx - 1, y + ky - 1)[0] as i32;
                    gx += value * SOBEL_X[ky as usize][kx as usize];
                    gy += value * SOBEL_Y[ky as usize][kx as usize];
                }
            }

            let magnitude = ((gx * gx + gy * gy) as f64).sqrt().min(255.0);
            edges.put_pixel(x, y, Luma([magnitude as u8]));
        }
    }

    edges
}

/// Global binarization at the threshold maximizing inter-class variance
/// (Otsu). Diagnostics only.
pub fn binarize(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let total = (width as u64) * (height as u64);
    if total == 0 {
        return image.clone();
    }

    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let weighted_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_background = 0.0f64;
    let mut weight_background = 0u64;
    let mut max_variance = 0.0f64;
    let mut threshold = 0u8;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count;
        if weight_background == 0 {
            continue;
        }

        let weight_foreground = total - weight_background;
        if weight_foreground == 0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background as f64;
        let mean_foreground = (weighted_sum - sum_background) / weight_foreground as f64;

        let diff = mean_background - mean_foreground;
        let variance = weight_background as f64 * weight_foreground as f64 * diff * diff;

        if variance > max_variance {
            max_variance = variance;
            threshold = t as u8;
        }
    }

    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let value = if pixel[0] > threshold { 255 } else { 0 };
        out.put_pixel(x, y, Luma([value]));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn gradient_image(width: u32, height: u32) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, _| Luma([(x * 2 % 200) as u8 + 20]))
    }

    #[test]
    fn grayscale_uses_equal_channel_weights() {
        let mut rgb = image::RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, image::Rgb([30, 60, 90]));
        rgb.put_pixel(1, 0, image::Rgb([255, 0, 0]));

        let gray = to_grayscale(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(gray.get_pixel(0, 0)[0], 60);
        assert_eq!(gray.get_pixel(1, 0)[0], 85);
    }

    #[test]
    fn blur_leaves_edge_pixels_untouched() {
        let source = gradient_image(16, 16);
        let blurred = gaussian_blur(&source);

        for x in 0..16 {
            assert_eq!(blurred.get_pixel(x, 0), source.get_pixel(x, 0));
            assert_eq!(blurred.get_pixel(x, 15), source.get_pixel(x, 15));
        }
        for y in 0..16 {
            assert_eq!(blurred.get_pixel(0, y), source.get_pixel(0, y));
            assert_eq!(blurred.get_pixel(15, y), source.get_pixel(15, y));
        }
    }

    #[test]
    fn blur_flattens_an_impulse() {
        let mut source = GrayImage::new(5, 5);
        source.put_pixel(2, 2, Luma([160]));

        let blurred = gaussian_blur(&source);
        assert_eq!(blurred.get_pixel(2, 2)[0], 40);
        assert_eq!(blurred.get_pixel(1, 2)[0], 20);
        assert_eq!(blurred.get_pixel(1, 1)[0], 10);
    }

    #[test]
    fn equalization_stretches_to_full_range() {
        let equalized = equalize_histogram(&gradient_image(64, 64));
        let max = equalized.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(max, 255);
    }

    #[test]
    fn equalization_leaves_uniform_image_unchanged() {
        let uniform: GrayImage = ImageBuffer::from_pixel(32, 32, Luma([128]));
        let equalized = equalize_histogram(&uniform);
        assert_eq!(equalized, uniform);
    }

    #[test]
    fn preprocess_output_is_histogram_stretched() {
        let source = DynamicImage::ImageLuma8(gradient_image(120, 120));
        let processed = preprocess(&source);
        let max = processed.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(max, 255);
    }

    #[test]
    fn sobel_borders_are_zero() {
        let edges = sobel_edges(&gradient_image(16, 16));
        assert_eq!(edges.get_pixel(0, 5)[0], 0);
        assert_eq!(edges.get_pixel(5, 0)[0], 0);
        assert_eq!(edges.get_pixel(15, 5)[0], 0);
        // Interior of a horizontal ramp has a horizontal response
        assert!(edges.get_pixel(5, 5)[0] > 0);
    }

    #[test]
    fn binarize_splits_a_bimodal_image() {
        let source: GrayImage =
            ImageBuffer::from_fn(32, 32, |x, _| if x < 16 { Luma([40]) } else { Luma([200]) });
        let binary = binarize(&source);

        assert_eq!(binary.get_pixel(0, 0)[0], 0);
        assert_eq!(binary.get_pixel(31, 0)[0], 255);
    }
}
