//! ABOUTME: Brightness-adaptive edge extraction for incoming frames
//! ABOUTME: Grayscale, fixed 5x5 blur, median-driven Canny thresholds

use crate::{canny::canny, EdgeBackend, EdgeMap, Frame};
use image::GrayImage;
use mc_core::Result;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Binomial 5-tap kernel, sums to 16 per axis
const BLUR_KERNEL: [u32; 5] = [1, 4, 6, 4, 1];

/// Canny hysteresis thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    /// Edge-linking sensitivity
    pub low: f32,
    /// Strong-edge acceptance
    pub high: f32,
}

impl ThresholdPair {
    pub const fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }
}

/// Pick Canny thresholds from the median brightness of a blurred frame
///
/// # Examples
///
/// ```
/// use mc_vision::{select_thresholds, ThresholdPair};
///
/// assert_eq!(select_thresholds(4.9), ThresholdPair::new(10.0, 30.0));
/// assert_eq!(select_thresholds(5.0), ThresholdPair::new(30.0, 80.0));
/// ```
pub fn select_thresholds(median: f64) -> ThresholdPair {
    if median < 5.0 {
        ThresholdPair::new(10.0, 30.0)
    } else if median < 50.0 {
        ThresholdPair::new(30.0, 80.0)
    } else if median < 100.0 {
        ThresholdPair::new(50.0, 150.0)
    } else {
        ThresholdPair::new(100.0, 200.0)
    }
}

/// Separable 5x5 Gaussian blur with reflect-101 borders
pub fn gaussian_blur_5x5(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let w = width as usize;
    let h = height as usize;
    let src = image.as_raw();

    let mut out = GrayImage::new(width, height);
    if w == 0 || h == 0 {
        return out;
    }

    let mut horizontal = vec![0u32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            horizontal[y * w + x] = BLUR_KERNEL
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * row[reflect_101(x as isize + k as isize - 2, w)] as u32)
                .sum();
        }
    }

    let dst: &mut [u8] = &mut out;
    for y in 0..h {
        for x in 0..w {
            let sum: u32 = BLUR_KERNEL
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    weight * horizontal[reflect_101(y as isize + k as isize - 2, h) * w + x]
                })
                .sum();
            dst[y * w + x] = ((sum + 128) >> 8) as u8;
        }
    }

    out
}

/// Mirror an out-of-range index without repeating the border sample
fn reflect_101(mut i: isize, len: usize) -> usize {
    let n = len as isize;
    if n == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Median intensity; even-sized images average the two middle values
pub fn median_intensity(image: &GrayImage) -> f64 {
    let pixels = image.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }

    let mut histogram = [0usize; 256];
    for &p in pixels {
        histogram[p as usize] += 1;
    }

    let n = pixels.len();
    let value_at_rank = |rank: usize| -> u8 {
        let mut seen = 0usize;
        for (value, &count) in histogram.iter().enumerate() {
            seen += count;
            if seen > rank {
                return value as u8;
            }
        }
        u8::MAX
    };

    if n % 2 == 1 {
        value_at_rank(n / 2) as f64
    } else {
        (value_at_rank(n / 2 - 1) as f64 + value_at_rank(n / 2) as f64) / 2.0
    }
}

/// Converts frames into binary edge maps
#[derive(Debug, Clone)]
pub struct EdgeExtractor {
    backend: EdgeBackend,
}

impl Default for EdgeExtractor {
    fn default() -> Self {
        Self::new(EdgeBackend::Native)
    }
}

impl EdgeExtractor {
    /// Create an extractor, falling back to the native backend when OpenCV is unavailable
    pub fn new(backend: EdgeBackend) -> Self {
        let backend = match backend {
            EdgeBackend::OpenCv if !cfg!(feature = "heavy_opencv") => {
                warn!("OpenCV edge backend requested but heavy_opencv feature not enabled, falling back to native");
                EdgeBackend::Native
            }
            other => other,
        };
        Self { backend }
    }

    /// Backend actually in use
    pub fn backend(&self) -> EdgeBackend {
        self.backend
    }

    /// Derive the edge map of a frame
    pub fn extract(&self, frame: &Frame) -> Result<EdgeMap> {
        match self.backend {
            #[cfg(feature = "heavy_opencv")]
            EdgeBackend::OpenCv => crate::opencv_edges::extract(frame),
            _ => Self::extract_native(frame),
        }
    }

    fn extract_native(frame: &Frame) -> Result<EdgeMap> {
        let blurred = gaussian_blur_5x5(&frame.to_luma());
        let median = median_intensity(&blurred);
        let thresholds = select_thresholds(median);

        let edges = canny(&blurred, thresholds.low, thresholds.high);
        trace!(
            median,
            low = thresholds.low,
            high = thresholds.high,
            "Extracted edges"
        );

        let (width, height) = edges.dimensions();
        EdgeMap::new(width, height, edges.into_raw(), median)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::*;
    use image::Luma;

    #[test]
    fn test_threshold_table() {
        assert_eq!(select_thresholds(0.0), ThresholdPair::new(10.0, 30.0));
        assert_eq!(select_thresholds(4.5), ThresholdPair::new(10.0, 30.0));
        assert_eq!(select_thresholds(20.0), ThresholdPair::new(30.0, 80.0));
        assert_eq!(select_thresholds(75.0), ThresholdPair::new(50.0, 150.0));
        assert_eq!(select_thresholds(255.0), ThresholdPair::new(100.0, 200.0));
    }

    #[test]
    fn test_threshold_boundaries_select_upper_bracket() {
        assert_eq!(select_thresholds(5.0), ThresholdPair::new(30.0, 80.0));
        assert_eq!(select_thresholds(50.0), ThresholdPair::new(50.0, 150.0));
        assert_eq!(select_thresholds(100.0), ThresholdPair::new(100.0, 200.0));
    }

    #[test]
    fn test_blur_preserves_uniform_image() {
        let img = GrayImage::from_pixel(9, 7, Luma([77]));
        let blurred = gaussian_blur_5x5(&img);
        assert!(blurred.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn test_blur_spreads_impulse() {
        let mut img = GrayImage::new(9, 9);
        img.put_pixel(4, 4, Luma([255]));
        let blurred = gaussian_blur_5x5(&img);

        // Center weight is 36/256
        assert_eq!(blurred.get_pixel(4, 4).0[0], ((255 * 36 + 128) >> 8) as u8);
        assert!(blurred.get_pixel(2, 4).0[0] > 0);
        assert_eq!(blurred.get_pixel(1, 4).0[0], 0);
    }

    #[test]
    fn test_blur_tiny_images() {
        let img = GrayImage::from_pixel(1, 1, Luma([10]));
        assert_eq!(gaussian_blur_5x5(&img).get_pixel(0, 0).0[0], 10);

        let img = GrayImage::from_pixel(2, 3, Luma([200]));
        assert!(gaussian_blur_5x5(&img).pixels().all(|p| p.0[0] == 200));
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 2), 1);
        assert_eq!(reflect_101(-2, 2), 0);
    }

    #[test]
    fn test_median_odd_and_even() {
        let odd = GrayImage::from_raw(3, 1, vec![9, 1, 5]).unwrap();
        assert_eq!(median_intensity(&odd), 5.0);

        let even = GrayImage::from_raw(4, 1, vec![10, 1, 4, 200]).unwrap();
        assert_eq!(median_intensity(&even), 7.0);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let extractor = EdgeExtractor::default();
        let frame = checkerboard_frame(48, 32, 6, 30, 220);

        let first = extractor.extract(&frame).unwrap();
        let second = extractor.extract(&frame).unwrap();
        assert_eq!(first, second);
        assert!(first.edge_count() > 0);
    }

    #[test]
    fn test_extract_uniform_frame_has_no_edges() {
        let extractor = EdgeExtractor::default();
        let edges = extractor.extract(&uniform_frame(40, 30, 128)).unwrap();
        assert_eq!(edges.edge_count(), 0);
        assert_eq!(edges.brightness(), 128.0);
        assert_eq!((edges.width(), edges.height()), (40, 30));
    }

    #[test]
    fn test_extract_dark_scene_uses_sensitive_thresholds() {
        // Median 2 selects (10, 30); the blurred step peaks near 96, below the bright bracket
        let frame = frame_with_block(40, 40, 15, 15, 10, 10, 2, 40);
        let edges = EdgeExtractor::default().extract(&frame).unwrap();
        assert!(edges.brightness() < 5.0);
        assert!(edges.edge_count() > 0);
    }

    #[test]
    fn test_opencv_request_falls_back_without_feature() {
        let extractor = EdgeExtractor::new(EdgeBackend::OpenCv);
        if cfg!(feature = "heavy_opencv") {
            assert_eq!(extractor.backend(), EdgeBackend::OpenCv);
        } else {
            assert_eq!(extractor.backend(), EdgeBackend::Native);
        }
    }
}
