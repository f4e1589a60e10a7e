//! ABOUTME: Edge extraction and rolling-baseline motion scoring for live frames
//! ABOUTME: Pure-Rust Canny pipeline with optional OpenCV acceleration

use serde::{Deserialize, Serialize};

pub mod canny;
pub mod edges;
pub mod frame;
pub mod motion;
#[cfg(feature = "heavy_opencv")]
pub mod opencv_edges;

pub use edges::{
    gaussian_blur_5x5, median_intensity, select_thresholds, EdgeExtractor, ThresholdPair,
};
pub use frame::{EdgeMap, Frame};
pub use motion::{EdgeAccumulator, MotionEstimator, MotionScore, DEFAULT_RECENT_FRAMES};

// Re-export image types for benchmarks and adapters
pub use image;

/// Available edge detection implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeBackend {
    /// Pure-Rust blur and Canny
    #[default]
    Native,
    /// OpenCV GaussianBlur and Canny (requires heavy_opencv feature)
    OpenCv,
}

/// Synthetic frames for tests and benchmarks
pub mod utils {
    use crate::Frame;
    use image::{Rgb, RgbImage};

    /// Frame of a single gray level
    pub fn uniform_frame(width: u32, height: u32, level: u8) -> Frame {
        let img = RgbImage::from_pixel(width, height, Rgb([level, level, level]));
        Frame::from_image(img).expect("synthetic frame has non-zero size")
    }

    /// Frame with a filled rectangle on a flat background
    #[allow(clippy::too_many_arguments)]
    pub fn frame_with_block(
        width: u32,
        height: u32,
        block_x: u32,
        block_y: u32,
        block_width: u32,
        block_height: u32,
        background: u8,
        foreground: u8,
    ) -> Frame {
        let mut img = RgbImage::from_pixel(width, height, Rgb([background; 3]));
        for y in block_y..(block_y + block_height).min(height) {
            for x in block_x..(block_x + block_width).min(width) {
                img.put_pixel(x, y, Rgb([foreground; 3]));
            }
        }
        Frame::from_image(img).expect("synthetic frame has non-zero size")
    }

    /// Checkerboard with square cells, dense in edges
    pub fn checkerboard_frame(width: u32, height: u32, cell: u32, dark: u8, light: u8) -> Frame {
        let cell = cell.max(1);
        let img = RgbImage::from_fn(width, height, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Rgb([dark; 3])
            } else {
                Rgb([light; 3])
            }
        });
        Frame::from_image(img).expect("synthetic frame has non-zero size")
    }
}
