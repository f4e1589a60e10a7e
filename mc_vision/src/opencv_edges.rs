//! ABOUTME: OpenCV-backed edge extraction using GaussianBlur and Canny
//! ABOUTME: Same threshold table as the native path, selected via EdgeBackend::OpenCv

use crate::{median_intensity, select_thresholds, EdgeMap, Frame};
use image::GrayImage;
use mc_core::{Error, Result};
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
};
use tracing::trace;

fn cv_err(context: &str) -> impl Fn(opencv::Error) -> Error + '_ {
    move |e| Error::External(format!("{}: {}", context, e))
}

/// Extract an edge map with OpenCV primitives
pub fn extract(frame: &Frame) -> Result<EdgeMap> {
    let (width, height) = frame.dimensions();
    let gray = frame.to_luma();

    let flat = Mat::from_slice(gray.as_raw()).map_err(cv_err("Failed to wrap frame"))?;
    let src = flat
        .reshape(1, height as i32)
        .map_err(cv_err("Failed to reshape frame"))?
        .try_clone()
        .map_err(cv_err("Failed to copy frame"))?;

    let mut blurred = Mat::default();
    imgproc::gaussian_blur_def(&src, &mut blurred, Size::new(5, 5), 0.0)
        .map_err(cv_err("Failed to blur frame"))?;

    let blurred_bytes = blurred
        .data_bytes()
        .map_err(cv_err("Failed to read blurred frame"))?
        .to_vec();
    let blurred_img = GrayImage::from_raw(width, height, blurred_bytes)
        .ok_or_else(|| Error::Validation("Blurred frame has unexpected size".to_string()))?;
    let median = median_intensity(&blurred_img);
    let thresholds = select_thresholds(median);

    let mut edges = Mat::default();
    imgproc::canny_def(
        &blurred,
        &mut edges,
        thresholds.low as f64,
        thresholds.high as f64,
    )
    .map_err(cv_err("Failed to run Canny"))?;

    trace!(median, backend = "opencv", "Extracted edges");

    let pixels = edges
        .data_bytes()
        .map_err(cv_err("Failed to read edge map"))?
        .to_vec();
    EdgeMap::new(width, height, pixels, median)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::*;

    #[test]
    fn test_opencv_uniform_frame_has_no_edges() {
        let edges = extract(&uniform_frame(40, 30, 128)).unwrap();
        assert_eq!(edges.edge_count(), 0);
    }

    #[test]
    fn test_opencv_checkerboard_has_edges() {
        let edges = extract(&checkerboard_frame(48, 32, 6, 30, 220)).unwrap();
        assert!(edges.edge_count() > 0);
    }
}
