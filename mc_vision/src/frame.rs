//! ABOUTME: Raw video frames and the binary edge maps derived from them
//! ABOUTME: Frames share pixel storage so the lookback buffer and writer can both hold one

use image::{GrayImage, RgbImage};
use mc_core::{Error, Result};
use std::sync::Arc;

/// Bytes per RGB pixel
pub const CHANNELS: usize = 3;

/// Immutable 8-bit RGB frame
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
}

impl Frame {
    /// Wrap raw interleaved RGB bytes, rejecting empty or mis-sized buffers
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Validation(format!(
                "Frame has empty dimensions {}x{}",
                width, height
            )));
        }

        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(Error::Validation(format!(
                "Frame buffer holds {} bytes, expected {} for {}x{} RGB",
                data.len(),
                expected,
                width,
                height
            )));
        }

        let image = RgbImage::from_raw(width, height, data).ok_or_else(|| {
            Error::Validation("Invalid frame data dimensions".to_string())
        })?;

        Ok(Self {
            image: Arc::new(image),
        })
    }

    /// Wrap an existing image
    pub fn from_image(image: RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::Validation(format!(
                "Frame has empty dimensions {}x{}",
                width, height
            )));
        }
        Ok(Self {
            image: Arc::new(image),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Interleaved RGB bytes, row-major
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Single-channel intensity version of this frame
    pub fn to_luma(&self) -> GrayImage {
        image::imageops::grayscale(self.image.as_ref())
    }

    /// Whether both handles share the same pixel storage
    pub fn shares_storage(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.shares_storage(other)
            || (self.dimensions() == other.dimensions() && self.as_raw() == other.as_raw())
    }
}

/// Binary (0/255) edge map, flattened row-major
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    brightness: f64,
}

impl EdgeMap {
    /// Build an edge map; `brightness` is the blurred median intensity of the source frame
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, brightness: f64) -> Result<Self> {
        if pixels.len() != width as usize * height as usize {
            return Err(Error::Validation(format!(
                "Edge map holds {} pixels, expected {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            brightness,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Number of pixels in the map
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Median intensity of the blurred source frame
    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    /// Number of edge pixels
    pub fn edge_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p != 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_raw() {
        let frame = Frame::from_raw(4, 2, vec![7u8; 4 * 2 * 3]).unwrap();
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(frame.as_raw().len(), 24);
    }

    #[test]
    fn test_frame_rejects_wrong_length() {
        let result = Frame::from_raw(4, 2, vec![0u8; 10]);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_frame_rejects_empty() {
        assert!(Frame::from_raw(0, 2, Vec::new()).is_err());
        assert!(Frame::from_image(RgbImage::new(0, 0)).is_err());
    }

    #[test]
    fn test_frame_clone_shares_storage() {
        let frame = Frame::from_raw(2, 2, vec![1u8; 12]).unwrap();
        let copy = frame.clone();
        assert!(frame.shares_storage(&copy));

        let other = Frame::from_raw(2, 2, vec![1u8; 12]).unwrap();
        assert!(!frame.shares_storage(&other));
        assert_eq!(frame, other);
    }

    #[test]
    fn test_to_luma_uniform() {
        let frame = Frame::from_raw(3, 3, vec![120u8; 27]).unwrap();
        let gray = frame.to_luma();
        assert!(gray.pixels().all(|p| p.0[0] == 120));
    }

    #[test]
    fn test_edge_map_counts() {
        let map = EdgeMap::new(2, 2, vec![0, 255, 255, 0], 42.0).unwrap();
        assert_eq!(map.edge_count(), 2);
        assert_eq!(map.len(), 4);
        assert_eq!(map.brightness(), 42.0);
    }

    #[test]
    fn test_edge_map_rejects_wrong_length() {
        assert!(EdgeMap::new(2, 2, vec![0; 3], 0.0).is_err());
    }
}
