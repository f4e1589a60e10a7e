//! ABOUTME: Acquisition boundary for live frame sources
//! ABOUTME: A missing frame is "no data this tick", not an error

use mc_core::Result;
use mc_vision::Frame;
use serde::{Deserialize, Serialize};

/// Device metadata queried once at startup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl SourceMetadata {
    /// Frame rate to derive tick counts from, preferring the device's own report
    pub fn effective_fps(&self, configured: f64) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            configured
        }
    }
}

/// Trait for live frame sources (webcams, capture devices, test scripts)
pub trait FrameSource: Send {
    /// Width, height, and frame rate reported by the device
    fn metadata(&self) -> SourceMetadata;

    /// Read the next frame; `Ok(None)` means nothing arrived this tick
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Release the device
    fn release(&mut self) -> Result<()>;
}
