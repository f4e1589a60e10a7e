//! ABOUTME: Motion-triggered recording built on edge-based motion scores
//! ABOUTME: Lookback buffer, segment writer boundary, controller, and capture driver

pub mod buffer;
pub mod controller;
pub mod driver;
pub mod source;
pub mod writer;

pub use buffer::{BufferedFrame, RollingBuffer};
pub use controller::{
    ControllerConfig, ControllerState, RecordingController, RecordingSession, SessionEnd,
    SessionSummary, Step,
};
pub use driver::{Recorder, RunSummary};
pub use source::{FrameSource, SourceMetadata};
pub use writer::{segment_path, SegmentHandle, SegmentRequest, SegmentSink, SegmentWriter};
