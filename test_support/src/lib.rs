//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Scripted frame sources and in-memory segment sinks for all crates

use mc_core::{Error, Result};
use mc_record::{FrameSource, SegmentHandle, SegmentRequest, SegmentSink, SourceMetadata};
use mc_vision::{
    utils::{checkerboard_frame, uniform_frame},
    Frame,
};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tokio_util::sync::CancellationToken;

/// Frame size used by the scripted scenes
pub const TEST_WIDTH: u32 = 32;
pub const TEST_HEIGHT: u32 = 24;

/// Helper for creating temporary directories in tests
pub fn temp_dir_path() -> std::path::PathBuf {
    std::env::temp_dir().join("motioncam-test")
}

/// Flat gray frame; every call allocates fresh storage
pub fn quiet_frame() -> Frame {
    uniform_frame(TEST_WIDTH, TEST_HEIGHT, 90)
}

/// Edge-dense frame that scores as motion against a quiet baseline
pub fn motion_frame() -> Frame {
    checkerboard_frame(TEST_WIDTH, TEST_HEIGHT, 4, 20, 230)
}

/// Quiet lead-in, a burst of motion, then quiet again
pub fn scene(quiet_before: usize, motion: usize, quiet_after: usize) -> Vec<Frame> {
    (0..quiet_before)
        .map(|_| quiet_frame())
        .chain((0..motion).map(|_| motion_frame()))
        .chain((0..quiet_after).map(|_| quiet_frame()))
        .collect()
}

/// One segment as seen by the sink
#[derive(Debug, Clone)]
pub struct RecordedSegment {
    pub request: SegmentRequest,
    pub frames: Vec<Frame>,
    pub closes: usize,
}

#[derive(Debug, Default)]
struct SinkState {
    segments: Vec<RecordedSegment>,
    fail_on_open: bool,
}

/// Segment sink keeping every written frame in memory
///
/// Clones share state, so a test can keep one and hand another to the controller.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose every open fails, as with an unwritable output directory
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.lock().fail_on_open = true;
        sink
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn segments(&self) -> Vec<RecordedSegment> {
        self.lock().segments.clone()
    }

    pub fn segment_count(&self) -> usize {
        self.lock().segments.len()
    }
}

impl SegmentSink for MemorySink {
    fn open(&mut self, request: &SegmentRequest) -> Result<Box<dyn SegmentHandle>> {
        let mut state = self.lock();
        if state.fail_on_open {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is not writable", request.path.display()),
            )));
        }
        state.segments.push(RecordedSegment {
            request: request.clone(),
            frames: Vec::new(),
            closes: 0,
        });
        Ok(Box::new(MemoryHandle {
            state: Arc::clone(&self.state),
            index: state.segments.len() - 1,
        }))
    }
}

struct MemoryHandle {
    state: Arc<Mutex<SinkState>>,
    index: usize,
}

impl MemoryHandle {
    fn with_segment<T>(&self, f: impl FnOnce(&mut RecordedSegment) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state.segments[self.index])
    }
}

impl SegmentHandle for MemoryHandle {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        self.with_segment(|segment| segment.frames.push(frame.clone()));
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.with_segment(|segment| segment.closes += 1);
        Ok(())
    }
}

/// Frame source replaying a fixed script; `None` entries are missed reads
///
/// Once the script runs out it cancels the attached token so the driver stops.
pub struct ScriptedSource {
    script: VecDeque<Option<Frame>>,
    metadata: SourceMetadata,
    cancel: Option<CancellationToken>,
    fail_when_exhausted: bool,
    releases: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Option<Frame>>, fps: f64) -> Self {
        Self {
            script: script.into_iter().collect(),
            metadata: SourceMetadata {
                width: TEST_WIDTH,
                height: TEST_HEIGHT,
                fps,
            },
            cancel: None,
            fail_when_exhausted: false,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script made only of delivered frames
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>, fps: f64) -> Self {
        Self::new(frames.into_iter().map(Some), fps)
    }

    /// Cancel `token` when the script is exhausted
    pub fn cancel_when_done(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Report a device error instead of cancelling when the script runs out
    pub fn fail_when_done(mut self) -> Self {
        self.fail_when_exhausted = true;
        self
    }

    /// Shared count of `release` calls
    pub fn releases(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }
}

impl FrameSource for ScriptedSource {
    fn metadata(&self) -> SourceMetadata {
        self.metadata
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        match self.script.pop_front() {
            Some(entry) => Ok(entry),
            None if self.fail_when_exhausted => {
                Err(Error::Capture("Scripted device disconnected".to_string()))
            }
            None => {
                if let Some(token) = &self.cancel {
                    token.cancel();
                }
                Ok(None)
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
