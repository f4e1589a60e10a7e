//! ABOUTME: Segment writer boundary between the controller and the persistence sink
//! ABOUTME: Guarantees every opened segment is closed exactly once, on every exit path

use mc_core::{Error, Result};
use mc_vision::Frame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Parameters for opening one output segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRequest {
    pub path: PathBuf,
    /// Four-character codec tag, e.g. `mp4v`
    pub fourcc: String,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl SegmentRequest {
    /// Reject requests no encoder could honour
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Validation(format!(
                "Segment dimensions {}x{} are invalid",
                self.width, self.height
            )));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(Error::Validation(format!(
                "Segment frame rate {} is invalid",
                self.fps
            )));
        }
        if self.fourcc.chars().count() != 4 {
            return Err(Error::Config(format!(
                "Codec tag '{}' is not four characters",
                self.fourcc
            )));
        }
        Ok(())
    }
}

/// An open output file accepting frames in call order
pub trait SegmentHandle: Send {
    /// Append one frame
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and finalize the container
    fn close(self: Box<Self>) -> Result<()>;
}

/// Persistence collaborator that opens segment files
pub trait SegmentSink: Send {
    /// Open a new segment; fails when the path is not writable or the request is invalid
    fn open(&mut self, request: &SegmentRequest) -> Result<Box<dyn SegmentHandle>>;
}

/// Open segment with frame accounting and guaranteed close
pub struct SegmentWriter {
    request: SegmentRequest,
    handle: Option<Box<dyn SegmentHandle>>,
    frames_written: u64,
}

impl SegmentWriter {
    /// Open a segment through `sink`
    pub fn open(sink: &mut dyn SegmentSink, request: SegmentRequest) -> Result<Self> {
        request.validate()?;
        let handle = sink.open(&request)?;
        debug!(path = %request.path.display(), "Segment opened");
        Ok(Self {
            request,
            handle: Some(handle),
            frames_written: 0,
        })
    }

    /// Append a frame; its size must match the segment
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.request.width, self.request.height) {
            return Err(Error::Validation(format!(
                "Frame is {}x{} but segment {} is {}x{}",
                frame.width(),
                frame.height(),
                self.request.path.display(),
                self.request.width,
                self.request.height
            )));
        }

        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| Error::Encode("Segment already closed".to_string()))?;
        handle.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.request.path
    }

    pub fn request(&self) -> &SegmentRequest {
        &self.request
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Close the segment, returning the number of frames written
    pub fn finish(mut self) -> Result<u64> {
        if let Some(handle) = self.handle.take() {
            handle.close()?;
            debug!(
                path = %self.request.path.display(),
                frames = self.frames_written,
                "Segment closed"
            );
        }
        Ok(self.frames_written)
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!(
                path = %self.request.path.display(),
                frames = self.frames_written,
                "Segment dropped without finish, closing"
            );
            if let Err(e) = handle.close() {
                error!(error = %e, path = %self.request.path.display(), "Failed to close segment during drop");
            }
        }
    }
}

/// Pick `<dir>/<label>.<ext>`, adding `_N` when that file already exists
pub fn segment_path(dir: &Path, label: &str, extension: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{}.{}", label, extension));
    let mut n = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}.{}", label, n, extension));
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_vision::utils::uniform_frame;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        frames: usize,
        closes: usize,
    }

    struct CountingHandle(Arc<Mutex<Log>>);

    impl SegmentHandle for CountingHandle {
        fn write(&mut self, _frame: &Frame) -> Result<()> {
            self.0.lock().unwrap().frames += 1;
            Ok(())
        }

        fn close(self: Box<Self>) -> Result<()> {
            self.0.lock().unwrap().closes += 1;
            Ok(())
        }
    }

    struct CountingSink(Arc<Mutex<Log>>);

    impl SegmentSink for CountingSink {
        fn open(&mut self, _request: &SegmentRequest) -> Result<Box<dyn SegmentHandle>> {
            Ok(Box::new(CountingHandle(Arc::clone(&self.0))))
        }
    }

    fn request(width: u32, height: u32) -> SegmentRequest {
        SegmentRequest {
            path: PathBuf::from("/tmp/segment.mp4"),
            fourcc: "mp4v".to_string(),
            fps: 15.0,
            width,
            height,
        }
    }

    #[test]
    fn test_finish_closes_once() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut sink = CountingSink(Arc::clone(&log));

        let mut writer = SegmentWriter::open(&mut sink, request(4, 4)).unwrap();
        writer.write(&uniform_frame(4, 4, 1)).unwrap();
        writer.write(&uniform_frame(4, 4, 2)).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let log = log.lock().unwrap();
        assert_eq!(log.frames, 2);
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn test_drop_closes_unfinished_segment() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut sink = CountingSink(Arc::clone(&log));

        {
            let mut writer = SegmentWriter::open(&mut sink, request(4, 4)).unwrap();
            writer.write(&uniform_frame(4, 4, 1)).unwrap();
        }

        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_wrong_size_frame_rejected() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut sink = CountingSink(Arc::clone(&log));

        let mut writer = SegmentWriter::open(&mut sink, request(4, 4)).unwrap();
        assert!(writer.write(&uniform_frame(5, 4, 1)).is_err());
        assert_eq!(writer.frames_written(), 0);
    }

    #[test]
    fn test_invalid_requests_rejected() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut sink = CountingSink(Arc::clone(&log));

        assert!(SegmentWriter::open(&mut sink, request(0, 4)).is_err());

        let mut bad_fps = request(4, 4);
        bad_fps.fps = 0.0;
        assert!(SegmentWriter::open(&mut sink, bad_fps).is_err());

        let mut bad_tag = request(4, 4);
        bad_tag.fourcc = "h264x".to_string();
        assert!(SegmentWriter::open(&mut sink, bad_tag).is_err());

        assert_eq!(log.lock().unwrap().closes, 0);
    }

    #[test]
    fn test_segment_path_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let label = "2024-01-02_03_04_05";

        let first = segment_path(dir.path(), label, "mp4");
        assert_eq!(first, dir.path().join("2024-01-02_03_04_05.mp4"));

        std::fs::write(&first, b"x").unwrap();
        let second = segment_path(dir.path(), label, "mp4");
        assert_eq!(second, dir.path().join("2024-01-02_03_04_05_1.mp4"));
    }
}
