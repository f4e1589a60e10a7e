//! ABOUTME: OpenCV videoio camera and segment writer
//! ABOUTME: Frames cross the boundary as RGB; OpenCV sees BGR

use crate::ffmpeg_sink::check_output_dir;
use mc_config::CaptureConfig;
use mc_core::{Error, Result};
use mc_record::{FrameSource, SegmentHandle, SegmentRequest, SegmentSink, SourceMetadata};
use mc_vision::Frame;
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

fn cv_err(context: &str) -> impl Fn(opencv::Error) -> Error + '_ {
    move |e| Error::External(format!("{}: {}", context, e))
}

/// Camera opened by index through OpenCV
pub struct OpenCvCamera {
    capture: VideoCapture,
    metadata: SourceMetadata,
    raw: Mat,
}

impl OpenCvCamera {
    /// Open `/dev/videoN` or a bare index `N`, requesting the configured size and rate
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let index = device_index(&config.device)?;
        let mut capture =
            VideoCapture::new(index, videoio::CAP_ANY).map_err(cv_err("Failed to open camera"))?;
        if !capture.is_opened().map_err(cv_err("Failed to query camera"))? {
            return Err(Error::Capture(format!("Camera {} could not be opened", index)));
        }

        // Requests are best effort; the device reports what it actually does
        let _ = capture.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64);
        let _ = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64);
        let _ = capture.set(videoio::CAP_PROP_FPS, config.fps);

        let width = capture
            .get(videoio::CAP_PROP_FRAME_WIDTH)
            .map_err(cv_err("Failed to read width"))? as u32;
        let height = capture
            .get(videoio::CAP_PROP_FRAME_HEIGHT)
            .map_err(cv_err("Failed to read height"))? as u32;
        let fps = capture
            .get(videoio::CAP_PROP_FPS)
            .map_err(cv_err("Failed to read fps"))?;

        info!(index, width, height, fps, "OpenCV camera opened");
        Ok(Self {
            capture,
            metadata: SourceMetadata { width, height, fps },
            raw: Mat::default(),
        })
    }
}

/// Parse `/dev/videoN` or `N` into a capture index
pub fn device_index(device: &str) -> Result<i32> {
    device
        .trim_start_matches("/dev/video")
        .parse()
        .map_err(|_| Error::Config(format!("Device '{}' is not a camera index", device)))
}

fn rgb_frame_from_bgr(bgr: &Mat) -> Result<Frame> {
    let mut rgb = Mat::default();
    imgproc::cvt_color_def(bgr, &mut rgb, imgproc::COLOR_BGR2RGB)
        .map_err(cv_err("Failed to convert frame"))?;
    let size = rgb.size().map_err(cv_err("Failed to read frame size"))?;
    let bytes = rgb
        .data_bytes()
        .map_err(cv_err("Failed to read frame data"))?
        .to_vec();
    Frame::from_raw(size.width as u32, size.height as u32, bytes)
}

impl FrameSource for OpenCvCamera {
    fn metadata(&self) -> SourceMetadata {
        self.metadata
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        match self.capture.read(&mut self.raw) {
            Ok(true) if !self.raw.empty() => rgb_frame_from_bgr(&self.raw).map(Some),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(error = %e, "OpenCV camera read failed");
                Ok(None)
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        debug!("Releasing OpenCV camera");
        self.capture
            .release()
            .map_err(cv_err("Failed to release camera"))
    }
}

/// Segment writer backed by `cv::VideoWriter`
#[derive(Debug, Default, Clone)]
pub struct OpenCvSegmentSink;

impl SegmentSink for OpenCvSegmentSink {
    fn open(&mut self, request: &SegmentRequest) -> Result<Box<dyn SegmentHandle>> {
        let dir = match request.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        check_output_dir(dir)?;

        let tag: Vec<char> = request.fourcc.chars().collect();
        let [a, b, c, d] = tag[..] else {
            return Err(Error::Config(format!(
                "Codec tag '{}' is not four characters",
                request.fourcc
            )));
        };
        let fourcc = VideoWriter::fourcc(a, b, c, d).map_err(cv_err("Invalid codec tag"))?;

        let path = request.path.to_string_lossy().to_string();
        let size = Size::new(request.width as i32, request.height as i32);
        let writer = VideoWriter::new(&path, fourcc, request.fps, size, true)
            .map_err(cv_err("Failed to create video writer"))?;
        if !writer.is_opened().map_err(cv_err("Failed to query video writer"))? {
            return Err(Error::Encode(format!("Could not open {} for writing", path)));
        }

        Ok(Box::new(OpenCvSegment {
            path: request.path.clone(),
            writer,
        }))
    }
}

struct OpenCvSegment {
    path: PathBuf,
    writer: VideoWriter,
}

impl SegmentHandle for OpenCvSegment {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let flat = Mat::from_slice(frame.as_raw()).map_err(cv_err("Failed to wrap frame"))?;
        let rgb = flat
            .reshape(3, frame.height() as i32)
            .map_err(cv_err("Failed to reshape frame"))?
            .try_clone()
            .map_err(cv_err("Failed to copy frame"))?;
        let mut bgr = Mat::default();
        imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)
            .map_err(cv_err("Failed to convert frame"))?;
        self.writer
            .write(&bgr)
            .map_err(|e| Error::Encode(format!("Failed to write {}: {}", self.path.display(), e)))
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.writer
            .release()
            .map_err(|e| Error::Encode(format!("Failed to finalize {}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_index_parsing() {
        assert_eq!(device_index("/dev/video2").unwrap(), 2);
        assert_eq!(device_index("0").unwrap(), 0);
        assert!(device_index("rtsp://camera").is_err());
    }
}
