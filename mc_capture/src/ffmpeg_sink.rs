//! ABOUTME: Segment encoding by piping raw RGB24 frames into an ffmpeg child
//! ABOUTME: Maps codec tags to ffmpeg encoders and waits for the container to finalize on close

use crate::command::{CommandSpec, DEFAULT_FFMPEG};
use mc_core::{Error, Result};
use mc_record::{SegmentHandle, SegmentRequest, SegmentSink};
use mc_vision::Frame;
use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStderr, Stdio},
    thread::{self, JoinHandle},
};
use tracing::{debug, instrument, warn};

/// ffmpeg encoder and output pixel format for a four-character codec tag
pub fn encoder_for(fourcc: &str) -> Result<(&'static str, &'static str)> {
    match fourcc.to_ascii_lowercase().as_str() {
        "mp4v" => Ok(("mpeg4", "yuv420p")),
        "avc1" | "h264" | "x264" => Ok(("libx264", "yuv420p")),
        "mjpg" => Ok(("mjpeg", "yuvj420p")),
        _ => Err(Error::Config(format!(
            "Unsupported codec tag '{}'",
            fourcc
        ))),
    }
}

/// Bytes of encoder diagnostics kept for the error message
const STDERR_TAIL: usize = 8 * 1024;

/// Read the encoder's stderr to EOF on its own thread, keeping only the tail.
/// The pipe must never fill, or the encoder stalls before reading stdin.
fn drain_stderr(mut pipe: ChildStderr) -> Result<JoinHandle<String>> {
    thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut tail = Vec::with_capacity(STDERR_TAIL);
            let mut buf = [0u8; 4096];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        tail.extend_from_slice(&buf[..n]);
                        if tail.len() > STDERR_TAIL {
                            tail.drain(..tail.len() - STDERR_TAIL);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "Failed to read ffmpeg stderr");
                        break;
                    }
                }
            }
            String::from_utf8_lossy(&tail).into_owned()
        })
        .map_err(Error::Io)
}

/// Fail unless `dir` exists, is a directory, and is not read-only
pub fn check_output_dir(dir: &Path) -> Result<()> {
    let meta = std::fs::metadata(dir).map_err(|e| {
        Error::Config(format!(
            "Output directory {} is not accessible: {}",
            dir.display(),
            e
        ))
    })?;
    if !meta.is_dir() {
        return Err(Error::Config(format!(
            "Output path {} is not a directory",
            dir.display()
        )));
    }
    if meta.permissions().readonly() {
        return Err(Error::Config(format!(
            "Output directory {} is read-only",
            dir.display()
        )));
    }
    Ok(())
}

/// Opens one ffmpeg encoder per segment
#[derive(Debug, Clone)]
pub struct FfmpegSegmentSink {
    program: PathBuf,
}

impl Default for FfmpegSegmentSink {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_FFMPEG))
    }
}

impl FfmpegSegmentSink {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// ffmpeg invocation encoding stdin into `request.path`
    pub fn command(&self, request: &SegmentRequest) -> Result<CommandSpec> {
        let (encoder, pix_fmt) = encoder_for(&request.fourcc)?;

        Ok(CommandSpec::new(self.program.clone())
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .opt("-f", "rawvideo")
            .opt("-pix_fmt", "rgb24")
            .opt("-video_size", format!("{}x{}", request.width, request.height))
            .opt("-framerate", format!("{}", request.fps))
            .opt("-i", "-")
            .opt("-c:v", encoder)
            .opt("-pix_fmt", pix_fmt)
            .args([request.path.to_string_lossy()]))
    }
}

impl SegmentSink for FfmpegSegmentSink {
    #[instrument(skip(self, request), fields(path = %request.path.display()))]
    fn open(&mut self, request: &SegmentRequest) -> Result<Box<dyn SegmentHandle>> {
        let dir = match request.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        check_output_dir(dir)?;

        let spec = self.command(request)?;
        let mut child = spec.spawn(Stdio::piped(), Stdio::null(), Stdio::piped())?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Encode("ffmpeg stdin was not captured".to_string()))?;
        let stderr = match child.stderr.take().map(drain_stderr).transpose() {
            Ok(stderr) => stderr,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        debug!(fourcc = %request.fourcc, "ffmpeg encoder started");
        Ok(Box::new(FfmpegSegment {
            path: request.path.clone(),
            child,
            stdin: Some(stdin),
            stderr,
        }))
    }
}

struct FfmpegSegment {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
}

impl SegmentHandle for FfmpegSegment {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Encode("Encoder input already closed".to_string()))?;
        stdin.write_all(frame.as_raw()).map_err(|e| {
            Error::Encode(format!(
                "Failed to write frame to {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        // EOF on stdin lets ffmpeg write the trailer
        drop(self.stdin.take());

        let status = self.child.wait()?;
        let stderr = match self.stderr.take().map(JoinHandle::join) {
            Some(Ok(text)) => text,
            Some(Err(_)) => {
                warn!("ffmpeg stderr reader panicked");
                String::new()
            }
            None => String::new(),
        };
        if status.success() {
            return Ok(());
        }

        Err(Error::Encode(format!(
            "ffmpeg exited with {} while writing {}: {}",
            status,
            self.path.display(),
            stderr.trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: PathBuf) -> SegmentRequest {
        SegmentRequest {
            path,
            fourcc: "mp4v".to_string(),
            fps: 15.0,
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn test_encoder_mapping() {
        assert_eq!(encoder_for("mp4v").unwrap().0, "mpeg4");
        assert_eq!(encoder_for("avc1").unwrap().0, "libx264");
        assert_eq!(encoder_for("H264").unwrap().0, "libx264");
        assert_eq!(encoder_for("MJPG").unwrap().0, "mjpeg");
        assert!(matches!(encoder_for("divx"), Err(Error::Config(_))));
    }

    #[test]
    fn test_command_encodes_stdin_to_path() {
        let sink = FfmpegSegmentSink::default();
        let spec = sink
            .command(&request(PathBuf::from("/tmp/out/2024-01-02_03_04_05.mp4")))
            .unwrap();
        let joined = spec.args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgb24 -video_size 640x480 -framerate 15 -i -"));
        assert!(joined.contains("-c:v mpeg4"));
        assert_eq!(
            spec.args.last().map(String::as_str),
            Some("/tmp/out/2024-01-02_03_04_05.mp4")
        );
    }

    #[test]
    fn test_missing_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FfmpegSegmentSink::default();
        let result = sink.open(&request(dir.path().join("missing").join("a.mp4")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_file_as_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        assert!(check_output_dir(&file).is_err());
        assert!(check_output_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_unknown_codec_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FfmpegSegmentSink::new(PathBuf::from("motioncam-no-such-ffmpeg"));
        let mut req = request(dir.path().join("a.mp4"));
        req.fourcc = "zzzz".to_string();
        assert!(matches!(sink.open(&req), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_encoder_program() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FfmpegSegmentSink::new(PathBuf::from("motioncam-no-such-ffmpeg"));
        let result = sink.open(&request(dir.path().join("a.mp4")));
        assert!(matches!(result, Err(Error::External(_))));
    }
}
