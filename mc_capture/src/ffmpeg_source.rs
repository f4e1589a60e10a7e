//! ABOUTME: Webcam acquisition through an ffmpeg child emitting raw RGB24 frames
//! ABOUTME: A dead child yields missed reads and is respawned at most once per second

use crate::command::{CommandSpec, DEFAULT_FFMPEG};
use mc_config::CaptureConfig;
use mc_core::{Error, Result};
use mc_record::{FrameSource, SourceMetadata};
use mc_vision::{frame::CHANNELS, Frame};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{
    io::Read,
    path::PathBuf,
    process::{Child, ChildStdout, Stdio},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Minimum spacing between respawns of a failed child
const RESPAWN_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for the ffmpeg-backed camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegCameraConfig {
    pub program: PathBuf,
    /// Device path, index, or URL passed to `-i`
    pub device: String,
    /// Input demuxer, e.g. `v4l2`
    pub input_format: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl From<&CaptureConfig> for FfmpegCameraConfig {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            program: PathBuf::from(DEFAULT_FFMPEG),
            device: config.device.clone(),
            input_format: config.input_format.clone(),
            width: config.width,
            height: config.height,
            fps: config.fps,
        }
    }
}

impl FfmpegCameraConfig {
    /// Bytes in one RGB24 frame
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }

    /// ffmpeg invocation reading the device and writing raw frames to stdout
    pub fn command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(self.program.clone())
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"]);

        if let Some(format) = &self.input_format {
            spec = spec.opt("-f", format);
        }

        spec.opt("-video_size", format!("{}x{}", self.width, self.height))
            .opt("-framerate", format!("{}", self.fps))
            .opt("-i", &self.device)
            // Scale guards against devices that ignore the requested size
            .opt("-vf", format!("scale={}:{}", self.width, self.height))
            .opt("-f", "rawvideo")
            .opt("-pix_fmt", "rgb24")
            .args(["-"])
    }
}

struct Running {
    child: Child,
    stdout: ChildStdout,
}

/// Live camera read through ffmpeg
pub struct FfmpegCamera {
    config: FfmpegCameraConfig,
    running: Option<Running>,
    last_spawn: Instant,
    restarts: u64,
    buf: Vec<u8>,
}

impl FfmpegCamera {
    /// Start ffmpeg; fails if the program cannot be spawned at all
    #[instrument(skip(config), fields(device = %config.device))]
    pub fn open(config: FfmpegCameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(Error::Config(format!(
                "Capture size {}x{} is invalid",
                config.width, config.height
            )));
        }

        let running = spawn(&config)?;
        info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            "ffmpeg camera started"
        );

        Ok(Self {
            buf: vec![0; config.frame_len()],
            config,
            running: Some(running),
            last_spawn: Instant::now(),
            restarts: 0,
        })
    }

    pub fn config(&self) -> &FfmpegCameraConfig {
        &self.config
    }

    /// Number of times the child has been respawned
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    fn respawn(&mut self) -> Result<()> {
        let since = self.last_spawn.elapsed();
        if since < RESPAWN_INTERVAL {
            std::thread::sleep(RESPAWN_INTERVAL - since);
        }
        self.last_spawn = Instant::now();
        self.running = Some(spawn(&self.config)?);
        self.restarts += 1;
        counter!("motioncam_camera_restarts_total").increment(1);
        info!(restarts = self.restarts, "ffmpeg camera respawned");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut running) = self.running.take() {
            let _ = running.child.kill();
            let _ = running.child.wait();
        }
    }
}

fn spawn(config: &FfmpegCameraConfig) -> Result<Running> {
    let mut child = config
        .command()
        .spawn(Stdio::null(), Stdio::piped(), Stdio::null())?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Capture("ffmpeg stdout was not captured".to_string()))?;
    Ok(Running { child, stdout })
}

impl FrameSource for FfmpegCamera {
    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            width: self.config.width,
            height: self.config.height,
            fps: self.config.fps,
        }
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.running.is_none() {
            if let Err(e) = self.respawn() {
                warn!(error = %e, "Failed to respawn ffmpeg camera");
                return Ok(None);
            }
        }

        let Some(running) = self.running.as_mut() else {
            return Ok(None);
        };

        match running.stdout.read_exact(&mut self.buf) {
            Ok(()) => {
                let frame = Frame::from_raw(self.config.width, self.config.height, self.buf.clone())?;
                Ok(Some(frame))
            }
            Err(e) => {
                let status = running.child.try_wait().ok().flatten();
                warn!(error = %e, ?status, "ffmpeg camera stream ended");
                self.stop();
                Ok(None)
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        debug!("Releasing ffmpeg camera");
        self.stop();
        Ok(())
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
