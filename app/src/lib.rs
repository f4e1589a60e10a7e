//! ABOUTME: Command line surface and async wiring for the motioncam binary
//! ABOUTME: Flags override loaded config; the blocking recorder runs off the async runtime

use clap::Parser;
use mc_config::Config;
use mc_core::{Clock, Error, Result};
use mc_record::{FrameSource, Recorder, RunSummary, SegmentSink};
use mc_vision::EdgeBackend;
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Webcam motion recorder
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "motioncam", version, about = "Records webcam segments around detected motion")]
pub struct Cli {
    /// Config file (TOML, YAML, or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Webcam index, opened as /dev/video<N>
    #[arg(long)]
    pub webcam: Option<u32>,

    /// Device path or URL, overriding --webcam
    #[arg(long)]
    pub device: Option<String>,

    /// Output directory for segments
    #[arg(long)]
    pub outdir: Option<PathBuf>,

    /// Requested frame width
    #[arg(long)]
    pub width: Option<u32>,

    /// Requested frame height
    #[arg(long)]
    pub height: Option<u32>,

    /// Requested frame rate
    #[arg(long)]
    pub fps: Option<f64>,

    /// Motion threshold
    #[arg(long)]
    pub th: Option<f64>,

    /// Warm-up wait in seconds
    #[arg(long)]
    pub time: Option<f64>,

    /// Minimal record time in seconds
    #[arg(long)]
    pub rec: Option<f64>,

    /// Hard cap on segment length in seconds
    #[arg(long)]
    pub max_segment: Option<f64>,

    /// Edge detector: native or opencv
    #[arg(long, value_parser = parse_backend)]
    pub backend: Option<EdgeBackend>,
}

fn parse_backend(value: &str) -> std::result::Result<EdgeBackend, String> {
    serde_json::from_value(serde_json::Value::String(value.to_ascii_lowercase()))
        .map_err(|_| format!("unknown backend '{}', expected native or opencv", value))
}

impl Cli {
    /// Apply flags on top of loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(index) = self.webcam {
            config.capture.device = format!("/dev/video{}", index);
        }
        if let Some(device) = &self.device {
            config.capture.device = device.clone();
        }
        if let Some(dir) = &self.outdir {
            config.recording.output_dir = dir.clone();
        }
        if let Some(width) = self.width {
            config.capture.width = width;
        }
        if let Some(height) = self.height {
            config.capture.height = height;
        }
        if let Some(fps) = self.fps {
            config.capture.fps = fps;
        }
        if let Some(threshold) = self.th {
            config.detection.threshold = threshold;
        }
        if let Some(warmup) = self.time {
            config.recording.warmup_seconds = warmup;
        }
        if let Some(rec) = self.rec {
            config.recording.min_record_seconds = rec;
        }
        if let Some(max) = self.max_segment {
            config.recording.max_segment_seconds = Some(max);
        }
        if let Some(backend) = self.backend {
            config.detection.backend = backend;
        }
    }

    /// Load config from file and environment, then apply flags and validate
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_from(self.config.as_deref())?;
        self.apply(&mut config);
        config.check()?;
        Ok(config)
    }
}

/// Run the recorder on the blocking pool until `cancel` fires or it fails
pub async fn run_recorder(
    config: &Config,
    source: Box<dyn FrameSource>,
    sink: Box<dyn SegmentSink>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let recorder = Recorder::from_config(config, source, sink, clock)?;

    tokio::task::spawn_blocking(move || recorder.run(&cancel))
        .await
        .map_err(|e| Error::External(format!("Recorder task failed: {}", e)))?
}

/// Cancel `token` on Ctrl-C
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested");
            token.cancel();
        }
    });
}
