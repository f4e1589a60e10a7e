//! ABOUTME: Configuration management with validation and environment loading
//! ABOUTME: Handles capture, detection, recording, and telemetry settings

use config::{Config as ConfigBuilder, Environment, File};
use mc_core::{Error, Result};
use mc_vision::EdgeBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Prefix for environment overrides, e.g. `MOTIONCAM_DETECTION__THRESHOLD`
pub const ENV_PREFIX: &str = "MOTIONCAM";

/// Optional config file looked up in the working directory
pub const DEFAULT_CONFIG_NAME: &str = "motioncam";

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub capture: CaptureConfig,
    #[validate(nested)]
    pub detection: DetectionConfig,
    #[validate(nested)]
    pub recording: RecordingConfig,
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

/// Camera device settings, queried once at startup
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device path, index, or URL handed to the acquisition backend
    #[validate(length(min = 1))]
    pub device: String,
    /// ffmpeg input format (`v4l2`, `avfoundation`, `dshow`, ...)
    pub input_format: Option<String>,
    #[validate(range(min = 1, max = 7680))]
    pub width: u32,
    #[validate(range(min = 1, max = 4320))]
    pub height: u32,
    #[validate(range(exclusive_min = 0.0, max = 240.0))]
    pub fps: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            input_format: Some("v4l2".to_string()),
            width: 1280,
            height: 720,
            fps: 15.0,
        }
    }
}

/// Motion detection settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct DetectionConfig {
    /// Score at or above which motion is reported
    #[validate(range(min = 0.0))]
    pub threshold: f64,
    /// Rolling window length in frames
    #[validate(range(min = 1, max = 10000))]
    pub buffer_size: usize,
    /// While idle, every Nth tick skips scoring
    #[validate(range(min = 1, max = 1000))]
    pub eval_interval: u64,
    /// Number of newest frames compared against the baseline
    #[validate(range(min = 1, max = 100))]
    pub recent_frames: usize,
    /// Edge detection implementation
    pub backend: EdgeBackend,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.25,
            buffer_size: 60,
            eval_interval: 10,
            recent_frames: 3,
            backend: EdgeBackend::Native,
        }
    }
}

/// Segment recording settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory receiving segment files
    pub output_dir: PathBuf,
    /// Delay after opening the device before frames are consumed
    #[validate(range(min = 0.0, max = 3600.0))]
    pub warmup_seconds: f64,
    /// Sustained quiet needed before a segment is closed
    #[validate(range(min = 0.0, max = 86400.0))]
    pub min_record_seconds: f64,
    /// Hard cap on live recording time; unset means unbounded
    #[validate(range(exclusive_min = 0.0))]
    pub max_segment_seconds: Option<f64>,
    /// Four-character codec tag
    #[validate(length(equal = 4))]
    pub fourcc: String,
    /// Container file extension
    #[validate(length(min = 1, max = 8))]
    pub extension: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./"),
            warmup_seconds: 10.0,
            min_record_seconds: 20.0,
            max_segment_seconds: None,
            fourcc: "mp4v".to_string(),
            extension: "mp4".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `production` selects JSON logs, anything else pretty logs
    #[validate(length(min = 1))]
    pub environment: String,
    /// Idle heartbeat period
    #[validate(range(exclusive_min = 0.0))]
    pub heartbeat_interval_seconds: f64,
    /// Consecutive failed reads between warnings
    #[validate(range(min = 1))]
    pub miss_log_every: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            heartbeat_interval_seconds: 3600.0,
            miss_log_every: 100,
        }
    }
}

impl Config {
    /// Load configuration from defaults, `./motioncam.*` if present, and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, reading `path` instead of the default file when given
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::default();
        let mut builder = ConfigBuilder::builder();

        builder = builder
            .set_default("capture.device", defaults.capture.device.clone())?
            .set_default("capture.input_format", "v4l2")?
            .set_default("capture.width", defaults.capture.width)?
            .set_default("capture.height", defaults.capture.height)?
            .set_default("capture.fps", defaults.capture.fps)?
            .set_default("detection.threshold", defaults.detection.threshold)?
            .set_default("detection.buffer_size", defaults.detection.buffer_size as u64)?
            .set_default("detection.eval_interval", defaults.detection.eval_interval)?
            .set_default("detection.recent_frames", defaults.detection.recent_frames as u64)?
            .set_default("detection.backend", "native")?
            .set_default("recording.output_dir", "./")?
            .set_default("recording.warmup_seconds", defaults.recording.warmup_seconds)?
            .set_default(
                "recording.min_record_seconds",
                defaults.recording.min_record_seconds,
            )?
            .set_default("recording.fourcc", defaults.recording.fourcc.clone())?
            .set_default("recording.extension", defaults.recording.extension.clone())?
            .set_default("telemetry.environment", defaults.telemetry.environment.clone())?
            .set_default(
                "telemetry.heartbeat_interval_seconds",
                defaults.telemetry.heartbeat_interval_seconds,
            )?
            .set_default("telemetry.miss_log_every", defaults.telemetry.miss_log_every)?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        // Environment has the highest priority
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed.check()?;
        Ok(parsed)
    }

    /// Run field validation and map failures into a config error
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))
    }
}
