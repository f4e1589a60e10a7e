//! ABOUTME: Camera acquisition and segment encoding backends
//! ABOUTME: ffmpeg child processes by default, OpenCV videoio behind heavy_opencv

use mc_config::Config;
use mc_core::Result;
use mc_record::{FrameSource, SegmentSink};
use tracing::info;

pub mod command;
pub mod ffmpeg_sink;
pub mod ffmpeg_source;
#[cfg(feature = "heavy_opencv")]
pub mod opencv;

pub use command::{CommandSpec, DEFAULT_FFMPEG};
pub use ffmpeg_sink::{check_output_dir, encoder_for, FfmpegSegmentSink};
pub use ffmpeg_source::{FfmpegCamera, FfmpegCameraConfig};
#[cfg(feature = "heavy_opencv")]
pub use opencv::{OpenCvCamera, OpenCvSegmentSink};

/// Open the camera and segment sink for the compiled-in backend
pub fn open_backends(config: &Config) -> Result<(Box<dyn FrameSource>, Box<dyn SegmentSink>)> {
    check_output_dir(&config.recording.output_dir)?;

    #[cfg(feature = "heavy_opencv")]
    {
        info!(backend = "opencv", "Opening capture backends");
        let camera = OpenCvCamera::open(&config.capture)?;
        Ok((Box::new(camera), Box::new(OpenCvSegmentSink)))
    }

    #[cfg(not(feature = "heavy_opencv"))]
    {
        info!(backend = "ffmpeg", "Opening capture backends");
        encoder_for(&config.recording.fourcc)?;
        let camera = FfmpegCamera::open(FfmpegCameraConfig::from(&config.capture))?;
        Ok((Box::new(camera), Box::new(FfmpegSegmentSink::default())))
    }
}
