//! ABOUTME: Capture loop feeding frames from a source into the recording controller
//! ABOUTME: Handles warm-up, missed reads, cancellation, and device release

use crate::{
    controller::{ControllerConfig, RecordingController, SessionSummary, Step},
    source::FrameSource,
    writer::SegmentSink,
};
use mc_config::Config;
use mc_core::{Clock, Result};
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Granularity of the cancellable warm-up wait
const WARMUP_POLL: Duration = Duration::from_millis(50);

/// Totals reported when the capture loop exits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub missed_reads: u64,
    pub sessions: Vec<SessionSummary>,
}

/// Owns the acquisition source and the controller for one run
pub struct Recorder {
    source: Box<dyn FrameSource>,
    controller: RecordingController,
    warmup: Duration,
    miss_log_every: u64,
}

impl Recorder {
    pub fn new(
        source: Box<dyn FrameSource>,
        controller: RecordingController,
        warmup: Duration,
        miss_log_every: u64,
    ) -> Self {
        Self {
            source,
            controller,
            warmup,
            miss_log_every: miss_log_every.max(1),
        }
    }

    /// Wire a source and sink together using application config
    pub fn from_config(
        config: &Config,
        source: Box<dyn FrameSource>,
        sink: Box<dyn SegmentSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let metadata = source.metadata();
        let controller_config = ControllerConfig::from_config(config, Some(&metadata));
        let controller = RecordingController::new(controller_config, sink, clock)?;

        Ok(Self::new(
            source,
            controller,
            Duration::from_secs_f64(config.recording.warmup_seconds.max(0.0)),
            config.telemetry.miss_log_every,
        ))
    }

    pub fn controller(&self) -> &RecordingController {
        &self.controller
    }

    /// Run until `cancel` fires or a fatal error occurs
    ///
    /// Blocks the calling thread. Any open segment is closed and the source
    /// released on every exit path.
    #[instrument(skip_all)]
    pub fn run(mut self, cancel: &CancellationToken) -> Result<RunSummary> {
        let metadata = self.source.metadata();
        info!(
            width = metadata.width,
            height = metadata.height,
            fps = metadata.fps,
            effective_fps = self.controller.config().fps,
            "Capture device ready"
        );

        let mut summary = RunSummary::default();

        if !self.wait_warmup(cancel) {
            info!("Cancelled during warm-up");
            self.release();
            return Ok(summary);
        }

        match self.capture_loop(cancel, &mut summary) {
            Ok(()) => {
                let closed = self.controller.shutdown();
                self.release();
                if let Some(session) = closed? {
                    summary.sessions.push(session);
                }
                info!(
                    frames = summary.frames_processed,
                    missed = summary.missed_reads,
                    sessions = summary.sessions.len(),
                    "Capture stopped"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "Capture loop failed");
                if let Err(close_err) = self.controller.shutdown() {
                    error!(error = %close_err, "Failed to close segment after error");
                }
                self.release();
                Err(e)
            }
        }
    }

    /// Sleep through the warm-up period; false when cancelled first
    fn wait_warmup(&self, cancel: &CancellationToken) -> bool {
        if self.warmup.is_zero() {
            return !cancel.is_cancelled();
        }
        debug!(seconds = self.warmup.as_secs_f64(), "Waiting for camera warm-up");

        let deadline = Instant::now() + self.warmup;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(WARMUP_POLL.min(deadline - now));
        }
    }

    fn capture_loop(&mut self, cancel: &CancellationToken, summary: &mut RunSummary) -> Result<()> {
        let mut consecutive_misses = 0u64;

        while !cancel.is_cancelled() {
            let Some(frame) = self.source.read()? else {
                consecutive_misses += 1;
                summary.missed_reads += 1;
                if consecutive_misses == 1 {
                    debug!("No frame this tick");
                } else if consecutive_misses % self.miss_log_every == 0 {
                    warn!(consecutive_misses, "Camera is not delivering frames");
                }
                continue;
            };

            if consecutive_misses >= self.miss_log_every {
                info!(consecutive_misses, "Camera recovered");
            }
            consecutive_misses = 0;

            let step = self.controller.process(frame)?;
            summary.frames_processed += 1;

            if let Step::Finished(session) = step {
                summary.sessions.push(session);
            }
        }

        Ok(())
    }

    fn release(&mut self) {
        if let Err(e) = self.source.release() {
            warn!(error = %e, "Failed to release capture device");
        }
    }
}
