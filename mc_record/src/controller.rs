//! ABOUTME: Idle/recording state machine driven by per-frame motion scores
//! ABOUTME: Opens segments seeded with lookback frames and closes them after sustained quiet

use crate::{
    buffer::RollingBuffer,
    source::SourceMetadata,
    writer::{segment_path, SegmentRequest, SegmentSink, SegmentWriter},
};
use mc_config::Config;
use mc_core::{timestamp_label, Clock, Result, SessionId};
use mc_vision::{EdgeBackend, EdgeExtractor, EdgeMap, Frame, MotionEstimator, MotionScore};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tracing::{debug, info};

/// Settings consumed by the controller, resolved against the device frame rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub threshold: f64,
    pub buffer_size: usize,
    pub eval_interval: u64,
    pub recent_frames: usize,
    pub backend: EdgeBackend,
    pub fps: f64,
    pub min_record_seconds: f64,
    pub max_segment_seconds: Option<f64>,
    pub heartbeat_interval_seconds: f64,
    pub output_dir: PathBuf,
    pub fourcc: String,
    pub extension: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default(), None)
    }
}

impl ControllerConfig {
    /// Build from application config, using the device's reported fps when available
    pub fn from_config(config: &Config, metadata: Option<&SourceMetadata>) -> Self {
        let fps = metadata
            .map(|m| m.effective_fps(config.capture.fps))
            .unwrap_or(config.capture.fps);

        Self {
            threshold: config.detection.threshold,
            buffer_size: config.detection.buffer_size,
            eval_interval: config.detection.eval_interval,
            recent_frames: config.detection.recent_frames,
            backend: config.detection.backend,
            fps,
            min_record_seconds: config.recording.min_record_seconds,
            max_segment_seconds: config.recording.max_segment_seconds,
            heartbeat_interval_seconds: config.telemetry.heartbeat_interval_seconds,
            output_dir: config.recording.output_dir.clone(),
            fourcc: config.recording.fourcc.clone(),
            extension: config.recording.extension.clone(),
        }
    }

    /// Idle ticks between heartbeat logs
    pub fn heartbeat_ticks(&self) -> u64 {
        frames_for(self.heartbeat_interval_seconds, self.fps)
    }

    /// Quiet frames between recording heartbeat logs (ten seconds' worth)
    pub fn quiet_log_ticks(&self) -> u64 {
        frames_for(10.0, self.fps)
    }

    /// Quiet frames tolerated before a segment is closed
    pub fn quiet_limit(&self) -> f64 {
        self.min_record_seconds * self.fps
    }

    /// Live frames after which a segment is force-closed, if capped
    pub fn max_segment_frames(&self) -> Option<u64> {
        self.max_segment_seconds
            .map(|seconds| frames_for(seconds, self.fps))
    }
}

/// Whole frames covering `seconds`, never zero
fn frames_for(seconds: f64, fps: f64) -> u64 {
    ((seconds * fps).round() as u64).max(1)
}

/// Why a recording session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEnd {
    /// Motion stayed below threshold for the minimum record time
    Quiet,
    /// The optional hard cap on segment length was reached
    MaxDuration,
    /// External stop signal
    Cancelled,
}

/// Outcome of one finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub path: PathBuf,
    pub reason: SessionEnd,
    /// Frames flushed from the lookback buffer when the segment opened
    pub lookback_frames: u64,
    /// Total frames written, lookback included
    pub frames_written: u64,
    pub started_at: SystemTime,
    pub ended_at: SystemTime,
}

impl SessionSummary {
    pub fn duration(&self) -> Duration {
        self.ended_at
            .duration_since(self.started_at)
            .unwrap_or_default()
    }
}

/// State kept only while a segment is being written
pub struct RecordingSession {
    id: SessionId,
    writer: SegmentWriter,
    started_at: SystemTime,
    lookback_frames: u64,
    /// Consecutive frames scoring below threshold
    quiet_ticks: u64,
    /// Frames written after the lookback flush
    live_frames: u64,
}

impl RecordingSession {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn quiet_ticks(&self) -> u64 {
        self.quiet_ticks
    }

    pub fn live_frames(&self) -> u64 {
        self.live_frames
    }

    pub fn path(&self) -> &std::path::Path {
        self.writer.path()
    }
}

/// Exactly one of these holds at any time
pub enum ControllerState {
    Idle,
    Recording(RecordingSession),
}

/// What the controller did with a frame
#[derive(Debug, Clone)]
pub enum Step {
    /// Buffer still filling; no scoring yet
    WarmingUp { buffered: usize },
    /// Idle; `None` when this tick skipped evaluation
    Idle { score: Option<MotionScore> },
    /// Motion crossed the threshold and a segment opened
    Started {
        path: PathBuf,
        score: MotionScore,
        lookback_frames: u64,
    },
    /// Frame written to the open segment
    Recording {
        score: MotionScore,
        quiet_ticks: u64,
    },
    /// Segment closed and the controller is idle again
    Finished(SessionSummary),
}

/// Motion-triggered recording state machine
pub struct RecordingController {
    config: ControllerConfig,
    extractor: EdgeExtractor,
    estimator: MotionEstimator,
    buffer: RollingBuffer,
    sink: Box<dyn SegmentSink>,
    clock: Arc<dyn Clock>,
    state: ControllerState,
    /// Idle frame counter driving heartbeats and evaluation throttling
    ticks: u64,
}

impl RecordingController {
    pub fn new(
        config: ControllerConfig,
        sink: Box<dyn SegmentSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let buffer = RollingBuffer::new(config.buffer_size)?;
        let extractor = EdgeExtractor::new(config.backend);
        let estimator = MotionEstimator::new(config.recent_frames);

        info!(
            threshold = config.threshold,
            buffer_size = config.buffer_size,
            fps = config.fps,
            backend = ?extractor.backend(),
            "Recording controller ready"
        );

        Ok(Self {
            config,
            extractor,
            estimator,
            buffer,
            sink,
            clock,
            state: ControllerState::Idle,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, ControllerState::Recording(_))
    }

    pub fn buffer(&self) -> &RollingBuffer {
        &self.buffer
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Consume one frame and advance the state machine
    pub fn process(&mut self, frame: Frame) -> Result<Step> {
        let edges = self.extractor.extract(&frame)?;
        counter!("motioncam_frames_processed_total").increment(1);

        match std::mem::replace(&mut self.state, ControllerState::Idle) {
            ControllerState::Idle => self.process_idle(frame, edges),
            ControllerState::Recording(session) => self.process_recording(session, frame, edges),
        }
    }

    /// Close any open segment in response to an external stop
    pub fn shutdown(&mut self) -> Result<Option<SessionSummary>> {
        match std::mem::replace(&mut self.state, ControllerState::Idle) {
            ControllerState::Recording(session) => {
                self.close_session(session, SessionEnd::Cancelled).map(Some)
            }
            ControllerState::Idle => Ok(None),
        }
    }

    fn process_idle(&mut self, frame: Frame, edges: EdgeMap) -> Result<Step> {
        self.ticks += 1;
        self.buffer.push(frame, edges)?;

        if self.buffer.len() < self.config.buffer_size {
            return Ok(Step::WarmingUp {
                buffered: self.buffer.len(),
            });
        }

        if self.ticks % self.config.heartbeat_ticks() == 0 {
            self.ticks = 0;
            let score = self.buffer.score(&self.estimator)?;
            info!(
                at = %self.clock.label(),
                score = %score,
                brightness = self.latest_brightness(),
                "Idle check"
            );
        }

        if self.ticks % self.config.eval_interval == 0 {
            return Ok(Step::Idle { score: None });
        }

        self.buffer.trim(self.config.buffer_size)?;
        let score = self.buffer.score(&self.estimator)?;

        if !score.exceeds(self.config.threshold) {
            return Ok(Step::Idle { score: Some(score) });
        }

        self.ticks = 0;
        self.start_session(score)
    }

    fn start_session(&mut self, score: MotionScore) -> Result<Step> {
        let started_at = self.clock.now();
        let label = timestamp_label(started_at);
        let path = segment_path(&self.config.output_dir, &label, &self.config.extension);

        let (width, height) = self
            .buffer
            .latest()
            .map(|entry| entry.frame.dimensions())
            .unwrap_or((0, 0));

        let request = SegmentRequest {
            path: path.clone(),
            fourcc: self.config.fourcc.clone(),
            fps: self.config.fps,
            width,
            height,
        };

        let mut writer = SegmentWriter::open(self.sink.as_mut(), request)?;
        for frame in self.buffer.frames() {
            writer.write(frame)?;
        }
        let lookback_frames = writer.frames_written();

        let id = SessionId::starting_at(started_at);
        info!(
            session = %id,
            at = %label,
            path = %path.display(),
            score = %score,
            lookback_frames,
            "Start record"
        );
        counter!("motioncam_segments_opened_total").increment(1);

        self.state = ControllerState::Recording(RecordingSession {
            id,
            writer,
            started_at,
            lookback_frames,
            quiet_ticks: 0,
            live_frames: 0,
        });

        Ok(Step::Started {
            path,
            score,
            lookback_frames,
        })
    }

    fn process_recording(
        &mut self,
        mut session: RecordingSession,
        frame: Frame,
        edges: EdgeMap,
    ) -> Result<Step> {
        session.writer.write(&frame)?;
        session.live_frames += 1;
        counter!("motioncam_frames_recorded_total").increment(1);

        self.buffer.push(frame, edges)?;
        self.buffer.trim(self.config.buffer_size)?;
        let score = self.buffer.score(&self.estimator)?;

        if score.exceeds(self.config.threshold) {
            session.quiet_ticks = 0;
        } else {
            session.quiet_ticks += 1;
        }

        if session.quiet_ticks > 0 && session.quiet_ticks % self.config.quiet_log_ticks() == 0 {
            info!(
                session = %session.id,
                at = %self.clock.label(),
                score = %score,
                brightness = self.latest_brightness(),
                quiet_ticks = session.quiet_ticks,
                "Recording check"
            );
        }

        let end = if session.quiet_ticks as f64 > self.config.quiet_limit() {
            Some(SessionEnd::Quiet)
        } else if self
            .config
            .max_segment_frames()
            .is_some_and(|max| session.live_frames >= max)
        {
            Some(SessionEnd::MaxDuration)
        } else {
            None
        };

        if let Some(reason) = end {
            return self.close_session(session, reason).map(Step::Finished);
        }

        let quiet_ticks = session.quiet_ticks;
        self.state = ControllerState::Recording(session);
        Ok(Step::Recording { score, quiet_ticks })
    }

    fn close_session(
        &mut self,
        session: RecordingSession,
        reason: SessionEnd,
    ) -> Result<SessionSummary> {
        let RecordingSession {
            id,
            writer,
            started_at,
            lookback_frames,
            ..
        } = session;

        let path = writer.path().to_path_buf();
        let frames_written = writer.finish()?;
        let ended_at = self.clock.now();
        self.ticks = 0;

        info!(
            session = %id,
            at = %timestamp_label(ended_at),
            path = %path.display(),
            frames_written,
            reason = ?reason,
            "End record"
        );
        counter!("motioncam_segments_closed_total").increment(1);
        debug!(buffered = self.buffer.len(), "Returning to idle");

        Ok(SessionSummary {
            id,
            path,
            reason,
            lookback_frames,
            frames_written,
            started_at,
            ended_at,
        })
    }

    fn latest_brightness(&self) -> f64 {
        self.buffer
            .latest()
            .map(|entry| entry.edges.brightness())
            .unwrap_or_default()
    }
}
