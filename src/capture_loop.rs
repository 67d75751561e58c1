//! The attendance capture loop.
//!
//! One tick: poll the abuse guard, grab a frame, detect faces, gate, and at most
//! one upload. Ticks run on a fixed cadence and never overlap; a tick that runs
//! past its slot drops the missed slots instead of queueing them.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::detect::FaceDetector;
use crate::frame::{Frame, DEFAULT_JPEG_QUALITY};
use crate::gate::{GateVerdict, DEFAULT_MIN_FACE_PX};
use crate::guard::{RateLimitPolicy, DEFAULT_LOCKOUT};
use crate::ingest::FrameSource;
use crate::recognition::{RecognitionClient, RecognitionOutcome, SubmitError};
use crate::schedule::TickSchedule;
use crate::session::SessionState;
use crate::status::{KioskStatus, SessionSummary, StatusSink};

/// Default sampling interval.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(3_000);

/// Upper bound on a single sleep so shutdown requests are noticed promptly.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub interval: Duration,
    pub min_face_px: u32,
    pub jpeg_quality: u8,
    pub lockout: Duration,
    pub rate_limit: RateLimitPolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SAMPLE_INTERVAL,
            min_face_px: DEFAULT_MIN_FACE_PX,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            lockout: DEFAULT_LOCKOUT,
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

/// What a single tick did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Guard is locked; nothing was sampled.
    Locked,
    FrameUnavailable,
    DetectorFailed,
    /// The gate stopped the tick before capture.
    Held(GateVerdict),
    /// Backend answered. Rate-limit answers land here too.
    Recognized(RecognitionOutcome),
    SubmitFailed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub locked_ticks: u64,
    pub dropped_slots: u64,
    pub detections: u64,
    pub submissions: u64,
    pub submit_failures: u64,
    pub frame_failures: u64,
    pub detector_failures: u64,
    pub lockouts: u64,
}

/// The pieces a loop is built from.
pub struct LoopParts {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn FaceDetector>,
    pub client: Arc<dyn RecognitionClient>,
    pub sink: Box<dyn StatusSink>,
}

pub struct AttendanceLoop {
    source: Box<dyn FrameSource>,
    detector: Box<dyn FaceDetector>,
    client: Arc<dyn RecognitionClient>,
    sink: Box<dyn StatusSink>,
    clock: Arc<dyn Clock>,
    settings: LoopSettings,
    state: SessionState,
    stats: LoopStats,
    frame_failure_reported: bool,
}

impl AttendanceLoop {
    pub fn new(parts: LoopParts, settings: LoopSettings) -> Self {
        Self {
            source: parts.source,
            detector: parts.detector,
            client: parts.client,
            sink: parts.sink,
            clock: Arc::new(SystemClock),
            state: SessionState::new(settings.lockout),
            settings,
            stats: LoopStats::default(),
            frame_failure_reported: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Acquire the camera and load the detector.
    ///
    /// Either failure is reported on the sink and returned; the loop must not
    /// run without a feed.
    pub fn start(&mut self) -> Result<()> {
        if let Err(err) = self.source.connect() {
            log::error!("camera acquisition failed: {:#}", err);
            self.sink.publish(&KioskStatus::CameraUnavailable);
            return Err(err.context("camera acquisition failed"));
        }
        if let Err(err) = self.detector.warm_up() {
            log::error!("detector '{}' failed to load: {:#}", self.detector.name(), err);
            self.sink.publish(&KioskStatus::DetectorUnavailable);
            return Err(err.context("face detector failed to load"));
        }
        log::info!(
            "capture loop ready: detector={} interval={:?} min_face_px={}",
            self.detector.name(),
            self.settings.interval,
            self.settings.min_face_px
        );
        self.sink
            .set_report_actions(self.state.guard.report_actions_enabled());
        self.sink.publish(&KioskStatus::AwaitingFace);
        self.publish_session();
        Ok(())
    }

    /// Run one tick now.
    pub fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;
        let outcome = self.run_tick();
        self.publish_session();
        outcome
    }

    /// Tick on the configured cadence until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) -> LoopStats {
        let mut schedule = TickSchedule::new(self.settings.interval, self.clock.now());
        while !shutdown.load(Ordering::SeqCst) {
            let now = self.clock.now();
            if !schedule.is_due(now) {
                std::thread::sleep(schedule.remaining(now).min(SHUTDOWN_POLL));
                continue;
            }
            let outcome = self.tick();
            log::debug!("tick {}: {:?}", self.stats.ticks, outcome);
            let dropped = schedule.complete(self.clock.now());
            if dropped > 0 {
                self.stats.dropped_slots += dropped;
                log::debug!("tick overran its slot; dropped {} slot(s)", dropped);
            }
        }
        log::info!(
            "capture loop stopped after {} ticks ({} submissions)",
            self.stats.ticks,
            self.stats.submissions
        );
        self.stats.clone()
    }

    fn run_tick(&mut self) -> TickOutcome {
        if self.state.guard.poll(self.clock.now()) {
            log::info!("lockout expired; kiosk available again");
            self.sink.set_report_actions(true);
            self.sink.publish(&KioskStatus::Available);
        }
        if self.state.guard.is_locked() {
            self.stats.locked_ticks += 1;
            return TickOutcome::Locked;
        }

        let frame = match self.source.next_frame() {
            Ok(frame) => {
                if self.frame_failure_reported {
                    log::info!("camera feed recovered");
                    self.frame_failure_reported = false;
                }
                frame
            }
            Err(err) => {
                self.stats.frame_failures += 1;
                if !self.frame_failure_reported {
                    log::warn!("camera frame unavailable: {:#}", err);
                    self.sink.publish(&KioskStatus::CameraUnavailable);
                    self.frame_failure_reported = true;
                }
                return TickOutcome::FrameUnavailable;
            }
        };

        self.stats.detections += 1;
        let detection = match self.detector.detect(&frame) {
            Ok(detection) => detection,
            Err(err) => {
                self.stats.detector_failures += 1;
                log::warn!("detector '{}' failed: {:#}", self.detector.name(), err);
                self.sink.publish(&KioskStatus::DetectorUnavailable);
                return TickOutcome::DetectorFailed;
            }
        };

        let verdict = GateVerdict::classify(&detection, self.settings.min_face_px);
        log::debug!("gate: {} face(s) -> {:?}", detection.len(), verdict);
        self.sink.publish(&verdict.status());
        if !verdict.proceeds() {
            return TickOutcome::Held(verdict);
        }

        match self.submit(&frame) {
            Ok(outcome) => {
                self.handle_outcome(&outcome);
                TickOutcome::Recognized(outcome)
            }
            Err(err) => {
                self.stats.submit_failures += 1;
                log::warn!("submission failed: {}", err);
                self.sink.publish(&KioskStatus::SubmitFailed);
                TickOutcome::SubmitFailed
            }
        }
    }

    fn submit(&mut self, frame: &Frame) -> Result<RecognitionOutcome, SubmitError> {
        let jpeg = frame
            .encode_jpeg(self.settings.jpeg_quality)
            .map_err(|err| SubmitError::Encode(format!("{:#}", err)))?;
        self.stats.submissions += 1;
        self.client.recognize(&jpeg)
    }

    fn handle_outcome(&mut self, outcome: &RecognitionOutcome) {
        if self.settings.rate_limit.is_rate_limited(outcome) {
            let reason = match outcome {
                RecognitionOutcome::Failed { reason, .. } => reason.clone(),
                _ => None,
            };
            if self.state.guard.trip(self.clock.now()) {
                self.stats.lockouts += 1;
                log::warn!(
                    "backend reported rate limiting; locking kiosk for {:?}",
                    self.state.guard.cooldown()
                );
                self.sink.set_report_actions(false);
                self.sink.publish(&KioskStatus::LockedOut {
                    reason,
                    cooldown: self.state.guard.cooldown(),
                });
            } else {
                log::debug!("rate limit while already locked; cooldown unchanged");
            }
            return;
        }

        match outcome {
            RecognitionOutcome::CheckIn { member, .. } => log::info!("check-in: member {}", member),
            RecognitionOutcome::CheckOut { member, .. } => {
                log::info!("check-out: member {}", member)
            }
            RecognitionOutcome::Unrecognized { .. } => log::info!("face not recognized"),
            RecognitionOutcome::Failed {
                http_status, code, ..
            } => log::warn!(
                "backend rejected submission (http={:?} code={:?})",
                http_status,
                code
            ),
        }
        let status = self
            .state
            .presence
            .apply(outcome, self.clock.system_time());
        self.sink.publish(&status);
    }

    fn publish_session(&mut self) {
        let summary = SessionSummary {
            lockout_remaining: self.state.guard.remaining(self.clock.now()),
            present_members: self.state.presence.len(),
            ticks: self.stats.ticks,
            submissions: self.stats.submissions,
        };
        self.sink.record_session(&summary);
    }
}
