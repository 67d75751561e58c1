//! Attendance kiosk client
//!
//! Watches a camera on a fixed cadence, waits until exactly one close-enough
//! face is in view, uploads a single still to the recognition backend and shows
//! the check-in / check-out it answers with.
//!
//! # Architecture
//!
//! The loop is a single thread; every tick runs to completion before the next
//! is scheduled:
//!
//! 1. **Sampler** (`capture_loop`, `schedule`): fixed-interval ticks, missed
//!    slots are dropped, never queued.
//! 2. **Gate** (`gate`): zero faces, several faces or a lone small face stop the
//!    tick with guidance for the user.
//! 3. **Capture & Submit** (`frame`, `transport`): JPEG still posted as the
//!    multipart field `imagem`.
//! 4. **Session Tracker** (`session`): local cache of who is checked in.
//! 5. **Abuse Guard** (`guard`): a rate-limit answer locks the kiosk and report
//!    actions for a fixed cooldown.
//!
//! Reports (`reports`) are fetched from the backend on demand and are refused
//! while the guard is locked.
//!
//! # Module Structure
//!
//! - `ingest`: camera sources (synthetic, HTTP MJPEG / snapshot)
//! - `detect`: face detector trait, registry and backends
//! - `status`: user-facing messages and the sinks that show them
//! - `api`: local read-only status API
//! - `config`: file + environment configuration

pub mod api;
pub mod capture_loop;
pub mod clock;
pub mod config;
pub mod detect;
pub mod frame;
pub mod gate;
pub mod guard;
pub mod ingest;
pub mod recognition;
pub mod reports;
pub mod schedule;
pub mod session;
pub mod status;
pub mod transport;
pub mod ui;

pub use capture_loop::{AttendanceLoop, LoopParts, LoopSettings, LoopStats, TickOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::KioskConfig;
pub use detect::{DetectionResult, DetectorRegistry, DetectorSettings, FaceBox, FaceDetector};
pub use frame::Frame;
pub use gate::GateVerdict;
pub use guard::{AbuseGuard, LockoutState, RateLimitPolicy};
pub use ingest::{CameraConfig, CameraSource, FrameSource};
pub use recognition::{
    ElapsedTime, MemberId, RecognitionClient, RecognitionOutcome, RecognitionResponse,
    SubmitError,
};
pub use reports::{ReportDownloader, ReportError, ReportFile, ReportKind, ReportSource};
pub use session::{PresenceRecord, PresenceTracker, SessionState};
pub use status::{KioskStatus, SessionSummary, StatusBoard, StatusFanout, StatusSink};
pub use transport::HttpBackend;
