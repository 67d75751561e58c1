use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use attendance_kiosk::{
    AttendanceLoop, Clock, DetectionResult, ElapsedTime, FaceBox, FaceDetector, Frame,
    FrameSource, GateVerdict, KioskStatus, LoopParts, LoopSettings, ManualClock, MemberId,
    RecognitionClient, RecognitionOutcome, StatusBoard, SubmitError, TickOutcome,
};

struct FakeCamera {
    fail_connect: bool,
    fail_frames: Arc<AtomicBool>,
}

impl FrameSource for FakeCamera {
    fn connect(&mut self) -> Result<()> {
        if self.fail_connect {
            return Err(anyhow!("device busy"));
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.fail_frames.load(Ordering::SeqCst) {
            return Err(anyhow!("read timed out"));
        }
        Frame::from_rgb(vec![128; 16 * 16 * 3], 16, 16)
    }
}

/// Each entry is one `detect` call; `None` makes the call fail.
#[derive(Clone, Default)]
struct FakeDetector {
    script: Arc<Mutex<VecDeque<Option<Vec<FaceBox>>>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeDetector {
    fn push(&self, faces: Option<Vec<FaceBox>>) {
        self.script.lock().unwrap().push_back(faces);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceDetector for FakeDetector {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Some(faces)) => Ok(DetectionResult::from_faces(faces)),
            Some(None) => Err(anyhow!("inference failed")),
            None => Ok(DetectionResult::none()),
        }
    }
}

#[derive(Default)]
struct FakeClient {
    replies: Mutex<VecDeque<Result<RecognitionOutcome, SubmitError>>>,
    uploads: Mutex<Vec<Vec<u8>>>,
}

impl FakeClient {
    fn reply(&self, reply: Result<RecognitionOutcome, SubmitError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

impl RecognitionClient for FakeClient {
    fn recognize(&self, jpeg: &[u8]) -> Result<RecognitionOutcome, SubmitError> {
        self.uploads.lock().unwrap().push(jpeg.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(RecognitionOutcome::Unrecognized { reason: None }))
    }
}

struct Harness {
    kiosk: AttendanceLoop,
    board: StatusBoard,
    clock: Arc<ManualClock>,
    detector: FakeDetector,
    client: Arc<FakeClient>,
    fail_frames: Arc<AtomicBool>,
}

fn harness_with(fail_connect: bool) -> Harness {
    let board = StatusBoard::new();
    let clock = Arc::new(ManualClock::new());
    let detector = FakeDetector::default();
    let client = Arc::new(FakeClient::default());
    let fail_frames = Arc::new(AtomicBool::new(false));
    let kiosk = AttendanceLoop::new(
        LoopParts {
            source: Box::new(FakeCamera {
                fail_connect,
                fail_frames: fail_frames.clone(),
            }),
            detector: Box::new(detector.clone()),
            client: client.clone(),
            sink: Box::new(board.clone()),
        },
        LoopSettings::default(),
    )
    .with_clock(clock.clone());
    Harness {
        kiosk,
        board,
        clock,
        detector,
        client,
        fail_frames,
    }
}

fn harness() -> Harness {
    let mut h = harness_with(false);
    h.kiosk.start().unwrap();
    h
}

fn face(side: f32) -> FaceBox {
    FaceBox::new(100.0, 80.0, side, side)
}

fn ana_check_in() -> RecognitionOutcome {
    RecognitionOutcome::CheckIn {
        member: MemberId::from(7),
        name: "Ana".to_string(),
    }
}

fn rate_limited() -> RecognitionOutcome {
    RecognitionOutcome::Failed {
        reason: Some("Muitas tentativas".to_string()),
        code: None,
        http_status: Some(200),
    }
}

const TICK: Duration = Duration::from_millis(3_000);

#[test]
fn gate_holds_every_tick_without_a_single_large_face() {
    let mut h = harness();
    h.detector.push(Some(vec![]));
    h.detector.push(Some(vec![face(200.0), face(200.0)]));
    h.detector.push(Some(vec![face(60.0)]));
    h.detector.push(Some(vec![FaceBox::new(0.0, 0.0, 79.9, 200.0)]));

    assert_eq!(h.kiosk.tick(), TickOutcome::Held(GateVerdict::NoFace));
    assert_eq!(h.board.current(), KioskStatus::AwaitingFace);

    assert_eq!(
        h.kiosk.tick(),
        TickOutcome::Held(GateVerdict::MultipleFaces { count: 2 })
    );
    assert_eq!(h.board.current(), KioskStatus::MultipleFaces { count: 2 });

    assert!(matches!(
        h.kiosk.tick(),
        TickOutcome::Held(GateVerdict::TooSmall { .. })
    ));
    assert_eq!(h.board.current(), KioskStatus::MoveCloser);

    assert!(matches!(
        h.kiosk.tick(),
        TickOutcome::Held(GateVerdict::TooSmall { .. })
    ));

    assert_eq!(h.client.upload_count(), 0);
    assert_eq!(h.kiosk.stats().submissions, 0);
}

#[test]
fn accepted_face_is_uploaded_once_as_jpeg() {
    let mut h = harness();
    h.detector.push(Some(vec![face(120.0)]));
    h.client.reply(Ok(ana_check_in()));

    h.kiosk.tick();

    let uploads = h.client.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(&uploads[0][..2], &[0xFF, 0xD8]);
}

#[test]
fn check_in_then_check_out_updates_presence() {
    let mut h = harness();
    h.detector.push(Some(vec![face(120.0)]));
    h.client.reply(Ok(ana_check_in()));

    assert_eq!(h.kiosk.tick(), TickOutcome::Recognized(ana_check_in()));
    let ana = MemberId::from(7);
    assert!(h.kiosk.state().presence.is_present(&ana));
    assert_eq!(
        h.board.current().to_string(),
        "Entrada registrada: Ana (ID 7)"
    );
    assert_eq!(h.board.snapshot().present_members, 1);

    h.clock.advance(TICK);
    h.detector.push(Some(vec![face(120.0)]));
    h.client.reply(Ok(RecognitionOutcome::CheckOut {
        member: ana.clone(),
        name: "Ana".to_string(),
        elapsed: Some(ElapsedTime::Seconds(3_725)),
    }));

    h.kiosk.tick();
    assert!(!h.kiosk.state().presence.is_present(&ana));
    let message = h.board.current().to_string();
    assert!(message.starts_with("Saída registrada: Ana (ID 7)"));
    assert!(message.contains("1h 02min 05s"));
    assert_eq!(h.board.snapshot().present_members, 0);
}

#[test]
fn unrecognized_face_leaves_presence_untouched() {
    let mut h = harness();
    h.detector.push(Some(vec![face(120.0)]));
    h.client.reply(Ok(RecognitionOutcome::Unrecognized { reason: None }));

    h.kiosk.tick();
    assert!(h.kiosk.state().presence.is_empty());
    assert_eq!(
        h.board.current(),
        KioskStatus::NotRecognized { reason: None }
    );
    assert!(!h.kiosk.state().guard.is_locked());
}

#[test]
fn rate_limit_locks_kiosk_for_exactly_the_cooldown() {
    let mut h = harness();
    h.detector.push(Some(vec![face(120.0)]));
    h.client.reply(Ok(rate_limited()));

    h.kiosk.tick();
    assert!(h.kiosk.state().guard.is_locked());
    assert!(!h.board.report_actions_enabled());
    assert!(matches!(h.board.current(), KioskStatus::LockedOut { .. }));
    assert!(h.board.snapshot().locked);
    assert_eq!(h.kiosk.stats().lockouts, 1);

    let detections_at_lock = h.detector.calls();
    let mut elapsed = Duration::ZERO;
    while elapsed + TICK < Duration::from_secs(300) {
        h.clock.advance(TICK);
        elapsed += TICK;
        assert_eq!(h.kiosk.tick(), TickOutcome::Locked);
    }
    assert_eq!(h.detector.calls(), detections_at_lock);
    assert_eq!(h.client.upload_count(), 1);
    assert!(!h.board.report_actions_enabled());

    h.clock.advance(Duration::from_secs(300) - elapsed - Duration::from_millis(1));
    assert_eq!(h.kiosk.tick(), TickOutcome::Locked);

    h.clock.advance(Duration::from_millis(1));
    assert_eq!(h.kiosk.tick(), TickOutcome::Held(GateVerdict::NoFace));
    assert!(!h.kiosk.state().guard.is_locked());
    assert!(h.board.report_actions_enabled());
    assert_eq!(h.detector.calls(), detections_at_lock + 1);

    let history = h.board.history();
    let reopened = history
        .iter()
        .filter(|status| **status == KioskStatus::Available)
        .count();
    assert_eq!(reopened, 1);
}

#[test]
fn lockout_status_names_reason_and_cooldown() {
    let mut h = harness();
    h.detector.push(Some(vec![face(120.0)]));
    h.client.reply(Ok(rate_limited()));

    h.kiosk.tick();
    assert_eq!(
        h.board.current(),
        KioskStatus::LockedOut {
            reason: Some("Muitas tentativas".to_string()),
            cooldown: Duration::from_secs(300),
        }
    );
    assert_eq!(
        h.board.snapshot().lockout_remaining_secs,
        Some(300)
    );
}

#[test]
fn network_failure_does_not_stop_the_loop() {
    let mut h = harness();
    h.detector.push(Some(vec![face(120.0)]));
    h.client
        .reply(Err(SubmitError::Network("connection refused".to_string())));

    assert_eq!(h.kiosk.tick(), TickOutcome::SubmitFailed);
    assert_eq!(h.board.current(), KioskStatus::SubmitFailed);
    assert!(!h.kiosk.state().guard.is_locked());

    h.clock.advance(TICK);
    h.detector.push(Some(vec![face(120.0)]));
    h.client.reply(Ok(ana_check_in()));
    assert_eq!(h.kiosk.tick(), TickOutcome::Recognized(ana_check_in()));
    assert_eq!(h.kiosk.stats().submit_failures, 1);
}

#[test]
fn detector_failure_skips_only_that_tick() {
    let mut h = harness();
    h.detector.push(None);
    h.detector.push(Some(vec![face(120.0)]));
    h.client.reply(Ok(ana_check_in()));

    assert_eq!(h.kiosk.tick(), TickOutcome::DetectorFailed);
    assert_eq!(h.board.current(), KioskStatus::DetectorUnavailable);

    h.clock.advance(TICK);
    assert_eq!(h.kiosk.tick(), TickOutcome::Recognized(ana_check_in()));
    assert_eq!(h.kiosk.stats().detector_failures, 1);
}

#[test]
fn camera_acquisition_failure_is_fatal() {
    let mut h = harness_with(true);
    let err = h.kiosk.start().unwrap_err();
    assert!(format!("{:#}", err).contains("device busy"));
    assert_eq!(h.board.current(), KioskStatus::CameraUnavailable);
}

#[test]
fn frame_failures_are_reported_once_per_streak() {
    let mut h = harness();
    h.fail_frames.store(true, Ordering::SeqCst);
    for _ in 0..3 {
        assert_eq!(h.kiosk.tick(), TickOutcome::FrameUnavailable);
        h.clock.advance(TICK);
    }
    let reported = h
        .board
        .history()
        .iter()
        .filter(|status| **status == KioskStatus::CameraUnavailable)
        .count();
    assert_eq!(reported, 1);
    assert_eq!(h.detector.calls(), 0);

    h.fail_frames.store(false, Ordering::SeqCst);
    assert_eq!(h.kiosk.tick(), TickOutcome::Held(GateVerdict::NoFace));
    assert_eq!(h.kiosk.stats().frame_failures, 3);
}

#[test]
fn run_ticks_until_shutdown() {
    let board = StatusBoard::new();
    let detector = FakeDetector::default();
    let mut kiosk = AttendanceLoop::new(
        LoopParts {
            source: Box::new(FakeCamera {
                fail_connect: false,
                fail_frames: Arc::new(AtomicBool::new(false)),
            }),
            detector: Box::new(detector.clone()),
            client: Arc::new(FakeClient::default()),
            sink: Box::new(board.clone()),
        },
        LoopSettings {
            interval: Duration::from_millis(10),
            ..LoopSettings::default()
        },
    );
    kiosk.start().unwrap();

    let shutdown = Arc::new(AtomicBool::new(false));
    let stopper = {
        let shutdown = shutdown.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            shutdown.store(true, Ordering::SeqCst);
        })
    };
    let stats = kiosk.run(&shutdown);
    stopper.join().unwrap();

    assert!(stats.ticks >= 2, "ticks = {}", stats.ticks);
    assert_eq!(detector.calls() as u64, stats.ticks);
    assert_eq!(board.snapshot().ticks, stats.ticks);
}

#[test]
fn manual_clock_drives_presence_timestamps() {
    let mut h = harness();
    h.clock.advance(Duration::from_secs(42));
    h.detector.push(Some(vec![face(120.0)]));
    h.client.reply(Ok(ana_check_in()));
    h.kiosk.tick();

    let record = h
        .kiosk
        .state()
        .presence
        .get(&MemberId::from(7))
        .unwrap();
    assert_eq!(record.checked_in_at, h.clock.system_time());
}
