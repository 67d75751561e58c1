//! Kiosk status messages and the sinks that display them.
//!
//! Every pipeline stage reports to the person in front of the camera through a
//! `KioskStatus`. Sinks decide how to show it: the terminal UI, the status API
//! board, or both through `StatusFanout`.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::recognition::{ElapsedTime, MemberId};
use crate::reports::ReportKind;

const HISTORY_LEN: usize = 32;

/// User-facing status of the kiosk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KioskStatus {
    AwaitingFace,
    MultipleFaces { count: usize },
    MoveCloser,
    Verifying,
    CheckedIn { member: MemberId, name: String },
    CheckedOut {
        member: MemberId,
        name: String,
        elapsed: Option<ElapsedTime>,
    },
    NotRecognized { reason: Option<String> },
    SubmitFailed,
    LockedOut {
        reason: Option<String>,
        cooldown: Duration,
    },
    Available,
    CameraUnavailable,
    DetectorUnavailable,
    ReportReady { kind: ReportKind, path: PathBuf },
    ReportFailed { kind: ReportKind },
    ReportBlocked,
}

/// Coarse category of a status, for machine consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Waiting,
    Guidance,
    Verifying,
    Success,
    Failure,
    Locked,
}

impl KioskStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            KioskStatus::AwaitingFace | KioskStatus::Available => StatusKind::Waiting,
            KioskStatus::MultipleFaces { .. } | KioskStatus::MoveCloser => StatusKind::Guidance,
            KioskStatus::Verifying => StatusKind::Verifying,
            KioskStatus::CheckedIn { .. }
            | KioskStatus::CheckedOut { .. }
            | KioskStatus::ReportReady { .. } => StatusKind::Success,
            KioskStatus::LockedOut { .. } | KioskStatus::ReportBlocked => StatusKind::Locked,
            KioskStatus::NotRecognized { .. }
            | KioskStatus::SubmitFailed
            | KioskStatus::CameraUnavailable
            | KioskStatus::DetectorUnavailable
            | KioskStatus::ReportFailed { .. } => StatusKind::Failure,
        }
    }
}

impl fmt::Display for KioskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KioskStatus::AwaitingFace => write!(f, "Aguardando rosto..."),
            KioskStatus::MultipleFaces { count } => write!(
                f,
                "{} rostos detectados. Fique sozinho na frente da câmera.",
                count
            ),
            KioskStatus::MoveCloser => write!(f, "Aproxime-se da câmera."),
            KioskStatus::Verifying => write!(f, "Rosto detectado. Verificando..."),
            KioskStatus::CheckedIn { member, name } => {
                write!(f, "Entrada registrada: {} (ID {})", name, member)
            }
            KioskStatus::CheckedOut {
                member,
                name,
                elapsed,
            } => {
                write!(f, "Saída registrada: {} (ID {})", name, member)?;
                if let Some(elapsed) = elapsed {
                    write!(f, ". Tempo total: {}", elapsed)?;
                }
                Ok(())
            }
            KioskStatus::NotRecognized { reason } => match reason {
                Some(reason) => write!(f, "{}", reason),
                None => write!(f, "Rosto não reconhecido. Tente novamente."),
            },
            KioskStatus::SubmitFailed => write!(f, "Erro ao enviar imagem para o servidor."),
            KioskStatus::LockedOut { reason, cooldown } => {
                if let Some(reason) = reason {
                    write!(f, "{}. ", reason.trim_end_matches('.'))?;
                }
                write!(
                    f,
                    "Sistema bloqueado por {}.",
                    ElapsedTime::Seconds(cooldown.as_secs())
                )
            }
            KioskStatus::Available => write!(f, "Sistema disponível novamente."),
            KioskStatus::CameraUnavailable => write!(f, "Erro ao acessar a câmera."),
            KioskStatus::DetectorUnavailable => write!(f, "Detector de rostos indisponível."),
            KioskStatus::ReportReady { kind, path } => write!(
                f,
                "Relatório {} disponível: {}",
                kind.as_str(),
                path.display()
            ),
            KioskStatus::ReportFailed { kind } => {
                write!(f, "Erro ao gerar relatório {}.", kind.as_str())
            }
            KioskStatus::ReportBlocked => {
                write!(f, "Relatórios indisponíveis durante o bloqueio.")
            }
        }
    }
}

/// Session figures published by the capture loop after each tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub lockout_remaining: Option<Duration>,
    pub present_members: usize,
    pub ticks: u64,
    pub submissions: u64,
}

/// Receiver of kiosk status updates.
pub trait StatusSink: Send {
    fn publish(&mut self, status: &KioskStatus);

    /// Enable or disable report-generation actions.
    fn set_report_actions(&mut self, enabled: bool);

    fn record_session(&mut self, _summary: &SessionSummary) {}
}

/// Forwards every update to several sinks.
#[derive(Default)]
pub struct StatusFanout {
    sinks: Vec<Box<dyn StatusSink>>,
}

impl StatusFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl StatusSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl StatusSink for StatusFanout {
    fn publish(&mut self, status: &KioskStatus) {
        for sink in &mut self.sinks {
            sink.publish(status);
        }
    }

    fn set_report_actions(&mut self, enabled: bool) {
        for sink in &mut self.sinks {
            sink.set_report_actions(enabled);
        }
    }

    fn record_session(&mut self, summary: &SessionSummary) {
        for sink in &mut self.sinks {
            sink.record_session(summary);
        }
    }
}

/// Serializable view of the board.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub message: String,
    pub kind: StatusKind,
    pub report_actions_enabled: bool,
    pub locked: bool,
    pub lockout_remaining_secs: Option<u64>,
    pub present_members: usize,
    pub ticks: u64,
    pub submissions: u64,
}

#[derive(Debug)]
struct BoardInner {
    current: KioskStatus,
    history: VecDeque<KioskStatus>,
    report_actions_enabled: bool,
    session: SessionSummary,
}

/// Shared status board read by the status API and by tests.
///
/// Cloning yields another handle to the same board.
#[derive(Clone, Debug)]
pub struct StatusBoard {
    inner: Arc<Mutex<BoardInner>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BoardInner {
                current: KioskStatus::AwaitingFace,
                history: VecDeque::with_capacity(HISTORY_LEN),
                report_actions_enabled: true,
                session: SessionSummary::default(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> KioskStatus {
        self.lock().current.clone()
    }

    /// Most recent statuses, oldest first.
    pub fn history(&self) -> Vec<KioskStatus> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn report_actions_enabled(&self) -> bool {
        self.lock().report_actions_enabled
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.lock();
        StatusSnapshot {
            message: inner.current.to_string(),
            kind: inner.current.kind(),
            report_actions_enabled: inner.report_actions_enabled,
            locked: inner.session.lockout_remaining.is_some(),
            lockout_remaining_secs: inner.session.lockout_remaining.map(|d| d.as_secs()),
            present_members: inner.session.present_members,
            ticks: inner.session.ticks,
            submissions: inner.session.submissions,
        }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for StatusBoard {
    fn publish(&mut self, status: &KioskStatus) {
        let mut inner = self.lock();
        if inner.history.len() == HISTORY_LEN {
            inner.history.pop_front();
        }
        inner.history.push_back(status.clone());
        inner.current = status.clone();
    }

    fn set_report_actions(&mut self, enabled: bool) {
        self.lock().report_actions_enabled = enabled;
    }

    fn record_session(&mut self, summary: &SessionSummary) {
        self.lock().session = summary.clone();
    }
}
