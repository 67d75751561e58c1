//! Attendance report downloads.
//!
//! Reports are generated by the backend; the kiosk only fetches the file and
//! exposes it as `relatorio_{tipo}.xlsx`. Nothing is written when the backend
//! fails, so a failed request never leaves a stale or partial download behind.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::status::{KioskStatus, StatusSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Semanal,
    Mensal,
}

impl ReportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::Semanal => "semanal",
            ReportKind::Mensal => "mensal",
        }
    }

    /// Backend path, relative to the backend base URL.
    pub fn endpoint(self) -> String {
        format!("gerar-relatorio/{}", self.as_str())
    }

    pub fn file_name(self) -> String {
        format!("relatorio_{}.xlsx", self.as_str())
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "semanal" | "weekly" => Ok(ReportKind::Semanal),
            "mensal" | "monthly" => Ok(ReportKind::Mensal),
            other => Err(ReportError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unknown report kind '{0}' (expected semanal or mensal)")]
    UnknownKind(String),
    #[error("report actions are disabled while the kiosk is locked")]
    Blocked,
    #[error("report request failed: {0}")]
    Network(String),
    #[error("report generation failed with HTTP {0}")]
    Status(u16),
    #[error("report body was empty")]
    Empty,
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of report files.
pub trait ReportSource: Send + Sync {
    fn fetch_report(&self, kind: ReportKind) -> Result<Vec<u8>, ReportError>;
}

/// A report saved to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportFile {
    pub kind: ReportKind,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Fetches reports and writes them into an output directory.
pub struct ReportDownloader<'a> {
    source: &'a dyn ReportSource,
    out_dir: PathBuf,
}

impl<'a> ReportDownloader<'a> {
    pub fn new(source: &'a dyn ReportSource, out_dir: impl AsRef<Path>) -> Self {
        Self {
            source,
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }

    /// Download one report and announce the result on `sink`.
    ///
    /// `enabled` mirrors the abuse guard; a disabled action is refused without
    /// contacting the backend.
    pub fn download(
        &self,
        kind: ReportKind,
        enabled: bool,
        sink: &mut dyn StatusSink,
    ) -> Result<ReportFile, ReportError> {
        if !enabled {
            sink.publish(&KioskStatus::ReportBlocked);
            return Err(ReportError::Blocked);
        }
        match self.fetch_and_store(kind) {
            Ok(file) => {
                log::info!(
                    "report {} saved to {} ({} bytes)",
                    kind,
                    file.path.display(),
                    file.bytes
                );
                sink.publish(&KioskStatus::ReportReady {
                    kind,
                    path: file.path.clone(),
                });
                Ok(file)
            }
            Err(err) => {
                log::warn!("report {} failed: {}", kind, err);
                sink.publish(&KioskStatus::ReportFailed { kind });
                Err(err)
            }
        }
    }

    fn fetch_and_store(&self, kind: ReportKind) -> Result<ReportFile, ReportError> {
        let bytes = self.source.fetch_report(kind)?;
        if bytes.is_empty() {
            return Err(ReportError::Empty);
        }
        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(kind.file_name());
        let partial = path.with_extension("xlsx.part");
        std::fs::write(&partial, &bytes)?;
        std::fs::rename(&partial, &path)?;
        Ok(ReportFile {
            kind,
            path,
            bytes: bytes.len(),
        })
    }
}
