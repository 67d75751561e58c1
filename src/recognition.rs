//! Recognition backend contract.
//!
//! The backend receives one JPEG still per gate pass and answers with the
//! authoritative attendance event. This module owns the response shape, its
//! mapping into `RecognitionOutcome`, and the `RecognitionClient` seam the
//! capture loop submits through.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable identity assigned by the backend. Accepts numeric or string ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for MemberId {
    fn from(value: u64) -> Self {
        MemberId(value.to_string())
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        MemberId(value.to_string())
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MemberId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => MemberId::from(n),
            Raw::Text(s) => MemberId(s.trim().to_string()),
        })
    }
}

/// Present duration reported on check-out: seconds, or preformatted text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElapsedTime {
    Seconds(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for ElapsedTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Whole(u64),
            Fractional(f64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Whole(s) => ElapsedTime::Seconds(s),
            Raw::Fractional(s) => ElapsedTime::Seconds(s.max(0.0).round() as u64),
            Raw::Text(t) => ElapsedTime::Text(t),
        })
    }
}

impl fmt::Display for ElapsedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElapsedTime::Text(text) => f.write_str(text),
            ElapsedTime::Seconds(total) => {
                let hours = total / 3600;
                let minutes = (total % 3600) / 60;
                let seconds = total % 60;
                if hours > 0 {
                    write!(f, "{}h {:02}min {:02}s", hours, minutes, seconds)
                } else if minutes > 0 {
                    write!(f, "{}min {:02}s", minutes, seconds)
                } else {
                    write!(f, "{}s", seconds)
                }
            }
        }
    }
}

/// Decision returned by the backend for one submitted still.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecognitionOutcome {
    CheckIn {
        member: MemberId,
        name: String,
    },
    CheckOut {
        member: MemberId,
        name: String,
        elapsed: Option<ElapsedTime>,
    },
    Unrecognized {
        reason: Option<String>,
    },
    Failed {
        reason: Option<String>,
        code: Option<String>,
        http_status: Option<u16>,
    },
}

impl RecognitionOutcome {
    pub fn member(&self) -> Option<&MemberId> {
        match self {
            RecognitionOutcome::CheckIn { member, .. }
            | RecognitionOutcome::CheckOut { member, .. } => Some(member),
            _ => None,
        }
    }
}

/// JSON body of `POST /face`.
#[derive(Debug, Default, Deserialize)]
pub struct RecognitionResponse {
    pub status: Option<String>,
    pub nome: Option<String>,
    pub membro_id: Option<MemberId>,
    pub tempo_total: Option<ElapsedTime>,
    pub erro: Option<String>,
    /// Structured failure code, e.g. `rate_limited`.
    pub codigo: Option<String>,
}

impl RecognitionResponse {
    /// Map the response into an outcome. The backend's `status` is authoritative.
    pub fn into_outcome(self, http_status: u16) -> RecognitionOutcome {
        let ok = (200..300).contains(&http_status);
        if self.erro.is_some() || !ok {
            return RecognitionOutcome::Failed {
                reason: self.erro.filter(|reason| !reason.trim().is_empty()),
                code: self.codigo,
                http_status: Some(http_status),
            };
        }

        let status = self
            .status
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        let is_check_in = status == "entrada";
        let is_check_out = status == "saida" || status == "saída";
        if !is_check_in && !is_check_out {
            return RecognitionOutcome::Unrecognized { reason: None };
        }

        let Some(member) = self.membro_id else {
            log::warn!("backend reported '{}' without membro_id", status);
            return RecognitionOutcome::Failed {
                reason: None,
                code: self.codigo,
                http_status: Some(http_status),
            };
        };
        let name = self
            .nome
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Membro {}", member));

        if is_check_in {
            RecognitionOutcome::CheckIn { member, name }
        } else {
            RecognitionOutcome::CheckOut {
                member,
                name,
                elapsed: self.tempo_total,
            }
        }
    }

    /// Parse a raw body received with `http_status`.
    ///
    /// A non-2xx answer with an unreadable body still maps to `Failed`.
    pub fn parse(http_status: u16, body: &str) -> Result<RecognitionOutcome, SubmitError> {
        match serde_json::from_str::<RecognitionResponse>(body) {
            Ok(response) => Ok(response.into_outcome(http_status)),
            Err(_) if !(200..300).contains(&http_status) => Ok(RecognitionOutcome::Failed {
                reason: None,
                code: None,
                http_status: Some(http_status),
            }),
            Err(err) => Err(SubmitError::InvalidResponse(err.to_string())),
        }
    }
}

/// Failures of the capture-and-submit stage. All are recovered at the next tick.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("failed to encode still: {0}")]
    Encode(String),
    #[error("recognition request failed: {0}")]
    Network(String),
    #[error("recognition response unreadable: {0}")]
    InvalidResponse(String),
}

/// Submits stills to the recognition backend.
pub trait RecognitionClient: Send + Sync {
    fn recognize(&self, jpeg: &[u8]) -> Result<RecognitionOutcome, SubmitError>;
}
