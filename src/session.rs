//! Per-kiosk session state.
//!
//! `SessionState` bundles the presence cache and the abuse guard. It is owned
//! by the capture loop and handed to each stage explicitly.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use crate::guard::AbuseGuard;
use crate::recognition::{MemberId, RecognitionOutcome};
use crate::status::KioskStatus;

/// Local record of a member currently checked in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresenceRecord {
    pub name: String,
    pub checked_in_at: SystemTime,
}

/// Cache of members whose last backend event was a check-in.
///
/// Display bookkeeping only: the backend decides entrada vs. saída, this map
/// just follows.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    present: BTreeMap<MemberId, PresenceRecord>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an outcome and return the status to show.
    pub fn apply(&mut self, outcome: &RecognitionOutcome, now: SystemTime) -> KioskStatus {
        match outcome {
            RecognitionOutcome::CheckIn { member, name } => {
                let previous = self.present.insert(
                    member.clone(),
                    PresenceRecord {
                        name: name.clone(),
                        checked_in_at: now,
                    },
                );
                if previous.is_some() {
                    log::debug!("member {} checked in again; timestamp refreshed", member);
                }
                KioskStatus::CheckedIn {
                    member: member.clone(),
                    name: name.clone(),
                }
            }
            RecognitionOutcome::CheckOut {
                member,
                name,
                elapsed,
            } => {
                if self.present.remove(member).is_none() {
                    log::debug!("member {} checked out without a local check-in", member);
                }
                KioskStatus::CheckedOut {
                    member: member.clone(),
                    name: name.clone(),
                    elapsed: elapsed.clone(),
                }
            }
            RecognitionOutcome::Unrecognized { reason }
            | RecognitionOutcome::Failed { reason, .. } => KioskStatus::NotRecognized {
                reason: reason.clone(),
            },
        }
    }

    pub fn is_present(&self, member: &MemberId) -> bool {
        self.present.contains_key(member)
    }

    pub fn get(&self, member: &MemberId) -> Option<&PresenceRecord> {
        self.present.get(member)
    }

    pub fn len(&self) -> usize {
        self.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    /// Local dwell time of a present member.
    pub fn dwell(&self, member: &MemberId, now: SystemTime) -> Option<Duration> {
        self.present
            .get(member)
            .and_then(|record| now.duration_since(record.checked_in_at).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MemberId, &PresenceRecord)> {
        self.present.iter()
    }
}

/// Mutable state shared by the pipeline stages of one kiosk.
#[derive(Debug, Default)]
pub struct SessionState {
    pub presence: PresenceTracker,
    pub guard: AbuseGuard,
}

impl SessionState {
    pub fn new(lockout: Duration) -> Self {
        Self {
            presence: PresenceTracker::new(),
            guard: AbuseGuard::new(lockout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::ElapsedTime;

    fn check_in(id: u64, name: &str) -> RecognitionOutcome {
        RecognitionOutcome::CheckIn {
            member: MemberId::from(id),
            name: name.to_string(),
        }
    }

    #[test]
    fn check_in_records_presence() {
        let mut tracker = PresenceTracker::new();
        let now = SystemTime::now();
        let status = tracker.apply(&check_in(7, "Ana"), now);

        assert!(tracker.is_present(&MemberId::from(7)));
        assert_eq!(tracker.get(&MemberId::from(7)).unwrap().checked_in_at, now);
        assert!(status.to_string().contains("Ana"));
    }

    #[test]
    fn repeated_check_in_only_refreshes_timestamp() {
        let mut tracker = PresenceTracker::new();
        let t0 = SystemTime::now();
        let t1 = t0 + Duration::from_secs(30);

        tracker.apply(&check_in(7, "Ana"), t0);
        tracker.apply(&check_in(7, "Ana"), t1);

        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get(&MemberId::from(7)).unwrap().checked_in_at, t1);
    }

    #[test]
    fn check_out_removes_presence_and_reports_duration() {
        let mut tracker = PresenceTracker::new();
        let t0 = SystemTime::now();
        tracker.apply(&check_in(7, "Ana"), t0);
        assert_eq!(
            tracker.dwell(&MemberId::from(7), t0 + Duration::from_secs(60)),
            Some(Duration::from_secs(60))
        );

        let status = tracker.apply(
            &RecognitionOutcome::CheckOut {
                member: MemberId::from(7),
                name: "Ana".to_string(),
                elapsed: Some(ElapsedTime::Seconds(3600)),
            },
            t0 + Duration::from_secs(3600),
        );

        assert!(tracker.is_empty());
        assert!(status.to_string().contains("1h 00min 00s"));
    }

    #[test]
    fn check_out_follows_backend_even_without_local_record() {
        let mut tracker = PresenceTracker::new();
        let status = tracker.apply(
            &RecognitionOutcome::CheckOut {
                member: MemberId::from(9),
                name: "Caio".to_string(),
                elapsed: None,
            },
            SystemTime::now(),
        );
        assert!(matches!(status, KioskStatus::CheckedOut { .. }));
        assert!(tracker.is_empty());
    }

    #[test]
    fn failures_leave_presence_untouched() {
        let mut tracker = PresenceTracker::new();
        tracker.apply(&check_in(1, "Ana"), SystemTime::now());
        let status = tracker.apply(
            &RecognitionOutcome::Failed {
                reason: Some("Imagem inválida".to_string()),
                code: None,
                http_status: Some(400),
            },
            SystemTime::now(),
        );
        assert_eq!(tracker.len(), 1);
        assert_eq!(status.to_string(), "Imagem inválida");
    }
}
