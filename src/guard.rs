//! Abuse guard: temporary kiosk lockout after rate-limit failures.
//!
//! Two states. `Open` lets the sampler run and keeps report actions enabled.
//! `Locked` is entered on a rate-limit outcome and expires on its own after the
//! cooldown; nothing can shorten or extend it once started.

use anyhow::{Context, Result};
use regex::Regex;
use std::time::{Duration, Instant};

use crate::recognition::RecognitionOutcome;

/// Default lockout cooldown.
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(5 * 60);

/// Phrase matched case-insensitively in free-text reasons when no pattern is configured.
pub const DEFAULT_RATE_LIMIT_PHRASE: &str = "muitas tentativas";

/// Structured failure codes that signal rate limiting.
const RATE_LIMIT_CODES: &[&str] = &["rate_limited", "muitas_tentativas"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockoutState {
    Open,
    Locked { until: Instant },
}

#[derive(Debug)]
pub struct AbuseGuard {
    cooldown: Duration,
    state: LockoutState,
}

impl AbuseGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: LockoutState::Open,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn state(&self) -> LockoutState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, LockoutState::Locked { .. })
    }

    /// Report actions are enabled exactly while the guard is open.
    pub fn report_actions_enabled(&self) -> bool {
        !self.is_locked()
    }

    /// Enter `Locked`. Returns false, leaving the expiry untouched, when already locked.
    pub fn trip(&mut self, now: Instant) -> bool {
        match self.state {
            LockoutState::Locked { .. } => false,
            LockoutState::Open => {
                self.state = LockoutState::Locked {
                    until: now + self.cooldown,
                };
                true
            }
        }
    }

    /// Reopen when the cooldown has elapsed. Returns true on the `Locked -> Open` edge.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            LockoutState::Locked { until } if now >= until => {
                self.state = LockoutState::Open;
                true
            }
            _ => false,
        }
    }

    /// Time left until reopening, if locked.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self.state {
            LockoutState::Open => None,
            LockoutState::Locked { until } => Some(until.saturating_duration_since(now)),
        }
    }
}

impl Default for AbuseGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOCKOUT)
    }
}

/// Decides whether a failed outcome is a rate-limit signal.
///
/// A structured `codigo` or HTTP 429 is preferred; the reason match covers
/// backends that only send free text.
#[derive(Clone, Debug, Default)]
pub struct RateLimitPolicy {
    reason_pattern: Option<Regex>,
}

impl RateLimitPolicy {
    /// Policy whose free-text fallback is a custom regex.
    pub fn with_pattern(reason_pattern: &str) -> Result<Self> {
        let regex = Regex::new(reason_pattern)
            .with_context(|| format!("invalid rate-limit pattern '{}'", reason_pattern))?;
        Ok(Self {
            reason_pattern: Some(regex),
        })
    }

    fn reason_matches(&self, reason: &str) -> bool {
        match &self.reason_pattern {
            Some(regex) => regex.is_match(reason),
            None => reason.to_lowercase().contains(DEFAULT_RATE_LIMIT_PHRASE),
        }
    }

    pub fn is_rate_limited(&self, outcome: &RecognitionOutcome) -> bool {
        let RecognitionOutcome::Failed {
            reason,
            code,
            http_status,
        } = outcome
        else {
            return false;
        };
        if let Some(code) = code {
            if RATE_LIMIT_CODES
                .iter()
                .any(|known| code.trim().eq_ignore_ascii_case(known))
            {
                return true;
            }
        }
        if *http_status == Some(429) {
            return true;
        }
        reason
            .as_deref()
            .is_some_and(|reason| self.reason_matches(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(reason: Option<&str>, code: Option<&str>, http: u16) -> RecognitionOutcome {
        RecognitionOutcome::Failed {
            reason: reason.map(str::to_string),
            code: code.map(str::to_string),
            http_status: Some(http),
        }
    }

    #[test]
    fn locks_and_reopens_after_exact_cooldown() {
        let mut guard = AbuseGuard::new(Duration::from_secs(300));
        let t0 = Instant::now();

        assert!(guard.trip(t0));
        assert!(guard.is_locked());
        assert!(!guard.report_actions_enabled());

        assert!(!guard.poll(t0 + Duration::from_secs(299)));
        assert!(guard.is_locked());
        assert_eq!(
            guard.remaining(t0 + Duration::from_secs(299)),
            Some(Duration::from_secs(1))
        );

        assert!(guard.poll(t0 + Duration::from_secs(300)));
        assert_eq!(guard.state(), LockoutState::Open);
        assert!(guard.report_actions_enabled());
        assert!(!guard.poll(t0 + Duration::from_secs(301)));
    }

    #[test]
    fn second_trip_does_not_extend_lockout() {
        let mut guard = AbuseGuard::new(Duration::from_secs(300));
        let t0 = Instant::now();
        assert!(guard.trip(t0));
        assert!(!guard.trip(t0 + Duration::from_secs(200)));
        assert_eq!(
            guard.state(),
            LockoutState::Locked {
                until: t0 + Duration::from_secs(300)
            }
        );
        assert!(guard.poll(t0 + Duration::from_secs(300)));
    }

    #[test]
    fn structured_code_and_429_are_rate_limits() {
        let policy = RateLimitPolicy::default();
        assert!(policy.is_rate_limited(&failed(None, Some("rate_limited"), 400)));
        assert!(policy.is_rate_limited(&failed(None, Some("MUITAS_TENTATIVAS"), 200)));
        assert!(policy.is_rate_limited(&failed(None, None, 429)));
        assert!(!policy.is_rate_limited(&failed(None, Some("not_found"), 404)));
    }

    #[test]
    fn reason_pattern_is_a_fallback() {
        let policy = RateLimitPolicy::default();
        assert!(policy.is_rate_limited(&failed(
            Some("Muitas tentativas. Aguarde."),
            None,
            200
        )));
        assert!(!policy.is_rate_limited(&failed(Some("Rosto não encontrado"), None, 200)));
        assert!(!policy.is_rate_limited(&RecognitionOutcome::Unrecognized {
            reason: Some("Muitas tentativas".to_string())
        }));
    }

    #[test]
    fn custom_pattern_must_compile() {
        assert!(RateLimitPolicy::with_pattern("(unclosed").is_err());
        let policy = RateLimitPolicy::with_pattern("(?i)too many attempts").unwrap();
        assert!(policy.is_rate_limited(&failed(Some("Too many attempts"), None, 200)));
        assert!(!policy.is_rate_limited(&failed(Some("Muitas tentativas"), None, 200)));
    }
}
