//! Per-team circuit breaker
//!
//! Pure state transitions, no I/O and no timer thread. The circuit opens after
//! `failure_threshold` consecutive failures and is closed again lazily, the
//! first time availability is read after `cooldown` has elapsed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Consecutive failures that open the circuit
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Time an open circuit stays open before the next availability read closes it
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Thresholds shared by every breaker in a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitPolicy {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl CircuitPolicy {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
        }
    }
}

/// Circuit sub-state of a team record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    /// Shared between task failures and failed health probes
    pub consecutive_failures: u32,
    pub open: bool,
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    policy: CircuitPolicy,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitPolicy::default())
    }
}

impl CircuitBreaker {
    pub fn new(policy: CircuitPolicy) -> Self {
        Self {
            consecutive_failures: 0,
            open: false,
            opened_at: None,
            policy,
        }
    }

    pub fn policy(&self) -> CircuitPolicy {
        self.policy
    }

    /// Reset the failure streak. An open circuit stays open.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failure; returns true when this call opened the circuit
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures >= self.policy.failure_threshold && !self.open {
            self.open = true;
            self.opened_at = Some(now);
            return true;
        }
        false
    }

    /// Close the circuit once the full cooldown has elapsed; returns true if it closed
    pub fn try_close(&mut self, now: DateTime<Utc>) -> bool {
        if !self.open {
            return false;
        }

        let Some(opened_at) = self.opened_at else {
            return false;
        };

        let elapsed = now.signed_duration_since(opened_at);
        let cooldown = chrono::Duration::from_std(self.policy.cooldown)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));

        if elapsed >= cooldown {
            self.open = false;
            self.opened_at = None;
            true
        } else {
            false
        }
    }

    /// Whether the circuit currently lets traffic through (applies cooldown)
    pub fn allows_traffic(&mut self, now: DateTime<Utc>) -> bool {
        self.try_close(now);
        !self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let mut breaker = CircuitBreaker::default();
        let now = Utc::now();

        assert!(!breaker.record_failure(now));
        assert!(!breaker.record_failure(now));
        assert!(!breaker.open);
        assert!(breaker.record_failure(now));
        assert!(breaker.open);
        assert_eq!(breaker.opened_at, Some(now));
    }

    #[test]
    fn test_further_failures_do_not_restamp() {
        let mut breaker = CircuitBreaker::default();
        let opened = Utc::now();
        for _ in 0..3 {
            breaker.record_failure(opened);
        }

        let later = opened + chrono::Duration::seconds(30);
        assert!(!breaker.record_failure(later));
        assert_eq!(breaker.opened_at, Some(opened));
        assert_eq!(breaker.consecutive_failures, 4);
    }

    #[test]
    fn test_success_resets_streak_but_not_circuit() {
        let mut breaker = CircuitBreaker::default();
        let now = Utc::now();
        for _ in 0..3 {
            breaker.record_failure(now);
        }

        breaker.record_success();
        assert_eq!(breaker.consecutive_failures, 0);
        assert!(breaker.open);
    }

    #[test]
    fn test_closes_after_cooldown() {
        let mut breaker = CircuitBreaker::default();
        let opened = Utc::now() - chrono::Duration::minutes(6);
        for _ in 0..3 {
            breaker.record_failure(opened);
        }

        assert!(breaker.allows_traffic(Utc::now()));
        assert!(!breaker.open);
        assert!(breaker.opened_at.is_none());
    }

    #[test]
    fn test_stays_open_within_cooldown() {
        let mut breaker = CircuitBreaker::default();
        let opened = Utc::now() - chrono::Duration::minutes(4);
        for _ in 0..3 {
            breaker.record_failure(opened);
        }

        assert!(!breaker.allows_traffic(Utc::now()));
        assert!(breaker.open);
    }

    #[test]
    fn test_closes_exactly_at_cooldown() {
        let mut breaker = CircuitBreaker::default();
        let opened = Utc::now();
        for _ in 0..3 {
            breaker.record_failure(opened);
        }

        assert!(!breaker.try_close(opened + chrono::Duration::seconds(299)));
        assert!(breaker.try_close(opened + chrono::Duration::seconds(300)));
        assert!(!breaker.open);
    }

    #[test]
    fn test_custom_policy() {
        let mut breaker = CircuitBreaker::new(CircuitPolicy::new(1, Duration::from_secs(1)));
        let opened = Utc::now();

        assert!(breaker.record_failure(opened));
        assert!(!breaker.allows_traffic(opened));
        assert!(breaker.allows_traffic(opened + chrono::Duration::seconds(2)));
    }
}
