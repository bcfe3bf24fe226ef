//! Count-based retention.
//!
//! The newest `limit` events in insertion order are kept; everything older
//! is expired. The flags are recomputed from scratch on every pass, so the
//! result depends only on the ledger length and the limit.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::backup::types::BackupEvent;
use crate::error::BackupError;

/// Retention limit used when none is configured.
pub const DEFAULT_RETENTION_LIMIT: usize = 5;

/// Keep the newest `limit` backups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct RetentionPolicy {
    limit: NonZeroUsize,
}

/// What a retention pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionOutcome {
    /// Events that went from unexpired to expired in this pass.
    pub newly_expired: usize,
    /// Events that went from expired back to unexpired.
    pub restored: usize,
    /// Events expired after the pass.
    pub expired_total: usize,
}

impl RetentionOutcome {
    /// One-time notice for the presentation layer, if anything expired.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        (self.newly_expired > 0).then(|| {
            format!(
                "{} backup(s) expired due to retention policy.",
                self.newly_expired
            )
        })
    }
}

impl RetentionPolicy {
    /// # Errors
    /// `InvalidRetention` when `limit` is zero.
    pub fn new(limit: usize) -> Result<Self, BackupError> {
        NonZeroUsize::new(limit)
            .map(|limit| Self { limit })
            .ok_or(BackupError::InvalidRetention { limit })
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit.get()
    }

    /// How many of `count` events fall outside the window.
    #[must_use]
    pub const fn expired_count(&self, count: usize) -> usize {
        count.saturating_sub(self.limit.get())
    }

    /// Re-derive `expired` for every event.
    pub fn apply(&self, events: &mut [BackupEvent]) -> RetentionOutcome {
        let cutoff = self.expired_count(events.len());
        let mut outcome = RetentionOutcome {
            expired_total: cutoff,
            ..RetentionOutcome::default()
        };
        for (idx, event) in events.iter_mut().enumerate() {
            let expired = idx < cutoff;
            match (event.expired, expired) {
                (false, true) => outcome.newly_expired += 1,
                (true, false) => outcome.restored += 1,
                _ => {}
            }
            event.expired = expired;
        }
        outcome
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            limit: NonZeroUsize::new(DEFAULT_RETENTION_LIMIT).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl TryFrom<usize> for RetentionPolicy {
    type Error = BackupError;

    fn try_from(limit: usize) -> Result<Self, Self::Error> {
        Self::new(limit)
    }
}

impl From<RetentionPolicy> for usize {
    fn from(policy: RetentionPolicy) -> Self {
        policy.limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone, Utc};

    use crate::backup::types::BackupType;

    fn events(n: usize) -> Vec<BackupEvent> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| BackupEvent::new(BackupType::Full, t0 + Duration::seconds(i as i64), None))
            .collect()
    }

    fn flags(events: &[BackupEvent]) -> Vec<bool> {
        events.iter().map(|e| e.expired).collect()
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert_eq!(
            RetentionPolicy::new(0),
            Err(BackupError::InvalidRetention { limit: 0 })
        );
        assert_eq!(RetentionPolicy::default().limit(), DEFAULT_RETENTION_LIMIT);
    }

    #[test]
    fn oldest_events_expire() {
        let mut ev = events(5);
        let outcome = RetentionPolicy::new(3).unwrap().apply(&mut ev);
        assert_eq!(flags(&ev), vec![true, true, false, false, false]);
        assert_eq!(outcome.newly_expired, 2);
        assert_eq!(outcome.expired_total, 2);
        assert_eq!(
            outcome.notice().as_deref(),
            Some("2 backup(s) expired due to retention policy.")
        );
        assert!(RetentionOutcome::default().notice().is_none());
    }

    #[test]
    fn widening_the_window_restores() {
        let mut ev = events(5);
        RetentionPolicy::new(3).unwrap().apply(&mut ev);
        let outcome = RetentionPolicy::new(5).unwrap().apply(&mut ev);
        assert_eq!(flags(&ev), vec![false; 5]);
        assert_eq!(outcome.restored, 2);
        assert_eq!(outcome.newly_expired, 0);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let mut ev = events(7);
        let policy = RetentionPolicy::new(2).unwrap();
        policy.apply(&mut ev);
        let snapshot = ev.clone();
        let outcome = policy.apply(&mut ev);
        assert_eq!(ev, snapshot);
        assert_eq!(outcome.newly_expired, 0);
        assert_eq!(outcome.restored, 0);
    }

    #[test]
    fn result_is_path_independent() {
        let mut direct = events(6);
        RetentionPolicy::new(4).unwrap().apply(&mut direct);

        let mut wandering = events(6);
        for limit in [1, 6, 2, 4] {
            RetentionPolicy::new(limit).unwrap().apply(&mut wandering);
        }
        assert_eq!(flags(&direct), flags(&wandering));
    }

    #[test]
    fn serde_rejects_zero() {
        assert!(serde_json::from_str::<RetentionPolicy>("0").is_err());
        let p: RetentionPolicy = serde_json::from_str("3").unwrap();
        assert_eq!(p.limit(), 3);
    }
}
