//! Dependency resolution for new backups.

use crate::backup::types::{BackupEvent, BackupId, BackupType};
use crate::error::BackupError;

/// Most recent completed, unexpired level 0 backup, scanning newest first.
#[must_use]
pub fn latest_completed_level0(history: &[BackupEvent]) -> Option<&BackupEvent> {
    history
        .iter()
        .rev()
        .find(|e| e.backup_type == BackupType::IncrL0 && e.is_usable())
}

/// Most recent completed, unexpired level 0 or level 1 backup, scanning newest first.
#[must_use]
pub fn latest_completed_incremental(history: &[BackupEvent]) -> Option<&BackupEvent> {
    history
        .iter()
        .rev()
        .find(|e| e.backup_type.is_incremental() && e.is_usable())
}

/// Decides the dependency parent of a backup about to be appended.
pub trait DependencyResolver: Send + Sync {
    /// Resolve the parent of a new `backup_type` backup given the ledger
    /// history in insertion order.
    ///
    /// # Errors
    /// `MissingDependency` when the backup cannot be taken yet.
    fn resolve(
        &self,
        backup_type: BackupType,
        history: &[BackupEvent],
    ) -> Result<Option<BackupId>, BackupError>;
}

/// Level 1 backups chain onto the latest usable incremental.
///
/// A level 1 needs a usable level 0 baseline somewhere in the ledger. Its
/// parent is then the newest usable level 0 *or* level 1, so level 1 backups
/// may stack on each other. Every other type is standalone.
#[derive(Debug, Default, Clone, Copy)]
pub struct IncrementalChainResolver;

impl DependencyResolver for IncrementalChainResolver {
    fn resolve(
        &self,
        backup_type: BackupType,
        history: &[BackupEvent],
    ) -> Result<Option<BackupId>, BackupError> {
        match backup_type {
            BackupType::IncrL1 => {
                if latest_completed_level0(history).is_none() {
                    return Err(BackupError::MissingDependency { backup_type });
                }
                Ok(latest_completed_incremental(history).map(|e| e.id.clone()))
            }
            BackupType::Full
            | BackupType::IncrL0
            | BackupType::Differential
            | BackupType::Cumulative
            | BackupType::Archivelog
            | BackupType::Controlfile => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone, Utc};

    use crate::backup::types::BackupStatus;

    fn history(specs: &[(BackupType, bool, bool)]) -> Vec<BackupEvent> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        specs
            .iter()
            .enumerate()
            .map(|(i, &(t, completed, expired))| {
                let mut e = BackupEvent::new(t, t0 + Duration::seconds(i as i64), None);
                if completed {
                    e.status = BackupStatus::Completed;
                }
                e.expired = expired;
                e
            })
            .collect()
    }

    #[test]
    fn level1_without_baseline_is_refused() {
        let resolver = IncrementalChainResolver;
        assert_eq!(
            resolver.resolve(BackupType::IncrL1, &[]),
            Err(BackupError::MissingDependency {
                backup_type: BackupType::IncrL1
            })
        );

        // In-progress and expired baselines do not count.
        let h = history(&[
            (BackupType::IncrL0, false, false),
            (BackupType::IncrL0, true, true),
            (BackupType::Full, true, false),
        ]);
        assert!(resolver.resolve(BackupType::IncrL1, &h).is_err());
    }

    #[test]
    fn level1_chains_onto_latest_incremental() {
        let h = history(&[
            (BackupType::IncrL0, true, false),
            (BackupType::Full, true, false),
            (BackupType::IncrL1, true, false),
            (BackupType::IncrL1, false, false),
        ]);
        let parent = IncrementalChainResolver
            .resolve(BackupType::IncrL1, &h)
            .unwrap();
        assert_eq!(parent, Some(h[2].id.clone()));
    }

    #[test]
    fn other_types_have_no_parent() {
        let h = history(&[(BackupType::IncrL0, true, false)]);
        for t in BackupType::ALL {
            if t == BackupType::IncrL1 {
                continue;
            }
            assert_eq!(IncrementalChainResolver.resolve(t, &h).unwrap(), None);
        }
    }

    #[test]
    fn latest_queries_skip_unusable_events() {
        let h = history(&[
            (BackupType::IncrL0, true, false),
            (BackupType::IncrL1, true, false),
            (BackupType::IncrL0, false, false),
            (BackupType::IncrL1, true, true),
        ]);
        assert_eq!(latest_completed_level0(&h).map(|e| &e.id), Some(&h[0].id));
        assert_eq!(latest_completed_incremental(&h).map(|e| &e.id), Some(&h[1].id));
        assert!(latest_completed_level0(&[]).is_none());
    }
}
