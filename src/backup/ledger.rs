//! The backup ledger.
//!
//! An append-only list of backup events. Insertion order is the only order
//! used for dependency lookups and retention. Events are never removed; the
//! only mutations after append are `status` (one way) and the derived
//! `expired` flag.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::backup::resolver::{self, DependencyResolver};
use crate::backup::retention::{RetentionOutcome, RetentionPolicy};
use crate::backup::types::{BackupEvent, BackupId, BackupStatus, BackupType};
use crate::clock::{Clock, SystemClock};
use crate::error::BackupError;

#[derive(Debug, Default)]
struct LedgerState {
    events: Vec<BackupEvent>,
    by_id: HashMap<BackupId, usize>,
}

impl LedgerState {
    fn find(&self, id: &BackupId) -> Option<&BackupEvent> {
        self.by_id.get(id).map(|&idx| &self.events[idx])
    }
}

fn lock_err(context: &'static str) -> BackupError {
    BackupError::StatePoisoned { context }
}

/// Thread-safe backup ledger.
pub struct BackupLedger {
    state: RwLock<LedgerState>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BackupLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupLedger")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for BackupLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupLedger {
    /// Empty ledger stamped by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Empty ledger stamped by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            clock,
        }
    }

    /// Append a new in-progress event of `backup_type`.
    ///
    /// The resolver sees the history as it stands before the append. On
    /// error nothing is appended.
    ///
    /// # Errors
    /// - `MissingDependency` from the resolver
    /// - `DuplicateBackup` if the clock repeats an instant for the same type
    pub fn create_backup(
        &self,
        backup_type: BackupType,
        resolver: &dyn DependencyResolver,
    ) -> Result<BackupEvent, BackupError> {
        let mut state = self.state.write().map_err(|_| lock_err("ledger.create"))?;
        let event = self.stage(&state, backup_type, resolver)?;
        Self::append(&mut state, event.clone());
        Ok(event)
    }

    /// Append a new event and re-apply `policy`, all under one write.
    ///
    /// `admit` runs after the event is resolved and before anything changes;
    /// if it fails the ledger is left exactly as it was. Readers never see
    /// the new event without the retention pass it triggered.
    ///
    /// `admit` runs with the ledger locked and must not call back into it.
    ///
    /// # Errors
    /// Whatever [`Self::create_backup`] or `admit` returns.
    pub fn create_retained<F>(
        &self,
        backup_type: BackupType,
        resolver: &dyn DependencyResolver,
        policy: RetentionPolicy,
        admit: F,
    ) -> Result<(BackupEvent, RetentionOutcome), BackupError>
    where
        F: FnOnce(&BackupEvent) -> Result<(), BackupError>,
    {
        let mut state = self.state.write().map_err(|_| lock_err("ledger.create"))?;
        let event = self.stage(&state, backup_type, resolver)?;
        admit(&event)?;
        Self::append(&mut state, event.clone());
        let outcome = Self::retain(&mut state, policy);
        Ok((event, outcome))
    }

    fn stage(
        &self,
        state: &LedgerState,
        backup_type: BackupType,
        resolver: &dyn DependencyResolver,
    ) -> Result<BackupEvent, BackupError> {
        let parent_id = resolver.resolve(backup_type, &state.events)?;
        let event = BackupEvent::new(backup_type, self.clock.now(), parent_id);
        if state.by_id.contains_key(&event.id) {
            return Err(BackupError::DuplicateBackup { id: event.id });
        }
        Ok(event)
    }

    fn append(state: &mut LedgerState, event: BackupEvent) {
        tracing::info!(
            id = %event.id,
            parent = ?event.parent_id.as_ref().map(ToString::to_string),
            "backup started"
        );
        let idx = state.events.len();
        state.by_id.insert(event.id.clone(), idx);
        state.events.push(event);
    }

    fn retain(state: &mut LedgerState, policy: RetentionPolicy) -> RetentionOutcome {
        let outcome = policy.apply(&mut state.events);
        tracing::debug!(
            limit = policy.limit(),
            total = state.events.len(),
            newly_expired = outcome.newly_expired,
            restored = outcome.restored,
            "retention applied"
        );
        outcome
    }

    /// Mark `id` completed. Returns false if it already was.
    ///
    /// # Errors
    /// `UnknownBackup` if nothing is stored under `id`.
    pub fn complete(&self, id: &BackupId) -> Result<bool, BackupError> {
        let mut state = self.state.write().map_err(|_| lock_err("ledger.complete"))?;
        let idx = *state
            .by_id
            .get(id)
            .ok_or_else(|| BackupError::UnknownBackup { id: id.clone() })?;
        let event = &mut state.events[idx];
        if event.is_completed() {
            return Ok(false);
        }
        event.status = BackupStatus::Completed;
        tracing::info!(%id, "backup completed");
        Ok(true)
    }

    /// Recompute every `expired` flag under `policy`.
    ///
    /// # Errors
    /// Only on a poisoned lock.
    pub fn apply_policy(&self, policy: RetentionPolicy) -> Result<RetentionOutcome, BackupError> {
        let mut state = self.state.write().map_err(|_| lock_err("ledger.retention"))?;
        Ok(Self::retain(&mut state, policy))
    }

    /// Recompute every `expired` flag keeping the newest `limit` events.
    /// Returns how many events became expired.
    ///
    /// # Errors
    /// `InvalidRetention` when `limit` is zero.
    pub fn apply_retention(&self, limit: usize) -> Result<usize, BackupError> {
        let policy = RetentionPolicy::new(limit)?;
        Ok(self.apply_policy(policy)?.newly_expired)
    }

    /// # Errors
    /// Only on a poisoned lock.
    pub fn latest_completed_level0(&self) -> Result<Option<BackupEvent>, BackupError> {
        let state = self.state.read().map_err(|_| lock_err("ledger.latest_l0"))?;
        Ok(resolver::latest_completed_level0(&state.events).cloned())
    }

    /// # Errors
    /// Only on a poisoned lock.
    pub fn latest_completed_incremental(&self) -> Result<Option<BackupEvent>, BackupError> {
        let state = self.state.read().map_err(|_| lock_err("ledger.latest_incr"))?;
        Ok(resolver::latest_completed_incremental(&state.events).cloned())
    }

    /// # Errors
    /// Only on a poisoned lock.
    pub fn get(&self, id: &BackupId) -> Result<Option<BackupEvent>, BackupError> {
        let state = self.state.read().map_err(|_| lock_err("ledger.get"))?;
        Ok(state.find(id).cloned())
    }

    /// Every event in insertion order.
    ///
    /// # Errors
    /// Only on a poisoned lock.
    pub fn list(&self) -> Result<Vec<BackupEvent>, BackupError> {
        let state = self.state.read().map_err(|_| lock_err("ledger.list"))?;
        Ok(state.events.clone())
    }

    /// # Errors
    /// Only on a poisoned lock.
    pub fn len(&self) -> Result<usize, BackupError> {
        let state = self.state.read().map_err(|_| lock_err("ledger.len"))?;
        Ok(state.events.len())
    }

    /// # Errors
    /// Only on a poisoned lock.
    pub fn is_empty(&self) -> Result<bool, BackupError> {
        Ok(self.len()? == 0)
    }

    /// `id` followed by its parent, grandparent and so on down to the
    /// baseline.
    ///
    /// # Errors
    /// `UnknownBackup` if `id` is not in the ledger.
    pub fn dependency_chain(&self, id: &BackupId) -> Result<Vec<BackupEvent>, BackupError> {
        let state = self.state.read().map_err(|_| lock_err("ledger.chain"))?;
        let mut current = state
            .find(id)
            .ok_or_else(|| BackupError::UnknownBackup { id: id.clone() })?;
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        loop {
            if !seen.insert(&current.id) {
                break;
            }
            chain.push(current.clone());
            match current.parent_id.as_ref().and_then(|p| state.find(p)) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(chain)
    }

    /// True when `id` and every backup it depends on are completed and
    /// unexpired.
    ///
    /// # Errors
    /// `UnknownBackup` if `id` is not in the ledger.
    pub fn is_restorable(&self, id: &BackupId) -> Result<bool, BackupError> {
        let chain = self.dependency_chain(id)?;
        let complete_chain = chain
            .last()
            .is_some_and(|base| base.parent_id.is_none());
        Ok(complete_chain && chain.iter().all(BackupEvent::is_usable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};

    use crate::backup::resolver::IncrementalChainResolver;
    use crate::clock::ManualClock;

    fn ledger() -> BackupLedger {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        BackupLedger::with_clock(Arc::new(ManualClock::starting_at(start)))
    }

    fn create(ledger: &BackupLedger, t: BackupType) -> BackupEvent {
        ledger.create_backup(t, &IncrementalChainResolver).unwrap()
    }

    #[test]
    fn level1_without_baseline_leaves_ledger_empty() {
        let ledger = ledger();
        let err = ledger
            .create_backup(BackupType::IncrL1, &IncrementalChainResolver)
            .unwrap_err();
        assert_eq!(
            err,
            BackupError::MissingDependency {
                backup_type: BackupType::IncrL1
            }
        );
        assert_eq!(ledger.len().unwrap(), 0);
    }

    #[test]
    fn level1_depends_on_completed_level0() {
        let ledger = ledger();
        let l0 = create(&ledger, BackupType::IncrL0);
        assert!(l0.parent_id.is_none());
        assert_eq!(l0.status, BackupStatus::InProgress);

        // Still in progress: no baseline yet.
        assert!(ledger
            .create_backup(BackupType::IncrL1, &IncrementalChainResolver)
            .is_err());

        assert!(ledger.complete(&l0.id).unwrap());
        let l1 = create(&ledger, BackupType::IncrL1);
        assert_eq!(l1.parent_id, Some(l0.id.clone()));
        assert_eq!(ledger.latest_completed_level0().unwrap().unwrap().id, l0.id);
    }

    #[test]
    fn complete_is_idempotent() {
        let ledger = ledger();
        let full = create(&ledger, BackupType::Full);
        assert!(ledger.complete(&full.id).unwrap());
        assert!(!ledger.complete(&full.id).unwrap());
        assert!(ledger.get(&full.id).unwrap().unwrap().is_completed());

        let ghost = BackupId::derive(BackupType::Full, Utc::now());
        assert_eq!(
            ledger.complete(&ghost).unwrap_err().kind(),
            crate::error::ErrorKind::UnknownBackup
        );
    }

    #[test]
    fn retention_expires_in_progress_events_too() {
        let ledger = ledger();
        let ids: Vec<_> = (0..5).map(|_| create(&ledger, BackupType::Archivelog).id).collect();
        assert_eq!(ledger.apply_retention(3).unwrap(), 2);
        let expired: Vec<_> = ledger.list().unwrap().iter().map(|e| e.expired).collect();
        assert_eq!(expired, vec![true, true, false, false, false]);
        assert_eq!(ledger.get(&ids[0]).unwrap().unwrap().status, BackupStatus::InProgress);

        assert_eq!(ledger.apply_retention(3).unwrap(), 0);
        assert_eq!(ledger.apply_retention(5).unwrap(), 0);
        assert!(ledger.list().unwrap().iter().all(|e| !e.expired));
        assert!(ledger.apply_retention(0).is_err());
    }

    #[test]
    fn refused_admission_leaves_ledger_untouched() {
        let ledger = ledger();
        let full = create(&ledger, BackupType::Full);
        let policy = RetentionPolicy::new(1).unwrap();

        let err = ledger
            .create_retained(BackupType::Full, &IncrementalChainResolver, policy, |_| {
                Err(BackupError::SchedulerUnavailable)
            })
            .unwrap_err();
        assert_eq!(err, BackupError::SchedulerUnavailable);
        assert_eq!(ledger.len().unwrap(), 1);
        assert!(!ledger.get(&full.id).unwrap().unwrap().expired);
    }

    #[test]
    fn admitted_backup_is_appended_and_retained_together() {
        let ledger = ledger();
        let full = create(&ledger, BackupType::Full);
        let policy = RetentionPolicy::new(1).unwrap();

        let mut admitted = None;
        let (event, outcome) = ledger
            .create_retained(BackupType::Archivelog, &IncrementalChainResolver, policy, |e| {
                admitted = Some(e.id.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(admitted, Some(event.id.clone()));
        assert_eq!(outcome.newly_expired, 1);
        assert!(ledger.get(&full.id).unwrap().unwrap().expired);
        assert!(!ledger.get(&event.id).unwrap().unwrap().expired);
    }

    #[test]
    fn expired_baseline_blocks_level1() {
        let ledger = ledger();
        let l0 = create(&ledger, BackupType::IncrL0);
        ledger.complete(&l0.id).unwrap();
        create(&ledger, BackupType::Full);
        ledger.apply_retention(1).unwrap();
        assert!(ledger.latest_completed_level0().unwrap().is_none());
        assert!(ledger
            .create_backup(BackupType::IncrL1, &IncrementalChainResolver)
            .is_err());
    }

    #[test]
    fn dependency_chain_walks_to_baseline() {
        let ledger = ledger();
        let l0 = create(&ledger, BackupType::IncrL0);
        ledger.complete(&l0.id).unwrap();
        let a = create(&ledger, BackupType::IncrL1);
        ledger.complete(&a.id).unwrap();
        let b = create(&ledger, BackupType::IncrL1);
        assert_eq!(b.parent_id, Some(a.id.clone()));

        let chain: Vec<_> = ledger
            .dependency_chain(&b.id)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(chain, vec![b.id.clone(), a.id.clone(), l0.id.clone()]);

        assert!(!ledger.is_restorable(&b.id).unwrap());
        ledger.complete(&b.id).unwrap();
        assert!(ledger.is_restorable(&b.id).unwrap());

        // Expiring the baseline breaks the chain.
        ledger.apply_retention(2).unwrap();
        assert!(!ledger.is_restorable(&b.id).unwrap());
    }
}
