//! The simulator session: the command/query surface the presentation layer
//! drives.
//!
//! A session owns the incarnation store, the backup ledger, the retention
//! limit and the selection cursor. It is passed around explicitly; there is
//! no global instance.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::backup::resolver::{latest_completed_incremental, latest_completed_level0};
use crate::backup::{
    BackupEvent, BackupId, BackupLedger, BackupType, CompletionScheduler, DependencyResolver,
    IncrementalChainResolver, RetentionOutcome, RetentionPolicy, TimerScheduler,
};
use crate::clock::{Clock, SystemClock};
use crate::config::SimulatorConfig;
use crate::error::{LineageError, SimError, SimResult};
use crate::incarnation::{
    InMemoryIncarnationStore, Incarnation, IncarnationId, IncarnationStore, Lineage,
    LineageViolation,
};
use crate::recovery::{self, RecoveryOptions, RecoveryResult};

/// What `create_backup` produced.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupReceipt {
    pub event: BackupEvent,
    pub retention: RetentionOutcome,
}

impl BackupReceipt {
    /// Retention notice to surface once, if the new backup pushed older ones out.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        self.retention.notice()
    }
}

/// Rendered view of the whole session.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub incarnations: Vec<Incarnation>,
    pub active_incarnation_id: Option<IncarnationId>,
    pub selected_incarnation_id: Option<IncarnationId>,
    pub backups: Vec<BackupEvent>,
    pub retention_limit: usize,
    pub latest_level0_id: Option<BackupId>,
    pub latest_incremental_id: Option<BackupId>,
}

fn poisoned(context: &str) -> SimError {
    SimError::internal(format!("session state poisoned ({context})"))
}

/// Command/query API over one simulated database.
pub struct SimulatorSession {
    store: Arc<dyn IncarnationStore>,
    ledger: Arc<BackupLedger>,
    resolver: Arc<dyn DependencyResolver>,
    scheduler: Arc<dyn CompletionScheduler>,
    clock: Arc<dyn Clock>,
    retention: RwLock<RetentionPolicy>,
    selected: RwLock<Option<IncarnationId>>,
}

impl std::fmt::Debug for SimulatorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatorSession")
            .field("ledger", &self.ledger)
            .field("retention", &self.retention)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl SimulatorSession {
    /// Session on the system clock with a timer thread completing backups
    /// after `config.backup_duration`.
    ///
    /// # Errors
    /// `Config` if the configuration is invalid, `Backup` if the timer
    /// thread cannot start.
    pub fn new(config: &SimulatorConfig) -> SimResult<Self> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let store = Arc::new(InMemoryIncarnationStore::with_clock(Arc::clone(&clock)));
        let ledger = Arc::new(BackupLedger::with_clock(Arc::clone(&clock)));
        let scheduler = TimerScheduler::start(
            Arc::clone(&ledger),
            config.backup_duration,
            config.scheduler_queue_capacity,
        )?;
        let retention = RetentionPolicy::new(config.retention_limit)?;
        tracing::info!(
            retention_limit = retention.limit(),
            backup_ms = u64::try_from(config.backup_duration.as_millis()).unwrap_or(u64::MAX),
            "simulator session started"
        );
        Ok(Self::with_parts(
            store,
            ledger,
            Arc::new(scheduler),
            clock,
            retention,
        ))
    }

    /// Assemble a session from explicit parts.
    #[must_use]
    pub fn with_parts(
        store: Arc<dyn IncarnationStore>,
        ledger: Arc<BackupLedger>,
        scheduler: Arc<dyn CompletionScheduler>,
        clock: Arc<dyn Clock>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            resolver: Arc::new(IncrementalChainResolver),
            scheduler,
            clock,
            retention: RwLock::new(retention),
            selected: RwLock::new(None),
        }
    }

    /// Replace the backup dependency rule.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Get a reference to the incarnation store.
    pub fn store(&self) -> &Arc<dyn IncarnationStore> {
        &self.store
    }

    /// Get a reference to the backup ledger.
    pub fn ledger(&self) -> &Arc<BackupLedger> {
        &self.ledger
    }

    fn set_selected(&self, id: Option<IncarnationId>) -> SimResult<()> {
        *self.selected.write().map_err(|_| poisoned("selected"))? = id;
        Ok(())
    }

    fn require(&self, id: IncarnationId) -> SimResult<Incarnation> {
        self.store
            .get(id)?
            .ok_or_else(|| LineageError::UnknownIncarnation { id }.into())
    }

    // --- Incarnation commands ---

    /// Create a new incarnation under `parent_id` and make it ACTIVE and
    /// selected. Insertion and activation happen under one store write.
    ///
    /// # Errors
    /// `UnknownParent` if `parent_id` names nothing; nothing changes.
    pub fn create_incarnation(
        &self,
        parent_id: Option<IncarnationId>,
        resetlogs: bool,
    ) -> SimResult<Incarnation> {
        let draft = Incarnation::seeded(parent_id, resetlogs, self.clock.now());
        let incarnation = self.store.adopt(draft).map_err(|err| {
            tracing::warn!(error = %err, "incarnation rejected");
            SimError::from(err)
        })?;
        self.set_selected(Some(incarnation.id))?;
        tracing::info!(id = %incarnation.id, resetlogs, "incarnation created");
        Ok(incarnation)
    }

    /// Create a new incarnation whose parent is the selected one.
    ///
    /// # Errors
    /// See [`Self::create_incarnation`].
    pub fn create_from_selected(&self, resetlogs: bool) -> SimResult<Incarnation> {
        let parent = self.selected()?;
        self.create_incarnation(parent, resetlogs)
    }

    /// Move the selection cursor without changing any status.
    ///
    /// # Errors
    /// `UnknownIncarnation` if `id` names nothing.
    pub fn select(&self, id: IncarnationId) -> SimResult<()> {
        self.require(id)?;
        self.set_selected(Some(id))
    }

    /// Make `id` the only ACTIVE incarnation and select it.
    ///
    /// # Errors
    /// `UnknownIncarnation` if `id` names nothing; nothing changes.
    pub fn select_active(&self, id: IncarnationId) -> SimResult<()> {
        self.store.select_active(id).map_err(|err| {
            tracing::warn!(%id, error = %err, "activation rejected");
            SimError::from(err)
        })?;
        self.set_selected(Some(id))
    }

    /// Activate the selected incarnation. Returns it.
    ///
    /// # Errors
    /// `Internal` if nothing is selected.
    pub fn revert_to_selected(&self) -> SimResult<Incarnation> {
        let id = self
            .selected()?
            .ok_or_else(|| SimError::internal("no incarnation selected"))?;
        self.select_active(id)?;
        let reverted = self.require(id)?;
        tracing::info!(%id, "reverted to incarnation");
        Ok(reverted)
    }

    /// Recover `source_id` and adopt the result as the ACTIVE incarnation.
    ///
    /// The request is validated before the source is looked up, so a missing
    /// target is reported even on an empty store. Failures come back in the
    /// result; the store is untouched.
    pub fn recover(&self, source_id: IncarnationId, options: &RecoveryOptions) -> RecoveryResult {
        if let Err(err) = options.validate() {
            tracing::warn!(recovery = %options.recovery_type, error = %err, "recovery rejected");
            return RecoveryResult::failed(err.kind(), &err);
        }
        let source = match self.require(source_id) {
            Ok(source) => source,
            Err(err) => {
                tracing::warn!(%source_id, error = %err, "recovery rejected");
                return RecoveryResult::failed(err.kind(), &err);
            }
        };
        self.apply_recovery(&source, options)
    }

    /// Recover the ACTIVE incarnation.
    pub fn recover_active(&self, options: &RecoveryOptions) -> RecoveryResult {
        if let Err(err) = options.validate() {
            return RecoveryResult::failed(err.kind(), &err);
        }
        match self.store.get_active() {
            Ok(Some(active)) => self.apply_recovery(&active, options),
            Ok(None) => RecoveryResult::failed(
                crate::error::ErrorKind::UnknownIncarnation,
                "no active incarnation",
            ),
            Err(err) => RecoveryResult::failed(err.kind(), &err),
        }
    }

    fn apply_recovery(&self, source: &Incarnation, options: &RecoveryOptions) -> RecoveryResult {
        let result = recovery::recover(source, options, self.clock.as_ref());
        let Some(incarnation) = result.new_incarnation.clone() else {
            return result;
        };
        let new_id = incarnation.id;
        if let Err(err) = self.store.adopt(incarnation) {
            tracing::warn!(error = %err, "recovered incarnation not adopted");
            return RecoveryResult::failed(err.kind(), &err);
        }
        if let Err(err) = self.set_selected(Some(new_id)) {
            return RecoveryResult::failed(err.kind(), &err);
        }
        tracing::info!(
            source = %source.id,
            id = %new_id,
            recovery = %options.recovery_type,
            "recovery applied"
        );
        result
    }

    // --- Backup commands ---

    /// Start a backup, re-apply retention and schedule its completion.
    ///
    /// The append, the retention pass and the scheduling request succeed or
    /// fail together, under the current retention limit.
    ///
    /// # Errors
    /// - `MissingDependency` for a level 1 without a usable level 0
    /// - `SchedulerUnavailable` / `SchedulerQueueFull` if completion cannot
    ///   be scheduled
    ///
    /// On any error the ledger is unchanged.
    pub fn create_backup(&self, backup_type: BackupType) -> SimResult<BackupReceipt> {
        let policy = self.retention.read().map_err(|_| poisoned("retention"))?;
        let (event, retention) = self
            .ledger
            .create_retained(backup_type, self.resolver.as_ref(), *policy, |event| {
                self.scheduler.schedule(event.id.clone())
            })
            .map_err(|err| {
                tracing::warn!(backup = %backup_type, error = %err, "backup rejected");
                SimError::from(err)
            })?;
        drop(policy);
        if let Some(notice) = retention.notice() {
            tracing::info!(%notice, "retention");
        }
        Ok(BackupReceipt { event, retention })
    }

    /// Mark a backup completed. Returns false if it already was.
    ///
    /// # Errors
    /// `UnknownBackup` if `id` names nothing.
    pub fn complete_backup(&self, id: &BackupId) -> SimResult<bool> {
        Ok(self.ledger.complete(id)?)
    }

    /// Change the retention limit and re-apply it to the whole ledger.
    ///
    /// # Errors
    /// `InvalidRetention` for zero; the limit is unchanged.
    pub fn set_retention(&self, limit: usize) -> SimResult<RetentionOutcome> {
        let policy = RetentionPolicy::new(limit).map_err(|err| {
            tracing::warn!(limit, error = %err, "retention rejected");
            SimError::from(err)
        })?;
        let mut current = self.retention.write().map_err(|_| poisoned("retention"))?;
        let outcome = self.ledger.apply_policy(policy)?;
        *current = policy;
        drop(current);
        tracing::info!(limit, newly_expired = outcome.newly_expired, "retention changed");
        Ok(outcome)
    }

    // --- Queries ---

    /// # Errors
    /// Only on poisoned state.
    pub fn retention_policy(&self) -> SimResult<RetentionPolicy> {
        Ok(*self.retention.read().map_err(|_| poisoned("retention"))?)
    }

    /// # Errors
    /// Only on poisoned state.
    pub fn selected(&self) -> SimResult<Option<IncarnationId>> {
        Ok(*self.selected.read().map_err(|_| poisoned("selected"))?)
    }

    /// # Errors
    /// Only on poisoned state.
    pub fn list_incarnations(&self) -> SimResult<Vec<Incarnation>> {
        Ok(self.store.list_all()?)
    }

    /// # Errors
    /// Only on poisoned state.
    pub fn get_active_incarnation(&self) -> SimResult<Option<Incarnation>> {
        Ok(self.store.get_active()?)
    }

    /// # Errors
    /// Only on poisoned state.
    pub fn get_incarnation(&self, id: IncarnationId) -> SimResult<Option<Incarnation>> {
        Ok(self.store.get(id)?)
    }

    /// # Errors
    /// Only on poisoned state.
    pub fn list_backups(&self) -> SimResult<Vec<BackupEvent>> {
        Ok(self.ledger.list()?)
    }

    /// # Errors
    /// Only on poisoned state.
    pub fn latest_completed_level0(&self) -> SimResult<Option<BackupEvent>> {
        Ok(self.ledger.latest_completed_level0()?)
    }

    /// # Errors
    /// Only on poisoned state.
    pub fn latest_completed_incremental(&self) -> SimResult<Option<BackupEvent>> {
        Ok(self.ledger.latest_completed_incremental()?)
    }

    /// Parent chain of `id`, nearest first.
    ///
    /// # Errors
    /// `UnknownIncarnation` if `id` names nothing.
    pub fn ancestors(&self, id: IncarnationId) -> SimResult<Vec<Incarnation>> {
        self.require(id)?;
        let all = self.store.list_all()?;
        Ok(Lineage::new(&all).ancestors(id).into_iter().cloned().collect())
    }

    /// Direct children of `id`, in creation order.
    ///
    /// # Errors
    /// `UnknownIncarnation` if `id` names nothing.
    pub fn children(&self, id: IncarnationId) -> SimResult<Vec<Incarnation>> {
        self.require(id)?;
        let all = self.store.list_all()?;
        Ok(Lineage::new(&all).children(id).into_iter().cloned().collect())
    }

    /// # Errors
    /// Only on poisoned state.
    pub fn roots(&self) -> SimResult<Vec<Incarnation>> {
        let all = self.store.list_all()?;
        Ok(Lineage::new(&all).roots().into_iter().cloned().collect())
    }

    /// # Errors
    /// `UnknownIncarnation` if `id` names nothing.
    pub fn depth(&self, id: IncarnationId) -> SimResult<usize> {
        let all = self.store.list_all()?;
        Lineage::new(&all)
            .depth(id)
            .ok_or_else(|| LineageError::UnknownIncarnation { id }.into())
    }

    /// Every lineage invariant currently broken. Empty when healthy.
    ///
    /// # Errors
    /// Only on poisoned state.
    pub fn validate_lineage(&self) -> SimResult<Vec<LineageViolation>> {
        let all = self.store.list_all()?;
        Ok(Lineage::new(&all).validate())
    }

    /// # Errors
    /// `UnknownBackup` if `id` names nothing.
    pub fn dependency_chain(&self, id: &BackupId) -> SimResult<Vec<BackupEvent>> {
        Ok(self.ledger.dependency_chain(id)?)
    }

    /// # Errors
    /// `UnknownBackup` if `id` names nothing.
    pub fn is_restorable(&self, id: &BackupId) -> SimResult<bool> {
        Ok(self.ledger.is_restorable(id)?)
    }

    /// Everything the presentation layer renders.
    ///
    /// Each of the store and the ledger is read once, so the latest-backup
    /// ids always agree with the listed backups.
    ///
    /// # Errors
    /// Only on poisoned state.
    pub fn snapshot(&self) -> SimResult<SessionSnapshot> {
        let incarnations = self.store.list_all()?;
        let active_incarnation_id = incarnations
            .iter()
            .rev()
            .find(|inc| inc.is_active())
            .map(|inc| inc.id);
        let backups = self.ledger.list()?;
        let latest_level0_id = latest_completed_level0(&backups).map(|e| e.id.clone());
        let latest_incremental_id = latest_completed_incremental(&backups).map(|e| e.id.clone());
        Ok(SessionSnapshot {
            active_incarnation_id,
            selected_incarnation_id: self.selected()?,
            backups,
            retention_limit: self.retention_policy()?.limit(),
            latest_level0_id,
            latest_incremental_id,
            incarnations,
        })
    }
}
