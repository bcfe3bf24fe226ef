//! Incarnation storage.
//!
//! The store owns every incarnation ever created and decides which one is
//! ACTIVE. Incarnations are never deleted, and their parentage and metadata
//! never change after insertion. Only status moves.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::error::LineageError;
use crate::incarnation::types::{Incarnation, IncarnationId, IncarnationStatus};

/// Storage contract for the incarnation lineage.
///
/// # Invariants
/// - Once non-empty, exactly one incarnation is ACTIVE after every
///   `select_active` or `adopt`.
/// - Every `parent_id` names an incarnation already in the store, so the
///   lineage is acyclic by construction.
pub trait IncarnationStore: Send + Sync {
    /// Build and insert a new ACTIVE incarnation with seeded metadata.
    ///
    /// Other incarnations keep their status; demotion is done with
    /// `select_active`.
    ///
    /// # Errors
    /// - `UnknownParent`: `parent_id` is set but names no stored incarnation
    fn create_incarnation(
        &self,
        parent_id: Option<IncarnationId>,
        resetlogs: bool,
    ) -> Result<Incarnation, LineageError>;

    /// Insert an already built incarnation as-is.
    ///
    /// # Errors
    /// - `DuplicateIncarnation`: the id is already stored
    /// - `UnknownParent`: the parent is not stored
    fn insert(&self, incarnation: Incarnation) -> Result<(), LineageError>;

    /// Make `id` the only ACTIVE incarnation and demote every other one.
    ///
    /// # Errors
    /// - `UnknownIncarnation`: nothing is stored under `id`; no status changes
    fn select_active(&self, id: IncarnationId) -> Result<(), LineageError>;

    /// Insert `incarnation` and make it the only ACTIVE one, under a single
    /// write. Returns the stored copy.
    ///
    /// # Errors
    /// Same as `insert`; on error nothing changes.
    fn adopt(&self, incarnation: Incarnation) -> Result<Incarnation, LineageError>;

    /// Get an incarnation by ID.
    fn get(&self, id: IncarnationId) -> Result<Option<Incarnation>, LineageError>;

    /// All incarnations in creation order.
    fn list_all(&self) -> Result<Vec<Incarnation>, LineageError>;

    /// The ACTIVE incarnation, or `None` while the store is empty.
    fn get_active(&self) -> Result<Option<Incarnation>, LineageError>;

    /// Number of stored incarnations.
    fn len(&self) -> Result<usize, LineageError>;

    /// Returns true when nothing has been created yet.
    fn is_empty(&self) -> Result<bool, LineageError> {
        Ok(self.len()? == 0)
    }
}

#[derive(Debug, Default)]
struct IncarnationState {
    ordered: Vec<Incarnation>,
    by_id: HashMap<IncarnationId, usize>,
}

impl IncarnationState {
    fn check_insertable(&self, incarnation: &Incarnation) -> Result<(), LineageError> {
        if self.by_id.contains_key(&incarnation.id) {
            return Err(LineageError::DuplicateIncarnation { id: incarnation.id });
        }
        if let Some(parent) = incarnation.parent_id {
            if !self.by_id.contains_key(&parent) {
                return Err(LineageError::UnknownParent { id: parent });
            }
        }
        Ok(())
    }

    fn push(&mut self, incarnation: Incarnation) {
        self.by_id.insert(incarnation.id, self.ordered.len());
        self.ordered.push(incarnation);
    }

    fn activate(&mut self, id: IncarnationId) -> Result<(), LineageError> {
        if !self.by_id.contains_key(&id) {
            return Err(LineageError::UnknownIncarnation { id });
        }
        for inc in &mut self.ordered {
            inc.status = if inc.id == id {
                IncarnationStatus::Active
            } else {
                IncarnationStatus::Inactive
            };
        }
        Ok(())
    }
}

fn lock_err(context: &'static str) -> LineageError {
    LineageError::StatePoisoned { context }
}

/// Thread-safe in-memory incarnation store.
pub struct InMemoryIncarnationStore {
    state: RwLock<IncarnationState>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryIncarnationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIncarnationStore")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryIncarnationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIncarnationStore {
    /// Create an empty store stamped by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create an empty store stamped by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(IncarnationState::default()),
            clock,
        }
    }

    /// The clock used to stamp new incarnations.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl IncarnationStore for InMemoryIncarnationStore {
    fn create_incarnation(
        &self,
        parent_id: Option<IncarnationId>,
        resetlogs: bool,
    ) -> Result<Incarnation, LineageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("incarnation.create"))?;
        let incarnation = Incarnation::seeded(parent_id, resetlogs, self.clock.now());
        state.check_insertable(&incarnation)?;
        state.push(incarnation.clone());
        tracing::info!(
            id = %incarnation.id,
            parent = ?incarnation.parent_id,
            resetlogs,
            "incarnation created"
        );
        Ok(incarnation)
    }

    fn insert(&self, incarnation: Incarnation) -> Result<(), LineageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("incarnation.insert"))?;
        state.check_insertable(&incarnation)?;
        state.push(incarnation);
        Ok(())
    }

    fn select_active(&self, id: IncarnationId) -> Result<(), LineageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("incarnation.select_active"))?;
        state.activate(id)?;
        tracing::info!(%id, "incarnation activated");
        Ok(())
    }

    fn adopt(&self, incarnation: Incarnation) -> Result<Incarnation, LineageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("incarnation.adopt"))?;
        state.check_insertable(&incarnation)?;
        let id = incarnation.id;
        state.push(incarnation);
        state.activate(id)?;
        let idx = state.by_id[&id];
        Ok(state.ordered[idx].clone())
    }

    fn get(&self, id: IncarnationId) -> Result<Option<Incarnation>, LineageError> {
        let state = self.state.read().map_err(|_| lock_err("incarnation.get"))?;
        Ok(state.by_id.get(&id).map(|&idx| state.ordered[idx].clone()))
    }

    fn list_all(&self) -> Result<Vec<Incarnation>, LineageError> {
        let state = self.state.read().map_err(|_| lock_err("incarnation.list"))?;
        Ok(state.ordered.clone())
    }

    fn get_active(&self) -> Result<Option<Incarnation>, LineageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("incarnation.get_active"))?;
        // A freshly created incarnation is ACTIVE before the caller demotes the
        // rest, so prefer the most recent one if several are.
        Ok(state
            .ordered
            .iter()
            .rev()
            .find(|inc| inc.is_active())
            .cloned())
    }

    fn len(&self) -> Result<usize, LineageError> {
        let state = self.state.read().map_err(|_| lock_err("incarnation.len"))?;
        Ok(state.ordered.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};

    use crate::clock::ManualClock;

    fn store() -> InMemoryIncarnationStore {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        InMemoryIncarnationStore::with_clock(Arc::new(ManualClock::starting_at(start)))
    }

    fn active_count(store: &InMemoryIncarnationStore) -> usize {
        store
            .list_all()
            .unwrap()
            .iter()
            .filter(|i| i.is_active())
            .count()
    }

    #[test]
    fn create_root_and_child() {
        let store = store();
        assert!(store.is_empty().unwrap());
        assert!(store.get_active().unwrap().is_none());

        let root = store.create_incarnation(None, false).unwrap();
        assert!(root.is_root());
        assert_eq!(root.status, IncarnationStatus::Active);

        let child = store.create_incarnation(Some(root.id), true).unwrap();
        assert_eq!(child.parent_id, Some(root.id));
        assert!(child.timestamp > root.timestamp);
        assert_eq!(store.len().unwrap(), 2);

        // Creation does not demote.
        assert_eq!(active_count(&store), 2);
        store.select_active(child.id).unwrap();
        assert_eq!(active_count(&store), 1);
        assert_eq!(store.get_active().unwrap().unwrap().id, child.id);
    }

    #[test]
    fn create_with_unknown_parent_is_rejected() {
        let store = store();
        let ghost = IncarnationId::new();
        let err = store.create_incarnation(Some(ghost), false).unwrap_err();
        assert_eq!(err, LineageError::UnknownParent { id: ghost });
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn resetlogs_round_trips_through_store() {
        let store = store();
        let inc = store.create_incarnation(None, true).unwrap();
        let got = store.get(inc.id).unwrap().unwrap();
        assert!(got.metadata.control_file.unwrap().resetlogs);
    }

    #[test]
    fn select_active_unknown_leaves_state_unchanged() {
        let store = store();
        let a = store.create_incarnation(None, false).unwrap();
        let b = store.create_incarnation(Some(a.id), false).unwrap();
        store.select_active(b.id).unwrap();
        let before = store.list_all().unwrap();

        let ghost = IncarnationId::new();
        let err = store.select_active(ghost).unwrap_err();
        assert_eq!(err, LineageError::UnknownIncarnation { id: ghost });
        assert_eq!(store.list_all().unwrap(), before);
    }

    #[test]
    fn revert_changes_status_only() {
        let store = store();
        let a = store.create_incarnation(None, false).unwrap();
        let b = store.create_incarnation(Some(a.id), false).unwrap();
        store.select_active(b.id).unwrap();

        store.select_active(a.id).unwrap();
        let got_a = store.get(a.id).unwrap().unwrap();
        let got_b = store.get(b.id).unwrap().unwrap();
        assert_eq!(got_a.status, IncarnationStatus::Active);
        assert_eq!(got_b.status, IncarnationStatus::Inactive);
        assert_eq!(got_b.parent_id, Some(a.id));
        assert_eq!(got_b.metadata, b.metadata);
    }

    #[test]
    fn adopt_inserts_and_activates_atomically() {
        let store = store();
        let a = store.create_incarnation(None, false).unwrap();
        let next = Incarnation::seeded(Some(a.id), true, Utc::now());
        let stored = store.adopt(next.clone()).unwrap();
        assert_eq!(stored.id, next.id);
        assert_eq!(active_count(&store), 1);
        assert_eq!(store.get_active().unwrap().unwrap().id, next.id);

        assert_eq!(
            store.adopt(next.clone()).unwrap_err(),
            LineageError::DuplicateIncarnation { id: next.id }
        );
        assert_eq!(active_count(&store), 1);
    }

    #[test]
    fn list_all_preserves_creation_order() {
        let store = store();
        let a = store.create_incarnation(None, false).unwrap();
        let b = store.create_incarnation(Some(a.id), false).unwrap();
        let c = store.create_incarnation(Some(a.id), false).unwrap();
        let ids: Vec<_> = store.list_all().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }
}
