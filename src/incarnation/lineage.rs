//! Lineage walks over a snapshot of incarnations.
//!
//! The forest is an arena keyed by `IncarnationId`; parent links are plain
//! lookups. Walks carry a visited set so a corrupted snapshot cannot loop.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::incarnation::types::{Incarnation, IncarnationId};

/// A broken lineage invariant found by [`Lineage::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum LineageViolation {
    /// The collection is non-empty but the number of ACTIVE incarnations is not one.
    ActiveCount {
        /// How many were ACTIVE.
        count: usize,
    },
    /// A parent link points outside the collection.
    DanglingParent {
        /// The child holding the link.
        id: IncarnationId,
        /// The missing parent.
        parent_id: IncarnationId,
    },
    /// Following parent links from `id` revisits an incarnation.
    Cycle {
        /// Where the walk started.
        id: IncarnationId,
    },
    /// Two entries share an id.
    DuplicateId {
        /// The repeated id.
        id: IncarnationId,
    },
}

/// Read-only view of the lineage forest.
#[derive(Debug)]
pub struct Lineage<'a> {
    ordered: &'a [Incarnation],
    by_id: HashMap<IncarnationId, &'a Incarnation>,
}

impl<'a> Lineage<'a> {
    /// Index a snapshot, typically from `IncarnationStore::list_all`.
    #[must_use]
    pub fn new(incarnations: &'a [Incarnation]) -> Self {
        let by_id = incarnations.iter().map(|inc| (inc.id, inc)).collect();
        Self {
            ordered: incarnations,
            by_id,
        }
    }

    #[must_use]
    pub fn get(&self, id: IncarnationId) -> Option<&'a Incarnation> {
        self.by_id.get(&id).copied()
    }

    /// Parent chain of `id`, nearest first, ending at a root.
    ///
    /// Empty when `id` is unknown or is itself a root.
    #[must_use]
    pub fn ancestors(&self, id: IncarnationId) -> Vec<&'a Incarnation> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(id);
        let mut cursor = self.get(id).and_then(|inc| inc.parent_id);
        while let Some(parent_id) = cursor {
            if !seen.insert(parent_id) {
                break;
            }
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            out.push(parent);
            cursor = parent.parent_id;
        }
        out
    }

    /// Number of parent hops from `id` to its root, or `None` if `id` is unknown.
    #[must_use]
    pub fn depth(&self, id: IncarnationId) -> Option<usize> {
        self.get(id).map(|_| self.ancestors(id).len())
    }

    /// The root `id` descends from.
    #[must_use]
    pub fn root_of(&self, id: IncarnationId) -> Option<&'a Incarnation> {
        let start = self.get(id)?;
        Some(self.ancestors(id).last().copied().unwrap_or(start))
    }

    /// Direct children of `id`, in creation order.
    #[must_use]
    pub fn children(&self, id: IncarnationId) -> Vec<&'a Incarnation> {
        self.ordered
            .iter()
            .filter(|inc| inc.parent_id == Some(id))
            .collect()
    }

    /// Incarnations without a parent, in creation order.
    #[must_use]
    pub fn roots(&self) -> Vec<&'a Incarnation> {
        self.ordered.iter().filter(|inc| inc.is_root()).collect()
    }

    /// Returns true if `ancestor` lies on the parent chain of `id`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: IncarnationId, id: IncarnationId) -> bool {
        self.ancestors(id).iter().any(|inc| inc.id == ancestor)
    }

    /// Check every lineage invariant and report all violations found.
    #[must_use]
    pub fn validate(&self) -> Vec<LineageViolation> {
        let mut violations = Vec::new();

        if self.by_id.len() != self.ordered.len() {
            let mut seen = HashSet::new();
            for inc in self.ordered {
                if !seen.insert(inc.id) {
                    violations.push(LineageViolation::DuplicateId { id: inc.id });
                }
            }
        }

        if !self.ordered.is_empty() {
            let count = self.ordered.iter().filter(|inc| inc.is_active()).count();
            if count != 1 {
                violations.push(LineageViolation::ActiveCount { count });
            }
        }

        for inc in self.ordered {
            if let Some(parent_id) = inc.parent_id {
                if !self.by_id.contains_key(&parent_id) {
                    violations.push(LineageViolation::DanglingParent {
                        id: inc.id,
                        parent_id,
                    });
                    continue;
                }
            }
            if self.has_cycle_from(inc.id) {
                violations.push(LineageViolation::Cycle { id: inc.id });
            }
        }

        violations
    }

    fn has_cycle_from(&self, id: IncarnationId) -> bool {
        let mut seen = HashSet::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if !seen.insert(current) {
                return true;
            }
            cursor = self.get(current).and_then(|inc| inc.parent_id);
        }
        false
    }
}
