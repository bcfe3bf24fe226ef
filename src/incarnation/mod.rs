//! Incarnation lineage: the data model, its store, and walks over the forest.

pub mod lineage;
pub mod store;
pub mod types;

pub use lineage::{Lineage, LineageViolation};
pub use store::{InMemoryIncarnationStore, IncarnationStore};
pub use types::{
    ArchiveLogEntry, ArchiveLogStatus, ControlFileState, Datafile, DatafileStatus, Incarnation,
    IncarnationId, IncarnationMetadata, IncarnationStatus, OpenMode, RedoLogGroup, RedoLogStatus,
};
