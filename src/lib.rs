//! # incarnation-sim - Database Incarnation and Backup Simulator
//!
//! An educational model of how an Oracle-style database branches into
//! incarnations when it is recovered, and how a backup ledger with
//! incremental dependencies and count-based retention evolves alongside it.
//!
//! ## Core Concepts
//!
//! - **Incarnation**: one timeline of the database. Recovery opens a new child
//!   incarnation; exactly one is ACTIVE at a time.
//! - **Recovery**: a pure transition from a source incarnation and a request
//!   (`COMPLETE`, `INCOMPLETE`, `PITR`, `FLASHBACK`) to a new incarnation.
//! - **Backup ledger**: append-only list of backups. Level 1 incrementals
//!   depend on an earlier level 0 or level 1.
//! - **Retention**: keeps the newest N backups; the rest are marked expired.
//!
//! ## Usage
//!
//! ```rust
//! use incarnation_sim::{
//!     BackupType, RecoveryOptions, RecoveryType, SimulatorConfig, SimulatorSession,
//! };
//!
//! # fn main() -> incarnation_sim::SimResult<()> {
//! let session = SimulatorSession::new(&SimulatorConfig::default())?;
//!
//! let root = session.create_incarnation(None, false)?;
//! let result = session.recover(root.id, &RecoveryOptions::new(RecoveryType::Complete));
//! assert!(result.success);
//!
//! let receipt = session.create_backup(BackupType::IncrL0)?;
//! assert!(receipt.event.parent_id.is_none());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Ambient: errors, time, configuration
pub mod clock;
pub mod config;
pub mod error;

// Core: lineage, recovery, backups
pub mod backup;
pub mod incarnation;
pub mod recovery;

// Command surface
pub mod outcome;
pub mod session;

// Re-export primary types at crate root for convenience
pub use backup::{
    BackupEvent, BackupId, BackupLedger, BackupStatus, BackupType, CompletionScheduler,
    DependencyResolver, IncrementalChainResolver, ManualScheduler, RetentionOutcome,
    RetentionPolicy, TimerScheduler,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SimulatorConfig;
pub use error::{
    BackupError, ConfigError, ErrorKind, LineageError, RecoveryError, SimError, SimResult,
};
pub use incarnation::{
    InMemoryIncarnationStore, Incarnation, IncarnationId, IncarnationMetadata, IncarnationStatus,
    IncarnationStore, Lineage, LineageViolation,
};
pub use outcome::CommandOutcome;
pub use recovery::{
    recover, try_recover, RecoveryMetadata, RecoveryOptions, RecoveryResult, RecoveryTarget,
    RecoveryType,
};
pub use session::{BackupReceipt, SessionSnapshot, SimulatorSession};
