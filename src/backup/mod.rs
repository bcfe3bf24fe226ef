//! Backup ledger, dependency resolution, retention and completion scheduling.

pub mod ledger;
pub mod resolver;
pub mod retention;
pub mod scheduler;
pub mod types;

pub use ledger::BackupLedger;
pub use resolver::{DependencyResolver, IncrementalChainResolver};
pub use retention::{RetentionOutcome, RetentionPolicy, DEFAULT_RETENTION_LIMIT};
pub use scheduler::{CompletionScheduler, ManualScheduler, NoopScheduler, TimerScheduler};
pub use types::{BackupEvent, BackupId, BackupStatus, BackupType};
