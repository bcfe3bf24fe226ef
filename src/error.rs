//! Error types for the incarnation simulator.
//!
//! Every component reports failures through its own strongly typed enum.
//! `SimError` folds them together for callers that drive the whole session,
//! and `ErrorKind` gives the presentation layer a flat tag to branch on.

use std::fmt;

use thiserror::Error;

use crate::backup::{BackupId, BackupType};
use crate::incarnation::IncarnationId;
use crate::recovery::RecoveryType;

/// Errors raised by the incarnation store and lineage walks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineageError {
    #[error("Parent incarnation not found: {id}")]
    UnknownParent {
        id: IncarnationId,
    },

    #[error("Incarnation not found: {id}")]
    UnknownIncarnation {
        id: IncarnationId,
    },

    #[error("Incarnation already exists: {id}")]
    DuplicateIncarnation {
        id: IncarnationId,
    },

    #[error("Incarnation state unavailable: poisoned lock ({context})")]
    StatePoisoned {
        context: &'static str,
    },
}

/// What a recovery mode needs before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRequirement {
    /// A target time is mandatory.
    Time,
    /// Either a target time or a target SCN is mandatory.
    TimeOrScn,
}

impl fmt::Display for TargetRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Time => write!(f, "Target time"),
            Self::TimeOrScn => write!(f, "Target SCN or time"),
        }
    }
}

/// Errors raised while validating a recovery request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    #[error("{requirement} must be specified for {} recovery", .recovery_type.phrase())]
    MissingTarget {
        recovery_type: RecoveryType,
        requirement: TargetRequirement,
    },

    #[error("Unsupported recovery type: {name}")]
    UnsupportedRecoveryType {
        name: String,
    },
}

/// Errors raised by the backup ledger and retention policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackupError {
    #[error("Cannot perform {backup_type} backup: no completed Level 0 backup found")]
    MissingDependency {
        backup_type: BackupType,
    },

    #[error("Backup not found: {id}")]
    UnknownBackup {
        id: BackupId,
    },

    #[error("Backup already exists: {id}")]
    DuplicateBackup {
        id: BackupId,
    },

    #[error("Unsupported backup type: {name}")]
    UnsupportedBackupType {
        name: String,
    },

    #[error("Retention limit must be at least 1, got {limit}")]
    InvalidRetention {
        limit: usize,
    },

    #[error("Backup ledger unavailable: poisoned lock ({context})")]
    StatePoisoned {
        context: &'static str,
    },

    #[error("Backup completion scheduler is not running")]
    SchedulerUnavailable,

    #[error("Backup completion queue is full (capacity: {capacity})")]
    SchedulerQueueFull {
        capacity: usize,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level error type for the simulator.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Lineage error: {0}")]
    Lineage(#[from] LineageError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

/// Flat classification of every failure the core can report.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    UnknownParent,
    UnknownIncarnation,
    DuplicateIncarnation,
    MissingTarget,
    UnsupportedRecoveryType,
    MissingDependency,
    UnknownBackup,
    DuplicateBackup,
    UnsupportedBackupType,
    InvalidRetention,
    InvalidConfig,
    Internal,
}

impl LineageError {
    /// Returns the flat kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownParent { .. } => ErrorKind::UnknownParent,
            Self::UnknownIncarnation { .. } => ErrorKind::UnknownIncarnation,
            Self::DuplicateIncarnation { .. } => ErrorKind::DuplicateIncarnation,
            Self::StatePoisoned { .. } => ErrorKind::Internal,
        }
    }
}

impl RecoveryError {
    /// Returns the flat kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingTarget { .. } => ErrorKind::MissingTarget,
            Self::UnsupportedRecoveryType { .. } => ErrorKind::UnsupportedRecoveryType,
        }
    }
}

impl BackupError {
    /// Returns the flat kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::UnknownBackup { .. } => ErrorKind::UnknownBackup,
            Self::DuplicateBackup { .. } => ErrorKind::DuplicateBackup,
            Self::UnsupportedBackupType { .. } => ErrorKind::UnsupportedBackupType,
            Self::InvalidRetention { .. } => ErrorKind::InvalidRetention,
            Self::StatePoisoned { .. }
            | Self::SchedulerUnavailable
            | Self::SchedulerQueueFull { .. } => ErrorKind::Internal,
        }
    }
}

impl SimError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the flat kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Lineage(e) => e.kind(),
            Self::Recovery(e) => e.kind(),
            Self::Backup(e) => e.kind(),
            Self::Config(_) => ErrorKind::InvalidConfig,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if the same command may succeed once the input is corrected.
    ///
    /// Every rejection leaves prior state untouched, so only internal failures
    /// are terminal.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal)
    }
}

/// Result type alias for simulator operations.
pub type SimResult<T> = Result<T, SimError>;
