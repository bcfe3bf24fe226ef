//! Backup event types.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackupError;

/// Kind of backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupType {
    /// All datafiles.
    Full,
    /// Incremental level 0: a full baseline that level 1 backups build on.
    IncrL0,
    /// Incremental level 1: changes since the last level 0 or level 1.
    IncrL1,
    /// Changes since the last backup of the same level.
    Differential,
    /// Changes since the last level 0.
    Cumulative,
    /// Archived redo logs.
    Archivelog,
    /// The control file.
    Controlfile,
}

impl BackupType {
    /// Every type, in presentation order.
    pub const ALL: [Self; 7] = [
        Self::Full,
        Self::IncrL0,
        Self::IncrL1,
        Self::Differential,
        Self::Cumulative,
        Self::Archivelog,
        Self::Controlfile,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::IncrL0 => "INCR_L0",
            Self::IncrL1 => "INCR_L1",
            Self::Differential => "DIFFERENTIAL",
            Self::Cumulative => "CUMULATIVE",
            Self::Archivelog => "ARCHIVELOG",
            Self::Controlfile => "CONTROLFILE",
        }
    }

    /// Human-readable label stored in `BackupEvent::details`.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Full => "Full Backup",
            Self::IncrL0 => "Incremental L0",
            Self::IncrL1 => "Incremental L1",
            Self::Differential => "Differential",
            Self::Cumulative => "Cumulative",
            Self::Archivelog => "Archivelog Backup",
            Self::Controlfile => "Control File Backup",
        }
    }

    /// Level 0 or level 1 incremental.
    #[must_use]
    pub const fn is_incremental(&self) -> bool {
        matches!(self, Self::IncrL0 | Self::IncrL1)
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BackupError::UnsupportedBackupType {
                name: wanted.to_string(),
            })
    }
}

/// Backup identifier derived from `(type, creation instant)`.
///
/// Renders as `"{TYPE}_{unix_micros}"` and orders by creation instant.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use incarnation_sim::{BackupId, BackupType};
///
/// let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
/// let id = BackupId::derive(BackupType::IncrL0, at);
/// assert_eq!(id.to_string(), "INCR_L0_1700000000000000");
/// assert_eq!(id.to_string().parse::<BackupId>().unwrap(), id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackupId {
    backup_type: BackupType,
    created_micros: i64,
}

impl BackupId {
    #[must_use]
    pub fn derive(backup_type: BackupType, created_at: DateTime<Utc>) -> Self {
        Self {
            backup_type,
            created_micros: created_at.timestamp_micros(),
        }
    }

    #[must_use]
    pub const fn backup_type(&self) -> BackupType {
        self.backup_type
    }

    #[must_use]
    pub const fn created_micros(&self) -> i64 {
        self.created_micros
    }
}

impl Ord for BackupId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.created_micros
            .cmp(&other.created_micros)
            .then(self.backup_type.cmp(&other.backup_type))
    }
}

impl PartialOrd for BackupId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.backup_type, self.created_micros)
    }
}

impl FromStr for BackupId {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || BackupError::UnsupportedBackupType {
            name: s.to_string(),
        };
        let (kind, micros) = s.trim().rsplit_once('_').ok_or_else(unsupported)?;
        let created_micros = micros.parse::<i64>().map_err(|_| unsupported())?;
        Ok(Self {
            backup_type: kind.parse()?,
            created_micros,
        })
    }
}

impl TryFrom<String> for BackupId {
    type Error = BackupError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackupId> for String {
    fn from(id: BackupId) -> Self {
        id.to_string()
    }
}

/// Completion state of a backup. Moves one way only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupStatus {
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// One entry in the backup ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEvent {
    pub id: BackupId,

    #[serde(rename = "type")]
    pub backup_type: BackupType,

    pub timestamp: DateTime<Utc>,

    pub details: String,

    /// Recomputed by retention; never set on creation.
    pub expired: bool,

    pub status: BackupStatus,

    /// Dependency edge: this backup restores only together with its parent chain.
    pub parent_id: Option<BackupId>,
}

impl BackupEvent {
    /// A new in-progress, unexpired event created at `at`.
    #[must_use]
    pub fn new(backup_type: BackupType, at: DateTime<Utc>, parent_id: Option<BackupId>) -> Self {
        Self {
            id: BackupId::derive(backup_type, at),
            backup_type,
            timestamp: at,
            details: backup_type.label().to_string(),
            expired: false,
            status: BackupStatus::InProgress,
            parent_id,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == BackupStatus::Completed
    }

    /// Completed and not expired.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.is_completed() && !self.expired
    }
}
