//! Incarnation data model.
//!
//! An incarnation is one branch of a database's history. A new one begins
//! whenever the database is opened with RESETLOGS or rewound by a recovery;
//! the `parent_id` links form the lineage forest.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recovery::RecoveryMetadata;

/// Unique, time-ordered incarnation identifier.
///
/// Backed by a UUIDv7, so ids created later compare greater.
///
/// # Examples
///
/// ```
/// use incarnation_sim::IncarnationId;
///
/// let a = IncarnationId::new();
/// let b = IncarnationId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncarnationId(Uuid);

impl IncarnationId {
    /// Creates a new time-ordered incarnation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates an incarnation ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for IncarnationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IncarnationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IncarnationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle status of an incarnation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncarnationStatus {
    /// The current incarnation. Exactly one exists once the store is non-empty.
    Active,
    /// A historical branch.
    Inactive,
    /// Being produced by a recovery that has not been applied yet.
    Recovering,
}

impl fmt::Display for IncarnationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Inactive => write!(f, "INACTIVE"),
            Self::Recovering => write!(f, "RECOVERING"),
        }
    }
}

/// Control file state for an incarnation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlFileState {
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub resetlogs: bool,
    #[serde(rename = "checkpointSCN", default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_scn: Option<u64>,
}

/// Availability of an archived redo log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchiveLogStatus {
    Applied,
    Unavailable,
    Deleted,
}

/// One archived redo log covering `[first_change, next_change)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveLogEntry {
    pub sequence: u64,
    pub first_change: u64,
    pub next_change: u64,
    pub status: ArchiveLogStatus,
}

/// Datafile availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatafileStatus {
    Online,
    Offline,
    Recover,
    Restoring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datafile {
    pub name: String,
    pub status: DatafileStatus,
    pub checkpoint_change: u64,
}

/// Online redo log group status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedoLogStatus {
    Current,
    Active,
    Inactive,
    Clearing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedoLogGroup {
    pub group: u32,
    pub status: RedoLogStatus,
    pub sequence: u64,
    pub first_change: u64,
    pub next_change: u64,
}

/// How the database is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpenMode {
    #[serde(rename = "READ WRITE")]
    ReadWrite,
    #[serde(rename = "READ ONLY")]
    ReadOnly,
    #[serde(rename = "MOUNTED")]
    Mounted,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadWrite => write!(f, "READ WRITE"),
            Self::ReadOnly => write!(f, "READ ONLY"),
            Self::Mounted => write!(f, "MOUNTED"),
        }
    }
}

/// Physical and recovery state carried by an incarnation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncarnationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_file: Option<ControlFileState>,

    #[serde(default)]
    pub archive_logs: Vec<ArchiveLogEntry>,

    #[serde(default)]
    pub datafiles: Vec<Datafile>,

    #[serde(default)]
    pub redo_logs: Vec<RedoLogGroup>,

    /// Present when this incarnation was produced by a recovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_change_number: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_mode: Option<OpenMode>,
}

/// First change number every seeded log and datafile starts at.
pub const SEED_CHANGE: u64 = 1;

/// Exclusive upper bound of the seeded archive and redo log ranges.
pub const SEED_NEXT_CHANGE: u64 = 1000;

impl IncarnationMetadata {
    /// Metadata for a freshly created incarnation: one existing control file,
    /// one applied archive log, one online datafile and one current redo group,
    /// all starting at change 1.
    #[must_use]
    pub fn seeded(resetlogs: bool, at: DateTime<Utc>) -> Self {
        let description = if resetlogs {
            "Created with RESETLOGS"
        } else {
            "Normal incarnation"
        };
        Self {
            description: Some(description.to_string()),
            changes: Vec::new(),
            control_file: Some(ControlFileState {
                exists: true,
                timestamp: Some(at),
                resetlogs,
                checkpoint_scn: None,
            }),
            archive_logs: vec![ArchiveLogEntry {
                sequence: 1,
                first_change: SEED_CHANGE,
                next_change: SEED_NEXT_CHANGE,
                status: ArchiveLogStatus::Applied,
            }],
            datafiles: vec![Datafile {
                name: "system01.dbf".to_string(),
                status: DatafileStatus::Online,
                checkpoint_change: SEED_CHANGE,
            }],
            redo_logs: vec![RedoLogGroup {
                group: 1,
                status: RedoLogStatus::Current,
                sequence: 1,
                first_change: SEED_CHANGE,
                next_change: SEED_NEXT_CHANGE,
            }],
            recovery: None,
            system_change_number: None,
            open_mode: None,
        }
    }

    /// Whether the control file records a RESETLOGS open.
    #[must_use]
    pub fn resetlogs(&self) -> bool {
        self.control_file.as_ref().is_some_and(|cf| cf.resetlogs)
    }
}

/// One node in the incarnation lineage.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use incarnation_sim::{Incarnation, IncarnationStatus};
///
/// let root = Incarnation::seeded(None, true, Utc::now());
/// assert_eq!(root.status, IncarnationStatus::Active);
/// assert!(root.metadata.resetlogs());
/// assert!(root.is_root());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incarnation {
    pub id: IncarnationId,
    pub timestamp: DateTime<Utc>,
    pub status: IncarnationStatus,
    pub parent_id: Option<IncarnationId>,
    pub metadata: IncarnationMetadata,
}

impl Incarnation {
    /// Builds a new ACTIVE incarnation with seeded metadata.
    #[must_use]
    pub fn seeded(parent_id: Option<IncarnationId>, resetlogs: bool, at: DateTime<Utc>) -> Self {
        Self {
            id: IncarnationId::new(),
            timestamp: at,
            status: IncarnationStatus::Active,
            parent_id,
            metadata: IncarnationMetadata::seeded(resetlogs, at),
        }
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == IncarnationStatus::Active
    }
}
