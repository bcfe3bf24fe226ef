//! Recovery request and result types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, RecoveryError, TargetRequirement};
use crate::incarnation::Incarnation;

/// Recovery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryType {
    /// Apply all redo; no target.
    Complete,
    /// Stop at a target SCN or time.
    Incomplete,
    /// Point-in-time recovery to a target time.
    Pitr,
    /// Rewind with flashback logs to a target SCN or time.
    Flashback,
}

impl RecoveryType {
    /// Every mode, in presentation order.
    pub const ALL: [Self; 4] = [Self::Complete, Self::Incomplete, Self::Pitr, Self::Flashback];

    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "COMPLETE",
            Self::Incomplete => "INCOMPLETE",
            Self::Pitr => "PITR",
            Self::Flashback => "FLASHBACK",
        }
    }

    /// Lower-case phrase used in messages ("point-in-time recovery").
    #[must_use]
    pub const fn phrase(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
            Self::Pitr => "point-in-time",
            Self::Flashback => "flashback",
        }
    }

    /// What must be supplied before this mode can run.
    #[must_use]
    pub const fn requirement(&self) -> Option<TargetRequirement> {
        match self {
            Self::Complete => None,
            Self::Pitr => Some(TargetRequirement::Time),
            Self::Incomplete | Self::Flashback => Some(TargetRequirement::TimeOrScn),
        }
    }
}

impl fmt::Display for RecoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryType {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| RecoveryError::UnsupportedRecoveryType {
                name: wanted.to_string(),
            })
    }
}

/// A recovery request.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use incarnation_sim::{RecoveryOptions, RecoveryType};
///
/// let opts = RecoveryOptions::new(RecoveryType::Pitr).target_time(Utc::now());
/// assert!(opts.validate().is_ok());
/// assert!(RecoveryOptions::new(RecoveryType::Pitr).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryOptions {
    #[serde(rename = "type")]
    pub recovery_type: RecoveryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_time: Option<DateTime<Utc>>,
    #[serde(default, rename = "targetSCN", skip_serializing_if = "Option::is_none")]
    pub target_scn: Option<u64>,
    /// Only honoured by COMPLETE; the other modes decide for themselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resetlogs: Option<bool>,
}

impl RecoveryOptions {
    #[must_use]
    pub const fn new(recovery_type: RecoveryType) -> Self {
        Self {
            recovery_type,
            target_time: None,
            target_scn: None,
            resetlogs: None,
        }
    }

    #[must_use]
    pub fn target_time(mut self, at: DateTime<Utc>) -> Self {
        self.target_time = Some(at);
        self
    }

    #[must_use]
    pub fn target_scn(mut self, scn: u64) -> Self {
        self.target_scn = Some(scn);
        self
    }

    #[must_use]
    pub fn resetlogs(mut self, resetlogs: bool) -> Self {
        self.resetlogs = Some(resetlogs);
        self
    }

    /// Check the mode's target requirement and return the validated target.
    ///
    /// # Errors
    /// `MissingTarget` when the mode needs a target that was not supplied.
    pub fn validate(&self) -> Result<RecoveryTarget, RecoveryError> {
        let missing = |requirement| RecoveryError::MissingTarget {
            recovery_type: self.recovery_type,
            requirement,
        };
        match self.recovery_type {
            RecoveryType::Complete => Ok(RecoveryTarget::Complete),
            RecoveryType::Pitr => self
                .target_time
                .map(|target_time| RecoveryTarget::Pitr { target_time })
                .ok_or_else(|| missing(TargetRequirement::Time)),
            RecoveryType::Incomplete => {
                if self.target_time.is_none() && self.target_scn.is_none() {
                    return Err(missing(TargetRequirement::TimeOrScn));
                }
                Ok(RecoveryTarget::Incomplete {
                    target_scn: self.target_scn,
                    target_time: self.target_time,
                })
            }
            RecoveryType::Flashback => {
                if self.target_time.is_none() && self.target_scn.is_none() {
                    return Err(missing(TargetRequirement::TimeOrScn));
                }
                Ok(RecoveryTarget::Flashback {
                    flashback_scn: self.target_scn,
                    flashback_time: self.target_time,
                })
            }
        }
    }
}

/// The validated target of a recovery, one case per mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryTarget {
    Complete,
    Incomplete {
        #[serde(rename = "targetSCN", default, skip_serializing_if = "Option::is_none")]
        target_scn: Option<u64>,
        #[serde(rename = "targetTime", default, skip_serializing_if = "Option::is_none")]
        target_time: Option<DateTime<Utc>>,
    },
    Pitr {
        #[serde(rename = "targetTime")]
        target_time: DateTime<Utc>,
    },
    Flashback {
        #[serde(rename = "flashbackSCN", default, skip_serializing_if = "Option::is_none")]
        flashback_scn: Option<u64>,
        #[serde(rename = "flashbackTime", default, skip_serializing_if = "Option::is_none")]
        flashback_time: Option<DateTime<Utc>>,
    },
}

impl RecoveryTarget {
    #[must_use]
    pub const fn recovery_type(&self) -> RecoveryType {
        match self {
            Self::Complete => RecoveryType::Complete,
            Self::Incomplete { .. } => RecoveryType::Incomplete,
            Self::Pitr { .. } => RecoveryType::Pitr,
            Self::Flashback { .. } => RecoveryType::Flashback,
        }
    }

    /// Target time, whichever field the mode stores it in.
    #[must_use]
    pub const fn time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Complete => None,
            Self::Incomplete { target_time, .. } => *target_time,
            Self::Pitr { target_time } => Some(*target_time),
            Self::Flashback { flashback_time, .. } => *flashback_time,
        }
    }

    /// Target SCN, whichever field the mode stores it in.
    #[must_use]
    pub const fn scn(&self) -> Option<u64> {
        match self {
            Self::Complete | Self::Pitr { .. } => None,
            Self::Incomplete { target_scn, .. } => *target_scn,
            Self::Flashback { flashback_scn, .. } => *flashback_scn,
        }
    }
}

/// How an incarnation was produced, embedded in its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryMetadata {
    #[serde(flatten)]
    pub target: RecoveryTarget,
    pub recovery_to_consistency: bool,
    pub resetlogs: bool,
    pub description: String,
}

impl RecoveryMetadata {
    #[must_use]
    pub const fn recovery_type(&self) -> RecoveryType {
        self.target.recovery_type()
    }
}

/// Outcome of a recovery command.
///
/// Failures are reported here instead of through `Err` so the presentation
/// layer can branch on `success` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_incarnation: Option<Incarnation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl RecoveryResult {
    #[must_use]
    pub fn succeeded(
        message: impl Into<String>,
        new_incarnation: Incarnation,
        recovery_time: DateTime<Utc>,
    ) -> Self {
        Self {
            success: true,
            message: message.into(),
            new_incarnation: Some(new_incarnation),
            recovery_time: Some(recovery_time),
            errors: Vec::new(),
            error_kind: None,
        }
    }

    #[must_use]
    pub fn failed(kind: ErrorKind, reason: impl fmt::Display) -> Self {
        let reason = reason.to_string();
        Self {
            success: false,
            message: format!("Recovery failed: {reason}"),
            new_incarnation: None,
            recovery_time: None,
            errors: vec![reason],
            error_kind: Some(kind),
        }
    }
}
