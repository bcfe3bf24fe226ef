//! Structured command outcomes for the presentation layer.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SimResult};

/// Result of a session command, flattened so the caller only branches on
/// `success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome<T> {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl<T> CommandOutcome<T> {
    /// A successful outcome carrying `value`.
    #[must_use]
    pub fn ok(message: impl Into<String>, value: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            value: Some(value),
            error_kind: None,
        }
    }

    /// Fold a `SimResult`, describing success with `message`.
    #[must_use]
    pub fn from_result(result: SimResult<T>, message: impl Into<String>) -> Self {
        match result {
            Ok(value) => Self::ok(message, value),
            Err(err) => Self {
                success: false,
                message: err.to_string(),
                value: None,
                error_kind: Some(err.kind()),
            },
        }
    }

    /// The carried value, if the command succeeded.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::{BackupError, SimError};
    use crate::backup::BackupType;

    #[test]
    fn failure_carries_kind_and_message() {
        let err: SimError = BackupError::MissingDependency {
            backup_type: BackupType::IncrL1,
        }
        .into();
        let outcome: CommandOutcome<()> = CommandOutcome::from_result(Err(err), "unused");
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::MissingDependency));
        assert!(outcome.message.contains("no completed Level 0 backup found"));

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["errorKind"], "MISSING_DEPENDENCY");
        assert!(json.get("value").is_none());
    }

    #[test]
    fn success_keeps_value() {
        let outcome = CommandOutcome::from_result(Ok(7_u32), "Retention set");
        assert!(outcome.success);
        assert_eq!(outcome.message, "Retention set");
        assert_eq!(outcome.into_value(), Some(7));
    }
}
