//! Simulator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backup::DEFAULT_RETENTION_LIMIT;
use crate::error::ConfigError;

/// Simulated time a backup takes from creation to completion.
pub const DEFAULT_BACKUP_DURATION: Duration = Duration::from_millis(2000);

/// Session configuration.
///
/// Every field has a default, so `{}` is a valid JSON configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Newest backups kept unexpired. Must be at least 1.
    pub retention_limit: usize,
    /// Delay before a new backup completes.
    #[serde(rename = "backup_duration_ms", with = "millis")]
    pub backup_duration: Duration,
    /// Max queued completion requests for the timer thread.
    pub scheduler_queue_capacity: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            retention_limit: DEFAULT_RETENTION_LIMIT,
            backup_duration: DEFAULT_BACKUP_DURATION,
            scheduler_queue_capacity: 1024,
        }
    }
}

impl SimulatorConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    /// `Parse` on malformed JSON, `InvalidValue` if validation fails.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// `InvalidValue` when `retention_limit` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retention_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Override the retention limit.
    #[must_use]
    pub const fn with_retention_limit(mut self, limit: usize) -> Self {
        self.retention_limit = limit;
        self
    }

    /// Override the backup duration.
    #[must_use]
    pub const fn with_backup_duration(mut self, duration: Duration) -> Self {
        self.backup_duration = duration;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = SimulatorConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, SimulatorConfig::default());
        assert_eq!(cfg.retention_limit, 5);
        assert_eq!(cfg.backup_duration, Duration::from_secs(2));
    }

    #[test]
    fn duration_is_read_in_millis() {
        let cfg =
            SimulatorConfig::from_json_str(r#"{"retention_limit": 3, "backup_duration_ms": 50}"#)
                .unwrap();
        assert_eq!(cfg.retention_limit, 3);
        assert_eq!(cfg.backup_duration, Duration::from_millis(50));

        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["backup_duration_ms"], 50);
    }

    #[test]
    fn zero_retention_is_rejected() {
        let err = SimulatorConfig::from_json_str(r#"{"retention_limit": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "retention_limit",
                ..
            }
        ));
        assert!(matches!(
            SimulatorConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
