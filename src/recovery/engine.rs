//! The recovery state-transition engine.
//!
//! `recover` is a pure function of the source incarnation, the request and the
//! clock reading. It never touches a store; the caller decides whether to
//! adopt the new incarnation.

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::error::RecoveryError;
use crate::incarnation::{Incarnation, IncarnationId, IncarnationStatus, OpenMode};
use crate::recovery::options::{
    RecoveryMetadata, RecoveryOptions, RecoveryResult, RecoveryTarget, RecoveryType,
};

/// A successfully derived incarnation, before it is adopted by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub incarnation: Incarnation,
    pub completed_at: DateTime<Utc>,
}

const fn description(recovery_type: RecoveryType) -> &'static str {
    match recovery_type {
        RecoveryType::Complete => "Complete database recovery performed",
        RecoveryType::Incomplete => "Incomplete recovery performed",
        RecoveryType::Pitr => "Point-in-time recovery performed",
        RecoveryType::Flashback => "Flashback recovery performed",
    }
}

const fn success_message(recovery_type: RecoveryType) -> &'static str {
    match recovery_type {
        RecoveryType::Complete => "Complete recovery successful",
        RecoveryType::Incomplete => "Incomplete recovery successful",
        RecoveryType::Pitr => "Point-in-time recovery successful",
        RecoveryType::Flashback => "Flashback recovery successful",
    }
}

/// RESETLOGS applied by a mode. Only COMPLETE lets the caller choose.
fn effective_resetlogs(target: &RecoveryTarget, requested: Option<bool>) -> bool {
    match target {
        RecoveryTarget::Complete => requested.unwrap_or(false),
        RecoveryTarget::Incomplete { .. } | RecoveryTarget::Pitr { .. } => true,
        RecoveryTarget::Flashback { .. } => false,
    }
}

/// System change number carried into the new incarnation.
fn next_scn(target: &RecoveryTarget, source: Option<u64>) -> Option<u64> {
    match target {
        RecoveryTarget::Complete => Some(source.unwrap_or(0)),
        RecoveryTarget::Incomplete { target_scn, .. } => Some(target_scn.or(source).unwrap_or(0)),
        RecoveryTarget::Pitr { .. } | RecoveryTarget::Flashback { .. } => source,
    }
}

/// Derive a new incarnation from `source`.
///
/// The new incarnation is ACTIVE, has `source` as parent, a fresh id and
/// timestamp, and a copy of the source metadata overlaid with the recovery
/// record.
///
/// # Errors
/// `MissingTarget` if the mode's target is absent. Nothing is produced.
pub fn try_recover(
    source: &Incarnation,
    options: &RecoveryOptions,
    clock: &dyn Clock,
) -> Result<Recovered, RecoveryError> {
    let target = options.validate()?;
    let recovery_type = target.recovery_type();
    let resetlogs = effective_resetlogs(&target, options.resetlogs);

    let mut metadata = source.metadata.clone();
    metadata.system_change_number = next_scn(&target, metadata.system_change_number);
    metadata.open_mode = Some(OpenMode::ReadWrite);
    metadata.recovery = Some(RecoveryMetadata {
        target,
        recovery_to_consistency: true,
        resetlogs,
        description: description(recovery_type).to_string(),
    });

    let incarnation = Incarnation {
        id: IncarnationId::new(),
        timestamp: clock.now(),
        status: IncarnationStatus::Active,
        parent_id: Some(source.id),
        metadata,
    };
    let completed_at = clock.now();

    Ok(Recovered {
        incarnation,
        completed_at,
    })
}

/// Derive a new incarnation from `source`, reporting the outcome as a
/// [`RecoveryResult`] instead of an error.
#[must_use]
pub fn recover(source: &Incarnation, options: &RecoveryOptions, clock: &dyn Clock) -> RecoveryResult {
    match try_recover(source, options, clock) {
        Ok(Recovered {
            incarnation,
            completed_at,
        }) => RecoveryResult::succeeded(
            success_message(options.recovery_type),
            incarnation,
            completed_at,
        ),
        Err(err) => RecoveryResult::failed(err.kind(), &err),
    }
}
