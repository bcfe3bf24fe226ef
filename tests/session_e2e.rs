use std::sync::Arc;
use std::thread;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};

use incarnation_sim::backup::NoopScheduler;
use incarnation_sim::{
    BackupLedger, BackupType, Clock, CommandOutcome, CompletionScheduler, ErrorKind,
    InMemoryIncarnationStore, IncarnationStatus, ManualClock, RecoveryOptions, RecoveryType,
    RetentionPolicy, SimulatorConfig, SimulatorSession,
};

fn session() -> SimulatorSession {
    let start = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::with_step(start, ChronoDuration::milliseconds(1)));
    SimulatorSession::with_parts(
        Arc::new(InMemoryIncarnationStore::with_clock(Arc::clone(&clock))),
        Arc::new(BackupLedger::with_clock(Arc::clone(&clock))),
        Arc::new(NoopScheduler) as Arc<dyn CompletionScheduler>,
        clock,
        RetentionPolicy::default(),
    )
}

#[test]
fn config_from_json_builds_session() {
    let cfg = SimulatorConfig::from_json_str(r#"{"retention_limit": 2, "backup_duration_ms": 10}"#)
        .unwrap();
    let session = SimulatorSession::new(&cfg).unwrap();
    assert_eq!(session.retention_policy().unwrap().limit(), 2);

    let bad = SimulatorConfig::default().with_retention_limit(0);
    let err = SimulatorSession::new(&bad).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[test]
fn command_outcomes_wrap_results() {
    let session = session();
    let outcome = CommandOutcome::from_result(session.create_backup(BackupType::IncrL1), "started");
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::MissingDependency));

    let outcome = CommandOutcome::from_result(session.create_backup(BackupType::Full), "started");
    assert!(outcome.success);
    assert_eq!(outcome.into_value().unwrap().event.backup_type, BackupType::Full);
}

#[test]
fn snapshot_serializes_domain_vocabulary() {
    let session = session();
    let root = session.create_incarnation(None, false).unwrap();
    let result = session.recover(
        root.id,
        &RecoveryOptions::new(RecoveryType::Flashback).target_scn(10),
    );
    assert!(result.success);
    session.create_backup(BackupType::Controlfile).unwrap();

    let json = serde_json::to_value(session.snapshot().unwrap()).unwrap();
    assert_eq!(json["retentionLimit"], 5);
    assert_eq!(json["incarnations"][0]["status"], "INACTIVE");
    assert_eq!(json["incarnations"][1]["parentId"], root.id.to_string());
    assert_eq!(json["incarnations"][1]["metadata"]["recovery"]["type"], "FLASHBACK");
    assert_eq!(json["incarnations"][1]["metadata"]["recovery"]["flashbackSCN"], 10);
    assert_eq!(json["incarnations"][1]["metadata"]["recovery"]["resetlogs"], false);
    assert_eq!(json["backups"][0]["type"], "CONTROLFILE");
    assert_eq!(json["backups"][0]["status"], "in progress");
    assert_eq!(json["backups"][0]["details"], "Control File Backup");
}

#[test]
fn concurrent_commands_keep_invariants() {
    let session = Arc::new(session());
    let root = session.create_incarnation(None, false).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                for _ in 0..10 {
                    let opts = RecoveryOptions::new(RecoveryType::Complete);
                    assert!(session.recover(root.id, &opts).success);
                    session.create_backup(BackupType::Archivelog).unwrap();
                    if worker % 2 == 0 {
                        session.select_active(root.id).unwrap();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let all = session.list_incarnations().unwrap();
    assert_eq!(all.len(), 41);
    assert_eq!(
        all.iter().filter(|i| i.status == IncarnationStatus::Active).count(),
        1
    );
    assert!(session.validate_lineage().unwrap().is_empty());

    let backups = session.list_backups().unwrap();
    assert_eq!(backups.len(), 40);
    assert_eq!(backups.iter().filter(|b| !b.expired).count(), 5);
    // Insertion order matches id order.
    assert!(backups.windows(2).all(|w| w[0].id < w[1].id));
}
