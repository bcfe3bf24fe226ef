//! incarnation-sim demo
//!
//! Drives a scripted session (create, recover, back up, change retention,
//! revert) and prints the final snapshot as JSON.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use tracing_subscriber::EnvFilter;

use incarnation_sim::{
    BackupType, CommandOutcome, RecoveryOptions, RecoveryType, SimError, SimResult,
    SimulatorConfig, SimulatorSession,
};

/// Command-line configuration
struct Args {
    /// Optional JSON configuration file
    config_path: Option<PathBuf>,
    /// Retention override
    retention: Option<usize>,
    /// Backup duration override in milliseconds
    backup_ms: Option<u64>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config_path: None,
        retention: None,
        backup_ms: None,
    };

    let mut i = 1;
    while i < args.len() {
        let value = |i: usize, flag: &str| -> String {
            args.get(i + 1).cloned().unwrap_or_else(|| {
                eprintln!("error: {flag} requires a value");
                std::process::exit(1);
            })
        };
        match args[i].as_str() {
            "--retention" | "-r" => {
                let raw = value(i, "--retention");
                parsed.retention = Some(raw.parse().unwrap_or_else(|_| {
                    eprintln!("error: invalid retention limit: {raw}");
                    std::process::exit(1);
                }));
                i += 2;
            }
            "--backup-ms" | "-b" => {
                let raw = value(i, "--backup-ms");
                parsed.backup_ms = Some(raw.parse().unwrap_or_else(|_| {
                    eprintln!("error: invalid backup duration: {raw}");
                    std::process::exit(1);
                }));
                i += 2;
            }
            "--config" | "-c" => {
                parsed.config_path = Some(PathBuf::from(value(i, "--config")));
                i += 2;
            }
            "--help" | "-h" => {
                println!("incarnation-sim - database incarnation and backup simulator");
                println!();
                println!("USAGE:");
                println!("    incarnation-sim [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <PATH>       JSON configuration file");
                println!("    -r, --retention <N>       Backups kept before expiry [default: 5]");
                println!("    -b, --backup-ms <MS>      Simulated backup duration [default: 2000]");
                println!("    -h, --help                Print help information");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    parsed
}

fn load_config(args: &Args) -> SimResult<SimulatorConfig> {
    let mut config = match &args.config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                SimError::internal(format!("failed to read {}: {e}", path.display()))
            })?;
            SimulatorConfig::from_json_str(&raw)?
        }
        None => SimulatorConfig::default(),
    };
    if let Some(limit) = args.retention {
        config = config.with_retention_limit(limit);
    }
    if let Some(ms) = args.backup_ms {
        config = config.with_backup_duration(Duration::from_millis(ms));
    }
    config.validate()?;
    Ok(config)
}

fn report<T>(step: &str, outcome: &CommandOutcome<T>) {
    if outcome.success {
        tracing::info!(step, message = %outcome.message, "ok");
    } else {
        tracing::warn!(step, message = %outcome.message, kind = ?outcome.error_kind, "rejected");
    }
}

/// Wait for every backup started so far to complete.
fn wait_for_backups(session: &SimulatorSession, budget: Duration) -> SimResult<()> {
    let deadline = Instant::now() + budget;
    while Instant::now() < deadline {
        if session.list_backups()?.iter().all(|b| b.is_completed()) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    tracing::warn!("backups still in progress after {budget:?}");
    Ok(())
}

fn run(config: &SimulatorConfig) -> SimResult<()> {
    let session = SimulatorSession::new(config)?;
    let budget = config.backup_duration * 2 + Duration::from_millis(250);

    let root = session.create_incarnation(None, false)?;

    for backup_type in [BackupType::Full, BackupType::IncrL0] {
        let outcome = CommandOutcome::from_result(session.create_backup(backup_type), "backup started");
        report(backup_type.as_str(), &outcome);
    }
    // Level 1 before the baseline completes is refused.
    report(
        "INCR_L1 (early)",
        &CommandOutcome::from_result(session.create_backup(BackupType::IncrL1), "backup started"),
    );
    wait_for_backups(&session, budget)?;
    report(
        "INCR_L1",
        &CommandOutcome::from_result(session.create_backup(BackupType::IncrL1), "backup started"),
    );

    let pitr = RecoveryOptions::new(RecoveryType::Pitr)
        .target_time(root.timestamp + ChronoDuration::minutes(15));
    let result = session.recover(root.id, &pitr);
    tracing::info!(success = result.success, message = %result.message, "PITR");

    let missing = session.recover_active(&RecoveryOptions::new(RecoveryType::Flashback));
    tracing::info!(success = missing.success, message = %missing.message, "FLASHBACK without target");

    let flashback = session.recover_active(&RecoveryOptions::new(RecoveryType::Flashback).target_scn(500));
    tracing::info!(success = flashback.success, message = %flashback.message, "FLASHBACK");

    for backup_type in [BackupType::Archivelog, BackupType::Controlfile, BackupType::Cumulative] {
        let receipt = session.create_backup(backup_type)?;
        if let Some(notice) = receipt.notice() {
            tracing::info!(%notice, "retention");
        }
    }

    let tightened = session.set_retention(3)?;
    if let Some(notice) = tightened.notice() {
        tracing::info!(%notice, "retention");
    }

    session.select(root.id)?;
    let reverted = session.revert_to_selected()?;
    tracing::info!(id = %reverted.id, "reverted to root");

    wait_for_backups(&session, budget)?;
    let violations = session.validate_lineage()?;
    if !violations.is_empty() {
        return Err(SimError::internal(format!("lineage invalid: {violations:?}")));
    }

    let snapshot = session.snapshot()?;
    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| SimError::internal(format!("failed to render snapshot: {e}")))?;
    println!("{json}");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(&config) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
