//! Backup completion scheduling.
//!
//! A backup is created in progress and completes after a fixed delay. The
//! scheduler only decides *when*; completion always goes through
//! [`BackupLedger::complete`], the same call interactive callers use.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender, TrySendError};

use crate::backup::ledger::BackupLedger;
use crate::backup::types::BackupId;
use crate::error::BackupError;

/// Arranges for a backup to be completed later.
pub trait CompletionScheduler: Send + Sync {
    /// Queue `id` for completion. Must not block: callers may hold the
    /// ledger write lock.
    ///
    /// # Errors
    /// `SchedulerUnavailable` if the scheduler can no longer fire,
    /// `SchedulerQueueFull` if it cannot take more work right now.
    fn schedule(&self, id: BackupId) -> Result<(), BackupError>;
}

struct Pending {
    due: Instant,
    seq: u64,
    id: BackupId,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

/// Completes backups on a dedicated timer thread after a fixed delay.
///
/// Requests travel over a bounded channel; the worker keeps a min-heap of
/// deadlines and sleeps in `recv_timeout` until the earliest one. A full
/// queue rejects the request instead of waiting. Dropping
/// the scheduler closes the channel and joins the worker. Completions still
/// pending at that point are discarded.
pub struct TimerScheduler {
    tx: Option<Sender<BackupId>>,
    delay: Duration,
    capacity: usize,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("delay", &self.delay)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl TimerScheduler {
    /// Spawn the timer thread.
    ///
    /// # Errors
    /// `SchedulerUnavailable` if the thread cannot be spawned.
    pub fn start(
        ledger: Arc<BackupLedger>,
        delay: Duration,
        queue_capacity: usize,
    ) -> Result<Self, BackupError> {
        let capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<BackupId>(capacity);
        let join = thread::Builder::new()
            .name("incarnation-sim-backup-timer".to_string())
            .spawn(move || {
                let mut heap: BinaryHeap<Reverse<Pending>> = BinaryHeap::new();
                let mut seq = 0_u64;
                loop {
                    let received = match heap.peek() {
                        Some(Reverse(next)) => {
                            rx.recv_timeout(next.due.saturating_duration_since(Instant::now()))
                        }
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match received {
                        Ok(id) => {
                            heap.push(Reverse(Pending {
                                due: Instant::now() + delay,
                                seq,
                                id,
                            }));
                            seq += 1;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let now = Instant::now();
                    while heap.peek().is_some_and(|Reverse(p)| p.due <= now) {
                        if let Some(Reverse(p)) = heap.pop() {
                            if let Err(err) = ledger.complete(&p.id) {
                                tracing::warn!(id = %p.id, error = %err, "scheduled completion failed");
                            }
                        }
                    }
                }
                if !heap.is_empty() {
                    tracing::debug!(pending = heap.len(), "backup timer stopped with pending completions");
                }
            })
            .map_err(|err| {
                tracing::warn!(error = %err, "failed to spawn backup timer");
                BackupError::SchedulerUnavailable
            })?;

        Ok(Self {
            tx: Some(tx),
            delay,
            capacity,
            join: Mutex::new(Some(join)),
        })
    }

    /// Delay between scheduling and completion.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl CompletionScheduler for TimerScheduler {
    fn schedule(&self, id: BackupId) -> Result<(), BackupError> {
        let tx = self.tx.as_ref().ok_or(BackupError::SchedulerUnavailable)?;
        match tx.try_send(id) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(id)) => {
                tracing::warn!(%id, capacity = self.capacity, "backup completion queue full");
                Err(BackupError::SchedulerQueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(BackupError::SchedulerUnavailable),
        }
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        // Close the channel first so the worker wakes up and exits.
        drop(self.tx.take());
        if let Ok(mut guard) = self.join.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Collects scheduled ids until the caller fires them.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    queue: Mutex<Vec<BackupId>>,
}

impl ManualScheduler {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids scheduled and not yet fired, oldest first.
    ///
    /// # Errors
    /// Only on a poisoned lock.
    pub fn pending(&self) -> Result<Vec<BackupId>, BackupError> {
        let queue = self
            .queue
            .lock()
            .map_err(|_| BackupError::StatePoisoned { context: "scheduler.pending" })?;
        Ok(queue.clone())
    }

    /// Take every pending id without completing anything.
    ///
    /// # Errors
    /// Only on a poisoned lock.
    pub fn drain(&self) -> Result<Vec<BackupId>, BackupError> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| BackupError::StatePoisoned { context: "scheduler.drain" })?;
        Ok(std::mem::take(&mut *queue))
    }

    /// Complete every pending id on `ledger`. Returns how many transitioned.
    ///
    /// # Errors
    /// The first ledger error; ids before it stay completed.
    pub fn fire_all(&self, ledger: &BackupLedger) -> Result<usize, BackupError> {
        let mut fired = 0;
        for id in self.drain()? {
            if ledger.complete(&id)? {
                fired += 1;
            }
        }
        Ok(fired)
    }
}

impl CompletionScheduler for ManualScheduler {
    fn schedule(&self, id: BackupId) -> Result<(), BackupError> {
        self.queue
            .lock()
            .map_err(|_| BackupError::StatePoisoned { context: "scheduler.schedule" })?
            .push(id);
        Ok(())
    }
}

/// Never completes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl CompletionScheduler for NoopScheduler {
    fn schedule(&self, _id: BackupId) -> Result<(), BackupError> {
        Ok(())
    }
}
