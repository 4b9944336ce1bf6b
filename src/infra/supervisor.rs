//! Supervised worker threads for receptors and emitters.
//!
//! Each worker runs on its own OS thread and is controlled through a
//! `crossbeam-channel` command channel. A worker starts PAUSED. While running
//! it calls [`Worker::step`] repeatedly; a failing step is retried after an
//! exponential backoff and a [`Worker::restart`], and once the retry budget is
//! exhausted the worker parks in ERROR until resumed.
//!
//! Commands are handled between steps, so pausing never interrupts a step in
//! progress.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::IoConfig;
use crate::core::{SchedulerError, SchedulerResult};

/// A unit of I/O work driven by a supervisor thread.
pub trait Worker: Send + 'static {
    /// Move one batch. Returns the number of rows moved (0 when idle).
    ///
    /// # Errors
    ///
    /// A message describing the failure; the supervisor backs off and restarts.
    fn step(&mut self) -> Result<usize, String>;

    /// Re-establish the underlying connection after a failure.
    ///
    /// # Errors
    ///
    /// A message describing why the restart failed.
    fn restart(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Rows dropped because they did not fit the basket schema.
    fn rejected(&self) -> u64 {
        0
    }
}

/// Kind of supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Appends external events into a basket.
    Receptor,
    /// Drains a basket to an external sink.
    Emitter,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receptor => f.write_str("receptor"),
            Self::Emitter => f.write_str("emitter"),
        }
    }
}

/// Lifecycle status of a supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkerStatus {
    /// Idle, waiting for resume.
    Paused,
    /// Stepping.
    Running,
    /// Retry budget exhausted; waiting for resume.
    Error,
    /// Thread exited.
    Stopped,
}

/// Inspection view of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    /// Worker name.
    pub name: String,
    /// Receptor or emitter.
    pub kind: WorkerKind,
    /// Basket the worker feeds or drains.
    pub basket: String,
    /// Current status.
    pub status: WorkerStatus,
    /// Rows moved over the worker's lifetime.
    pub rows: u64,
    /// Rows rejected by the basket schema.
    pub rejected: u64,
    /// Successful restarts.
    pub restarts: u64,
    /// Last failure message.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Pause,
    Resume,
    Stop,
}

struct WorkerState {
    status: Mutex<WorkerStatus>,
    changed: Condvar,
    rows: AtomicU64,
    rejected: AtomicU64,
    restarts: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl WorkerState {
    fn new() -> Self {
        Self {
            status: Mutex::new(WorkerStatus::Paused),
            changed: Condvar::new(),
            rows: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    fn status(&self) -> WorkerStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: WorkerStatus) {
        *self.status.lock() = status;
        self.changed.notify_all();
    }
}

/// Handle to a supervised worker thread.
pub struct WorkerHandle {
    name: String,
    kind: WorkerKind,
    basket: String,
    commands: Sender<Command>,
    state: Arc<WorkerState>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Spawn `worker` on a dedicated thread in PAUSED state.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Backend` if the thread cannot be spawned.
    pub fn spawn(
        name: &str,
        kind: WorkerKind,
        basket: &str,
        worker: impl Worker,
        config: IoConfig,
    ) -> SchedulerResult<Self> {
        let (commands, rx) = unbounded();
        let state = Arc::new(WorkerState::new());
        let thread_state = Arc::clone(&state);
        let thread_name = format!("{kind}-{name}");
        let label = name.to_string();
        let join = thread::Builder::new()
            .name(thread_name)
            .spawn(move || supervise(&label, kind, worker, &rx, &thread_state, &config))
            .map_err(|e| SchedulerError::Backend(format!("failed to spawn {kind} `{name}`: {e}")))?;
        info!(worker = %name, kind = %kind, basket = %basket, "worker spawned");
        Ok(Self {
            name: name.to_string(),
            kind,
            basket: basket.to_string(),
            commands,
            state,
            join: Mutex::new(Some(join)),
        })
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.state.status()
    }

    /// Ask the worker to pause after its current step.
    pub fn pause(&self) {
        let _ = self.commands.send(Command::Pause);
    }

    /// Ask the worker to resume (also clears ERROR).
    pub fn resume(&self) {
        let _ = self.commands.send(Command::Resume);
    }

    /// Stop the worker and join its thread.
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
        if let Some(join) = self.join.lock().take() {
            if join.join().is_err() {
                warn!(worker = %self.name, "worker thread panicked");
                self.state.set_status(WorkerStatus::Stopped);
            }
        }
    }

    /// Block until the worker reaches `status` or `timeout` elapses.
    #[must_use]
    pub fn wait_for_status(&self, status: WorkerStatus, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut current = self.state.status.lock();
        while *current != status {
            if self
                .state
                .changed
                .wait_until(&mut current, deadline)
                .timed_out()
            {
                return *current == status;
            }
        }
        true
    }

    /// Inspection snapshot.
    #[must_use]
    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            name: self.name.clone(),
            kind: self.kind,
            basket: self.basket.clone(),
            status: self.status(),
            rows: self.state.rows.load(Ordering::Relaxed),
            rejected: self.state.rejected.load(Ordering::Relaxed),
            restarts: self.state.restarts.load(Ordering::Relaxed),
            last_error: self.state.last_error.lock().clone(),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Signal only; the thread exits on its own once the channel closes.
        let _ = self.commands.send(Command::Stop);
    }
}

fn supervise<W: Worker>(
    name: &str,
    kind: WorkerKind,
    mut worker: W,
    rx: &Receiver<Command>,
    state: &WorkerState,
    config: &IoConfig,
) {
    debug!(worker = %name, kind = %kind, "worker thread started");
    let mut pending: Option<Command> = None;
    let mut failures: u32 = 0;

    loop {
        let status = state.status();
        let command = pending.take().or_else(|| match status {
            WorkerStatus::Running => match rx.try_recv() {
                Ok(cmd) => Some(cmd),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Command::Stop),
            },
            // Idle until told otherwise.
            _ => Some(rx.recv().unwrap_or(Command::Stop)),
        });

        if let Some(command) = command {
            match command {
                Command::Pause => {
                    if status == WorkerStatus::Running {
                        state.set_status(WorkerStatus::Paused);
                        debug!(worker = %name, "worker paused");
                    }
                }
                Command::Resume => {
                    if matches!(status, WorkerStatus::Paused | WorkerStatus::Error) {
                        failures = 0;
                        state.set_status(WorkerStatus::Running);
                        debug!(worker = %name, "worker resumed");
                    }
                }
                Command::Stop => break,
            }
            continue;
        }

        let outcome = worker.step();
        state.rejected.store(worker.rejected(), Ordering::Relaxed);
        match outcome {
            Ok(0) => {
                pending = wait(rx, config.idle_delay());
            }
            Ok(rows) => {
                failures = 0;
                state.rows.fetch_add(rows as u64, Ordering::Relaxed);
            }
            Err(message) => {
                failures += 1;
                warn!(worker = %name, kind = %kind, failures, error = %message, "worker step failed");
                *state.last_error.lock() = Some(message);
                if config.backoff.is_exhausted(failures) {
                    error!(worker = %name, kind = %kind, failures, "worker retry budget exhausted");
                    state.set_status(WorkerStatus::Error);
                    continue;
                }
                pending = wait(rx, config.backoff.delay(failures - 1));
                match worker.restart() {
                    Ok(()) => {
                        state.restarts.fetch_add(1, Ordering::Relaxed);
                        info!(worker = %name, kind = %kind, "worker restarted");
                    }
                    Err(message) => {
                        warn!(worker = %name, kind = %kind, error = %message, "worker restart failed");
                        *state.last_error.lock() = Some(message);
                    }
                }
            }
        }
    }

    state.set_status(WorkerStatus::Stopped);
    debug!(worker = %name, kind = %kind, "worker thread exiting");
}

/// Sleep for `delay` unless a command arrives first.
fn wait(rx: &Receiver<Command>, delay: Duration) -> Option<Command> {
    match rx.recv_timeout(delay) {
        Ok(cmd) => Some(cmd),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Command::Stop),
    }
}
