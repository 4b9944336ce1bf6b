//! The Petri-net control loop.
//!
//! A [`Scheduler`] owns the transition registry and decides *when* each
//! transition fires. One dedicated thread runs the loop; it evaluates every
//! running transition's source baskets with lock-free peeks, then fires the
//! enabled transitions one after another in registration order through the
//! [`ExecutionBackend`].
//!
//! # State machine
//!
//! ```text
//! INIT --start--> RUNNING <--pause/resume--> PAUSED
//!                    |                          |
//!                    +-----------stop-----------+--> STOPPED --loop exit--> INIT
//! ```
//!
//! - Pausing never interrupts an in-flight firing; `pause_scheduler` returns
//!   once it has completed.
//! - `stop_scheduler` polls a bounded number of times for the loop to reach
//!   INIT and reports `SchedulerStopTimeout` otherwise.
//! - Removing a transition requires the scheduler to be paused.
//!
//! # Threading
//!
//! The loop thread owns no state of its own: everything lives in a shared
//! block guarded by `parking_lot` locks. The inter-round sleep is a
//! `crossbeam-channel` `recv_timeout`, so control calls wake the loop
//! promptly. Bodies are `async`; the scheduler drives them on a
//! current-thread `tokio` runtime with `block_on`, one at a time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tracing::{debug, error, info, trace, warn};

use crate::config::SchedulerConfig;
use crate::core::audit::{build_audit_event, AuditSink};
use crate::core::basket::{BasketCatalog, BasketSnapshot};
use crate::core::executor::{ExecutionBackend, ExecutionError};
use crate::core::transition::{
    EntryPoint, PoolRec, Transition, TransitionRegistry, TransitionStatus,
};
use crate::core::{SchedulerError, SchedulerResult};
use crate::util::clock::{age_ms, now_ms};
use crate::util::types::TransitionId;

/// Global scheduler status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchedulerStatus {
    /// No control loop.
    Init,
    /// Loop evaluating and firing.
    Running,
    /// Loop alive but idle.
    Paused,
    /// Loop draining towards INIT.
    Stopped,
}

impl fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Outcome of one scheduling round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    /// Round number (0 if the round did not run).
    pub round: u64,
    /// Transitions found eligible, in firing order.
    pub enabled: Vec<String>,
    /// Transitions whose body succeeded.
    pub fired: Vec<String>,
    /// Transitions whose body failed.
    pub failed: Vec<String>,
    /// Transitions whose body deferred ("too early").
    pub deferred: Vec<String>,
}

/// Direction of a transition/basket edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// Basket drained by the transition.
    Source,
    /// Basket filled by the transition.
    Target,
}

/// Inspection view of one edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    /// Transition name.
    pub transition: String,
    /// Basket name.
    pub basket: String,
    /// Edge direction.
    pub direction: EdgeDirection,
    /// Rows seen at the last evaluation or firing.
    pub last_count: usize,
    /// Rows consumed through this edge.
    pub consumed: u64,
}

/// Inspection view of one transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSnapshot {
    /// Qualified name.
    pub name: String,
    /// Body entry point (`module.function`).
    pub entry: String,
    /// Query text.
    pub definition: String,
    /// Lifecycle status.
    pub status: TransitionStatus,
    /// Last successful firing (ms since epoch).
    pub last_seen_ms: Option<u64>,
    /// Number of firings.
    pub cycles: u64,
    /// Events consumed by successful firings.
    pub events_consumed: u64,
    /// Cumulative execution time in microseconds.
    pub total_time_micros: u64,
    /// Last failure message.
    pub last_error: Option<String>,
}

/// Read-only snapshot of the whole scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dump {
    /// Global status.
    pub status: SchedulerStatus,
    /// Rounds executed so far.
    pub rounds: u64,
    /// Transitions in registration order.
    pub transitions: Vec<TransitionSnapshot>,
    /// All edges, sources before targets per transition.
    pub edges: Vec<EdgeSnapshot>,
}

impl Dump {
    /// Snapshot of a transition by qualified name.
    #[must_use]
    pub fn transition(&self, name: &str) -> Option<&TransitionSnapshot> {
        let qualified = crate::util::types::qualify_name(name);
        self.transitions.iter().find(|t| t.name == qualified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Loop,
    Manual,
}

/// Entry points keyed on the registry generation they were built from.
#[derive(Debug, Default)]
struct DispatchTable {
    generation: Option<u64>,
    entries: Vec<(TransitionId, EntryPoint)>,
}

impl DispatchTable {
    fn rebuild(&mut self, registry: &TransitionRegistry) {
        self.entries = registry.iter().map(|t| (t.id, t.entry.clone())).collect();
        self.generation = Some(registry.generation());
    }

    fn entry(&self, id: TransitionId) -> Option<&EntryPoint> {
        self.entries.iter().find(|(t, _)| *t == id).map(|(_, e)| e)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.generation = None;
    }
}

struct Shared<B: ExecutionBackend> {
    config: SchedulerConfig,
    catalog: Arc<BasketCatalog>,
    backend: Arc<B>,
    runtime: Runtime,
    registry: RwLock<TransitionRegistry>,
    status: Mutex<SchedulerStatus>,
    status_changed: Condvar,
    /// Held for the duration of a round.
    firing: Mutex<DispatchTable>,
    /// Transitions paused by `pause_scheduler`, restored on resume.
    suspended: Mutex<Vec<TransitionId>>,
    rounds: AtomicU64,
    audit: Mutex<Option<Box<dyn AuditSink>>>,
}

struct LoopHandle {
    wake: Sender<()>,
    join: JoinHandle<()>,
}

impl LoopHandle {
    fn is_alive(&self) -> bool {
        !self.join.is_finished()
    }
}

/// Continuous-query scheduler.
pub struct Scheduler<B: ExecutionBackend> {
    shared: Arc<Shared<B>>,
    control: Mutex<Option<LoopHandle>>,
}

impl<B: ExecutionBackend> Scheduler<B> {
    /// Create a scheduler in INIT state. The loop is not started.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if the configuration is invalid
    /// - `SchedulerError::Backend` if the body runtime cannot be built
    pub fn new(
        config: SchedulerConfig,
        catalog: Arc<BasketCatalog>,
        backend: B,
    ) -> SchedulerResult<Self> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SchedulerError::Backend(format!("failed to build runtime: {e}")))?;

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                catalog,
                backend: Arc::new(backend),
                runtime,
                registry: RwLock::new(TransitionRegistry::new()),
                status: Mutex::new(SchedulerStatus::Init),
                status_changed: Condvar::new(),
                firing: Mutex::new(DispatchTable::default()),
                suspended: Mutex::new(Vec::new()),
                rounds: AtomicU64::new(0),
                audit: Mutex::new(None),
            }),
            control: Mutex::new(None),
        })
    }

    /// Attach an audit sink, replacing any previous one.
    pub fn set_audit_sink(&self, sink: impl AuditSink + 'static) {
        *self.shared.audit.lock() = Some(Box::new(sink));
    }

    /// Builder-style [`set_audit_sink`](Self::set_audit_sink).
    #[must_use]
    pub fn with_audit_sink(self, sink: impl AuditSink + 'static) -> Self {
        self.set_audit_sink(sink);
        self
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Basket catalog shared with receptors, emitters and bodies.
    #[must_use]
    pub fn catalog(&self) -> &Arc<BasketCatalog> {
        &self.shared.catalog
    }

    /// Execution backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.shared.backend
    }

    /// Current global status.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        *self.shared.status.lock()
    }

    /// Rounds executed so far.
    #[must_use]
    pub fn rounds(&self) -> u64 {
        self.shared.rounds.load(Ordering::Relaxed)
    }

    /// Number of registered transitions.
    #[must_use]
    pub fn transition_count(&self) -> usize {
        self.shared.registry.read().len()
    }

    /// Start the control loop.
    ///
    /// From INIT the status becomes RUNNING. A scheduler paused before its
    /// loop ever started gets a loop but stays PAUSED. Starting a live loop
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidLifecycleState` while a stop is in progress
    /// - `SchedulerError::Backend` if the loop thread cannot be spawned
    pub fn start(&self) -> SchedulerResult<()> {
        let mut control = self.control.lock();
        let from_init = {
            let mut status = self.shared.status.lock();
            match *status {
                SchedulerStatus::Init => {
                    *status = SchedulerStatus::Running;
                    self.shared.status_changed.notify_all();
                    true
                }
                SchedulerStatus::Running | SchedulerStatus::Paused => {
                    if control.as_ref().is_some_and(LoopHandle::is_alive) {
                        return Ok(());
                    }
                    false
                }
                SchedulerStatus::Stopped => {
                    return Err(SchedulerError::InvalidLifecycleState(
                        "scheduler is stopping".into(),
                    ));
                }
            }
        };

        if let Some(old) = control.take() {
            // The previous loop already reported INIT; reap it.
            if old.join.join().is_err() {
                warn!("previous scheduler loop panicked");
            }
        }

        let (wake, wake_rx) = unbounded();
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("petrinet-scheduler".into())
            .spawn(move || control_loop(&shared, &wake_rx));

        match spawned {
            Ok(join) => {
                *control = Some(LoopHandle { wake, join });
                info!(
                    cycle_delay_ms = self.shared.config.cycle_delay_ms,
                    "scheduler started"
                );
                self.shared.audit("scheduler", "start", None);
                Ok(())
            }
            Err(e) => {
                if from_init {
                    *self.shared.status.lock() = SchedulerStatus::Init;
                }
                error!(error = %e, "failed to spawn scheduler loop");
                Err(SchedulerError::Backend(format!(
                    "failed to spawn scheduler loop: {e}"
                )))
            }
        }
    }

    /// Register a transition. It starts PAUSED; call
    /// [`resume_transition`](Self::resume_transition) to make it eligible.
    ///
    /// With `auto_start` configured, the first successful registration starts
    /// the loop. A failure to spawn the loop is logged and the transition
    /// stays registered; call [`start`](Self::start) to retry.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::DuplicateTransition`
    /// - `SchedulerError::FunctionNotFound` if the backend does not know `entry`
    /// - `SchedulerError::BasketNotFound`
    /// - `SchedulerError::DuplicateBasketConsumption`
    pub fn register(
        &self,
        name: &str,
        entry: EntryPoint,
        definition: &str,
    ) -> SchedulerResult<TransitionId> {
        let (id, qualified) = {
            let mut registry = self.shared.registry.write();
            if let Some(existing) = registry.get(name) {
                return Err(SchedulerError::DuplicateTransition(existing.name.clone()));
            }
            let deps = self.shared.backend.dependencies(&entry)?;
            let id = registry.register(&self.shared.catalog, name, definition, entry, &deps)?;
            let qualified = registry
                .get_by_id(id)
                .map_or_else(|| name.to_string(), |t| t.name.clone());
            (id, qualified)
        };
        info!(transition = %qualified, id = %id, "transition registered");
        self.shared.audit(&qualified, "register", None);
        self.wake();

        if self.shared.config.auto_start && self.status() == SchedulerStatus::Init {
            if let Err(e) = self.start() {
                error!(transition = %qualified, error = %e, "auto start failed");
            }
        }
        Ok(id)
    }

    /// Remove a transition. The scheduler must be paused, so no firing of it
    /// can be in flight.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidLifecycleState` unless the scheduler is PAUSED
    /// - `SchedulerError::TransitionNotFound`
    pub fn remove(&self, name: &str) -> SchedulerResult<()> {
        let status = self.status();
        if status != SchedulerStatus::Paused {
            return Err(SchedulerError::InvalidLifecycleState(format!(
                "removing `{name}` requires a paused scheduler (status {status})"
            )));
        }
        let _firing = self.shared.firing.lock();
        let removed = self.shared.registry.write().remove(name)?;
        self.shared.suspended.lock().retain(|id| *id != removed.id);
        info!(transition = %removed.name, "transition removed");
        self.shared.audit(&removed.name, "remove", None);
        Ok(())
    }

    /// Pause the scheduler and every active transition. Returns once any
    /// in-flight firing has completed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidLifecycleState` while a stop is in progress.
    pub fn pause_scheduler(&self) -> SchedulerResult<()> {
        let paused = {
            let mut status = self.shared.status.lock();
            match *status {
                SchedulerStatus::Paused => return Ok(()),
                SchedulerStatus::Stopped => {
                    return Err(SchedulerError::InvalidLifecycleState(
                        "cannot pause a stopping scheduler".into(),
                    ));
                }
                SchedulerStatus::Init | SchedulerStatus::Running => {}
            }
            let mut registry = self.shared.registry.write();
            let mut suspended = self.shared.suspended.lock();
            for t in registry.iter_mut() {
                if matches!(t.status, TransitionStatus::Running | TransitionStatus::Error) {
                    t.status = TransitionStatus::Paused;
                    suspended.push(t.id);
                }
            }
            *status = SchedulerStatus::Paused;
            self.shared.status_changed.notify_all();
            suspended.len()
        };
        // Wait for the in-flight firing, if any.
        drop(self.shared.firing.lock());
        info!(transitions = paused, "scheduler paused");
        self.shared.audit("scheduler", "pause", None);
        Ok(())
    }

    /// Resume a paused scheduler, restoring the transitions the pause
    /// suspended. From INIT this starts the loop. Idempotent.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidLifecycleState` while a stop is in progress
    /// - `SchedulerError::Backend` if the loop thread cannot be spawned
    pub fn resume_scheduler(&self) -> SchedulerResult<()> {
        {
            let mut status = self.shared.status.lock();
            match *status {
                SchedulerStatus::Running => return Ok(()),
                SchedulerStatus::Stopped => {
                    return Err(SchedulerError::InvalidLifecycleState(
                        "cannot resume a stopping scheduler".into(),
                    ));
                }
                SchedulerStatus::Init => {
                    drop(status);
                    return self.start();
                }
                SchedulerStatus::Paused => {}
            }
            let mut registry = self.shared.registry.write();
            let restored: Vec<TransitionId> = self.shared.suspended.lock().drain(..).collect();
            for id in restored {
                if let Some(t) = registry.get_by_id_mut(id) {
                    if t.status == TransitionStatus::Paused {
                        t.status = TransitionStatus::Running;
                    }
                }
            }
            *status = SchedulerStatus::Running;
            self.shared.status_changed.notify_all();
        }
        info!("scheduler resumed");
        self.shared.audit("scheduler", "resume", None);
        self.start()?;
        self.wake();
        Ok(())
    }

    /// Stop the loop and wait for it to return to INIT.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::SchedulerStopTimeout` if the loop did not reach
    /// INIT within `stop_poll_limit` polls; the loop keeps draining.
    pub fn stop_scheduler(&self) -> SchedulerResult<()> {
        let mut control = self.control.lock();
        let alive = control.as_ref().is_some_and(LoopHandle::is_alive);
        {
            let mut status = self.shared.status.lock();
            if *status == SchedulerStatus::Init {
                return Ok(());
            }
            self.shared.suspended.lock().clear();
            *status = if alive {
                SchedulerStatus::Stopped
            } else {
                SchedulerStatus::Init
            };
            self.shared.status_changed.notify_all();
        }
        if !alive {
            // No loop to drain: finish the transition to INIT here.
            self.shared.firing.lock().clear();
            info!("scheduler stopped");
            self.shared.audit("scheduler", "stop", None);
            return Ok(());
        }
        if let Some(handle) = control.as_ref() {
            let _ = handle.wake.send(());
        }

        let limit = self.shared.config.stop_poll_limit;
        let interval = self.shared.config.cycle_delay() + Duration::from_millis(1);
        {
            let mut status = self.shared.status.lock();
            let mut polls = 0;
            while *status != SchedulerStatus::Init {
                if polls >= limit {
                    warn!(polls, "scheduler did not stop in time");
                    return Err(SchedulerError::SchedulerStopTimeout(limit));
                }
                self.shared.status_changed.wait_for(&mut status, interval);
                polls += 1;
            }
        }

        if let Some(handle) = control.take() {
            if handle.join.join().is_err() {
                warn!("scheduler loop panicked");
            }
        }
        info!("scheduler stopped");
        self.shared.audit("scheduler", "stop", None);
        Ok(())
    }

    /// Pause every RUNNING (or ERROR) transition. Returns how many changed.
    pub fn pause_all(&self) -> usize {
        let mut registry = self.shared.registry.write();
        let mut changed = Vec::new();
        for t in registry.iter_mut() {
            if matches!(t.status, TransitionStatus::Running | TransitionStatus::Error) {
                t.status = TransitionStatus::Paused;
                changed.push(t.id);
            }
        }
        drop(registry);
        // Explicitly paused transitions are no longer restored by a scheduler resume.
        if !changed.is_empty() {
            self.shared
                .suspended
                .lock()
                .retain(|id| !changed.contains(id));
        }
        info!(transitions = changed.len(), "all transitions paused");
        changed.len()
    }

    /// Resume every PAUSED transition. Returns how many changed.
    pub fn resume_all(&self) -> usize {
        let mut registry = self.shared.registry.write();
        let mut changed = 0;
        for t in registry.iter_mut() {
            if t.status == TransitionStatus::Paused {
                t.status = TransitionStatus::Running;
                changed += 1;
            }
        }
        drop(registry);
        info!(transitions = changed, "all transitions resumed");
        self.wake();
        changed
    }

    /// Pause one transition. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TransitionNotFound` for unknown names.
    pub fn pause_transition(&self, name: &str) -> SchedulerResult<()> {
        let mut registry = self.shared.registry.write();
        let previous = registry.set_status(name, TransitionStatus::Paused)?;
        let (id, qualified) = registry
            .get(name)
            .map(|t| (t.id, t.name.clone()))
            .ok_or_else(|| SchedulerError::TransitionNotFound(name.to_string()))?;
        drop(registry);
        self.shared.suspended.lock().retain(|s| *s != id);
        if previous != TransitionStatus::Paused {
            info!(transition = %qualified, "transition paused");
            self.shared.audit(&qualified, "pause", None);
        }
        Ok(())
    }

    /// Make one transition eligible again. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TransitionNotFound` for unknown names.
    pub fn resume_transition(&self, name: &str) -> SchedulerResult<()> {
        let (previous, qualified) = {
            let mut registry = self.shared.registry.write();
            let previous = registry.set_status(name, TransitionStatus::Running)?;
            let qualified = registry
                .get(name)
                .map_or_else(|| name.to_string(), |t| t.name.clone());
            (previous, qualified)
        };
        if previous != TransitionStatus::Running {
            info!(transition = %qualified, "transition resumed");
            self.shared.audit(&qualified, "resume", None);
        }
        self.wake();
        Ok(())
    }

    /// Read-only snapshot of every transition and edge.
    #[must_use]
    pub fn dump(&self) -> Dump {
        let status = self.status();
        let rounds = self.rounds();
        let registry = self.shared.registry.read();
        let mut transitions = Vec::with_capacity(registry.len());
        let mut edges = Vec::new();
        for t in registry.iter() {
            transitions.push(snapshot(t));
            edges.extend(edge_snapshots(t, &t.sources, EdgeDirection::Source));
            edges.extend(edge_snapshots(t, &t.targets, EdgeDirection::Target));
        }
        Dump {
            status,
            rounds,
            transitions,
            edges,
        }
    }

    /// Snapshot of one transition.
    #[must_use]
    pub fn transition(&self, name: &str) -> Option<TransitionSnapshot> {
        self.shared.registry.read().get(name).map(snapshot)
    }

    /// Status of every basket in the catalog.
    #[must_use]
    pub fn baskets(&self) -> Vec<BasketSnapshot> {
        self.shared.catalog.status()
    }

    /// Run one evaluation and firing round on the calling thread.
    ///
    /// Runs while the scheduler is INIT or RUNNING and is a no-op (round 0)
    /// when it is PAUSED or STOPPED. Rounds are serialized with the loop.
    /// Must not be called from inside an async runtime.
    pub fn run_round(&self) -> RoundReport {
        self.shared.round(Mode::Manual)
    }

    fn wake(&self) {
        if let Some(handle) = self.control.lock().as_ref() {
            let _ = handle.wake.send(());
        }
    }
}

impl<B: ExecutionBackend> Shared<B> {
    fn audit(&self, subject: &str, action: &str, payload: Option<String>) {
        if let Some(sink) = self.audit.lock().as_mut() {
            sink.record(build_audit_event(subject, action, payload));
        }
    }

    fn gate_open(&self, mode: Mode) -> bool {
        match *self.status.lock() {
            SchedulerStatus::Running => true,
            SchedulerStatus::Init => mode == Mode::Manual,
            SchedulerStatus::Paused | SchedulerStatus::Stopped => false,
        }
    }

    fn round(&self, mode: Mode) -> RoundReport {
        let mut table = self.firing.lock();
        let mut report = RoundReport::default();
        if !self.gate_open(mode) {
            return report;
        }
        let round = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;
        report.round = round;

        let enabled = {
            let mut registry = self.registry.write();
            if table.generation != Some(registry.generation()) {
                table.rebuild(&registry);
                debug!(
                    generation = registry.generation(),
                    transitions = registry.len(),
                    "dispatch table rebuilt"
                );
            }
            evaluate(&mut registry)
        };
        report.enabled = enabled.iter().map(|(_, name)| name.clone()).collect();

        for (id, name) in enabled {
            if !self.gate_open(mode) {
                debug!(round, "round interrupted by status change");
                break;
            }
            let Some(entry) = table.entry(id).cloned() else {
                continue;
            };
            {
                let mut registry = self.registry.write();
                let Some(t) = registry.get_by_id_mut(id) else {
                    continue;
                };
                if t.status != TransitionStatus::Running {
                    continue;
                }
                t.cycles += 1;
            }

            debug!(transition = %name, round, "firing transition");
            let started = Instant::now();
            let outcome = self.runtime.block_on(self.backend.invoke(&entry));
            let elapsed = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

            match outcome {
                Ok(()) => {
                    self.record_success(id, elapsed, true);
                    report.fired.push(name);
                }
                Err(ExecutionError::Deferred(message)) => {
                    self.record_success(id, elapsed, false);
                    debug!(transition = %name, message = %message, "transition deferred");
                    report.deferred.push(name);
                }
                Err(ExecutionError::Failed(message)) => {
                    self.record_failure(id, &message, elapsed);
                    let err = SchedulerError::TransitionExecution {
                        name: name.clone(),
                        message: message.clone(),
                    };
                    warn!(transition = %name, round, error = %err, "transition failed");
                    self.audit(&name, "fail", Some(message));
                    if self.backend.supports_abort() {
                        if let Err(e) = self.runtime.block_on(self.backend.abort(&entry)) {
                            error!(transition = %name, error = %e, "abort after failure failed");
                        }
                    }
                    report.failed.push(name);
                }
            }
        }

        if !report.enabled.is_empty() {
            trace!(
                round,
                fired = report.fired.len(),
                failed = report.failed.len(),
                "round complete"
            );
        }
        report
    }

    /// Success accounting. A deferred firing is accounted the same way but
    /// keeps the previous `last_error`.
    fn record_success(&self, id: TransitionId, elapsed: u64, clear_error: bool) {
        let mut registry = self.registry.write();
        let Some(t) = registry.get_by_id_mut(id) else {
            return;
        };
        t.total_time_micros = t.total_time_micros.saturating_add(elapsed);
        if clear_error {
            t.last_error = None;
        }
        t.last_seen_ms = Some(now_ms());
        for s in &mut t.sources {
            s.basket().touch();
            let available = s.available as u64;
            t.events_consumed += available;
            s.consumed += available;
            s.available = 0;
        }
        for target in &mut t.targets {
            target.last_count = target.basket().peek().count;
        }
    }

    fn record_failure(&self, id: TransitionId, message: &str, elapsed: u64) {
        let mut registry = self.registry.write();
        let Some(t) = registry.get_by_id_mut(id) else {
            return;
        };
        t.total_time_micros = t.total_time_micros.saturating_add(elapsed);
        t.last_error = Some(message.to_string());
        // A pause issued during the firing wins over the error status.
        if t.status == TransitionStatus::Running {
            t.status = TransitionStatus::Error;
        }
    }

}

/// Evaluate every running transition, returning the enabled ones in
/// registration order.
fn evaluate(registry: &mut TransitionRegistry) -> Vec<(TransitionId, String)> {
    let now = now_ms();
    let mut enabled = Vec::new();
    for t in registry.iter_mut() {
        if t.status == TransitionStatus::Error {
            t.status = TransitionStatus::Running;
        }
        if t.status != TransitionStatus::Running {
            continue;
        }
        if t.sources.is_empty() {
            trace!(transition = %t.name, "no source baskets");
            continue;
        }
        if sources_ready(&t.name, &mut t.sources, now) {
            enabled.push((t.id, t.name.clone()));
        }
    }
    enabled
}

fn sources_ready(transition: &str, sources: &mut [PoolRec], now: u64) -> bool {
    for s in sources {
        let basket = Arc::clone(s.basket());
        if !basket.is_valid() {
            debug!(transition, basket = %s.basket_name, "source basket missing");
            s.available = 0;
            return false;
        }
        let peek = basket.peek();
        s.available = peek.count;
        s.last_count = peek.count;
        if peek.count == 0 {
            return false;
        }
        let policy = basket.policy();
        if peek.count < policy.threshold {
            trace!(
                transition,
                basket = %s.basket_name,
                count = peek.count,
                threshold = policy.threshold,
                "source below threshold"
            );
            return false;
        }
        if policy.beat_ms > 0 && age_ms(peek.last_seen_ms, now) > policy.beat_ms {
            debug!(
                transition,
                basket = %s.basket_name,
                beat_ms = policy.beat_ms,
                "source basket stale"
            );
            return false;
        }
    }
    true
}

fn control_loop<B: ExecutionBackend>(shared: &Shared<B>, wake: &Receiver<()>) {
    debug!("scheduler loop running");
    loop {
        let status = *shared.status.lock();
        match status {
            SchedulerStatus::Running => {
                shared.round(Mode::Loop);
            }
            SchedulerStatus::Paused => {}
            SchedulerStatus::Stopped | SchedulerStatus::Init => break,
        }
        match wake.recv_timeout(shared.config.cycle_delay()) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    shared.firing.lock().clear();
    let mut status = shared.status.lock();
    *status = SchedulerStatus::Init;
    shared.status_changed.notify_all();
    drop(status);
    debug!("scheduler loop exited");
}

fn snapshot(t: &Transition) -> TransitionSnapshot {
    TransitionSnapshot {
        name: t.name.clone(),
        entry: t.entry.to_string(),
        definition: t.definition.clone(),
        status: t.status,
        last_seen_ms: t.last_seen_ms,
        cycles: t.cycles,
        events_consumed: t.events_consumed,
        total_time_micros: t.total_time_micros,
        last_error: t.last_error.clone(),
    }
}

fn edge_snapshots<'a>(
    t: &'a Transition,
    edges: &'a [PoolRec],
    direction: EdgeDirection,
) -> impl Iterator<Item = EdgeSnapshot> + 'a {
    edges.iter().map(move |e| EdgeSnapshot {
        transition: t.name.clone(),
        basket: e.basket_name.clone(),
        direction,
        last_count: e.last_count,
        consumed: e.consumed,
    })
}
