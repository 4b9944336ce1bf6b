//! Infrastructure adapters: execution backend, receptors, emitters and their
//! supervision.

pub mod backend;
pub mod emitter;
pub mod memory;
pub mod receptor;
pub mod supervisor;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

pub use backend::FunctionBackend;
pub use emitter::{Emitter, EventSink};
pub use memory::{ChannelSink, ChannelSource};
pub use receptor::{EventSource, Receptor};
pub use supervisor::{Worker, WorkerHandle, WorkerKind, WorkerSnapshot, WorkerStatus};

use crate::config::IoConfig;
use crate::core::basket::BasketCatalog;
use crate::core::{SchedulerError, SchedulerResult};
use crate::util::types::normalize_name;

/// Named registry of receptors and emitters.
///
/// Workers never call into the scheduler; they only lock, append and swap
/// their own basket.
pub struct IoSupervisor {
    catalog: Arc<BasketCatalog>,
    config: IoConfig,
    workers: Mutex<BTreeMap<String, WorkerHandle>>,
}

impl IoSupervisor {
    /// Create an empty supervisor.
    #[must_use]
    pub fn new(catalog: Arc<BasketCatalog>, config: IoConfig) -> Self {
        Self {
            catalog,
            config,
            workers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Add a receptor feeding `basket`. It starts PAUSED.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::DuplicateWorker` if the name is taken
    /// - `SchedulerError::BasketNotFound` if the basket does not exist
    /// - `SchedulerError::Backend` if the thread cannot be spawned
    pub fn add_receptor(
        &self,
        name: &str,
        basket: &str,
        source: impl EventSource,
    ) -> SchedulerResult<()> {
        let qualified = self.catalog.resolve(basket)?.name().to_string();
        let receptor = Receptor::new(
            Arc::clone(&self.catalog),
            qualified.clone(),
            source,
            self.config.batch_size,
            self.config.lock_timeout(),
        );
        self.insert(name, WorkerKind::Receptor, &qualified, receptor)
    }

    /// Add an emitter draining `basket`. It starts PAUSED.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::DuplicateWorker` if the name is taken
    /// - `SchedulerError::BasketNotFound` if the basket does not exist
    /// - `SchedulerError::Backend` if the thread cannot be spawned
    pub fn add_emitter(&self, name: &str, basket: &str, sink: impl EventSink) -> SchedulerResult<()> {
        let qualified = self.catalog.resolve(basket)?.name().to_string();
        let emitter = Emitter::new(
            Arc::clone(&self.catalog),
            qualified.clone(),
            sink,
            self.config.lock_timeout(),
        );
        self.insert(name, WorkerKind::Emitter, &qualified, emitter)
    }

    fn insert(
        &self,
        name: &str,
        kind: WorkerKind,
        basket: &str,
        worker: impl Worker,
    ) -> SchedulerResult<()> {
        let key = normalize_name(name);
        let mut workers = self.workers.lock();
        if workers.contains_key(&key) {
            return Err(SchedulerError::DuplicateWorker(key));
        }
        let handle = WorkerHandle::spawn(&key, kind, basket, worker, self.config.clone())?;
        workers.insert(key, handle);
        Ok(())
    }

    fn with_worker<T>(&self, name: &str, f: impl FnOnce(&WorkerHandle) -> T) -> SchedulerResult<T> {
        let workers = self.workers.lock();
        workers
            .get(&normalize_name(name))
            .map(f)
            .ok_or_else(|| SchedulerError::WorkerNotFound(name.to_string()))
    }

    /// Pause one worker.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::WorkerNotFound` for unknown names.
    pub fn pause(&self, name: &str) -> SchedulerResult<()> {
        self.with_worker(name, WorkerHandle::pause)
    }

    /// Resume one worker (also clears ERROR).
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::WorkerNotFound` for unknown names.
    pub fn resume(&self, name: &str) -> SchedulerResult<()> {
        self.with_worker(name, WorkerHandle::resume)
    }

    /// Status of one worker.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::WorkerNotFound` for unknown names.
    pub fn status(&self, name: &str) -> SchedulerResult<WorkerStatus> {
        self.with_worker(name, WorkerHandle::status)
    }

    /// Block until a worker reaches `status` or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::WorkerNotFound` for unknown names.
    pub fn wait_for_status(
        &self,
        name: &str,
        status: WorkerStatus,
        timeout: Duration,
    ) -> SchedulerResult<bool> {
        self.with_worker(name, |w| w.wait_for_status(status, timeout))
    }

    /// Pause every RUNNING worker. Returns how many were asked to pause.
    pub fn pause_all(&self) -> usize {
        let workers = self.workers.lock();
        let running: Vec<&WorkerHandle> = workers
            .values()
            .filter(|w| w.status() == WorkerStatus::Running)
            .collect();
        running.iter().for_each(|w| w.pause());
        info!(workers = running.len(), "workers paused");
        running.len()
    }

    /// Resume every PAUSED worker. Returns how many were asked to resume.
    pub fn resume_all(&self) -> usize {
        let workers = self.workers.lock();
        let paused: Vec<&WorkerHandle> = workers
            .values()
            .filter(|w| w.status() == WorkerStatus::Paused)
            .collect();
        paused.iter().for_each(|w| w.resume());
        info!(workers = paused.len(), "workers resumed");
        paused.len()
    }

    /// Stop and remove one worker.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::WorkerNotFound` for unknown names.
    pub fn stop(&self, name: &str) -> SchedulerResult<()> {
        let handle = self
            .workers
            .lock()
            .remove(&normalize_name(name))
            .ok_or_else(|| SchedulerError::WorkerNotFound(name.to_string()))?;
        handle.stop();
        info!(worker = %handle.name(), "worker stopped");
        Ok(())
    }

    /// Stop and remove every worker.
    pub fn stop_all(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers.values() {
            handle.stop();
        }
        if !workers.is_empty() {
            info!(workers = workers.len(), "all workers stopped");
        }
    }

    /// Snapshots of every worker, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.workers.lock().values().map(WorkerHandle::snapshot).collect()
    }
}

impl Drop for IoSupervisor {
    fn drop(&mut self) {
        self.stop_all();
    }
}
