//! Event baskets and the basket catalog.
//!
//! A basket is the Petri-net *place*: a named buffer of events with an
//! admission policy. Receptors append into it, transition bodies and emitters
//! drain it with [`BasketGuard::swap`], and the scheduler only peeks at its
//! fill level.
//!
//! Locking contract:
//!
//! - [`Basket::lock`] waits at most the given delay (`parking_lot`
//!   `try_lock_for`) and never blocks forever; a timeout means "not available
//!   this round".
//! - The lock is released when the [`BasketGuard`] drops, so every exit path
//!   unlocks, including a failing transition body.
//! - [`Basket::peek`] reads atomics only. Its count is republished when a guard
//!   drops and may be stale by at most one critical section.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::column::{ColumnBatch, ColumnDef, Row};
use crate::core::{SchedulerError, SchedulerResult};
use crate::util::clock::now_ms;
use crate::util::types::{lookup_keys, qualify_name, BasketId};

/// Admission policy of a basket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketPolicy {
    /// Minimum buffered rows before the basket can enable its transition.
    pub threshold: usize,
    /// Sliding window size in rows (0 = no window).
    pub window: usize,
    /// Rows dropped per tumble.
    pub stride: usize,
    /// Window frozen: tumbling is suspended.
    pub keep: bool,
    /// Temporal window size in milliseconds (informational).
    pub time_slice_ms: u64,
    /// Temporal window stride in milliseconds (informational).
    pub time_stride_ms: u64,
    /// Maximum staleness in milliseconds (0 = never stale).
    pub beat_ms: u64,
}

/// Approximate fill level used for scheduling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peek {
    /// Buffered rows as of the last critical section.
    pub count: usize,
    /// Last time the basket was drained or touched (ms since epoch).
    pub last_seen_ms: u64,
}

/// Read-only basket status for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketSnapshot {
    /// Qualified basket name.
    pub name: String,
    /// Buffered rows.
    pub count: usize,
    /// Admission policy.
    pub policy: BasketPolicy,
    /// Last drain/touch (ms since epoch).
    pub last_seen_ms: u64,
    /// Events appended over the basket's lifetime.
    pub events: u64,
    /// Number of drains.
    pub cycles: u64,
    /// Recent errors, oldest first.
    pub errors: Vec<String>,
}

/// A named, lockable event buffer.
#[derive(Debug)]
pub struct Basket {
    id: BasketId,
    name: String,
    schema: Arc<[ColumnDef]>,
    columns: Mutex<ColumnBatch>,
    policy: RwLock<BasketPolicy>,
    count: AtomicUsize,
    last_seen: AtomicU64,
    events: AtomicU64,
    cycles: AtomicU64,
    errors: Mutex<VecDeque<String>>,
    error_capacity: usize,
    valid: AtomicBool,
}

impl Basket {
    fn new(id: BasketId, name: String, schema: Arc<[ColumnDef]>, error_capacity: usize) -> Self {
        Self {
            id,
            name,
            columns: Mutex::new(ColumnBatch::new(Arc::clone(&schema))),
            schema,
            policy: RwLock::new(BasketPolicy::default()),
            count: AtomicUsize::new(0),
            last_seen: AtomicU64::new(now_ms()),
            events: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            errors: Mutex::new(VecDeque::with_capacity(error_capacity.min(64))),
            error_capacity,
            valid: AtomicBool::new(true),
        }
    }

    /// Stable identifier.
    #[must_use]
    pub const fn id(&self) -> BasketId {
        self.id
    }

    /// Qualified name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column schema.
    #[must_use]
    pub fn schema(&self) -> &[ColumnDef] {
        &self.schema
    }

    /// Whether the backing storage is still registered.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Acquire the basket lock, waiting at most `max_wait`.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::BasketMissing` if the basket was dropped
    /// - `SchedulerError::LockTimeout` if the lock stayed held for `max_wait`
    pub fn lock(&self, max_wait: Duration) -> SchedulerResult<BasketGuard<'_>> {
        if !self.is_valid() {
            return Err(SchedulerError::BasketMissing(self.name.clone()));
        }
        let columns = self
            .columns
            .try_lock_for(max_wait)
            .ok_or_else(|| SchedulerError::LockTimeout(self.name.clone()))?;
        // Dropped while we were waiting.
        if !self.is_valid() {
            return Err(SchedulerError::BasketMissing(self.name.clone()));
        }
        Ok(BasketGuard {
            basket: self,
            columns,
        })
    }

    /// Lock-free, possibly stale fill level.
    #[must_use]
    pub fn peek(&self) -> Peek {
        Peek {
            count: self.count.load(Ordering::Acquire),
            last_seen_ms: self.last_seen.load(Ordering::Acquire),
        }
    }

    /// Mark the basket as seen now. `last_seen` never moves backwards.
    pub fn touch(&self) {
        self.last_seen.fetch_max(now_ms(), Ordering::AcqRel);
    }

    /// Current admission policy.
    #[must_use]
    pub fn policy(&self) -> BasketPolicy {
        self.policy.read().clone()
    }

    /// Update the admission policy in place.
    pub fn update_policy(&self, f: impl FnOnce(&mut BasketPolicy)) {
        f(&mut self.policy.write());
    }

    /// Record an error in the bounded error log.
    pub fn log_error(&self, message: impl Into<String>) {
        if self.error_capacity == 0 {
            return;
        }
        let mut errors = self.errors.lock();
        if errors.len() >= self.error_capacity {
            errors.pop_front();
        }
        errors.push_back(message.into());
    }

    /// Events appended over the basket's lifetime.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Number of times the basket was drained.
    #[must_use]
    pub fn cycle_count(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Inspection snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BasketSnapshot {
        let peek = self.peek();
        BasketSnapshot {
            name: self.name.clone(),
            count: peek.count,
            policy: self.policy(),
            last_seen_ms: peek.last_seen_ms,
            events: self.event_count(),
            cycles: self.cycle_count(),
            errors: self.errors.lock().iter().cloned().collect(),
        }
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

/// Exclusive access to a basket's live columns. Dropping the guard unlocks.
pub struct BasketGuard<'a> {
    basket: &'a Basket,
    columns: MutexGuard<'a, ColumnBatch>,
}

impl BasketGuard<'_> {
    /// Basket this guard locks.
    #[must_use]
    pub const fn basket(&self) -> &Basket {
        self.basket
    }

    /// Rows currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no rows are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Detach the live columns, install empty ones and return the detached
    /// batch for lock-free processing.
    pub fn swap(&mut self) -> ColumnBatch {
        let fresh = self.columns.empty_like();
        let drained = std::mem::replace(&mut *self.columns, fresh);
        self.basket.count.store(0, Ordering::Release);
        self.basket.cycles.fetch_add(1, Ordering::Relaxed);
        self.basket.touch();
        drained
    }

    /// Append one row to the live columns.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::RowRejected` if the row does not fit the schema.
    pub fn append(&mut self, row: Row) -> SchedulerResult<()> {
        if let Err(e) = self.columns.push_row(row) {
            self.basket.log_error(e.to_string());
            return Err(e);
        }
        self.basket.events.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Append every row of `batch`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::RowRejected` if the batch schema differs.
    pub fn append_batch(&mut self, batch: ColumnBatch) -> SchedulerResult<()> {
        let added = batch.len() as u64;
        self.columns.append_batch(batch)?;
        self.basket.events.fetch_add(added, Ordering::Relaxed);
        Ok(())
    }

    /// Drop the first `stride` rows according to the window policy.
    /// Returns the number of rows removed.
    pub fn tumble(&mut self) -> usize {
        let policy = self.basket.policy();
        if policy.keep || policy.stride == 0 {
            return 0;
        }
        let before = self.columns.len();
        let after = self.columns.drop_front(policy.stride);
        before - after
    }

    /// Copy of the first `window` rows (all rows without a window), leaving
    /// the basket untouched.
    #[must_use]
    pub fn window_rows(&self) -> ColumnBatch {
        let window = self.basket.policy().window;
        if window == 0 {
            self.columns.clone()
        } else {
            self.columns.head(window)
        }
    }

    /// Clear the live columns.
    pub fn reset(&mut self) {
        self.columns.clear();
    }
}

impl Drop for BasketGuard<'_> {
    fn drop(&mut self) {
        // Publish the fill level for lock-free peeks.
        self.basket.count.store(self.columns.len(), Ordering::Release);
    }
}

/// Catalog of all registered baskets.
#[derive(Debug)]
pub struct BasketCatalog {
    baskets: RwLock<HashMap<String, Arc<Basket>>>,
    next_id: AtomicU64,
    lock_timeout: Duration,
    error_capacity: usize,
}

impl BasketCatalog {
    /// Create an empty catalog whose convenience operations lock with
    /// `lock_timeout`.
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self::with_error_capacity(lock_timeout, 32)
    }

    /// Create an empty catalog with a custom per-basket error log size.
    #[must_use]
    pub fn with_error_capacity(lock_timeout: Duration, error_capacity: usize) -> Self {
        Self {
            baskets: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            lock_timeout,
            error_capacity,
        }
    }

    /// Default lock delay used by the convenience operations.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Register a basket. Registering an existing name with the same schema
    /// returns the existing basket.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::DuplicateBasket` if the name exists with another schema
    /// - `SchedulerError::InvalidConfig` if `columns` is empty
    pub fn register(&self, name: &str, columns: Vec<ColumnDef>) -> SchedulerResult<Arc<Basket>> {
        if columns.is_empty() {
            return Err(SchedulerError::InvalidConfig(format!(
                "basket `{name}` needs at least one column"
            )));
        }
        let key = qualify_name(name);
        let mut baskets = self.baskets.write();
        if let Some(existing) = baskets.get(&key) {
            if existing.schema() == columns.as_slice() {
                return Ok(Arc::clone(existing));
            }
            return Err(SchedulerError::DuplicateBasket(key));
        }
        let id = BasketId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let basket = Arc::new(Basket::new(
            id,
            key.clone(),
            columns.into(),
            self.error_capacity,
        ));
        baskets.insert(key.clone(), Arc::clone(&basket));
        info!(basket = %key, id = %id, "basket registered");
        Ok(basket)
    }

    /// Look up a basket by exact or schema-qualified name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Basket>> {
        let baskets = self.baskets.read();
        lookup_keys(name)
            .iter()
            .find_map(|k| baskets.get(k))
            .cloned()
    }

    /// Look up a basket, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::BasketNotFound` for unknown names.
    pub fn resolve(&self, name: &str) -> SchedulerResult<Arc<Basket>> {
        self.get(name)
            .ok_or_else(|| SchedulerError::BasketNotFound(name.to_string()))
    }

    /// Look up a basket by name and check it is still the instance `id`.
    #[must_use]
    pub fn get_live(&self, name: &str, id: BasketId) -> Option<Arc<Basket>> {
        self.get(name).filter(|b| b.id() == id && b.is_valid())
    }

    /// Names of all registered baskets, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.baskets.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a basket. Live handles observe `BasketMissing` afterwards.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::BasketNotFound` for unknown names.
    pub fn drop_basket(&self, name: &str) -> SchedulerResult<()> {
        let mut baskets = self.baskets.write();
        let key = lookup_keys(name)
            .into_iter()
            .find(|k| baskets.contains_key(k))
            .ok_or_else(|| SchedulerError::BasketNotFound(name.to_string()))?;
        if let Some(basket) = baskets.remove(&key) {
            basket.invalidate();
            info!(basket = %key, "basket dropped");
        }
        Ok(())
    }

    /// Run `f` with the basket locked.
    ///
    /// # Errors
    ///
    /// Propagates lookup and lock failures, and the error returned by `f`.
    pub fn with_lock<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut BasketGuard<'_>) -> SchedulerResult<T>,
    ) -> SchedulerResult<T> {
        let basket = self.resolve(name)?;
        let mut guard = basket.lock(self.lock_timeout)?;
        f(&mut guard)
    }

    /// Drain a basket: detach its rows and leave it empty.
    ///
    /// # Errors
    ///
    /// Fails if the basket is unknown, dropped or its lock times out.
    pub fn swap(&self, name: &str) -> SchedulerResult<ColumnBatch> {
        self.with_lock(name, |guard| Ok(guard.swap()))
    }

    /// Append one row.
    ///
    /// # Errors
    ///
    /// Fails if the basket is unknown, dropped, locked too long, or the row
    /// does not fit.
    pub fn append(&self, name: &str, row: Row) -> SchedulerResult<()> {
        self.with_lock(name, |guard| guard.append(row))
    }

    /// Append several rows under one lock acquisition, stopping at the first
    /// rejected row. Returns the number of rows appended.
    ///
    /// # Errors
    ///
    /// Fails if the basket is unknown, dropped or locked too long.
    pub fn append_rows(&self, name: &str, rows: Vec<Row>) -> SchedulerResult<usize> {
        self.with_lock(name, |guard| {
            let mut appended = 0;
            for row in rows {
                if let Err(e) = guard.append(row) {
                    debug!(basket = %guard.basket().name(), error = %e, "row rejected");
                    break;
                }
                appended += 1;
            }
            Ok(appended)
        })
    }

    /// Approximate fill level.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::BasketNotFound` for unknown names.
    pub fn peek(&self, name: &str) -> SchedulerResult<Peek> {
        Ok(self.resolve(name)?.peek())
    }

    /// Mark a basket as seen now.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::BasketNotFound` for unknown names.
    pub fn touch(&self, name: &str) -> SchedulerResult<()> {
        self.resolve(name)?.touch();
        Ok(())
    }

    /// Set the minimum row count for eligibility.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::BasketNotFound` for unknown names.
    pub fn set_threshold(&self, name: &str, threshold: usize) -> SchedulerResult<()> {
        self.resolve(name)?.update_policy(|p| p.threshold = threshold);
        Ok(())
    }

    /// Set the maximum staleness in milliseconds (0 disables the check).
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::BasketNotFound` for unknown names.
    pub fn set_beat(&self, name: &str, beat_ms: u64) -> SchedulerResult<()> {
        self.resolve(name)?.update_policy(|p| p.beat_ms = beat_ms);
        Ok(())
    }

    /// Set a sliding window; `stride` defaults to `size`.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::BasketNotFound` for unknown names
    /// - `SchedulerError::InvalidWindow` if the stride exceeds the window
    pub fn set_window(&self, name: &str, size: usize, stride: Option<usize>) -> SchedulerResult<()> {
        let stride = stride.unwrap_or(size);
        if size > 0 && stride > size {
            return Err(SchedulerError::InvalidWindow(format!(
                "stride {stride} exceeds window {size}"
            )));
        }
        self.resolve(name)?.update_policy(|p| {
            p.window = size;
            p.stride = stride;
        });
        Ok(())
    }

    /// Set the temporal window variant.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::BasketNotFound` for unknown names.
    pub fn set_time_window(&self, name: &str, slice_ms: u64, stride_ms: u64) -> SchedulerResult<()> {
        self.resolve(name)?.update_policy(|p| {
            p.time_slice_ms = slice_ms;
            p.time_stride_ms = stride_ms;
        });
        Ok(())
    }

    /// Freeze the window: subsequent tumbles are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::BasketNotFound` for unknown names.
    pub fn keep(&self, name: &str) -> SchedulerResult<()> {
        self.resolve(name)?.update_policy(|p| p.keep = true);
        Ok(())
    }

    /// Unfreeze the window.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::BasketNotFound` for unknown names.
    pub fn release(&self, name: &str) -> SchedulerResult<()> {
        self.resolve(name)?.update_policy(|p| p.keep = false);
        Ok(())
    }

    /// Drop the first `stride` rows. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Fails if the basket is unknown, dropped or locked too long.
    pub fn tumble(&self, name: &str) -> SchedulerResult<usize> {
        self.with_lock(name, |guard| Ok(guard.tumble()))
    }

    /// Copy of the current window without draining.
    ///
    /// # Errors
    ///
    /// Fails if the basket is unknown, dropped or locked too long.
    pub fn window_rows(&self, name: &str) -> SchedulerResult<ColumnBatch> {
        self.with_lock(name, |guard| Ok(guard.window_rows()))
    }

    /// Clear a basket's buffered rows.
    ///
    /// # Errors
    ///
    /// Fails if the basket is unknown, dropped or locked too long.
    pub fn reset(&self, name: &str) -> SchedulerResult<()> {
        self.with_lock(name, |guard| {
            guard.reset();
            Ok(())
        })
    }

    /// Status of every basket, sorted by name.
    #[must_use]
    pub fn status(&self) -> Vec<BasketSnapshot> {
        let baskets = self.baskets.read();
        let mut out: Vec<BasketSnapshot> = baskets.values().map(|b| b.snapshot()).collect();
        drop(baskets);
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Log an error against a basket, ignoring unknown names.
    pub fn log_error(&self, name: &str, message: impl Into<String>) {
        match self.get(name) {
            Some(basket) => basket.log_error(message),
            None => warn!(basket = %name, "error for unknown basket dropped"),
        }
    }
}
