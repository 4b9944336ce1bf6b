//! Receptors: external event sources feeding a basket.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::core::basket::BasketCatalog;
use crate::core::column::Row;
use crate::core::SchedulerError;
use crate::infra::supervisor::Worker;

/// Producer of rows for a receptor. The wire protocol lives behind this trait.
pub trait EventSource: Send + 'static {
    /// Fetch up to `max_rows` rows. An empty batch means "nothing yet".
    ///
    /// # Errors
    ///
    /// A message describing a broken source; the receptor restarts it.
    fn poll(&mut self, max_rows: usize) -> Result<Vec<Row>, String>;

    /// Reconnect after a failure.
    ///
    /// # Errors
    ///
    /// A message describing why reconnecting failed.
    fn reconnect(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// Appends rows from an [`EventSource`] into one basket.
///
/// Rows are fetched without holding any lock; the basket is locked only for
/// the append. Rows that could not be appended because the lock timed out are
/// kept and retried on the next step.
pub struct Receptor<S: EventSource> {
    basket: String,
    catalog: Arc<BasketCatalog>,
    source: S,
    pending: Vec<Row>,
    batch_size: usize,
    lock_timeout: Duration,
    rejected: u64,
}

impl<S: EventSource> Receptor<S> {
    /// Create a receptor feeding `basket`.
    pub fn new(
        catalog: Arc<BasketCatalog>,
        basket: impl Into<String>,
        source: S,
        batch_size: usize,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            basket: basket.into(),
            catalog,
            source,
            pending: Vec::new(),
            batch_size: batch_size.max(1),
            lock_timeout,
            rejected: 0,
        }
    }
}

impl<S: EventSource> Worker for Receptor<S> {
    fn step(&mut self) -> Result<usize, String> {
        if self.pending.is_empty() {
            self.pending = self.source.poll(self.batch_size)?;
            if self.pending.is_empty() {
                return Ok(0);
            }
        }

        let basket = self.catalog.resolve(&self.basket).map_err(|e| e.to_string())?;
        let mut guard = match basket.lock(self.lock_timeout) {
            Ok(guard) => guard,
            Err(SchedulerError::LockTimeout(_)) => {
                trace!(basket = %self.basket, pending = self.pending.len(), "basket busy, retrying");
                return Ok(0);
            }
            Err(e) => return Err(e.to_string()),
        };

        let mut appended = 0;
        for row in self.pending.drain(..) {
            match guard.append(row) {
                Ok(()) => appended += 1,
                Err(e) => {
                    self.rejected += 1;
                    debug!(basket = %self.basket, error = %e, "row rejected");
                }
            }
        }
        Ok(appended)
    }

    fn restart(&mut self) -> Result<(), String> {
        self.source.reconnect()
    }

    fn rejected(&self) -> u64 {
        self.rejected
    }
}
