//! Emitters: drain a basket to an external sink.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::core::basket::BasketCatalog;
use crate::core::column::ColumnBatch;
use crate::core::SchedulerError;
use crate::infra::supervisor::Worker;

/// Consumer of drained batches.
pub trait EventSink: Send + 'static {
    /// Deliver one batch.
    ///
    /// # Errors
    ///
    /// A message describing the failure; the batch is retried after reconnect.
    fn emit(&mut self, batch: &ColumnBatch) -> Result<(), String>;

    /// Reconnect after a failure.
    ///
    /// # Errors
    ///
    /// A message describing why reconnecting failed.
    fn reconnect(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// Swaps a basket out under its lock and emits the batch outside it.
///
/// A batch whose delivery failed stays pending and is emitted again before the
/// basket is drained a second time.
pub struct Emitter<K: EventSink> {
    basket: String,
    catalog: Arc<BasketCatalog>,
    sink: K,
    pending: Option<ColumnBatch>,
    lock_timeout: Duration,
}

impl<K: EventSink> Emitter<K> {
    /// Create an emitter draining `basket`.
    pub fn new(
        catalog: Arc<BasketCatalog>,
        basket: impl Into<String>,
        sink: K,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            basket: basket.into(),
            catalog,
            sink,
            pending: None,
            lock_timeout,
        }
    }
}

impl<K: EventSink> Worker for Emitter<K> {
    fn step(&mut self) -> Result<usize, String> {
        if self.pending.is_none() {
            let basket = self.catalog.resolve(&self.basket).map_err(|e| e.to_string())?;
            let mut guard = match basket.lock(self.lock_timeout) {
                Ok(guard) => guard,
                Err(SchedulerError::LockTimeout(_)) => {
                    trace!(basket = %self.basket, "basket busy, retrying");
                    return Ok(0);
                }
                Err(e) => return Err(e.to_string()),
            };
            if guard.is_empty() {
                return Ok(0);
            }
            self.pending = Some(guard.swap());
        }

        let Some(batch) = &self.pending else {
            return Ok(0);
        };
        self.sink.emit(batch)?;
        let rows = batch.len();
        self.pending = None;
        Ok(rows)
    }

    fn restart(&mut self) -> Result<(), String> {
        self.sink.reconnect()
    }
}
