//! Audit trail for scheduler lifecycle events.
//!
//! Every registration, removal, state change and failed firing can be
//! recorded to an [`AuditSink`]. The in-memory sink keeps a bounded ring.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::clock::now_ms;

/// One audited lifecycle change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Transition, basket or worker the event is about (`scheduler` for global ones).
    pub subject: String,
    /// Action taken (register, remove, pause, resume, start, stop, fail).
    pub action: String,
    /// Milliseconds since the epoch.
    pub created_at_ms: u64,
    /// Failure message or other detail.
    pub payload: Option<String>,
}

/// Destination for audit events.
pub trait AuditSink: Send {
    /// Record one event.
    fn record(&mut self, event: AuditEvent);
}

/// Bounded in-memory audit ring.
///
/// Clones share the same ring, so a clone handed to a scheduler can be
/// inspected through the original.
#[derive(Debug, Clone)]
pub struct InMemoryAuditSink {
    ring: Arc<Mutex<VecDeque<AuditEvent>>>,
    capacity: usize,
}

impl InMemoryAuditSink {
    /// Create a sink keeping at most `capacity` events; older ones are evicted.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Every retained event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.ring.lock().iter().cloned().collect()
    }

    /// Actions recorded for `subject`, oldest first.
    #[must_use]
    pub fn actions_for(&self, subject: &str) -> Vec<String> {
        self.ring
            .lock()
            .iter()
            .filter(|e| e.subject == subject)
            .map(|e| e.action.clone())
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut ring = self.ring.lock();
        while ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(event);
    }
}

/// Sink forwarding events to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&mut self, event: AuditEvent) {
        tracing::info!(
            event_id = %event.event_id,
            subject = %event.subject,
            action = %event.action,
            payload = event.payload.as_deref().unwrap_or(""),
            "audit"
        );
    }
}

/// Build an event stamped now, with a fresh v4 id.
pub fn build_audit_event(
    subject: impl Into<String>,
    action: impl Into<String>,
    payload: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        subject: subject.into(),
        action: action.into(),
        created_at_ms: now_ms(),
        payload,
    }
}
