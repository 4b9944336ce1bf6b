//! Execution backend abstraction for transition bodies.
//!
//! The scheduler never knows what a transition body does. It asks the backend
//! which baskets a body reads and writes when the transition is registered,
//! and invokes the body when the transition fires. Bodies are expected to
//! drain their source baskets themselves (lock, [`swap`], unlock) and append
//! into their targets.
//!
//! [`swap`]: crate::core::basket::BasketGuard::swap
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use petrinet_scheduler::core::{
//!     Dependencies, EntryPoint, ExecutionBackend, ExecutionError, SchedulerError,
//! };
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl ExecutionBackend for Noop {
//!     fn dependencies(&self, _entry: &EntryPoint) -> Result<Dependencies, SchedulerError> {
//!         Ok(Dependencies::default())
//!     }
//!
//!     async fn invoke(&self, _entry: &EntryPoint) -> Result<(), ExecutionError> {
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::core::transition::{Dependencies, EntryPoint};
use crate::core::SchedulerResult;

/// Failure reported by a transition body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// The body failed; the transition enters `ERROR` for this round.
    #[error("{0}")]
    Failed(String),
    /// The body reported "too early". Not an error: the firing is accounted
    /// like a success but keeps the previous `last_error`.
    #[error("deferred: {0}")]
    Deferred(String),
}

impl ExecutionError {
    /// Classify a raw backend message. Messages mentioning "too early" are
    /// treated as a deferral.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.to_lowercase().contains("too early") {
            Self::Deferred(message)
        } else {
            Self::Failed(message)
        }
    }
}

/// Runs transition bodies on behalf of the scheduler.
#[async_trait]
pub trait ExecutionBackend: Send + Sync + 'static {
    /// Source and target baskets of a body.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::FunctionNotFound` if the entry point is unknown.
    fn dependencies(&self, entry: &EntryPoint) -> SchedulerResult<Dependencies>;

    /// Run the body once.
    async fn invoke(&self, entry: &EntryPoint) -> Result<(), ExecutionError>;

    /// Roll back partial work after a failed invocation.
    async fn abort(&self, _entry: &EntryPoint) -> Result<(), ExecutionError> {
        Ok(())
    }

    /// Whether [`abort`](Self::abort) does anything.
    fn supports_abort(&self) -> bool {
        false
    }
}
