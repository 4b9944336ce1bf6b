//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A transition with this name is already registered.
    #[error("duplicate transition: {0}")]
    DuplicateTransition(String),
    /// The basket is already drained by another registered transition.
    #[error("duplicate use of continuous query input: basket {basket} is consumed by {owner}")]
    DuplicateBasketConsumption {
        /// Basket both transitions would read from.
        basket: String,
        /// Transition currently owning the basket as a source.
        owner: String,
    },
    /// No basket with this name is registered.
    #[error("basket not found: {0}")]
    BasketNotFound(String),
    /// A basket with this name but a different schema already exists.
    #[error("duplicate basket: {0}")]
    DuplicateBasket(String),
    /// The execution backend does not know this entry point.
    #[error("function not found: {0}")]
    FunctionNotFound(String),
    /// No transition with this name is registered.
    #[error("transition not found: {0}")]
    TransitionNotFound(String),
    /// The basket's storage was invalidated (dropped) behind a live handle.
    #[error("basket missing: {0}")]
    BasketMissing(String),
    /// The basket lock could not be acquired within the allowed delay.
    #[error("basket lock timeout: {0}")]
    LockTimeout(String),
    /// A row does not fit the basket schema.
    #[error("row rejected: {0}")]
    RowRejected(String),
    /// Window parameters are inconsistent.
    #[error("invalid window: {0}")]
    InvalidWindow(String),
    /// The execution backend reported a failure for a transition body.
    #[error("transition {name} failed: {message}")]
    TransitionExecution {
        /// Transition name.
        name: String,
        /// Message returned by the backend.
        message: String,
    },
    /// The operation is not allowed in the current scheduler state.
    #[error("invalid lifecycle state: {0}")]
    InvalidLifecycleState(String),
    /// The control loop did not return to INIT within the poll budget.
    #[error("scheduler stop timed out after {0} polls")]
    SchedulerStopTimeout(u32),
    /// A receptor or emitter with this name already exists.
    #[error("duplicate worker: {0}")]
    DuplicateWorker(String),
    /// No receptor or emitter with this name exists.
    #[error("worker not found: {0}")]
    WorkerNotFound(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
