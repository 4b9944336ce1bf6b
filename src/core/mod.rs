//! Core scheduling abstractions: baskets, transitions and the control loop.

pub mod audit;
pub mod basket;
pub mod column;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod transition;

pub use audit::{build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use basket::{Basket, BasketCatalog, BasketGuard, BasketPolicy, BasketSnapshot, Peek};
pub use column::{ColumnBatch, ColumnDef, ColumnType, Row, Value};
pub use error::{AppResult, SchedulerError, SchedulerResult};
pub use executor::{ExecutionBackend, ExecutionError};
pub use scheduler::{
    Dump, EdgeDirection, EdgeSnapshot, RoundReport, Scheduler, SchedulerStatus,
    TransitionSnapshot,
};
pub use transition::{
    Dependencies, EntryPoint, PoolRec, Transition, TransitionRegistry, TransitionStatus,
};
