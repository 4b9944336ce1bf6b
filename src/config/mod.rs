//! Configuration models for the scheduler, baskets and I/O supervision.

pub mod io;
pub mod scheduler;

pub use io::{BackoffConfig, IoConfig};
pub use scheduler::{BasketConfig, EngineConfig, SchedulerConfig};
