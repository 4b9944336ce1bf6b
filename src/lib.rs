//! # Petrinet Scheduler
//!
//! A Petri-net scheduler for continuous queries over streaming event baskets.
//!
//! Events arrive through *receptors* and are buffered in named *baskets*
//! (the Petri-net places). Registered *transitions* (continuous queries) drain
//! their source baskets and write into target baskets. A dedicated control
//! loop repeatedly checks which transitions are enabled and fires them one at
//! a time, in registration order. *Emitters* drain result baskets to the
//! outside world.
//!
//! ## Core Problem Solved
//!
//! - **Admission**: a transition fires only when every source basket holds at
//!   least its threshold of rows and none of them is stale.
//! - **No double consumption**: a basket can be the source of at most one
//!   transition; registration rejects a second consumer.
//! - **Cheap draining**: baskets are drained with a swap under a short lock,
//!   so the lock is never held while a body or an emitter processes rows.
//! - **Failure isolation**: a failing body is recorded on its transition and
//!   never affects other transitions.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use petrinet_scheduler::config::SchedulerConfig;
//! use petrinet_scheduler::core::{BasketCatalog, ColumnDef, ColumnType, EntryPoint, Scheduler, Value};
//! use petrinet_scheduler::infra::FunctionBackend;
//!
//! let catalog = Arc::new(BasketCatalog::new(Duration::from_millis(50)));
//! catalog.register("sensors", vec![ColumnDef::new("temp", ColumnType::Float)])?;
//! catalog.register("alerts", vec![ColumnDef::new("temp", ColumnType::Float)])?;
//! catalog.set_threshold("sensors", 10)?;
//!
//! let backend = FunctionBackend::new(Arc::clone(&catalog));
//! backend.define_forward(EntryPoint::new("cq", "alerts"), &["sensors"], Some("alerts"));
//!
//! let scheduler = Scheduler::new(
//!     SchedulerConfig::new().with_auto_start(false),
//!     Arc::clone(&catalog),
//!     backend,
//! )?;
//! scheduler.register("alerts_q", EntryPoint::new("cq", "alerts"), "select * from sensors")?;
//! scheduler.resume_transition("alerts_q")?;
//!
//! for i in 0..10 {
//!     catalog.append("sensors", vec![Value::Float(f64::from(i))])?;
//! }
//! let report = scheduler.run_round();
//! assert_eq!(report.fired, vec!["streams.alerts_q".to_string()]);
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - admission, isolation and lifecycle scenarios
//! - `tests/io_test.rs` - receptors and emitters around a running scheduler

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: baskets, transitions and the control loop.
pub mod core;
/// Configuration models for the scheduler, baskets and I/O supervision.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Infrastructure adapters: execution backend, receptors and emitters.
pub mod infra;
/// Control API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
