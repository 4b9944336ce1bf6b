//! Integration tests for receptors and emitters
//!
//! These tests validate:
//! - End-to-end flow from a receptor through a transition to an emitter
//! - Pause/resume of supervised workers
//! - Restart with backoff after sink failures, without losing or duplicating rows
//! - ERROR after the retry budget is exhausted

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use petrinet_scheduler::config::{BackoffConfig, IoConfig, SchedulerConfig};
use petrinet_scheduler::core::{
    BasketCatalog, ColumnBatch, ColumnDef, ColumnType, EntryPoint, Row, Scheduler,
    SchedulerError, Value,
};
use petrinet_scheduler::infra::{
    ChannelSink, ChannelSource, EventSink, FunctionBackend, IoSupervisor, WorkerStatus,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn catalog_with(names: &[&str]) -> Arc<BasketCatalog> {
    let catalog = Arc::new(BasketCatalog::new(Duration::from_millis(50)));
    for name in names {
        catalog
            .register(name, vec![ColumnDef::new("v", ColumnType::Int)])
            .unwrap();
    }
    catalog
}

fn fast_io(max_retries: u32) -> IoConfig {
    IoConfig {
        backoff: BackoffConfig {
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            multiplier: 2.0,
            max_retries,
        },
        idle_delay_ms: 1,
        batch_size: 8,
        lock_timeout_ms: 20,
    }
}

fn collect(rx: &Receiver<Vec<Row>>, expected: usize, timeout: Duration) -> Vec<Row> {
    let deadline = Instant::now() + timeout;
    let mut rows = Vec::new();
    while rows.len() < expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(batch) => rows.extend(batch),
            Err(_) => break,
        }
    }
    rows
}

fn wait_for_count(catalog: &BasketCatalog, basket: &str, count: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if catalog.peek(basket).unwrap().count == count {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Sink failing a fixed number of times before delivering.
struct FlakySink {
    failures_left: u32,
    reconnects: Arc<AtomicU32>,
    tx: Sender<Vec<Row>>,
}

impl EventSink for FlakySink {
    fn emit(&mut self, batch: &ColumnBatch) -> Result<(), String> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err("sink unavailable".to_string());
        }
        self.tx.send(batch.rows()).map_err(|e| e.to_string())
    }

    fn reconnect(&mut self) -> Result<(), String> {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

#[test]
fn test_receptor_transition_emitter_pipeline() {
    let catalog = catalog_with(&["in", "out"]);
    let backend = FunctionBackend::new(Arc::clone(&catalog));
    backend.define_forward(EntryPoint::new("cq", "copy"), &["in"], Some("out"));
    let scheduler = Scheduler::new(
        SchedulerConfig::new().with_cycle_delay_ms(1),
        Arc::clone(&catalog),
        backend,
    )
    .unwrap();
    scheduler
        .register("copy", EntryPoint::new("cq", "copy"), "select * from in")
        .unwrap();
    scheduler.resume_transition("copy").unwrap();

    let io = IoSupervisor::new(Arc::clone(&catalog), fast_io(3));
    let (tx, source) = ChannelSource::new();
    let (sink, delivered) = ChannelSink::new();
    io.add_receptor("rx", "in", source).unwrap();
    io.add_emitter("tx", "out", sink).unwrap();
    assert_eq!(io.resume_all(), 2);

    for i in 0..20 {
        tx.send(vec![Value::Int(i)]).unwrap();
    }

    let rows = collect(&delivered, 20, Duration::from_secs(3));
    let expected: Vec<Row> = (0..20).map(|i| vec![Value::Int(i)]).collect();
    assert_eq!(rows, expected);
    assert_eq!(scheduler.transition("copy").unwrap().events_consumed, 20);

    assert_eq!(io.snapshot().len(), 2);
    let deadline = Instant::now() + Duration::from_secs(1);
    while !io.snapshot().iter().all(|w| w.rows == 20) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert!(io.snapshot().iter().all(|w| w.rows == 20));

    io.stop_all();
    assert!(io.snapshot().is_empty());
    scheduler.stop_scheduler().unwrap();
}

#[test]
fn test_receptor_pause_and_resume() {
    let catalog = catalog_with(&["in"]);
    let io = IoSupervisor::new(Arc::clone(&catalog), fast_io(3));
    let (tx, source) = ChannelSource::new();
    io.add_receptor("rx", "in", source).unwrap();

    assert_eq!(io.status("rx").unwrap(), WorkerStatus::Paused);
    io.resume("rx").unwrap();
    assert!(io
        .wait_for_status("rx", WorkerStatus::Running, Duration::from_secs(1))
        .unwrap());

    io.pause("rx").unwrap();
    assert!(io
        .wait_for_status("rx", WorkerStatus::Paused, Duration::from_secs(1))
        .unwrap());
    for i in 0..5 {
        tx.send(vec![Value::Int(i)]).unwrap();
    }
    thread::sleep(Duration::from_millis(20));
    assert_eq!(catalog.peek("in").unwrap().count, 0);

    io.resume("rx").unwrap();
    assert!(wait_for_count(&catalog, "in", 5));
    io.stop("rx").unwrap();
}

#[test]
fn test_receptor_skips_rejected_rows() {
    let catalog = catalog_with(&["in"]);
    let io = IoSupervisor::new(Arc::clone(&catalog), fast_io(3));
    let (tx, source) = ChannelSource::new();
    io.add_receptor("rx", "in", source).unwrap();
    io.resume("rx").unwrap();

    tx.send(vec![Value::Int(1)]).unwrap();
    tx.send(vec![Value::Text("not a number".to_string())]).unwrap();
    tx.send(vec![Value::Int(2)]).unwrap();

    assert!(wait_for_count(&catalog, "in", 2));
    let rows = catalog.swap("in").unwrap().rows();
    assert_eq!(rows, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);

    let deadline = Instant::now() + Duration::from_secs(1);
    while io.snapshot()[0].rejected != 1 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    let snapshot = &io.snapshot()[0];
    assert_eq!(snapshot.rejected, 1);
    assert_eq!(snapshot.rows, 2);
}

// ============================================================================
// RESTART & ERROR
// ============================================================================

#[test]
fn test_flaky_sink_restarts_without_loss() {
    let catalog = catalog_with(&["out"]);
    for i in 0..3 {
        catalog.append("out", vec![Value::Int(i)]).unwrap();
    }
    let reconnects = Arc::new(AtomicU32::new(0));
    let (tx, delivered) = crossbeam_channel::unbounded();
    let sink = FlakySink {
        failures_left: 2,
        reconnects: Arc::clone(&reconnects),
        tx,
    };

    let io = IoSupervisor::new(Arc::clone(&catalog), fast_io(3));
    io.add_emitter("tx", "out", sink).unwrap();
    io.resume("tx").unwrap();

    let batch = delivered.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(batch.len(), 3);
    assert!(delivered.recv_timeout(Duration::from_millis(30)).is_err());
    assert_eq!(reconnects.load(Ordering::Relaxed), 2);

    let snapshot = &io.snapshot()[0];
    assert_eq!(snapshot.restarts, 2);
    assert_eq!(snapshot.status, WorkerStatus::Running);
    assert_eq!(snapshot.last_error.as_deref(), Some("sink unavailable"));
}

#[test]
fn test_exhausted_retries_enter_error_until_resumed() {
    let catalog = catalog_with(&["out"]);
    catalog.append("out", vec![Value::Int(7)]).unwrap();
    let (tx, delivered) = crossbeam_channel::unbounded();
    let sink = FlakySink {
        failures_left: 2,
        reconnects: Arc::new(AtomicU32::new(0)),
        tx,
    };

    let io = IoSupervisor::new(Arc::clone(&catalog), fast_io(1));
    io.add_emitter("tx", "out", sink).unwrap();
    io.resume("tx").unwrap();
    assert!(io
        .wait_for_status("tx", WorkerStatus::Error, Duration::from_secs(2))
        .unwrap());
    assert!(delivered.try_recv().is_err());

    // The pending batch is delivered once the worker is resumed.
    io.resume("tx").unwrap();
    let batch = delivered.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(batch, vec![vec![Value::Int(7)]]);
}

#[test]
fn test_supervisor_errors() {
    let catalog = catalog_with(&["in"]);
    let io = IoSupervisor::new(Arc::clone(&catalog), fast_io(3));
    let (_tx, source) = ChannelSource::new();
    let (_tx2, other) = ChannelSource::new();

    assert!(matches!(
        io.add_receptor("rx", "missing", ChannelSource::new().1),
        Err(SchedulerError::BasketNotFound(_))
    ));
    io.add_receptor("rx", "in", source).unwrap();
    assert!(matches!(
        io.add_receptor("RX", "in", other),
        Err(SchedulerError::DuplicateWorker(_))
    ));
    assert!(matches!(
        io.pause("nope"),
        Err(SchedulerError::WorkerNotFound(_))
    ));
    assert!(matches!(io.stop("nope"), Err(SchedulerError::WorkerNotFound(_))));
}
