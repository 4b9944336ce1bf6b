//! Tests for builder modules

use std::sync::Arc;

use petrinet_scheduler::builders::{build_catalog, build_engine};
use petrinet_scheduler::config::{BasketConfig, EngineConfig, SchedulerConfig};
use petrinet_scheduler::core::{ColumnDef, ColumnType, EntryPoint, SchedulerStatus, Value};
use petrinet_scheduler::infra::FunctionBackend;

fn config() -> EngineConfig {
    EngineConfig {
        scheduler: SchedulerConfig::new().with_auto_start(false),
        baskets: vec![
            BasketConfig {
                name: "input".to_string(),
                columns: vec![ColumnDef::new("v", ColumnType::Int)],
                threshold: 2,
                window: 4,
                stride: Some(2),
                time_slice_ms: 0,
                time_stride_ms: 0,
                beat_ms: 500,
            },
            BasketConfig {
                name: "output".to_string(),
                columns: vec![ColumnDef::new("v", ColumnType::Int)],
                threshold: 0,
                window: 0,
                stride: None,
                time_slice_ms: 0,
                time_stride_ms: 0,
                beat_ms: 0,
            },
        ],
        ..EngineConfig::default()
    }
}

#[test]
fn test_build_catalog_applies_policies() {
    let catalog = build_catalog(&config()).unwrap();
    assert_eq!(catalog.names(), vec!["streams.input", "streams.output"]);

    let input = catalog.get("input").unwrap();
    let policy = input.policy();
    assert_eq!(policy.threshold, 2);
    assert_eq!(policy.window, 4);
    assert_eq!(policy.stride, 2);
    assert_eq!(policy.beat_ms, 500);
}

#[test]
fn test_build_catalog_rejects_invalid_config() {
    let mut cfg = config();
    cfg.scheduler.stop_poll_limit = 0;
    assert!(build_catalog(&cfg).is_err());
}

#[test]
fn test_build_engine_wires_components() {
    let engine = build_engine(&config(), |catalog| {
        let backend = FunctionBackend::new(Arc::clone(catalog));
        backend.define_forward(EntryPoint::new("cq", "copy"), &["input"], Some("output"));
        Ok(backend)
    })
    .unwrap();

    engine
        .scheduler
        .register("copy", EntryPoint::new("cq", "copy"), "")
        .unwrap();
    engine.scheduler.resume_transition("copy").unwrap();
    engine.catalog.touch("input").unwrap();
    for i in 0..2 {
        engine.catalog.append("input", vec![Value::Int(i)]).unwrap();
    }

    let report = engine.scheduler.run_round();
    assert_eq!(report.fired.len(), 1);
    assert_eq!(engine.catalog.peek("output").unwrap().count, 2);

    engine.shutdown().unwrap();
    assert_eq!(engine.scheduler.status(), SchedulerStatus::Init);
}

#[test]
fn test_build_engine_backend_failure() {
    let result = build_engine::<FunctionBackend, _>(&config(), |_| {
        Err(petrinet_scheduler::core::SchedulerError::Backend(
            "unavailable".to_string(),
        ))
    });
    let err = result.err().unwrap();
    assert!(format!("{err:#}").contains("unavailable"));
}
