//! Tests for the control API

use std::sync::Arc;
use std::time::Duration;

use petrinet_scheduler::config::SchedulerConfig;
use petrinet_scheduler::core::{
    BasketCatalog, ColumnDef, ColumnType, EntryPoint, Scheduler, SchedulerStatus,
    TransitionStatus,
};
use petrinet_scheduler::infra::FunctionBackend;
use petrinet_scheduler::runtime::{handle_json, handle_request, health, ControlRequest, ControlResponse};

fn scheduler() -> Scheduler<FunctionBackend> {
    let catalog = Arc::new(BasketCatalog::new(Duration::from_millis(20)));
    catalog
        .register("in", vec![ColumnDef::new("v", ColumnType::Int)])
        .unwrap();
    let backend = FunctionBackend::new(Arc::clone(&catalog));
    backend.define_forward(EntryPoint::new("cq", "drain"), &["in"], None);
    Scheduler::new(SchedulerConfig::new().with_auto_start(false), catalog, backend).unwrap()
}

#[test]
fn test_request_roundtrip_names() {
    let request: ControlRequest =
        serde_json::from_str(r#"{"op":"pause_transition","name":"t1"}"#).unwrap();
    assert_eq!(
        request,
        ControlRequest::PauseTransition {
            name: "t1".to_string()
        }
    );
    let request: ControlRequest = serde_json::from_str(r#"{"op":"resume_all"}"#).unwrap();
    assert_eq!(request, ControlRequest::ResumeAll);
}

#[test]
fn test_register_and_resume() {
    let scheduler = scheduler();
    let response = handle_request(
        &scheduler,
        ControlRequest::Register {
            name: "t1".to_string(),
            module: "cq".to_string(),
            function: "drain".to_string(),
            definition: "select * from in".to_string(),
        },
    )
    .unwrap();
    assert!(matches!(response, ControlResponse::Registered { .. }));

    let response = handle_request(&scheduler, ControlRequest::ResumeAll).unwrap();
    assert_eq!(response, ControlResponse::Changed { count: 1 });
    assert_eq!(
        scheduler.transition("t1").unwrap().status,
        TransitionStatus::Running
    );
}

#[test]
fn test_dump_and_baskets() {
    let scheduler = scheduler();
    scheduler
        .register("t1", EntryPoint::new("cq", "drain"), "")
        .unwrap();

    match handle_request(&scheduler, ControlRequest::Dump).unwrap() {
        ControlResponse::Dump(dump) => {
            assert_eq!(dump.transitions.len(), 1);
            assert_eq!(dump.edges.len(), 1);
        }
        other => panic!("unexpected response: {other:?}"),
    }
    match handle_request(&scheduler, ControlRequest::Baskets).unwrap() {
        ControlResponse::Baskets { baskets } => {
            assert_eq!(baskets.len(), 1);
            assert_eq!(baskets[0].name, "streams.in");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn test_health() {
    let scheduler = scheduler();
    let report = health(&scheduler);
    assert!(report.ok);
    assert_eq!(report.status, SchedulerStatus::Init);
    assert_eq!(report.transitions, 0);
}

#[test]
fn test_handle_json_errors() {
    let scheduler = scheduler();

    let out = handle_json(&scheduler, "not json");
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["kind"], "error");
    assert!(value["message"].as_str().unwrap().starts_with("parse error"));

    let out = handle_json(&scheduler, r#"{"op":"remove","name":"t1"}"#);
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["kind"], "error");
    assert!(value["message"]
        .as_str()
        .unwrap()
        .contains("invalid lifecycle state"));
}

#[test]
fn test_handle_json_pause() {
    let scheduler = scheduler();
    let out = handle_json(&scheduler, r#"{"op":"pause_scheduler"}"#);
    assert_eq!(out, r#"{"kind":"ok"}"#);
    assert_eq!(scheduler.status(), SchedulerStatus::Paused);
}
