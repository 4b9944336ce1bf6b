//! Tests for audit sink

use petrinet_scheduler::core::{build_audit_event, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event("streams.t1", "register", Some("payload".to_string()));

    sink.record(event.clone());
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].event_id, event.event_id);
    assert_eq!(events[0].subject, "streams.t1");
    assert_eq!(events[0].action, "register");
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event("t1", "register", None));
    sink.record(build_audit_event("t2", "register", None));
    sink.record(build_audit_event("t3", "register", None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].subject, "t2"); // First one popped
    assert_eq!(events[1].subject, "t3");
}

#[test]
fn test_zero_capacity_sink_keeps_nothing() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event("scheduler", "start", None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_build_audit_event() {
    let a = build_audit_event("streams.t1", "fail", Some("boom".to_string()));
    let b = build_audit_event("streams.t1", "fail", None);

    assert_eq!(a.action, "fail");
    assert_eq!(a.payload, Some("boom".to_string()));
    assert!(a.created_at_ms > 0);
    assert_ne!(a.event_id, b.event_id);
}
