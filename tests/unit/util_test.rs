//! Tests for utility functions

use petrinet_scheduler::util::{
    age_ms, init_tracing, lookup_keys, normalize_name, now_ms, qualify_name, BasketId,
    TransitionId, DEFAULT_SCHEMA,
};

#[test]
fn test_name_normalization() {
    assert_eq!(normalize_name("  Sensors "), "sensors");
    assert_eq!(qualify_name("Sensors"), format!("{DEFAULT_SCHEMA}.sensors"));
    assert_eq!(qualify_name("iot.Sensors"), "iot.sensors");
}

#[test]
fn test_lookup_prefers_exact_name() {
    let keys = lookup_keys("IoT.Readings");
    assert_eq!(keys[0], "iot.readings");
    assert_eq!(keys[1], "iot.readings");
}

#[test]
fn test_id_display() {
    assert_eq!(TransitionId(7).to_string(), "t7");
    assert_eq!(BasketId(3).to_string(), "b3");
}

#[test]
fn test_age() {
    let now = now_ms();
    assert_eq!(age_ms(now, now), 0);
    assert_eq!(age_ms(now + 5, now), 0);
    assert_eq!(age_ms(now - 20, now), 20);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    assert!(tracing::dispatcher::has_been_set());
}
