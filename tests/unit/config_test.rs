//! Tests for configuration validation

use petrinet_scheduler::config::{BackoffConfig, BasketConfig, EngineConfig, IoConfig, SchedulerConfig};
use petrinet_scheduler::core::{ColumnDef, ColumnType};

fn basket(name: &str) -> BasketConfig {
    BasketConfig {
        name: name.to_string(),
        columns: vec![ColumnDef::new("v", ColumnType::Int)],
        threshold: 0,
        window: 0,
        stride: None,
        time_slice_ms: 0,
        time_stride_ms: 0,
        beat_ms: 0,
    }
}

#[test]
fn test_scheduler_config_defaults() {
    let config = SchedulerConfig::new();
    assert_eq!(config.cycle_delay_ms, 1);
    assert_eq!(config.stop_poll_limit, 100);
    assert!(config.auto_start);
    assert!(config.validate().is_ok());
}

#[test]
fn test_scheduler_config_invalid_poll_limit() {
    let config = SchedulerConfig::new().with_stop_poll_limit(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_lock_timeout() {
    let config = SchedulerConfig::new().with_lock_timeout_ms(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_basket_config_validation() {
    assert!(basket("b").validate().is_ok());

    let mut no_columns = basket("b");
    no_columns.columns.clear();
    assert!(no_columns.validate().is_err());

    let mut bad_stride = basket("b");
    bad_stride.window = 4;
    bad_stride.stride = Some(8);
    assert!(bad_stride.validate().is_err());

    assert!(basket("  ").validate().is_err());
}

#[test]
fn test_io_config_validation() {
    assert!(IoConfig::default().validate().is_ok());

    let invalid = IoConfig {
        batch_size: 0,
        ..IoConfig::default()
    };
    assert!(invalid.validate().is_err());

    let invalid = IoConfig {
        backoff: BackoffConfig {
            multiplier: 0.5,
            ..BackoffConfig::default()
        },
        ..IoConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_engine_config_from_json() {
    let json = r#"{
        "scheduler": { "cycle_delay_ms": 5, "auto_start": false },
        "baskets": [
            {
                "name": "sensors",
                "columns": [
                    { "name": "id", "type": "int" },
                    { "name": "temp", "type": "float" }
                ],
                "threshold": 10,
                "beat_ms": 1000
            }
        ],
        "io": { "batch_size": 64, "backoff": { "max_retries": 2 } }
    }"#;

    let config = EngineConfig::from_json_str(json).unwrap();
    assert_eq!(config.scheduler.cycle_delay_ms, 5);
    assert_eq!(config.scheduler.stop_poll_limit, 100);
    assert!(!config.scheduler.auto_start);
    assert_eq!(config.baskets.len(), 1);
    assert_eq!(config.baskets[0].threshold, 10);
    assert_eq!(config.baskets[0].columns[1].ty, ColumnType::Float);
    assert_eq!(config.io.batch_size, 64);
    assert_eq!(config.io.backoff.max_retries, 2);
    assert_eq!(config.io.backoff.initial_backoff_ms, 10);
}

#[test]
fn test_engine_config_rejects_invalid_basket() {
    let json = r#"{ "baskets": [ { "name": "empty", "columns": [] } ] }"#;
    let err = EngineConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("empty"));
}
