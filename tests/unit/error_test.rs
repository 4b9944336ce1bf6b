//! Tests for error types

use petrinet_scheduler::core::SchedulerError;

#[test]
fn test_duplicate_consumption_error() {
    let err = SchedulerError::DuplicateBasketConsumption {
        basket: "streams.b".to_string(),
        owner: "streams.t1".to_string(),
    };
    assert_eq!(
        format!("{}", err),
        "duplicate use of continuous query input: basket streams.b is consumed by streams.t1"
    );
}

#[test]
fn test_basket_not_found_error() {
    let err = SchedulerError::BasketNotFound("streams.x".to_string());
    assert_eq!(format!("{}", err), "basket not found: streams.x");
}

#[test]
fn test_stop_timeout_error() {
    let err = SchedulerError::SchedulerStopTimeout(100);
    assert_eq!(format!("{}", err), "scheduler stop timed out after 100 polls");
}

#[test]
fn test_transition_execution_error() {
    let err = SchedulerError::TransitionExecution {
        name: "streams.t1".to_string(),
        message: "division by zero".to_string(),
    };
    assert_eq!(
        format!("{}", err),
        "transition streams.t1 failed: division by zero"
    );
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
}
