//! Tests for error types

use std::time::Duration;

use navcore_scheduler::core::{RequestError, RequestErrorKind, SchedulerError};

#[test]
fn test_stopped_error() {
    let err = SchedulerError::Stopped;
    assert_eq!(format!("{}", err), "scheduler has been stopped");
}

#[test]
fn test_not_stopped_error() {
    let err = SchedulerError::NotStopped;
    assert_eq!(format!("{}", err), "scheduler must be stopped first");
}

#[test]
fn test_configuration_error() {
    let err = SchedulerError::Configuration("max_threads must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "configuration error: max_threads must be greater than 0"
    );
}

#[test]
fn test_invalid_delay_error() {
    let err = SchedulerError::InvalidDelay(Duration::from_secs(2));
    assert_eq!(format!("{}", err), "invalid delay: 2s");
}

#[test]
fn test_request_error_display() {
    let err = RequestError::new(RequestErrorKind::Cancelled, "dispatcher has been shut down");
    assert_eq!(err.to_string(), "cancelled: dispatcher has been shut down");
    assert_eq!(err.status, None);
}

#[test]
fn test_request_error_kinds_display() {
    assert_eq!(RequestErrorKind::SchedulerStopped.to_string(), "scheduler stopped");
    assert_eq!(RequestErrorKind::UnexpectedFailure.to_string(), "unexpected failure");
}
