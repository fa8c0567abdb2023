//! Tests for configuration validation

use navcore_scheduler::config::{CoreConfig, DispatcherConfig, SchedulerConfig};

#[test]
fn test_scheduler_config_validation() {
    assert!(SchedulerConfig::new().validate().is_ok());
    assert!(SchedulerConfig::new().with_max_threads(0).validate().is_err());
    assert!(SchedulerConfig::new()
        .with_thread_name_prefix("  ")
        .validate()
        .is_err());
}

#[test]
fn test_dispatcher_config_validation() {
    assert_eq!(DispatcherConfig::default().max_concurrent, 2);
    assert!(DispatcherConfig::default()
        .with_max_concurrent(0)
        .validate()
        .is_err());
}

#[test]
fn test_core_config_from_json() {
    let json = r#"{
        "scheduler": { "max_threads": 6, "thread_name_prefix": "nav" },
        "dispatcher": { "max_concurrent": 3 }
    }"#;
    let cfg = CoreConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.scheduler.max_threads, 6);
    assert_eq!(cfg.scheduler.thread_name_prefix, "nav");
    assert_eq!(cfg.scheduler.thread_stack_size, None);
    assert_eq!(cfg.dispatcher.max_concurrent, 3);
}

#[test]
fn test_core_config_json_defaults_missing_sections() {
    let cfg = CoreConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, CoreConfig::default());
}

#[test]
fn test_core_config_json_rejects_invalid_values() {
    let err = CoreConfig::from_json_str(r#"{ "dispatcher": { "max_concurrent": 0 } }"#).unwrap_err();
    assert!(err.contains("dispatcher invalid"));

    let err = CoreConfig::from_json_str("not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_core_config_round_trips_through_json() {
    let cfg = CoreConfig {
        scheduler: SchedulerConfig::new().with_thread_stack_size(512 * 1024),
        dispatcher: DispatcherConfig::default(),
    };
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(CoreConfig::from_json_str(&json).unwrap(), cfg);
}
