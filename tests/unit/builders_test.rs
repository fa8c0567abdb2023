//! Tests for builder modules

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use navcore_scheduler::builders::build_core;
use navcore_scheduler::config::{CoreConfig, DispatcherConfig, SchedulerConfig};
use navcore_scheduler::core::{
    sink_fn, work_fn, NetworkRequest, Priority, RequestErrorKind, SchedulerError,
};
use navcore_scheduler::infra::transport::{ScriptedReply, ScriptedTransport};
use navcore_scheduler::runtime::FixedCeiling;

#[test]
fn test_build_core_applies_limits() {
    let cfg = CoreConfig {
        scheduler: SchedulerConfig::new().with_max_threads(8),
        dispatcher: DispatcherConfig::default().with_max_concurrent(3),
    };
    let services = build_core(&cfg, &FixedCeiling(5), Arc::new(ScriptedTransport::new())).unwrap();

    assert_eq!(services.scheduler.thread_cap(), 5);
    assert_eq!(services.dispatcher.stats().max_concurrent, 3);
    assert!(Arc::ptr_eq(services.dispatcher.scheduler(), &services.scheduler));
    services.shutdown().unwrap();
    assert!(services.scheduler.is_stopped());
}

#[test]
fn test_build_core_rejects_invalid_config() {
    let cfg = CoreConfig {
        scheduler: SchedulerConfig::new().with_max_threads(0),
        dispatcher: DispatcherConfig::default(),
    };
    let result = build_core(&cfg, &FixedCeiling(4), Arc::new(ScriptedTransport::new()));
    assert!(matches!(result, Err(SchedulerError::Configuration(_))));
}

#[test]
fn test_built_services_serve_requests() {
    let transport = ScriptedTransport::new().with_route("/search", ScriptedReply::ok("results"));
    let services =
        build_core(&CoreConfig::default(), &FixedCeiling(4), Arc::new(transport)).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    services.dispatcher.submit(
        NetworkRequest::get("maps.example.net", "/search"),
        sink_fn(move |result| {
            tx.send(result).ok();
        }),
    );
    let body = rx
        .recv_timeout(std::time::Duration::from_secs(10))
        .unwrap()
        .unwrap();
    assert_eq!(body, b"results");
    services.shutdown().unwrap();
}

#[test]
fn test_shutdown_with_queued_request_releases_transport() {
    let cfg = CoreConfig {
        scheduler: SchedulerConfig::new().with_max_threads(1),
        dispatcher: DispatcherConfig::default(),
    };
    let transport = Arc::new(ScriptedTransport::new());
    let services = build_core(&cfg, &FixedCeiling(4), transport.clone()).unwrap();

    let (release_tx, release_rx) = bounded::<()>(1);
    let (started_tx, started_rx) = bounded::<()>(1);
    services
        .scheduler
        .schedule(work_fn("blocker", Priority::CRITICAL, move || {
            started_tx.send(()).ok();
            release_rx.recv_timeout(Duration::from_secs(10)).ok();
            Ok(())
        }))
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    services.dispatcher.submit(
        NetworkRequest::get("maps.example.net", "/tile"),
        sink_fn(move |result| {
            tx.send(result).ok();
        }),
    );
    services.dispatcher.shutdown();
    services.scheduler.stop_threads();
    release_tx.send(()).unwrap();
    services.shutdown().unwrap();

    let result = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(result.unwrap_err().kind, RequestErrorKind::Cancelled);
    assert_eq!(services.scheduler.stats().queued, 1);

    drop(services);
    assert_eq!(Arc::strong_count(&transport), 1);
    assert_eq!(transport.calls(), 0);
}
