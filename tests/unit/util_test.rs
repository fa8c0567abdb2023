//! Tests for utility functions

use navcore_scheduler::core::{work_fn, Priority, Work, WorkOutcome};
use navcore_scheduler::infra::queue::PriorityQueue;
use navcore_scheduler::util::{init_tracing, panic_message};

#[test]
fn test_priority_ordering() {
    assert!(Priority::CRITICAL > Priority::HIGH);
    assert!(Priority::HIGH > Priority::NORMAL);
    assert!(Priority::NORMAL > Priority::LOW);
    assert!(Priority::LOW > Priority::MINIMAL);
}

#[test]
fn test_boxed_work_orders_in_queue() {
    let mut queue: PriorityQueue<Box<dyn Work>> = PriorityQueue::new();
    queue.insert(work_fn("low", Priority::LOW, || Ok(())));
    queue.insert(work_fn("critical", Priority::CRITICAL, || Ok(())));
    queue.insert(work_fn("normal", Priority::NORMAL, || Ok(())));

    let names: Vec<String> = queue
        .drain_ordered()
        .iter()
        .map(|w| w.name().to_owned())
        .collect();
    assert_eq!(names, ["critical", "normal", "low"]);
}

#[test]
fn test_fn_work_outcomes() {
    let mut ok = work_fn("ok", 0, || Ok(()));
    assert!(matches!(ok.run(), WorkOutcome::Completed));

    let mut failing = work_fn("failing", 0, || Err(anyhow::anyhow!("no route")));
    assert!(matches!(failing.run(), WorkOutcome::Failed(e) if e.to_string() == "no route"));
}

#[test]
fn test_panic_message_from_caught_panic() {
    let caught = std::panic::catch_unwind(|| panic!("tile index {}", 42)).unwrap_err();
    assert_eq!(panic_message(caught.as_ref()), "tile index 42");
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
