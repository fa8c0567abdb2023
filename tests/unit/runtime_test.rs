//! Tests for platform thread ceilings

use navcore_scheduler::runtime::platform::{MIN_HOST_THREADS, THREADS_PER_CPU};
use navcore_scheduler::runtime::{FixedCeiling, HostCeiling, ThreadCeiling};

#[test]
fn test_fixed_ceiling_reports_value() {
    assert_eq!(FixedCeiling(0).max_live_threads(), 0);
    assert_eq!(FixedCeiling(12).max_live_threads(), 12);
}

#[test]
fn test_host_ceiling_scales_with_cpus() {
    let expected = (num_cpus::get() * THREADS_PER_CPU).max(MIN_HOST_THREADS);
    assert_eq!(HostCeiling.max_live_threads(), expected);
}

#[test]
fn test_ceilings_usable_as_trait_objects() {
    let ceilings: Vec<Box<dyn ThreadCeiling>> = vec![Box::new(FixedCeiling(2)), Box::new(HostCeiling)];
    assert!(ceilings.iter().all(|c| c.max_live_threads() >= 2));
}
