//! Platform thread-limit queries.

/// Threads allowed per logical CPU by [`HostCeiling`].
pub const THREADS_PER_CPU: usize = 4;

/// Floor applied by [`HostCeiling`] on small hosts.
pub const MIN_HOST_THREADS: usize = 4;

/// Reports how many threads the host platform lets this process keep alive.
///
/// The scheduler never starts more worker threads than this value.
pub trait ThreadCeiling: Send + Sync {
    /// Maximum number of concurrently live threads.
    fn max_live_threads(&self) -> usize;
}

/// A fixed ceiling, for embedded targets and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCeiling(pub usize);

impl ThreadCeiling for FixedCeiling {
    fn max_live_threads(&self) -> usize {
        self.0
    }
}

/// Ceiling derived from the host CPU count.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCeiling;

impl ThreadCeiling for HostCeiling {
    fn max_live_threads(&self) -> usize {
        (num_cpus::get() * THREADS_PER_CPU).max(MIN_HOST_THREADS)
    }
}
