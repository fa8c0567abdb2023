//! Schedulable work items and their outcomes.

use std::fmt;

use crate::infra::queue::Prioritized;

/// Named priority bands. Any `i32` is a valid priority; larger runs first.
pub struct Priority;

impl Priority {
    /// Work that must run before anything else.
    pub const CRITICAL: i32 = i32::MAX;
    /// User-visible work such as the tile under the viewport.
    pub const HIGH: i32 = 1_000;
    /// Default band.
    pub const NORMAL: i32 = 0;
    /// Prefetch and other speculative work.
    pub const LOW: i32 = -1_000;
    /// Work that only runs when nothing else is waiting.
    pub const MINIMAL: i32 = i32::MIN;
}

/// Result of a single execution of a [`Work`] item.
#[derive(Debug)]
pub enum WorkOutcome {
    /// The item is finished and will not run again.
    Completed,
    /// The item wants to run again; it is re-enqueued at its current priority.
    Reschedule,
    /// The item failed; it is finished and will not run again.
    Failed(anyhow::Error),
}

/// Terminal state reported to `schedule_and_wait` callers.
#[derive(Debug)]
pub enum Completion {
    /// The last execution returned [`WorkOutcome::Completed`].
    Completed,
    /// The last execution failed or panicked.
    Failed(anyhow::Error),
}

impl Completion {
    /// Whether the work finished without failure.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// A unit of schedulable execution.
///
/// `run` is called on a worker thread with no scheduler lock held. Panics are
/// caught at the worker boundary and treated as [`WorkOutcome::Failed`].
pub trait Work: Send {
    /// Execute once and report whether to run again.
    fn run(&mut self) -> WorkOutcome;

    /// Scheduling priority; read once each time the item is enqueued and
    /// cached while it waits.
    fn priority(&self) -> i32;

    /// Short label for logs.
    fn name(&self) -> &str {
        "work"
    }
}

/// Work built from a closure returning `anyhow::Result<()>`.
pub struct FnWork<F> {
    name: String,
    priority: i32,
    action: F,
}

impl<F> FnWork<F>
where
    F: FnMut() -> anyhow::Result<()> + Send,
{
    /// Wrap a closure that runs exactly once.
    pub fn new(name: impl Into<String>, priority: i32, action: F) -> Self {
        Self {
            name: name.into(),
            priority,
            action,
        }
    }
}

impl<F> Work for FnWork<F>
where
    F: FnMut() -> anyhow::Result<()> + Send,
{
    fn run(&mut self) -> WorkOutcome {
        match (self.action)() {
            Ok(()) => WorkOutcome::Completed,
            Err(e) => WorkOutcome::Failed(e),
        }
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnWork<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWork")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Box a closure as work.
pub fn work_fn<F>(name: impl Into<String>, priority: i32, action: F) -> Box<dyn Work>
where
    F: FnMut() -> anyhow::Result<()> + Send + 'static,
{
    Box::new(FnWork::new(name, priority, action))
}

impl Prioritized for Box<dyn Work> {
    fn priority(&self) -> i32 {
        (**self).priority()
    }
}
