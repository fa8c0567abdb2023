//! Assemble a scheduler and its network dispatcher from configuration.

use std::sync::Arc;

use tracing::info;

use crate::config::CoreConfig;
use crate::core::{NetworkDispatcher, SchedulerError, Transport, WorkScheduler};
use crate::runtime::ThreadCeiling;

/// A scheduler plus the dispatcher that forwards requests to it.
#[derive(Debug, Clone)]
pub struct CoreServices {
    /// Shared worker pool.
    pub scheduler: Arc<WorkScheduler>,
    /// Admission control for network requests on `scheduler`.
    pub dispatcher: NetworkDispatcher,
}

impl CoreServices {
    /// Close the dispatcher, stop the scheduler and join its threads.
    ///
    /// Held requests are cancelled; queued work stays available through
    /// [`WorkScheduler::get_unexecuted_works`]. Request slots left in the queue
    /// do not keep the dispatcher or its transport alive.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`WorkScheduler::wait_until_threads_are_dead`].
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        self.dispatcher.shutdown();
        self.scheduler.stop_threads();
        self.scheduler.wait_until_threads_are_dead()
    }
}

/// Build core services from validated configuration.
///
/// # Errors
///
/// Returns `SchedulerError::Configuration` if the configuration is invalid or
/// the platform allows no worker threads.
pub fn build_core(
    cfg: &CoreConfig,
    ceiling: &dyn ThreadCeiling,
    transport: Arc<dyn Transport>,
) -> Result<CoreServices, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::Configuration(format!("config invalid: {e}")))?;

    let scheduler = Arc::new(WorkScheduler::new(cfg.scheduler.clone(), ceiling)?);
    let dispatcher = NetworkDispatcher::new(Arc::clone(&scheduler), transport, cfg.dispatcher.clone())?;
    info!(
        thread_cap = scheduler.thread_cap(),
        max_concurrent = cfg.dispatcher.max_concurrent,
        "Core services built"
    );
    Ok(CoreServices {
        scheduler,
        dispatcher,
    })
}
