//! Per-thread execution loop.
//!
//! A worker sleeps while the queue is empty, takes the highest-priority item,
//! runs it with the scheduler lock released, then either re-queues it or
//! settles it. It exits at the next fetch after `stop_threads`.
//!
//! Item code (`run`, `priority`, `name`, `Drop`) only ever executes with the
//! lock released and inside `catch_unwind`, so a misbehaving item cannot take
//! its worker thread down.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;

use parking_lot::MutexGuard;
use tracing::{debug, error, warn};

use crate::core::work::{Completion, Work, WorkOutcome};
use crate::util::panic_message;

use super::{QueuedWork, Shared};

/// Result of one execution once the item has been released or kept.
pub(super) enum Executed {
    /// The item asked to run again; carries its priority read after the run.
    Again(Box<dyn Work>, i32),
    /// The item is finished and has been dropped.
    Finished(Completion),
}

/// Worker thread body.
pub(super) fn run_worker(worker_id: usize, shared: &Shared) {
    debug!(worker_id, "Worker thread started");

    let mut state = shared.state.lock();
    loop {
        while state.queue.is_empty() && !state.stopped {
            shared.work_available.wait(&mut state);
        }
        if state.stopped {
            break;
        }
        let Some(job) = state.queue.extract_highest() else {
            continue;
        };
        state.free_threads -= 1;

        let QueuedWork { work, ticket, .. } = job;
        let executed = MutexGuard::unlocked(&mut state, || run_item(Some(worker_id), work));

        state.free_threads += 1;
        match executed {
            // Re-queued even after stop so the drain still returns it.
            Executed::Again(work, priority) => {
                shared.counters.rescheduled.fetch_add(1, Ordering::Relaxed);
                shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                state.queue.insert(QueuedWork {
                    work,
                    ticket,
                    priority,
                });
            }
            Executed::Finished(completion) => {
                let counter = if completion.is_completed() {
                    &shared.counters.completed
                } else {
                    &shared.counters.failed
                };
                counter.fetch_add(1, Ordering::Relaxed);
                shared.finish_ticket(&mut state, ticket, completion);
            }
        }
    }

    state.free_threads -= 1;
    state.live_threads -= 1;
    let remaining = state.live_threads;
    if remaining == 0 {
        shared.threads_exited.notify_all();
    }
    drop(state);
    debug!(worker_id, remaining, "Worker thread exiting");
}

/// Run one execution and release the item unless it asked to run again.
///
/// A panic anywhere in the item's code, including its destructor, is
/// reported as a failure.
pub(super) fn run_item(worker_id: Option<usize>, work: Box<dyn Work>) -> Executed {
    panic::catch_unwind(AssertUnwindSafe(move || run_and_release(worker_id, work)))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref()).to_owned();
            error!(worker_id, panic = %message, "Work item panicked outside run");
            Executed::Finished(Completion::Failed(anyhow::anyhow!(
                "work panicked: {message}"
            )))
        })
}

fn run_and_release(worker_id: Option<usize>, mut work: Box<dyn Work>) -> Executed {
    match execute(worker_id, work.as_mut()) {
        WorkOutcome::Reschedule => {
            let priority = work.priority();
            Executed::Again(work, priority)
        }
        WorkOutcome::Completed => {
            drop(work);
            Executed::Finished(Completion::Completed)
        }
        WorkOutcome::Failed(e) => {
            drop(work);
            Executed::Finished(Completion::Failed(e))
        }
    }
}

/// Drop an item that will not run again.
pub(super) fn release(work: Box<dyn Work>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || drop(work))) {
        error!(panic = %panic_message(payload.as_ref()), "Work item panicked while dropped");
    }
}

/// Run one execution, converting a panic in `run` into `Failed`.
fn execute(worker_id: Option<usize>, work: &mut dyn Work) -> WorkOutcome {
    let priority = work.priority();
    match panic::catch_unwind(AssertUnwindSafe(|| work.run())) {
        Ok(WorkOutcome::Failed(e)) => {
            warn!(
                worker_id,
                work = work.name(),
                priority,
                error = %format_args!("{e:#}"),
                "Work item failed"
            );
            WorkOutcome::Failed(e)
        }
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref()).to_owned();
            error!(
                worker_id,
                work = work.name(),
                priority,
                panic = %message,
                "Work item panicked"
            );
            WorkOutcome::Failed(anyhow::anyhow!("work panicked: {message}"))
        }
    }
}
