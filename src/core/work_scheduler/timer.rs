//! Shared delay timer.
//!
//! One thread per scheduler, created on the first delayed submission. Delayed
//! items arrive over a channel and are held in deadline order; due items are
//! handed to the scheduler queue. Dropping the sender cancels the timer and
//! drops whatever is still pending.

use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::infra::queue::PriorityQueue;

use super::{worker, QueuedWork, Shared};

struct Delayed {
    deadline: Instant,
    job: QueuedWork,
}

/// Handle to the timer thread.
pub(super) struct DelayTimer {
    tx: Sender<Delayed>,
    handle: JoinHandle<()>,
}

impl DelayTimer {
    /// Start the timer thread. It holds only a weak reference to the scheduler.
    pub(super) fn spawn(shared: Weak<Shared>, name: String) -> io::Result<Self> {
        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run_timer(&shared, &rx))?;
        Ok(Self { tx, handle })
    }

    /// Register work for `deadline`. Hands the work back if the timer is gone.
    pub(super) fn add(&self, deadline: Instant, job: QueuedWork) -> Result<(), QueuedWork> {
        self.tx
            .send(Delayed { deadline, job })
            .map_err(|rejected| rejected.into_inner().job)
    }

    /// Stop the timer thread, dropping pending work, and wait for it to exit.
    pub(super) fn cancel(self) {
        let Self { tx, handle } = self;
        drop(tx);
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("Delay timer thread panicked");
        }
    }
}

fn run_timer(shared: &Weak<Shared>, rx: &Receiver<Delayed>) {
    let mut pending =
        PriorityQueue::with_comparator(|a: &Delayed, b: &Delayed| b.deadline.cmp(&a.deadline));
    debug!("Delay timer started");

    loop {
        let now = Instant::now();
        while pending
            .peek_highest()
            .is_some_and(|next: &Delayed| next.deadline <= now)
        {
            let Some(due) = pending.extract_highest() else {
                break;
            };
            let Some(shared) = shared.upgrade() else {
                debug!("Scheduler gone, delay timer exiting");
                worker::release(due.job.work);
                return;
            };
            if let Err(e) = shared.enqueue(due.job) {
                debug!(error = %e, "Dropped delayed work");
            }
        }

        let received = match pending.peek_highest() {
            Some(next) => rx.recv_deadline(next.deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(delayed) => {
                pending.insert(delayed);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(dropped = pending.len(), "Delay timer cancelled");
    for delayed in pending.drain_ordered() {
        worker::release(delayed.job.work);
    }
}
