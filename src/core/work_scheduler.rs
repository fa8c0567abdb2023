//! Bounded, priority-ordered worker thread pool.
//!
//! `WorkScheduler` owns a single priority queue shared by a lazily grown set of
//! OS threads. Threads are started on demand while the queue holds more items
//! than there are free threads, up to `min(max_threads, platform ceiling)`.
//!
//! # Design
//!
//! - One `parking_lot::Mutex` guards the queue, worker slots and counts; every
//!   wait loops on its predicate.
//! - Work runs with the lock released. A `Work` is never dropped while the lock
//!   is held, so a `Drop` impl may call back into the scheduler.
//! - Shutdown is one-way: `stop_threads` lets running items finish and leaves
//!   queued items for `get_unexecuted_works`.
//!
//! # Example
//!
//! ```rust,ignore
//! use navcore_scheduler::config::SchedulerConfig;
//! use navcore_scheduler::core::{work_fn, Priority, WorkScheduler};
//! use navcore_scheduler::runtime::HostCeiling;
//!
//! let scheduler = WorkScheduler::new(SchedulerConfig::new().with_max_threads(4), &HostCeiling)?;
//! scheduler.schedule(work_fn("decode-tile", Priority::HIGH, || Ok(())))?;
//! scheduler.stop_threads();
//! scheduler.wait_until_threads_are_dead()?;
//! ```

mod timer;
mod worker;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::error::SchedulerError;
use crate::core::work::{Completion, Work};
use crate::infra::queue::{PriorityQueue, Prioritized};
use crate::runtime::ThreadCeiling;

use timer::DelayTimer;
use worker::Executed;

/// Snapshot of scheduler utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Effective thread limit: `min(max_threads, platform ceiling)`.
    pub thread_cap: usize,
    /// Worker threads currently alive.
    pub live_threads: usize,
    /// Live threads not executing work.
    pub free_threads: usize,
    /// Items waiting in the queue.
    pub queued: usize,
    /// Items accepted by `schedule*`, counting each reschedule once more.
    pub submitted: u64,
    /// Items that finished with `Completed`.
    pub completed: u64,
    /// Items that failed or panicked.
    pub failed: u64,
    /// Executions that asked to run again.
    pub rescheduled: u64,
    /// Whether `stop_threads` has been called.
    pub stopped: bool,
}

/// Lifetime counters (lock-free atomics).
#[derive(Debug, Default)]
struct SchedulerCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rescheduled: AtomicU64,
}

/// A queued item plus the wait ticket of a `schedule_and_wait` caller, if any.
///
/// The priority is read once, before the item reaches the queue, and the heap
/// orders on that copy. Item code never runs under the scheduler lock.
pub(crate) struct QueuedWork {
    work: Box<dyn Work>,
    ticket: Option<u64>,
    priority: i32,
}

impl QueuedWork {
    /// Must be called without the scheduler lock held.
    fn new(work: Box<dyn Work>) -> Self {
        let priority = work.priority();
        Self {
            work,
            ticket: None,
            priority,
        }
    }
}

impl Prioritized for QueuedWork {
    fn priority(&self) -> i32 {
        self.priority
    }
}

/// State guarded by the scheduler lock.
struct State {
    queue: PriorityQueue<QueuedWork>,
    /// Wait tickets; `Some` once the item has finished.
    waits: HashMap<u64, Option<Completion>>,
    /// Worker slots by id. Ids are never reused.
    workers: HashMap<usize, JoinHandle<()>>,
    live_threads: usize,
    free_threads: usize,
    next_worker_id: usize,
    next_ticket: u64,
    stopped: bool,
}

/// State shared between the scheduler handle, its workers and its timer.
pub(crate) struct Shared {
    state: Mutex<State>,
    /// Signaled when work is queued or the scheduler stops.
    work_available: Condvar,
    /// Signaled when a waited-on item finishes or the scheduler stops.
    work_finished: Condvar,
    /// Signaled when the last worker thread exits.
    threads_exited: Condvar,
    counters: SchedulerCounters,
    config: SchedulerConfig,
    thread_cap: usize,
    /// Lazily created delay timer. Lock order: `timer` before `state`.
    timer: Mutex<Option<DelayTimer>>,
}

impl Shared {
    /// Queue `job`, growing the pool if needed. A rejected job is handed back
    /// so the caller can drop it after releasing the lock.
    fn enqueue_locked(
        self: &Arc<Self>,
        state: &mut State,
        job: QueuedWork,
    ) -> Result<(), (SchedulerError, Option<QueuedWork>)> {
        if state.stopped {
            return Err((SchedulerError::Stopped, Some(job)));
        }

        let priority = job.priority;
        let queued = state.queue.insert(job);
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        if queued > state.free_threads && state.live_threads < self.thread_cap {
            if let Err(e) = self.start_additional_thread(state) {
                if state.live_threads == 0 {
                    error!(error = %e, "Unable to start any worker thread");
                    // The item stays queued for a later attempt or the drain.
                    return Err((
                        SchedulerError::Configuration(format!(
                            "no worker thread could be started: {e}"
                        )),
                        None,
                    ));
                }
                warn!(
                    error = %e,
                    live_threads = state.live_threads,
                    "Could not start additional worker thread"
                );
            }
        }

        debug!(priority, queued, "Work queued");
        self.work_available.notify_one();
        Ok(())
    }

    /// Queue `job` from outside the lock.
    fn enqueue(self: &Arc<Self>, job: QueuedWork) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        let result = self.enqueue_locked(&mut state, job);
        drop(state);
        result.map_err(|(e, rejected)| {
            if let Some(job) = rejected {
                worker::release(job.work);
            }
            e
        })
    }

    fn start_additional_thread(self: &Arc<Self>, state: &mut State) -> io::Result<()> {
        let worker_id = state.next_worker_id;
        state.next_worker_id += 1;

        let mut builder =
            thread::Builder::new().name(format!("{}-{worker_id}", self.config.thread_name_prefix));
        if let Some(size) = self.config.thread_stack_size {
            builder = builder.stack_size(size);
        }

        let shared = Arc::clone(self);
        let handle = builder.spawn(move || worker::run_worker(worker_id, &shared))?;

        state.workers.insert(worker_id, handle);
        state.live_threads += 1;
        state.free_threads += 1;
        debug!(
            worker_id,
            live_threads = state.live_threads,
            thread_cap = self.thread_cap,
            "Started worker thread"
        );
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Settle a waited-on item and wake its waiter.
    fn finish_ticket(&self, state: &mut State, ticket: Option<u64>, completion: Completion) {
        let Some(ticket) = ticket else {
            return;
        };
        if let Some(slot) = state.waits.get_mut(&ticket) {
            *slot = Some(completion);
            self.work_finished.notify_all();
        }
    }
}

/// Bounded thread pool executing [`Work`] in priority order.
///
/// Single-use: once stopped it never accepts work again.
pub struct WorkScheduler {
    shared: Arc<Shared>,
}

impl WorkScheduler {
    /// Create a scheduler. No thread is started until work arrives.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Configuration` if the configuration is invalid
    /// or the effective thread cap is zero.
    pub fn new(config: SchedulerConfig, ceiling: &dyn ThreadCeiling) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::Configuration)?;

        let platform_limit = ceiling.max_live_threads();
        let thread_cap = config.max_threads.min(platform_limit);
        if thread_cap == 0 {
            return Err(SchedulerError::Configuration(
                "platform allows no worker threads".into(),
            ));
        }

        info!(
            max_threads = config.max_threads,
            platform_limit,
            thread_cap,
            "WorkScheduler initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: PriorityQueue::new(),
                    waits: HashMap::new(),
                    workers: HashMap::new(),
                    live_threads: 0,
                    free_threads: 0,
                    next_worker_id: 0,
                    next_ticket: 0,
                    stopped: false,
                }),
                work_available: Condvar::new(),
                work_finished: Condvar::new(),
                threads_exited: Condvar::new(),
                counters: SchedulerCounters::default(),
                config,
                thread_cap,
                timer: Mutex::new(None),
            }),
        })
    }

    /// Queue work without blocking.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Stopped` after `stop_threads`
    /// - `SchedulerError::Configuration` if no worker thread exists and none
    ///   could be started; the item stays queued
    pub fn schedule(&self, work: Box<dyn Work>) -> Result<(), SchedulerError> {
        self.shared.enqueue(QueuedWork::new(work))
    }

    /// Queue work and block until it has finished, across any reschedules.
    ///
    /// Must not be called from a worker thread of the same scheduler when that
    /// could leave no free thread to run the item.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Stopped` if the scheduler is stopped before the
    /// call or before the item finishes; the waiter is always released.
    pub fn schedule_and_wait(&self, work: Box<dyn Work>) -> Result<Completion, SchedulerError> {
        let mut job = QueuedWork::new(work);

        let mut state = self.shared.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waits.insert(ticket, None);

        job.ticket = Some(ticket);
        if let Err((e, rejected)) = self.shared.enqueue_locked(&mut state, job) {
            state.waits.remove(&ticket);
            drop(state);
            if let Some(job) = rejected {
                worker::release(job.work);
            }
            return Err(e);
        }

        loop {
            match state.waits.get(&ticket) {
                // Tickets are only cleared by stop_threads.
                None => return Err(SchedulerError::Stopped),
                Some(Some(_)) => {
                    return state
                        .waits
                        .remove(&ticket)
                        .flatten()
                        .ok_or(SchedulerError::Stopped);
                }
                Some(None) => self.shared.work_finished.wait(&mut state),
            }
        }
    }

    /// Queue work once `delay` has elapsed; a zero delay queues immediately.
    ///
    /// Delayed items are held by a single timer thread created on first use.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Stopped` after `stop_threads`
    /// - `SchedulerError::InvalidDelay` if the deadline is not representable
    /// - `SchedulerError::Configuration` if the timer thread cannot be started
    pub fn schedule_delayed(&self, work: Box<dyn Work>, delay: Duration) -> Result<(), SchedulerError> {
        if delay.is_zero() {
            return self.schedule(work);
        }
        let deadline = Instant::now()
            .checked_add(delay)
            .ok_or(SchedulerError::InvalidDelay(delay))?;
        let job = QueuedWork::new(work);

        let mut timer = self.shared.timer.lock();
        if self.shared.is_stopped() {
            drop(timer);
            worker::release(job.work);
            return Err(SchedulerError::Stopped);
        }

        if timer.is_none() {
            match DelayTimer::spawn(
                Arc::downgrade(&self.shared),
                format!("{}-timer", self.shared.config.thread_name_prefix),
            ) {
                Ok(created) => *timer = Some(created),
                Err(e) => {
                    drop(timer);
                    worker::release(job.work);
                    return Err(SchedulerError::Configuration(format!("timer thread: {e}")));
                }
            }
        }

        let added = match timer.as_ref() {
            Some(active) => active.add(deadline, job),
            None => Err(job),
        };
        drop(timer);
        match added {
            Ok(()) => {
                debug!(delay_ms = delay.as_millis(), "Delayed work registered");
                Ok(())
            }
            Err(rejected) => {
                worker::release(rejected.work);
                Err(SchedulerError::Stopped)
            }
        }
    }

    /// Stop the scheduler. Idempotent.
    ///
    /// Running items finish; queued items stay queued for
    /// [`get_unexecuted_works`](Self::get_unexecuted_works); pending delayed
    /// items are dropped; blocked `schedule_and_wait` callers are released.
    pub fn stop_threads(&self) {
        let waits = {
            let mut state = self.shared.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            std::mem::take(&mut state.waits)
        };
        self.shared.work_available.notify_all();
        self.shared.work_finished.notify_all();

        let timer = self.shared.timer.lock().take();
        if let Some(timer) = timer {
            timer.cancel();
        }

        info!(released_waiters = waits.len(), "Work scheduler stopped");
    }

    /// Block until every worker thread has exited, then join them.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotStopped` unless `stop_threads` was called.
    pub fn wait_until_threads_are_dead(&self) -> Result<(), SchedulerError> {
        let handles: Vec<(usize, JoinHandle<()>)> = {
            let mut state = self.shared.state.lock();
            if !state.stopped {
                return Err(SchedulerError::NotStopped);
            }
            while state.live_threads > 0 {
                self.shared.threads_exited.wait(&mut state);
            }
            state.workers.drain().collect()
        };

        for (worker_id, handle) in handles {
            if handle.join().is_err() {
                warn!(worker_id, "Worker thread panicked");
            }
        }
        debug!("All worker threads joined");
        Ok(())
    }

    /// Remove and return every queued item, highest priority first.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotStopped` unless `stop_threads` was called.
    pub fn get_unexecuted_works(&self) -> Result<Vec<Box<dyn Work>>, SchedulerError> {
        let drained = {
            let mut state = self.shared.state.lock();
            if !state.stopped {
                return Err(SchedulerError::NotStopped);
            }
            state.queue.drain_ordered()
        };
        Ok(drained.into_iter().map(|job| job.work).collect())
    }

    /// Drain the queue and run each item once on the calling thread.
    ///
    /// Failures are logged and do not stop the remaining items. Returns the
    /// number of items that ran without failing.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotStopped` unless `stop_threads` was called.
    pub fn run_remaining_works(&self) -> Result<usize, SchedulerError> {
        let works = self.get_unexecuted_works()?;
        let total = works.len();
        let mut succeeded = 0;
        for work in works {
            match worker::run_item(None, work) {
                Executed::Again(work, _) => {
                    debug!("Reschedule ignored after shutdown");
                    worker::release(work);
                    succeeded += 1;
                }
                Executed::Finished(Completion::Completed) => succeeded += 1,
                Executed::Finished(Completion::Failed(_)) => {}
            }
        }
        info!(total, succeeded, "Ran remaining work after shutdown");
        Ok(succeeded)
    }

    /// Whether `stop_threads` has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Effective thread limit.
    #[must_use]
    pub fn thread_cap(&self) -> usize {
        self.shared.thread_cap
    }

    /// Get current scheduler statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        let counters = &self.shared.counters;
        SchedulerStats {
            thread_cap: self.shared.thread_cap,
            live_threads: state.live_threads,
            free_threads: state.free_threads,
            queued: state.queue.len(),
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            rescheduled: counters.rescheduled.load(Ordering::Relaxed),
            stopped: state.stopped,
        }
    }
}

impl fmt::Debug for WorkScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkScheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for WorkScheduler {
    fn drop(&mut self) {
        // Stop but don't join; threads exit once their current item is done.
        if !self.is_stopped() {
            debug!("WorkScheduler dropped without explicit stop - stopping now");
            self.stop_threads();
        }
    }
}
