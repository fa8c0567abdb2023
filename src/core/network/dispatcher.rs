//! Admission-controlled request dispatch on top of the work scheduler.
//!
//! The map server accepts only a few connections per client, far fewer than
//! the worker pool has threads. The dispatcher keeps its own priority queue of
//! held requests and forwards at most `max_concurrent` *slots* to the
//! scheduler. A slot, when it runs, takes the highest-priority held request at
//! that moment, performs it, and on completion either forwards a fresh slot or
//! gives its admission back.
//!
//! Invariants:
//! - `active` (pending plus running slots) never exceeds `max_concurrent`.
//! - Pending slots never outnumber held requests.
//! - Every accepted request gets exactly one sink call.
//! - The dispatcher lock is never held while calling into the scheduler or a sink.
//!
//! Slots reference the dispatcher weakly. Queued slots therefore never keep
//! the dispatcher (and through it the scheduler and transport) alive; once the
//! last handle is gone, held requests are cancelled and leftover slots do nothing.

use std::fmt;
use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::core::error::{RequestError, RequestErrorKind, SchedulerError};
use crate::core::work::{Work, WorkOutcome};
use crate::core::work_scheduler::WorkScheduler;
use crate::infra::queue::{PriorityQueue, Prioritized};
use crate::util::panic_message;

use super::{NetworkRequest, ResponseSink, Transport};

/// Bytes of an error response kept as failure detail.
const ERROR_DETAIL_LIMIT: u64 = 512;

/// Snapshot of dispatcher admission state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Slots forwarded to the scheduler or executing.
    pub active: usize,
    /// Requests waiting for a slot.
    pub held: usize,
    /// Admission limit.
    pub max_concurrent: usize,
    /// Whether `shutdown` has been called.
    pub closed: bool,
}

/// A request that has been accepted but not yet executed.
struct PendingRequest {
    id: Uuid,
    request: NetworkRequest,
    sink: Box<dyn ResponseSink>,
}

impl Prioritized for PendingRequest {
    fn priority(&self) -> i32 {
        self.request.priority
    }
}

impl PendingRequest {
    fn fail(self, error: RequestError) {
        debug!(request_id = %self.id, kind = %error.kind, "Request dropped without running");
        self.sink.on_error(error);
    }
}

struct DispatchState {
    held: PriorityQueue<PendingRequest>,
    active: usize,
    pending_slots: usize,
    closed: bool,
}

struct Inner {
    scheduler: Arc<WorkScheduler>,
    transport: Arc<dyn Transport>,
    max_concurrent: usize,
    state: Mutex<DispatchState>,
}

impl Inner {
    /// Hand a slot to the scheduler. A rejected slot releases itself on drop.
    fn forward_slot(self: &Arc<Self>, priority: i32) {
        let slot = SlotWork {
            inner: Arc::downgrade(self),
            priority,
            claimed: false,
        };
        if let Err(e) = self.scheduler.schedule(Box::new(slot)) {
            debug!(error = %e, "Scheduler rejected request slot");
        }
    }

    /// Called once per executed slot, on every exit path.
    fn on_request_finished(self: &Arc<Self>) {
        let scheduler_stopped = self.scheduler.is_stopped();
        let next_priority = {
            let mut state = self.state.lock();
            if !state.closed && !scheduler_stopped && state.held.len() > state.pending_slots {
                state.pending_slots += 1;
                state.held.peek_highest().map(Prioritized::priority)
            } else {
                state.active -= 1;
                None
            }
        };

        match next_priority {
            Some(priority) => self.forward_slot(priority),
            None => self.fail_orphans_if_stopped(),
        }
    }

    /// A slot was dropped before it ran.
    fn release_unclaimed_slot(&self) {
        {
            let mut state = self.state.lock();
            state.pending_slots -= 1;
            state.active -= 1;
        }
        self.fail_orphans_if_stopped();
    }

    /// Once the scheduler is stopped and no slot is left, held requests can
    /// never run.
    fn fail_orphans_if_stopped(&self) {
        if !self.scheduler.is_stopped() {
            return;
        }
        let orphans = {
            let mut state = self.state.lock();
            if state.active > 0 {
                return;
            }
            state.held.drain_ordered()
        };
        if !orphans.is_empty() {
            warn!(count = orphans.len(), "Failing held requests after scheduler stop");
        }
        for pending in orphans {
            pending.fail(RequestError::new(
                RequestErrorKind::SchedulerStopped,
                "scheduler stopped before the request was admitted",
            ));
        }
    }

    /// Run the transport call and deliver exactly one outcome.
    fn perform(&self, pending: PendingRequest) {
        let PendingRequest { id, request, sink } = pending;
        let started = Instant::now();
        debug!(
            request_id = %id,
            method = request.method.as_str(),
            target = %request.target,
            priority = request.priority,
            "Executing request"
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.transport.execute(&request)))
            .unwrap_or_else(|payload| {
                let cause = anyhow::anyhow!("transport panicked: {}", panic_message(payload.as_ref()));
                Err(RequestError::unexpected(&cause))
            });

        match outcome {
            Ok(mut response) if response.is_success() => {
                let length = response.length;
                sink.on_data(response.body.as_mut(), length);
                let unread = drain(response.body.as_mut(), id);
                debug!(
                    request_id = %id,
                    status = response.status,
                    unread,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Request completed"
                );
            }
            Ok(mut response) => {
                let detail = read_error_detail(response.body.as_mut());
                drain(response.body.as_mut(), id);
                warn!(
                    request_id = %id,
                    status = response.status,
                    target = %request.target,
                    "Request returned error status"
                );
                sink.on_error(RequestError::protocol(response.status, detail));
            }
            Err(error) => {
                warn!(
                    request_id = %id,
                    kind = %error.kind,
                    detail = %error.detail,
                    target = %request.target,
                    "Request failed"
                );
                sink.on_error(error);
            }
        }
    }
}

/// Read up to the detail limit from an error body.
fn read_error_detail(body: &mut dyn Read) -> String {
    let mut buf = Vec::new();
    if let Err(e) = body.take(ERROR_DETAIL_LIMIT).read_to_end(&mut buf) {
        debug!(error = %e, "Could not read error body");
    }
    String::from_utf8_lossy(&buf).trim().to_owned()
}

/// Consume whatever the sink left unread; returns the discarded byte count.
fn drain(body: &mut dyn Read, id: Uuid) -> u64 {
    io::copy(body, &mut io::sink()).unwrap_or_else(|e| {
        debug!(request_id = %id, error = %e, "Error while draining response body");
        0
    })
}

impl Drop for Inner {
    fn drop(&mut self) {
        let held = self.state.get_mut().held.drain_ordered();
        if !held.is_empty() {
            info!(cancelled = held.len(), "Network dispatcher dropped with held requests");
        }
        for pending in held {
            pending.fail(RequestError::new(
                RequestErrorKind::Cancelled,
                "dispatcher dropped",
            ));
        }
    }
}

/// Scheduler work representing one admission slot.
struct SlotWork {
    inner: Weak<Inner>,
    priority: i32,
    claimed: bool,
}

/// Gives a claimed slot back when dropped, including during unwinding.
struct ActiveSlot<'a>(&'a Arc<Inner>);

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        self.0.on_request_finished();
    }
}

impl Work for SlotWork {
    fn run(&mut self) -> WorkOutcome {
        let Some(inner) = self.inner.upgrade() else {
            self.claimed = true;
            debug!("Request slot outlived its dispatcher");
            return WorkOutcome::Completed;
        };
        let next = {
            let mut state = inner.state.lock();
            state.pending_slots -= 1;
            self.claimed = true;
            state.held.extract_highest()
        };
        let _slot = ActiveSlot(&inner);

        match next {
            Some(pending) => inner.perform(pending),
            None => debug!("Request slot found nothing to run"),
        }
        WorkOutcome::Completed
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &str {
        "network-request"
    }
}

impl Drop for SlotWork {
    fn drop(&mut self) {
        if self.claimed {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.release_unclaimed_slot();
        }
    }
}

/// Caps simultaneously executing network requests while preserving priority
/// order among requests that have not started.
///
/// Cloning yields another handle to the same dispatcher.
#[derive(Clone)]
pub struct NetworkDispatcher {
    inner: Arc<Inner>,
}

impl NetworkDispatcher {
    /// Create a dispatcher that executes requests on `scheduler` via `transport`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Configuration` if the configuration is invalid.
    pub fn new(
        scheduler: Arc<WorkScheduler>,
        transport: Arc<dyn Transport>,
        config: DispatcherConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::Configuration)?;
        info!(max_concurrent = config.max_concurrent, "NetworkDispatcher initialized");
        Ok(Self {
            inner: Arc::new(Inner {
                scheduler,
                transport,
                max_concurrent: config.max_concurrent,
                state: Mutex::new(DispatchState {
                    held: PriorityQueue::new(),
                    active: 0,
                    pending_slots: 0,
                    closed: false,
                }),
            }),
        })
    }

    /// Accept a request. Never blocks.
    ///
    /// The sink is called exactly once: with the response, with a failure,
    /// or with `SchedulerStopped`/`Cancelled` if the request can no longer run.
    /// Returns the id used for this request in log records.
    pub fn submit(&self, request: NetworkRequest, sink: Box<dyn ResponseSink>) -> Uuid {
        let id = Uuid::new_v4();
        let pending = PendingRequest { id, request, sink };

        if self.inner.scheduler.is_stopped() {
            pending.fail(RequestError::new(
                RequestErrorKind::SchedulerStopped,
                "scheduler has been stopped",
            ));
            return id;
        }

        let priority = pending.request.priority;
        let slot_priority = {
            let mut state = self.inner.state.lock();
            if state.closed {
                drop(state);
                pending.fail(RequestError::new(
                    RequestErrorKind::Cancelled,
                    "dispatcher has been shut down",
                ));
                return id;
            }
            state.held.insert(pending);
            if state.active < self.inner.max_concurrent {
                state.active += 1;
                state.pending_slots += 1;
                state.held.peek_highest().map(Prioritized::priority)
            } else {
                debug!(
                    request_id = %id,
                    priority,
                    held = state.held.len(),
                    "Request held: admission limit reached"
                );
                None
            }
        };

        if let Some(slot_priority) = slot_priority {
            self.inner.forward_slot(slot_priority);
        }
        id
    }

    /// Close the dispatcher. Held requests receive `Cancelled`; requests
    /// already executing finish normally. Idempotent.
    pub fn shutdown(&self) {
        let held = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.held.drain_ordered()
        };
        info!(cancelled = held.len(), "Network dispatcher shut down");
        for pending in held {
            pending.fail(RequestError::new(
                RequestErrorKind::Cancelled,
                "dispatcher has been shut down",
            ));
        }
    }

    /// Get current admission statistics.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        let state = self.inner.state.lock();
        DispatcherStats {
            active: state.active,
            held: state.held.len(),
            max_concurrent: self.inner.max_concurrent,
            closed: state.closed,
        }
    }

    /// The scheduler this dispatcher forwards to.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<WorkScheduler> {
        &self.inner.scheduler
    }
}

impl fmt::Debug for NetworkDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkDispatcher")
            .field("stats", &self.stats())
            .finish()
    }
}
