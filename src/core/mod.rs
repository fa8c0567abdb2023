//! Work scheduling, admission control and their error types.

pub mod error;
pub mod network;
pub mod work;
pub mod work_scheduler;

pub use error::{RequestError, RequestErrorKind, SchedulerError};
pub use network::{
    sink_fn, DispatcherStats, Method, NetworkDispatcher, NetworkRequest, ResponseSink, Target,
    Transport, TransportResponse,
};
pub use work::{work_fn, Completion, FnWork, Priority, Work, WorkOutcome};
pub use work_scheduler::{SchedulerStats, WorkScheduler};
