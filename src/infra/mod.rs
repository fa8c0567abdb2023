//! Infrastructure adapters: queue storage and network transports.

pub mod queue;
pub mod transport;

pub use queue::PriorityQueue;
pub use transport::ScriptedTransport;
#[cfg(feature = "http-transport")]
pub use transport::HttpTransport;
