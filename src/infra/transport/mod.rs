//! Transport backends for the network dispatcher.

#[cfg(feature = "http-transport")]
pub mod http;
pub mod memory;

#[cfg(feature = "http-transport")]
pub use http::{HttpTransport, HttpTransportConfig};
pub use memory::{ScriptedReply, ScriptedTransport};
