//! In-memory transport answering from a table of canned replies.
//!
//! Used by tests and offline builds. Records call and concurrency figures so
//! admission limits can be asserted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::trace;

use crate::core::error::RequestError;
use crate::core::network::{NetworkRequest, Transport, TransportResponse};

/// Canned answer for one path.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Respond with a status and body.
    Status {
        /// Response status.
        status: u16,
        /// Response body.
        body: Vec<u8>,
    },
    /// Fail the call.
    Fail(RequestError),
}

impl ScriptedReply {
    /// 200 with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::Status {
            status: 200,
            body: body.into(),
        }
    }
}

/// [`Transport`] that looks replies up by request path.
///
/// Unknown paths get a 404. An optional latency is slept inside every call.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: RwLock<HashMap<String, ScriptedReply>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    /// Transport with no routes and no latency.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` inside every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register the reply for `path`, replacing any earlier one.
    #[must_use]
    pub fn with_route(self, path: impl Into<String>, reply: ScriptedReply) -> Self {
        self.set_route(path, reply);
        self
    }

    /// Register the reply for `path` on a shared transport.
    pub fn set_route(&self, path: impl Into<String>, reply: ScriptedReply) {
        self.routes.write().insert(path.into(), reply);
    }

    /// Total calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed executing at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight gauge on every exit path.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &NetworkRequest) -> Result<TransportResponse, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }

        let reply = self.routes.read().get(&request.target.path).cloned();
        trace!(path = %request.target.path, found = reply.is_some(), "Scripted call");
        match reply {
            Some(ScriptedReply::Status { status, body }) => {
                Ok(TransportResponse::from_bytes(status, body))
            }
            Some(ScriptedReply::Fail(error)) => Err(error),
            None => Ok(TransportResponse::from_bytes(
                404,
                format!("no route for {}", request.target.path).into_bytes(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RequestErrorKind;
    use std::io::Read;

    #[test]
    fn test_routes_and_fallback() {
        let transport = ScriptedTransport::new()
            .with_route("/tile/1", ScriptedReply::ok("png"))
            .with_route(
                "/down",
                ScriptedReply::Fail(RequestError::transport("connection reset")),
            );

        let mut hit = transport.execute(&NetworkRequest::get("maps", "/tile/1")).unwrap();
        let mut body = String::new();
        hit.body.read_to_string(&mut body).unwrap();
        assert_eq!((hit.status, body.as_str()), (200, "png"));

        let miss = transport.execute(&NetworkRequest::get("maps", "/nope")).unwrap();
        assert_eq!(miss.status, 404);

        let err = transport.execute(&NetworkRequest::get("maps", "/down")).unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::TransportFailure);

        assert_eq!(transport.calls(), 3);
        assert_eq!(transport.peak_in_flight(), 1);
    }
}
