//! Network request model and the collaborator traits the dispatcher consumes.
//!
//! The dispatcher owns admission control only. Performing the call is the job
//! of a [`Transport`]; consuming the result is the job of a [`ResponseSink`].

mod dispatcher;

use std::fmt;
use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use crate::core::error::RequestError;
use crate::core::work::Priority;

pub use dispatcher::{DispatcherStats, NetworkDispatcher};

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Fetch a resource.
    Get,
    /// Send a body to the server.
    Post,
}

impl Method {
    /// Wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host plus path of a request. The path always starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Host name, optionally with port.
    pub host: String,
    /// Absolute path including any query string.
    pub path: String,
}

impl Target {
    /// Build a target, prefixing the path with `/` when missing.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            host: host.into(),
            path,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host, self.path)
    }
}

/// An outbound request awaiting admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequest {
    /// Where the request goes.
    pub target: Target,
    /// Request method.
    pub method: Method,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
    /// Admission priority; larger is admitted first.
    pub priority: i32,
}

impl NetworkRequest {
    /// A GET request at normal priority.
    pub fn get(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            target: Target::new(host, path),
            method: Method::Get,
            body: None,
            priority: Priority::NORMAL,
        }
    }

    /// A POST request at normal priority.
    pub fn post(host: impl Into<String>, path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            target: Target::new(host, path),
            method: Method::Post,
            body: Some(body),
            priority: Priority::NORMAL,
        }
    }

    /// Set the admission priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Raw result of a transport call.
pub struct TransportResponse {
    /// Response status code.
    pub status: u16,
    /// Body length when known.
    pub length: Option<u64>,
    /// Response body. Always drained and dropped by the dispatcher.
    pub body: Box<dyn Read + Send>,
}

impl TransportResponse {
    /// Response streaming `body` with unknown length.
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            length: None,
            body: Box::new(body),
        }
    }

    /// Response backed by an in-memory buffer.
    #[must_use]
    pub fn from_bytes(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            length: Some(body.len() as u64),
            body: Box::new(io::Cursor::new(body)),
        }
    }

    /// Whether the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Performs a request on behalf of the dispatcher.
///
/// Called from scheduler worker threads, possibly concurrently. Timeouts are
/// the transport's responsibility.
pub trait Transport: Send + Sync {
    /// Perform the call.
    fn execute(&self, request: &NetworkRequest) -> Result<TransportResponse, RequestError>;
}

/// Receives the single terminal outcome of a submitted request.
///
/// Both methods consume the sink, so exactly one of them runs. Delivery
/// happens on a scheduler worker thread; hopping to another thread is up to
/// the implementation.
pub trait ResponseSink: Send {
    /// The request succeeded. Anything left unread in `body` is discarded.
    fn on_data(self: Box<Self>, body: &mut dyn Read, length: Option<u64>);

    /// The request failed.
    fn on_error(self: Box<Self>, error: RequestError);
}

/// Sink adapter that buffers the body and hands the result to a closure.
struct FnSink<F>(F);

impl<F> ResponseSink for FnSink<F>
where
    F: FnOnce(Result<Vec<u8>, RequestError>) + Send,
{
    fn on_data(self: Box<Self>, body: &mut dyn Read, length: Option<u64>) {
        let capacity = length.and_then(|l| usize::try_from(l).ok()).unwrap_or(0);
        let mut buf = Vec::with_capacity(capacity);
        let result = body
            .read_to_end(&mut buf)
            .map(|_| buf)
            .map_err(RequestError::from);
        (self.0)(result);
    }

    fn on_error(self: Box<Self>, error: RequestError) {
        (self.0)(Err(error));
    }
}

/// Box a closure as a [`ResponseSink`] that receives the whole body.
pub fn sink_fn<F>(callback: F) -> Box<dyn ResponseSink>
where
    F: FnOnce(Result<Vec<u8>, RequestError>) + Send + 'static,
{
    Box::new(FnSink(callback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RequestErrorKind;
    use std::sync::mpsc;

    #[test]
    fn test_target_normalizes_path() {
        let target = Target::new("tiles.example.net", "z/1/2.png");
        assert_eq!(target.path, "/z/1/2.png");
        assert_eq!(target.to_string(), "tiles.example.net/z/1/2.png");
    }

    #[test]
    fn test_request_builders() {
        let get = NetworkRequest::get("h", "/a").with_priority(Priority::HIGH);
        assert_eq!(get.method, Method::Get);
        assert_eq!(get.priority, Priority::HIGH);
        assert!(get.body.is_none());

        let post = NetworkRequest::post("h", "/route", b"{}".to_vec());
        assert_eq!(post.method.as_str(), "POST");
        assert_eq!(post.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn test_response_success_range() {
        assert!(TransportResponse::from_bytes(204, Vec::new()).is_success());
        assert!(!TransportResponse::from_bytes(301, Vec::new()).is_success());
        assert!(!TransportResponse::from_bytes(500, Vec::new()).is_success());
        assert_eq!(TransportResponse::from_bytes(200, vec![1, 2, 3]).length, Some(3));
    }

    #[test]
    fn test_sink_fn_buffers_body() {
        let (tx, rx) = mpsc::channel();
        let sink = sink_fn(move |result| tx.send(result).unwrap());
        let mut body = io::Cursor::new(b"route-xml".to_vec());
        sink.on_data(&mut body, Some(9));
        assert_eq!(rx.recv().unwrap().unwrap(), b"route-xml");
    }

    #[test]
    fn test_sink_fn_forwards_error() {
        let (tx, rx) = mpsc::channel();
        let sink = sink_fn(move |result| tx.send(result).unwrap());
        sink.on_error(RequestError::permission_denied("offline"));
        let err = rx.recv().unwrap().unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::PermissionDenied);
    }
}
