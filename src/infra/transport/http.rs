//! HTTP transport backed by `reqwest`.
//!
//! Dispatcher slots run on plain scheduler threads, so the transport owns a
//! small tokio runtime and blocks on each call.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, trace};

use crate::core::error::{RequestError, RequestErrorKind};
use crate::core::network::{Method, NetworkRequest, Transport, TransportResponse};

const DEFAULT_USER_AGENT: &str = concat!("navcore/", env!("CARGO_PKG_VERSION"));

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// URL scheme placed before `host`.
    pub scheme: String,
    /// Whole-request timeout.
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Threads in the owned runtime.
    pub runtime_threads: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            scheme: "https".into(),
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.into(),
            runtime_threads: 2,
        }
    }
}

impl HttpTransportConfig {
    /// Set the URL scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`Transport`] performing real HTTP calls.
pub struct HttpTransport {
    client: reqwest::Client,
    runtime: Runtime,
    scheme: String,
}

impl HttpTransport {
    /// Build the client and its runtime.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the runtime or the client cannot be built.
    pub fn new(config: HttpTransportConfig) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.runtime_threads.max(1))
            .thread_name("navcore-http")
            .enable_all()
            .build()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(io::Error::other)?;
        debug!(scheme = %config.scheme, timeout_ms = config.timeout.as_millis(), "HTTP transport ready");
        Ok(Self {
            client,
            runtime,
            scheme: config.scheme,
        })
    }

    fn url(&self, request: &NetworkRequest) -> String {
        format!("{}://{}{}", self.scheme, request.target.host, request.target.path)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &NetworkRequest) -> Result<TransportResponse, RequestError> {
        let url = self.url(request);
        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        let builder = match &request.body {
            Some(body) => builder.body(body.clone()),
            None => builder,
        };

        self.runtime.block_on(async move {
            let response = builder.send().await.map_err(classify)?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(classify)?;
            trace!(%url, status, bytes = body.len(), "HTTP response received");
            Ok(TransportResponse::from_bytes(status, body.to_vec()))
        })
    }
}

/// Map a reqwest failure onto the request error kinds.
fn classify(err: reqwest::Error) -> RequestError {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::PermissionDenied {
                return RequestError::permission_denied(err.to_string());
            }
        }
        source = cause.source();
    }

    let kind = if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        RequestErrorKind::TransportFailure
    } else {
        RequestErrorKind::UnexpectedFailure
    };
    RequestError::new(kind, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(reply: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0_u8; 2048];
            let _ = stream.read(&mut buf);
            stream.write_all(reply.as_bytes()).unwrap();
        });
        addr
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(
            HttpTransportConfig::default()
                .with_scheme("http")
                .with_timeout(Duration::from_secs(5)),
        )
        .unwrap()
    }

    #[test]
    fn test_success_body() {
        let addr = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        );
        let mut response = transport()
            .execute(&NetworkRequest::get(addr, "/tile"))
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.length, Some(5));
        let mut body = String::new();
        response.body.read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello");
    }

    #[test]
    fn test_error_status_is_returned_not_failed() {
        let addr = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\nConnection: close\r\n\r\ngone",
        );
        let response = transport()
            .execute(&NetworkRequest::get(addr, "/missing"))
            .unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }

    #[test]
    fn test_connection_refused_is_transport_failure() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let err = transport()
            .execute(&NetworkRequest::get(addr, "/"))
            .unwrap_err();
        assert_eq!(err.kind, RequestErrorKind::TransportFailure);
    }
}
