//! The HTTP exchange boundary the engine drives.
//!
//! [`Transport`] never fails: every outcome, including connection errors, comes
//! back as an [`HttpResponse`] whose [`TerminalState`] tells the engine what
//! happened. Connection-level failures carry status 0.

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header;

use crate::{HttpMethod, TransportFaultKind};

/// One outgoing exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub uri: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
    /// Ask intermediaries for the live resource.
    pub disable_cache: bool,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            method,
            headers: Vec::new(),
            body: None,
            timeout: Duration::from_secs(30),
            disable_cache: false,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// How an exchange ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerminalState {
    /// A status line was received.
    Finished,
    /// Connection-level failure (DNS, refused, reset) before any status.
    Error,
    Aborted,
    ConnectionTimedOut,
    TimedOut,
}

impl TerminalState {
    /// Fault reported when an exchange ends in this state without a response.
    pub(crate) fn fault_kind(self) -> TransportFaultKind {
        match self {
            Self::Finished | Self::Aborted => TransportFaultKind::Aborted,
            Self::Error => TransportFaultKind::ConnectionError,
            Self::ConnectionTimedOut => TransportFaultKind::ConnectionTimedOut,
            Self::TimedOut => TransportFaultKind::TimedOut,
        }
    }
}

/// Result of one exchange.
#[derive(Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub state: TerminalState,
    /// Transport diagnostic for non-finished states.
    pub message: String,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("state", &self.state)
            .field("message", &self.message)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl HttpResponse {
    pub fn finished(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            state: TerminalState::Finished,
            message: String::new(),
        }
    }

    /// An exchange that ended without a status line.
    pub fn failed(state: TerminalState, message: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: Vec::new(),
            state,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == TerminalState::Finished && (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn from_error(err: &reqwest::Error) -> Self {
        Self::failed(classify(err), err.to_string())
    }
}

/// Receives a streamed body as it arrives.
///
/// Only called for success statuses. Returning an error aborts the exchange.
#[async_trait]
pub trait FragmentSink: Send {
    async fn on_fragment(&mut self, fragment: &[u8], total: Option<u64>) -> io::Result<()>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a buffered request/response exchange.
    async fn send(&self, request: HttpRequest) -> HttpResponse;

    /// Performs an exchange whose success body is pushed into `sink`.
    ///
    /// The returned response carries the error body for non-success statuses
    /// and an empty body otherwise.
    async fn stream(&self, request: HttpRequest, sink: &mut dyn FragmentSink) -> HttpResponse;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured client (proxies, TLS roots, connect timeout).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn build(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(request.method.into(), &request.uri)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.disable_cache {
            builder = builder
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> HttpResponse {
        let response = match self.build(request).send().await {
            Ok(response) => response,
            Err(err) => return HttpResponse::from_error(&err),
        };

        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => HttpResponse::finished(status, body.to_vec()),
            Err(err) => HttpResponse::from_error(&err),
        }
    }

    async fn stream(&self, request: HttpRequest, sink: &mut dyn FragmentSink) -> HttpResponse {
        let response = match self.build(request).send().await {
            Ok(response) => response,
            Err(err) => return HttpResponse::from_error(&err),
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return match response.bytes().await {
                Ok(body) => HttpResponse::finished(status, body.to_vec()),
                Err(err) => HttpResponse::from_error(&err),
            };
        }

        let total = response.content_length();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let failure = match chunk {
                Ok(bytes) => match sink.on_fragment(&bytes, total).await {
                    Ok(()) => continue,
                    Err(err) => HttpResponse::failed(TerminalState::Aborted, err.to_string()),
                },
                Err(err) => HttpResponse::from_error(&err),
            };
            return HttpResponse { status, ..failure };
        }

        HttpResponse::finished(status, Vec::new())
    }
}

fn classify(err: &reqwest::Error) -> TerminalState {
    if err.is_timeout() {
        if err.is_connect() {
            TerminalState::ConnectionTimedOut
        } else {
            TerminalState::TimedOut
        }
    } else if err.is_builder() || err.is_body() || err.is_decode() {
        TerminalState::Aborted
    } else {
        TerminalState::Error
    }
}
