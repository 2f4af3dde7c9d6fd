use std::fmt;
use std::path::PathBuf;

/// Terminal transport states that end an attempt without a usable response.
///
/// These are not retried the way connection-level (status 0) failures are.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportFaultKind {
    /// The exchange was aborted mid-flight (body read failure, sink refused data).
    Aborted,
    /// The connection could not be established before the timeout.
    ConnectionTimedOut,
    /// The request was sent but processing exceeded the timeout.
    TimedOut,
    /// Connection-level failure on an exchange that is not retried (downloads).
    ConnectionError,
}

impl fmt::Display for TransportFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Aborted => "aborted",
            Self::ConnectionTimedOut => "connection timed out",
            Self::TimedOut => "processing timed out",
            Self::ConnectionError => "connection error",
        };
        f.write_str(text)
    }
}

/// Error type returned by this crate.
///
/// Server error statuses on API calls are not represented here; they come back
/// as [`crate::CallOutcome::ServerError`].
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Missing or malformed routing metadata. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Connection-level failures (status 0) persisted past the retry budget.
    #[error("connectivity exhausted after {attempts} attempt(s) for {uri}: {message}")]
    ConnectivityExhausted {
        uri: String,
        attempts: u32,
        message: String,
    },
    /// A success response whose body could not be decoded.
    #[error("invalid response from {uri}: {message}; body: {body}")]
    ResponseParse {
        uri: String,
        message: String,
        body: String,
    },
    /// Aborted or timed-out exchange.
    #[error("transport fault ({kind}) for {uri}: {message}")]
    TransportFault {
        uri: String,
        kind: TransportFaultKind,
        message: String,
    },
    /// Non-success HTTP status on a download exchange.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Request payload could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// Filesystem failure while writing a download.
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The caller cancelled the call or download.
    #[error("operation cancelled")]
    Cancelled,
}

impl NetworkError {
    /// Returns `true` for errors the retry loop treats as connectivity-class.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::ConnectivityExhausted { .. })
    }
}
