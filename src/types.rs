use crate::wire::ErrorResponse;

/// Result of an API call that reached the server.
///
/// Error statuses are ordinary outcomes here rather than `Err`, so callers can
/// handle expected error responses without unwinding through `?`.
#[derive(Clone, Debug, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),
    ServerError(ServerFailure),
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the value of a successful call.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::ServerError(_) => None,
        }
    }

    pub fn server_error(&self) -> Option<&ServerFailure> {
        match self {
            Self::Success(_) => None,
            Self::ServerError(failure) => Some(failure),
        }
    }
}

/// A response with a non-success status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerFailure {
    pub uri: String,
    pub status: u16,
    /// Raw response body.
    pub body: String,
    /// Parsed `{code, message}` body, present for 400 responses that carry one.
    pub error: Option<ErrorResponse>,
}
