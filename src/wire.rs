use serde::{Deserialize, Serialize};

/// Outgoing envelope used when a client wraps requests.
#[derive(Debug, Serialize)]
pub struct WrappedRequest<'a, T: ?Sized> {
    pub data: &'a T,
}

/// Error body servers send alongside a 400 status.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}
