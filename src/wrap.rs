use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Whether payloads travel inside a `{"data": ...}` envelope.
///
/// The two flags are independent; any combination is a valid client variant.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(try_from = "String")]
pub struct WrapPolicy {
    /// Outgoing bodies are sent as `{"data": <payload>}`.
    pub wraps_request: bool,
    /// Incoming bodies are read from their `data` field.
    pub wraps_response: bool,
}

impl WrapPolicy {
    pub const WRAPPED: Self = Self::new(true, true);
    pub const REQUEST_ONLY: Self = Self::new(true, false);
    pub const RESPONSE_ONLY: Self = Self::new(false, true);
    pub const RAW: Self = Self::new(false, false);

    pub const fn new(wraps_request: bool, wraps_response: bool) -> Self {
        Self {
            wraps_request,
            wraps_response,
        }
    }

    /// Configuration name of this policy.
    pub fn name(&self) -> &'static str {
        match (self.wraps_request, self.wraps_response) {
            (true, true) => "wrap",
            (true, false) => "wrap_request",
            (false, true) => "wrap_response",
            (false, false) => "none",
        }
    }
}

impl fmt::Display for WrapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WrapPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wrap" => Ok(Self::WRAPPED),
            "wrap_request" => Ok(Self::REQUEST_ONLY),
            "wrap_response" => Ok(Self::RESPONSE_ONLY),
            "none" | "raw" => Ok(Self::RAW),
            other => Err(format!("unknown wrap policy '{other}'")),
        }
    }
}

impl TryFrom<String> for WrapPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
