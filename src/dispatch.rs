//! Turns a successful response body into a typed result and runs the
//! request kind's processor over it.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{NetworkError, RequestKind, Result, WrapPolicy};

/// Per-request-kind handler for call results.
///
/// A fresh processor is built by the kind's registered factory for every call.
/// Hooks run in order: [`pre_process`](Processor::pre_process),
/// [`process`](Processor::process), [`post_process`](Processor::post_process),
/// then [`predict_process`](Processor::predict_process) with the request payload.
pub trait Processor<K: RequestKind>: Send {
    fn pre_process(&mut self, _result: &K::Output) {}

    fn process(&mut self, result: &K::Output);

    fn post_process(&mut self, _result: &K::Output) {}

    /// Receives the request payload after the result has been processed.
    fn predict_process(&mut self, _request: &K::Payload) {}

    /// Called instead of the success hooks when the server answers with an error status.
    fn error_process(&mut self, _status: u16) {}
}

/// Processor that ignores results, for kinds whose callers only need the value.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProcessor;

impl<K: RequestKind> Processor<K> for NoopProcessor {
    fn process(&mut self, _result: &K::Output) {}
}

pub(crate) fn dispatch<K: RequestKind>(
    uri: &str,
    body: &[u8],
    policy: WrapPolicy,
    processor: &mut dyn Processor<K>,
    request: &K::Payload,
) -> Result<K::Output> {
    let output = decode_output::<K::Output>(uri, body, policy)?;
    run_lifecycle(processor, &output, request);
    Ok(output)
}

pub(crate) fn run_lifecycle<K: RequestKind>(
    processor: &mut dyn Processor<K>,
    output: &K::Output,
    request: &K::Payload,
) {
    processor.pre_process(output);
    processor.process(output);
    processor.post_process(output);
    processor.predict_process(request);
}

pub(crate) fn decode_output<T: DeserializeOwned>(
    uri: &str,
    body: &[u8],
    policy: WrapPolicy,
) -> Result<T> {
    let parsed: Value = serde_json::from_slice(body)
        .map_err(|err| parse_error(uri, format!("invalid JSON: {err}"), body))?;

    let target = if policy.wraps_response {
        match parsed {
            Value::Object(mut fields) => fields
                .remove("data")
                .ok_or_else(|| parse_error(uri, "missing 'data' field".to_owned(), body))?,
            _ => {
                return Err(parse_error(
                    uri,
                    "wrapped response is not a JSON object".to_owned(),
                    body,
                ))
            }
        }
    } else {
        parsed
    };

    serde_json::from_value(target)
        .map_err(|err| parse_error(uri, format!("unexpected shape: {err}"), body))
}

fn parse_error(uri: &str, message: String, body: &[u8]) -> NetworkError {
    let body = String::from_utf8_lossy(body).into_owned();
    tracing::error!(%uri, %message, %body, "response could not be decoded");
    NetworkError::ResponseParse {
        uri: uri.to_owned(),
        message,
        body,
    }
}
