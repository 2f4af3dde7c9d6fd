use serde::Serialize;
use serde_json::Value;

use crate::{NetworkError, Result};

/// Encodes a request payload into a query fragment such as `?tags=a&tags=b&page=2`.
///
/// Fields are visited in serialization order. Sequence fields expand to one
/// `name=value` pair per element; everything else becomes a single pair.
/// Values are emitted verbatim, without percent-encoding. A payload with no
/// pairs (unit, `null`, empty struct) yields an empty string.
pub fn encode_query<T>(data: &T, delimiter: &str, separator: &str) -> Result<String>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(data)
        .map_err(|err| NetworkError::Encode(format!("query parameters: {err}")))?;

    let fields = match value {
        Value::Null => return Ok(String::new()),
        Value::Object(fields) => fields,
        other => {
            return Err(NetworkError::Encode(format!(
                "query parameters must serialize to an object, got {}",
                kind_name(&other)
            )))
        }
    };

    let mut pairs = Vec::with_capacity(fields.len());
    for (name, value) in &fields {
        match value {
            Value::Array(items) => {
                pairs.extend(items.iter().map(|item| format!("{name}={}", scalar(item))));
            }
            other => pairs.push(format!("{name}={}", scalar(other))),
        }
    }

    if pairs.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("{delimiter}{}", pairs.join(separator)))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        nested => nested.to_string(),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
