//! Notification payload convention.
//!
//! Payloads written by `emit` are JSON arrays, one element per argument.
//! Anything else (triggers, `pg_notify` calls from other clients) is passed
//! through as a single string argument.

use serde_json::Value;

/// Decode a raw payload into listener arguments.
///
/// - empty payload: no arguments
/// - not starting with `[`: the raw string as the only argument
/// - starting with `[` but not valid JSON: the raw string as the only argument
/// - a JSON array: each element as its own argument
/// - any other JSON value: that value as the only argument
///
/// The empty case is an exception to the plain-string rule: a bare `NOTIFY`
/// from a zero-argument `emit` arrives with no arguments, and so does an
/// external `pg_notify(channel, '')`, which never yields `[""]`.
pub fn decode_payload(payload: &str) -> Vec<Value> {
    if payload.is_empty() {
        return Vec::new();
    }
    if !payload.starts_with('[') {
        return vec![Value::String(payload.to_string())];
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Array(items)) => items,
        Ok(other) => vec![other],
        Err(err) => {
            tracing::debug!(error = %err, "payload looks like JSON but does not parse, passing it through raw");
            vec![Value::String(payload.to_string())]
        }
    }
}

/// Encode `emit` arguments as a JSON array payload.
pub fn encode_args(args: &[Value]) -> Result<String, serde_json::Error> {
    serde_json::to_string(args)
}
