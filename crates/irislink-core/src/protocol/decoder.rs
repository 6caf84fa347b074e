//! Reply decoding
//!
//! Turns accumulated reply text into a [`DecodedResponse`]. The firmware's
//! replies come in a few shapes:
//!
//! - `{"error": "<message>"}`: the device refused the command
//! - `{"results": [ ... ]}`: success; elements may be JSON text of the form
//!   `{"result": "<json text>"}` that needs another parse step
//! - `{"results": "<json text>"}`: the same encoding without the sequence
//!
//! Anything else that parses is passed through as a success value.

use serde_json::{Map, Value};

use super::frame::RawResponse;
use super::ProtocolError;

/// Deepest chain of `{"result": "..."}` encodings followed
const MAX_UNWRAP_DEPTH: usize = 4;

/// Outcome of one transaction, after decoding
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResponse {
    /// The `results` value, unwrapped
    Success(Value),
    /// What went wrong; always a value, never a panic or early return
    Error(ProtocolError),
}

impl DecodedResponse {
    /// Whether this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, DecodedResponse::Error(_))
    }

    /// Success value, if any
    pub fn results(&self) -> Option<&Value> {
        match self {
            DecodedResponse::Success(v) => Some(v),
            DecodedResponse::Error(_) => None,
        }
    }

    /// Error, if any
    pub fn error(&self) -> Option<&ProtocolError> {
        match self {
            DecodedResponse::Success(_) => None,
            DecodedResponse::Error(e) => Some(e),
        }
    }

    /// Human readable failure reason, if any
    pub fn reason(&self) -> Option<String> {
        self.error().map(ToString::to_string)
    }

    /// Convert into a standard `Result`
    pub fn into_result(self) -> Result<Value, ProtocolError> {
        match self {
            DecodedResponse::Success(v) => Ok(v),
            DecodedResponse::Error(e) => Err(e),
        }
    }
}

impl From<ProtocolError> for DecodedResponse {
    fn from(err: ProtocolError) -> Self {
        DecodedResponse::Error(err)
    }
}

/// Top-level reply shapes
enum Reply {
    Failure(Value),
    Results(Value),
    Other(Value),
}

impl Reply {
    fn classify(value: Value) -> Self {
        match value {
            Value::Object(mut map) => {
                if let Some(error) = map.remove("error") {
                    Reply::Failure(error)
                } else if let Some(results) = map.remove("results") {
                    Reply::Results(results)
                } else {
                    Reply::Other(Value::Object(map))
                }
            }
            other => Reply::Other(other),
        }
    }
}

/// Strip the firmware's pretty-printing: drop every newline+tab pair and turn
/// the remaining tabs into spaces.
pub fn clean(text: &str) -> String {
    text.trim().replace("\n\t", "").replace('\t', " ")
}

/// Decode accumulated reply text
pub fn decode(raw: &RawResponse) -> DecodedResponse {
    decode_text(&raw.text)
}

/// Decode reply text. Performs no I/O.
pub fn decode_text(text: &str) -> DecodedResponse {
    let cleaned = clean(text);
    let value: Value = match serde_json::from_str(&cleaned) {
        Ok(v) => v,
        Err(e) => {
            return DecodedResponse::Error(ProtocolError::Parse {
                detail: e.to_string(),
                raw: text.to_string(),
            })
        }
    };

    match Reply::classify(value) {
        Reply::Failure(error) => DecodedResponse::Error(ProtocolError::Device(match error {
            Value::String(message) => message,
            other => other.to_string(),
        })),
        Reply::Results(results) => DecodedResponse::Success(unwrap_results(results)),
        Reply::Other(value) => DecodedResponse::Success(value),
    }
}

/// Unwrap encoded elements of `results`, collapsing a sequence of one
fn unwrap_results(results: Value) -> Value {
    match results {
        Value::Array(items) => {
            let mut items: Vec<Value> = items.into_iter().map(unwrap_encoded).collect();
            if items.len() == 1 {
                items.remove(0)
            } else {
                Value::Array(items)
            }
        }
        Value::String(_) => unwrap_encoded(results),
        other => other,
    }
}

/// Best-effort unwrap of one `{"result": "<json text>"}` string.
/// Anything that does not fit is returned unchanged.
fn unwrap_encoded(item: Value) -> Value {
    unwrap_at_depth(item, 0)
}

fn unwrap_at_depth(item: Value, depth: usize) -> Value {
    if depth >= MAX_UNWRAP_DEPTH {
        return item;
    }
    let Value::String(text) = &item else {
        return item;
    };
    let Some(inner) = parse_result_envelope(text) else {
        return item;
    };
    match serde_json::from_str::<Value>(&inner) {
        // Inner payload can itself be another encoded envelope
        Ok(payload @ Value::String(_)) => unwrap_at_depth(payload, depth + 1),
        Ok(payload) => payload,
        Err(_) => item,
    }
}

/// The `result` string of `{"result": "..."}` text, if `text` is that shape
fn parse_result_envelope(text: &str) -> Option<String> {
    match serde_json::from_str::<Map<String, Value>>(text) {
        Ok(mut map) => match map.remove("result") {
            Some(Value::String(inner)) => Some(inner),
            _ => None,
        },
        Err(_) => None,
    }
}
