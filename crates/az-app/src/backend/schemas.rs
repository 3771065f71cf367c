use az_core::{AnalysisResult, FieldErrors, ImageMetrics};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every JSON body of the analysis service wraps its payload in `data`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobAccepted {
    pub polling_endpoint: String,
    /// Seconds between polls.
    pub polling_interval: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusResponse {
    pub state: String,
    #[serde(default)]
    pub metrics: Option<Vec<ImageMetrics>>,
    #[serde(default)]
    pub results: Option<Vec<AnalysisResult>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A JSON list, bare or wrapped in an envelope depending on the deployment.
/// Used for synchronous results and the model listing.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Listing<T> {
    Bare(Vec<T>),
    Wrapped(Envelope<Vec<T>>),
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Bare(items) => items,
            Self::Wrapped(envelope) => envelope.data,
        }
    }
}

pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Reads a 400 body into `field -> messages`. The mapping may sit under `data`
/// or at the top level; a plain message lands under `non_field_errors`.
pub fn field_errors(body: &[u8]) -> FieldErrors {
    let mut errors = FieldErrors::new();

    let value = match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if !text.is_empty() {
                errors.insert(NON_FIELD_ERRORS.into(), vec![text]);
            }
            return errors;
        }
    };

    let payload = match value {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    };

    match payload {
        Value::Object(map) => {
            for (field, messages) in map {
                errors.insert(field, messages_of(messages));
            }
        }
        Value::Null => {}
        other => {
            errors.insert(NON_FIELD_ERRORS.into(), messages_of(other));
        }
    }

    errors
}

fn messages_of(value: Value) -> Vec<String> {
    match value {
        Value::String(message) => vec![message],
        Value::Array(items) => items.into_iter().flat_map(messages_of).collect(),
        Value::Object(map) => map
            .into_iter()
            .flat_map(|(key, nested)| messages_of(nested).into_iter().map(move |m| format!("{}: {}", key, m)))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

/// Message text of an error body, taken verbatim: `detail`, `error` or
/// `message` (top level or under `data`), a string `data`, or the raw text.
pub fn error_message(body: &[u8]) -> Option<String> {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        if let Some(message) = message_in(&value) {
            return Some(message);
        }
        if let Some(message) = value.get("data").and_then(message_in) {
            return Some(message);
        }
        if let Some(Value::String(message)) = value.get("data") {
            return Some(message.clone());
        }
    }

    let text = String::from_utf8_lossy(body).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn message_in(value: &Value) -> Option<String> {
    ["detail", "error", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
