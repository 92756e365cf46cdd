//! Turning a chat round-trip's result into assistant-turn content.

use serde_json::Value;

pub const NO_ANSWER: &str = "No answer returned.";
pub const FALLBACK_ERROR: &str = "An error occurred while contacting the server.";

/// Answer text of a successful response body.
///
/// A JSON string is the answer itself. For an object, the first non-empty string among
/// `fields` wins; otherwise the object is rendered as compact JSON.
pub fn answer_text(data: &Value, fields: &[String]) -> String {
    match data {
        Value::Null => NO_ANSWER.to_string(),
        Value::String(s) if s.is_empty() => NO_ANSWER.to_string(),
        Value::String(s) => s.clone(),
        Value::Object(map) => fields
            .iter()
            .filter_map(|f| map.get(f).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        other => other.to_string(),
    }
}

/// The body's `sources` list, when it is a list. Non-string entries are kept as JSON text.
pub fn sources(data: &Value) -> Option<Vec<String>> {
    let items = data.get("sources")?.as_array()?;
    Some(
        items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
    )
}

/// Error text for a failed round-trip: the server's `error` field, then the transport's
/// message, then a generic fallback.
pub fn failure_text(data: Option<&Value>, transport_message: Option<&str>) -> String {
    data.and_then(|d| d.get("error"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| transport_message.filter(|s| !s.trim().is_empty()))
        .unwrap_or(FALLBACK_ERROR)
        .to_string()
}
