use serde::{Deserialize, Deserializer};

pub mod auth;
pub mod expenses;
pub mod location;
pub mod notifications;
pub mod speedtest;

/// The backend is not consistent about ids: some payloads carry them as JSON
/// numbers, others as strings. The client always works with strings.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

pub(crate) fn opaque_value(value: &serde_json::Value, key: &str) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get(key)
            .or_else(|| map.get("value"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}
