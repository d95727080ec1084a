use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PushNotification {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl PushNotification {
    /// Accepts either the bare content object or the full envelope the push
    /// SDK hands out (`{"request": {"content": {...}}}`).
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value.pointer("/request/content") {
            Some(content) => serde_json::from_value(content.clone()),
            None => serde_json::from_value(value),
        }
    }

    pub fn text(&self) -> String {
        format!(
            "{} {}",
            self.title.as_deref().unwrap_or_default(),
            self.body.as_deref().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_sdk_envelope() {
        let envelope = json!({
            "date": 1700000000,
            "request": {
                "identifier": "abc",
                "content": {"title": "Gasto aprobado", "body": "Cafe 4.50", "data": {"gastoId": 42}}
            }
        });
        let n = PushNotification::from_value(envelope).unwrap();
        assert_eq!(n.title.as_deref(), Some("Gasto aprobado"));
        assert_eq!(n.data["gastoId"], json!(42));
    }

    #[test]
    fn accepts_bare_content() {
        let n = PushNotification::from_value(json!({"body": "hello"})).unwrap();
        assert_eq!(n.title, None);
        assert_eq!(n.data, Value::Null);
        assert_eq!(n.text(), " hello");
    }
}
