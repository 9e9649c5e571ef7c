//! Core types shared by the proxy, the dispatcher and backends.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// JSON attribute map of an object.
pub type Attributes = Map<String, Value>;

/// Class name of inbound message records.
pub const MESSAGE_INBOUND: &str = "MessageInbound";

/// Class name of outbound message records.
pub const MESSAGE_OUTBOUND: &str = "MessageOutbound";

/// An object as held by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseObject {
    pub class_name: String,

    /// Assigned by the backend on first save.
    pub object_id: Option<String>,

    pub created_at: Option<DateTime<Utc>>,

    pub updated_at: Option<DateTime<Utc>>,

    /// Application-defined fields.
    pub attributes: Attributes,
}

impl ParseObject {
    /// A new, unsaved object.
    pub fn new(class_name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: None,
            created_at: None,
            updated_at: None,
            attributes,
        }
    }

    /// Look up an application field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Canonical JSON view: attributes plus `objectId`, `createdAt` and
    /// `updatedAt` when set.
    pub fn to_json(&self) -> Attributes {
        let mut view = self.attributes.clone();
        if let Some(ref id) = self.object_id {
            view.insert("objectId".to_string(), Value::String(id.clone()));
        }
        if let Some(at) = self.created_at {
            view.insert("createdAt".to_string(), Value::String(format_timestamp(at)));
        }
        if let Some(at) = self.updated_at {
            view.insert("updatedAt".to_string(), Value::String(format_timestamp(at)));
        }
        view
    }
}

impl fmt::Display for ParseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.to_json()))
    }
}

/// Render a timestamp the way the backend does (`2024-05-01T10:00:00.000Z`).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Direction of a message record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Inbound,
    Outbound,
}

impl RecordKind {
    /// Default class name for this direction.
    pub fn class_name(self) -> &'static str {
        match self {
            RecordKind::Inbound => MESSAGE_INBOUND,
            RecordKind::Outbound => MESSAGE_OUTBOUND,
        }
    }

    /// Field naming the user on the other end of the message.
    pub fn user_key(self) -> &'static str {
        match self {
            RecordKind::Inbound => "fromUserId",
            RecordKind::Outbound => "toUserId",
        }
    }

    /// Current schema: user key plus `channel`.
    pub fn default_schema(self) -> RecordSchema {
        RecordSchema::new(self.class_name(), [self.user_key(), "channel"])
    }

    /// Earlier schema: user key plus `type`.
    pub fn legacy_schema(self) -> RecordSchema {
        RecordSchema::new(self.class_name(), [self.user_key(), "type"])
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// Class name plus the keys a record must carry to be admitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSchema {
    pub class_name: String,
    pub required_keys: Vec<String>,
}

impl RecordSchema {
    pub fn new<I, S>(class_name: impl Into<String>, required_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_name: class_name.into(),
            required_keys: required_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Required keys absent from `view`. A key mapped to `null` is present.
    pub fn missing_keys(&self, view: &Attributes) -> Vec<String> {
        self.required_keys
            .iter()
            .filter(|key| !view.contains_key(key.as_str()))
            .cloned()
            .collect()
    }

    /// Whether `view` carries every required key.
    pub fn admits(&self, view: &Attributes) -> bool {
        self.required_keys
            .iter()
            .all(|key| view.contains_key(key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_default_schemas() {
        let inbound = RecordKind::Inbound.default_schema();
        assert_eq!(inbound.class_name, "MessageInbound");
        assert_eq!(inbound.required_keys, vec!["fromUserId", "channel"]);

        let outbound = RecordKind::Outbound.default_schema();
        assert_eq!(outbound.class_name, "MessageOutbound");
        assert_eq!(outbound.required_keys, vec!["toUserId", "channel"]);

        let legacy = RecordKind::Outbound.legacy_schema();
        assert_eq!(legacy.required_keys, vec!["toUserId", "type"]);
    }

    #[test]
    fn test_missing_keys() {
        let schema = RecordKind::Inbound.default_schema();

        let full = attrs(json!({"fromUserId": "u1", "channel": "c1", "text": "hi"}));
        assert!(schema.admits(&full));
        assert!(schema.missing_keys(&full).is_empty());

        let partial = attrs(json!({"fromUserId": "u1"}));
        assert!(!schema.admits(&partial));
        assert_eq!(schema.missing_keys(&partial), vec!["channel"]);
    }

    #[test]
    fn test_null_value_counts_as_present() {
        let schema = RecordKind::Inbound.default_schema();
        let view = attrs(json!({"fromUserId": null, "channel": "c1"}));
        assert!(schema.admits(&view));
    }

    #[test]
    fn test_canonical_view() {
        let mut object = ParseObject::new("MessageInbound", attrs(json!({"channel": "c1"})));
        assert_eq!(object.to_json().len(), 1);

        object.object_id = Some("abc123".to_string());
        object.created_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());

        let view = object.to_json();
        assert_eq!(view["objectId"], json!("abc123"));
        assert_eq!(view["createdAt"], json!("2024-05-01T10:00:00.000Z"));
        assert!(!view.contains_key("updatedAt"));
    }
}
