//! Record types
//!
//! `RecordId` is an integer internally. On the wire it is a GraphQL `ID`:
//! serialized as a string, accepted as either a string or an integer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type RecordId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(with = "id_format")]
    pub id: RecordId,
    pub text: String,
}

impl Record {
    pub fn new(id: RecordId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// Result of a successful `updateText` mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedRecord {
    pub status: String,
    #[serde(with = "id_format")]
    pub id: RecordId,
}

impl UpdatedRecord {
    pub fn updated(id: RecordId) -> Self {
        Self {
            status: "updated".to_string(),
            id,
        }
    }
}

/// Parse an `ID` value given as JSON.
pub fn parse_id(value: &serde_json::Value) -> Option<RecordId> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) mod id_format {
    use super::*;

    pub fn serialize<S: Serializer>(id: &RecordId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RecordId, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        parse_id(&value).ok_or_else(|| serde::de::Error::custom(format!("invalid ID: {value}")))
    }
}
