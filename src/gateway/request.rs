//! Request and response shapes of the GraphQL surface.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::Error;

/// One operation request: a document, an optional operation name and variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(rename = "operationName", default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        if let Value::Object(map) = variables {
            self.variables = Some(map);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQlError {
    pub fn from_error(err: &Error) -> Self {
        Self {
            message: err.to_string(),
            path: None,
            extensions: Some(serde_json::json!({ "code": err.code() })),
        }
    }

    pub fn with_path(mut self, key: &str) -> Self {
        self.path = Some(vec![key.to_string()]);
        self
    }
}

/// The value sent back for one operation (or one subscription event).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQlError>,
}

impl ExecutionResult {
    /// `{ "data": { key: value } }`
    pub fn data(key: &str, value: Value) -> Self {
        let mut map = Map::new();
        map.insert(key.to_string(), value);
        Self {
            data: Some(Value::Object(map)),
            errors: Vec::new(),
        }
    }

    /// `{ "data": { key: null }, "errors": [..] }` for a resolver that failed.
    pub fn field_error(key: &str, err: &Error) -> Self {
        Self {
            errors: vec![GraphQlError::from_error(err).with_path(key)],
            ..Self::data(key, Value::Null)
        }
    }
}
