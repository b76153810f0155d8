//! JSON-RPC message and response types
//!
//! Both are kept as raw JSON objects rather than typed structs: the
//! distinction between an absent `id` and `"id": null` has to survive
//! deserialization, and a response has to be inspectable even when it is
//! malformed in ways a typed struct would reject.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::{Error, Result};

/// The only protocol version tag this harness speaks
pub const JSONRPC_VERSION: &str = "2.0";

/// One outbound protocol unit sent to the server under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    /// Build a request; `id` may be any JSON value, including null or ""
    pub fn request(id: impl Into<Value>, method: &str, params: Value) -> Self {
        let mut map = Map::new();
        map.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        map.insert("id".into(), id.into());
        map.insert("method".into(), Value::from(method));
        map.insert("params".into(), params);
        Self(map)
    }

    /// Build a notification (no `id` field at all)
    pub fn notification(method: &str, params: Value) -> Self {
        let mut map = Map::new();
        map.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        map.insert("method".into(), Value::from(method));
        map.insert("params".into(), params);
        Self(map)
    }

    /// Wrap an arbitrary JSON object as a message, kept verbatim
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::Config(format!(
                "message must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// The identifier, if the field is present (`Some(Value::Null)` for `"id": null`)
    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    /// A message is a request iff it carries an `id` field, whatever its value
    pub fn is_request(&self) -> bool {
        self.0.contains_key("id")
    }

    pub fn method(&self) -> Option<&str> {
        self.0.get("method").and_then(Value::as_str)
    }

    /// Serialize to a single line of JSON (no terminator)
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// The single reply a server emits for a request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Response(Map<String, Value>);

impl Response {
    /// Parse one line of server output
    ///
    /// Fails with `MalformedResponse` if the line is not JSON or not an object.
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line.trim())
            .map_err(|e| Error::MalformedResponse(format!("invalid JSON: {}", e)))?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::MalformedResponse(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The echoed identifier, if the field is present
    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    pub fn result(&self) -> Option<&Value> {
        self.0.get("result")
    }

    pub fn error(&self) -> Option<&Value> {
        self.0.get("error")
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Response {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Render an optional identifier for diagnostics, distinguishing absence from null
pub fn describe_id(id: Option<&Value>) -> String {
    match id {
        None => "NOT_PRESENT".to_string(),
        Some(value) => value.to_string(),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
