//! Response validation
//!
//! `validate` is a pure function of (message, expectation, response). It
//! never fails; every problem becomes a `Violation` in the returned list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{describe_id, json_type_name, Message, Response, JSONRPC_VERSION};

/// How an `error` reply is judged for a given message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// An error reply is a violation
    #[default]
    Forbidden,
    /// Either a result or an error is fine
    Acceptable,
    /// Only an error reply passes
    Required,
}

/// What a scenario expects of the reply to one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expectation {
    pub expects_reply: bool,
    /// Dotted paths resolved from `result`
    pub required_result_fields: Vec<String>,
    pub error: ErrorPolicy,
}

impl Expectation {
    /// Default expectation for a message: reply iff it is a request, no error
    pub fn for_message(message: &Message) -> Self {
        Self {
            expects_reply: message.is_request(),
            required_result_fields: Vec::new(),
            error: ErrorPolicy::Forbidden,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_result_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_error(mut self, policy: ErrorPolicy) -> Self {
        self.error = policy;
        self
    }

    pub fn error_is_acceptable(&self) -> bool {
        matches!(self.error, ErrorPolicy::Acceptable | ErrorPolicy::Required)
    }
}

/// A checked protocol invariant the response broke
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("Missing or invalid 'jsonrpc' field (got {found})")]
    BadVersion { found: String },

    #[error("Missing 'id' field, expected {expected}")]
    IdMissing { expected: String },

    #[error("ID mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },

    #[error("Response must have either 'result' or 'error'")]
    NeitherResultNorError,

    #[error("Response cannot have both 'result' and 'error'")]
    BothResultAndError,

    #[error("Error field must be an object")]
    ErrorNotObject,

    #[error("Error object missing 'code' field")]
    ErrorCodeMissing,

    #[error("Error code must be an integer")]
    ErrorCodeNotInteger,

    #[error("Error object missing 'message' field")]
    ErrorMessageMissing,

    #[error("Error message must be a string")]
    ErrorMessageNotString,

    #[error("Unexpected error response: {code} - {message}")]
    UnexpectedError { code: String, message: String },

    #[error("Expected an error response, got a result")]
    ExpectedError,

    #[error("Missing expected field: result.{path}")]
    MissingField { path: String },

    #[error("{method} response: {detail}")]
    Shape { method: String, detail: String },

    #[error("Unexpected response for notification: {line}")]
    UnsolicitedReply { line: String },
}

/// Validate a response against the message that produced it
pub fn validate(message: &Message, expectation: &Expectation, response: &Response) -> Vec<Violation> {
    let mut violations = Vec::new();

    match response.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        other => violations.push(Violation::BadVersion {
            found: describe_id(other),
        }),
    }

    if let Some(expected) = message.id() {
        match response.id() {
            None => violations.push(Violation::IdMissing {
                expected: expected.to_string(),
            }),
            Some(actual) if actual != expected => violations.push(Violation::IdMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
            Some(_) => {}
        }
    }

    let result = response.result();
    let error = response.error();
    match (result, error) {
        (None, None) => violations.push(Violation::NeitherResultNorError),
        (Some(_), Some(_)) => violations.push(Violation::BothResultAndError),
        _ => {}
    }

    if let Some(error) = error {
        check_error_object(error, expectation, &mut violations);
    }

    if let Some(result) = result {
        if expectation.error == ErrorPolicy::Required {
            violations.push(Violation::ExpectedError);
        }

        for path in &expectation.required_result_fields {
            if resolve_path(result, path).is_none() {
                violations.push(Violation::MissingField { path: path.clone() });
            }
        }

        if let Some(method) = message.method() {
            check_shape(method, result, &mut violations);
        }
    }

    violations
}

fn check_error_object(error: &Value, expectation: &Expectation, out: &mut Vec<Violation>) {
    let Some(obj) = error.as_object() else {
        out.push(Violation::ErrorNotObject);
        if !expectation.error_is_acceptable() {
            out.push(Violation::UnexpectedError {
                code: "?".to_string(),
                message: error.to_string(),
            });
        }
        return;
    };

    match obj.get("code") {
        None => out.push(Violation::ErrorCodeMissing),
        Some(code) if !(code.is_i64() || code.is_u64()) => out.push(Violation::ErrorCodeNotInteger),
        Some(_) => {}
    }

    match obj.get("message") {
        None => out.push(Violation::ErrorMessageMissing),
        Some(message) if !message.is_string() => out.push(Violation::ErrorMessageNotString),
        Some(_) => {}
    }

    if !expectation.error_is_acceptable() {
        out.push(Violation::UnexpectedError {
            code: obj
                .get("code")
                .map(Value::to_string)
                .unwrap_or_else(|| "?".to_string()),
            message: obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message")
                .to_string(),
        });
    }
}

/// Resolve a dot-separated path through nested objects
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |current, part| current.as_object()?.get(part))
}

/// Method families with protocol-specific result shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodFamily {
    Initialize,
    ToolsList,
    ToolsCall,
    ResourcesList,
    ResourcesRead,
    PromptsList,
}

impl MethodFamily {
    fn from_method(method: &str) -> Option<Self> {
        match method {
            "initialize" => Some(Self::Initialize),
            "tools/list" => Some(Self::ToolsList),
            "tools/call" => Some(Self::ToolsCall),
            "resources/list" => Some(Self::ResourcesList),
            "resources/read" => Some(Self::ResourcesRead),
            "prompts/list" => Some(Self::PromptsList),
            _ => None,
        }
    }
}

fn check_shape(method: &str, result: &Value, out: &mut Vec<Violation>) {
    let Some(family) = MethodFamily::from_method(method) else {
        return;
    };
    let mut shape = |detail: String| {
        out.push(Violation::Shape {
            method: method.to_string(),
            detail,
        })
    };

    let Some(result) = result.as_object() else {
        shape(format!("result must be an object, got {}", json_type_name(result)));
        return;
    };

    match family {
        MethodFamily::Initialize => {
            for field in ["protocolVersion", "capabilities", "serverInfo"] {
                if !result.contains_key(field) {
                    shape(format!("missing '{}'", field));
                }
            }
            if let Some(caps) = result.get("capabilities") {
                if !caps.is_object() {
                    shape("'capabilities' must be an object".to_string());
                }
            }
        }
        MethodFamily::ToolsList => check_listing(result, "tools", &["name", "description"], &mut shape),
        MethodFamily::ResourcesList => check_listing(result, "resources", &["uri", "name"], &mut shape),
        MethodFamily::PromptsList => check_listing(result, "prompts", &["name"], &mut shape),
        MethodFamily::ToolsCall => {
            check_array(result, "content", &mut shape);
        }
        MethodFamily::ResourcesRead => {
            check_array(result, "contents", &mut shape);
        }
    }
}

fn check_array<'a>(
    result: &'a serde_json::Map<String, Value>,
    key: &str,
    shape: &mut impl FnMut(String),
) -> Option<&'a Vec<Value>> {
    match result.get(key) {
        None => {
            shape(format!("missing '{}' array", key));
            None
        }
        Some(Value::Array(items)) => Some(items),
        Some(_) => {
            shape(format!("'{}' must be an array", key));
            None
        }
    }
}

fn check_listing(
    result: &serde_json::Map<String, Value>,
    key: &str,
    required: &[&str],
    shape: &mut impl FnMut(String),
) {
    let Some(items) = check_array(result, key, &mut *shape) else {
        return;
    };
    for (i, item) in items.iter().enumerate() {
        let Some(item) = item.as_object() else {
            shape(format!("{}[{}] must be an object", key, i));
            continue;
        };
        for field in required {
            if !item.contains_key(*field) {
                shape(format!("{}[{}] missing '{}'", key, i, field));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> Response {
        match value {
            Value::Object(map) => Response::from(map),
            _ => panic!("test responses must be objects"),
        }
    }

    fn init_message(id: Value) -> Message {
        Message::request(
            id,
            "initialize",
            json!({"protocolVersion": "2024-11-05", "capabilities": {}}),
        )
    }

    fn init_result() -> Value {
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "db", "version": "1.0.0"}
        })
    }

    #[test]
    fn test_well_formed_initialize_has_no_violations() {
        let msg = init_message(json!(1));
        let exp = Expectation::for_message(&msg)
            .with_fields(["protocolVersion", "capabilities", "serverInfo.name"]);
        let resp = response(json!({"jsonrpc": "2.0", "id": 1, "result": init_result()}));

        assert!(validate(&msg, &exp, &resp).is_empty());
    }

    #[test]
    fn test_validate_is_idempotent() {
        let msg = init_message(json!(1));
        let exp = Expectation::for_message(&msg).with_fields(["missing.deep"]);
        let resp = response(json!({"jsonrpc": "1.0", "id": "1", "result": {}}));

        let first = validate(&msg, &exp, &resp);
        let second = validate(&msg, &exp, &resp);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_bad_version() {
        let msg = init_message(json!(1));
        let exp = Expectation::for_message(&msg);
        let resp = response(json!({"id": 1, "result": init_result()}));

        assert_eq!(
            validate(&msg, &exp, &resp),
            vec![Violation::BadVersion {
                found: "NOT_PRESENT".into()
            }]
        );
    }

    #[test]
    fn test_id_equality_is_type_strict() {
        let msg = init_message(json!(1));
        let exp = Expectation::for_message(&msg);
        let resp = response(json!({"jsonrpc": "2.0", "id": "1", "result": init_result()}));

        assert_eq!(
            validate(&msg, &exp, &resp),
            vec![Violation::IdMismatch {
                expected: "1".into(),
                actual: "\"1\"".into()
            }]
        );
    }

    #[test]
    fn test_null_and_empty_ids_must_be_echoed() {
        for id in [Value::Null, json!("")] {
            let msg = init_message(id.clone());
            let exp = Expectation::for_message(&msg);

            let echoed = response(json!({"jsonrpc": "2.0", "id": id, "result": init_result()}));
            assert!(validate(&msg, &exp, &echoed).is_empty());

            let missing = response(json!({"jsonrpc": "2.0", "result": init_result()}));
            assert!(matches!(
                validate(&msg, &exp, &missing).as_slice(),
                [Violation::IdMissing { .. }]
            ));
        }

        let msg = init_message(Value::Null);
        let exp = Expectation::for_message(&msg);
        let resp = response(json!({"jsonrpc": "2.0", "id": "", "result": init_result()}));
        assert!(matches!(
            validate(&msg, &exp, &resp).as_slice(),
            [Violation::IdMismatch { .. }]
        ));
    }

    #[test]
    fn test_result_error_exclusivity() {
        let msg = Message::request(3, "ping", json!({}));
        let exp = Expectation::for_message(&msg).with_error(ErrorPolicy::Acceptable);

        let neither = response(json!({"jsonrpc": "2.0", "id": 3}));
        assert_eq!(
            validate(&msg, &exp, &neither),
            vec![Violation::NeitherResultNorError]
        );

        let both = response(json!({
            "jsonrpc": "2.0", "id": 3,
            "result": {}, "error": {"code": -32603, "message": "x"}
        }));
        assert_eq!(validate(&msg, &exp, &both), vec![Violation::BothResultAndError]);
    }

    #[test]
    fn test_error_object_structure() {
        let msg = Message::request(5, "invalid/method", json!({}));
        let exp = Expectation::for_message(&msg).with_error(ErrorPolicy::Required);

        let good = response(json!({
            "jsonrpc": "2.0", "id": 5,
            "error": {"code": -32601, "message": "Method not found"}
        }));
        assert!(validate(&msg, &exp, &good).is_empty());

        let bad = response(json!({
            "jsonrpc": "2.0", "id": 5,
            "error": {"code": "-32601", "message": 7}
        }));
        assert_eq!(
            validate(&msg, &exp, &bad),
            vec![Violation::ErrorCodeNotInteger, Violation::ErrorMessageNotString]
        );

        let empty = response(json!({"jsonrpc": "2.0", "id": 5, "error": {}}));
        assert_eq!(
            validate(&msg, &exp, &empty),
            vec![Violation::ErrorCodeMissing, Violation::ErrorMessageMissing]
        );

        let not_object = response(json!({"jsonrpc": "2.0", "id": 5, "error": "boom"}));
        assert_eq!(validate(&msg, &exp, &not_object), vec![Violation::ErrorNotObject]);
    }

    #[test]
    fn test_error_policy() {
        let msg = Message::request(6, "tools/call", json!({"name": "query"}));
        let err = response(json!({
            "jsonrpc": "2.0", "id": 6,
            "error": {"code": -32602, "message": "SQL must not be empty"}
        }));

        let forbidden = Expectation::for_message(&msg);
        assert_eq!(
            validate(&msg, &forbidden, &err),
            vec![Violation::UnexpectedError {
                code: "-32602".into(),
                message: "SQL must not be empty".into()
            }]
        );

        let required = Expectation::for_message(&msg).with_error(ErrorPolicy::Required);
        let ok = response(json!({"jsonrpc": "2.0", "id": 6, "result": {"content": []}}));
        assert_eq!(validate(&msg, &required, &ok), vec![Violation::ExpectedError]);

        let acceptable = Expectation::for_message(&msg).with_error(ErrorPolicy::Acceptable);
        assert!(validate(&msg, &acceptable, &ok).is_empty());
        assert!(validate(&msg, &acceptable, &err).is_empty());
    }

    #[test]
    fn test_all_missing_fields_reported() {
        let msg = Message::request(2, "custom/thing", json!({}));
        let exp = Expectation::for_message(&msg).with_fields(["a", "b.c", "present", "present.x"]);
        let resp = response(json!({"jsonrpc": "2.0", "id": 2, "result": {"present": 1}}));

        assert_eq!(
            validate(&msg, &exp, &resp),
            vec![
                Violation::MissingField { path: "a".into() },
                Violation::MissingField { path: "b.c".into() },
                Violation::MissingField {
                    path: "present.x".into()
                },
            ]
        );
    }

    #[test]
    fn test_initialize_shape() {
        let msg = init_message(json!(1));
        let exp = Expectation::for_message(&msg);
        let resp = response(json!({
            "jsonrpc": "2.0", "id": 1,
            "result": {"protocolVersion": "2024-11-05", "capabilities": []}
        }));

        let details: Vec<String> = validate(&msg, &exp, &resp)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            details,
            vec![
                "initialize response: missing 'serverInfo'",
                "initialize response: 'capabilities' must be an object",
            ]
        );
    }

    #[test]
    fn test_tools_list_shape() {
        let msg = Message::request(2, "tools/list", json!({}));
        let exp = Expectation::for_message(&msg);

        let good = response(json!({
            "jsonrpc": "2.0", "id": 2,
            "result": {"tools": [{"name": "query", "description": "Run SQL"}]}
        }));
        assert!(validate(&msg, &exp, &good).is_empty());

        let bad = response(json!({
            "jsonrpc": "2.0", "id": 2,
            "result": {"tools": [{"name": "query"}, "oops"]}
        }));
        let details: Vec<String> = validate(&msg, &exp, &bad)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            details,
            vec![
                "tools/list response: tools[0] missing 'description'",
                "tools/list response: tools[1] must be an object",
            ]
        );

        let not_array = response(json!({"jsonrpc": "2.0", "id": 2, "result": {"tools": {}}}));
        assert_eq!(
            validate(&msg, &exp, &not_array),
            vec![Violation::Shape {
                method: "tools/list".into(),
                detail: "'tools' must be an array".into()
            }]
        );
    }

    #[test]
    fn test_tools_call_and_resources_shapes() {
        let call = Message::request(4, "tools/call", json!({"name": "query"}));
        let exp = Expectation::for_message(&call);
        let resp = response(json!({"jsonrpc": "2.0", "id": 4, "result": {"isError": false}}));
        assert_eq!(
            validate(&call, &exp, &resp),
            vec![Violation::Shape {
                method: "tools/call".into(),
                detail: "missing 'content' array".into()
            }]
        );

        let read = Message::request(7, "resources/read", json!({"uri": "database://info"}));
        let exp = Expectation::for_message(&read);
        let resp = response(json!({"jsonrpc": "2.0", "id": 7, "result": {"contents": []}}));
        assert!(validate(&read, &exp, &resp).is_empty());

        let list = Message::request(3, "resources/list", json!({}));
        let exp = Expectation::for_message(&list);
        let resp = response(json!({
            "jsonrpc": "2.0", "id": 3,
            "result": {"resources": [{"uri": "database://info"}]}
        }));
        assert_eq!(
            validate(&list, &exp, &resp),
            vec![Violation::Shape {
                method: "resources/list".into(),
                detail: "resources[0] missing 'name'".into()
            }]
        );
    }

    #[test]
    fn test_shape_rules_skip_error_replies() {
        let msg = init_message(json!(1));
        let exp = Expectation::for_message(&msg).with_error(ErrorPolicy::Acceptable);
        let resp = response(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": {"code": -32600, "message": "Invalid Request"}
        }));
        assert!(validate(&msg, &exp, &resp).is_empty());
    }

    #[test]
    fn test_resolve_path() {
        let value = json!({"a": {"b": {"c": 0}}, "list": [1]});
        assert_eq!(resolve_path(&value, "a.b.c"), Some(&json!(0)));
        assert!(resolve_path(&value, "a.x").is_none());
        assert!(resolve_path(&value, "list.0").is_none());
    }
}
