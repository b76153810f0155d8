//! Built-in scenarios
//!
//! The standard suite exercises the basic MCP surface plus the id edge
//! cases: numeric, empty-string and null ids, and a notification twin for
//! every request.

use serde_json::{json, Value};

use crate::common::config::SessionMode;
use crate::protocol::{ErrorPolicy, Message};

use super::config::{Scenario, Step};

const PROTOCOL_VERSION: &str = "2024-11-05";

fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "mcp-conformance",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn query_params(sql: &str) -> Value {
    json!({
        "name": "query",
        "arguments": {
            "sql": sql,
            "maxRows": 10
        }
    })
}

/// Request step plus its notification twin, which must get no reply
fn with_notification(name: &str, id: impl Into<Value>, method: &str, params: Value) -> [Step; 2] {
    [
        Step::new(name, Message::request(id, method, params.clone())),
        Step::new(
            format!("{} (Notification - No Response Expected)", name),
            Message::notification(method, params),
        ),
    ]
}

/// Standard protocol checks, each message against a fresh server process
pub fn protocol_checks() -> Scenario {
    let [initialize, initialize_notification] =
        with_notification("Initialize Protocol", 1, "initialize", initialize_params());
    let [list_tools, list_tools_notification] =
        with_notification("List Tools", 2, "tools/list", json!({}));
    let [call_query, call_query_notification] = with_notification(
        "Call Query Tool",
        4,
        "tools/call",
        query_params("SELECT 1 as test_value, 'Hello' as message"),
    );
    let [invalid_method, invalid_method_notification] =
        with_notification("Invalid Method (Error Test)", 5, "invalid/method", json!({}));
    let [read_info, read_info_notification] = with_notification(
        "Read Database Info Resource",
        7,
        "resources/read",
        json!({"uri": "database://info"}),
    );

    let steps = vec![
        initialize.expect_fields(["protocolVersion", "capabilities", "serverInfo"]),
        initialize_notification,
        Step::new(
            "Initialize Protocol (Empty String ID)",
            Message::request("", "initialize", initialize_params()),
        ),
        Step::new(
            "Initialize Protocol (Null ID)",
            Message::request(Value::Null, "initialize", initialize_params()),
        ),
        list_tools.expect_fields(["tools"]),
        list_tools_notification,
        Step::new("List Resources", Message::request(3, "resources/list", json!({})))
            .expect_fields(["resources"]),
        call_query.expect_fields(["content"]),
        call_query_notification,
        invalid_method.expect_error(ErrorPolicy::Required),
        Step::new(
            "Invalid Method (Notification - No Response Expected)",
            invalid_method_notification.message,
        ),
        Step::new(
            "Empty SQL Query (Error Test)",
            Message::request(6, "tools/call", query_params("")),
        )
        .expect_error(ErrorPolicy::Required),
        read_info.expect_fields(["contents"]),
        read_info_notification,
    ];

    Scenario::new("MCP Protocol Compliance", steps)
        .with_mode(SessionMode::PerRequest)
        .with_description("Request/notification pairs, id echo and error replies, one process per message")
}

/// The usual client handshake over one persistent session
pub fn handshake() -> Scenario {
    let steps = vec![
        Step::new("Initialize", Message::request(1, "initialize", initialize_params()))
            .expect_fields(["protocolVersion", "capabilities", "serverInfo"]),
        Step::new(
            "Initialized",
            Message::notification("notifications/initialized", json!({})),
        ),
        Step::new("List Tools", Message::request(2, "tools/list", json!({}))).expect_fields(["tools"]),
        Step::new("List Resources", Message::request(3, "resources/list", json!({})))
            .expect_fields(["resources"]),
    ];

    Scenario::new("MCP Session Handshake", steps)
        .with_mode(SessionMode::Session)
        .with_description("initialize, initialized notification, then listings on one process")
}

/// Create, fill, query and drop a table through the `query` tool
///
/// Only meaningful for database-backed servers, so it is not part of the
/// standard suite.
pub fn database_workflow() -> Scenario {
    let steps = vec![
        Step::new("Initialize Server", Message::request(1, "initialize", initialize_params()))
            .expect_fields(["protocolVersion", "capabilities", "serverInfo"]),
        Step::new(
            "Initialized",
            Message::notification("notifications/initialized", json!({})),
        ),
        Step::new("List Tools", Message::request(2, "tools/list", json!({}))).expect_fields(["tools"]),
        Step::new("List Resources", Message::request(3, "resources/list", json!({})))
            .expect_fields(["resources"]),
        Step::new(
            "Read Database Info",
            Message::request(4, "resources/read", json!({"uri": "database://info"})),
        )
        .expect_fields(["contents"]),
        Step::new(
            "Create Test Table",
            Message::request(
                5,
                "tools/call",
                query_params("CREATE TABLE test_table (id INT PRIMARY KEY, name VARCHAR(50), created_date DATE)"),
            ),
        )
        .expect_fields(["content"]),
        Step::new(
            "Insert Test Data",
            Message::request(
                6,
                "tools/call",
                query_params(
                    "INSERT INTO test_table VALUES (1, 'John Doe', '2024-01-01'), (2, 'Jane Smith', '2024-01-02')",
                ),
            ),
        )
        .expect_fields(["content"]),
        Step::new(
            "Query Test Data",
            Message::request(7, "tools/call", query_params("SELECT * FROM test_table ORDER BY id")),
        )
        .expect_fields(["content"]),
        Step::new(
            "Read Test Table Metadata",
            Message::request(
                8,
                "resources/read",
                json!({"uri": "database://table/TEST_TABLE"}),
            ),
        )
        .expect_fields(["contents"]),
        Step::new(
            "Drop Test Table",
            Message::request(9, "tools/call", query_params("DROP TABLE IF EXISTS test_table")),
        )
        .expect_error(ErrorPolicy::Acceptable),
    ];

    Scenario::new("Database Workflow", steps)
        .with_mode(SessionMode::Session)
        .with_description("DDL, DML and metadata reads through the query tool on one session")
}

/// The standard suite
pub fn standard_suite() -> Vec<Scenario> {
    vec![protocol_checks(), handshake()]
}
