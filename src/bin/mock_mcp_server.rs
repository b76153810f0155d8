//! Mock MCP server binary for integration testing
//!
//! Speaks newline-delimited JSON-RPC 2.0 on stdin/stdout. `MOCK_MCP_BEHAVIOR`
//! selects a conformant server or one of several deliberate misbehaviors,
//! and `MOCK_MCP_DELAY_MS` delays every reply.

use serde_json::{json, Map, Value};
use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Conformant,
    /// Replies to notifications with `id: null`
    AnswerNotifications,
    /// Reads everything, never writes
    Silent,
    /// Answers `initialize`, then exits with an error on stderr
    ExitAfterInitialize,
    /// Echoes numeric ids back as strings
    StringifyIds,
    /// Prints a non-JSON banner on stdout before the first reply
    Garbage,
    /// Prints one unsolicited line once stdin closes
    ExtraOutput,
    /// Answers normally, then exits with status 3 once stdin closes
    FailOnExit,
    /// Never reads stdin, so writes to it eventually block
    Deaf,
}

impl Behavior {
    fn from_env() -> Self {
        match std::env::var("MOCK_MCP_BEHAVIOR").as_deref() {
            Ok("answer-notifications") => Self::AnswerNotifications,
            Ok("silent") => Self::Silent,
            Ok("exit-after-initialize") => Self::ExitAfterInitialize,
            Ok("stringify-ids") => Self::StringifyIds,
            Ok("garbage") => Self::Garbage,
            Ok("extra-output") => Self::ExtraOutput,
            Ok("fail-on-exit") => Self::FailOnExit,
            Ok("deaf") => Self::Deaf,
            _ => Self::Conformant,
        }
    }
}

fn main() {
    let behavior = Behavior::from_env();
    let delay = std::env::var("MOCK_MCP_DELAY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis);

    eprintln!("Starting mock MCP server ({:?})", behavior);
    if behavior == Behavior::Deaf {
        std::thread::sleep(Duration::from_secs(10));
        return;
    }

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();
    let mut banner_pending = behavior == Behavior::Garbage;

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(message)) => handle(&message, behavior),
            Ok(_) | Err(_) => Some(error_reply(Value::Null, -32700, "Parse error")),
        };

        if behavior == Behavior::Silent {
            continue;
        }
        let Some(reply) = reply else {
            continue;
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if banner_pending {
            writeln!(writer, "Mock MCP server ready").ok();
            banner_pending = false;
        }
        send(&mut writer, &reply);

        if behavior == Behavior::ExitAfterInitialize {
            eprintln!("fatal: lost connection to database");
            std::process::exit(3);
        }
    }

    if behavior == Behavior::ExtraOutput {
        send(
            &mut writer,
            &json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {"level": "info", "data": "bye"}}),
        );
    }
    if behavior == Behavior::FailOnExit {
        eprintln!("fatal: could not flush database on shutdown");
        std::process::exit(3);
    }
    eprintln!("Mock MCP server stopped");
}

fn send<W: Write>(writer: &mut W, message: &Value) {
    if let Ok(text) = serde_json::to_string(message) {
        writeln!(writer, "{}", text).ok();
        writer.flush().ok();
    }
}

/// Produce the reply for one message, if any
fn handle(message: &Map<String, Value>, behavior: Behavior) -> Option<Value> {
    let id = match message.get("id") {
        Some(id) => id.clone(),
        None if behavior == Behavior::AnswerNotifications => Value::Null,
        None => return None,
    };
    let id = match (behavior, id) {
        (Behavior::StringifyIds, Value::Number(n)) => Value::String(n.to_string()),
        (_, id) => id,
    };

    let method = message.get("method").and_then(Value::as_str).unwrap_or("");
    let params = message.get("params").cloned().unwrap_or_else(|| json!({}));

    let outcome = match method {
        "initialize" => Ok(json!({
            "protocolVersion": params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or("2024-11-05"),
            "capabilities": {"tools": {}, "resources": {}},
            "serverInfo": {"name": "mock-mcp-server", "version": env!("CARGO_PKG_VERSION")}
        })),
        "ping" => Ok(json!({})),
        m if m.starts_with("notifications/") => Ok(json!({})),
        "tools/list" => Ok(json!({
            "tools": [{
                "name": "query",
                "description": "Execute a SQL query",
                "inputSchema": {
                    "type": "object",
                    "properties": {"sql": {"type": "string"}, "maxRows": {"type": "integer"}},
                    "required": ["sql"]
                }
            }]
        })),
        "resources/list" => Ok(json!({
            "resources": [{
                "uri": "database://info",
                "name": "Database Info",
                "mimeType": "text/plain"
            }]
        })),
        "resources/read" => read_resource(&params),
        "tools/call" => call_tool(&params),
        _ => Err((-32601, "Method not found".to_string())),
    };

    Some(match outcome {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err((code, text)) => error_reply(id, code, &text),
    })
}

fn read_resource(params: &Value) -> Result<Value, (i64, String)> {
    let uri = params.get("uri").and_then(Value::as_str).unwrap_or("");
    let text = if uri == "database://info" {
        "Database: mock\nDriver: none".to_string()
    } else if let Some(table) = uri.strip_prefix("database://table/") {
        format!("Table: {}\nColumns: ID, NAME, CREATED_DATE", table)
    } else {
        return Err((-32602, format!("Unknown resource: {}", uri)));
    };
    Ok(json!({"contents": [{"uri": uri, "mimeType": "text/plain", "text": text}]}))
}

fn call_tool(params: &Value) -> Result<Value, (i64, String)> {
    match params.get("name").and_then(Value::as_str) {
        Some("query") => {}
        Some(other) => return Err((-32602, format!("Unknown tool: {}", other))),
        None => return Err((-32602, "Missing tool name".to_string())),
    }
    let sql = params
        .pointer("/arguments/sql")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim();
    if sql.is_empty() {
        return Err((-32602, "SQL query cannot be empty".to_string()));
    }
    Ok(json!({
        "content": [{"type": "text", "text": format!("Executed: {}", sql)}],
        "isError": false
    }))
}

fn error_reply(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}
