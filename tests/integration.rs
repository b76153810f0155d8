//! End-to-end integration tests for the conformance harness
//!
//! These tests launch the mock MCP server binary as a real child process
//! and verify verdicts for conformant and misbehaving servers, both through
//! the library runner and through the CLI binary.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use mcp_conformance::common::config::SessionMode;
use mcp_conformance::protocol::Violation;
use mcp_conformance::testing::{builtin, Runner, Scenario, ScenarioOutcome, Step, Verdict};
use mcp_conformance::{LaunchSpec, Message};
use serde_json::json;

fn mock_server(behavior: &str) -> LaunchSpec {
    LaunchSpec::new(env!("CARGO_BIN_EXE_mock_mcp_server")).env("MOCK_MCP_BEHAVIOR", behavior)
}

fn runner(behavior: &str) -> Runner<LaunchSpec> {
    Runner::new(mock_server(behavior)).with_timeouts(Duration::from_secs(5), Duration::from_secs(30))
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn verdicts(outcome: &ScenarioOutcome) -> Vec<Verdict> {
    outcome.messages.iter().map(|m| m.verdict).collect()
}

#[tokio::test]
async fn test_standard_suite_passes_against_conformant_server() {
    let suite = runner("conformant").run_suite(&builtin::standard_suite()).await;

    for scenario in &suite.scenarios {
        for message in &scenario.messages {
            assert_eq!(
                message.verdict,
                Verdict::Pass,
                "{} / {}: {:?}",
                scenario.name,
                message.name,
                message.summary()
            );
        }
        assert!(scenario.session_errors.is_empty(), "{:?}", scenario.session_errors);
    }
    assert!(suite.is_success());
    assert_eq!(suite.totals().total, 18);
}

#[tokio::test]
async fn test_id_edge_cases_are_echoed() {
    let outcome = runner("conformant")
        .run_scenario(&builtin::protocol_checks())
        .await;

    let by_name = |name: &str| {
        outcome
            .messages
            .iter()
            .find(|m| m.name == name)
            .unwrap_or_else(|| panic!("no message named {name}"))
    };
    let empty = by_name("Initialize Protocol (Empty String ID)");
    assert_eq!(empty.response.as_ref().unwrap()["id"], "");
    let null = by_name("Initialize Protocol (Null ID)");
    assert!(null.response.as_ref().unwrap()["id"].is_null());
    let notification = by_name("Initialize Protocol (Notification - No Response Expected)");
    assert!(notification.response.is_none());
    assert_eq!(notification.verdict, Verdict::Pass);
}

#[tokio::test]
async fn test_database_workflow_against_mock() {
    let outcome = runner("conformant")
        .run_scenario(&builtin::database_workflow())
        .await;
    assert_eq!(outcome.verdict(), Verdict::Pass, "{:#?}", outcome.messages);
}

#[tokio::test]
async fn test_answered_notification_desynchronizes_session() {
    let outcome = runner("answer-notifications")
        .run_scenario(&builtin::handshake())
        .await;

    assert_eq!(
        verdicts(&outcome),
        vec![Verdict::Pass, Verdict::Pass, Verdict::Error, Verdict::Error]
    );
    assert!(outcome.messages[2].diagnostics[0].contains("desynchronized"));
    assert_eq!(outcome.verdict(), Verdict::Error);
}

#[tokio::test]
async fn test_answered_notifications_fail_in_per_request_mode() {
    let outcome = runner("answer-notifications")
        .run_scenario(&builtin::protocol_checks())
        .await;

    for message in &outcome.messages {
        if message.is_notification {
            assert_eq!(message.verdict, Verdict::Fail, "{}", message.name);
            assert!(matches!(
                message.violations[0],
                Violation::UnsolicitedReply { .. }
            ));
        } else {
            assert_eq!(message.verdict, Verdict::Pass, "{}", message.name);
        }
    }
    assert_eq!(outcome.session_errors.len(), 5);
    assert_eq!(outcome.unsolicited.len(), 5);
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let runner = Runner::new(mock_server("silent"))
        .with_timeouts(Duration::from_millis(300), Duration::from_secs(10));
    let outcome = runner.run_scenario(&builtin::handshake()).await;

    assert_eq!(outcome.messages[0].verdict, Verdict::Error);
    assert!(outcome.messages[0].diagnostics[0].contains("Timed out after 300 ms"));
    assert!(outcome.messages[1..]
        .iter()
        .all(|m| m.diagnostics[0].starts_with("Not run")));
    assert!(outcome.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn test_process_exit_is_reported_with_stderr() {
    let outcome = runner("exit-after-initialize")
        .run_scenario(&builtin::handshake())
        .await;

    assert_eq!(outcome.messages[0].verdict, Verdict::Pass);
    assert_eq!(outcome.messages[3].verdict, Verdict::Error);
    assert_eq!(outcome.verdict(), Verdict::Error);
    assert!(outcome
        .stderr
        .as_deref()
        .unwrap_or_default()
        .contains("lost connection to database"));
}

#[tokio::test]
async fn test_stringified_ids_fail_validation() {
    let outcome = runner("stringify-ids")
        .run_scenario(&builtin::handshake())
        .await;

    assert_eq!(
        verdicts(&outcome),
        vec![Verdict::Fail, Verdict::Pass, Verdict::Fail, Verdict::Fail]
    );
    assert_eq!(
        outcome.messages[0].violations,
        vec![Violation::IdMismatch {
            expected: "1".into(),
            actual: "\"1\"".into()
        }]
    );
    assert!(outcome.session_errors.is_empty());
}

#[tokio::test]
async fn test_stdout_banner_is_malformed_then_desynchronizes() {
    let outcome = runner("garbage").run_scenario(&builtin::handshake()).await;

    assert_eq!(outcome.messages[0].verdict, Verdict::Error);
    assert_eq!(
        outcome.messages[0].raw_response.as_deref(),
        Some("Mock MCP server ready")
    );
    assert_eq!(outcome.messages[1].verdict, Verdict::Pass);
    assert_eq!(outcome.messages[2].verdict, Verdict::Error);
    assert!(outcome.messages[2].diagnostics[0].contains("already answered"));
}

#[tokio::test]
async fn test_output_after_stdin_close_is_session_error() {
    let outcome = runner("extra-output")
        .run_scenario(&builtin::handshake())
        .await;

    assert!(verdicts(&outcome).iter().all(|v| *v == Verdict::Pass));
    assert_eq!(outcome.unsolicited.len(), 1);
    assert!(outcome.session_errors[0].contains("1 unsolicited line(s) after 3 expected replies"));
    assert_eq!(outcome.verdict(), Verdict::Error);
}

#[tokio::test]
async fn test_slow_reply_to_notification_is_caught_after_close() {
    let runner = Runner::new(mock_server("answer-notifications").env("MOCK_MCP_DELAY_MS", "500"))
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(30));
    let scenario = Scenario::new(
        "Late notification reply",
        vec![Step::new(
            "Initialized",
            Message::notification("notifications/initialized", json!({})),
        )],
    )
    .with_mode(SessionMode::PerRequest);

    let outcome = runner.run_scenario(&scenario).await;

    let message = &outcome.messages[0];
    assert_eq!(message.verdict, Verdict::Fail);
    assert!(matches!(
        message.violations[..],
        [Violation::UnsolicitedReply { .. }]
    ));
    assert_eq!(outcome.unsolicited.len(), 1);
}

#[tokio::test]
async fn test_deadline_expiring_midway_stops_the_run() {
    let runner = Runner::new(mock_server("conformant").env("MOCK_MCP_DELAY_MS", "600"))
        .with_timeouts(Duration::from_secs(5), Duration::from_secs(1));
    let outcome = runner.run_scenario(&builtin::handshake()).await;

    assert_eq!(outcome.messages[0].verdict, Verdict::Pass);
    assert_eq!(outcome.messages[2].verdict, Verdict::Error);
    assert!(outcome.messages[2].diagnostics[0].contains("Timed out"));
    assert!(outcome.messages[3..]
        .iter()
        .all(|m| m.verdict == Verdict::Error && m.diagnostics[0].starts_with("Not run")));
    assert!(outcome.elapsed < Duration::from_secs(3), "{:?}", outcome.elapsed);
}

#[tokio::test]
async fn test_server_that_stops_reading_cannot_outlast_deadline() {
    let runner = Runner::new(mock_server("deaf"))
        .with_timeouts(Duration::from_secs(1), Duration::from_secs(1));
    let scenario = Scenario::new(
        "Large request",
        vec![
            Step::new(
                "Query",
                Message::request(
                    1,
                    "tools/call",
                    json!({"name": "query", "arguments": {"sql": "x".repeat(1 << 20)}}),
                ),
            ),
            Step::new("List Tools", Message::request(2, "tools/list", json!({}))),
        ],
    );

    let outcome = runner.run_scenario(&scenario).await;

    assert!(verdicts(&outcome).iter().all(|v| *v == Verdict::Error));
    assert!(outcome.messages[0].diagnostics[0].contains("Timed out"));
    assert!(outcome.elapsed < Duration::from_secs(4), "{:?}", outcome.elapsed);
}

#[tokio::test]
async fn test_unsuccessful_exit_is_reported() {
    let per_request = runner("fail-on-exit")
        .run_scenario(&builtin::handshake().with_mode(SessionMode::PerRequest))
        .await;
    for message in &per_request.messages {
        assert_eq!(message.verdict, Verdict::Error, "{}", message.name);
        let diagnostic = message.diagnostics.join(" ");
        assert!(diagnostic.contains("exit status: 3"), "{diagnostic}");
        assert!(diagnostic.contains("could not flush database"), "{diagnostic}");
    }

    let session = runner("fail-on-exit").run_scenario(&builtin::handshake()).await;
    assert!(verdicts(&session).iter().all(|v| *v == Verdict::Pass));
    assert_eq!(session.session_errors.len(), 1);
    assert!(session.session_errors[0].contains("exit status: 3"));
    assert_eq!(session.verdict(), Verdict::Error);
}

#[tokio::test]
async fn test_missing_server_is_error_not_panic() {
    let runner = Runner::new(LaunchSpec::new("/definitely/not/a/server"));
    let outcome = runner.run_scenario(&builtin::handshake()).await;
    assert!(verdicts(&outcome).iter().all(|v| *v == Verdict::Error));
    assert_eq!(outcome.session_errors.len(), 1);

    let per_request = runner
        .run_scenario(&builtin::handshake().with_mode(SessionMode::PerRequest))
        .await;
    assert!(verdicts(&per_request).iter().all(|v| *v == Verdict::Error));
}

#[tokio::test]
async fn test_yaml_fixtures_pass() {
    let runner = runner("conformant");
    for name in ["handshake.yaml", "error_replies.yaml"] {
        let scenario = Scenario::load(&fixtures_dir().join(name)).unwrap();
        let outcome = runner.run_scenario(&scenario).await;
        assert_eq!(outcome.verdict(), Verdict::Pass, "{name}: {:#?}", outcome.messages);
    }
}

/// Run the CLI binary with a config file pointing at the mock server
fn run_cli(behavior: &str, args: &[&str]) -> (std::process::Output, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        format!(
            "[server]\ncommand = {:?}\n\n[server.env]\nMOCK_MCP_BEHAVIOR = {:?}\nDB_PASSWORD = \"hunter2\"\n\n[timeouts]\nmessage_secs = 5\n",
            env!("CARGO_BIN_EXE_mock_mcp_server"),
            behavior
        ),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_mcp-conformance"))
        .arg("--config")
        .arg(&config)
        .args(args)
        .env_remove("DB_PASSWORD")
        .output()
        .unwrap();
    (output, dir)
}

#[test]
fn test_cli_builtin_writes_report_and_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.json");
    let (output, _config_dir) = run_cli(
        "conformant",
        &["builtin", "--report", report.to_str().unwrap()],
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", stdout);
    assert!(stdout.contains("All tests passed!"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["failed"], 0);
    assert_eq!(json["errors"], 0);
    assert_eq!(json["scenarios"].as_array().unwrap().len(), 2);
}

#[test]
fn test_cli_exits_nonzero_on_failures() {
    let (output, _dir) = run_cli("stringify-ids", &["builtin"]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ID mismatch"));
}

#[test]
fn test_cli_run_directory() {
    let (output, _dir) = run_cli(
        "conformant",
        &["run", fixtures_dir().to_str().unwrap()],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", stdout);
    assert!(stdout.contains("Handshake"));
    assert!(stdout.contains("Error Replies"));
}

#[test]
fn test_cli_show_config_masks_secrets() {
    let (output, _dir) = run_cli("conformant", &["show-config"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("MOCK_MCP_BEHAVIOR"));
    assert!(stdout.contains("***"));
    assert!(!stdout.contains("hunter2"));
}
