//! Console and JSON reporting
//!
//! Console output goes to stdout; logs stay on stderr.

use std::fmt::Write as _;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

use crate::common::{Error, Result};
use crate::protocol::describe_id;

use super::outcome::{MessageOutcome, ScenarioOutcome, SuiteOutcome, Totals, Verdict};

/// JSON report layout: totals followed by every scenario
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    #[serde(flatten)]
    pub totals: Totals,
    pub success_rate: f64,
    pub scenarios: &'a [ScenarioOutcome],
}

impl<'a> Report<'a> {
    pub fn new(suite: &'a SuiteOutcome) -> Self {
        let totals = suite.totals();
        Self {
            totals,
            success_rate: totals.success_rate(),
            scenarios: &suite.scenarios,
        }
    }
}

/// Write the JSON report, pretty-printed
pub fn save_json(suite: &SuiteOutcome, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&Report::new(suite))?;
    std::fs::write(path, json).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    tracing::debug!(path = %path.display(), "Report written");
    Ok(())
}

fn verdict_mark(verdict: Verdict) -> String {
    match verdict {
        Verdict::Pass => format!("{} {}", "✓".green(), "PASS".green()),
        Verdict::Fail => format!("{} {}", "✗".red(), "FAIL".red()),
        Verdict::Error => format!("{} {}", "!".red().bold(), "ERROR".red().bold()),
    }
}

/// Short description of what came back for a passing message
fn response_summary(message: &MessageOutcome) -> Option<String> {
    let response = message.response.as_ref()?;
    if response.get("result").is_some() {
        return Some("Success".to_string());
    }
    let error = response.get("error")?;
    let code = error
        .get("code")
        .map(Value::to_string)
        .unwrap_or_else(|| "unknown".to_string());
    let text = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("no message");
    Some(format!("Error {} - {}", code, text))
}

/// Render one scenario's results
pub fn render_scenario(scenario: &ScenarioOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n{} {} {}",
        "Scenario:".blue().bold(),
        scenario.name.white().bold(),
        format!("({:?}, {:.2}s)", scenario.mode, scenario.elapsed.as_secs_f64()).dimmed()
    );

    let count = scenario.messages.len();
    for (i, message) in scenario.messages.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {} [{}/{}] {} {}",
            verdict_mark(message.verdict),
            i + 1,
            count,
            message.name,
            format!("({:.2}s)", message.elapsed.as_secs_f64()).dimmed()
        );

        if let Some(summary) = message.summary() {
            let _ = writeln!(out, "       {}", summary.red());
        } else if message.is_notification {
            let _ = writeln!(out, "       {}", "Response: none (notification)".dimmed());
        } else if let Some(summary) = response_summary(message) {
            let _ = writeln!(out, "       {}", format!("Response: {}", summary).dimmed());
        }

        if let Some(response) = &message.response {
            let _ = writeln!(
                out,
                "       {}",
                format!(
                    "ID: request={}, response={}",
                    describe_id(message.request.get("id")),
                    describe_id(response.get("id"))
                )
                .dimmed()
            );
        }
    }

    for error in &scenario.session_errors {
        let _ = writeln!(out, "  {} {}", "!".red().bold(), error.red());
    }
    if scenario.verdict() != Verdict::Pass {
        if let Some(stderr) = &scenario.stderr {
            let _ = writeln!(out, "  {}", "Server stderr:".yellow());
            for line in stderr.lines().rev().take(10).collect::<Vec<_>>().into_iter().rev() {
                let _ = writeln!(out, "    {}", line.dimmed());
            }
        }
    }
    out
}

/// Render totals, failure details and notification handling
pub fn render_summary(suite: &SuiteOutcome) -> String {
    let totals = suite.totals();
    let mut out = String::new();
    let rule = "=".repeat(50);

    let _ = writeln!(out, "\n{}", "Test Results Summary".bold());
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Total messages: {}", totals.total);
    let _ = writeln!(out, "{} Passed: {}", "✓".green(), totals.passed);
    let _ = writeln!(out, "{} Failed: {}", "✗".red(), totals.failed);
    let _ = writeln!(out, "{} Errors: {}", "!".red().bold(), totals.errors);
    if totals.session_errors > 0 {
        let _ = writeln!(out, "{} Session errors: {}", "!".red().bold(), totals.session_errors);
    }
    let _ = writeln!(out, "Success rate: {:.1}%", totals.success_rate());

    let failures: Vec<(&str, &MessageOutcome)> = suite
        .scenarios
        .iter()
        .flat_map(|s| s.messages.iter().map(move |m| (s.name.as_str(), m)))
        .filter(|(_, m)| m.verdict != Verdict::Pass)
        .collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "\n{}", "Failed/Error details:".yellow());
        let _ = writeln!(out, "{}", "-".repeat(30));
        for (scenario, message) in failures {
            let _ = writeln!(
                out,
                "{} [{}] {}: {}",
                "✗".red(),
                scenario,
                message.name,
                message.summary().unwrap_or_default()
            );
        }
    }

    let notifications: Vec<&MessageOutcome> = suite
        .scenarios
        .iter()
        .flat_map(|s| s.messages.iter())
        .filter(|m| m.is_notification)
        .collect();
    if !notifications.is_empty() {
        let _ = writeln!(out, "\n{}", "Notification handling:".cyan());
        let _ = writeln!(out, "{}", "-".repeat(30));
        for message in notifications {
            let mark = if message.verdict == Verdict::Pass {
                "✓".green()
            } else {
                "✗".red()
            };
            let _ = writeln!(out, "{} {}", mark, message.name);
            if !message.violations.is_empty() {
                let _ = writeln!(out, "    {}", "Unexpected response for notification".red());
            }
        }
    }

    out
}

pub fn print_scenario(scenario: &ScenarioOutcome) {
    print!("{}", render_scenario(scenario));
}

pub fn print_summary(suite: &SuiteOutcome) {
    print!("{}", render_summary(suite));
    if suite.is_success() {
        println!("\n{} {}", "✓".green().bold(), "All tests passed!".green().bold());
    }
}
