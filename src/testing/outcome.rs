//! Verdicts and outcome records
//!
//! Everything that happens during a run, including transport failures,
//! ends up here as data for the reporter.

use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::common::config::SessionMode;
use crate::protocol::Violation;

use super::config::Step;

/// Per-message verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// The server answered correctly (or correctly stayed silent)
    Pass,
    /// The server answered, but broke a checked invariant
    Fail,
    /// No trustworthy answer: timeout, malformed output, process exit, desync
    Error,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Error => "ERROR",
        })
    }
}

fn as_secs_f64<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// What happened to one message
#[derive(Debug, Clone, Serialize)]
pub struct MessageOutcome {
    pub name: String,
    pub method: Option<String>,
    pub is_notification: bool,
    /// Whether the step was written to expect a reply
    pub expects_reply: bool,
    pub verdict: Verdict,
    pub violations: Vec<Violation>,
    /// Transport and correlation diagnostics (ERROR causes, stderr excerpts)
    pub diagnostics: Vec<String>,
    pub request: Value,
    pub response: Option<Value>,
    /// The raw reply line, kept when it could not be parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(rename = "execution_time", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
}

impl MessageOutcome {
    /// A fresh outcome for a step, verdict PASS until something says otherwise
    pub fn for_step(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            method: step.message.method().map(str::to_string),
            is_notification: !step.message.is_request(),
            expects_reply: step.expectation.expects_reply,
            verdict: Verdict::Pass,
            violations: Vec::new(),
            diagnostics: Vec::new(),
            request: step.message.to_value(),
            response: None,
            raw_response: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Outcome for a step that was never sent
    pub fn not_run(step: &Step, reason: &str) -> Self {
        let mut outcome = Self::for_step(step);
        outcome.error(reason);
        outcome
    }

    /// Record an ERROR diagnostic
    pub fn error(&mut self, diagnostic: impl Into<String>) {
        self.verdict = Verdict::Error;
        self.diagnostics.push(diagnostic.into());
    }

    /// Record protocol violations; FAIL unless already ERROR
    pub fn violate(&mut self, violations: Vec<Violation>) {
        if !violations.is_empty() && self.verdict == Verdict::Pass {
            self.verdict = Verdict::Fail;
        }
        self.violations.extend(violations);
    }

    /// First line of explanation for a non-passing verdict
    pub fn summary(&self) -> Option<String> {
        if self.verdict == Verdict::Pass {
            return None;
        }
        let mut parts: Vec<String> = self.diagnostics.clone();
        parts.extend(self.violations.iter().map(ToString::to_string));
        Some(parts.join("; "))
    }
}

/// What happened to one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub mode: SessionMode,
    pub messages: Vec<MessageOutcome>,
    /// Session-level errors not attributable to a single message
    pub session_errors: Vec<String>,
    /// Output lines the server produced that no request asked for
    pub unsolicited: Vec<String>,
    /// Captured server stderr, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(rename = "execution_time", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
}

impl ScenarioOutcome {
    pub fn new(name: impl Into<String>, mode: SessionMode) -> Self {
        Self {
            name: name.into(),
            mode,
            messages: Vec::new(),
            session_errors: Vec::new(),
            unsolicited: Vec::new(),
            stderr: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Worst verdict across messages; session errors count as ERROR
    pub fn verdict(&self) -> Verdict {
        let worst = self
            .messages
            .iter()
            .map(|m| m.verdict)
            .max()
            .unwrap_or(Verdict::Pass);
        if self.session_errors.is_empty() {
            worst
        } else {
            Verdict::Error
        }
    }

    pub fn append_stderr(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match &mut self.stderr {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(text);
            }
            None => self.stderr = Some(text.to_string()),
        }
    }
}

/// Message counts across a suite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub session_errors: usize,
}

impl Totals {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteOutcome {
    pub scenarios: Vec<ScenarioOutcome>,
}

impl SuiteOutcome {
    pub fn totals(&self) -> Totals {
        let mut totals = Totals::default();
        for scenario in &self.scenarios {
            totals.session_errors += scenario.session_errors.len();
            for message in &scenario.messages {
                totals.total += 1;
                match message.verdict {
                    Verdict::Pass => totals.passed += 1,
                    Verdict::Fail => totals.failed += 1,
                    Verdict::Error => totals.errors += 1,
                }
            }
        }
        totals
    }

    /// True when nothing failed or errored anywhere
    pub fn is_success(&self) -> bool {
        let totals = self.totals();
        totals.failed == 0 && totals.errors == 0 && totals.session_errors == 0
    }
}
