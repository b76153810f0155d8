//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios and
//! turning them into runnable `Scenario`s.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::config::SessionMode;
use crate::common::{Error, Result};
use crate::protocol::{ErrorPolicy, Expectation, Message};

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Session mode override for this scenario
    pub mode: Option<SessionMode>,
    /// Scenario deadline override in seconds
    pub timeout_secs: Option<u64>,
    /// The messages to send, in order
    pub steps: Vec<StepFile>,
}

/// A single message and what is expected of its reply
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct StepFile {
    /// Display name (defaults to the method name)
    pub name: Option<String>,
    /// The raw JSON-RPC message, sent verbatim
    pub send: serde_json::Value,
    /// Expectations for the reply
    #[serde(default)]
    pub expect: ExpectFile,
}

/// Expectations for a reply
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ExpectFile {
    /// Whether a reply is expected; must agree with `id` presence
    pub reply: Option<bool>,
    /// Dotted paths that must exist under `result`
    #[serde(default)]
    pub result_fields: Vec<String>,
    /// How an error reply is judged
    #[serde(default)]
    pub error: ErrorPolicy,
}

/// A runnable scenario
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    /// `None` uses the runner's default mode
    pub mode: Option<SessionMode>,
    /// `None` uses the runner's default deadline
    pub timeout: Option<Duration>,
    pub steps: Vec<Step>,
}

/// One message of a scenario with its expectation
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub message: Message,
    pub expectation: Expectation,
}

impl Step {
    /// Step with the default expectation for its message
    pub fn new(name: impl Into<String>, message: Message) -> Self {
        let expectation = Expectation::for_message(&message);
        Self {
            name: name.into(),
            message,
            expectation,
        }
    }

    pub fn expect_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expectation = self.expectation.with_fields(fields);
        self
    }

    pub fn expect_error(mut self, policy: ErrorPolicy) -> Self {
        self.expectation = self.expectation.with_error(policy);
        self
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: None,
            mode: None,
            timeout: None,
            steps,
        }
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Load a scenario from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            Error::Config(reason) => Error::scenario_parse(path, reason),
            Error::Yaml(err) => Error::scenario_parse(path, err.to_string()),
            other => other,
        })
    }

    /// Parse a scenario from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: ScenarioFile = serde_yaml::from_str(content)?;
        Self::try_from(file)
    }
}

impl TryFrom<ScenarioFile> for Scenario {
    type Error = Error;

    fn try_from(file: ScenarioFile) -> Result<Self> {
        if file.steps.is_empty() {
            return Err(Error::Config(format!("scenario '{}' has no steps", file.name)));
        }

        let steps = file
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| step_from_file(i + 1, step))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: file.name,
            description: file.description,
            mode: file.mode,
            timeout: file.timeout_secs.map(Duration::from_secs),
            steps,
        })
    }
}

fn step_from_file(number: usize, step: StepFile) -> Result<Step> {
    let message = Message::from_value(step.send)
        .map_err(|e| Error::Config(format!("step {}: {}", number, e)))?;

    let is_request = message.is_request();
    if let Some(reply) = step.expect.reply {
        if reply != is_request {
            return Err(Error::Config(format!(
                "step {}: expect.reply = {} contradicts the message, which {} an 'id' field",
                number,
                reply,
                if is_request { "has" } else { "has no" }
            )));
        }
    }
    if !is_request && (!step.expect.result_fields.is_empty() || step.expect.error != ErrorPolicy::Forbidden) {
        return Err(Error::Config(format!(
            "step {}: a notification (no 'id') gets no reply, so it cannot have reply expectations",
            number
        )));
    }

    let name = step.name.unwrap_or_else(|| {
        let method = message.method().unwrap_or("<no method>");
        if is_request {
            method.to_string()
        } else {
            format!("{} (notification)", method)
        }
    });

    Ok(Step::new(name, message)
        .expect_fields(step.expect.result_fields)
        .expect_error(step.expect.error))
}

/// Expand files and directories into a sorted list of scenario files
pub fn collect_scenario_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && matches!(
                            p.extension().and_then(|e| e.to_str()),
                            Some("yaml") | Some("yml")
                        )
                })
                .collect();
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(Error::FileRead {
                path: path.display().to_string(),
                error: "no such file or directory".to_string(),
            });
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const HANDSHAKE: &str = r#"
name: Handshake
description: initialize then list tools
mode: session
timeout_secs: 10
steps:
  - name: Initialize
    send:
      jsonrpc: "2.0"
      id: 1
      method: initialize
      params:
        protocolVersion: "2024-11-05"
        capabilities: {}
        clientInfo: { name: test-client, version: "1.0.0" }
    expect:
      result_fields: [protocolVersion, capabilities, serverInfo]
  - send: { jsonrpc: "2.0", method: notifications/initialized }
  - send: { jsonrpc: "2.0", id: null, method: tools/list, params: {} }
    expect:
      reply: true
  - send: { jsonrpc: "2.0", id: 5, method: invalid/method, params: {} }
    expect:
      error: required
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_yaml(HANDSHAKE).unwrap();
        assert_eq!(scenario.name, "Handshake");
        assert_eq!(scenario.mode, Some(SessionMode::Session));
        assert_eq!(scenario.timeout, Some(Duration::from_secs(10)));
        assert_eq!(scenario.steps.len(), 4);

        let init = &scenario.steps[0];
        assert_eq!(init.name, "Initialize");
        assert_eq!(init.message.id(), Some(&json!(1)));
        assert_eq!(init.expectation.required_result_fields.len(), 3);

        let notif = &scenario.steps[1];
        assert_eq!(notif.name, "notifications/initialized (notification)");
        assert!(!notif.message.is_request());
        assert!(!notif.expectation.expects_reply);

        let null_id = &scenario.steps[2];
        assert_eq!(null_id.message.id(), Some(&Value::Null));
        assert!(null_id.expectation.expects_reply);

        assert_eq!(scenario.steps[3].expectation.error, ErrorPolicy::Required);
    }

    #[test]
    fn test_reply_contradicting_id_is_rejected() {
        let yaml = r#"
name: Bad
steps:
  - send: { jsonrpc: "2.0", method: tools/list }
    expect: { reply: true }
"#;
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("contradicts"));
    }

    #[test]
    fn test_notification_with_reply_expectations_is_rejected() {
        let yaml = r#"
name: Bad
steps:
  - send: { jsonrpc: "2.0", method: tools/list }
    expect: { result_fields: [tools] }
"#;
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let yaml = r#"
name: Typo
steps:
  - send: { jsonrpc: "2.0", id: 1, method: ping }
    expect: { result_feilds: [x] }
"#;
        assert!(matches!(Scenario::from_yaml(yaml), Err(Error::Yaml(_))));
    }

    #[test]
    fn test_empty_scenario_is_rejected() {
        assert!(Scenario::from_yaml("name: Empty\nsteps: []\n").is_err());
    }

    #[test]
    fn test_collect_scenario_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), HANDSHAKE).unwrap();
        std::fs::write(dir.path().join("a.yml"), HANDSHAKE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = collect_scenario_paths(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yml", "b.yaml"]);

        let scenario = Scenario::load(&files[0]).unwrap();
        assert_eq!(scenario.steps.len(), 4);

        assert!(collect_scenario_paths(&[dir.path().join("missing.yaml")]).is_err());
    }
}
