//! Scenario runner
//!
//! Drives scenarios through a `Launcher`, either over one persistent
//! process per scenario or with a fresh process per message. Every failure
//! is recorded in the returned outcome; running a scenario never fails.

use std::time::Duration;

use tokio::time::Instant;

use crate::common::config::{Config, SessionMode};
use crate::common::Error;
use crate::protocol::{validate, Violation};
use crate::session::{Correlator, Exchange};
use crate::transport::{Exit, Launcher, Shutdown, Transport};

use super::config::{Scenario, Step};
use super::outcome::{MessageOutcome, ScenarioOutcome, SuiteOutcome};

/// Number of stderr lines attached to a timeout diagnostic
const STDERR_TAIL_LINES: usize = 5;

/// What the runner does after judging one exchange
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Stop sending; `fatal` means the process can no longer be closed cleanly
    Halt { reason: String, fatal: bool },
}

/// Runs scenarios against servers started by a launcher
pub struct Runner<L: Launcher> {
    launcher: L,
    message_timeout: Duration,
    scenario_timeout: Duration,
    default_mode: SessionMode,
}

impl<L: Launcher> Runner<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            message_timeout: Duration::from_secs(30),
            scenario_timeout: Duration::from_secs(120),
            default_mode: SessionMode::Session,
        }
    }

    /// Runner using the timeouts and session mode from configuration
    pub fn from_config(launcher: L, config: &Config) -> Self {
        Self::new(launcher)
            .with_timeouts(config.timeouts.message(), config.timeouts.scenario())
            .with_mode(config.session.mode)
    }

    pub fn with_timeouts(mut self, message: Duration, scenario: Duration) -> Self {
        self.message_timeout = message;
        self.scenario_timeout = scenario;
        self
    }

    /// Mode for scenarios that don't choose one themselves
    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Run scenarios one after another
    pub async fn run_suite(&self, scenarios: &[Scenario]) -> SuiteOutcome {
        let mut suite = SuiteOutcome::default();
        for scenario in scenarios {
            suite.scenarios.push(self.run_scenario(scenario).await);
        }
        suite
    }

    /// Run one scenario to completion
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioOutcome {
        let mode = scenario.mode.unwrap_or(self.default_mode);
        let started = Instant::now();
        let deadline = started + scenario.timeout.unwrap_or(self.scenario_timeout);
        let mut outcome = ScenarioOutcome::new(&scenario.name, mode);

        tracing::debug!(scenario = %scenario.name, ?mode, steps = scenario.steps.len(), "Running scenario");

        match mode {
            SessionMode::Session => self.run_session(scenario, deadline, &mut outcome).await,
            SessionMode::PerRequest => self.run_per_request(scenario, deadline, &mut outcome).await,
        }

        outcome.elapsed = started.elapsed();
        tracing::info!(
            scenario = %scenario.name,
            verdict = %outcome.verdict(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Scenario finished"
        );
        outcome
    }

    /// Per-read budget: the message timeout, capped by the scenario deadline
    fn budget(&self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            None
        } else {
            Some(remaining.min(self.message_timeout))
        }
    }

    async fn run_session(&self, scenario: &Scenario, deadline: Instant, outcome: &mut ScenarioOutcome) {
        let mut transport = match self.launcher.launch().await {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(error = %e, "Server failed to start");
                outcome.session_errors.push(e.to_string());
                for step in &scenario.steps {
                    outcome
                        .messages
                        .push(MessageOutcome::not_run(step, "Not run: server failed to start"));
                }
                return;
            }
        };

        let mut correlator = Correlator::new();
        let mut fatal = false;
        let mut steps = scenario.steps.iter();

        while let Some(step) = steps.next() {
            let Some(budget) = self.budget(deadline) else {
                tracing::warn!(scenario = %scenario.name, "Scenario deadline expired");
                fatal = true;
                for rest in std::iter::once(step).chain(steps.by_ref()) {
                    outcome
                        .messages
                        .push(MessageOutcome::not_run(rest, "Not run: scenario timed out"));
                }
                break;
            };

            let started = Instant::now();
            let exchange = correlator
                .exchange(transport.as_mut(), &step.message, budget)
                .await;
            let mut message = MessageOutcome::for_step(step);
            let flow = judge(step, exchange, transport.as_ref(), &mut message);
            message.elapsed = started.elapsed();
            outcome.messages.push(message);

            if let Flow::Halt { reason, fatal: is_fatal } = flow {
                fatal = is_fatal;
                for rest in steps.by_ref() {
                    outcome.messages.push(MessageOutcome::not_run(rest, &reason));
                }
                break;
            }
        }

        if fatal {
            transport.abort().await;
        } else {
            let budget = self.budget(deadline).unwrap_or_default();
            match transport.close(budget).await {
                Ok(shutdown) => {
                    if let Some(description) = correlator.finish(&shutdown.leftover) {
                        tracing::warn!(%description, "Unsolicited output at session end");
                        outcome
                            .session_errors
                            .push(Error::Desynchronized(description).to_string());
                    }
                    if let Some(e) = exit_error(&shutdown.exit, transport.as_ref()) {
                        tracing::warn!(error = %e, "Server did not shut down cleanly");
                        outcome.session_errors.push(e.to_string());
                    }
                    outcome.unsolicited = shutdown.leftover;
                }
                Err(e) => outcome.session_errors.push(e.to_string()),
            }
        }
        outcome.append_stderr(&transport.diagnostics());
    }

    async fn run_per_request(&self, scenario: &Scenario, deadline: Instant, outcome: &mut ScenarioOutcome) {
        for step in &scenario.steps {
            let Some(budget) = self.budget(deadline) else {
                outcome
                    .messages
                    .push(MessageOutcome::not_run(step, "Not run: scenario timed out"));
                continue;
            };

            let started = Instant::now();
            let mut message = MessageOutcome::for_step(step);

            let mut transport = match self.launcher.launch().await {
                Ok(transport) => transport,
                Err(e) => {
                    message.error(e.to_string());
                    message.elapsed = started.elapsed();
                    outcome.messages.push(message);
                    continue;
                }
            };

            let mut correlator = Correlator::new();
            let exchange = correlator
                .exchange(transport.as_mut(), &step.message, budget)
                .await;
            let flow = judge(step, exchange, transport.as_ref(), &mut message);

            if matches!(flow, Flow::Halt { fatal: true, .. }) {
                transport.abort().await;
            } else {
                let budget = self.budget(deadline).unwrap_or_default();
                match transport.close(budget).await {
                    Ok(Shutdown { leftover, exit }) => {
                        if let Some(description) = correlator.finish(&leftover) {
                            tracing::warn!(step = %step.name, %description, "Unsolicited output");
                            outcome.session_errors.push(format!(
                                "{}: {}",
                                step.name,
                                Error::Desynchronized(description)
                            ));
                            message.violate(
                                leftover
                                    .iter()
                                    .map(|line| Violation::UnsolicitedReply { line: line.clone() })
                                    .collect(),
                            );
                        }
                        if let Some(e) = exit_error(&exit, transport.as_ref()) {
                            tracing::warn!(step = %step.name, error = %e, "Server did not shut down cleanly");
                            message.error(e.to_string());
                        }
                        outcome.unsolicited.extend(leftover);
                    }
                    Err(e) => message.error(e.to_string()),
                }
            }

            message.elapsed = started.elapsed();
            outcome.append_stderr(&transport.diagnostics());
            outcome.messages.push(message);
        }
    }
}

/// Turn the result of one exchange into a message outcome
fn judge(
    step: &Step,
    exchange: crate::common::Result<Exchange>,
    transport: &dyn Transport,
    outcome: &mut MessageOutcome,
) -> Flow {
    if step.expectation.expects_reply != step.message.is_request() {
        outcome.error(format!(
            "Step expects {} but the message {} 'id' field",
            if step.expectation.expects_reply { "a reply" } else { "no reply" },
            if step.message.is_request() { "has an" } else { "has no" }
        ));
    }

    match exchange {
        Ok(Exchange::Sent) => Flow::Continue,
        Ok(Exchange::Replied { response, .. }) => {
            outcome.violate(validate(&step.message, &step.expectation, &response));
            outcome.response = Some(response.to_value());
            Flow::Continue
        }
        Ok(Exchange::Malformed { line, error }) => {
            if !line.is_empty() {
                outcome.raw_response = Some(line);
            }
            outcome.error(error.to_string());
            Flow::Continue
        }
        Ok(Exchange::Desynchronized { response, reason, .. }) => {
            outcome.response = Some(response.to_value());
            outcome.error(Error::Desynchronized(reason).to_string());
            Flow::Halt {
                reason: "Not run: session desynchronized".to_string(),
                fatal: false,
            }
        }
        Err(e) => {
            let fatal = e.is_transport_fatal();
            let reason = format!("Not run: {}", e);
            outcome.error(e.to_string());
            if let Error::Timeout(_) = e {
                if let Some(tail) = stderr_tail(&transport.diagnostics()) {
                    outcome.diagnostics.push(format!("Server stderr: {}", tail));
                }
            }
            if fatal {
                Flow::Halt { reason, fatal }
            } else {
                Flow::Continue
            }
        }
    }
}

/// Error for a server that did not end on its own with status zero
fn exit_error(exit: &Exit, transport: &dyn Transport) -> Option<Error> {
    match exit {
        Exit::Clean => None,
        Exit::Failed { status } => Some(Error::ExitFailed {
            status: status.clone(),
            stderr: stderr_tail(&transport.diagnostics()).unwrap_or_default(),
        }),
        Exit::Unresponsive => Some(Error::Unresponsive),
    }
}

/// Last few lines of captured stderr
fn stderr_tail(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    Some(lines[start..].join(" | "))
}
