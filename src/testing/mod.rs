//! Scenario execution
//!
//! Loads scenarios from YAML or the built-in suite, runs them through the
//! correlator and validator, and reports per-message verdicts.

pub mod builtin;
mod config;
mod outcome;
pub mod report;
mod runner;

pub use config::*;
pub use outcome::{MessageOutcome, ScenarioOutcome, SuiteOutcome, Totals, Verdict};
pub use runner::Runner;
