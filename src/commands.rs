//! CLI command definitions
//!
//! Defines the clap commands for the conformance harness.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::common::config::SessionMode;

/// Report file used when `--report` is given without a path
pub const DEFAULT_REPORT_FILE: &str = "mcp_test_report.json";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run YAML scenario files against the server
    Run {
        /// Scenario files, or directories containing *.yaml / *.yml files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Run the built-in standard MCP suite
    Builtin {
        /// Also run the database workflow (create, insert, query, drop)
        #[arg(long)]
        database: bool,
    },

    /// Print the effective configuration with secrets masked
    ShowConfig,
}

/// Options shared by every command
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalOptions {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Server command to launch
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Argument for the server command (repeatable)
    #[arg(long = "arg", global = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Environment variable for the server, KEY=VALUE (repeatable)
    #[arg(long = "env", global = true, value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Default session mode for scenarios that don't set one
    #[arg(long, global = true, value_enum)]
    pub mode: Option<SessionMode>,

    /// Seconds to wait for each reply line
    #[arg(long, global = true)]
    pub message_timeout: Option<u64>,

    /// Seconds allowed for a whole scenario
    #[arg(long, global = true)]
    pub scenario_timeout: Option<u64>,

    /// Write a JSON report (default file: mcp_test_report.json)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = DEFAULT_REPORT_FILE)]
    pub report: Option<PathBuf>,

    /// Debug-level logging on stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

/// Parse a `KEY=VALUE` pair
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
