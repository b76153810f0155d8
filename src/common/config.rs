//! Configuration file handling
//!
//! The server environment is an explicit map handed to the transport at
//! launch; the harness never mutates its own process environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Server under test
    #[serde(default)]
    pub server: ServerConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Report settings
    #[serde(default)]
    pub report: ReportConfig,
}

/// How server processes map onto messages
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// One persistent process per scenario
    #[default]
    Session,
    /// A fresh process for every message
    PerRequest,
}

/// Configuration for launching the server under test
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Program to run (resolved on PATH if not a path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables set for the server
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Whether the server inherits the harness environment
    #[serde(default = "default_inherit_env")]
    pub inherit_env: bool,

    /// Working directory for the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Keys re-read from the harness environment, overriding `env`
    #[serde(default = "default_env_passthrough")]
    pub env_passthrough: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            inherit_env: default_inherit_env(),
            cwd: None,
            env_passthrough: default_env_passthrough(),
        }
    }
}

fn default_inherit_env() -> bool {
    true
}

fn default_env_passthrough() -> Vec<String> {
    ["DB_URL", "DB_USER", "DB_PASSWORD", "DB_DRIVER", "DB_READ_ONLY"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Timeout settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Timeouts {
    /// Budget for a single reply line
    #[serde(default = "default_message_secs")]
    pub message_secs: u64,

    /// Wall-clock budget for a whole scenario
    #[serde(default = "default_scenario_secs")]
    pub scenario_secs: u64,

    /// Time allowed for the server to exit after stdin is closed
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            message_secs: default_message_secs(),
            scenario_secs: default_scenario_secs(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

fn default_message_secs() -> u64 {
    30
}
fn default_scenario_secs() -> u64 {
    120
}
fn default_shutdown_grace() -> u64 {
    500
}

impl Timeouts {
    pub fn message(&self) -> Duration {
        Duration::from_secs(self.message_secs)
    }

    pub fn scenario(&self) -> Duration {
        Duration::from_secs(self.scenario_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Session settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub mode: SessionMode,
}

/// Report settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ReportConfig {
    /// Write a JSON report to this path after the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Substrings that mark an environment key as secret
const SECRET_MARKERS: &[&str] = &["PASSWORD", "SECRET", "TOKEN"];

impl Config {
    /// Load configuration from an explicit path or the default config file
    ///
    /// Returns default configuration if the default file doesn't exist.
    /// An explicit path that doesn't exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config
            .server
            .apply_passthrough(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// A copy of this configuration with secret environment values masked
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        for (key, value) in copy.server.env.iter_mut() {
            if is_secret_key(key) && !value.is_empty() {
                *value = "***".to_string();
            }
        }
        copy
    }

    /// Render the configuration as TOML with secrets masked
    pub fn render_masked(&self) -> Result<String> {
        toml::to_string_pretty(&self.masked()).map_err(|e| Error::Config(e.to_string()))
    }
}

impl ServerConfig {
    /// Override `env` entries with values found for the passthrough keys
    pub fn apply_passthrough<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in &self.env_passthrough {
            if let Some(value) = lookup(key) {
                self.env.insert(key.clone(), value);
            }
        }
    }

    /// Resolve the server program, searching PATH for bare names
    pub fn resolve_program(&self) -> Result<PathBuf> {
        let command = self
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "No server command configured. Use --server or set [server].command".to_string(),
                )
            })?;

        let candidate = Path::new(command);
        if candidate.components().count() > 1 || candidate.is_absolute() {
            if candidate.exists() {
                return Ok(candidate.to_path_buf());
            }
            return Err(Error::ServerNotFound {
                name: command.to_string(),
            });
        }

        which::which(command).map_err(|_| Error::ServerNotFound {
            name: command.to_string(),
        })
    }
}

fn is_secret_key(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    SECRET_MARKERS.iter().any(|marker| upper.contains(marker))
}
