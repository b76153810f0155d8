//! Error types for the conformance harness
//!
//! Transport failures carry enough text to be shown as a per-message
//! diagnostic, since every failure ends up recorded in an outcome rather
//! than aborting the suite.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Server Process Errors ===
    #[error("Server command '{name}' not found on PATH")]
    ServerNotFound { name: String },

    #[error("Failed to start server: {0}")]
    ServerSpawnFailed(String),

    #[error("Broken pipe: server is no longer accepting input")]
    BrokenPipe,

    #[error("Server exited before replying ({status}){}", format_stderr(.stderr))]
    ProcessExited { status: String, stderr: String },

    #[error("Server exited unsuccessfully ({status}){}", format_stderr(.stderr))]
    ExitFailed { status: String, stderr: String },

    #[error("Server did not exit after its input was closed and had to be killed")]
    Unresponsive,

    // === Correlation Errors ===
    #[error("Timed out after {0} ms waiting for a reply line")]
    Timeout(u64),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Session desynchronized: {0}")]
    Desynchronized(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario '{path}': {reason}")]
    ScenarioParse { path: String, reason: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a process exited error from an exit description and captured stderr
    pub fn process_exited(status: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::ProcessExited {
            status: status.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a scenario parse error for the given file
    pub fn scenario_parse(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::ScenarioParse {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the server process can no longer be driven after this error
    pub fn is_transport_fatal(&self) -> bool {
        matches!(
            self,
            Error::BrokenPipe | Error::ProcessExited { .. } | Error::Timeout(_) | Error::Io(_)
        )
    }
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("; stderr: {}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_exited_includes_stderr() {
        let err = Error::process_exited("exit status: 1", "boom\n");
        assert_eq!(
            err.to_string(),
            "Server exited before replying (exit status: 1); stderr: boom"
        );

        let err = Error::process_exited("exit status: 0", "  ");
        assert_eq!(err.to_string(), "Server exited before replying (exit status: 0)");
    }

    #[test]
    fn test_transport_fatal_classification() {
        assert!(Error::BrokenPipe.is_transport_fatal());
        assert!(Error::Timeout(100).is_transport_fatal());
        assert!(!Error::MalformedResponse("x".into()).is_transport_fatal());
        assert!(!Error::Desynchronized("x".into()).is_transport_fatal());
    }
}
