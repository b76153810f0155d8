//! MCP Conformance - a conformance harness for MCP stdio servers
//!
//! This library drives newline-delimited JSON-RPC 2.0 servers over a
//! child process's stdin/stdout, correlates replies with requests, and
//! validates them against protocol and MCP invariants.

pub mod cli;
pub mod commands;
pub mod common;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use protocol::{Message, Response};
pub use transport::{LaunchSpec, Launcher, Transport};
