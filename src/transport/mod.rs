//! Transport layer between the harness and the server under test
//!
//! A `Transport` owns exactly one server process. `Launcher` creates
//! transports, so that the runner can open one per scenario or one per
//! message depending on the session mode.

pub mod codec;
pub mod stdio;

use std::time::Duration;

use async_trait::async_trait;

use crate::common::Result;
use crate::protocol::Message;

pub use stdio::{LaunchSpec, StdioTransport};

/// Raw line I/O with one server process
#[async_trait]
pub trait Transport: Send {
    /// Serialize the message to one line, write it and flush
    ///
    /// Fails with `BrokenPipe` if the process has exited.
    async fn send(&mut self, message: &Message) -> Result<()>;

    /// Wait for one full line of output
    ///
    /// Fails with `Timeout` when nothing arrives in time and with
    /// `ProcessExited` when output ends first.
    async fn receive_line(&mut self, timeout: Duration) -> Result<String>;

    /// Close input, read output until the server ends it, and release the process
    ///
    /// Reading stops at end of output or when `budget` runs out, whichever
    /// comes first. Returns the lines nobody asked for and how the process ended.
    async fn close(&mut self, budget: Duration) -> Result<Shutdown>;

    /// Kill the process immediately without collecting output
    async fn abort(&mut self);

    /// Diagnostic text captured from the server's standard error
    fn diagnostics(&self) -> String;
}

/// How a server process ended after its input was closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// Exited on its own with status zero
    Clean,
    /// Exited on its own, unsuccessfully
    Failed { status: String },
    /// Did not exit within the shutdown grace and had to be signalled
    Unresponsive,
}

/// Everything collected while shutting a server down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shutdown {
    /// Lines the server produced that no request asked for
    pub leftover: Vec<String>,
    pub exit: Exit,
}

impl Shutdown {
    pub fn clean(leftover: Vec<String>) -> Self {
        Self {
            leftover,
            exit: Exit::Clean,
        }
    }
}

/// Something that can start a fresh server process
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Transport>>;
}
