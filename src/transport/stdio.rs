//! Child-process transport over stdin/stdout
//!
//! stdout carries protocol lines; stderr is drained by a background task
//! into a bounded buffer and only ever used as diagnostic text.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::protocol::Message;

use super::codec;
use super::{Exit, Launcher, Shutdown, Transport};

/// Maximum amount of stderr text kept per process
const STDERR_CAP_BYTES: usize = 16 * 1024;

/// Everything needed to start the server under test
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub inherit_env: bool,
    pub cwd: Option<PathBuf>,
    pub shutdown_grace: Duration,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            inherit_env: true,
            cwd: None,
            shutdown_grace: Duration::from_millis(500),
        }
    }

    /// Build a launch spec from configuration, resolving the program on PATH
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            program: config.server.resolve_program()?,
            args: config.server.args.clone(),
            env: config.server.env.clone(),
            inherit_env: config.server.inherit_env,
            cwd: config.server.cwd.clone(),
            shutdown_grace: config.timeouts.shutdown_grace(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Human-readable command line for logs and reports
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Launcher for LaunchSpec {
    async fn launch(&self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(StdioTransport::spawn(self)?))
    }
}

/// Bounded tail of a process's stderr
#[derive(Debug, Default)]
struct StderrBuffer {
    text: String,
}

impl StderrBuffer {
    fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
        if self.text.len() > STDERR_CAP_BYTES {
            let mut cut = self.text.len() - STDERR_CAP_BYTES;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }
}

/// Transport owning one server child process
pub struct StdioTransport {
    child: Child,
    reader: BufReader<ChildStdout>,
    /// `None` once input has been closed
    writer: Option<ChildStdin>,
    stderr: Arc<Mutex<StderrBuffer>>,
    stderr_task: Option<JoinHandle<()>>,
    shutdown_grace: Duration,
}

impl StdioTransport {
    /// Start the server process with piped stdio
    pub fn spawn(spec: &LaunchSpec) -> Result<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !spec.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(&spec.env);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::ServerSpawnFailed(format!("{}: {}", spec.command_line(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::ServerSpawnFailed("Failed to get server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ServerSpawnFailed("Failed to get server stdout".to_string()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| Error::ServerSpawnFailed("Failed to get server stderr".to_string()))?;

        let stderr = Arc::new(Mutex::new(StderrBuffer::default()));
        let sink = Arc::clone(&stderr);
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr_pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!("server stderr: {}", line);
                if let Ok(mut buf) = sink.lock() {
                    buf.push_line(&line);
                }
            }
        });

        tracing::debug!(pid = ?child.id(), command = %spec.command_line(), "Server started");

        Ok(Self {
            child,
            reader: BufReader::new(stdout),
            writer: Some(stdin),
            stderr,
            stderr_task: Some(stderr_task),
            shutdown_grace: spec.shutdown_grace,
        })
    }

    /// Build the error for output ending before a line arrived
    async fn exit_error(&mut self) -> Error {
        let status = match timeout(self.shutdown_grace, self.child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(e)) => format!("status unavailable: {}", e),
            Err(_) => "stdout closed, process still running".to_string(),
        };
        self.settle_stderr().await;
        Error::process_exited(status, self.diagnostics())
    }

    /// Give the stderr reader a moment to collect the last lines
    async fn settle_stderr(&mut self) {
        if let Some(task) = self.stderr_task.as_mut() {
            if timeout(Duration::from_millis(100), task).await.is_ok() {
                self.stderr_task = None;
            }
        }
    }

    /// Wait for exit, ask politely, then kill
    ///
    /// Only an exit the server made on its own reports a status.
    async fn terminate(&mut self) -> Exit {
        if let Ok(Some(status)) = self.child.try_wait() {
            return exit_of(status);
        }
        if let Ok(Ok(status)) = timeout(self.shutdown_grace, self.child.wait()).await {
            return exit_of(status);
        }

        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: plain signal delivery to our own child
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
                if timeout(self.shutdown_grace, self.child.wait()).await.is_ok() {
                    return Exit::Unresponsive;
                }
            }
        }

        tracing::warn!(pid = ?self.child.id(), "Server did not exit, killing it");
        let _ = self.child.kill().await;
        Exit::Unresponsive
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: &Message) -> Result<()> {
        let line = message.to_line()?;
        if let Ok(Some(status)) = self.child.try_wait() {
            tracing::debug!(%status, "Send attempted after server exit");
            return Err(Error::BrokenPipe);
        }
        let writer = self.writer.as_mut().ok_or(Error::BrokenPipe)?;
        tracing::trace!(">>> {}", line);
        codec::write_line(writer, &line).await
    }

    async fn receive_line(&mut self, budget: Duration) -> Result<String> {
        match timeout(budget, codec::read_line(&mut self.reader)).await {
            Err(_) => Err(Error::Timeout(budget.as_millis() as u64)),
            Ok(Ok(Some(line))) => {
                tracing::trace!("<<< {}", line);
                Ok(line)
            }
            Ok(Ok(None)) => Err(self.exit_error().await),
            Ok(Err(e)) => Err(e),
        }
    }

    async fn close(&mut self, budget: Duration) -> Result<Shutdown> {
        // Closing stdin is the protocol's request to exit
        drop(self.writer.take());

        let mut leftover = Vec::new();
        let deadline = Instant::now() + budget;
        let mut ended = false;
        while !ended {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, codec::read_line(&mut self.reader)).await {
                Ok(Ok(Some(line))) => {
                    tracing::trace!("<<< (unsolicited) {}", line);
                    leftover.push(line);
                }
                Ok(Ok(None)) => ended = true,
                Err(_) => break,
                Ok(Err(Error::MalformedResponse(detail))) => {
                    leftover.push(format!("<unreadable output: {}>", detail));
                }
                Ok(Err(e)) => {
                    leftover.push(format!("<unreadable output: {}>", e));
                    break;
                }
            }
        }
        if !ended {
            tracing::debug!(budget_ms = budget.as_millis() as u64, "Output still open after input closed");
        }

        let exit = self.terminate().await;
        self.settle_stderr().await;
        Ok(Shutdown { leftover, exit })
    }

    async fn abort(&mut self) {
        drop(self.writer.take());
        let _ = self.child.kill().await;
        self.settle_stderr().await;
    }

    fn diagnostics(&self) -> String {
        self.stderr
            .lock()
            .map(|buf| buf.text.clone())
            .unwrap_or_default()
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        // Best-effort since we can't await in drop
        let _ = self.child.start_kill();
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

fn exit_of(status: ExitStatus) -> Exit {
    if status.success() {
        Exit::Clean
    } else {
        Exit::Failed {
            status: status.to_string(),
        }
    }
}
