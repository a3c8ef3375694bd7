//! Bounded execution of the external listing utility.
//!
//! The listing tool is the binary a rootkit is most likely to have replaced.
//! Every run gets:
//!
//! - Hard timeout with SIGTERM → SIGKILL escalation, sent to the child's
//!   own process group so wrapper scripts cannot leave workers behind
//! - Output size cap
//! - Command path validation (no shell metacharacters)
//! - Scrubbed environment with a fixed `C` locale
//!
//! # Example
//!
//! ```ignore
//! use rkscan_core::collect::tool_runner::{ToolRunner, ToolSpec};
//!
//! let runner = ToolRunner::with_defaults();
//! let output = runner.run(&ToolSpec::new("ps", vec!["ax".into()]))?;
//! println!("{}", output.stdout_str());
//! ```

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};

/// Default timeout per command in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default maximum output size in bytes (16MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 500;

/// Environment variables forwarded to the child. Everything else is cleared.
const FORWARDED_ENV: &[&str] = &["PATH", "TZ"];

const READ_CHUNK: usize = 8192;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command failed to spawn: {0}")]
    SpawnFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid command path: {0}")]
    InvalidPath(String),
}

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Command that was executed.
    pub command: String,

    /// Standard output (may be truncated).
    pub stdout: Vec<u8>,

    /// Standard error (may be truncated).
    pub stderr: Vec<u8>,

    /// Exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,

    /// Whether output hit the size cap.
    pub truncated: bool,

    /// Execution duration.
    pub duration: Duration,

    /// Whether the command was killed for exceeding its timeout.
    pub timed_out: bool,
}

impl ToolOutput {
    /// Get stdout as string (lossy UTF-8 conversion).
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as string (lossy UTF-8 conversion).
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Check if the command succeeded (exit code 0, not timed out).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Configuration for the tool runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Default timeout per command.
    pub default_timeout: Duration,

    /// Maximum output size per stream in bytes.
    pub max_output_bytes: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Specification for a tool to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    /// Command to execute.
    pub command: String,

    /// Arguments to pass.
    pub args: Vec<String>,

    /// Override timeout (None = use default).
    pub timeout: Option<Duration>,
}

impl ToolSpec {
    /// Create a new tool specification.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            timeout: None,
        }
    }

    /// Set custom timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Runs external commands under a timeout and output cap.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    config: ToolConfig,
}

impl ToolRunner {
    /// Create a new tool runner with the given configuration.
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    /// Create a tool runner with default configuration.
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Active configuration.
    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Run a tool from a specification.
    ///
    /// A timeout is not an error here: the output comes back with
    /// `timed_out` set so the caller decides how fatal it is.
    #[instrument(skip(self), fields(cmd = %spec.command))]
    pub fn run(&self, spec: &ToolSpec) -> Result<ToolOutput, ToolError> {
        validate_command(&spec.command)?;

        let timeout = spec.timeout.unwrap_or(self.config.default_timeout);
        let max_output = self.config.max_output_bytes;

        debug!(
            command = %spec.command,
            args = ?spec.args,
            timeout_ms = timeout.as_millis() as u64,
            max_output,
            "running tool"
        );

        let start = Instant::now();
        let mut child = build_command(&spec.command, &spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!(command = %spec.command, error = %e, "failed to spawn");
                if e.kind() == std::io::ErrorKind::NotFound {
                    ToolError::CommandNotFound(spec.command.clone())
                } else {
                    ToolError::SpawnFailed(e.to_string())
                }
            })?;

        let captured = execute_with_timeout(&mut child, timeout, max_output)?;
        let duration = start.elapsed();

        debug!(
            command = %spec.command,
            duration_ms = duration.as_millis() as u64,
            exit_code = ?captured.exit_code,
            timed_out = captured.timed_out,
            "tool execution complete"
        );

        Ok(ToolOutput {
            command: spec.command.clone(),
            stdout: captured.stdout.buf,
            stderr: captured.stderr.buf,
            exit_code: captured.exit_code,
            truncated: captured.stdout.truncated || captured.stderr.truncated,
            duration,
            timed_out: captured.timed_out,
        })
    }
}

/// Reject commands that could be interpreted by a shell or do not exist.
fn validate_command(cmd: &str) -> Result<(), ToolError> {
    if cmd.is_empty() {
        return Err(ToolError::InvalidPath("empty command".to_string()));
    }

    if cmd.contains(['|', '&', ';', '$', '`', '\n', '\r']) {
        return Err(ToolError::InvalidPath(format!(
            "command contains shell metacharacters: {}",
            cmd
        )));
    }

    if cmd.starts_with('/') && !Path::new(cmd).exists() {
        return Err(ToolError::CommandNotFound(cmd.to_string()));
    }

    Ok(())
}

fn build_command(cmd: &str, args: &[String]) -> Command {
    let mut command = Command::new(cmd);
    command.args(args);
    // New process group led by the child; its PID is the group ID.
    command.process_group(0);

    command.env_clear();
    for key in FORWARDED_ENV {
        if let Ok(value) = std::env::var(key) {
            command.env(key, value);
        }
    }
    // Fixed locale keeps date columns in the layout the parser expects.
    command.env("LC_ALL", "C");
    command.env("LANG", "C");

    command
}

/// One captured stream, capped at a byte limit.
#[derive(Debug, Default)]
struct CappedBuffer {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CappedBuffer {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit.min(65536)),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, data: &[u8]) {
        let space = self.limit.saturating_sub(self.buf.len());
        if data.len() > space {
            self.truncated = true;
        }
        self.buf.extend_from_slice(&data[..data.len().min(space)]);
    }
}

#[derive(Debug)]
struct Captured {
    stdout: CappedBuffer,
    stderr: CappedBuffer,
    exit_code: Option<i32>,
    timed_out: bool,
}

/// Poll the child's pipes until it exits or the deadline passes.
fn execute_with_timeout(
    child: &mut Child,
    timeout: Duration,
    max_output: usize,
) -> Result<Captured, ToolError> {
    let deadline = Instant::now() + timeout;
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut captured = Captured {
        stdout: CappedBuffer::new(max_output),
        stderr: CappedBuffer::new(max_output),
        exit_code: None,
        timed_out: false,
    };
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        if Instant::now() >= deadline {
            captured.timed_out = true;
            warn!(timeout_ms = timeout.as_millis() as u64, "command timed out, sending SIGTERM");
            kill_with_grace(child);
            captured.exit_code = child.wait().ok().and_then(|s| s.code());
            return Ok(captured);
        }

        let mut did_read = false;
        if let Some(out) = stdout_pipe.as_mut() {
            did_read |= poll_stream(out, &mut chunk, &mut captured.stdout);
        }
        if let Some(err) = stderr_pipe.as_mut() {
            did_read |= poll_stream(err, &mut chunk, &mut captured.stderr);
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                if let Some(out) = stdout_pipe.as_mut() {
                    drain(out, &mut chunk, &mut captured.stdout);
                }
                if let Some(err) = stderr_pipe.as_mut() {
                    drain(err, &mut chunk, &mut captured.stderr);
                }
                captured.exit_code = status.code();
                trace!(exit_code = ?captured.exit_code, "process exited");
                return Ok(captured);
            }
            Ok(None) => {
                if !did_read {
                    thread::sleep(Duration::from_millis(10));
                }
            }
            Err(e) => {
                error!(error = %e, "failed to wait for child");
                return Err(ToolError::Io(e));
            }
        }
    }
}

fn poll_stream<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    chunk: &mut [u8],
    sink: &mut CappedBuffer,
) -> bool {
    match try_read_nonblocking(stream, chunk) {
        Ok(n) if n > 0 => {
            sink.push(&chunk[..n]);
            true
        }
        _ => false,
    }
}

/// Drain what is immediately available after exit.
///
/// Non-blocking so a grandchild still holding the pipe cannot hang us.
fn drain<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    chunk: &mut [u8],
    sink: &mut CappedBuffer,
) {
    while !sink.truncated && poll_stream(stream, chunk, sink) {}
}

/// Kill the child's process group with SIGTERM, then SIGKILL after a
/// grace period.
///
/// The child is not reaped until the caller waits on it, so its PID stays
/// reserved as the group ID for both signals.
fn kill_with_grace(child: &mut Child) {
    let pgid = child.id() as i32;

    signal_group(pgid, libc::SIGTERM);
    debug!(pgid, "sent SIGTERM to process group");

    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

    // Sweep members that ignored SIGTERM, including orphaned grandchildren.
    if signal_group(pgid, libc::SIGKILL) {
        trace!(pgid, "sent SIGKILL to process group");
    }
}

/// Send `signal` to every process in group `pgid`.
///
/// Returns `false` when the group is already gone.
fn signal_group(pgid: i32, signal: i32) -> bool {
    // SAFETY: negative PID targets the group created for our own child.
    let result = unsafe { libc::kill(-pgid, signal) };
    if result == 0 {
        return true;
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() != Some(libc::ESRCH) {
        error!(pgid, signal, error = %err, "failed to signal process group");
    }
    false
}

/// Read from a stream without blocking.
///
/// Temporarily sets O_NONBLOCK on the descriptor. Returns Ok(0) when no
/// data is available (EAGAIN/EWOULDBLOCK).
fn try_read_nonblocking<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    // SAFETY: fd is owned by `stream` and stays open for this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        // SAFETY: as above.
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        // SAFETY: as above.
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        other => other,
    }
}

/// Builder for creating a tool runner with custom configuration.
#[derive(Debug, Default)]
pub struct ToolRunnerBuilder {
    config: ToolConfig,
}

impl ToolRunnerBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Set the maximum output size.
    pub fn max_output(mut self, max_bytes: usize) -> Self {
        self.config.max_output_bytes = max_bytes;
        self
    }

    /// Build the tool runner.
    pub fn build(self) -> ToolRunner {
        ToolRunner::new(self.config)
    }
}
