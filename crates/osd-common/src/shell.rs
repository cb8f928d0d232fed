//! External command execution for the appliance daemons.
//!
//! Commands are spawned directly (no intermediate shell) and every call
//! carries a [`CancellationToken`]. When the token fires, the running child
//! is killed and the call unwinds with [`OsdError::Cancelled`].
//!
//! Callers go through the [`CommandRunner`] trait so that orchestration code
//! can be exercised against a scripted runner in tests.
//!
//! # Example
//!
//! ```ignore
//! use osd_common::shell::{CommandRunner, SystemRunner, SYSTEMCTL_CMD};
//!
//! let runner = SystemRunner::new();
//! runner
//!     .run_or_throw(&cancel, SYSTEMCTL_CMD, &["restart", "systemd-networkd"])
//!     .await?;
//! ```

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{OsdError, OsdResult};

/// The `udevadm` device manager control utility.
pub const UDEVADM_CMD: &str = "udevadm";

/// The `journalctl` log query utility.
pub const JOURNALCTL_CMD: &str = "journalctl";

/// The `networkctl` systemd-networkd status utility.
pub const NETWORKCTL_CMD: &str = "networkctl";

/// The `systemctl` service manager utility.
pub const SYSTEMCTL_CMD: &str = "systemctl";

/// The `hostnamectl` hostname control utility.
pub const HOSTNAMECTL_CMD: &str = "hostnamectl";

/// The `ip` command for network interface inspection.
pub const IP_CMD: &str = "ip";

/// Characters that force an argument to be quoted when rendered for logs.
static NEEDS_QUOTING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\s$`"\\'*?\[\]{}|&;<>()]"#).expect("Invalid regex pattern"));

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for display as a shell word.
///
/// Wraps the string in double quotes and escapes `$`, `` ` ``, `"`, `\`
/// and newline.
///
/// # Example
///
/// ```
/// use osd_common::shell::shellquote;
///
/// assert_eq!(shellquote("simple"), "\"simple\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Renders `program` and `args` as a single command line.
///
/// Arguments are only quoted when they contain characters a shell would
/// interpret, so the common case stays readable in logs and error messages.
pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.is_empty() || NEEDS_QUOTING_RE.is_match(arg) {
            line.push_str(&shellquote(arg));
        } else {
            line.push_str(arg);
        }
    }
    line
}

/// Result of an external command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The stdout output.
    pub stdout: String,
    /// The stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// A successful result carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes external commands on behalf of the daemons.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and returns its result.
    ///
    /// A non-zero exit status is not an error at this level; only spawn
    /// failures and cancellation are.
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> OsdResult<ExecResult>;

    /// Runs a command and turns a non-zero exit into
    /// [`OsdError::ShellCommandFailed`].
    ///
    /// Returns the trimmed stdout on success.
    async fn run_or_throw(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> OsdResult<String> {
        let result = self.run(cancel, program, args).await?;
        if result.success() {
            Ok(result.stdout)
        } else {
            Err(OsdError::ShellCommandFailed {
                command: command_line(program, args),
                exit_code: result.exit_code,
                output: result.combined_output(),
            })
        }
    }
}

/// Runs commands on the host via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> OsdResult<ExecResult> {
        let command = command_line(program, args);
        if cancel.is_cancelled() {
            return Err(OsdError::Cancelled { command });
        }

        tracing::debug!(command = %command, "Executing command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OsdError::ShellExec {
                command: command.clone(),
                source: e,
            })?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(command = %command, "Command cancelled");
                return Err(OsdError::Cancelled { command });
            }
            output = child.wait_with_output() => output.map_err(|e| OsdError::ShellExec {
                command: command.clone(),
                source: e,
            })?,
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let result = ExecResult {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        if result.success() {
            tracing::trace!(command = %command, exit_code = exit_code, "Command succeeded");
        } else {
            tracing::debug!(
                command = %command,
                exit_code = exit_code,
                stderr = %result.stderr,
                "Command exited non-zero"
            );
        }

        Ok(result)
    }
}
