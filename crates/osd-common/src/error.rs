//! Error types shared by the appliance daemons.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for common daemon operations.
pub type OsdResult<T> = Result<T, OsdError>;

/// Errors that can occur while driving the host system.
#[derive(Debug, Error)]
pub enum OsdError {
    /// Failed to execute an external command (spawn error).
    #[error("Failed to execute command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// External command returned non-zero exit code.
    #[error("Command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// The governing cancellation token fired while a command was running.
    #[error("Command cancelled: '{command}'")]
    Cancelled {
        /// The command that was aborted.
        command: String,
    },

    /// Filesystem operation failed.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// The path being operated on.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Unrecognized system control action.
    #[error("Invalid action {action:?}")]
    InvalidAction {
        /// The rejected action token.
        action: String,
    },
}

impl OsdError {
    /// Creates a filesystem error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid action error.
    pub fn invalid_action(action: impl Into<String>) -> Self {
        Self::InvalidAction {
            action: action.into(),
        }
    }

    /// Returns true if the error came from cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OsdError::Cancelled { .. })
    }
}
