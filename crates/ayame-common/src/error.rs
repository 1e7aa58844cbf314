//! Error types for host command execution.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for command execution.
pub type ShellResult<T> = Result<T, ShellError>;

/// Errors that can occur while running a host command.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The command could not be spawned (binary missing, permissions).
    #[error("Failed to execute command '{command}': {source}")]
    Spawn {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The command ran and returned a non-zero exit code.
    #[error("Command failed: '{command}' (exit code {exit_code}): {output}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },
}

impl ShellError {
    /// Creates a command failure error.
    pub fn command_failed(
        command: impl Into<String>,
        exit_code: i32,
        output: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            exit_code,
            output: output.into(),
        }
    }

    /// Returns the exit code if the command ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ShellError::CommandFailed { exit_code, .. } => Some(*exit_code),
            ShellError::Spawn { .. } => None,
        }
    }
}
