//! Common infrastructure for the ayame network lab tools.
//!
//! This crate provides the host-side plumbing every other ayame crate
//! builds on:
//!
//! - [`shell`]: argv-based host command execution with shell-quoted logging
//! - [`CommandRunner`]: the seam through which every OS mutation flows,
//!   with a real ([`ShellRunner`]) and a capturing ([`RecordingRunner`])
//!   implementation
//! - [`error`]: Error types for command execution
//!
//! # Example
//!
//! ```ignore
//! use ayame_common::{shell::{self, HostCommand, IP_CMD}, ShellRunner};
//!
//! async fn add_netns(name: &str) -> ayame_common::ShellResult<()> {
//!     let runner = ShellRunner::new();
//!     let cmd = HostCommand::new(IP_CMD).args(["netns", "add", name]);
//!     shell::exec_checked(&runner, &cmd).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod shell;

// Re-export commonly used items at crate root
pub use error::{ShellError, ShellResult};
pub use shell::{CommandRunner, ExecResult, HostCommand, RecordingRunner, ShellRunner};
