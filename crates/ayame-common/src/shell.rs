//! Host command execution for the ayame engine.
//!
//! Commands are built as argv vectors ([`HostCommand`]) and never pass
//! through `/bin/sh`. The shell-quoted rendering produced by `Display` is
//! only used for logging and error messages, so that every logged line
//! can be pasted back into a terminal verbatim.
//!
//! Execution goes through the [`CommandRunner`] trait:
//!
//! - [`ShellRunner`] spawns the process with `tokio::process`, or in
//!   dry-run mode logs the invocation and reports success.
//! - [`RecordingRunner`] captures every invocation in order without
//!   executing anything. Failures, optionally with their error output,
//!   can be injected by substring match on the rendered command.
//!
//! # Example
//!
//! ```ignore
//! use ayame_common::shell::{self, HostCommand, IP_CMD};
//! use ayame_common::RecordingRunner;
//!
//! let runner = RecordingRunner::new();
//! let cmd = HostCommand::new(IP_CMD).args(["netns", "add", "ns1"]);
//! shell::exec_checked(&runner, &cmd).await?;
//! assert_eq!(runner.commands(), vec!["/sbin/ip netns add ns1"]);
//! ```

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{ShellError, ShellResult};

/// Path to the `ip` command for namespace and link configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `ovs-vsctl` command for Open vSwitch bridge control.
pub const OVS_VSCTL_CMD: &str = "/usr/bin/ovs-vsctl";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Arguments made only of these characters are rendered unquoted.
static SHELL_SAFE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_@%+=:,./-]+$").expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes `$`, `` ` ``, `"`, `\`
/// and newline.
///
/// # Example
///
/// ```
/// use ayame_common::shell::shellquote;
///
/// assert_eq!(shellquote("simple"), "\"simple\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Renders a single argument, quoting it only when the shell would
/// otherwise split or expand it.
fn render_arg(arg: &str) -> String {
    if SHELL_SAFE_RE.is_match(arg) {
        arg.to_string()
    } else {
        shellquote(arg)
    }
}

/// A host command as an argv vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    program: String,
    args: Vec<String>,
}

impl HostCommand {
    /// Creates a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns the program path.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render_arg(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", render_arg(arg))?;
        }
        Ok(())
    }
}

/// Result of a host command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The trimmed stdout output.
    pub stdout: String,
    /// The trimmed stderr output.
    pub stderr: String,
}

impl ExecResult {
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

/// Executes host commands on behalf of the engine.
///
/// Implementations return `Ok` for any command that ran, whatever its exit
/// code; only a failure to run at all is an `Err`. Use [`exec_checked`]
/// when a non-zero exit should be an error.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs a command to completion.
    async fn run(&self, cmd: &HostCommand) -> ShellResult<ExecResult>;

    /// Returns true if this runner never touches the host.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Runs a command and turns a non-zero exit into
/// [`ShellError::CommandFailed`].
///
/// # Returns
///
/// * `Ok(String)` - The stdout output on success
/// * `Err(ShellError)` - If the command fails or returns non-zero
pub async fn exec_checked(runner: &dyn CommandRunner, cmd: &HostCommand) -> ShellResult<String> {
    let result = runner.run(cmd).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(ShellError::command_failed(
            cmd.to_string(),
            result.exit_code,
            result.combined_output(),
        ))
    }
}

/// Runs commands on the host with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    dry_run: bool,
}

impl ShellRunner {
    /// Creates a runner that executes commands.
    pub fn new() -> Self {
        Self { dry_run: false }
    }

    /// Creates a runner that only logs commands.
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, cmd: &HostCommand) -> ShellResult<ExecResult> {
        if self.dry_run {
            tracing::info!(command = %cmd, dry_run = true, "execute");
            return Ok(ExecResult::default());
        }

        tracing::info!(command = %cmd, "execute");

        let output = Command::new(cmd.program())
            .args(cmd.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ShellError::Spawn {
                command: cmd.to_string(),
                source: e,
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        let result = ExecResult {
            exit_code,
            stdout,
            stderr,
        };

        if result.success() {
            tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
        } else {
            tracing::warn!(
                command = %cmd,
                exit_code = exit_code,
                stderr = %result.stderr,
                "Command failed"
            );
        }

        Ok(result)
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    result: ExecResult,
}

/// Captures commands instead of executing them.
///
/// Every command passed to [`CommandRunner::run`] is recorded in its
/// rendered form, including the ones an injected rule makes fail. Rules
/// are matched by substring against the rendered command, first match
/// wins; unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<String>>,
    rules: Mutex<Vec<Rule>>,
}

impl RecordingRunner {
    /// Creates a runner with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every command containing `pattern` exit with status 1.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        let stderr = format!("injected failure for '{}'", pattern);
        self.fail_with(pattern, stderr);
    }

    /// Makes every command containing `pattern` exit with status 1 and
    /// print `stderr`.
    pub fn fail_with(&self, pattern: impl Into<String>, stderr: impl Into<String>) {
        let result = ExecResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.into(),
        };
        self.rules.lock().push(Rule {
            pattern: pattern.into(),
            result,
        });
    }

    /// Returns the rendered commands seen so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Returns how many commands contained `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    /// Forgets the recorded commands, keeping the rules.
    pub fn clear(&self) {
        self.commands.lock().clear();
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, cmd: &HostCommand) -> ShellResult<ExecResult> {
        let rendered = cmd.to_string();
        tracing::info!(command = %rendered, "Mock exec");
        self.commands.lock().push(rendered.clone());

        let result = self
            .rules
            .lock()
            .iter()
            .find(|rule| rendered.contains(&rule.pattern))
            .map(|rule| rule.result.clone())
            .unwrap_or_default();
        Ok(result)
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shellquote_simple() {
        assert_eq!(shellquote("simple"), "\"simple\"");
        assert_eq!(shellquote("ns1"), "\"ns1\"");
    }

    #[test]
    fn test_shellquote_special_chars() {
        assert_eq!(shellquote("$HOME"), "\"\\$HOME\"");
        assert_eq!(shellquote("`whoami`"), "\"\\`whoami\\`\"");
        assert_eq!(shellquote("say \"hello\""), "\"say \\\"hello\\\"\"");
        assert_eq!(shellquote("path\\to"), "\"path\\\\to\"");
    }

    #[test]
    fn test_shellquote_empty() {
        assert_eq!(shellquote(""), "\"\"");
    }

    #[test]
    fn test_host_command_display() {
        let cmd = HostCommand::new(IP_CMD)
            .args(["netns", "exec", "ns1", "ip", "addr", "add", "10.0.0.1/24"])
            .arg("dev")
            .arg("L1-left");
        assert_eq!(
            cmd.to_string(),
            "/sbin/ip netns exec ns1 ip addr add 10.0.0.1/24 dev L1-left"
        );
    }

    #[test]
    fn test_host_command_display_quotes_unsafe_args() {
        let cmd = HostCommand::new("echo").arg("a b").arg("$x");
        assert_eq!(cmd.to_string(), "echo \"a b\" \"\\$x\"");
        assert_eq!(cmd.arguments().len(), 2);
        assert_eq!(cmd.program(), "echo");
    }

    #[test]
    fn test_exec_result_combined() {
        let result = ExecResult {
            exit_code: 0,
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
        };
        assert!(result.success());
        assert_eq!(result.combined_output(), "stdout\nstderr");

        let failed = ExecResult {
            exit_code: 2,
            stdout: String::new(),
            stderr: "error message".to_string(),
        };
        assert!(!failed.success());
        assert_eq!(failed.combined_output(), "error message");
    }

    #[tokio::test]
    async fn test_shell_runner_echo() {
        let runner = ShellRunner::new();
        let result = runner
            .run(&HostCommand::new("echo").arg("hello"))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test]
    async fn test_shell_runner_spawn_failure() {
        let runner = ShellRunner::new();
        let result = runner
            .run(&HostCommand::new("/nonexistent/ayame-test-binary"))
            .await;
        assert!(matches!(result, Err(ShellError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_shell_runner_dry_run_skips_execution() {
        let runner = ShellRunner::dry_run();
        assert!(runner.is_dry_run());
        let result = runner
            .run(&HostCommand::new("/nonexistent/ayame-test-binary"))
            .await
            .unwrap();
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_exec_checked_failure() {
        let runner = ShellRunner::new();
        let result = exec_checked(&runner, &HostCommand::new("false")).await;
        match result {
            Err(ShellError::CommandFailed { exit_code, .. }) => assert_eq!(exit_code, 1),
            other => panic!("Expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recording_runner_captures_in_order() {
        let runner = RecordingRunner::new();
        exec_checked(&runner, &HostCommand::new(IP_CMD).args(["netns", "add", "a"]))
            .await
            .unwrap();
        exec_checked(&runner, &HostCommand::new(IP_CMD).args(["netns", "add", "b"]))
            .await
            .unwrap();

        assert_eq!(
            runner.commands(),
            vec!["/sbin/ip netns add a", "/sbin/ip netns add b"]
        );
        assert_eq!(runner.count_matching("netns add"), 2);

        runner.clear();
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_recording_runner_injected_failure() {
        let runner = RecordingRunner::new();
        runner.fail_on("add-br br0");
        let cmd = HostCommand::new(OVS_VSCTL_CMD).args(["add-br", "br0"]);

        let err = exec_checked(&runner, &cmd).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        // Failed commands are still recorded
        assert_eq!(runner.commands(), vec!["/usr/bin/ovs-vsctl add-br br0"]);
    }

    #[tokio::test]
    async fn test_recording_runner_failure_output() {
        let runner = RecordingRunner::new();
        runner.fail_with("netns pids", "Cannot open network namespace: Permission denied");
        let result = runner
            .run(&HostCommand::new(IP_CMD).args(["netns", "pids", "ns1"]))
            .await
            .unwrap();
        assert!(!result.success());
        assert_eq!(result.stderr, "Cannot open network namespace: Permission denied");
    }
}
