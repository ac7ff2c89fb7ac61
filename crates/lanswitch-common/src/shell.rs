//! Bounded-time execution of external commands.
//!
//! Commands are spawned directly (no intermediate shell) with their output
//! captured. Every call carries a deadline; a command that overruns it is
//! killed and reported as [`ShellError::Timeout`], so no caller can block
//! indefinitely on a wedged `ip` or `arping`.
//!
//! # Example
//!
//! ```ignore
//! use lanswitch_common::shell::{self, IP_CMD};
//!
//! let result = shell::exec(IP_CMD, &["link", "show", "dev", "eth0"], timeout).await?;
//! if result.success() {
//!     println!("{}", result.stdout);
//! }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{ShellError, ShellResult};

/// Path to the `ip` command for address and link configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// The `ping` command, resolved through `PATH`.
pub const PING_CMD: &str = "ping";

/// The `arping` command, resolved through `PATH` (iputils or standalone).
pub const ARPING_CMD: &str = "arping";

/// Characters that need escaping in shell double-quotes: $, `, ", \, newline.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Arguments made only of these characters are printed unquoted.
static PLAIN_ARG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_./:@%+=,-]+$").expect("Invalid regex pattern"));

/// Quotes a string for display as a shell word.
///
/// # Example
///
/// ```
/// use lanswitch_common::shell::shellquote;
///
/// assert_eq!(shellquote("simple"), "\"simple\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Renders a program and its arguments as a copy-pasteable command line
/// for logs and error messages.
pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        if PLAIN_ARG_RE.is_match(arg) {
            line.push_str(arg);
        } else {
            line.push_str(&shellquote(arg));
        }
    }
    line
}

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success, -1 = killed by signal).
    pub exit_code: i32,
    /// Trimmed stdout output.
    pub stdout: String,
    /// Trimmed stderr output.
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

/// Executes a command with a deadline.
///
/// # Returns
///
/// * `Ok(ExecResult)` - The command ran to completion (any exit code)
/// * `Err(ShellError::Spawn)` - The command could not be started
/// * `Err(ShellError::Timeout)` - The deadline passed; the child is killed
pub async fn exec(program: &str, args: &[&str], timeout: Duration) -> ShellResult<ExecResult> {
    let line = command_line(program, args);
    tracing::trace!(command = %line, timeout_ms = timeout.as_millis() as u64, "Executing command");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ShellError::Spawn {
                command: line,
                source: e,
            })
        }
        Err(_) => {
            tracing::warn!(command = %line, timeout_ms = timeout.as_millis() as u64, "Command timed out");
            return Err(ShellError::Timeout {
                command: line,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
    };

    let result = ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if !result.success() {
        tracing::debug!(
            command = %line,
            exit_code = result.exit_code,
            stderr = %result.stderr,
            "Command returned non-zero"
        );
    }

    Ok(result)
}

/// Executes a command and turns a non-zero exit into an error.
///
/// # Returns
///
/// * `Ok(String)` - The stdout output on success
/// * `Err(ShellError)` - Spawn failure, timeout, or non-zero exit
pub async fn exec_or_fail(program: &str, args: &[&str], timeout: Duration) -> ShellResult<String> {
    let result = exec(program, args, timeout).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(ShellError::Failed {
            command: command_line(program, args),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}
