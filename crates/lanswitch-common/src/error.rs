//! Error types for external command execution.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for command execution.
pub type ShellResult<T> = Result<T, ShellError>;

/// Errors that can occur while running an external command.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The command could not be spawned.
    #[error("Failed to execute command '{command}': {source}")]
    Spawn {
        /// The command line that failed to start.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The command ran past its deadline and was killed.
    #[error("Command timed out after {timeout_ms}ms: '{command}'")]
    Timeout {
        /// The command line.
        command: String,
        /// The deadline that was exceeded.
        timeout_ms: u64,
    },

    /// The command returned a non-zero exit code.
    #[error("Command failed: '{command}' (exit code {exit_code}): {output}")]
    Failed {
        /// The command line.
        command: String,
        /// The exit code (-1 when terminated by a signal).
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },
}

impl ShellError {
    /// Returns true if the program itself is not installed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ShellError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Returns true if the command was killed for exceeding its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ShellError::Timeout { .. })
    }

    /// Returns true if the failure indicates missing privileges.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            ShellError::Spawn { source, .. } => source.kind() == io::ErrorKind::PermissionDenied,
            ShellError::Failed { output, .. } => {
                output.contains("Operation not permitted") || output.contains("Permission denied")
            }
            ShellError::Timeout { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_display() {
        let err = ShellError::Failed {
            command: "/sbin/ip addr add 192.168.7.254/24 dev eth0".to_string(),
            exit_code: 2,
            output: "RTNETLINK answers: File exists".to_string(),
        };
        assert!(err.to_string().contains("ip addr add"));
        assert!(err.to_string().contains("exit code 2"));
    }

    #[test]
    fn test_timeout_display() {
        let err = ShellError::Timeout {
            command: "ping -c 1 8.8.8.8".to_string(),
            timeout_ms: 3000,
        };
        assert_eq!(
            err.to_string(),
            "Command timed out after 3000ms: 'ping -c 1 8.8.8.8'"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_classification() {
        let missing = ShellError::Spawn {
            command: "arping".to_string(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_permission_denied());

        let eperm = ShellError::Failed {
            command: "ip addr del".to_string(),
            exit_code: 2,
            output: "RTNETLINK answers: Operation not permitted".to_string(),
        };
        assert!(eperm.is_permission_denied());
        assert!(!eperm.is_not_found());
    }
}
