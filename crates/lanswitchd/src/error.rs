//! Error types for lanswitchd
//!
//! Three kinds reach the daemon's decision logic:
//! - [`ProbeError`]: a single probe or counter read failed. Transient; folded
//!   into the health verdict and never propagated.
//! - [`SwapError`]: an address change could not be completed. Logged, the
//!   transition is not committed, retried next cycle.
//! - [`ConfigError`]: fatal at startup only.
//!
//! [`NetError`] is what the OS-facing capabilities return; the swap
//! procedure wraps it into a [`SwapError`] naming the failed step.

use lanswitch_common::ShellError;
use lanswitch_types::InterfaceAddress;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of an address/link/ARP capability call.
#[derive(Debug, Error)]
pub enum NetError {
    /// The underlying command failed, timed out or could not be started
    #[error(transparent)]
    Command(#[from] ShellError),

    /// The command ran but its output could not be understood
    #[error("Unexpected output from {what}: {detail}")]
    Parse { what: String, detail: String },

    /// A required tool is not installed
    #[error("{0} is not available on this host")]
    Unavailable(String),

    /// Kernel state read failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl NetError {
    /// Returns true if the failure looks like missing privileges.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            NetError::Command(e) => e.is_permission_denied(),
            NetError::Io(e) => e.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

/// Failure of a single reachability probe or throughput read.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no reply from {target} within {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("{target} unreachable: {detail}")]
    Unreachable { target: String, detail: String },

    #[error("interface counters unavailable for {interface}: {detail}")]
    Counters { interface: String, detail: String },

    #[error(transparent)]
    Command(#[from] ShellError),
}

/// The step of the swap procedure that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStep {
    /// Listing the interface addresses before acting
    ReadState,
    /// Adding the target address
    AddTarget,
    /// Read-back after adding the target
    VerifyTarget,
    /// Removing the previously active address
    RemoveSource,
    /// Read-back after removing the previously active address
    VerifySource,
}

impl fmt::Display for SwapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwapStep::ReadState => "read-state",
            SwapStep::AddTarget => "add-target",
            SwapStep::VerifyTarget => "verify-target",
            SwapStep::RemoveSource => "remove-source",
            SwapStep::VerifySource => "verify-source",
        };
        f.write_str(s)
    }
}

/// An address change that did not complete.
///
/// The caller must not assume any of the steps before `step` took effect;
/// the interface is re-read before the next attempt.
#[derive(Debug, Error)]
#[error("swap {from} -> {to} on {interface} failed at {step}: {reason}")]
pub struct SwapError {
    pub interface: String,
    pub from: InterfaceAddress,
    pub to: InterfaceAddress,
    pub step: SwapStep,
    pub reason: String,
    #[source]
    pub source: Option<NetError>,
}

impl SwapError {
    pub(crate) fn new(
        interface: &str,
        from: InterfaceAddress,
        to: InterfaceAddress,
        step: SwapStep,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            interface: interface.to_string(),
            from,
            to,
            step,
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn with_source(mut self, source: NetError) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns true if the swap failed for lack of privileges.
    pub fn is_permission_denied(&self) -> bool {
        self.source
            .as_ref()
            .is_some_and(NetError::is_permission_denied)
    }
}

/// Configuration errors; the daemon refuses to start on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("Interface '{0}' does not exist")]
    InterfaceNotFound(String),
}

impl ConfigError {
    /// Creates an invalid configuration error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Top-level error for lanswitchd operations
#[derive(Debug, Error)]
pub enum LanSwitchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Swap error: {0}")]
    Swap(#[from] SwapError),

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for lanswitchd operations
pub type Result<T> = std::result::Result<T, LanSwitchError>;
