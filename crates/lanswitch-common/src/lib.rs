//! Common infrastructure for the lanswitch daemon.
//!
//! - [`shell`]: bounded-time execution of external commands (`ip`, `ping`,
//!   `arping`) with captured output
//! - [`error`]: error types for command execution
//!
//! # Example
//!
//! ```ignore
//! use lanswitch_common::shell::{self, IP_CMD};
//! use std::time::Duration;
//!
//! async fn show(dev: &str) -> lanswitch_common::ShellResult<String> {
//!     shell::exec_or_fail(IP_CMD, &["-o", "addr", "show", "dev", dev], Duration::from_secs(5)).await
//! }
//! ```

pub mod error;
pub mod shell;

// Re-export commonly used items at crate root
pub use error::{ShellError, ShellResult};
pub use shell::ExecResult;
