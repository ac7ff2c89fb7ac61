//! Address types shared by the lanswitch crates.
//!
//! - [`IpAddress`]: IPv4 or IPv6 host address
//! - [`InterfaceAddress`]: an address as assigned to an interface, in CIDR
//!   notation (`192.168.7.1/24`), keeping the host bits

mod ip;

pub use ip::{InterfaceAddress, IpAddress};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid interface address (expected ADDR/LEN): {0}")]
    InvalidInterfaceAddress(String),

    #[error("prefix length {len} exceeds maximum {max} for {addr}")]
    PrefixTooLong { addr: String, len: u8, max: u8 },
}
