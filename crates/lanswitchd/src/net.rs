//! OS capabilities the daemon drives.
//!
//! The decision logic never talks to the kernel directly; it goes through
//! these traits so the whole control loop can run against an in-memory
//! interface in tests. [`crate::system::SystemNetwork`] is the Linux
//! implementation.

use crate::error::{NetError, ProbeError};
use crate::types::{CounterKind, LinkState};
use async_trait::async_trait;
use lanswitch_types::{InterfaceAddress, IpAddress};
use std::time::Duration;

/// Reachability probe (ICMP echo).
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Sends one echo request and returns the round-trip time.
    async fn ping(&self, target: &str, timeout: Duration) -> Result<Duration, ProbeError>;
}

/// Interface statistics.
#[async_trait]
pub trait InterfaceStats: Send + Sync {
    /// Reads the cumulative byte counter of the interface.
    async fn byte_counter(&self, interface: &str, kind: CounterKind) -> Result<u64, ProbeError>;
}

/// Interface address and link configuration.
#[async_trait]
pub trait AddressManager: Send + Sync {
    /// Lists every address currently assigned to the interface.
    async fn list_addresses(&self, interface: &str) -> Result<Vec<InterfaceAddress>, NetError>;

    /// Assigns an address. Assigning an address that is already present succeeds.
    async fn add_address(&self, interface: &str, addr: &InterfaceAddress) -> Result<(), NetError>;

    /// Removes an address. Removing an absent address succeeds.
    async fn remove_address(&self, interface: &str, addr: &InterfaceAddress)
        -> Result<(), NetError>;

    /// Reports whether the link exists and is administratively up.
    async fn link_state(&self, interface: &str) -> Result<LinkState, NetError>;

    /// Brings the link administratively up.
    async fn set_link_up(&self, interface: &str) -> Result<(), NetError>;
}

/// Gratuitous ARP announcement.
#[async_trait]
pub trait ArpAnnouncer: Send + Sync {
    /// Announces `ip` on `interface` so peers refresh their ARP caches.
    async fn announce(&self, interface: &str, ip: &IpAddress, count: u32) -> Result<(), NetError>;
}

/// Everything the monitoring loop needs from the host.
pub trait NetworkOps: Pinger + InterfaceStats + AddressManager + ArpAnnouncer + 'static {}

impl<T> NetworkOps for T where T: Pinger + InterfaceStats + AddressManager + ArpAnnouncer + 'static {}
