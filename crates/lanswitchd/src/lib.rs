//! LAN interface address failover daemon
//!
//! lanswitchd watches the uplink of one LAN interface and, when the uplink
//! is confirmed degraded, moves the interface from its primary address to a
//! secondary one. Downstream hosts using the secondary address as their
//! gateway then take over. When the uplink recovers the primary address is
//! restored.
//!
//! # Architecture
//!
//! ```text
//! +-----------+   ProbeResult[]    +----------------+  verdict  +-------------------+
//! |  probe    |------------------->|    health      |---------->|     failover      |
//! | (ping,    |  ThroughputSample  | (dual signal)  |           | (debounce,        |
//! |  sysfs)   |------------------->|                |           |  cooldown)        |
//! +-----------+                    +----------------+           +---------+---------+
//!       ^                                                                 | swap
//!       |            monitor: one cycle per interval                      v
//!       |                                                       +-------------------+
//!       +--------------------- net::NetworkOps <----------------|       swap        |
//!                              (system: ip, ping, arping)       | (add/verify/      |
//!                                                               |  remove/ARP)      |
//!                                                               +-------------------+
//! ```
//!
//! # Modules
//!
//! - [`probe`]: reachability probes and throughput samples
//! - [`health`]: combines both signals into a verdict
//! - [`failover`]: PRIMARY/SECONDARY state machine
//! - [`swap`]: verified address change and reconciliation
//! - [`monitor`]: the periodic loop and restore-on-exit guard
//! - [`system`]: Linux implementation of [`net::NetworkOps`]

pub mod config;
pub mod error;
pub mod failover;
pub mod health;
pub mod lifecycle;
pub mod logging;
pub mod monitor;
pub mod net;
pub mod probe;
pub mod swap;
pub mod system;
pub mod types;

pub use config::LanSwitchConfig;
pub use error::{
    ConfigError, LanSwitchError, NetError, ProbeError, Result, SwapError, SwapStep,
};
pub use failover::{CycleOutcome, Decision, FailoverPolicy, FailoverStateMachine};
pub use health::{HealthAssessment, HealthEvaluator};
pub use lifecycle::SystemdNotifier;
pub use monitor::{CycleReport, ManagedInterface, Monitor};
pub use net::{AddressManager, ArpAnnouncer, InterfaceStats, NetworkOps, Pinger};
pub use probe::ProbeExecutor;
pub use swap::{IpSwapper, ReconcileAction, SwapOrder, SwapOutcome, SwapSettings};
pub use system::SystemNetwork;
pub use types::{
    ActiveIp, AddressPair, CounterKind, FailoverState, HealthVerdict, LinkState, Presence,
    ProbeResult, ThroughputSample,
};
