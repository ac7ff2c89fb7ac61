//! Core type definitions for lanswitchd

use lanswitch_types::InterfaceAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Which of the two candidate addresses is (or should be) on the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActiveIp {
    Primary,
    Secondary,
}

impl ActiveIp {
    /// Returns the other candidate.
    pub fn other(self) -> Self {
        match self {
            ActiveIp::Primary => ActiveIp::Secondary,
            ActiveIp::Secondary => ActiveIp::Primary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveIp::Primary => "primary",
            ActiveIp::Secondary => "secondary",
        }
    }
}

impl fmt::Display for ActiveIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two candidate addresses of the managed interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPair {
    pub primary: InterfaceAddress,
    pub secondary: InterfaceAddress,
}

impl AddressPair {
    pub fn new(primary: InterfaceAddress, secondary: InterfaceAddress) -> Self {
        Self { primary, secondary }
    }

    /// Returns the address for the given role.
    pub fn get(&self, which: ActiveIp) -> InterfaceAddress {
        match which {
            ActiveIp::Primary => self.primary,
            ActiveIp::Secondary => self.secondary,
        }
    }

    /// Listed entries holding the host address of `which`, each with the
    /// prefix length the kernel reports for it.
    pub fn matching(&self, which: ActiveIp, assigned: &[InterfaceAddress]) -> Vec<InterfaceAddress> {
        let wanted = self.get(which);
        assigned
            .iter()
            .filter(|a| a.same_host(&wanted))
            .copied()
            .collect()
    }

    /// Classifies an address listing read from the interface.
    pub fn presence(&self, assigned: &[InterfaceAddress]) -> Presence {
        Presence {
            primary: assigned.iter().any(|a| a.same_host(&self.primary)),
            secondary: assigned.iter().any(|a| a.same_host(&self.secondary)),
        }
    }
}

/// Which of the pair's addresses are currently assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub primary: bool,
    pub secondary: bool,
}

impl Presence {
    pub fn has(&self, which: ActiveIp) -> bool {
        match which {
            ActiveIp::Primary => self.primary,
            ActiveIp::Secondary => self.secondary,
        }
    }

    /// Exactly `which` is assigned and the other is not.
    pub fn is_only(&self, which: ActiveIp) -> bool {
        self.has(which) && !self.has(which.other())
    }

    pub fn both(&self) -> bool {
        self.primary && self.secondary
    }

    pub fn neither(&self) -> bool {
        !self.primary && !self.secondary
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "primary={} secondary={}", self.primary, self.secondary)
    }
}

/// Administrative state of the managed link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
    Missing,
}

/// Which kernel byte counter the throughput sample is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    #[default]
    Tx,
    Rx,
    Both,
}

/// Outcome of one reachability probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub target: String,
    pub success: bool,
    pub latency_ms: Option<f64>,
}

impl ProbeResult {
    pub fn success(target: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            target: target.into(),
            success: true,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn failure(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            success: false,
            latency_ms: None,
        }
    }
}

/// Interface throughput over one sample window.
///
/// `bytes_per_second` is `None` when the counters could not be read; such a
/// sample counts as below any threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    pub bytes_per_second: Option<f64>,
    pub measured_at: Instant,
}

impl ThroughputSample {
    pub fn new(bytes_per_second: f64, measured_at: Instant) -> Self {
        Self {
            bytes_per_second: Some(bytes_per_second),
            measured_at,
        }
    }

    pub fn unavailable(measured_at: Instant) -> Self {
        Self {
            bytes_per_second: None,
            measured_at,
        }
    }

    /// Builds a sample from a rate in megabits per second.
    pub fn from_mbps(mbps: f64, measured_at: Instant) -> Self {
        Self::new(mbps * 1_000_000.0 / 8.0, measured_at)
    }

    /// Throughput in megabits per second.
    pub fn mbps(&self) -> Option<f64> {
        self.bytes_per_second.map(|bps| bps * 8.0 / 1_000_000.0)
    }
}

/// Binary health verdict for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    Degraded,
}

impl HealthVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthVerdict::Healthy => "healthy",
            HealthVerdict::Degraded => "degraded",
        }
    }
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State owned by the failover state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverState {
    pub active: ActiveIp,
    pub last_transition_at: Instant,
    pub consecutive_degraded_cycles: u32,
    pub consecutive_healthy_cycles: u32,
}

impl FailoverState {
    /// Startup state: on primary, counters cleared, the clock starts now.
    pub fn initial(now: Instant) -> Self {
        Self {
            active: ActiveIp::Primary,
            last_transition_at: now,
            consecutive_degraded_cycles: 0,
            consecutive_healthy_cycles: 0,
        }
    }
}
