//! In-memory host used by the integration tests.
//!
//! `FakeNetwork` models one interface: its assigned addresses, link state,
//! ping reachability and a byte counter advancing at a configurable rate
//! on the tokio clock. Failures can be injected per operation.

#![allow(dead_code)]

use async_trait::async_trait;
use lanswitch_common::ShellError;
use lanswitch_types::{InterfaceAddress, IpAddress};
use lanswitchd::{
    AddressManager, ArpAnnouncer, CounterKind, InterfaceStats, LanSwitchConfig, LinkState,
    NetError, Pinger, ProbeError,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub const IFACE: &str = "eth1";
pub const PRIMARY: &str = "192.168.7.1/24";
pub const SECONDARY: &str = "192.168.7.254/24";

pub fn primary() -> InterfaceAddress {
    PRIMARY.parse().unwrap()
}

pub fn secondary() -> InterfaceAddress {
    SECONDARY.parse().unwrap()
}

/// Config matching the fake: one probe target, 10 Mbps threshold, N = M = 3,
/// 10s cooldown, no settle delay.
pub fn test_config() -> LanSwitchConfig {
    let mut config = LanSwitchConfig::new(IFACE, primary(), secondary());
    config.probe.targets = vec!["8.8.8.8".to_string()];
    config.health.speed_threshold_mbps = 10.0;
    config.failover.down_cycles = 3;
    config.failover.up_cycles = 3;
    config.failover.cooldown_secs = 10;
    config.swap.settle_ms = 0;
    config
}

/// Recorded interface mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Add(InterfaceAddress),
    Remove(InterfaceAddress),
    Arp(IpAddress),
    LinkUp,
}

#[derive(Debug)]
pub struct FakeState {
    pub addresses: Vec<InterfaceAddress>,
    pub link: LinkState,
    pub reachable: bool,
    /// Traffic rate fed into the byte counter
    pub mbps: f64,
    pub counters_readable: bool,
    /// Adding this address fails with a command error
    pub fail_add: Option<InterfaceAddress>,
    /// Adding reports success but the kernel keeps nothing
    pub add_ignored: bool,
    pub fail_remove: bool,
    pub fail_list: bool,
    pub permission_denied: bool,
    pub arp_fails: bool,
    pub events: Vec<Event>,
    counter: u64,
    counter_at: Instant,
}

pub struct FakeNetwork {
    state: Mutex<FakeState>,
}

impl FakeNetwork {
    /// Link up, only `addresses` assigned, probes succeed at 50 Mbps.
    pub fn new(addresses: &[InterfaceAddress]) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                addresses: addresses.to_vec(),
                link: LinkState::Up,
                reachable: true,
                mbps: 50.0,
                counters_readable: true,
                fail_add: None,
                add_ignored: false,
                fail_remove: false,
                fail_list: false,
                permission_denied: false,
                arp_fails: false,
                events: Vec::new(),
                counter: 0,
                counter_at: Instant::now(),
            }),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Uplink down: probes fail and traffic drops to 2 Mbps.
    pub fn set_degraded(&self) {
        let mut s = self.state();
        s.reachable = false;
        s.mbps = 2.0;
    }

    /// Uplink up: probes succeed at 50 Mbps.
    pub fn set_healthy(&self) {
        let mut s = self.state();
        s.reachable = true;
        s.mbps = 50.0;
    }

    pub fn addresses(&self) -> Vec<InterfaceAddress> {
        self.state().addresses.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn count(&self, wanted: impl Fn(&Event) -> bool) -> usize {
        self.state().events.iter().filter(|e| wanted(e)).count()
    }

    fn command_failure(&self, command: &str) -> NetError {
        let output = if self.state().permission_denied {
            "RTNETLINK answers: Operation not permitted"
        } else {
            "RTNETLINK answers: No such device"
        };
        NetError::Command(ShellError::Failed {
            command: command.to_string(),
            exit_code: 2,
            output: output.to_string(),
        })
    }
}

#[async_trait]
impl Pinger for FakeNetwork {
    async fn ping(&self, target: &str, timeout: Duration) -> Result<Duration, ProbeError> {
        if self.state().reachable {
            Ok(Duration::from_millis(12))
        } else {
            Err(ProbeError::Timeout {
                target: target.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[async_trait]
impl InterfaceStats for FakeNetwork {
    async fn byte_counter(&self, interface: &str, _kind: CounterKind) -> Result<u64, ProbeError> {
        let mut s = self.state();
        if !s.counters_readable {
            return Err(ProbeError::Counters {
                interface: interface.to_string(),
                detail: "No such file or directory".to_string(),
            });
        }
        let now = Instant::now();
        let elapsed = now.duration_since(s.counter_at).as_secs_f64();
        s.counter += (s.mbps * 1_000_000.0 / 8.0 * elapsed) as u64;
        s.counter_at = now;
        Ok(s.counter)
    }
}

#[async_trait]
impl AddressManager for FakeNetwork {
    async fn list_addresses(&self, _interface: &str) -> Result<Vec<InterfaceAddress>, NetError> {
        let failing = self.state().fail_list;
        if failing {
            return Err(self.command_failure(&format!("ip -o addr show dev {}", IFACE)));
        }
        Ok(self.addresses())
    }

    async fn add_address(&self, _interface: &str, addr: &InterfaceAddress) -> Result<(), NetError> {
        let failing = self.state().fail_add == Some(*addr);
        if failing {
            return Err(self.command_failure(&format!("ip address add {} dev {}", addr, IFACE)));
        }
        let mut s = self.state();
        s.events.push(Event::Add(*addr));
        if !s.add_ignored && !s.addresses.contains(addr) {
            s.addresses.push(*addr);
        }
        Ok(())
    }

    async fn remove_address(
        &self,
        _interface: &str,
        addr: &InterfaceAddress,
    ) -> Result<(), NetError> {
        let failing = self.state().fail_remove;
        if failing {
            return Err(self.command_failure(&format!("ip address del {} dev {}", addr, IFACE)));
        }
        let mut s = self.state();
        s.events.push(Event::Remove(*addr));
        s.addresses.retain(|a| a != addr);
        Ok(())
    }

    async fn link_state(&self, _interface: &str) -> Result<LinkState, NetError> {
        Ok(self.state().link)
    }

    async fn set_link_up(&self, _interface: &str) -> Result<(), NetError> {
        let mut s = self.state();
        s.events.push(Event::LinkUp);
        s.link = LinkState::Up;
        Ok(())
    }
}

#[async_trait]
impl ArpAnnouncer for FakeNetwork {
    async fn announce(&self, _interface: &str, ip: &IpAddress, _count: u32) -> Result<(), NetError> {
        let mut s = self.state();
        s.events.push(Event::Arp(*ip));
        if s.arp_fails {
            return Err(NetError::Unavailable("arping".to_string()));
        }
        Ok(())
    }
}
