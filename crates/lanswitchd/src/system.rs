//! Linux implementation of the network capabilities.
//!
//! Addresses and links are driven through `ip`, reachability through
//! `ping`, announcements through `arping`, and throughput from the sysfs
//! statistics counters. Every command runs with a deadline.

use crate::error::{NetError, ProbeError};
use crate::net::{AddressManager, ArpAnnouncer, InterfaceStats, Pinger};
use crate::types::{CounterKind, LinkState};
use async_trait::async_trait;
use lanswitch_common::shell::{self, ARPING_CMD, IP_CMD, PING_CMD};
use lanswitch_common::ShellError;
use lanswitch_types::{InterfaceAddress, IpAddress};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default sysfs directory holding per-interface statistics
pub const SYSFS_NET: &str = "/sys/class/net";

static PING_RTT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time[=<]\s*([0-9]+(?:\.[0-9]+)?)\s*ms").expect("Invalid regex pattern"));

static LINK_FLAGS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Z0-9_,-]*)>").expect("Invalid regex pattern"));

/// Host network stack accessed through system tools.
#[derive(Debug, Clone)]
pub struct SystemNetwork {
    command_timeout: Duration,
    sysfs_root: PathBuf,
}

impl SystemNetwork {
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            command_timeout,
            sysfs_root: PathBuf::from(SYSFS_NET),
        }
    }

    /// Reads statistics from another directory laid out like `/sys/class/net`.
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    async fn read_counter(&self, interface: &str, name: &str) -> Result<u64, ProbeError> {
        let path = self
            .sysfs_root
            .join(interface)
            .join("statistics")
            .join(name);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ProbeError::Counters {
                interface: interface.to_string(),
                detail: format!("{}: {}", path.display(), e),
            })?;
        text.trim().parse::<u64>().map_err(|e| ProbeError::Counters {
            interface: interface.to_string(),
            detail: format!("{}: {}", path.display(), e),
        })
    }
}

/// Extracts the addresses from `ip -o addr show` output.
pub fn parse_addr_show(output: &str) -> Vec<InterfaceAddress> {
    let mut addrs = Vec::new();
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "inet" || token == "inet6" {
                if let Some(addr) = tokens.next().and_then(|t| t.parse().ok()) {
                    addrs.push(addr);
                }
                break;
            }
        }
    }
    addrs
}

/// Derives the administrative link state from `ip -o link show` output.
pub fn parse_link_show(output: &str) -> LinkState {
    match LINK_FLAGS_RE.captures(output) {
        Some(caps) if caps[1].split(',').any(|flag| flag == "UP") => LinkState::Up,
        _ => LinkState::Down,
    }
}

/// Extracts the round-trip time in milliseconds from `ping` output.
pub fn parse_ping_rtt(output: &str) -> Option<f64> {
    PING_RTT_RE
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
}

#[async_trait]
impl Pinger for SystemNetwork {
    async fn ping(&self, target: &str, timeout: Duration) -> Result<Duration, ProbeError> {
        // -W takes whole seconds on older iputils
        let wait_secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        let wait = wait_secs.to_string();
        let started = Instant::now();

        let result = shell::exec(
            PING_CMD,
            &["-n", "-c", "1", "-W", &wait, target],
            timeout + Duration::from_secs(1),
        )
        .await
        .map_err(|e| match e {
            ShellError::Timeout { .. } => ProbeError::Timeout {
                target: target.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
            other => ProbeError::Command(other),
        })?;

        match result.exit_code {
            0 => Ok(parse_ping_rtt(&result.stdout)
                .map(|ms| Duration::from_secs_f64(ms / 1000.0))
                .unwrap_or_else(|| started.elapsed())),
            1 => Err(ProbeError::Timeout {
                target: target.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            _ => Err(ProbeError::Unreachable {
                target: target.to_string(),
                detail: result.combined_output(),
            }),
        }
    }
}

#[async_trait]
impl InterfaceStats for SystemNetwork {
    async fn byte_counter(&self, interface: &str, kind: CounterKind) -> Result<u64, ProbeError> {
        match kind {
            CounterKind::Tx => self.read_counter(interface, "tx_bytes").await,
            CounterKind::Rx => self.read_counter(interface, "rx_bytes").await,
            CounterKind::Both => {
                let tx = self.read_counter(interface, "tx_bytes").await?;
                let rx = self.read_counter(interface, "rx_bytes").await?;
                Ok(tx.wrapping_add(rx))
            }
        }
    }
}

#[async_trait]
impl AddressManager for SystemNetwork {
    async fn list_addresses(&self, interface: &str) -> Result<Vec<InterfaceAddress>, NetError> {
        let output = shell::exec_or_fail(
            IP_CMD,
            &["-o", "addr", "show", "dev", interface],
            self.command_timeout,
        )
        .await?;
        let addrs = parse_addr_show(&output);
        debug!(interface, addresses = ?addrs, "Read interface addresses");
        Ok(addrs)
    }

    async fn add_address(&self, interface: &str, addr: &InterfaceAddress) -> Result<(), NetError> {
        let cidr = addr.to_string();
        let args = ["addr", "add", cidr.as_str(), "dev", interface];
        let result = shell::exec(IP_CMD, &args, self.command_timeout).await?;

        if result.success() {
            info!(interface, address = %addr, "Added address");
            Ok(())
        } else if result.stderr.contains("File exists") {
            warn!(interface, address = %addr, "Kernel reports address already present");
            Ok(())
        } else {
            Err(NetError::Command(ShellError::Failed {
                command: shell::command_line(IP_CMD, &args),
                exit_code: result.exit_code,
                output: result.combined_output(),
            }))
        }
    }

    async fn remove_address(
        &self,
        interface: &str,
        addr: &InterfaceAddress,
    ) -> Result<(), NetError> {
        let cidr = addr.to_string();
        let args = ["addr", "del", cidr.as_str(), "dev", interface];
        let result = shell::exec(IP_CMD, &args, self.command_timeout).await?;

        if result.success() {
            info!(interface, address = %addr, "Removed address");
            Ok(())
        } else if result.stderr.contains("Cannot assign requested address") {
            debug!(interface, address = %addr, "Address already absent");
            Ok(())
        } else {
            Err(NetError::Command(ShellError::Failed {
                command: shell::command_line(IP_CMD, &args),
                exit_code: result.exit_code,
                output: result.combined_output(),
            }))
        }
    }

    async fn link_state(&self, interface: &str) -> Result<LinkState, NetError> {
        let result = shell::exec(
            IP_CMD,
            &["-o", "link", "show", "dev", interface],
            self.command_timeout,
        )
        .await?;

        if result.success() {
            Ok(parse_link_show(&result.stdout))
        } else if result.stderr.contains("does not exist") {
            Ok(LinkState::Missing)
        } else {
            Err(NetError::Parse {
                what: "ip link show".to_string(),
                detail: result.combined_output(),
            })
        }
    }

    async fn set_link_up(&self, interface: &str) -> Result<(), NetError> {
        shell::exec_or_fail(
            IP_CMD,
            &["link", "set", "dev", interface, "up"],
            self.command_timeout,
        )
        .await?;
        info!(interface, "Brought link up");
        Ok(())
    }
}

#[async_trait]
impl ArpAnnouncer for SystemNetwork {
    async fn announce(&self, interface: &str, ip: &IpAddress, count: u32) -> Result<(), NetError> {
        let count_arg = count.max(1).to_string();
        let ip_arg = ip.to_string();
        // arping paces one packet per second
        let deadline = self.command_timeout + Duration::from_secs(u64::from(count.max(1)));
        let mut last_err = None;

        // iputils uses -U for unsolicited ARP, other builds accept -A
        for mode in ["-U", "-A"] {
            let args = ["-c", count_arg.as_str(), mode, "-I", interface, ip_arg.as_str()];
            match shell::exec_or_fail(ARPING_CMD, &args, deadline).await {
                Ok(_) => {
                    info!(interface, ip = %ip, count, "Sent gratuitous ARP");
                    return Ok(());
                }
                Err(e) if e.is_not_found() => {
                    return Err(NetError::Unavailable(ARPING_CMD.to_string()));
                }
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) => Err(NetError::Command(e)),
            None => Err(NetError::Unavailable(ARPING_CMD.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_addr_show() {
        let output = "\
2: eth0    inet 192.168.7.1/24 brd 192.168.7.255 scope global eth0\\       valid_lft forever preferred_lft forever
2: eth0    inet 192.168.7.254/24 scope global secondary eth0\\       valid_lft forever preferred_lft forever
2: eth0    inet6 fe80::1ff:fe23:4567:890a/64 scope link \\       valid_lft forever preferred_lft forever";
        let addrs: Vec<String> = parse_addr_show(output)
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(
            addrs,
            vec![
                "192.168.7.1/24",
                "192.168.7.254/24",
                "fe80::1ff:fe23:4567:890a/64"
            ]
        );
    }

    #[test]
    fn test_parse_addr_show_empty() {
        assert!(parse_addr_show("").is_empty());
        assert!(parse_addr_show("garbage line without addresses").is_empty());
    }

    #[test]
    fn test_parse_link_show() {
        let up = "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP mode DEFAULT";
        assert_eq!(parse_link_show(up), LinkState::Up);

        let down = "2: eth0: <BROADCAST,MULTICAST> mtu 1500 qdisc mq state DOWN mode DEFAULT";
        assert_eq!(parse_link_show(down), LinkState::Down);

        // LOWER_UP alone is not administrative up
        let lower = "3: eth1: <NO-CARRIER,BROADCAST,MULTICAST,LOWER_UP> mtu 1500 state DOWN";
        assert_eq!(parse_link_show(lower), LinkState::Down);
    }

    #[test]
    fn test_parse_ping_rtt() {
        let output = "PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.\n\
                      64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=12.3 ms";
        assert_eq!(parse_ping_rtt(output), Some(12.3));
        assert_eq!(parse_ping_rtt("64 bytes from ::1: time<1 ms"), Some(1.0));
        assert_eq!(parse_ping_rtt("no reply"), None);
    }

    #[tokio::test]
    async fn test_byte_counter_from_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        let stats = dir.path().join("eth0").join("statistics");
        std::fs::create_dir_all(&stats).unwrap();
        std::fs::write(stats.join("tx_bytes"), "1000\n").unwrap();
        std::fs::write(stats.join("rx_bytes"), "234\n").unwrap();

        let net = SystemNetwork::new(Duration::from_secs(1)).with_sysfs_root(dir.path());
        assert_eq!(net.byte_counter("eth0", CounterKind::Tx).await.unwrap(), 1000);
        assert_eq!(net.byte_counter("eth0", CounterKind::Rx).await.unwrap(), 234);
        assert_eq!(net.byte_counter("eth0", CounterKind::Both).await.unwrap(), 1234);
    }

    #[tokio::test]
    async fn test_byte_counter_missing_interface() {
        let dir = tempfile::tempdir().unwrap();
        let net = SystemNetwork::new(Duration::from_secs(1)).with_sysfs_root(dir.path());
        let err = net.byte_counter("eth9", CounterKind::Tx).await.unwrap_err();
        assert!(matches!(err, ProbeError::Counters { .. }));
    }
}
