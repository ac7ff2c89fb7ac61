//! Configuration file support for lanswitchd
//!
//! Loads and validates the daemon configuration from a TOML file.
//! Default location: /etc/lanswitch/lanswitchd.toml
//!
//! ```toml
//! [interface]
//! name = "enP1p1s0"
//! primary = "192.168.7.1/24"
//! secondary = "192.168.7.254/24"
//!
//! [probe]
//! targets = ["8.8.8.8", "1.1.1.1", "9.9.9.9", "8.8.4.4"]
//!
//! [health]
//! speed_threshold_mbps = 10.0
//! ```
//!
//! Every other key has a default. The loaded configuration is immutable and
//! shared as `Arc<LanSwitchConfig>`.

use crate::error::ConfigError;
use crate::swap::SwapOrder;
use crate::types::{AddressPair, CounterKind};
use lanswitch_types::{InterfaceAddress, IpAddress};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/lanswitch/lanswitchd.toml";

static HOSTNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,62})(\.[A-Za-z0-9]([A-Za-z0-9-]{0,62}))*\.?$")
        .expect("Invalid regex pattern")
});

/// The managed interface and its two candidate addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface name (e.g. "eth0")
    pub name: String,

    /// Address held while the uplink is healthy
    pub primary: InterfaceAddress,

    /// Address held while the uplink is down
    pub secondary: InterfaceAddress,
}

/// Reachability and throughput probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Hosts pinged every cycle
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,

    /// Per-probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,

    /// Fraction of failed probes (0, 1] at which connectivity counts as lost.
    /// 1.0 requires every target to fail; 0.5 means at least half.
    #[serde(default = "default_failure_ratio")]
    pub failure_ratio: f64,

    /// Window between the two counter reads of a throughput sample
    #[serde(default = "default_sample_window_ms")]
    pub sample_window_ms: u64,

    /// Kernel byte counter used for throughput
    #[serde(default)]
    pub counter: CounterKind,
}

/// Health verdict thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Throughput below this (Mbps) corroborates a connectivity loss
    #[serde(default = "default_speed_threshold_mbps")]
    pub speed_threshold_mbps: f64,
}

/// Failover timing policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Seconds between monitoring cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Consecutive degraded cycles before leaving the primary address (N)
    #[serde(default = "default_down_cycles")]
    pub down_cycles: u32,

    /// Consecutive healthy cycles before returning to the primary address (M)
    #[serde(default = "default_up_cycles")]
    pub up_cycles: u32,

    /// Minimum seconds between two transitions
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Consecutive swap failures that raise a fatal alert
    #[serde(default = "default_swap_failure_alert_threshold")]
    pub swap_failure_alert_threshold: u32,

    /// Seconds between checks that the interface holds exactly the active address
    #[serde(default = "default_sanity_check_secs")]
    pub sanity_check_secs: u64,
}

/// Address change procedure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    /// Order of add/remove during a swap
    #[serde(default)]
    pub order: SwapOrder,

    /// Deadline for each `ip`/`arping` invocation in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Pause after each address mutation before reading back, in milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Gratuitous ARP packets sent after a change
    #[serde(default = "default_arp_count")]
    pub arp_count: u32,
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Persistent log file, appended to
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Emit a status summary every this many cycles (0 disables)
    #[serde(default = "default_summary_every")]
    pub summary_every: u64,
}

/// Complete lanswitchd configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanSwitchConfig {
    pub interface: InterfaceConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub failover: FailoverConfig,

    #[serde(default)]
    pub swap: SwapConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_targets() -> Vec<String> {
    ["8.8.8.8", "1.1.1.1", "9.9.9.9", "8.8.4.4"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_failure_ratio() -> f64 {
    1.0
}

fn default_sample_window_ms() -> u64 {
    2000
}

fn default_speed_threshold_mbps() -> f64 {
    10.0
}

fn default_interval_secs() -> u64 {
    5
}

fn default_down_cycles() -> u32 {
    3
}

fn default_up_cycles() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    10
}

fn default_swap_failure_alert_threshold() -> u32 {
    3
}

fn default_sanity_check_secs() -> u64 {
    30
}

fn default_command_timeout_ms() -> u64 {
    5000
}

fn default_settle_ms() -> u64 {
    500
}

fn default_arp_count() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_summary_every() -> u64 {
    10
}

// Default implementations
impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            timeout_ms: default_probe_timeout_ms(),
            failure_ratio: default_failure_ratio(),
            sample_window_ms: default_sample_window_ms(),
            counter: CounterKind::default(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            speed_threshold_mbps: default_speed_threshold_mbps(),
        }
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            down_cycles: default_down_cycles(),
            up_cycles: default_up_cycles(),
            cooldown_secs: default_cooldown_secs(),
            swap_failure_alert_threshold: default_swap_failure_alert_threshold(),
            sanity_check_secs: default_sanity_check_secs(),
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            order: SwapOrder::default(),
            command_timeout_ms: default_command_timeout_ms(),
            settle_ms: default_settle_ms(),
            arp_count: default_arp_count(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            summary_every: default_summary_every(),
        }
    }
}

impl LanSwitchConfig {
    /// Creates a configuration for the given interface with every other
    /// setting at its default.
    pub fn new(name: impl Into<String>, primary: InterfaceAddress, secondary: InterfaceAddress) -> Self {
        Self {
            interface: InterfaceConfig {
                name: name.into(),
                primary,
                secondary,
            },
            probe: ProbeConfig::default(),
            health: HealthConfig::default(),
            failover: FailoverConfig::default(),
            swap: SwapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load and validate configuration from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.interface.name;
        if name.is_empty() || name.len() > 15 {
            return Err(ConfigError::invalid(
                "interface.name",
                "must be 1-15 characters",
            ));
        }
        if name.chars().any(|c| c.is_whitespace() || c == '/' || c == ':') {
            return Err(ConfigError::invalid(
                "interface.name",
                format!("'{}' contains whitespace, '/' or ':'", name),
            ));
        }

        let (primary, secondary) = (&self.interface.primary, &self.interface.secondary);
        if primary.same_host(secondary) {
            return Err(ConfigError::invalid(
                "interface.secondary",
                "must differ from interface.primary",
            ));
        }
        if primary.is_ipv4() != secondary.is_ipv4() {
            return Err(ConfigError::invalid(
                "interface.secondary",
                "must be the same address family as interface.primary",
            ));
        }

        if self.probe.targets.is_empty() {
            return Err(ConfigError::invalid("probe.targets", "must not be empty"));
        }
        for target in &self.probe.targets {
            if target.parse::<IpAddress>().is_err() && !HOSTNAME_RE.is_match(target) {
                return Err(ConfigError::invalid(
                    "probe.targets",
                    format!("'{}' is neither an IP address nor a hostname", target),
                ));
            }
        }
        if self.probe.timeout_ms == 0 {
            return Err(ConfigError::invalid("probe.timeout_ms", "must be > 0"));
        }
        if self.probe.sample_window_ms == 0 {
            return Err(ConfigError::invalid("probe.sample_window_ms", "must be > 0"));
        }
        let ratio = self.probe.failure_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "probe.failure_ratio",
                "must be in (0, 1]",
            ));
        }

        let threshold = self.health.speed_threshold_mbps;
        if threshold.is_nan() || threshold < 0.0 {
            return Err(ConfigError::invalid(
                "health.speed_threshold_mbps",
                "must be >= 0",
            ));
        }

        if self.failover.interval_secs == 0 {
            return Err(ConfigError::invalid("failover.interval_secs", "must be > 0"));
        }
        if self.failover.down_cycles == 0 {
            return Err(ConfigError::invalid("failover.down_cycles", "must be > 0"));
        }
        if self.failover.up_cycles == 0 {
            return Err(ConfigError::invalid("failover.up_cycles", "must be > 0"));
        }
        if self.failover.swap_failure_alert_threshold == 0 {
            return Err(ConfigError::invalid(
                "failover.swap_failure_alert_threshold",
                "must be > 0",
            ));
        }
        if self.swap.command_timeout_ms == 0 {
            return Err(ConfigError::invalid("swap.command_timeout_ms", "must be > 0"));
        }
        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            return Err(ConfigError::invalid("logging.level", e.to_string()));
        }

        Ok(())
    }

    /// The two candidate addresses
    pub fn addresses(&self) -> AddressPair {
        AddressPair::new(self.interface.primary, self.interface.secondary)
    }

    /// Get per-probe timeout as Duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.timeout_ms)
    }

    /// Get throughput sample window as Duration
    pub fn sample_window(&self) -> Duration {
        Duration::from_millis(self.probe.sample_window_ms)
    }

    /// Get cycle interval as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.failover.interval_secs)
    }

    /// Get transition cooldown as Duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.failover.cooldown_secs)
    }

    /// Get sanity check period as Duration (None when disabled)
    pub fn sanity_check_period(&self) -> Option<Duration> {
        match self.failover.sanity_check_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Get command deadline as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.swap.command_timeout_ms)
    }

    /// Get post-mutation settle delay as Duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.swap.settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[interface]
name = "enP1p1s0"
primary = "192.168.7.1/24"
secondary = "192.168.7.254/24"
"#;

    fn base() -> LanSwitchConfig {
        LanSwitchConfig::from_toml_str(MINIMAL).unwrap()
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = base();
        assert_eq!(config.interface.name, "enP1p1s0");
        assert_eq!(config.interface.primary.to_string(), "192.168.7.1/24");
        assert_eq!(config.probe.targets.len(), 4);
        assert_eq!(config.probe.failure_ratio, 1.0);
        assert_eq!(config.probe.counter, CounterKind::Tx);
        assert_eq!(config.health.speed_threshold_mbps, 10.0);
        assert_eq!(config.failover.down_cycles, 3);
        assert_eq!(config.failover.up_cycles, 3);
        assert_eq!(config.swap.order, SwapOrder::AddFirst);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_duration_accessors() {
        let config = base();
        assert_eq!(config.probe_timeout(), Duration::from_secs(2));
        assert_eq!(config.sample_window(), Duration::from_secs(2));
        assert_eq!(config.interval(), Duration::from_secs(5));
        assert_eq!(config.cooldown(), Duration::from_secs(10));
        assert_eq!(config.sanity_check_period(), Some(Duration::from_secs(30)));
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_full_config_parse() {
        let text = r#"
[interface]
name = "eth1"
primary = "10.0.0.1/24"
secondary = "10.0.0.2/24"

[probe]
targets = ["1.1.1.1", "gateway.lan"]
timeout_ms = 1000
failure_ratio = 0.5
counter = "both"

[health]
speed_threshold_mbps = 2.5

[failover]
interval_secs = 1
down_cycles = 6
up_cycles = 8
cooldown_secs = 8
sanity_check_secs = 0

[swap]
order = "remove-first"
arp_count = 5

[logging]
level = "debug"
file = "/var/log/lan_ip_switch.log"
"#;
        let config = LanSwitchConfig::from_toml_str(text).unwrap();
        assert_eq!(config.probe.targets, vec!["1.1.1.1", "gateway.lan"]);
        assert_eq!(config.probe.counter, CounterKind::Both);
        assert_eq!(config.failover.up_cycles, 8);
        assert_eq!(config.sanity_check_period(), None);
        assert_eq!(config.swap.order, SwapOrder::RemoveFirst);
        assert_eq!(config.swap.arp_count, 5);
        assert_eq!(
            config.logging.file.as_deref(),
            Some(Path::new("/var/log/lan_ip_switch.log"))
        );
    }

    #[test]
    fn test_malformed_address_rejected() {
        let text = MINIMAL.replace("192.168.7.254/24", "192.168.7.999/24");
        assert!(matches!(
            LanSwitchConfig::from_toml_str(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_interface_section_rejected() {
        assert!(LanSwitchConfig::from_toml_str("[probe]\ntimeout_ms = 5\n").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = base();
        config.probe.targets.clear();
        assert!(config.validate().is_err());

        let mut config = base();
        config.probe.targets = vec!["not a host!".to_string()];
        assert!(config.validate().is_err());

        let mut config = base();
        config.interface.secondary = config.interface.primary;
        assert!(config.validate().is_err());

        let mut config = base();
        config.interface.secondary = "2001:db8::1/64".parse().unwrap();
        assert!(config.validate().is_err());

        let mut config = base();
        config.interface.name = "eth 0".to_string();
        assert!(config.validate().is_err());

        let mut config = base();
        config.interface.name = String::new();
        assert!(config.validate().is_err());

        let mut config = base();
        config.probe.failure_ratio = 0.0;
        assert!(config.validate().is_err());

        let mut config = base();
        config.probe.failure_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = base();
        config.health.speed_threshold_mbps = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = base();
        config.failover.down_cycles = 0;
        assert!(config.validate().is_err());

        let mut config = base();
        config.failover.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_checks_log_filter() {
        let mut config = base();
        config.logging.level = "info,lanswitchd=debug".to_string();
        assert!(config.validate().is_ok());

        config.logging.level = "lanswitchd=loud".to_string();
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "logging.level"),
            other => panic!("expected invalid logging.level, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = LanSwitchConfig::load(file.path()).unwrap();
        assert_eq!(config.interface.name, "enP1p1s0");
    }

    #[test]
    fn test_load_missing_file() {
        let err = LanSwitchConfig::load("/nonexistent/lanswitchd.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_toml_round_trip_keeps_addresses() {
        let config = base();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("192.168.7.254/24"));
        let again = LanSwitchConfig::from_toml_str(&text).unwrap();
        assert_eq!(again.addresses(), config.addresses());
    }
}
