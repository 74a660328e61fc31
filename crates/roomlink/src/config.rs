//! Client configuration.
//!
//! [`ClientConfig`] can be built in code (start from `Default` and override
//! fields) or loaded from JSON. Durations are written as milliseconds:
//!
//! ```json
//! { "io_timeout_ms": 5000, "default_port": 53100 }
//! ```
//!
//! Missing fields keep their defaults.

use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use roomlink_nat::NatConfig;
use roomlink_protocol::TransportProtocol;
use serde::{Deserialize, Serialize};

/// Ports a room may be hosted on (IANA dynamic/private range).
pub const DYNAMIC_PORTS: RangeInclusive<u16> = 49152..=65535;

/// Errors while loading or checking a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Protocol version announced during authentication.
    pub api_version: u16,

    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,

    /// Applied separately to each send and each receive.
    #[serde(rename = "io_timeout_ms", with = "millis")]
    pub io_timeout: Duration,

    /// Idle time after which a keep-alive notice is sent.
    #[serde(rename = "keep_alive_interval_ms", with = "millis")]
    pub keep_alive_interval: Duration,

    /// How often the keep-alive task checks the idle time.
    #[serde(rename = "keep_alive_poll_interval_ms", with = "millis")]
    pub keep_alive_poll_interval: Duration,

    /// Upper bound of the random delay before the first keep-alive check.
    pub keep_alive_initial_jitter_ms: u64,

    /// Port tried first when hosting, before any NAT mapping.
    pub default_port: u16,

    /// Private and public ports offered to the NAT gateway.
    pub port_candidates: Vec<u16>,

    /// Protocol the hosted game traffic uses.
    pub hosting_protocol: TransportProtocol,

    #[serde(rename = "nat_discovery_timeout_ms", with = "millis")]
    pub nat_discovery_timeout: Duration,

    pub mapping_description: String,

    /// Requested mapping lease; zero lasts until released.
    #[serde(rename = "mapping_lease_ms", with = "millis")]
    pub mapping_lease: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_version: 1,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(10),
            keep_alive_interval: Duration::from_secs(30),
            keep_alive_poll_interval: Duration::from_secs(1),
            keep_alive_initial_jitter_ms: 250,
            default_port: 53000,
            port_candidates: (53000..=53009).collect(),
            hosting_protocol: TransportProtocol::Udp,
            nat_discovery_timeout: Duration::from_secs(3),
            mapping_description: "roomlink".into(),
            mapping_lease: Duration::ZERO,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("io_timeout", self.io_timeout),
            ("keep_alive_interval", self.keep_alive_interval),
            ("keep_alive_poll_interval", self.keep_alive_poll_interval),
            ("nat_discovery_timeout", self.nat_discovery_timeout),
        ] {
            if value.is_zero() {
                return invalid(format!("{name} must be greater than zero"));
            }
        }
        if !DYNAMIC_PORTS.contains(&self.default_port) {
            return invalid(format!(
                "default_port {} is outside {}..={}",
                self.default_port,
                DYNAMIC_PORTS.start(),
                DYNAMIC_PORTS.end()
            ));
        }
        if let Some(port) = self
            .port_candidates
            .iter()
            .find(|p| !DYNAMIC_PORTS.contains(p))
        {
            return invalid(format!("port candidate {port} is outside the dynamic range"));
        }
        Ok(())
    }

    /// Candidate ports for NAT mapping, default port first, no repeats.
    pub fn candidate_ports(&self) -> Vec<u16> {
        let mut ports = vec![self.default_port];
        for &port in &self.port_candidates {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
        ports
    }

    pub fn nat_config(&self) -> NatConfig {
        NatConfig {
            description: self.mapping_description.clone(),
            lease: self.mapping_lease,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
