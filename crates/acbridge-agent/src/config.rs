//! Agent configuration.

use acbridge_core::PropertyRegistry;
use acbridge_device::BridgeConfig;
use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Device-side configuration
    pub device: DeviceConfig,

    /// MQTT configuration
    pub bus: BusConfig,
}

/// Device-side configuration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Broadcast (or unicast) address the probe is sent to
    pub hvac_host: IpAddr,

    /// UDP port of the discovery probe
    pub probe_port: u16,

    /// TCP port of the status connection
    pub status_port: u16,

    /// Interval between status requests
    pub poll_interval: Duration,

    /// Interval between discovery probes while unbound
    pub discovery_retry: Duration,

    /// Unanswered status requests before rediscovery
    pub max_missed_polls: u32,

    /// Field dictionary file; the built-in table is used when unset
    pub registry_path: Option<PathBuf>,

    /// Entity name announced to Home Assistant
    pub device_name: String,
}

/// MQTT configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Broker URL
    pub mqtt_broker: String,

    /// Client identifier; generated when unset
    pub client_id: Option<String>,

    /// Username
    pub username: Option<String>,

    /// Password
    pub password: Option<String>,

    /// Topic prefix
    pub topic_prefix: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                hvac_host: IpAddr::V4(Ipv4Addr::new(192, 168, 111, 255)),
                probe_port: 12414,
                status_port: 12416,
                poll_interval: Duration::from_secs(60),
                discovery_retry: Duration::from_secs(60),
                max_missed_polls: 5,
                registry_path: None,
                device_name: "Air Conditioner".to_string(),
            },
            bus: BusConfig {
                mqtt_broker: "tcp://localhost:1883".to_string(),
                client_id: None,
                username: None,
                password: None,
                topic_prefix: "hvac".to_string(),
            },
        }
    }
}

impl DeviceConfig {
    /// Endpoints and limits for the bridge.
    #[must_use]
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            discovery_target: SocketAddr::new(self.hvac_host, self.probe_port),
            status_port: self.status_port,
            max_missed_polls: self.max_missed_polls,
        }
    }

    /// Load the field dictionary.
    ///
    /// # Errors
    ///
    /// Returns error if the registry file cannot be read or is invalid.
    pub fn load_registry(&self) -> Result<PropertyRegistry> {
        let Some(path) = &self.registry_path else {
            return Ok(PropertyRegistry::standard());
        };

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read registry file {}", path.display()))?;
        let registry = PropertyRegistry::from_json(&json)
            .with_context(|| format!("Invalid registry file {}", path.display()))?;

        tracing::info!(path = %path.display(), fields = registry.len(), "Loaded field dictionary");
        Ok(registry)
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ACBRIDGE_HVAC_HOST`: Probe address (default broadcast `192.168.111.255`)
    /// - `ACBRIDGE_PROBE_PORT` / `ACBRIDGE_STATUS_PORT`: Device ports
    /// - `ACBRIDGE_POLL_INTERVAL_SECS`: Status poll interval
    /// - `ACBRIDGE_DISCOVERY_RETRY_SECS`: Probe interval while unbound
    /// - `ACBRIDGE_MAX_MISSED_POLLS`: Unanswered polls before rediscovery
    /// - `ACBRIDGE_REGISTRY_PATH`: Field dictionary JSON
    /// - `ACBRIDGE_MQTT_BROKER`: MQTT broker URL
    /// - `ACBRIDGE_MQTT_CLIENT_ID`, `ACBRIDGE_MQTT_USERNAME`, `ACBRIDGE_MQTT_PASSWORD`
    /// - `ACBRIDGE_TOPIC_PREFIX`: Topic prefix
    /// - `ACBRIDGE_DEVICE_NAME`: Entity name for Home Assistant
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let device = &mut config.device;
        let bus = &mut config.bus;

        if let Some(host) = lookup("ACBRIDGE_HVAC_HOST") {
            device.hvac_host = parse("ACBRIDGE_HVAC_HOST", &host)?;
        }

        if let Some(port) = lookup("ACBRIDGE_PROBE_PORT") {
            device.probe_port = parse("ACBRIDGE_PROBE_PORT", &port)?;
        }

        if let Some(port) = lookup("ACBRIDGE_STATUS_PORT") {
            device.status_port = parse("ACBRIDGE_STATUS_PORT", &port)?;
        }

        if let Some(secs) = lookup("ACBRIDGE_POLL_INTERVAL_SECS") {
            device.poll_interval = seconds("ACBRIDGE_POLL_INTERVAL_SECS", &secs)?;
        }

        if let Some(secs) = lookup("ACBRIDGE_DISCOVERY_RETRY_SECS") {
            device.discovery_retry = seconds("ACBRIDGE_DISCOVERY_RETRY_SECS", &secs)?;
        }

        if let Some(max) = lookup("ACBRIDGE_MAX_MISSED_POLLS") {
            device.max_missed_polls = parse("ACBRIDGE_MAX_MISSED_POLLS", &max)?;
        }

        if let Some(path) = lookup("ACBRIDGE_REGISTRY_PATH") {
            device.registry_path = Some(PathBuf::from(path));
        }

        if let Some(name) = lookup("ACBRIDGE_DEVICE_NAME") {
            device.device_name = name;
        }

        if let Some(broker) = lookup("ACBRIDGE_MQTT_BROKER") {
            bus.mqtt_broker = broker;
        }

        bus.client_id = lookup("ACBRIDGE_MQTT_CLIENT_ID");
        bus.username = lookup("ACBRIDGE_MQTT_USERNAME");
        bus.password = lookup("ACBRIDGE_MQTT_PASSWORD");

        if let Some(prefix) = lookup("ACBRIDGE_TOPIC_PREFIX") {
            bus.topic_prefix = prefix;
        }

        Ok(config)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {key}: '{value}'"))
}

fn seconds(key: &str, value: &str) -> Result<Duration> {
    let secs: u64 = parse(key, value)?;
    anyhow::ensure!(secs > 0, "Invalid {key}: interval must be positive");
    Ok(Duration::from_secs(secs))
}
