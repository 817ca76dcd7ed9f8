//! MQTT side of the bridge.

use crate::config::BusConfig;
use acbridge_core::PropertyValue;
use acbridge_proto::{ClimateDiscovery, TopicScheme};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use std::time::Duration;
use url::Url;

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 100;

/// Publishes device state and receives commands.
///
/// The event loop is polled by the same task that calls these methods, so
/// requests are queued with the non-blocking `try_*` client calls.
pub struct BusClient {
    client: AsyncClient,
    topic_scheme: TopicScheme,
}

impl BusClient {
    /// Create a new bus client.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid.
    pub fn new(
        config: &BusConfig,
        client_id: &str,
        topic_scheme: TopicScheme,
    ) -> Result<(Self, EventLoop), BusError> {
        let (host, port) = parse_mqtt_url(&config.mqtt_broker)?;

        let mut mqtt_options = MqttOptions::new(client_id, host, port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        if let Some(username) = &config.username {
            mqtt_options.set_credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        Ok((
            Self {
                client,
                topic_scheme,
            },
            eventloop,
        ))
    }

    /// Subscribe to every command topic.
    ///
    /// # Errors
    ///
    /// Returns error if the request queue is full or closed.
    pub fn subscribe_commands(&self) -> Result<(), BusError> {
        let topic = self.topic_scheme.command_wildcard();

        tracing::info!(topic, "Subscribing to command topics");

        self.client
            .try_subscribe(&topic, QoS::AtLeastOnce)
            .map_err(|e| BusError::Subscribe(e.to_string()))
    }

    /// Publish a property value on its state topic.
    ///
    /// # Errors
    ///
    /// Returns error if the request queue is full or closed.
    pub fn publish_state(&self, property: &str, value: &PropertyValue) -> Result<(), BusError> {
        let topic = self.topic_scheme.state(property);
        let payload = value.to_string();

        tracing::debug!(topic, %payload, "Publishing state");

        self.client
            .try_publish(&topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    /// Publish the retained Home Assistant discovery payload.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails or the request queue is full.
    pub fn publish_discovery(&self, discovery: &ClimateDiscovery) -> Result<(), BusError> {
        let topic = self.topic_scheme.config();
        let payload = discovery
            .to_json()
            .map_err(|e| BusError::Serialize(e.to_string()))?;

        tracing::info!(topic, payload_len = payload.len(), "Publishing discovery payload");

        self.client
            .try_publish(&topic, QoS::AtLeastOnce, true, payload)
            .map_err(|e| BusError::Publish(e.to_string()))
    }
}

/// Parse MQTT URL into host and port.
pub(crate) fn parse_mqtt_url(input: &str) -> Result<(String, u16), BusError> {
    if input.contains("://") {
        let url =
            Url::parse(input).map_err(|e| BusError::InvalidBrokerUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(BusError::InvalidBrokerUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| BusError::InvalidBrokerUrl(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(1883);

        return Ok((host.to_string(), port));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BusError::InvalidBrokerUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => 1883,
        Some(port) => port
            .parse()
            .map_err(|_| BusError::InvalidBrokerUrl(format!("{input}: invalid port '{port}'")))?,
    };
    if parts.next().is_some() {
        return Err(BusError::InvalidBrokerUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

/// Errors for bus operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    /// Subscription failed
    #[error("subscription error: {0}")]
    Subscribe(String),
    /// Invalid MQTT broker URL
    #[error("invalid MQTT broker URL: {0}")]
    InvalidBrokerUrl(String),
    /// Publish failed
    #[error("publish error: {0}")]
    Publish(String),
    /// Serialization failed
    #[error("serialize error: {0}")]
    Serialize(String),
}
