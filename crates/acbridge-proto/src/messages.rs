//! Home Assistant MQTT discovery payload for the climate entity.

use crate::topics::TopicScheme;
use acbridge_core::{DeviceIdentity, FieldEncoding, PropertyRegistry, EFFECTIVE_MODE};
use serde::{Deserialize, Serialize};

/// Device block of the discovery payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDevice {
    /// Display name
    pub name: String,
    /// Hardware identifiers
    pub identifiers: Vec<String>,
    /// Software version of the bridge
    pub sw_version: String,
}

/// Climate entity discovery payload, using Home Assistant's abbreviated keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateDiscovery {
    /// Entity name
    pub name: String,
    /// Stable unique id
    #[serde(rename = "uniq_id")]
    pub unique_id: String,
    /// Effective mode command topic
    #[serde(rename = "mode_cmd_t")]
    pub mode_command_topic: String,
    /// Effective mode state topic
    #[serde(rename = "mode_stat_t")]
    pub mode_state_topic: String,
    /// Indoor temperature topic
    #[serde(rename = "curr_temp_t")]
    pub current_temperature_topic: String,
    /// Setpoint command topic
    #[serde(rename = "temp_cmd_t")]
    pub temperature_command_topic: String,
    /// Setpoint state topic
    #[serde(rename = "temp_stat_t")]
    pub temperature_state_topic: String,
    /// Fan speed command topic
    #[serde(rename = "fan_mode_cmd_t")]
    pub fan_mode_command_topic: String,
    /// Fan speed state topic
    #[serde(rename = "fan_mode_stat_t")]
    pub fan_mode_state_topic: String,
    /// Vertical swing command topic
    #[serde(rename = "swing_mode_cmd_t")]
    pub swing_mode_command_topic: String,
    /// Vertical swing state topic
    #[serde(rename = "swing_mode_stat_t")]
    pub swing_mode_state_topic: String,
    /// Power command topic
    #[serde(rename = "pow_cmd_t")]
    pub power_command_topic: String,
    /// Effective modes, `off` first
    pub modes: Vec<String>,
    /// Fan speed labels
    pub fan_modes: Vec<String>,
    /// Vertical swing labels
    pub swing_modes: Vec<String>,
    /// Lowest settable temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_temp: Option<u8>,
    /// Highest settable temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_temp: Option<u8>,
    /// Payload sent for power on
    #[serde(rename = "pl_on")]
    pub payload_on: String,
    /// Payload sent for power off
    #[serde(rename = "pl_off")]
    pub payload_off: String,
    /// Device block
    #[serde(rename = "dev")]
    pub device: DiscoveryDevice,
}

impl ClimateDiscovery {
    /// Build the payload for a bound device.
    #[must_use]
    pub fn new(
        scheme: &TopicScheme,
        registry: &PropertyRegistry,
        identity: &DeviceIdentity,
        display_name: &str,
    ) -> Self {
        let labels = |property: &str| -> Vec<String> {
            registry
                .get(property)
                .map(|descriptor| {
                    descriptor
                        .labels()
                        .into_iter()
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut modes = vec!["off".to_string()];
        modes.extend(labels("mode"));

        let (min_temp, max_temp) = match registry.get("temperature").map(|d| &d.encoding) {
            Some(FieldEncoding::Numeric { min, max }) => (Some(*min), Some(*max)),
            _ => (None, None),
        };

        Self {
            name: display_name.to_string(),
            unique_id: format!("acbridge_{}", identity.id),
            mode_command_topic: scheme.command(EFFECTIVE_MODE),
            mode_state_topic: scheme.state(EFFECTIVE_MODE),
            current_temperature_topic: scheme.state("temperature_in"),
            temperature_command_topic: scheme.command("temperature"),
            temperature_state_topic: scheme.state("temperature"),
            fan_mode_command_topic: scheme.command("fan_speed"),
            fan_mode_state_topic: scheme.state("fan_speed"),
            swing_mode_command_topic: scheme.command("swing_vert"),
            swing_mode_state_topic: scheme.state("swing_vert"),
            power_command_topic: scheme.command("power"),
            modes,
            fan_modes: labels("fan_speed"),
            swing_modes: labels("swing_vert"),
            min_temp,
            max_temp,
            payload_on: "on".to_string(),
            payload_off: "off".to_string(),
            device: DiscoveryDevice {
                name: identity.name.clone(),
                identifiers: vec![identity.id.clone()],
                sw_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Serialize(e.to_string()))
    }
}

/// Errors for message serialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialize(String),
}
