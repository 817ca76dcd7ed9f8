//! MQTT topic scheme for state and commands.
//!
//! Topic structure: `{prefix}/{segment}/{get|set}`
//!
//! Segments are short names kept compatible with existing Home Assistant
//! setups (`fanspeed`, `powersave`, ...). The writable `mode` segment carries
//! the effective mode; the raw mode field lives under `runmode`.

use acbridge_core::EFFECTIVE_MODE;
use serde::{Deserialize, Serialize};

/// Property name → topic segment, where they differ or are fixed.
const SEGMENTS: &[(&str, &str)] = &[
    ("power", "power"),
    (EFFECTIVE_MODE, "mode"),
    ("mode", "runmode"),
    ("temperature", "temperature"),
    ("temperature_in", "temperature_in"),
    ("fan_speed", "fanspeed"),
    ("swing_hor", "swinghor"),
    ("swing_vert", "swingvert"),
    ("health", "health"),
    ("energy_save", "powersave"),
    ("lights", "lights"),
    ("quiet", "quiet"),
    ("blow", "blow"),
    ("air", "air"),
    ("sleep", "sleep"),
    ("turbo", "turbo"),
    ("temperature_unit", "temperature_unit"),
];

/// What a command topic addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    /// The derived power+mode property
    EffectiveMode,
    /// A primary property by name
    Property(String),
}

/// Topic scheme configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Topic prefix (default: "hvac")
    pub prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            prefix: "hvac".to_string(),
        }
    }
}

impl TopicScheme {
    /// Create a new topic scheme under `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Topic segment for a property name.
    ///
    /// Properties outside the built-in table use their own name.
    #[must_use]
    pub fn segment(property: &str) -> &str {
        SEGMENTS
            .iter()
            .find(|(name, _)| *name == property)
            .map_or(property, |(_, segment)| *segment)
    }

    /// Property name for a topic segment.
    #[must_use]
    pub fn property(segment: &str) -> &str {
        SEGMENTS
            .iter()
            .find(|(_, seg)| *seg == segment)
            .map_or(segment, |(name, _)| *name)
    }

    /// State topic for a property.
    #[must_use]
    pub fn state(&self, property: &str) -> String {
        format!("{}/{}/get", self.prefix, Self::segment(property))
    }

    /// Command topic for a property.
    #[must_use]
    pub fn command(&self, property: &str) -> String {
        format!("{}/{}/set", self.prefix, Self::segment(property))
    }

    /// Wildcard subscription for every command topic.
    #[must_use]
    pub fn command_wildcard(&self) -> String {
        format!("{}/+/set", self.prefix)
    }

    /// Topic for the Home Assistant discovery payload.
    #[must_use]
    pub fn config(&self) -> String {
        format!("{}/config", self.prefix)
    }

    /// Parse a command topic.
    ///
    /// Returns `None` for topics outside this scheme or that are not `set`
    /// topics.
    #[must_use]
    pub fn parse_command(&self, topic: &str) -> Option<CommandTarget> {
        let remainder = topic.strip_prefix(&self.prefix)?.strip_prefix('/')?;
        let segment = remainder.strip_suffix("/set")?;
        if segment.is_empty() || segment.contains('/') {
            return None;
        }

        let property = Self::property(segment);
        if property == EFFECTIVE_MODE {
            Some(CommandTarget::EffectiveMode)
        } else {
            Some(CommandTarget::Property(property.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_generation() {
        let scheme = TopicScheme::new("home/ac");

        assert_eq!(scheme.state("fan_speed"), "home/ac/fanspeed/get");
        assert_eq!(scheme.command("energy_save"), "home/ac/powersave/set");
        assert_eq!(scheme.state(EFFECTIVE_MODE), "home/ac/mode/get");
        assert_eq!(scheme.state("mode"), "home/ac/runmode/get");
        assert_eq!(scheme.config(), "home/ac/config");
        assert_eq!(scheme.command_wildcard(), "home/ac/+/set");
    }

    #[test]
    fn trailing_slash_in_prefix_is_ignored() {
        let scheme = TopicScheme::new("hvac/");
        assert_eq!(scheme.state("power"), "hvac/power/get");
    }

    #[test]
    fn unknown_property_uses_own_name() {
        let scheme = TopicScheme::default();
        assert_eq!(scheme.state("filter_alarm"), "hvac/filter_alarm/get");
        assert_eq!(
            scheme.parse_command("hvac/filter_alarm/set"),
            Some(CommandTarget::Property("filter_alarm".to_string()))
        );
    }

    #[test]
    fn command_parsing() {
        let scheme = TopicScheme::new("hvac");

        assert_eq!(
            scheme.parse_command("hvac/mode/set"),
            Some(CommandTarget::EffectiveMode)
        );
        assert_eq!(
            scheme.parse_command("hvac/swingvert/set"),
            Some(CommandTarget::Property("swing_vert".to_string()))
        );
        assert_eq!(
            scheme.parse_command("hvac/runmode/set"),
            Some(CommandTarget::Property("mode".to_string()))
        );
    }

    #[test]
    fn command_parsing_rejects_foreign_topics() {
        let scheme = TopicScheme::new("hvac");

        assert_eq!(scheme.parse_command("hvac/power/get"), None);
        assert_eq!(scheme.parse_command("other/power/set"), None);
        assert_eq!(scheme.parse_command("hvacx/power/set"), None);
        assert_eq!(scheme.parse_command("hvac/a/b/set"), None);
        assert_eq!(scheme.parse_command("hvac//set"), None);
    }
}
