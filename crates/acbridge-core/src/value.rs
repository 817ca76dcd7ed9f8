//! Decoded property values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the derived property combining power and mode.
///
/// Reports `off` while power is off, otherwise the current mode label.
pub const EFFECTIVE_MODE: &str = "effective_mode";

/// Decoded properties keyed by property name.
///
/// Ordered so change notifications come out in a stable order.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Flag or enumerated label (e.g. `on`, `cool`, `l3`)
    Label(String),
    /// Raw numeric passthrough (e.g. a temperature in degrees)
    Number(u8),
}

impl PropertyValue {
    /// Label value.
    #[must_use]
    pub fn label(label: impl Into<String>) -> Self {
        Self::Label(label.into())
    }

    /// Flag value rendered as `on`/`off`.
    #[must_use]
    pub fn flag(on: bool) -> Self {
        Self::Label(if on { "on" } else { "off" }.to_string())
    }

    /// Borrow the label, if this is one.
    #[must_use]
    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Label(label) => Some(label),
            Self::Number(_) => None,
        }
    }

    /// The number, if this is one.
    #[must_use]
    pub fn as_number(&self) -> Option<u8> {
        match self {
            Self::Label(_) => None,
            Self::Number(n) => Some(*n),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(label) => f.write_str(label),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<u8> for PropertyValue {
    fn from(value: u8) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Label(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_bare_payload() {
        assert_eq!(PropertyValue::label("cool").to_string(), "cool");
        assert_eq!(PropertyValue::Number(24).to_string(), "24");
        assert_eq!(PropertyValue::flag(true).to_string(), "on");
    }

    #[test]
    fn serializes_untagged() {
        let map: PropertyMap = [
            ("power".to_string(), PropertyValue::flag(false)),
            ("temperature".to_string(), PropertyValue::Number(21)),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json, serde_json::json!({"power": "off", "temperature": 21}));
    }
}
