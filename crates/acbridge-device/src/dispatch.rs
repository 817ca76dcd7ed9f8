//! Building command frames from set-requests.
//!
//! Every command is the last status frame with the requested bits patched in.
//! Nothing is sent from here; [`crate::Bridge`] writes the frames.

use crate::session::DeviceSession;
use acbridge_core::{
    patch_field, CommandError, FieldEncoding, PropertyDescriptor, PropertyRegistry, PropertyValue,
};
use std::sync::Arc;

/// Labels that switch the unit off through the effective mode.
const EFFECTIVE_OFF: &[&str] = &["off", "none"];

/// Validates set-requests and patches them into the last snapshot.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    registry: Arc<PropertyRegistry>,
}

impl CommandDispatcher {
    /// Create a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<PropertyRegistry>) -> Self {
        Self { registry }
    }

    fn settable(&self, name: &str) -> Result<&PropertyDescriptor, CommandError> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| CommandError::UnknownProperty(name.to_string()))?;
        if descriptor.settable {
            Ok(descriptor)
        } else {
            Err(CommandError::ReadOnly(name.to_string()))
        }
    }

    /// Parse bus input for `descriptor`.
    ///
    /// Enumerated properties take a label or its numeric wire code.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownEnumValue`] for an undefined label and
    /// [`CommandError::InvalidValue`] for anything else outside the domain.
    pub fn coerce(
        descriptor: &PropertyDescriptor,
        raw: &str,
    ) -> Result<PropertyValue, CommandError> {
        let raw = raw.trim();
        let invalid = || CommandError::InvalidValue {
            property: descriptor.name.clone(),
            value: raw.to_string(),
        };

        let value = match &descriptor.encoding {
            FieldEncoding::Flag => match raw.to_ascii_lowercase().as_str() {
                "on" | "1" | "true" => PropertyValue::flag(true),
                "off" | "0" | "false" => PropertyValue::flag(false),
                _ => return Err(invalid()),
            },
            // Older automations publish the wire code instead of the label.
            FieldEncoding::Enumerated { values } => raw
                .parse::<u8>()
                .ok()
                .and_then(|code| values.iter().find(|entry| entry.raw == code))
                .map_or_else(
                    || PropertyValue::label(raw),
                    |entry| PropertyValue::label(entry.label.clone()),
                ),
            FieldEncoding::Numeric { .. } => {
                PropertyValue::Number(raw.parse::<u8>().map_err(|_| invalid())?)
            }
        };

        Self::check_domain(descriptor, &value)?;
        Ok(value)
    }

    fn check_domain(
        descriptor: &PropertyDescriptor,
        value: &PropertyValue,
    ) -> Result<(), CommandError> {
        if let FieldEncoding::Enumerated { values } = &descriptor.encoding {
            let known = value
                .as_label()
                .is_some_and(|label| values.iter().any(|entry| entry.label == label));
            if !known {
                return Err(CommandError::UnknownEnumValue {
                    property: descriptor.name.clone(),
                    value: value.to_string(),
                });
            }
        }
        descriptor.encode_value(value).map(|_| ())
    }

    /// Build the command frame setting `name` from bus input.
    ///
    /// # Errors
    ///
    /// Returns error if the property is unknown or read-only, the value is
    /// outside its domain, or no snapshot has been received.
    pub fn build(
        &self,
        session: &DeviceSession,
        name: &str,
        raw: &str,
    ) -> Result<Vec<u8>, CommandError> {
        let descriptor = self.settable(name)?;
        let value = Self::coerce(descriptor, raw)?;
        Self::patch(session, descriptor, &value)
    }

    /// Build the command frame setting `name` to a typed value.
    ///
    /// # Errors
    ///
    /// Same as [`Self::build`].
    pub fn build_value(
        &self,
        session: &DeviceSession,
        name: &str,
        value: &PropertyValue,
    ) -> Result<Vec<u8>, CommandError> {
        let descriptor = self.settable(name)?;
        Self::check_domain(descriptor, value)?;
        Self::patch(session, descriptor, value)
    }

    /// Build one frame applying an effective mode.
    ///
    /// `off` (or `none`) clears power. Any mode label sets power on and the
    /// mode in the same frame, so the two changes cannot overwrite each other.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownEnumValue`] if `label` is neither `off`
    /// nor a mode label, or [`CommandError::NoSnapshot`].
    pub fn build_effective_mode(
        &self,
        session: &DeviceSession,
        label: &str,
    ) -> Result<Vec<u8>, CommandError> {
        let label = label.trim();
        let power = self.settable("power")?;

        if EFFECTIVE_OFF.contains(&label) {
            return Self::patch(session, power, &PropertyValue::flag(false));
        }

        let mode = self.settable("mode")?;
        let value = PropertyValue::label(label);
        Self::check_domain(mode, &value)?;

        let powered = Self::patch(session, power, &PropertyValue::flag(true))?;
        patch_field(&powered, mode, &value)
    }

    fn patch(
        session: &DeviceSession,
        descriptor: &PropertyDescriptor,
        value: &PropertyValue,
    ) -> Result<Vec<u8>, CommandError> {
        let last_frame = session.last_frame().ok_or(CommandError::NoSnapshot)?;
        patch_field(last_frame, descriptor, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(PropertyRegistry::standard()))
    }

    fn descriptor(name: &str) -> PropertyDescriptor {
        PropertyRegistry::standard().get(name).unwrap().clone()
    }

    #[test]
    fn flags_accept_common_spellings() {
        let lights = descriptor("lights");

        for raw in ["on", "ON", "1", "true", " True "] {
            assert_eq!(
                CommandDispatcher::coerce(&lights, raw),
                Ok(PropertyValue::flag(true)),
                "{raw}"
            );
        }
        for raw in ["off", "0", "false"] {
            assert_eq!(
                CommandDispatcher::coerce(&lights, raw),
                Ok(PropertyValue::flag(false)),
                "{raw}"
            );
        }
        assert!(matches!(
            CommandDispatcher::coerce(&lights, "maybe"),
            Err(CommandError::InvalidValue { .. })
        ));
    }

    #[test]
    fn enumerations_require_defined_label() {
        let fan = descriptor("fan_speed");

        assert_eq!(
            CommandDispatcher::coerce(&fan, "l4"),
            Ok(PropertyValue::label("l4"))
        );
        assert_eq!(
            CommandDispatcher::coerce(&fan, "turbo"),
            Err(CommandError::UnknownEnumValue {
                property: "fan_speed".to_string(),
                value: "turbo".to_string()
            })
        );
    }

    #[test]
    fn enumerations_accept_wire_codes() {
        let quiet = descriptor("quiet");
        let air = descriptor("air");

        assert_eq!(
            CommandDispatcher::coerce(&quiet, "1"),
            Ok(PropertyValue::label("mode1"))
        );
        assert_eq!(
            CommandDispatcher::coerce(&air, " 2 "),
            Ok(PropertyValue::label("outside"))
        );
        assert_eq!(
            CommandDispatcher::coerce(&quiet, "0"),
            Ok(PropertyValue::label("off"))
        );
        assert!(matches!(
            CommandDispatcher::coerce(&quiet, "4"),
            Err(CommandError::UnknownEnumValue { .. })
        ));
    }

    #[test]
    fn numerics_require_range() {
        let temperature = descriptor("temperature");

        assert_eq!(
            CommandDispatcher::coerce(&temperature, "22"),
            Ok(PropertyValue::Number(22))
        );
        for raw in ["15", "31", "300", "warm", "-1"] {
            assert!(
                matches!(
                    CommandDispatcher::coerce(&temperature, raw),
                    Err(CommandError::InvalidValue { .. })
                ),
                "{raw}"
            );
        }
    }

    #[test]
    fn unknown_and_read_only_properties_are_rejected() {
        let session = DeviceSession::new();
        let dispatcher = dispatcher();

        assert_eq!(
            dispatcher.build(&session, "colour", "red"),
            Err(CommandError::UnknownProperty("colour".to_string()))
        );
        assert_eq!(
            dispatcher.build(&session, "temperature_in", "20"),
            Err(CommandError::ReadOnly("temperature_in".to_string()))
        );
    }

    #[test]
    fn valid_request_without_snapshot_fails() {
        let session = DeviceSession::new();

        assert_eq!(
            dispatcher().build(&session, "power", "on"),
            Err(CommandError::NoSnapshot)
        );
        assert_eq!(
            dispatcher().build_effective_mode(&session, "cool"),
            Err(CommandError::NoSnapshot)
        );
    }

    #[test]
    fn effective_mode_rejects_unknown_label() {
        let session = DeviceSession::new();

        assert!(matches!(
            dispatcher().build_effective_mode(&session, "fan_only"),
            Err(CommandError::UnknownEnumValue { .. })
        ));
    }
}
