//! Field dictionary for status and command frames.
//!
//! Every controllable or observable property is described by where its bits
//! sit in a status frame and how those bits map to a value. The dictionary is
//! configuration data: [`PropertyRegistry::standard`] carries the built-in
//! table and [`PropertyRegistry::from_json`] loads a replacement captured from
//! different hardware.
//!
//! ## JSON shape
//!
//! ```json
//! {
//!   "fields": [
//!     { "name": "power", "code": "boot", "offset": 4, "mask": 128,
//!       "encoding": { "kind": "flag" } },
//!     { "name": "temperature", "code": "wdNumber", "offset": 5, "mask": 255,
//!       "encoding": { "kind": "numeric", "min": 16, "max": 30 } }
//!   ]
//! }
//! ```

use crate::error::{CommandError, RegistryError};
use crate::frame::{CHECKSUM_OFFSET, PAYLOAD_OFFSET};
use crate::value::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One labelled raw value of an enumerated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntry {
    /// Label exposed on the bus
    pub label: String,
    /// Value stored in the masked bits
    pub raw: u8,
}

impl EnumEntry {
    fn new(label: &str, raw: u8) -> Self {
        Self {
            label: label.to_string(),
            raw,
        }
    }
}

/// How the masked bits of a field map to a [`PropertyValue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldEncoding {
    /// Two-value `off`/`on` field
    Flag,
    /// Label ↔ raw value table
    Enumerated {
        /// Defined labels
        values: Vec<EnumEntry>,
    },
    /// Raw integer passed through unchanged, bounded for writes
    Numeric {
        /// Smallest accepted value
        min: u8,
        /// Largest accepted value
        max: u8,
    },
}

fn default_settable() -> bool {
    true
}

/// Location and encoding of a single property inside a status frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Property name used on the bus (e.g. `fan_speed`)
    pub name: String,
    /// Vendor wire code (e.g. `windLevel`)
    pub code: String,
    /// Absolute byte offset in the frame
    pub offset: usize,
    /// Bit mask within that byte
    pub mask: u8,
    /// Value encoding
    pub encoding: FieldEncoding,
    /// Whether set-requests are accepted
    #[serde(default = "default_settable")]
    pub settable: bool,
}

impl PropertyDescriptor {
    fn shift(&self) -> u32 {
        self.mask.trailing_zeros()
    }

    /// Largest raw value the mask can hold.
    #[must_use]
    pub fn max_raw(&self) -> u8 {
        self.mask >> self.shift()
    }

    /// Read the raw masked bits from `frame`.
    ///
    /// Returns `None` if the frame is too short to contain the field.
    #[must_use]
    pub fn extract(&self, frame: &[u8]) -> Option<u8> {
        frame
            .get(self.offset)
            .map(|byte| (byte & self.mask) >> self.shift())
    }

    /// Write `raw` into the masked bits of `frame`, leaving other bits alone.
    pub(crate) fn store(&self, frame: &mut [u8], raw: u8) {
        if let Some(byte) = frame.get_mut(self.offset) {
            *byte = (*byte & !self.mask) | ((raw << self.shift()) & self.mask);
        }
    }

    /// Map raw bits to the decoded value.
    ///
    /// Enumerated fields carrying a code outside their table decode to the
    /// bare number so the value is still observable.
    #[must_use]
    pub fn decode_raw(&self, raw: u8) -> PropertyValue {
        match &self.encoding {
            FieldEncoding::Flag => PropertyValue::flag(raw != 0),
            FieldEncoding::Enumerated { values } => values
                .iter()
                .find(|entry| entry.raw == raw)
                .map_or(PropertyValue::Number(raw), |entry| {
                    PropertyValue::label(entry.label.clone())
                }),
            FieldEncoding::Numeric { .. } => PropertyValue::Number(raw),
        }
    }

    /// Map a value to the raw bits it is stored as.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidValue`] if the value is outside the
    /// field's domain.
    pub fn encode_value(&self, value: &PropertyValue) -> Result<u8, CommandError> {
        let raw = match (&self.encoding, value) {
            (FieldEncoding::Flag, PropertyValue::Label(label)) => match label.as_str() {
                "off" => Some(0),
                "on" => Some(1),
                _ => None,
            },
            (FieldEncoding::Enumerated { values }, PropertyValue::Label(label)) => values
                .iter()
                .find(|entry| entry.label == *label)
                .map(|entry| entry.raw),
            (FieldEncoding::Numeric { min, max }, PropertyValue::Number(n)) => {
                (min..=max).contains(&n).then_some(*n)
            }
            _ => None,
        };

        raw.ok_or_else(|| CommandError::InvalidValue {
            property: self.name.clone(),
            value: value.to_string(),
        })
    }

    /// Labels accepted by an enumerated or flag field.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        match &self.encoding {
            FieldEncoding::Flag => vec!["off", "on"],
            FieldEncoding::Enumerated { values } => {
                values.iter().map(|entry| entry.label.as_str()).collect()
            }
            FieldEncoding::Numeric { .. } => Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidDescriptor {
            name: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("empty name".to_string()));
        }
        if !(PAYLOAD_OFFSET..CHECKSUM_OFFSET).contains(&self.offset) {
            return Err(invalid(format!(
                "offset {} outside payload {PAYLOAD_OFFSET}..{CHECKSUM_OFFSET}",
                self.offset
            )));
        }
        if self.mask == 0 {
            return Err(invalid("mask is zero".to_string()));
        }

        let max_raw = self.max_raw();
        match &self.encoding {
            FieldEncoding::Flag => {}
            FieldEncoding::Enumerated { values } => {
                if values.is_empty() {
                    return Err(invalid("no enumerated values".to_string()));
                }
                let mut labels = HashSet::new();
                for entry in values {
                    if entry.raw > max_raw {
                        return Err(invalid(format!(
                            "value {} ({}) does not fit mask {:#04x}",
                            entry.label, entry.raw, self.mask
                        )));
                    }
                    if !labels.insert(entry.label.as_str()) {
                        return Err(invalid(format!("duplicate label {}", entry.label)));
                    }
                }
            }
            FieldEncoding::Numeric { min, max } => {
                if min > max {
                    return Err(invalid(format!("min {min} greater than max {max}")));
                }
                if *max > max_raw {
                    return Err(invalid(format!(
                        "max {max} does not fit mask {:#04x}",
                        self.mask
                    )));
                }
            }
        }

        Ok(())
    }
}

/// The set of known properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyRegistry {
    fields: Vec<PropertyDescriptor>,
}

#[derive(Deserialize)]
struct RegistryFile {
    fields: Vec<PropertyDescriptor>,
}

impl PropertyRegistry {
    /// Build a registry from descriptors.
    ///
    /// # Errors
    ///
    /// Returns error if a descriptor does not fit the status frame layout or
    /// two descriptors share a name.
    pub fn new(fields: Vec<PropertyDescriptor>) -> Result<Self, RegistryError> {
        let mut names = HashSet::new();
        for field in &fields {
            field.validate()?;
            if !names.insert(field.name.as_str()) {
                return Err(RegistryError::DuplicateName(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    /// Load a registry from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile =
            serde_json::from_str(json).map_err(|e| RegistryError::Parse(e.to_string()))?;
        Self::new(file.fields)
    }

    /// Look up a descriptor by property name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// All descriptors in table order.
    pub fn iter(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.fields.iter()
    }

    /// Descriptors that accept set-requests.
    pub fn settable(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.fields.iter().filter(|field| field.settable)
    }

    /// Number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The built-in dictionary for the supported unit.
    #[must_use]
    pub fn standard() -> Self {
        let fields = vec![
            flag_field("power", "boot", 4, 0x80),
            enum_field(
                "mode",
                "runMode",
                4,
                0x70,
                &[("auto", 0), ("cool", 1), ("dry", 2), ("wind", 3), ("heat", 4)],
            ),
            enum_field(
                "fan_speed",
                "windLevel",
                4,
                0x07,
                &[
                    ("l0", 0),
                    ("l1", 1),
                    ("l2", 2),
                    ("l3", 3),
                    ("l4", 4),
                    ("l5", 5),
                    ("l6", 6),
                ],
            ),
            numeric_field("temperature", "wdNumber", 5, 16, 30),
            read_only(numeric_field("temperature_in", "indoorTemperature", 6, 0, 0xFF)),
            enum_field(
                "swing_hor",
                "SwingLfRig",
                7,
                0xF0,
                &[
                    ("default", 0),
                    ("fixed_left", 2),
                    ("fixed_mid_left", 3),
                    ("fixed_mid", 4),
                    ("fixed_mid_right", 5),
                    ("fixed_right", 6),
                    ("full", 7),
                ],
            ),
            enum_field(
                "swing_vert",
                "SwUpDn",
                7,
                0x0F,
                &[
                    ("default", 0),
                    ("full", 1),
                    ("fixed_top", 2),
                    ("fixed_mid_top", 3),
                    ("fixed_mid", 4),
                    ("fixed_mid_bottom", 5),
                    ("fixed_bottom", 6),
                    ("swing_bottom", 7),
                    ("swing_mid_bottom", 8),
                    ("swing_mid", 9),
                    ("swing_mid_top", 10),
                    ("swing_top", 11),
                ],
            ),
            flag_field("lights", "lighting", 8, 0x01),
            flag_field("health", "healthy", 8, 0x02),
            flag_field("sleep", "sleep", 8, 0x04),
            flag_field("blow", "Blo", 8, 0x08),
            flag_field("turbo", "Tur", 8, 0x10),
            flag_field("energy_save", "eco", 8, 0x20),
            enum_field(
                "quiet",
                "Quiet",
                9,
                0x03,
                &[("off", 0), ("mode1", 1), ("mode2", 2), ("mode3", 3)],
            ),
            enum_field(
                "air",
                "Air",
                9,
                0x0C,
                &[("off", 0), ("inside", 1), ("outside", 2), ("mode3", 3)],
            ),
            read_only(enum_field(
                "temperature_unit",
                "temtyp",
                9,
                0x10,
                &[("celsius", 0), ("fahrenheit", 1)],
            )),
        ];

        Self { fields }
    }
}

fn flag_field(name: &str, code: &str, offset: usize, mask: u8) -> PropertyDescriptor {
    PropertyDescriptor {
        name: name.to_string(),
        code: code.to_string(),
        offset,
        mask,
        encoding: FieldEncoding::Flag,
        settable: true,
    }
}

fn enum_field(
    name: &str,
    code: &str,
    offset: usize,
    mask: u8,
    labels: &[(&str, u8)],
) -> PropertyDescriptor {
    PropertyDescriptor {
        name: name.to_string(),
        code: code.to_string(),
        offset,
        mask,
        encoding: FieldEncoding::Enumerated {
            values: labels
                .iter()
                .map(|(label, raw)| EnumEntry::new(label, *raw))
                .collect(),
        },
        settable: true,
    }
}

fn numeric_field(name: &str, code: &str, offset: usize, min: u8, max: u8) -> PropertyDescriptor {
    PropertyDescriptor {
        name: name.to_string(),
        code: code.to_string(),
        offset,
        mask: 0xFF,
        encoding: FieldEncoding::Numeric { min, max },
        settable: true,
    }
}

fn read_only(descriptor: PropertyDescriptor) -> PropertyDescriptor {
    PropertyDescriptor {
        settable: false,
        ..descriptor
    }
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
