//! Error types shared by the codec and the command path.

/// A received frame could not be interpreted.
///
/// The offending frame is dropped by the caller; session state is untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is structurally broken (too short, bad sync header, bad checksum).
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Frame is well formed but not the kind the caller asked for.
    #[error("unexpected frame (declared length {length:#04x}, type {frame_type:#04x})")]
    UnexpectedFrame {
        /// Declared length byte
        length: u8,
        /// Type/command byte
        frame_type: u8,
    },
}

/// A set-request was rejected before any bytes were transmitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// No status frame has been received yet, so there is nothing to patch.
    #[error("no status snapshot received yet")]
    NoSnapshot,
    /// Value is outside the property's domain.
    #[error("invalid value '{value}' for {property}")]
    InvalidValue {
        /// Property name
        property: String,
        /// Rejected value as received
        value: String,
    },
    /// Label is not defined for an enumerated property.
    #[error("unknown value '{value}' for {property}")]
    UnknownEnumValue {
        /// Property name
        property: String,
        /// Rejected label
        value: String,
    },
    /// No such property in the registry.
    #[error("unknown property: {0}")]
    UnknownProperty(String),
    /// Property is observable only.
    #[error("property is read-only: {0}")]
    ReadOnly(String),
    /// The frame to patch is not an intact status frame.
    #[error("snapshot is not a status frame: {0}")]
    InvalidSnapshot(ProtocolError),
}

/// A field dictionary failed validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// JSON could not be parsed
    #[error("registry parse error: {0}")]
    Parse(String),
    /// Two descriptors share a name
    #[error("duplicate property name: {0}")]
    DuplicateName(String),
    /// Descriptor is inconsistent with the frame layout or its own mask
    #[error("invalid descriptor {name}: {reason}")]
    InvalidDescriptor {
        /// Property name
        name: String,
        /// What is wrong with it
        reason: String,
    },
}
