//! # acbridge Core
//!
//! Protocol-facing building blocks for the acbridge air-conditioner bridge.
//!
//! This crate provides:
//! - The field dictionary describing where each property lives in a status frame
//! - Decoded property values and the property map built from a frame
//! - Frame encoding/decoding with the additive checksum
//! - The single-field patch used to derive every command from the last snapshot
//!
//! Nothing here performs I/O; the device crate drives these functions from
//! its event loop.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod registry;
pub mod value;

pub use error::{CommandError, ProtocolError, RegistryError};
pub use frame::{
    checksum, decode_discovery_reply, decode_status, patch_field, DeviceIdentity,
    DISCOVERY_PROBE, STATUS_REQUEST,
};
pub use registry::{EnumEntry, FieldEncoding, PropertyDescriptor, PropertyRegistry};
pub use value::{PropertyMap, PropertyValue, EFFECTIVE_MODE};
