//! # acbridge Protocol
//!
//! Automation-bus vocabulary for the bridge.
//!
//! ## MQTT Topics
//!
//! Topic scheme: `{prefix}/{segment}/get` for state, `{prefix}/{segment}/set`
//! for commands, and `{prefix}/config` for the Home Assistant climate
//! discovery payload.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod messages;
pub mod topics;

pub use messages::{ClimateDiscovery, DiscoveryDevice, MessageError};
pub use topics::{CommandTarget, TopicScheme};
