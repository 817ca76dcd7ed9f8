//! Device session state.

use acbridge_core::{decode_status, PropertyMap, PropertyRegistry, ProtocolError};
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing sent yet
    Unbound,
    /// Probe sent, waiting for a reply
    Discovering,
    /// Device identified, no status decoded yet
    Bound,
    /// Status frames are flowing
    Polling,
}

impl SessionState {
    /// Whether a device address is known and in use.
    #[must_use]
    pub fn is_bound(self) -> bool {
        matches!(self, Self::Bound | Self::Polling)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbound => "unbound",
            Self::Discovering => "discovering",
            Self::Bound => "bound",
            Self::Polling => "polling",
        };
        f.write_str(name)
    }
}

/// Identity and endpoints of the bound device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Hardware identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Address the discovery reply came from
    pub address: IpAddr,
    /// Port the discovery reply came from
    pub discovery_port: u16,
    /// Port of the status/command connection
    pub status_port: u16,
}

impl SessionInfo {
    /// Endpoint for the status connection.
    #[must_use]
    pub fn status_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.status_port)
    }
}

/// Everything known about the single device being bridged.
///
/// `properties` is always the decoding of `last_frame`; both are only ever
/// replaced together by [`DeviceSession::apply_status`].
#[derive(Debug, Clone)]
pub struct DeviceSession {
    state: SessionState,
    info: Option<SessionInfo>,
    last_frame: Option<Vec<u8>>,
    properties: PropertyMap,
    missed_polls: u32,
}

impl Default for DeviceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceSession {
    /// Create an unbound session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::Unbound,
            info: None,
            last_frame: None,
            properties: PropertyMap::new(),
            missed_polls: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identity and endpoints, once discovered.
    #[must_use]
    pub fn info(&self) -> Option<&SessionInfo> {
        self.info.as_ref()
    }

    /// The last accepted status frame.
    #[must_use]
    pub fn last_frame(&self) -> Option<&[u8]> {
        self.last_frame.as_deref()
    }

    /// Properties decoded from [`Self::last_frame`].
    #[must_use]
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    /// Status requests issued since the last accepted status frame.
    #[must_use]
    pub fn missed_polls(&self) -> u32 {
        self.missed_polls
    }

    pub(crate) fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "Session state changed");
            self.state = next;
        }
    }

    pub(crate) fn set_info(&mut self, info: SessionInfo) {
        self.info = Some(info);
    }

    pub(crate) fn info_mut(&mut self) -> Option<&mut SessionInfo> {
        self.info.as_mut()
    }

    pub(crate) fn record_request(&mut self) {
        self.missed_polls = self.missed_polls.saturating_add(1);
    }

    pub(crate) fn reset_missed_polls(&mut self) {
        self.missed_polls = 0;
    }

    /// Decode `frame` and, only if that succeeds, make it the new snapshot.
    pub(crate) fn apply_status(
        &mut self,
        frame: &[u8],
        registry: &PropertyRegistry,
    ) -> Result<(), ProtocolError> {
        let properties = decode_status(frame, registry)?;
        self.last_frame = Some(frame.to_vec());
        self.properties = properties;
        Ok(())
    }
}
