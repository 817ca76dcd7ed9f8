//! Locating the device by broadcast.

use crate::error::TransportError;
use crate::session::{DeviceSession, SessionInfo, SessionState};
use crate::transport::Transport;
use acbridge_core::{decode_discovery_reply, ProtocolError, DISCOVERY_PROBE};
use std::net::SocketAddr;

/// What a discovery reply did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// The session became bound to this device.
    Bound(SessionInfo),
    /// Already bound; address and port refreshed. `moved` is set when the
    /// device answered from a different address than before.
    Refreshed {
        /// Device address changed
        moved: bool,
    },
}

/// Sends the discovery probe and interprets replies.
#[derive(Debug, Clone)]
pub struct DiscoverySession {
    target: SocketAddr,
    status_port: u16,
}

impl DiscoverySession {
    /// Probe `target` (broadcast address and probe port); the device will be
    /// contacted on `status_port` once found.
    #[must_use]
    pub fn new(target: SocketAddr, status_port: u16) -> Self {
        Self {
            target,
            status_port,
        }
    }

    /// Where probes are sent.
    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Broadcast the probe.
    ///
    /// Moves an unbound session to `Discovering`. On failure the state is left
    /// as it was; the caller retries on its next discovery tick.
    ///
    /// # Errors
    ///
    /// Returns error if the probe could not be sent.
    pub async fn probe<T: Transport>(
        &self,
        session: &mut DeviceSession,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        if let Err(e) = transport.send_datagram(&DISCOVERY_PROBE, self.target).await {
            tracing::warn!(target = %self.target, error = %e, "Discovery probe failed, will retry");
            return Err(e);
        }

        tracing::debug!(target = %self.target, "Discovery probe sent");
        if session.state() == SessionState::Unbound {
            session.transition(SessionState::Discovering);
        }
        Ok(())
    }

    /// Apply a discovery reply received from `from`.
    ///
    /// The first reply binds the session. Later replies while bound only
    /// refresh the address and port; properties are never reset.
    ///
    /// # Errors
    ///
    /// Returns error if `bytes` is not a valid discovery reply; the session is
    /// unchanged.
    pub fn handle_reply(
        &self,
        session: &mut DeviceSession,
        bytes: &[u8],
        from: SocketAddr,
    ) -> Result<DiscoveryOutcome, ProtocolError> {
        let identity = decode_discovery_reply(bytes)?;

        if session.state().is_bound() {
            if let Some(info) = session.info_mut() {
                let moved = info.address != from.ip();
                if moved {
                    tracing::info!(old = %info.address, new = %from.ip(), "Device address changed");
                }
                info.address = from.ip();
                info.discovery_port = from.port();
                return Ok(DiscoveryOutcome::Refreshed { moved });
            }
        }

        let info = SessionInfo {
            id: identity.id,
            name: identity.name,
            address: from.ip(),
            discovery_port: from.port(),
            status_port: self.status_port,
        };
        tracing::info!(id = %info.id, name = %info.name, address = %info.address, "Device discovered");

        session.set_info(info.clone());
        session.transition(SessionState::Bound);
        Ok(DiscoveryOutcome::Bound(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acbridge_core::frame::{seal, DISCOVERY_REPLY_LENGTH, TYPE_DISCOVERY_REPLY};

    fn reply() -> Vec<u8> {
        let mut frame = vec![0xAA, 0xAA, DISCOVERY_REPLY_LENGTH, TYPE_DISCOVERY_REPLY];
        frame.extend_from_slice(&[0xf0, 0xfe, 0x6b, 0x12, 0x34, 0x56]);
        frame.extend_from_slice(b"C&H1");
        frame.push(0);
        seal(&mut frame);
        frame
    }

    fn discovery() -> DiscoverySession {
        DiscoverySession::new("192.168.111.255:12414".parse().unwrap(), 12416)
    }

    #[test]
    fn first_reply_binds() {
        let mut session = DeviceSession::new();
        let from: SocketAddr = "192.168.111.40:12414".parse().unwrap();

        let outcome = discovery().handle_reply(&mut session, &reply(), from).unwrap();

        let info = match outcome {
            DiscoveryOutcome::Bound(info) => info,
            other => panic!("expected Bound, got {other:?}"),
        };
        assert_eq!(info.id, "f0fe6b123456");
        assert_eq!(
            info.status_endpoint(),
            "192.168.111.40:12416".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(session.state(), SessionState::Bound);
    }

    #[test]
    fn reply_while_bound_only_refreshes_address() {
        let mut session = DeviceSession::new();
        let discovery = discovery();
        discovery
            .handle_reply(&mut session, &reply(), "192.168.111.40:12414".parse().unwrap())
            .unwrap();

        let outcome = discovery
            .handle_reply(&mut session, &reply(), "192.168.111.41:40000".parse().unwrap())
            .unwrap();

        assert_eq!(outcome, DiscoveryOutcome::Refreshed { moved: true });
        let info = session.info().unwrap();
        assert_eq!(info.address.to_string(), "192.168.111.41");
        assert_eq!(info.discovery_port, 40000);
        assert_eq!(info.status_port, 12416);
        assert_eq!(session.state(), SessionState::Bound);
    }

    #[test]
    fn invalid_reply_leaves_session_unbound() {
        let mut session = DeviceSession::new();
        let mut bytes = reply();
        bytes[3] = 0x01;
        seal(&mut bytes);

        let err = discovery()
            .handle_reply(&mut session, &bytes, "192.168.111.40:12414".parse().unwrap())
            .unwrap_err();

        assert!(matches!(err, ProtocolError::UnexpectedFrame { .. }));
        assert_eq!(session.state(), SessionState::Unbound);
        assert!(session.info().is_none());
    }
}
