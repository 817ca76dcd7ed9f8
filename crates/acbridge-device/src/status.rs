//! Status polling over the persistent connection.

use crate::error::TransportError;
use crate::session::{DeviceSession, SessionState};
use crate::transport::Transport;
use acbridge_core::{PropertyRegistry, ProtocolError, STATUS_REQUEST};
use std::sync::Arc;

/// Default number of unanswered status requests before rediscovery.
pub const DEFAULT_MAX_MISSED_POLLS: u32 = 5;

/// Result of a poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A status request was written.
    Requested,
    /// Too many requests went unanswered; the session is back to
    /// `Discovering` and nothing was sent.
    Degraded,
    /// No device is bound.
    Skipped,
}

/// Requests and ingests status frames for a bound session.
#[derive(Debug, Clone)]
pub struct StatusChannel {
    registry: Arc<PropertyRegistry>,
    max_missed_polls: u32,
}

impl StatusChannel {
    /// Create a channel decoding with `registry`.
    #[must_use]
    pub fn new(registry: Arc<PropertyRegistry>, max_missed_polls: u32) -> Self {
        Self {
            registry,
            max_missed_polls: max_missed_polls.max(1),
        }
    }

    /// Send the status request.
    ///
    /// Each request counts as missed until a status frame is accepted. Once
    /// `max_missed_polls` requests are outstanding the session reverts to
    /// `Discovering` instead; the snapshot is kept.
    ///
    /// # Errors
    ///
    /// Returns error if the request could not be written.
    pub async fn request_status<T: Transport>(
        &self,
        session: &mut DeviceSession,
        transport: &mut T,
    ) -> Result<PollOutcome, TransportError> {
        let Some(peer) = session
            .info()
            .filter(|_| session.state().is_bound())
            .map(crate::session::SessionInfo::status_endpoint)
        else {
            return Ok(PollOutcome::Skipped);
        };

        if session.missed_polls() >= self.max_missed_polls {
            tracing::warn!(
                missed = session.missed_polls(),
                %peer,
                "Device stopped answering, rediscovering"
            );
            session.reset_missed_polls();
            session.transition(SessionState::Discovering);
            return Ok(PollOutcome::Degraded);
        }

        session.record_request();
        transport.send_over_connection(&STATUS_REQUEST, peer).await?;
        tracing::debug!(%peer, outstanding = session.missed_polls(), "Status requested");
        Ok(PollOutcome::Requested)
    }

    /// Accept a status frame as the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns error if the frame does not decode; the session is unchanged.
    pub fn ingest(&self, session: &mut DeviceSession, bytes: &[u8]) -> Result<(), ProtocolError> {
        session.apply_status(bytes, &self.registry)?;
        session.reset_missed_polls();
        if session.state() == SessionState::Bound {
            session.transition(SessionState::Polling);
        }
        Ok(())
    }
}
