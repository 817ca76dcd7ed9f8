//! The device-facing half of the bridge.

use crate::discovery::{DiscoveryOutcome, DiscoverySession};
use crate::dispatch::CommandDispatcher;
use crate::error::{BridgeError, TransportError};
use crate::session::{DeviceSession, SessionInfo};
use crate::status::{PollOutcome, StatusChannel, DEFAULT_MAX_MISSED_POLLS};
use crate::sync::StateSynchronizer;
use crate::transport::{Inbound, Transport};
use acbridge_core::frame::{peek_type, TYPE_DISCOVERY_REPLY, TYPE_STATUS};
use acbridge_core::{PropertyRegistry, PropertyValue};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Endpoints and limits for a [`Bridge`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Broadcast address and probe port
    pub discovery_target: SocketAddr,
    /// Device port of the status connection
    pub status_port: u16,
    /// Unanswered status requests before rediscovery
    pub max_missed_polls: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            discovery_target: SocketAddr::from((Ipv4Addr::new(192, 168, 111, 255), 12414)),
            status_port: 12416,
            max_missed_polls: DEFAULT_MAX_MISSED_POLLS,
        }
    }
}

/// Events for the automation-bus side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A device was discovered and the session bound to it.
    Bound(SessionInfo),
    /// A property (or the effective mode) has a new value.
    StatusChanged {
        /// Property name
        name: String,
        /// New value
        value: PropertyValue,
    },
}

/// Owns the device session and drives it from the caller's loop.
pub struct Bridge<T: Transport> {
    transport: T,
    registry: Arc<PropertyRegistry>,
    session: DeviceSession,
    discovery: DiscoverySession,
    status: StatusChannel,
    dispatcher: CommandDispatcher,
    synchronizer: StateSynchronizer,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl<T: Transport> Bridge<T> {
    /// Create a bridge and the receiver for its events.
    #[must_use]
    pub fn new(
        config: &BridgeConfig,
        registry: PropertyRegistry,
        transport: T,
    ) -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let registry = Arc::new(registry);
        let (tx, rx) = mpsc::unbounded_channel();

        let bridge = Self {
            transport,
            discovery: DiscoverySession::new(config.discovery_target, config.status_port),
            status: StatusChannel::new(Arc::clone(&registry), config.max_missed_polls),
            dispatcher: CommandDispatcher::new(Arc::clone(&registry)),
            registry,
            session: DeviceSession::new(),
            synchronizer: StateSynchronizer::new(),
            events: tx,
        };
        (bridge, rx)
    }

    /// The session.
    #[must_use]
    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// The field dictionary in use.
    #[must_use]
    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    /// The transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Discovery tick: probe unless a device is already bound.
    ///
    /// # Errors
    ///
    /// Returns error if the probe could not be sent; retry on the next tick.
    pub async fn discover(&mut self) -> Result<(), TransportError> {
        if self.session.state().is_bound() {
            return Ok(());
        }
        self.discovery
            .probe(&mut self.session, &mut self.transport)
            .await
    }

    /// Poll tick: request status from the bound device.
    ///
    /// When too many requests have gone unanswered the connection is dropped
    /// and probing restarts immediately.
    ///
    /// # Errors
    ///
    /// Returns error if the request or the follow-up probe could not be sent.
    pub async fn poll(&mut self) -> Result<PollOutcome, TransportError> {
        let outcome = self
            .status
            .request_status(&mut self.session, &mut self.transport)
            .await?;

        if outcome == PollOutcome::Degraded {
            self.transport.disconnect();
            self.discover().await?;
        }
        Ok(outcome)
    }

    /// Process one received frame.
    ///
    /// Frames are routed by type byte. Anything that fails to decode is
    /// logged and dropped without touching the session. Binding to a device
    /// requests its status right away.
    pub async fn handle_inbound(&mut self, inbound: &Inbound) {
        let bytes = inbound.bytes();
        let from = inbound.sender();

        match peek_type(bytes) {
            Some(TYPE_DISCOVERY_REPLY) => self.handle_discovery_reply(bytes, from).await,
            Some(TYPE_STATUS) => self.handle_status(bytes, from),
            Some(other) => {
                tracing::debug!(%from, frame_type = other, len = bytes.len(), "Ignoring frame");
            }
            None => {
                tracing::warn!(%from, len = bytes.len(), "Dropping bytes without sync header");
            }
        }
    }

    async fn handle_discovery_reply(&mut self, bytes: &[u8], from: SocketAddr) {
        match self.discovery.handle_reply(&mut self.session, bytes, from) {
            Ok(DiscoveryOutcome::Bound(info)) => {
                self.emit(BridgeEvent::Bound(info));
                if let Err(e) = self.poll().await {
                    tracing::warn!(error = %e, "Initial status request failed");
                }
            }
            Ok(DiscoveryOutcome::Refreshed { moved }) => {
                if moved {
                    self.transport.disconnect();
                }
            }
            Err(e) => tracing::warn!(%from, error = %e, "Dropping discovery reply"),
        }
    }

    fn handle_status(&mut self, bytes: &[u8], from: SocketAddr) {
        if let Err(e) = self.status.ingest(&mut self.session, bytes) {
            tracing::warn!(%from, error = %e, "Dropping status frame");
            return;
        }

        for (name, value) in self.synchronizer.observe(self.session.properties()) {
            tracing::debug!(%name, %value, "Status changed");
            self.emit(BridgeEvent::StatusChanged { name, value });
        }
    }

    fn emit(&self, event: BridgeEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }

    /// Set a property from bus input (`on`, `cool`, `24`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Command`] if the request is rejected (nothing is
    /// sent), or [`BridgeError::Transport`] if the frame could not be written.
    pub async fn set_property(&mut self, name: &str, raw: &str) -> Result<(), BridgeError> {
        let frame = self
            .dispatcher
            .build(&self.session, name, raw)
            .map_err(|e| {
                tracing::warn!(property = name, value = raw, error = %e, "Command rejected");
                e
            })?;
        self.send_command(&frame, name).await
    }

    /// Set the effective mode: `off` powers down, a mode label powers up in
    /// that mode. Sent as one frame.
    ///
    /// # Errors
    ///
    /// Same as [`Self::set_property`].
    pub async fn set_effective_mode(&mut self, label: &str) -> Result<(), BridgeError> {
        let frame = self
            .dispatcher
            .build_effective_mode(&self.session, label)
            .map_err(|e| {
                tracing::warn!(value = label, error = %e, "Effective mode rejected");
                e
            })?;
        self.send_command(&frame, acbridge_core::EFFECTIVE_MODE).await
    }

    async fn set_value(&mut self, name: &str, value: PropertyValue) -> Result<(), BridgeError> {
        let frame = self.dispatcher.build_value(&self.session, name, &value)?;
        self.send_command(&frame, name).await
    }

    async fn send_command(&mut self, frame: &[u8], property: &str) -> Result<(), BridgeError> {
        let peer = self
            .session
            .info()
            .map(SessionInfo::status_endpoint)
            .ok_or(BridgeError::NotBound)?;

        self.transport.send_over_connection(frame, peer).await?;
        tracing::info!(property, %peer, "Command sent");

        // Confirm through a fresh snapshot rather than waiting for the next tick.
        if let Err(e) = self.poll().await {
            tracing::warn!(error = %e, "Status request after command failed");
        }
        Ok(())
    }

    /// Turn the unit on or off.
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_power(&mut self, on: bool) -> Result<(), BridgeError> {
        self.set_value("power", PropertyValue::flag(on)).await
    }

    /// Set the operating mode (`auto`, `cool`, `dry`, `wind`, `heat`).
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_mode(&mut self, mode: &str) -> Result<(), BridgeError> {
        self.set_value("mode", PropertyValue::label(mode)).await
    }

    /// Set the target temperature.
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_temperature(&mut self, degrees: u8) -> Result<(), BridgeError> {
        self.set_value("temperature", PropertyValue::Number(degrees)).await
    }

    /// Set the fan speed (`l0`..`l6`).
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_fan_speed(&mut self, speed: &str) -> Result<(), BridgeError> {
        self.set_value("fan_speed", PropertyValue::label(speed)).await
    }

    /// Set horizontal swing.
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_swing_hor(&mut self, swing: &str) -> Result<(), BridgeError> {
        self.set_value("swing_hor", PropertyValue::label(swing)).await
    }

    /// Set vertical swing.
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_swing_vert(&mut self, swing: &str) -> Result<(), BridgeError> {
        self.set_value("swing_vert", PropertyValue::label(swing)).await
    }

    /// Switch the display lights.
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_lights(&mut self, on: bool) -> Result<(), BridgeError> {
        self.set_value("lights", PropertyValue::flag(on)).await
    }

    /// Switch health (ionizer) mode.
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_health(&mut self, on: bool) -> Result<(), BridgeError> {
        self.set_value("health", PropertyValue::flag(on)).await
    }

    /// Switch sleep mode.
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_sleep(&mut self, on: bool) -> Result<(), BridgeError> {
        self.set_value("sleep", PropertyValue::flag(on)).await
    }

    /// Set quiet mode (`off`, `mode1`..`mode3`).
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_quiet(&mut self, level: &str) -> Result<(), BridgeError> {
        self.set_value("quiet", PropertyValue::label(level)).await
    }

    /// Switch blow (coil drying).
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_blow(&mut self, on: bool) -> Result<(), BridgeError> {
        self.set_value("blow", PropertyValue::flag(on)).await
    }

    /// Set the air valve (`off`, `inside`, `outside`, `mode3`).
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_air(&mut self, valve: &str) -> Result<(), BridgeError> {
        self.set_value("air", PropertyValue::label(valve)).await
    }

    /// Switch turbo.
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_turbo(&mut self, on: bool) -> Result<(), BridgeError> {
        self.set_value("turbo", PropertyValue::flag(on)).await
    }

    /// Switch energy saving.
    ///
    /// # Errors
    ///
    /// See [`Self::set_property`].
    pub async fn set_energy_save(&mut self, on: bool) -> Result<(), BridgeError> {
        self.set_value("energy_save", PropertyValue::flag(on)).await
    }
}
