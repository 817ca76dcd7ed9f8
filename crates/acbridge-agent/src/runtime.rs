//! Agent runtime orchestration.

use crate::bus::BusClient;
use crate::config::AgentConfig;
use acbridge_core::DeviceIdentity;
use acbridge_device::{Bridge, BridgeError, BridgeEvent, TokioTransport};
use acbridge_proto::{ClimateDiscovery, CommandTarget, TopicScheme};
use anyhow::{Context, Result};
use rumqttc::{Event, Packet, Publish};
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, Sleep};

/// Delay before polling the MQTT event loop again after a connection error.
const BUS_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Holds the MQTT event loop back after an error while the device side keeps
/// running.
struct BusRetry {
    delay: Duration,
    sleep: Pin<Box<Sleep>>,
    waiting: bool,
}

impl BusRetry {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            sleep: Box::pin(tokio::time::sleep(Duration::ZERO)),
            waiting: false,
        }
    }

    fn start(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.delay);
        self.waiting = true;
    }

    fn is_waiting(&self) -> bool {
        self.waiting
    }

    async fn wait(&mut self) {
        self.sleep.as_mut().await;
        self.waiting = false;
    }
}

/// The main agent runtime.
pub struct Agent {
    config: AgentConfig,
    client_id: String,
}

impl Agent {
    /// Create a new agent.
    ///
    /// # Errors
    ///
    /// Returns error if no MQTT client id was resolved.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let client_id = config
            .bus
            .client_id
            .clone()
            .context("MQTT client id not set")?;
        Ok(Self { config, client_id })
    }

    /// Run the agent's main loop.
    ///
    /// # Errors
    ///
    /// Returns error if startup fails.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Starting agent runtime");

        let registry = self.config.device.load_registry()?;
        let (transport, mut inbound) = TokioTransport::new();
        let (mut bridge, mut events) =
            Bridge::new(&self.config.device.bridge_config(), registry, transport);

        let topic_scheme = TopicScheme::new(&self.config.bus.topic_prefix);
        let (bus, mut eventloop) =
            BusClient::new(&self.config.bus, &self.client_id, topic_scheme.clone())
                .context("Failed to create MQTT client")?;

        let mut discovery_timer = tokio::time::interval(self.config.device.discovery_retry);
        let mut poll_timer = tokio::time::interval(self.config.device.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut bus_retry = BusRetry::new(BUS_RETRY_DELAY);

        tracing::info!("Agent running, press Ctrl+C to stop");

        loop {
            tokio::select! {
                Some(frame) = inbound.recv() => {
                    bridge.handle_inbound(&frame).await;
                }

                _ = discovery_timer.tick() => {
                    // Failures are logged by the bridge and retried next tick.
                    let _ = bridge.discover().await;
                }

                _ = poll_timer.tick() => {
                    if let Err(e) = bridge.poll().await {
                        tracing::warn!(error = %e, "Status poll failed");
                    }
                }

                Some(event) = events.recv() => {
                    self.publish_event(&bus, &topic_scheme, &bridge, event);
                }

                () = bus_retry.wait(), if bus_retry.is_waiting() => {
                    tracing::debug!("Retrying MQTT connection");
                }

                event = eventloop.poll(), if !bus_retry.is_waiting() => {
                    match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            apply_command(&mut bridge, &topic_scheme, &publish).await;
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            tracing::info!("Connected to MQTT broker");
                            // A clean session drops subscriptions on reconnect.
                            if bridge.session().info().is_some() {
                                if let Err(e) = bus.subscribe_commands() {
                                    tracing::warn!(error = %e, "Failed to resubscribe");
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "MQTT error");
                            bus_retry.start();
                        }
                    }
                }

                // Handle shutdown
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        tracing::info!("Agent stopped");
        Ok(())
    }

    fn publish_event(
        &self,
        bus: &BusClient,
        topic_scheme: &TopicScheme,
        bridge: &Bridge<TokioTransport>,
        event: BridgeEvent,
    ) {
        match event {
            BridgeEvent::Bound(info) => {
                if let Err(e) = bus.subscribe_commands() {
                    tracing::warn!(error = %e, "Failed to subscribe to commands");
                }

                let identity = DeviceIdentity {
                    id: info.id,
                    name: info.name,
                };
                let discovery = ClimateDiscovery::new(
                    topic_scheme,
                    bridge.registry(),
                    &identity,
                    &self.config.device.device_name,
                );
                if let Err(e) = bus.publish_discovery(&discovery) {
                    tracing::warn!(error = %e, "Failed to publish discovery payload");
                }
            }
            BridgeEvent::StatusChanged { name, value } => {
                if let Err(e) = bus.publish_state(&name, &value) {
                    tracing::warn!(property = %name, error = %e, "Failed to publish state");
                }
            }
        }
    }
}

async fn apply_command(
    bridge: &mut Bridge<TokioTransport>,
    topic_scheme: &TopicScheme,
    publish: &Publish,
) {
    let Some(target) = topic_scheme.parse_command(&publish.topic) else {
        tracing::debug!(topic = %publish.topic, "Ignoring message outside command topics");
        return;
    };

    let Ok(payload) = std::str::from_utf8(&publish.payload) else {
        tracing::warn!(topic = %publish.topic, "Ignoring non-UTF-8 command payload");
        return;
    };

    tracing::debug!(topic = %publish.topic, payload, "Received command");

    let result = match target {
        CommandTarget::EffectiveMode => bridge.set_effective_mode(payload).await,
        CommandTarget::Property(name) => bridge.set_property(&name, payload).await,
    };

    match result {
        Ok(()) => {}
        // Rejections are already logged by the bridge.
        Err(BridgeError::Command(e)) => {
            tracing::debug!(topic = %publish.topic, error = %e, "Command not applied");
        }
        Err(e) => {
            tracing::warn!(topic = %publish.topic, error = %e, "Command not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bus_retry_waits_out_its_delay() {
        let mut retry = BusRetry::new(Duration::from_millis(30));
        assert!(!retry.is_waiting());

        let started = Instant::now();
        retry.start();
        assert!(retry.is_waiting());
        retry.wait().await;

        assert!(!retry.is_waiting());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn other_work_runs_while_bus_retry_waits() {
        let mut retry = BusRetry::new(Duration::from_secs(5));
        retry.start();

        let mut ticks = 0;
        let mut timer = tokio::time::interval(Duration::from_millis(5));
        while ticks < 3 {
            tokio::select! {
                () = retry.wait(), if retry.is_waiting() => panic!("retry finished early"),
                _ = timer.tick() => ticks += 1,
            }
        }

        assert!(retry.is_waiting());
    }
}
