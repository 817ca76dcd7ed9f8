//! # acbridge Agent
//!
//! Bridges one air-conditioning unit to an MQTT broker.
//!
//! ## Architecture
//!
//! A single task owns the device bridge and multiplexes:
//! 1. **Inbound**: frames read from the device sockets
//! 2. **Discovery**: periodic broadcast probe until a device is bound
//! 3. **Polling**: periodic status request to the bound device
//! 4. **Events**: state changes published to `{prefix}/{segment}/get`
//! 5. **Commands**: `{prefix}/{segment}/set` messages applied to the device

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod bus;
mod config;
mod runtime;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting acbridge agent");

    let mut config = AgentConfig::from_env()?;
    let client_id = config
        .bus
        .client_id
        .get_or_insert_with(|| format!("acbridge-{}", Uuid::new_v4()))
        .clone();

    tracing::info!(%client_id, host = %config.device.hvac_host, "Agent initialized");

    let agent = Agent::new(config)?;
    agent.run().await?;

    Ok(())
}
