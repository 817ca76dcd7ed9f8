//! # acbridge Device
//!
//! Drives a single air-conditioning unit over its local-network protocol.
//!
//! ## Lifecycle
//!
//! ```text
//! Unbound ──probe sent──▶ Discovering ──reply──▶ Bound ──first status──▶ Polling
//!                              ▲                                           │
//!                              └──────────── too many missed polls ────────┘
//! ```
//!
//! [`Bridge`] owns the [`DeviceSession`] and every component that touches it.
//! The caller owns the event loop: it feeds [`Inbound`] frames to
//! [`Bridge::handle_inbound`], ticks [`Bridge::discover`] and [`Bridge::poll`]
//! from timers, and drains [`BridgeEvent`]s from the channel returned by
//! [`Bridge::new`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod status;
pub mod stream;
pub mod sync;
pub mod transport;

pub use bridge::{Bridge, BridgeConfig, BridgeEvent};
pub use discovery::{DiscoveryOutcome, DiscoverySession};
pub use dispatch::CommandDispatcher;
pub use error::{BridgeError, TransportError};
pub use session::{DeviceSession, SessionInfo, SessionState};
pub use status::{PollOutcome, StatusChannel};
pub use stream::StatusFrameDecoder;
pub use sync::StateSynchronizer;
pub use transport::{Inbound, TokioTransport, Transport};
