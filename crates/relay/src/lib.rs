//! Channel relay: fans bus messages out to WebSocket clients.
//!
//! This service:
//! - Accepts WebSocket connections from browsers
//! - Registers each connection under every channel it sends a message for
//! - Pops envelopes from a Redis list
//! - Writes each envelope to the connections registered under its channel
//!
//! ## Architecture
//!
//! ```text
//! Redis list (BLPOP)
//!         ↓
//! BusBridge → Dispatcher
//!                 ↓
//! ConnectionRegistry (DashMap) ← ClientSession (one per socket)
//!                 ↓
//! WebSocket clients
//! ```

pub mod bridge;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod session;
pub mod ws_server;

pub use bridge::{BusBridge, BusSource};
pub use config::RelayConfig;
pub use connection::{Connection, ConnectionHandle, ConnectionId, MessageSink};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use envelope::Envelope;
pub use error::{RelayError, Result};
pub use registry::ConnectionRegistry;
pub use session::ClientSession;
pub use ws_server::{create_router, AppState};
