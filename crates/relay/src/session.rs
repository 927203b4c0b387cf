//! Per-connection read loop.
//!
//! Every non-ping envelope a client sends (re)declares interest in its
//! channel. Bad JSON is logged and dropped without closing the socket.
//! When the read side ends for any reason every registry entry for the
//! connection is removed, exactly once.

use crate::connection::ConnectionHandle;
use crate::envelope::Envelope;
use crate::registry::ConnectionRegistry;
use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use metrics::counter;
use std::fmt::Display;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, warn};

/// Removes every registry entry for a connection when dropped, including
/// on unwind.
pub(crate) struct RegistrationGuard {
    conn: ConnectionHandle,
    registry: Arc<ConnectionRegistry>,
}

impl RegistrationGuard {
    pub(crate) fn new(conn: ConnectionHandle, registry: Arc<ConnectionRegistry>) -> Self {
        Self { conn, registry }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        let removed = self.registry.unregister_all(&self.conn);
        debug!(
            "Connection {} unregistered, {} entries removed",
            self.conn.id, removed
        );
    }
}

/// Read loop for one client connection.
pub struct ClientSession {
    conn: ConnectionHandle,
    registry: Arc<ConnectionRegistry>,
}

impl ClientSession {
    pub fn new(conn: ConnectionHandle, registry: Arc<ConnectionRegistry>) -> Self {
        Self { conn, registry }
    }

    /// Consume inbound frames until the peer goes away, then clean up.
    pub async fn run<S, E>(self, mut inbound: S)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let guard = RegistrationGuard::new(self.conn.clone(), self.registry.clone());

        loop {
            match inbound.next().await {
                Some(Ok(msg)) => {
                    if self.handle_message(msg).is_break() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    debug!("Read error on {}: {}", self.conn.id, e);
                    break;
                }
                None => {
                    debug!("Connection {} stream ended", self.conn.id);
                    break;
                }
            }
        }

        drop(guard);
        self.conn.close().await;
    }

    fn handle_message(&self, msg: Message) -> ControlFlow<()> {
        let decoded = match msg {
            Message::Text(text) => {
                debug!("recv: '{}'", text.as_str());
                Envelope::from_json(text.as_str())
            }
            Message::Binary(data) => Envelope::from_slice(&data),
            Message::Ping(_) | Message::Pong(_) => return ControlFlow::Continue(()),
            Message::Close(frame) => {
                debug!("Connection {} sent close: {:?}", self.conn.id, frame);
                return ControlFlow::Break(());
            }
        };

        match decoded {
            Ok(envelope) => self.handle_envelope(&envelope),
            Err(e) => {
                warn!(
                    "Could not parse websocket request JSON from {}, ignoring: {}",
                    self.conn.id, e
                );
                counter!("relay_client_decode_errors_total").increment(1);
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_envelope(&self, envelope: &Envelope) {
        if envelope.is_ping() {
            return;
        }
        self.registry.register(&envelope.channel, self.conn.clone());
        counter!("relay_registrations_total").increment(1);
    }
}
