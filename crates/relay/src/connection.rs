//! Connection handles held by the registry.

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::stream::SplitSink;
use futures::SinkExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Unique connection identifier.
pub type ConnectionId = Uuid;

/// Shared handle to a live connection.
pub type ConnectionHandle = Arc<Connection>;

/// Outbound half of a duplex connection.
#[async_trait]
pub trait MessageSink: Send + Sync + 'static {
    /// Write one complete text message.
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Close the outbound half. Errors are not interesting here.
    async fn close(&self) {}
}

/// A connected client as seen by the registry and the dispatcher.
///
/// Equality is handle identity: two connections are the same only if they
/// carry the same [`ConnectionId`].
pub struct Connection {
    /// Unique connection identifier.
    pub id: ConnectionId,
    /// Timestamp (ms) when the connection was accepted.
    pub connected_at: i64,
    sink: Box<dyn MessageSink>,
}

impl Connection {
    /// Wrap a sink in a new connection handle.
    pub fn new(sink: impl MessageSink) -> ConnectionHandle {
        Arc::new(Self {
            id: Uuid::new_v4(),
            connected_at: Utc::now().timestamp_millis(),
            sink: Box::new(sink),
        })
    }

    /// Write a text message, waiting for the transport to accept it.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.sink.send_text(text).await
    }

    /// Close the outbound half of the connection.
    pub async fn close(&self) {
        self.sink.close().await
    }

    /// Milliseconds since the connection was accepted.
    pub fn age_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.connected_at
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Write half of an axum WebSocket.
///
/// The mutex keeps writes from concurrent dispatches from interleaving.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send_text(&self, text: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(RelayError::from)
    }

    async fn close(&self) {
        let _ = self.inner.lock().await.close().await;
    }
}
