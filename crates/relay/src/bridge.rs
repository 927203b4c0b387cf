//! Bus bridge: Redis list → Dispatcher.
//!
//! Pops one payload at a time and dispatches it. A payload that is not a
//! valid envelope is logged and skipped; the publishers are trusted but one
//! bad message is not worth taking every client connection down for.

use crate::dispatcher::Dispatcher;
use crate::envelope::Envelope;
use crate::error::Result;
use async_trait::async_trait;
use bus_client::RedisBus;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Source of raw bus payloads.
#[async_trait]
pub trait BusSource: Send + 'static {
    /// Block until the next payload arrives. `None` means the source is done.
    async fn next_payload(&mut self) -> Result<Option<String>>;
}

#[async_trait]
impl BusSource for RedisBus {
    async fn next_payload(&mut self) -> Result<Option<String>> {
        Ok(Some(self.pop().await?))
    }
}

/// Drives the dispatcher from a bus source.
pub struct BusBridge<S: BusSource> {
    source: S,
    dispatcher: Dispatcher,
}

impl<S: BusSource> BusBridge<S> {
    pub fn new(source: S, dispatcher: Dispatcher) -> Self {
        Self { source, dispatcher }
    }

    /// Run until the source ends, fails, or a shutdown signal arrives.
    ///
    /// A source error is returned to the caller; the relay must not keep
    /// serving clients without its bus.
    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!("BusBridge running");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("BusBridge received shutdown signal");
                    break;
                }

                payload = self.source.next_payload() => {
                    match payload? {
                        Some(payload) => self.handle_payload(&payload).await,
                        None => {
                            warn!("Bus source ended");
                            break;
                        }
                    }
                }
            }
        }

        info!("BusBridge stopped");
        Ok(())
    }

    async fn handle_payload(&self, payload: &str) {
        counter!("relay_bus_messages_total").increment(1);
        debug!("bus payload is {}", payload);

        let envelope = match Envelope::from_json(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Skipping malformed bus payload: {}", e);
                counter!("relay_bus_decode_errors_total").increment(1);
                return;
            }
        };

        if let Err(e) = self.dispatcher.dispatch(&envelope).await {
            warn!("Failed to dispatch to channel {}: {}", envelope.channel, e);
        }
    }
}
