//! Fan-out of envelopes to channel subscribers.

use crate::envelope::Envelope;
use crate::error::Result;
use crate::registry::ConnectionRegistry;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Writes that succeeded.
    pub delivered: usize,
    /// Writes that failed; those connections were unregistered.
    pub failed: usize,
}

/// Writes envelopes to every connection registered under their channel.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver an envelope to the current subscribers of its channel.
    ///
    /// Writes go out one recipient at a time. A failed write removes every
    /// registry entry for that connection and delivery carries on with the rest.
    pub async fn dispatch(&self, envelope: &Envelope) -> Result<DispatchReport> {
        let channel = &envelope.channel;
        debug!("Writing response, using channel {}", channel);

        let conns = self.registry.connections_for(channel);
        if conns.is_empty() {
            debug!("No connections for channel {}", channel);
            return Ok(DispatchReport::default());
        }

        // Serialize once for all recipients
        let json = envelope.to_json()?;

        let mut report = DispatchReport::default();
        for conn in conns {
            match conn.send_text(&json).await {
                Ok(()) => {
                    report.delivered += 1;
                    counter!("relay_deliveries_total").increment(1);
                }
                Err(e) => {
                    warn!("Error writing to connection {}: {}", conn.id, e);
                    self.registry.unregister_all(&conn);
                    report.failed += 1;
                    counter!("relay_delivery_failures_total").increment(1);
                }
            }
        }

        debug!(
            "Channel {}: delivered {}, failed {}",
            channel, report.delivered, report.failed
        );
        Ok(report)
    }
}
