//! Tenant-tagged realtime notifications (fan-out to SSE subscribers).
//!
//! Lossy broadcast: slow subscribers miss messages rather than applying
//! backpressure to publishers. Consumers filter by tenant.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use propdesk_core::TenantId;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<RealtimeMessage>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish; a message with no subscribers is dropped.
    pub fn publish(&self, tenant_id: TenantId, topic: impl Into<String>, payload: serde_json::Value) {
        let topic = topic.into();
        let delivered = self
            .tx
            .send(RealtimeMessage {
                tenant_id,
                topic: topic.clone(),
                payload,
            })
            .unwrap_or(0);
        trace!(tenant_id = %tenant_id, topic = %topic, delivered, "realtime message published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.tx.subscribe()
    }
}
