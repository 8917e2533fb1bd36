use crate::decoder::UplinkDecoder;
use crate::error::{DomainError, DomainResult};
use crate::repository::{EventPublisher, OutboxRepository};
use crate::types::NewOutboxRecord;
use crate::uplink::UplinkMessage;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Relay engine settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Source tag stamped into the cloud envelope.
    pub ns_product: String,

    /// Age past which outbox records are pruned, delivered or not.
    pub retention: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ns_product: "CHIRPSTACK".to_string(),
            retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Orchestrates ingestion → decode → persist → deliver → retry.
///
/// Flow per uplink:
/// 1. Parse the network-server event JSON
/// 2. Decode the raw payload (best effort, never blocks forwarding)
/// 3. Append to the durable outbox as pending
/// 4. Attempt primary publish, fall back to secondary
/// 5. Mark delivered only after a broker accepted the message
pub struct RelayService {
    decoder: Arc<dyn UplinkDecoder>,
    outbox: Arc<dyn OutboxRepository>,
    primary: Arc<dyn EventPublisher>,
    secondary: Arc<dyn EventPublisher>,
    config: RelayConfig,
}

impl RelayService {
    pub fn new(
        decoder: Arc<dyn UplinkDecoder>,
        outbox: Arc<dyn OutboxRepository>,
        primary: Arc<dyn EventPublisher>,
        secondary: Arc<dyn EventPublisher>,
        config: RelayConfig,
    ) -> Self {
        Self {
            decoder,
            outbox,
            primary,
            secondary,
            config,
        }
    }

    /// Ingest one raw uplink event from the inbound bus.
    ///
    /// The outbox append is the correctness backbone: a store failure
    /// aborts ingestion with an error. Delivery failures do not; the
    /// record stays pending for the sweep.
    pub async fn handle_uplink(&self, raw_event: &[u8]) -> DomainResult<()> {
        let mut event: Value = serde_json::from_slice(raw_event)
            .map_err(|e| DomainError::MalformedUplink(e.to_string()))?;
        let msg: UplinkMessage = serde_json::from_value(event.clone())
            .map_err(|e| DomainError::MalformedUplink(e.to_string()))?;

        let dev_eui = msg.device_info.dev_eui.clone();
        let received_at = msg
            .time
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

        debug!(
            dev_eui = %dev_eui,
            device_name = %msg.device_info.device_name,
            "Uplink received"
        );

        if let Some(encoded) = &msg.data {
            match BASE64_STANDARD.decode(encoded) {
                Ok(bytes) => {
                    if let Some(decoded) = self.decoder.decode(&msg.device_info.device_name, &bytes)
                    {
                        debug!(dev_eui = %dev_eui, decoded = %decoded, "Payload decoded");
                        event["decoded_data"] = decoded;
                    }
                }
                Err(e) => {
                    warn!(dev_eui = %dev_eui, error = %e, "Invalid base64 payload, forwarding raw event");
                }
            }
        }

        // First reporting gateway, null when none reported
        let gateway_id = msg
            .rx_info
            .first()
            .map(|rx| json!(rx.gateway_id))
            .unwrap_or(Value::Null);

        let envelope = json!({
            "lns": {"id": gateway_id},
            "payload": {
                "nsproduct": self.config.ns_product,
                "data": event,
            },
        });
        let payload = envelope.to_string();

        self.outbox
            .append(NewOutboxRecord {
                dev_eui: dev_eui.clone(),
                received_at: received_at.clone(),
                payload: payload.clone(),
            })
            .await?;

        if self.deliver(payload.as_bytes()).await {
            self.outbox.mark_delivered(&dev_eui, &received_at).await?;
        } else {
            warn!(dev_eui = %dev_eui, "Delivery failed on both brokers, left pending for sweep");
        }

        Ok(())
    }

    /// Publish to the primary broker, falling back to the secondary.
    /// Returns whether either broker accepted the message.
    async fn deliver(&self, payload: &[u8]) -> bool {
        match self.primary.publish_event(payload).await {
            Ok(()) => true,
            Err(primary_err) => {
                warn!(error = %primary_err, "Primary publish failed, trying backup broker");
                match self.secondary.publish_event(payload).await {
                    Ok(()) => true,
                    Err(backup_err) => {
                        error!(error = %backup_err, "Backup publish failed");
                        false
                    }
                }
            }
        }
    }

    /// Re-deliver every pending record, marking successes. Partial
    /// progress is fine; whatever still fails stays pending for the
    /// next pass. Returns the number delivered.
    pub async fn flush_pending(&self) -> DomainResult<usize> {
        let pending = self.outbox.list_pending().await?;
        if pending.is_empty() {
            debug!("No pending records to flush");
            return Ok(0);
        }

        info!(count = pending.len(), "Retrying pending outbox records");
        let mut delivered = 0;
        for record in &pending {
            if self.deliver(record.payload.as_bytes()).await {
                self.outbox
                    .mark_delivered(&record.dev_eui, &record.received_at)
                    .await?;
                delivered += 1;
            }
        }

        info!(
            delivered,
            still_pending = pending.len() - delivered,
            "Pending sweep finished"
        );
        Ok(delivered)
    }

    /// Drop records past the retention window regardless of delivery
    /// status. Bounds storage at the cost of losing undelivered
    /// records older than the window.
    pub async fn prune_aged(&self) -> DomainResult<u64> {
        let removed = self.outbox.prune_older_than(self.config.retention).await?;
        if removed > 0 {
            info!(removed, "Pruned aged outbox records");
        }
        Ok(removed)
    }
}
