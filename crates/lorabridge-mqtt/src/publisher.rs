use crate::backoff::ConnectionState;
use crate::supervisor::{BrokerHandle, PublishRequest};
use async_trait::async_trait;
use lorabridge_domain::error::{DomainError, DomainResult};
use lorabridge_domain::repository::EventPublisher;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes uplink envelopes to one topic on a supervised broker
/// session.
///
/// Fails fast while the session is down instead of queueing inside the
/// MQTT client; the outbox is the only retry buffer, so a pending
/// record is either delivered now or picked up by the sweep. A publish
/// resolves only once the broker's QoS 1 acknowledgment comes back, so
/// a record marked delivered really left the process.
pub struct MqttEventPublisher {
    handle: BrokerHandle,
    topic: String,
}

impl MqttEventPublisher {
    pub fn new(handle: BrokerHandle, topic: impl Into<String>) -> Self {
        Self {
            handle,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for MqttEventPublisher {
    async fn publish_event(&self, payload: &[u8]) -> DomainResult<()> {
        let state = *self.handle.state.borrow();
        if state != ConnectionState::Connected {
            return Err(DomainError::BrokerUnavailable(format!(
                "session is {state:?}"
            )));
        }

        let (done, acked) = oneshot::channel();
        self.handle
            .publishes
            .send(PublishRequest {
                topic: self.topic.clone(),
                payload: payload.to_vec(),
                done,
            })
            .await
            .map_err(|_| DomainError::BrokerUnavailable("session ended".to_string()))?;

        match tokio::time::timeout(ACK_TIMEOUT, acked).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(DomainError::PublishFailed {
                    topic: self.topic.clone(),
                    reason: "session dropped before acknowledgment".to_string(),
                })
            }
            Err(_) => {
                return Err(DomainError::PublishFailed {
                    topic: self.topic.clone(),
                    reason: "acknowledgment timed out".to_string(),
                })
            }
        }

        debug!(topic = %self.topic, payload_size = payload.len(), "event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc, watch};

    fn connected_handle(
        capacity: usize,
    ) -> (
        BrokerHandle,
        mpsc::Receiver<PublishRequest>,
        watch::Sender<ConnectionState>,
    ) {
        let (publish_tx, publish_rx) = mpsc::channel(capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        (
            BrokerHandle {
                publishes: publish_tx,
                state: state_rx,
            },
            publish_rx,
            state_tx,
        )
    }

    #[tokio::test]
    async fn test_publish_resolves_after_broker_ack() {
        let (handle, mut publish_rx, _state_tx) = connected_handle(4);
        let publisher = MqttEventPublisher::new(handle, "cloud/devices");

        let session = tokio::spawn(async move {
            let request = publish_rx.recv().await.unwrap();
            assert_eq!(request.topic, "cloud/devices");
            assert_eq!(request.payload, b"{}".to_vec());
            request.done.send(Ok(())).unwrap();
        });

        publisher.publish_event(b"{}").await.unwrap();
        session.await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_fails_when_session_reports_loss() {
        let (handle, mut publish_rx, _state_tx) = connected_handle(4);
        let publisher = MqttEventPublisher::new(handle, "cloud/devices");

        let session = tokio::spawn(async move {
            let request = publish_rx.recv().await.unwrap();
            let _ = request.done.send(Err(DomainError::BrokerUnavailable(
                "connection lost".to_string(),
            )));
        });

        let result = publisher.publish_event(b"{}").await;
        assert!(matches!(result, Err(DomainError::BrokerUnavailable(_))));
        session.await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_fails_when_ack_channel_drops() {
        let (handle, mut publish_rx, _state_tx) = connected_handle(4);
        let publisher = MqttEventPublisher::new(handle, "cloud/devices");

        let session = tokio::spawn(async move {
            let request = publish_rx.recv().await.unwrap();
            drop(request.done);
        });

        let result = publisher.publish_event(b"{}").await;
        assert!(matches!(result, Err(DomainError::PublishFailed { .. })));
        session.await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_rejected_while_disconnected() {
        let (handle, _publish_rx, state_tx) = connected_handle(4);
        state_tx.send_replace(ConnectionState::Disconnected);
        let publisher = MqttEventPublisher::new(handle, "cloud/devices");

        let result = publisher.publish_event(b"{}").await;
        assert!(matches!(result, Err(DomainError::BrokerUnavailable(_))));
    }
}
