use crate::error::DomainResult;
use crate::types::{
    CreateApplicationInput, CreateDeviceInput, EnqueueDownlinkInput, GatewayInput, GatewayRecord,
    NewOutboxRecord, OutboxRecord, RecordId,
};
use async_trait::async_trait;
use std::time::Duration;

/// Durable store of ingested events and their delivery status.
/// Infrastructure layer (lorabridge-outbox) implements this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Persist a new record with pending status. The record must be
    /// durable before this returns; ingestion is not complete until
    /// the store confirms the write.
    async fn append(&self, record: NewOutboxRecord) -> DomainResult<RecordId>;

    /// Idempotently transition a record to delivered, matched by the
    /// `(dev_eui, received_at)` composite key with the exact original
    /// timestamp text.
    async fn mark_delivered(&self, dev_eui: &str, received_at: &str) -> DomainResult<()>;

    /// All records still pending, oldest first.
    async fn list_pending(&self) -> DomainResult<Vec<OutboxRecord>>;

    /// Delete every record older than `age`, pending or delivered,
    /// returning the number removed.
    async fn prune_older_than(&self, age: Duration) -> DomainResult<u64>;
}

/// Outbound publisher for one broker endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a serialized event; resolves once the broker has
    /// accepted it. Errors cover not-connected, timeout and
    /// broker-rejected cases.
    async fn publish_event(&self, payload: &[u8]) -> DomainResult<()>;
}

/// CRUD surface of the external LoRaWAN network server. The relay
/// treats every call as opaque: it either succeeded or it failed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkServerApi: Send + Sync {
    async fn create_device(&self, input: CreateDeviceInput) -> DomainResult<()>;

    async fn delete_device(&self, dev_eui: &str) -> DomainResult<()>;

    async fn enqueue_downlink(&self, input: EnqueueDownlinkInput) -> DomainResult<()>;

    async fn create_gateway(&self, input: GatewayInput) -> DomainResult<()>;

    async fn update_gateway(&self, input: GatewayInput) -> DomainResult<()>;

    async fn delete_gateway(&self, gateway_id: &str) -> DomainResult<()>;

    async fn create_application(&self, input: CreateApplicationInput) -> DomainResult<()>;

    async fn delete_application(&self, application_id: &str) -> DomainResult<()>;

    /// Fresh gateway snapshot for the liveness projection.
    async fn get_gateway(&self, gateway_id: &str) -> DomainResult<Option<GatewayRecord>>;
}
