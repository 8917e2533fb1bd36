/// Delivery status of an outbox record.
///
/// `Pending` records are retried by the sweep until delivered or aged
/// out; `Delivered` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    Pending,
    Delivered,
}

impl PublishStatus {
    /// Column encoding used by the outbox store (done INTEGER 0|1).
    pub fn as_i64(self) -> i64 {
        match self {
            PublishStatus::Pending => 0,
            PublishStatus::Delivered => 1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        if value == 0 {
            PublishStatus::Pending
        } else {
            PublishStatus::Delivered
        }
    }
}

/// Row id assigned by the outbox store on append.
pub type RecordId = i64;

/// A persisted delivery unit, 1:1 with an ingested uplink event.
///
/// `received_at` is kept as the verbatim timestamp text assigned at
/// ingestion; it is half of the composite key used by
/// `mark_delivered` and must never be reformatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    pub dev_eui: String,
    pub received_at: String,
    pub payload: String,
    pub published: PublishStatus,
}

/// Input for appending a new outbox record; status starts at pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxRecord {
    pub dev_eui: String,
    pub received_at: String,
    pub payload: String,
}

/// Default heartbeat period a gateway advertises when none is set.
pub const DEFAULT_STATS_INTERVAL_SECS: u32 = 30;

/// Snapshot of gateway metadata owned by the network server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRecord {
    pub gateway_id: String,
    pub name: String,
    pub description: String,
    pub stats_interval_secs: u32,
    pub last_seen_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Derived online/offline status of a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    NeverSeen,
    Online,
    Offline,
}

/// Input for provisioning a device on the network server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDeviceInput {
    pub dev_eui: String,
    pub name: String,
    pub description: String,
    pub device_class: String,
    pub join_eui: String,
    pub app_key: String,
}

/// Input for enqueueing a downlink packet to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueDownlinkInput {
    pub dev_eui: String,
    pub port: u32,
    pub confirmed: bool,
    pub payload_hex: String,
}

/// Input for creating or updating a gateway on the network server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayInput {
    pub gateway_id: String,
    pub name: String,
    pub description: String,
}

/// Input for creating an application on the network server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateApplicationInput {
    pub tenant_id: String,
    pub name: String,
    pub description: String,
}
