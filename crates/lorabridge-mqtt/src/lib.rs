//! MQTT connection plumbing shared by the three broker sessions the
//! relay maintains (network server, cloud, backup cloud).

mod backoff;
mod publisher;
mod supervisor;
mod topic;

pub use backoff::{ConnectionState, ReconnectPolicy};
pub use publisher::MqttEventPublisher;
pub use supervisor::{
    BrokerConfig, BrokerHandle, ConnectionSupervisor, IncomingMessage, PublishRequest,
};
pub use topic::{uplink_topic, CloudTopics};
