use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // ChirpStack MQTT (inbound uplinks)
    /// Network server broker host
    #[serde(default = "default_chirpstack_mqtt_host")]
    pub chirpstack_mqtt_host: String,

    /// Network server broker port
    #[serde(default = "default_chirpstack_mqtt_port")]
    pub chirpstack_mqtt_port: u16,

    /// ChirpStack application whose uplinks are relayed
    #[serde(default = "default_chirpstack_application_id")]
    pub chirpstack_application_id: String,

    // ChirpStack REST API (command channel)
    /// REST gateway base URL
    #[serde(default = "default_chirpstack_api_url")]
    pub chirpstack_api_url: String,

    /// API key, generated on the ChirpStack host
    #[serde(default = "default_chirpstack_api_key")]
    pub chirpstack_api_key: String,

    /// Tenant owning provisioned gateways and applications
    #[serde(default = "default_chirpstack_tenant_id")]
    pub chirpstack_tenant_id: String,

    /// Device profile assigned to relay-provisioned devices
    #[serde(default = "default_chirpstack_device_profile_id")]
    pub chirpstack_device_profile_id: String,

    // Cloud MQTT (primary outbound)
    /// Primary cloud broker host
    #[serde(default = "default_cloud_mqtt_host")]
    pub cloud_mqtt_host: String,

    /// Primary cloud broker port
    #[serde(default = "default_cloud_mqtt_port")]
    pub cloud_mqtt_port: u16,

    /// Cloud broker username (empty for anonymous)
    #[serde(default = "default_empty")]
    pub cloud_mqtt_username: String,

    /// Cloud broker password
    #[serde(default = "default_empty")]
    pub cloud_mqtt_password: String,

    // Backup MQTT (secondary outbound)
    /// Backup broker host
    #[serde(default = "default_backup_mqtt_host")]
    pub backup_mqtt_host: String,

    /// Backup broker port
    #[serde(default = "default_backup_mqtt_port")]
    pub backup_mqtt_port: u16,

    /// Backup broker username (empty for anonymous)
    #[serde(default = "default_empty")]
    pub backup_mqtt_username: String,

    /// Backup broker password
    #[serde(default = "default_empty")]
    pub backup_mqtt_password: String,

    /// Topic the backup broker receives uplink envelopes on
    #[serde(default = "default_backup_devices_topic")]
    pub backup_devices_topic: String,

    // Topic layout
    /// Namespace prefix on the cloud broker
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Client id, also the second topic segment on the cloud broker
    #[serde(default = "default_client_id")]
    pub client_id: String,

    // Outbox
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// How often the pending sweep retries undelivered records, seconds
    #[serde(default = "default_pending_sweep_secs")]
    pub pending_sweep_secs: u64,

    /// How often aged records are pruned, seconds
    #[serde(default = "default_retention_sweep_secs")]
    pub retention_sweep_secs: u64,

    /// Age past which records are pruned, days
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// Source tag stamped into cloud envelopes
    #[serde(default = "default_ns_product")]
    pub ns_product: String,

    // Connection resilience
    /// MQTT keep-alive, seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// First reconnect delay, seconds
    #[serde(default = "default_reconnect_base_secs")]
    pub reconnect_base_secs: u64,

    /// Multiplier applied to the delay after each failure
    #[serde(default = "default_reconnect_rate")]
    pub reconnect_rate: u32,

    /// Reconnect delay ceiling, seconds
    #[serde(default = "default_reconnect_cap_secs")]
    pub reconnect_cap_secs: u64,

    /// Failures tolerated per outage before the relay shuts down
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_empty() -> String {
    String::new()
}

// ChirpStack defaults
fn default_chirpstack_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_chirpstack_mqtt_port() -> u16 {
    1883
}

fn default_chirpstack_application_id() -> String {
    "".to_string()
}

fn default_chirpstack_api_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_chirpstack_api_key() -> String {
    "".to_string()
}

fn default_chirpstack_tenant_id() -> String {
    "".to_string()
}

fn default_chirpstack_device_profile_id() -> String {
    "".to_string()
}

// Cloud defaults
fn default_cloud_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_cloud_mqtt_port() -> u16 {
    1883
}

// Backup defaults
fn default_backup_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_backup_mqtt_port() -> u16 {
    1883
}

fn default_backup_devices_topic() -> String {
    "backup/topic".to_string()
}

// Topic defaults
fn default_topic_prefix() -> String {
    "homebrella".to_string()
}

fn default_client_id() -> String {
    "lorabridge".to_string()
}

// Outbox defaults
fn default_db_path() -> String {
    "lorabridge.db".to_string()
}

fn default_pending_sweep_secs() -> u64 {
    24 * 60 * 60
}

fn default_retention_sweep_secs() -> u64 {
    24 * 60 * 60
}

fn default_retention_days() -> u64 {
    30
}

fn default_ns_product() -> String {
    "CHIRPSTACK".to_string()
}

// Resilience defaults
fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reconnect_base_secs() -> u64 {
    1
}

fn default_reconnect_rate() -> u32 {
    2
}

fn default_reconnect_cap_secs() -> u64 {
    60
}

fn default_reconnect_max_attempts() -> u32 {
    12
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("LORABRIDGE"))
            .build()?
            .try_deserialize()
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}
