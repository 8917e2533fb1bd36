/// Topic layout of the cloud broker. Everything hangs off a
/// `{prefix}/{client_id}/` namespace so multiple relays can share one
/// broker without crosstalk.
#[derive(Debug, Clone)]
pub struct CloudTopics {
    /// Inbound commands; responses are published back here too.
    pub api: String,
    /// Relay lifecycle notifications ("LNS Connected!").
    pub events: String,
    /// Uplink envelope stream.
    pub devices: String,
}

impl CloudTopics {
    pub fn new(prefix: &str, client_id: &str) -> Self {
        Self {
            api: format!("{prefix}/{client_id}/api"),
            events: format!("{prefix}/{client_id}/events"),
            devices: format!("{prefix}/{client_id}/devices"),
        }
    }
}

/// Subscription filter for uplink events of one network-server
/// application, single-level wildcard on the device EUI.
pub fn uplink_topic(application_id: &str) -> String {
    format!("application/{application_id}/device/+/event/up")
}
