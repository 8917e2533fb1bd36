use serde::{Deserialize, Serialize};

/// Typed view of the fields the relay needs from a network-server
/// uplink event. The full JSON object is carried alongside so the
/// cloud envelope forwards everything the server sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkMessage {
    #[serde(rename = "deviceInfo")]
    pub device_info: UplinkDeviceInfo,

    /// Server-assigned event timestamp, RFC 3339. Absent when the
    /// source did not timestamp the event.
    #[serde(default)]
    pub time: Option<String>,

    /// Raw device payload, base64 encoded. Absent for payload-less
    /// events (e.g. join notifications).
    #[serde(default)]
    pub data: Option<String>,

    #[serde(rename = "rxInfo", default)]
    pub rx_info: Vec<UplinkRxInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkDeviceInfo {
    #[serde(rename = "devEui")]
    pub dev_eui: String,

    #[serde(rename = "deviceName", default)]
    pub device_name: String,
}

/// One reporting gateway's receive metadata. Only the gateway id is
/// relevant to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkRxInfo {
    #[serde(rename = "gatewayId", default)]
    pub gateway_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_uplink() {
        let raw = r#"{
            "deviceInfo": {"devEui": "24e124725e032608", "deviceName": "AM103L"},
            "time": "2026-08-01T10:00:00+00:00",
            "data": "AXVk",
            "rxInfo": [{"gatewayId": "24e124fffef24b07", "rssi": -70}],
            "fPort": 85
        }"#;
        let msg: UplinkMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.device_info.dev_eui, "24e124725e032608");
        assert_eq!(msg.device_info.device_name, "AM103L");
        assert_eq!(msg.time.as_deref(), Some("2026-08-01T10:00:00+00:00"));
        assert_eq!(msg.data.as_deref(), Some("AXVk"));
        assert_eq!(msg.rx_info[0].gateway_id, "24e124fffef24b07");
    }

    #[test]
    fn test_parse_minimal_uplink() {
        let raw = r#"{"deviceInfo": {"devEui": "24e124725e032608"}}"#;
        let msg: UplinkMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.device_info.device_name, "");
        assert!(msg.time.is_none());
        assert!(msg.data.is_none());
        assert!(msg.rx_info.is_empty());
    }

    #[test]
    fn test_missing_dev_eui_is_an_error() {
        let raw = r#"{"deviceInfo": {"deviceName": "AM103L"}}"#;
        assert!(serde_json::from_str::<UplinkMessage>(raw).is_err());
    }
}
