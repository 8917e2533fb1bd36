/// Best-effort structured decoding of a device's raw payload.
///
/// Returns `None` when no decoder matches the device name or decoding
/// produced nothing usable; the relay forwards the raw payload either
/// way. Implemented over the decoder registry in lorabridge-payload.
#[cfg_attr(test, mockall::automock)]
pub trait UplinkDecoder: Send + Sync {
    fn decode(&self, device_name: &str, raw: &[u8]) -> Option<serde_json::Value>;
}
