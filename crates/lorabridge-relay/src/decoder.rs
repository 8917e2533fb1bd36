use lorabridge_domain::decoder::UplinkDecoder;
use lorabridge_payload::DecoderRegistry;
use serde_json::Value;
use tracing::debug;

/// Bridges the decoder registry into the relay engine.
///
/// Device names in the field usually carry the model plus a location
/// suffix ("AM103L-office"), so a miss on the full name retries with
/// the leading model token.
pub struct RegistryDecoder {
    registry: DecoderRegistry,
}

impl RegistryDecoder {
    pub fn new(registry: DecoderRegistry) -> Self {
        Self { registry }
    }
}

impl Default for RegistryDecoder {
    fn default() -> Self {
        Self::new(DecoderRegistry::with_defaults())
    }
}

impl UplinkDecoder for RegistryDecoder {
    fn decode(&self, device_name: &str, raw: &[u8]) -> Option<Value> {
        if let Ok(decoded) = self.registry.decode(device_name, raw) {
            return Some(decoded);
        }

        let model = device_name.split(['-', '_', ' ']).next().unwrap_or("");
        if !model.is_empty() && model != device_name {
            if let Ok(decoded) = self.registry.decode(model, raw) {
                return Some(decoded);
            }
        }

        debug!(device_name = %device_name, "no decoder for device, forwarding raw payload only");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_by_exact_name() {
        let decoder = RegistryDecoder::default();
        let decoded = decoder.decode("AM103L", &[0x01, 0x75, 0x64]).unwrap();
        assert_eq!(decoded["battery"], 100);
    }

    #[test]
    fn test_decode_by_model_token() {
        let decoder = RegistryDecoder::default();
        let decoded = decoder
            .decode("WS301-front-door", &[0x03, 0x00, 0x01])
            .unwrap();
        assert_eq!(decoded["magnet_status"], "open");
    }

    #[test]
    fn test_unknown_device_yields_none() {
        let decoder = RegistryDecoder::default();
        assert!(decoder.decode("EM300-TH", &[0x01, 0x75, 0x64]).is_none());
    }
}
