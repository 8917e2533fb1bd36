pub mod milesight;
mod registry;

pub use registry::{DecodeFailure, DecoderRegistry};

/// Trait for decoding a device's raw binary payload to JSON readings.
///
/// Decoders are best-effort: truncated input or an unrecognized field
/// tag stops parsing, and whatever was decoded up to that point is
/// returned. A decoder never fails outright.
pub trait PayloadDecoder: Send + Sync {
    /// Decode raw payload bytes to a JSON object of readings.
    fn decode(&self, raw: &[u8]) -> serde_json::Value;
}
