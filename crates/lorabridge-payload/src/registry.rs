use crate::milesight::{Am103lDecoder, Ws301Decoder};
use crate::PayloadDecoder;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Decoding was not possible for the given device type.
///
/// This is a value, not a fault: the relay keeps forwarding the raw
/// payload when no structured reading can be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode failure: {reason}")]
pub struct DecodeFailure {
    pub reason: String,
}

impl DecodeFailure {
    pub fn no_decoder() -> Self {
        Self {
            reason: "no decoder".to_string(),
        }
    }
}

/// Registry mapping a device-type tag (model name) to its decoder.
pub struct DecoderRegistry {
    decoders: HashMap<String, Box<dyn PayloadDecoder>>,
}

impl DecoderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Create a registry with the built-in Milesight decoders.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("AM103L", Box::new(Am103lDecoder));
        registry.register("WS301", Box::new(Ws301Decoder));
        registry
    }

    /// Register a decoder for a device-type tag, replacing any
    /// previous registration for the same tag.
    pub fn register(&mut self, device_type: impl Into<String>, decoder: Box<dyn PayloadDecoder>) {
        self.decoders.insert(device_type.into(), decoder);
    }

    /// Decode raw bytes for the given device type.
    ///
    /// Unknown device types yield `DecodeFailure` rather than an
    /// error the caller has to catch; known decoders always produce a
    /// (possibly partial, possibly empty) JSON object.
    pub fn decode(&self, device_type: &str, raw: &[u8]) -> Result<Value, DecodeFailure> {
        match self.decoders.get(device_type) {
            Some(decoder) => Ok(decoder.decode(raw)),
            None => Err(DecodeFailure::no_decoder()),
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
