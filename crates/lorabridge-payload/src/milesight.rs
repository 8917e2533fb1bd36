//! Decoders for Milesight sensors using the proprietary
//! `(channel_id, channel_type)` tagged field format.
//!
//! All multi-byte values are little-endian. Parsing stops at the
//! first unrecognized tag pair or when fewer bytes remain than the
//! field requires; fields decoded before the cut are kept.

use crate::PayloadDecoder;
use serde_json::{json, Map, Value};

// AM103L channel tags
const AM103L_BATTERY: (u8, u8) = (0x01, 0x75);
const AM103L_TEMPERATURE: (u8, u8) = (0x03, 0x67);
const AM103L_HUMIDITY: (u8, u8) = (0x04, 0x68);
const AM103L_CO2: (u8, u8) = (0x07, 0x7D);
const AM103L_HISTORY: (u8, u8) = (0x20, 0xCE);

// WS301 channel tags
const WS301_BATTERY: (u8, u8) = (0x01, 0x75);
const WS301_MAGNET: (u8, u8) = (0x03, 0x00);
const WS301_TAMPER: (u8, u8) = (0x04, 0x00);

// History block layout: u32 timestamp, i16 temperature, u8 humidity, u16 co2
const HISTORY_BLOCK_LEN: usize = 9;

fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn read_i16_le(bytes: &[u8]) -> i16 {
    i16::from_le_bytes([bytes[0], bytes[1]])
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Milesight AM103L indoor air quality sensor.
///
/// Scaling: temperature is signed tenths of a degree Celsius,
/// humidity is half-percent units, co2 is unscaled ppm.
pub struct Am103lDecoder;

impl PayloadDecoder for Am103lDecoder {
    fn decode(&self, raw: &[u8]) -> Value {
        let mut decoded = Map::new();
        let mut history: Vec<Value> = Vec::new();
        let mut i = 0;

        while i + 2 <= raw.len() {
            let tag = (raw[i], raw[i + 1]);
            i += 2;
            let remaining = raw.len() - i;

            match tag {
                AM103L_BATTERY if remaining >= 1 => {
                    decoded.insert("battery".to_string(), json!(raw[i]));
                    i += 1;
                }
                AM103L_TEMPERATURE if remaining >= 2 => {
                    let raw_temp = read_i16_le(&raw[i..i + 2]);
                    decoded.insert("temperature".to_string(), json!(raw_temp as f64 / 10.0));
                    i += 2;
                }
                AM103L_HUMIDITY if remaining >= 1 => {
                    decoded.insert("humidity".to_string(), json!(raw[i] as f64 / 2.0));
                    i += 1;
                }
                AM103L_CO2 if remaining >= 2 => {
                    decoded.insert("co2".to_string(), json!(read_u16_le(&raw[i..i + 2])));
                    i += 2;
                }
                AM103L_HISTORY if remaining >= HISTORY_BLOCK_LEN => {
                    let block = &raw[i..i + HISTORY_BLOCK_LEN];
                    history.push(json!({
                        "timestamp": read_u32_le(&block[0..4]),
                        "temperature": read_i16_le(&block[4..6]) as f64 / 10.0,
                        "humidity": block[6] as f64 / 2.0,
                        "co2": read_u16_le(&block[7..9]),
                    }));
                    i += HISTORY_BLOCK_LEN;
                }
                // Unknown tag or truncated value: keep what we have
                _ => break,
            }
        }

        if !history.is_empty() {
            decoded.insert("history".to_string(), Value::Array(history));
        }
        Value::Object(decoded)
    }
}

/// Milesight WS301 magnetic door/window contact.
pub struct Ws301Decoder;

impl PayloadDecoder for Ws301Decoder {
    fn decode(&self, raw: &[u8]) -> Value {
        let mut decoded = Map::new();
        let mut i = 0;

        while i + 2 <= raw.len() {
            let tag = (raw[i], raw[i + 1]);
            i += 2;
            let remaining = raw.len() - i;

            match tag {
                WS301_BATTERY if remaining >= 1 => {
                    decoded.insert("battery".to_string(), json!(raw[i]));
                    i += 1;
                }
                WS301_MAGNET if remaining >= 1 => {
                    let status = if raw[i] == 0 { "close" } else { "open" };
                    decoded.insert("magnet_status".to_string(), json!(status));
                    i += 1;
                }
                WS301_TAMPER if remaining >= 1 => {
                    let status = if raw[i] == 0 { "installed" } else { "uninstalled" };
                    decoded.insert("tamper_status".to_string(), json!(status));
                    i += 1;
                }
                _ => break,
            }
        }

        Value::Object(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_am103l_empty_payload() {
        let result = Am103lDecoder.decode(&[]);
        assert_eq!(result, json!({}));
    }

    #[test]
    fn test_am103l_battery() {
        // Channel 0x01, type 0x75, value 100
        let result = Am103lDecoder.decode(&[0x01, 0x75, 0x64]);
        assert_eq!(result, json!({"battery": 100}));
    }

    #[test]
    fn test_am103l_temperature_negative() {
        // 0xFFF6 little-endian = -10 raw = -1.0 degrees
        let result = Am103lDecoder.decode(&[0x03, 0x67, 0xF6, 0xFF]);
        assert_eq!(result, json!({"temperature": -1.0}));
    }

    #[test]
    fn test_am103l_humidity_half_percent() {
        // raw 0xB4 = 180 -> 90%
        let result = Am103lDecoder.decode(&[0x04, 0x68, 0xB4]);
        assert_eq!(result, json!({"humidity": 90.0}));
    }

    #[test]
    fn test_am103l_co2_unscaled() {
        // 0x0320 little-endian = 800 ppm
        let result = Am103lDecoder.decode(&[0x07, 0x7D, 0x20, 0x03]);
        assert_eq!(result, json!({"co2": 800}));
    }

    #[test]
    fn test_am103l_full_report() {
        // battery 90, temperature 21.3, humidity 50.0, co2 800
        let payload = [
            0x01, 0x75, 0x5A, // battery
            0x03, 0x67, 0xD5, 0x00, // temperature 213 -> 21.3
            0x04, 0x68, 0x64, // humidity 100 -> 50.0
            0x07, 0x7D, 0x20, 0x03, // co2 800
        ];
        let result = Am103lDecoder.decode(&payload);
        assert_eq!(
            result,
            json!({
                "battery": 90,
                "temperature": 21.3,
                "humidity": 50.0,
                "co2": 800
            })
        );
    }

    #[test]
    fn test_am103l_history_blocks_accumulate_in_order() {
        let payload = [
            0x20, 0xCE, // history tag
            0x10, 0x27, 0x00, 0x00, // timestamp 10000
            0xD5, 0x00, // temperature 21.3
            0x64, // humidity 50.0
            0x20, 0x03, // co2 800
            0x20, 0xCE, // second block
            0x11, 0x27, 0x00, 0x00, // timestamp 10001
            0xF6, 0xFF, // temperature -1.0
            0xC8, // humidity 100.0
            0xE8, 0x03, // co2 1000
        ];
        let result = Am103lDecoder.decode(&payload);
        assert_eq!(
            result,
            json!({
                "history": [
                    {"timestamp": 10000, "temperature": 21.3, "humidity": 50.0, "co2": 800},
                    {"timestamp": 10001, "temperature": -1.0, "humidity": 100.0, "co2": 1000}
                ]
            })
        );
    }

    #[test]
    fn test_am103l_stops_at_unknown_tag_keeping_prefix() {
        // battery, then a tag the decoder does not know
        let payload = [0x01, 0x75, 0x64, 0x09, 0x73, 0x01, 0x02];
        let result = Am103lDecoder.decode(&payload);
        assert_eq!(result, json!({"battery": 100}));
    }

    #[test]
    fn test_am103l_truncated_mid_field_returns_partial() {
        // battery complete, temperature tag present but only one
        // value byte remains
        let payload = [0x01, 0x75, 0x64, 0x03, 0x67, 0xD5];
        let result = Am103lDecoder.decode(&payload);
        assert_eq!(result, json!({"battery": 100}));
    }

    #[test]
    fn test_am103l_truncated_mid_header_returns_partial() {
        // lone channel byte after a complete battery field
        let payload = [0x01, 0x75, 0x64, 0x03];
        let result = Am103lDecoder.decode(&payload);
        assert_eq!(result, json!({"battery": 100}));
    }

    #[test]
    fn test_am103l_truncated_history_block_dropped() {
        let payload = [0x20, 0xCE, 0x10, 0x27, 0x00];
        let result = Am103lDecoder.decode(&payload);
        assert_eq!(result, json!({}));
    }

    #[test]
    fn test_ws301_door_closed_installed() {
        let payload = [0x01, 0x75, 0x64, 0x03, 0x00, 0x00, 0x04, 0x00, 0x00];
        let result = Ws301Decoder.decode(&payload);
        assert_eq!(
            result,
            json!({
                "battery": 100,
                "magnet_status": "close",
                "tamper_status": "installed"
            })
        );
    }

    #[test]
    fn test_ws301_door_open_uninstalled() {
        let payload = [0x03, 0x00, 0x01, 0x04, 0x00, 0x01];
        let result = Ws301Decoder.decode(&payload);
        assert_eq!(
            result,
            json!({
                "magnet_status": "open",
                "tamper_status": "uninstalled"
            })
        );
    }

    #[test]
    fn test_ws301_truncated_never_panics() {
        let result = Ws301Decoder.decode(&[0x03]);
        assert_eq!(result, json!({}));
    }
}
