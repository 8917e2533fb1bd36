use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use lorabridge_domain::error::{DomainError, DomainResult};
use lorabridge_domain::repository::NetworkServerApi;
use lorabridge_domain::types::{
    CreateApplicationInput, CreateDeviceInput, EnqueueDownlinkInput, GatewayInput, GatewayRecord,
    DEFAULT_STATS_INTERVAL_SECS,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ChirpstackConfig {
    /// Base URL of the REST gateway, e.g. `http://localhost:8090`.
    pub base_url: String,
    pub api_key: String,
    pub tenant_id: String,
    pub application_id: String,
    /// Profile assigned to every device the relay provisions. Profile
    /// management itself stays in ChirpStack.
    pub device_profile_id: String,
}

pub struct ChirpstackClient {
    http: reqwest::Client,
    config: ChirpstackConfig,
}

impl ChirpstackClient {
    pub fn new(config: ChirpstackConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        // The REST gateway forwards this header as gRPC metadata.
        builder.header(
            "Grpc-Metadata-Authorization",
            format!("Bearer {}", self.config.api_key),
        )
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> DomainResult<reqwest::Response> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| DomainError::NetworkServerFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DomainError::NetworkServerFailed(format!(
            "{status}: {body}"
        )))
    }
}

#[derive(Debug, Deserialize)]
struct GetGatewayResponse {
    gateway: GatewayBody,
    #[serde(rename = "lastSeenAt", default)]
    last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GatewayBody {
    #[serde(rename = "gatewayId")]
    gateway_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "statsInterval", default)]
    stats_interval: Option<u32>,
}

#[async_trait]
impl NetworkServerApi for ChirpstackClient {
    async fn create_device(&self, input: CreateDeviceInput) -> DomainResult<()> {
        let body = json!({
            "device": {
                "devEui": input.dev_eui,
                "name": input.name,
                "description": input.description,
                "applicationId": self.config.application_id,
                "deviceProfileId": self.config.device_profile_id,
                "joinEui": input.join_eui,
            }
        });
        self.send(self.http.post(self.url("/api/devices")).json(&body))
            .await?;

        // OTAA root key; ChirpStack v4 stores it as nwkKey.
        let keys = json!({
            "deviceKeys": {
                "devEui": input.dev_eui,
                "nwkKey": input.app_key,
            }
        });
        self.send(
            self.http
                .post(self.url(&format!("/api/devices/{}/keys", input.dev_eui)))
                .json(&keys),
        )
        .await?;

        info!(dev_eui = %input.dev_eui, class = %input.device_class, "device provisioned");
        Ok(())
    }

    async fn delete_device(&self, dev_eui: &str) -> DomainResult<()> {
        self.send(self.http.delete(self.url(&format!("/api/devices/{dev_eui}"))))
            .await?;
        info!(dev_eui = %dev_eui, "device deleted");
        Ok(())
    }

    async fn enqueue_downlink(&self, input: EnqueueDownlinkInput) -> DomainResult<()> {
        let data = decode_hex(&input.payload_hex).map_err(DomainError::NetworkServerFailed)?;
        let body = json!({
            "queueItem": {
                "confirmed": input.confirmed,
                "data": BASE64.encode(data),
                "fPort": input.port,
            }
        });
        self.send(
            self.http
                .post(self.url(&format!("/api/devices/{}/queue", input.dev_eui)))
                .json(&body),
        )
        .await?;
        debug!(dev_eui = %input.dev_eui, port = input.port, "downlink enqueued");
        Ok(())
    }

    async fn create_gateway(&self, input: GatewayInput) -> DomainResult<()> {
        let body = json!({
            "gateway": {
                "gatewayId": input.gateway_id,
                "name": input.name,
                "description": input.description,
                "tenantId": self.config.tenant_id,
                "statsInterval": DEFAULT_STATS_INTERVAL_SECS,
            }
        });
        self.send(self.http.post(self.url("/api/gateways")).json(&body))
            .await?;
        info!(gateway_id = %input.gateway_id, "gateway created");
        Ok(())
    }

    async fn update_gateway(&self, input: GatewayInput) -> DomainResult<()> {
        let body = json!({
            "gateway": {
                "gatewayId": input.gateway_id,
                "name": input.name,
                "description": input.description,
                "tenantId": self.config.tenant_id,
                "statsInterval": DEFAULT_STATS_INTERVAL_SECS,
            }
        });
        self.send(
            self.http
                .put(self.url(&format!("/api/gateways/{}", input.gateway_id)))
                .json(&body),
        )
        .await?;
        info!(gateway_id = %input.gateway_id, "gateway updated");
        Ok(())
    }

    async fn delete_gateway(&self, gateway_id: &str) -> DomainResult<()> {
        self.send(
            self.http
                .delete(self.url(&format!("/api/gateways/{gateway_id}"))),
        )
        .await?;
        info!(gateway_id = %gateway_id, "gateway deleted");
        Ok(())
    }

    async fn create_application(&self, input: CreateApplicationInput) -> DomainResult<()> {
        let tenant_id = if input.tenant_id.is_empty() {
            self.config.tenant_id.clone()
        } else {
            input.tenant_id
        };
        let body = json!({
            "application": {
                "name": input.name,
                "description": input.description,
                "tenantId": tenant_id,
            }
        });
        self.send(self.http.post(self.url("/api/applications")).json(&body))
            .await?;
        info!(name = %input.name, "application created");
        Ok(())
    }

    async fn delete_application(&self, application_id: &str) -> DomainResult<()> {
        self.send(
            self.http
                .delete(self.url(&format!("/api/applications/{application_id}"))),
        )
        .await?;
        info!(application_id = %application_id, "application deleted");
        Ok(())
    }

    async fn get_gateway(&self, gateway_id: &str) -> DomainResult<Option<GatewayRecord>> {
        let response = self
            .authorized(
                self.http
                    .get(self.url(&format!("/api/gateways/{gateway_id}"))),
            )
            .send()
            .await
            .map_err(|e| DomainError::NetworkServerFailed(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::NetworkServerFailed(format!(
                "{status}: {body}"
            )));
        }

        let parsed: GetGatewayResponse = response
            .json()
            .await
            .map_err(|e| DomainError::NetworkServerFailed(e.to_string()))?;
        Ok(Some(GatewayRecord {
            gateway_id: parsed.gateway.gateway_id,
            name: parsed.gateway.name,
            description: parsed.gateway.description,
            stats_interval_secs: parsed
                .gateway
                .stats_interval
                .unwrap_or(DEFAULT_STATS_INTERVAL_SECS),
            last_seen_at: parsed.last_seen_at,
        }))
    }
}

fn decode_hex(input: &str) -> Result<Vec<u8>, String> {
    let input = input.trim();
    if input.len() % 2 != 0 {
        return Err(format!("odd-length hex payload: {input}"));
    }
    if !input.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("invalid hex payload: {input}"));
    }
    Ok(input
        .as_bytes()
        .chunks(2)
        .map(|pair| (hex_nibble(pair[0]) << 4) | hex_nibble(pair[1]))
        .collect())
}

// Callers validate the byte is an ASCII hex digit.
fn hex_nibble(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("0011FF").unwrap(), vec![0x00, 0x11, 0xFF]);
        assert_eq!(decode_hex("  08ff  ").unwrap(), vec![0x08, 0xFF]);
        assert!(decode_hex("ABC").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_decode_hex_rejects_multibyte_utf8() {
        // Even byte length but not ASCII hex; must error, never slice
        // inside a character.
        assert!(decode_hex("aéb").is_err());
        assert!(decode_hex("００").is_err());
    }

    #[test]
    fn test_parse_gateway_response() {
        let raw = r#"{
            "gateway": {
                "gatewayId": "24e124fffef24b07",
                "name": "UG67",
                "description": "rooftop",
                "statsInterval": 300,
                "tenantId": "t-1"
            },
            "createdAt": "2026-01-01T00:00:00Z",
            "lastSeenAt": "2026-08-01T10:00:00Z"
        }"#;
        let parsed: GetGatewayResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.gateway.gateway_id, "24e124fffef24b07");
        assert_eq!(parsed.gateway.stats_interval, Some(300));
        assert!(parsed.last_seen_at.is_some());
    }

    #[test]
    fn test_parse_gateway_response_without_last_seen() {
        let raw = r#"{"gateway": {"gatewayId": "24e124fffef24b07"}}"#;
        let parsed: GetGatewayResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.gateway.stats_interval, None);
        assert!(parsed.last_seen_at.is_none());
    }
}
