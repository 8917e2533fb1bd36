use crate::liveness::derive_gateway_state;
use crate::repository::NetworkServerApi;
use crate::types::{
    CreateApplicationInput, CreateDeviceInput, EnqueueDownlinkInput, GatewayInput, GatewayState,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Tri-state result of a command dispatch, published back on the
/// commands-response topic. Codes match the wire contract:
/// 1 completed, 0 failed, 2 unrecognized command or malformed JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed,
    Failed,
    Unrecognized,
}

impl CommandOutcome {
    pub fn code(self) -> u8 {
        match self {
            CommandOutcome::Completed => 1,
            CommandOutcome::Failed => 0,
            CommandOutcome::Unrecognized => 2,
        }
    }

    /// Response text published to the cloud broker.
    pub fn response_text(self) -> &'static str {
        match self {
            CommandOutcome::Completed => "OK",
            _ => "ERROR",
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommandMessage {
    command: String,
    #[serde(default)]
    data: Value,
}

/// Device commands nest everything under `lorawan_metadata`, including
/// the human-facing name and description.
#[derive(Debug, Deserialize)]
struct LorawanMetadata {
    #[serde(rename = "DevEui")]
    dev_eui: String,
    #[serde(default)]
    device_name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "DevClass", default)]
    dev_class: String,
    #[serde(rename = "JoinEui", default)]
    join_eui: String,
    #[serde(rename = "AppKey", default)]
    app_key: String,
    #[serde(default)]
    port: Option<u32>,
    #[serde(default)]
    confirmed: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct DeviceCommandData {
    lorawan_metadata: LorawanMetadata,
    #[serde(default)]
    payload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayCommandData {
    gateway_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct CreateApplicationData {
    #[serde(rename = "tenantId", default)]
    tenant_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct DeleteApplicationData {
    #[serde(rename = "applicationId")]
    application_id: String,
}

/// Maps inbound `{command, data}` JSON to network-server CRUD calls.
///
/// Dispatch never propagates an error: CRUD failures become
/// `Failed`, everything unparseable becomes `Unrecognized`.
pub struct CommandDispatcher {
    api: Arc<dyn NetworkServerApi>,
}

impl CommandDispatcher {
    pub fn new(api: Arc<dyn NetworkServerApi>) -> Self {
        Self { api }
    }

    pub async fn dispatch(&self, raw: &[u8]) -> CommandOutcome {
        let msg: CommandMessage = match serde_json::from_slice(raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Malformed command JSON");
                return CommandOutcome::Unrecognized;
            }
        };

        info!(command = %msg.command, "Command received");

        let result = match msg.command.as_str() {
            "create_device" => self.create_device(msg.data).await,
            "delete_device" => self.delete_device(msg.data).await,
            "enqueue_packet" => self.enqueue_packet(msg.data).await,
            "create_gateway" => self.create_gateway(msg.data).await,
            "update_gateway" => self.update_gateway(msg.data).await,
            "delete_gateway" => self.delete_gateway(msg.data).await,
            "gateway_status" => self.gateway_status(msg.data).await,
            "create_application" => self.create_application(msg.data).await,
            "delete_application" => self.delete_application(msg.data).await,
            other => {
                warn!(command = %other, "Unknown command");
                return CommandOutcome::Unrecognized;
            }
        };

        match result {
            Some(Ok(())) => CommandOutcome::Completed,
            Some(Err(e)) => {
                error!(command = %msg.command, error = %e, "Command failed");
                CommandOutcome::Failed
            }
            None => CommandOutcome::Unrecognized,
        }
    }

    async fn create_device(&self, data: Value) -> Option<crate::DomainResult<()>> {
        let data: DeviceCommandData = parse_data(data)?;
        Some(
            self.api
                .create_device(CreateDeviceInput {
                    dev_eui: data.lorawan_metadata.dev_eui,
                    name: data.lorawan_metadata.device_name,
                    description: data.lorawan_metadata.description,
                    device_class: data.lorawan_metadata.dev_class,
                    join_eui: data.lorawan_metadata.join_eui,
                    app_key: data.lorawan_metadata.app_key,
                })
                .await,
        )
    }

    async fn delete_device(&self, data: Value) -> Option<crate::DomainResult<()>> {
        let data: DeviceCommandData = parse_data(data)?;
        Some(self.api.delete_device(&data.lorawan_metadata.dev_eui).await)
    }

    async fn enqueue_packet(&self, data: Value) -> Option<crate::DomainResult<()>> {
        let data: DeviceCommandData = parse_data(data)?;
        let payload_hex = data.payload?;
        let port = data.lorawan_metadata.port?;
        let confirmed = is_truthy(data.lorawan_metadata.confirmed.as_ref());
        Some(
            self.api
                .enqueue_downlink(EnqueueDownlinkInput {
                    dev_eui: data.lorawan_metadata.dev_eui,
                    port,
                    confirmed,
                    payload_hex,
                })
                .await,
        )
    }

    async fn create_gateway(&self, data: Value) -> Option<crate::DomainResult<()>> {
        let data: GatewayCommandData = parse_data(data)?;
        Some(
            self.api
                .create_gateway(GatewayInput {
                    gateway_id: data.gateway_id,
                    name: data.name,
                    description: data.description,
                })
                .await,
        )
    }

    async fn update_gateway(&self, data: Value) -> Option<crate::DomainResult<()>> {
        let data: GatewayCommandData = parse_data(data)?;
        Some(
            self.api
                .update_gateway(GatewayInput {
                    gateway_id: data.gateway_id,
                    name: data.name,
                    description: data.description,
                })
                .await,
        )
    }

    async fn delete_gateway(&self, data: Value) -> Option<crate::DomainResult<()>> {
        let data: GatewayCommandData = parse_data(data)?;
        Some(self.api.delete_gateway(&data.gateway_id).await)
    }

    /// Query the gateway's liveness projection. A missing gateway is
    /// reported as never seen, same as one that never sent stats.
    async fn gateway_status(&self, data: Value) -> Option<crate::DomainResult<()>> {
        let data: GatewayCommandData = parse_data(data)?;
        Some(match self.api.get_gateway(&data.gateway_id).await {
            Ok(snapshot) => {
                let state = match snapshot {
                    Some(gateway) => derive_gateway_state(&gateway, chrono::Utc::now()),
                    None => GatewayState::NeverSeen,
                };
                info!(gateway_id = %data.gateway_id, state = ?state, "gateway status");
                Ok(())
            }
            Err(e) => Err(e),
        })
    }

    async fn create_application(&self, data: Value) -> Option<crate::DomainResult<()>> {
        let data: CreateApplicationData = parse_data(data)?;
        Some(
            self.api
                .create_application(CreateApplicationInput {
                    tenant_id: data.tenant_id,
                    name: data.name,
                    description: data.description,
                })
                .await,
        )
    }

    async fn delete_application(&self, data: Value) -> Option<crate::DomainResult<()>> {
        let data: DeleteApplicationData = parse_data(data)?;
        Some(self.api.delete_application(&data.application_id).await)
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(error = %e, "Command data does not match expected shape");
            None
        }
    }
}

/// The wire format sends `confirmed` as either a boolean or the
/// string "True"/"False".
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "True" || s == "true",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::repository::MockNetworkServerApi;

    const CREATE_DEVICE: &str = r#"{
        "command": "create_device",
        "data": {
            "lorawan_metadata": {
                "device_name": "AM103L",
                "description": "Temperature sensor",
                "DevEui": "24E124725E032608",
                "DevClass": "A",
                "JoinEui": "24E124C0002A0001",
                "AppKey": "5572404C696E6B4C6F52613230313823"
            }
        }
    }"#;

    #[tokio::test]
    async fn test_create_device_completed() {
        let mut api = MockNetworkServerApi::new();
        api.expect_create_device()
            .withf(|input: &CreateDeviceInput| {
                input.dev_eui == "24E124725E032608"
                    && input.name == "AM103L"
                    && input.device_class == "A"
            })
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = CommandDispatcher::new(Arc::new(api));
        let outcome = dispatcher.dispatch(CREATE_DEVICE.as_bytes()).await;
        assert_eq!(outcome, CommandOutcome::Completed);
        assert_eq!(outcome.code(), 1);
        assert_eq!(outcome.response_text(), "OK");
    }

    #[tokio::test]
    async fn test_crud_failure_is_reported_not_raised() {
        let mut api = MockNetworkServerApi::new();
        api.expect_create_device().times(1).returning(|_| {
            Err(DomainError::NetworkServerFailed("boom".to_string()))
        });

        let dispatcher = CommandDispatcher::new(Arc::new(api));
        let outcome = dispatcher.dispatch(CREATE_DEVICE.as_bytes()).await;
        assert_eq!(outcome, CommandOutcome::Failed);
        assert_eq!(outcome.code(), 0);
        assert_eq!(outcome.response_text(), "ERROR");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let api = MockNetworkServerApi::new();
        let dispatcher = CommandDispatcher::new(Arc::new(api));
        let outcome = dispatcher
            .dispatch(br#"{"command": "reboot_universe", "data": {}}"#)
            .await;
        assert_eq!(outcome, CommandOutcome::Unrecognized);
        assert_eq!(outcome.code(), 2);
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let api = MockNetworkServerApi::new();
        let dispatcher = CommandDispatcher::new(Arc::new(api));
        let outcome = dispatcher.dispatch(b"{command: nope").await;
        assert_eq!(outcome, CommandOutcome::Unrecognized);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_unrecognized() {
        let api = MockNetworkServerApi::new();
        let dispatcher = CommandDispatcher::new(Arc::new(api));
        let outcome = dispatcher
            .dispatch(br#"{"command": "delete_device", "data": {"device_name": "x"}}"#)
            .await;
        assert_eq!(outcome, CommandOutcome::Unrecognized);
    }

    #[tokio::test]
    async fn test_enqueue_packet_string_confirmed() {
        let raw = r#"{
            "command": "enqueue_packet",
            "data": {
                "payload": "0011223344556677",
                "lorawan_metadata": {
                    "DevEui": "24E124141E179436",
                    "port": 10,
                    "confirmed": "True"
                }
            }
        }"#;

        let mut api = MockNetworkServerApi::new();
        api.expect_enqueue_downlink()
            .withf(|input: &EnqueueDownlinkInput| {
                input.dev_eui == "24E124141E179436"
                    && input.port == 10
                    && input.confirmed
                    && input.payload_hex == "0011223344556677"
            })
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = CommandDispatcher::new(Arc::new(api));
        let outcome = dispatcher.dispatch(raw.as_bytes()).await;
        assert_eq!(outcome, CommandOutcome::Completed);
    }

    #[tokio::test]
    async fn test_gateway_status_known_gateway() {
        let mut api = MockNetworkServerApi::new();
        api.expect_get_gateway()
            .withf(|id: &str| id == "24e124fffef24b07")
            .times(1)
            .returning(|_| {
                Ok(Some(crate::types::GatewayRecord {
                    gateway_id: "24e124fffef24b07".to_string(),
                    name: "UG67".to_string(),
                    description: "Milesight UG67".to_string(),
                    stats_interval_secs: 30,
                    last_seen_at: Some(chrono::Utc::now()),
                }))
            });

        let dispatcher = CommandDispatcher::new(Arc::new(api));
        let outcome = dispatcher
            .dispatch(br#"{"command": "gateway_status", "data": {"gateway_id": "24e124fffef24b07"}}"#)
            .await;
        assert_eq!(outcome, CommandOutcome::Completed);
    }

    #[tokio::test]
    async fn test_gateway_status_missing_gateway_still_completes() {
        let mut api = MockNetworkServerApi::new();
        api.expect_get_gateway().times(1).returning(|_| Ok(None));

        let dispatcher = CommandDispatcher::new(Arc::new(api));
        let outcome = dispatcher
            .dispatch(br#"{"command": "gateway_status", "data": {"gateway_id": "unknown"}}"#)
            .await;
        assert_eq!(outcome, CommandOutcome::Completed);
    }

    #[tokio::test]
    async fn test_delete_gateway() {
        let mut api = MockNetworkServerApi::new();
        api.expect_delete_gateway()
            .withf(|id: &str| id == "24E124FFFEF24B07")
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = CommandDispatcher::new(Arc::new(api));
        let outcome = dispatcher
            .dispatch(br#"{"command": "delete_gateway", "data": {"gateway_id": "24E124FFFEF24B07"}}"#)
            .await;
        assert_eq!(outcome, CommandOutcome::Completed);
    }
}
