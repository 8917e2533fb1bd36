mod config;
mod decoder;
mod tasks;

use config::ServiceConfig;
use decoder::RegistryDecoder;
use lorabridge_chirpstack::{ChirpstackClient, ChirpstackConfig};
use lorabridge_domain::command::CommandDispatcher;
use lorabridge_domain::error::DomainResult;
use lorabridge_domain::repository::{EventPublisher, OutboxRepository};
use lorabridge_domain::{RelayConfig, RelayService};
use lorabridge_mqtt::{
    uplink_topic, BrokerConfig, CloudTopics, ConnectionSupervisor, MqttEventPublisher,
    ReconnectPolicy,
};
use lorabridge_outbox::SqliteOutbox;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        client_id = %config.client_id,
        application_id = %config.chirpstack_application_id,
        "Starting lorabridge relay"
    );

    let outbox: Arc<dyn OutboxRepository> = match SqliteOutbox::new(&config.db_path) {
        Ok(outbox) => Arc::new(outbox),
        Err(e) => {
            error!(error = %e, path = %config.db_path, "Failed to open outbox database");
            std::process::exit(1);
        }
    };

    let topics = CloudTopics::new(&config.topic_prefix, &config.client_id);
    let policy = ReconnectPolicy::new(
        Duration::from_secs(config.reconnect_base_secs),
        config.reconnect_rate,
        Duration::from_secs(config.reconnect_cap_secs),
        config.reconnect_max_attempts,
    );

    // Inbound session: subscribes to the application's uplink stream.
    let (mut ns_supervisor, _ns_handle) = ConnectionSupervisor::new(
        "chirpstack",
        &BrokerConfig {
            host: config.chirpstack_mqtt_host.clone(),
            port: config.chirpstack_mqtt_port,
            client_id: format!("{}-ns", config.client_id),
            username: None,
            password: None,
            keep_alive: config.keep_alive(),
        },
        policy.clone(),
        vec![uplink_topic(&config.chirpstack_application_id)],
    );
    let uplink_rx = ns_supervisor.take_incoming(100);

    // Primary cloud session: publishes envelopes, receives commands.
    let (mut cloud_supervisor, cloud_handle) = ConnectionSupervisor::new(
        "cloud",
        &BrokerConfig {
            host: config.cloud_mqtt_host.clone(),
            port: config.cloud_mqtt_port,
            client_id: config.client_id.clone(),
            username: credential(&config.cloud_mqtt_username),
            password: credential(&config.cloud_mqtt_password),
            keep_alive: config.keep_alive(),
        },
        policy.clone(),
        vec![topics.api.clone()],
    );
    let command_rx = cloud_supervisor.take_incoming(100);

    // Backup session: publish-only fallback.
    let (backup_supervisor, backup_handle) = ConnectionSupervisor::new(
        "backup",
        &BrokerConfig {
            host: config.backup_mqtt_host.clone(),
            port: config.backup_mqtt_port,
            client_id: format!("{}-backup", config.client_id),
            username: credential(&config.backup_mqtt_username),
            password: credential(&config.backup_mqtt_password),
            keep_alive: config.keep_alive(),
        },
        policy,
        Vec::new(),
    );

    let primary: Arc<dyn EventPublisher> = Arc::new(MqttEventPublisher::new(
        cloud_handle.clone(),
        topics.devices.clone(),
    ));
    let secondary: Arc<dyn EventPublisher> = Arc::new(MqttEventPublisher::new(
        backup_handle,
        config.backup_devices_topic.clone(),
    ));
    let responses: Arc<dyn EventPublisher> = Arc::new(MqttEventPublisher::new(
        cloud_handle.clone(),
        topics.api.clone(),
    ));
    let events: Arc<dyn EventPublisher> = Arc::new(MqttEventPublisher::new(
        cloud_handle.clone(),
        topics.events.clone(),
    ));

    let relay = Arc::new(RelayService::new(
        Arc::new(RegistryDecoder::default()),
        outbox,
        primary,
        secondary,
        RelayConfig {
            ns_product: config.ns_product.clone(),
            retention: config.retention(),
        },
    ));

    let chirpstack = Arc::new(ChirpstackClient::new(ChirpstackConfig {
        base_url: config.chirpstack_api_url.clone(),
        api_key: config.chirpstack_api_key.clone(),
        tenant_id: config.chirpstack_tenant_id.clone(),
        application_id: config.chirpstack_application_id.clone(),
        device_profile_id: config.chirpstack_device_profile_id.clone(),
    }));
    let dispatcher = Arc::new(CommandDispatcher::new(chirpstack));

    let token = CancellationToken::new();
    let mut workers: JoinSet<(&'static str, DomainResult<()>)> = JoinSet::new();

    workers.spawn({
        let t = token.clone();
        async move { ("chirpstack_session", ns_supervisor.run(t).await) }
    });
    workers.spawn({
        let t = token.clone();
        async move { ("cloud_session", cloud_supervisor.run(t).await) }
    });
    workers.spawn({
        let t = token.clone();
        async move { ("backup_session", backup_supervisor.run(t).await) }
    });
    workers.spawn({
        let t = token.clone();
        let relay = Arc::clone(&relay);
        async move {
            (
                "uplink_consumer",
                tasks::run_uplink_consumer(uplink_rx, relay, t).await,
            )
        }
    });
    workers.spawn({
        let t = token.clone();
        async move {
            (
                "command_responder",
                tasks::run_command_responder(command_rx, dispatcher, responses, t).await,
            )
        }
    });
    workers.spawn({
        let t = token.clone();
        let relay = Arc::clone(&relay);
        let state = cloud_handle.state.clone();
        async move {
            (
                "connected_flush",
                tasks::run_connected_flush(state, relay, events, t).await,
            )
        }
    });
    workers.spawn({
        let t = token.clone();
        let relay = Arc::clone(&relay);
        let period = Duration::from_secs(config.pending_sweep_secs);
        async move {
            (
                "pending_sweep",
                tasks::run_pending_sweep(relay, period, t).await,
            )
        }
    });
    workers.spawn({
        let t = token.clone();
        let relay = Arc::clone(&relay);
        let period = Duration::from_secs(config.retention_sweep_secs);
        async move {
            (
                "retention_sweep",
                tasks::run_retention_sweep(relay, period, t).await,
            )
        }
    });

    // Any task ending on its own means the relay can no longer do its
    // job (e.g. a session exhausted its reconnect allowance), so take
    // the whole process group down.
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        Some(finished) = workers.join_next() => {
            report(finished);
        }
    }

    token.cancel();
    while let Some(finished) = workers.join_next().await {
        report(finished);
    }

    info!("Relay stopped");
}

fn report(finished: Result<(&'static str, DomainResult<()>), tokio::task::JoinError>) {
    match finished {
        Ok((name, Ok(()))) => info!(task = name, "task stopped"),
        Ok((name, Err(e))) => error!(task = name, error = %e, "task failed"),
        Err(e) => error!(error = %e, "task panicked"),
    }
}

fn credential(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
