use lorabridge_domain::command::CommandDispatcher;
use lorabridge_domain::error::DomainResult;
use lorabridge_domain::repository::EventPublisher;
use lorabridge_domain::RelayService;
use lorabridge_mqtt::{ConnectionState, IncomingMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consume uplink events from the network server session and run each
/// through the relay engine.
pub async fn run_uplink_consumer(
    mut incoming: mpsc::Receiver<IncomingMessage>,
    relay: Arc<RelayService>,
    token: CancellationToken,
) -> DomainResult<()> {
    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            msg = incoming.recv() => {
                let Some(msg) = msg else {
                    debug!("uplink channel closed");
                    return Ok(());
                };
                if let Err(e) = relay.handle_uplink(&msg.payload).await {
                    error!(topic = %msg.topic, error = %e, "failed to relay uplink");
                }
            }
        }
    }
}

/// Dispatch commands arriving on the cloud api topic and publish the
/// outcome back on the same topic.
pub async fn run_command_responder(
    mut incoming: mpsc::Receiver<IncomingMessage>,
    dispatcher: Arc<CommandDispatcher>,
    responses: Arc<dyn EventPublisher>,
    token: CancellationToken,
) -> DomainResult<()> {
    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            msg = incoming.recv() => {
                let Some(msg) = msg else {
                    debug!("command channel closed");
                    return Ok(());
                };
                // Responses share the command topic; skip our own.
                if msg.payload.as_ref() == b"OK" || msg.payload.as_ref() == b"ERROR" {
                    continue;
                }
                let outcome = dispatcher.dispatch(&msg.payload).await;
                info!(code = outcome.code(), "command dispatched");
                if let Err(e) = responses.publish_event(outcome.response_text().as_bytes()).await {
                    warn!(error = %e, "failed to publish command response");
                }
            }
        }
    }
}

/// Watch the cloud session state; on every reconnect announce the
/// relay and flush records that accumulated while offline.
pub async fn run_connected_flush(
    mut state: watch::Receiver<ConnectionState>,
    relay: Arc<RelayService>,
    events: Arc<dyn EventPublisher>,
    token: CancellationToken,
) -> DomainResult<()> {
    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                if *state.borrow_and_update() != ConnectionState::Connected {
                    continue;
                }
                info!("cloud broker connected, flushing pending records");
                if let Err(e) = events.publish_event(b"LNS Connected!").await {
                    warn!(error = %e, "failed to publish connected notification");
                }
                match relay.flush_pending().await {
                    Ok(0) => {}
                    Ok(flushed) => info!(flushed, "pending records delivered"),
                    Err(e) => error!(error = %e, "pending flush failed"),
                }
            }
        }
    }
}

/// Periodically retry records that every earlier delivery attempt
/// missed.
pub async fn run_pending_sweep(
    relay: Arc<RelayService>,
    period: Duration,
    token: CancellationToken,
) -> DomainResult<()> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                match relay.flush_pending().await {
                    Ok(0) => debug!("pending sweep found nothing to deliver"),
                    Ok(flushed) => info!(flushed, "pending sweep delivered records"),
                    Err(e) => error!(error = %e, "pending sweep failed"),
                }
            }
        }
    }
}

/// Periodically prune records past the retention window.
pub async fn run_retention_sweep(
    relay: Arc<RelayService>,
    period: Duration,
    token: CancellationToken,
) -> DomainResult<()> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                if let Err(e) = relay.prune_aged().await {
                    error!(error = %e, "retention sweep failed");
                }
            }
        }
    }
}
