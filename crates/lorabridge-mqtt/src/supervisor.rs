use crate::backoff::{ConnectionState, ReconnectPolicy};
use bytes::Bytes;
use lorabridge_domain::error::{DomainError, DomainResult};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection settings for one broker session.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
}

/// A message received on one of the supervised subscriptions.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// A QoS 1 publish submitted to the supervisor. `done` resolves when
/// the broker's PubAck arrives, or with an error if the session drops
/// the message first.
pub struct PublishRequest {
    pub topic: String,
    pub payload: Vec<u8>,
    pub done: oneshot::Sender<DomainResult<()>>,
}

/// Shared view of a supervised session: a channel for submitting
/// publishes and a watch on its connection state.
#[derive(Clone)]
pub struct BrokerHandle {
    pub publishes: mpsc::Sender<PublishRequest>,
    pub state: watch::Receiver<ConnectionState>,
}

/// Tracks QoS 1 publishes between enqueue and broker acknowledgment.
///
/// rumqttc assigns packet ids in request order, so completions still
/// waiting for an id form a queue: each `Outgoing::Publish` event
/// binds the oldest waiter to that id, and the matching PubAck
/// resolves it.
#[derive(Default)]
struct AckLedger {
    unassigned: VecDeque<oneshot::Sender<DomainResult<()>>>,
    inflight: HashMap<u16, oneshot::Sender<DomainResult<()>>>,
}

impl AckLedger {
    fn enqueued(&mut self, done: oneshot::Sender<DomainResult<()>>) {
        self.unassigned.push_back(done);
    }

    fn assigned(&mut self, pkid: u16) {
        if let Some(done) = self.unassigned.pop_front() {
            self.inflight.insert(pkid, done);
        }
    }

    fn acknowledged(&mut self, pkid: u16) {
        if let Some(done) = self.inflight.remove(&pkid) {
            let _ = done.send(Ok(()));
        }
    }

    /// Fail every waiter. The client may still retransmit and deliver
    /// some of them after reconnecting; callers treat that as an
    /// acceptable duplicate, never as a loss.
    fn fail_all(&mut self, reason: &str) {
        for done in self.unassigned.drain(..) {
            let _ = done.send(Err(DomainError::BrokerUnavailable(reason.to_string())));
        }
        for (_, done) in self.inflight.drain() {
            let _ = done.send(Err(DomainError::BrokerUnavailable(reason.to_string())));
        }
    }
}

/// Owns one broker session end to end: drives the rumqttc event loop,
/// re-establishes subscriptions after every reconnect, forwards
/// inbound publishes, resolves outbound publishes on PubAck, and
/// applies the reconnect backoff schedule.
///
/// Exhausting the schedule is fatal: `run` returns an error so the
/// process group can tear the relay down rather than run half-wired.
pub struct ConnectionSupervisor {
    name: String,
    client: AsyncClient,
    eventloop: EventLoop,
    policy: ReconnectPolicy,
    subscriptions: Vec<String>,
    state_tx: watch::Sender<ConnectionState>,
    publish_rx: mpsc::Receiver<PublishRequest>,
    acks: AckLedger,
    incoming_tx: Option<mpsc::Sender<IncomingMessage>>,
}

impl ConnectionSupervisor {
    pub fn new(
        name: impl Into<String>,
        config: &BrokerConfig,
        policy: ReconnectPolicy,
        subscriptions: Vec<String>,
    ) -> (Self, BrokerHandle) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, 100);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (publish_tx, publish_rx) = mpsc::channel(100);

        let handle = BrokerHandle {
            publishes: publish_tx,
            state: state_rx,
        };
        let supervisor = Self {
            name: name.into(),
            client,
            eventloop,
            policy,
            subscriptions,
            state_tx,
            publish_rx,
            acks: AckLedger::default(),
            incoming_tx: None,
        };
        (supervisor, handle)
    }

    /// Attach a channel that receives every publish arriving on the
    /// supervised subscriptions. Call at most once, before `run`.
    pub fn take_incoming(&mut self, capacity: usize) -> mpsc::Receiver<IncomingMessage> {
        let (tx, rx) = mpsc::channel(capacity);
        self.incoming_tx = Some(tx);
        rx
    }

    pub async fn run(mut self, token: CancellationToken) -> DomainResult<()> {
        info!(broker = %self.name, "starting MQTT session");
        self.state_tx.send_replace(ConnectionState::Connecting);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(broker = %self.name, "shutdown signal received");
                    let _ = self.client.disconnect().await;
                    return Ok(());
                }
                Some(request) = self.publish_rx.recv() => {
                    self.submit(request).await;
                }
                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            self.on_connected().await;
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.forward(publish.topic, publish.payload).await;
                        }
                        Ok(Event::Incoming(Packet::PubAck(ack))) => {
                            self.acks.acknowledged(ack.pkid);
                        }
                        Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                            self.acks.assigned(pkid);
                        }
                        Ok(Event::Incoming(Packet::SubAck(_))) => {
                            debug!(broker = %self.name, "subscription acknowledged");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            self.acks.fail_all("connection lost");
                            self.state_tx.send_replace(ConnectionState::Disconnected);
                            match self.policy.record_failure() {
                                Some(delay) => {
                                    warn!(
                                        broker = %self.name,
                                        error = %e,
                                        attempt = self.policy.attempts(),
                                        delay_secs = delay.as_secs(),
                                        "MQTT connection error, retrying"
                                    );
                                    tokio::select! {
                                        _ = token.cancelled() => return Ok(()),
                                        _ = tokio::time::sleep(delay) => {}
                                    }
                                    self.state_tx.send_replace(ConnectionState::Connecting);
                                }
                                None => {
                                    self.state_tx.send_replace(ConnectionState::GivenUp);
                                    error!(
                                        broker = %self.name,
                                        max_attempts = self.policy.max_attempts(),
                                        "reconnect attempts exhausted, giving up"
                                    );
                                    return Err(DomainError::ReconnectExhausted(
                                        self.policy.max_attempts(),
                                    ));
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    async fn submit(&mut self, request: PublishRequest) {
        match self
            .client
            .publish(&request.topic, QoS::AtLeastOnce, false, request.payload)
            .await
        {
            Ok(()) => self.acks.enqueued(request.done),
            Err(e) => {
                let _ = request.done.send(Err(DomainError::PublishFailed {
                    topic: request.topic,
                    reason: e.to_string(),
                }));
            }
        }
    }

    async fn on_connected(&mut self) {
        info!(broker = %self.name, "connected to MQTT broker");
        self.policy.record_success();

        // Clean sessions drop server-side state, so every reconnect
        // re-establishes the full subscription set.
        for topic in &self.subscriptions {
            if let Err(e) = self.client.subscribe(topic, QoS::AtLeastOnce).await {
                warn!(broker = %self.name, topic = %topic, error = %e, "subscribe failed");
            } else {
                info!(broker = %self.name, topic = %topic, "subscribed");
            }
        }

        self.state_tx.send_replace(ConnectionState::Connected);
    }

    async fn forward(&mut self, topic: String, payload: Bytes) {
        let Some(tx) = &self.incoming_tx else {
            return;
        };
        debug!(broker = %self.name, topic = %topic, payload_size = payload.len(), "message received");
        if tx
            .send(IncomingMessage { topic, payload })
            .await
            .is_err()
        {
            warn!(broker = %self.name, "incoming channel closed, dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker_config() -> BrokerConfig {
        BrokerConfig {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "test-session".to_string(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_initial_state_is_disconnected() {
        let (_supervisor, handle) = ConnectionSupervisor::new(
            "test",
            &broker_config(),
            ReconnectPolicy::default(),
            Vec::new(),
        );
        assert_eq!(*handle.state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_ack_ledger_resolves_on_matching_puback() {
        let mut ledger = AckLedger::default();
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();

        ledger.enqueued(first_tx);
        ledger.enqueued(second_tx);
        ledger.assigned(1);
        ledger.assigned(2);

        // Acks can come back out of order.
        ledger.acknowledged(2);
        assert!(second_rx.await.unwrap().is_ok());
        ledger.acknowledged(1);
        assert!(first_rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_ack_ledger_fails_everything_on_connection_loss() {
        let mut ledger = AckLedger::default();
        let (assigned_tx, assigned_rx) = oneshot::channel();
        let (waiting_tx, waiting_rx) = oneshot::channel();

        ledger.enqueued(assigned_tx);
        ledger.assigned(7);
        ledger.enqueued(waiting_tx);

        ledger.fail_all("connection lost");
        assert!(matches!(
            assigned_rx.await.unwrap(),
            Err(DomainError::BrokerUnavailable(_))
        ));
        assert!(matches!(
            waiting_rx.await.unwrap(),
            Err(DomainError::BrokerUnavailable(_))
        ));
    }

    #[test]
    fn test_ack_ledger_ignores_unknown_pkid() {
        let mut ledger = AckLedger::default();
        // Retransmission acks for publishes already failed over must
        // not panic or disturb the queue.
        ledger.acknowledged(3);
        ledger.assigned(4);
    }
}
