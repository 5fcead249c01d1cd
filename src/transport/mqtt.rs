//! MQTT transport
//!
//! Connects to an MQTT broker with `rumqttc`. A background driver task polls
//! the event loop, which both flushes outgoing publishes and routes incoming
//! ones to the stream subscribed to their topic. Pool semantics come from the
//! broker's shared subscriptions: subscribing to `$share/<pool>/<topic>`
//! makes the broker deliver each message to exactly one member of the pool.
//!
//! `connect` only succeeds once the broker has acknowledged the connection,
//! and `close` only succeeds once every outstanding publish has been
//! confirmed, so an unreachable broker surfaces as an error instead of a
//! quietly idle connection.
//!
//! Manual acknowledgements are enabled, so a delivery is only acked once the
//! dispatch that consumed it has completed. Each topic supports one live
//! stream per connection; the driver acks and drops publishes that no stream
//! is bound to.

use crate::config::BrokerConfig;
use crate::core::{Delivery, Event, EventStream, Metadata, Transport};
use crate::transport::TransportError;
use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, Packet, Publish, QoS};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

type SubscriptionMap = HashMap<String, async_channel::Sender<Publish>>;

pub struct MqttTransport {
    client: AsyncClient,
    subscriptions: Arc<Mutex<SubscriptionMap>>,
    /// Publishes enqueued but not yet confirmed by the broker.
    inflight_publishes: Arc<AtomicUsize>,
    closing: Arc<AtomicBool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Connects to the broker and starts the event loop driver.
    ///
    /// Waits for the broker's connection acknowledgement; an unreachable or
    /// rejecting broker is a `TransportError::Connect`.
    ///
    /// `role` distinguishes producer and consumer connections in the
    /// broker-visible client id.
    pub async fn connect(config: &BrokerConfig, role: &str) -> Result<Self, TransportError> {
        let client_id = format!("{}-{}-{}", config.client_id_prefix, role, std::process::id());
        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_seconds));
        options.set_manual_acks(true);

        let (client, mut event_loop) = AsyncClient::new(options, 16);
        let subscriptions: Arc<Mutex<SubscriptionMap>> = Arc::new(Mutex::new(HashMap::new()));
        let inflight_publishes = Arc::new(AtomicUsize::new(0));
        let closing = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        let driver_client = client.clone();
        let driver_subscriptions = subscriptions.clone();
        let driver_inflight = inflight_publishes.clone();
        let driver_closing = closing.clone();
        let mut ready = Some(ready_tx);
        let driver = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(rumqttc::Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to broker");
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    Ok(rumqttc::Event::Incoming(Packet::Publish(publish))) => {
                        if let Some(unrouted) = dispatch(&driver_subscriptions, publish).await {
                            if let Err(e) = driver_client.ack(&unrouted).await {
                                warn!("failed to ack unrouted message: {e}");
                            }
                        }
                    }
                    Ok(rumqttc::Event::Incoming(Packet::PubAck(_))) => {
                        if driver_inflight.load(Ordering::SeqCst) > 0 {
                            driver_inflight.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // An error before the first connack fails the
                        // connect call; afterwards the loop retries.
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(Err(e.to_string()));
                            break;
                        }
                        if driver_closing.load(Ordering::SeqCst) {
                            break;
                        }
                        warn!("mqtt event loop error: {e}");
                        tokio::time::sleep(Duration::from_millis(250)).await;
                    }
                }
            }
            debug!("mqtt event loop driver finished");
        });

        match tokio::time::timeout(CONNECT_TIMEOUT, ready_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(reason))) => {
                let _ = driver.await;
                return Err(TransportError::Connect(reason));
            }
            Ok(Err(_)) => {
                return Err(TransportError::Connect(
                    "event loop driver stopped before the broker replied".to_string(),
                ));
            }
            Err(_) => {
                driver.abort();
                return Err(TransportError::Connect(format!(
                    "no broker response within {}s",
                    CONNECT_TIMEOUT.as_secs()
                )));
            }
        }

        Ok(Self {
            client,
            subscriptions,
            inflight_publishes,
            closing,
            driver: Mutex::new(Some(driver)),
        })
    }

    /// Disconnects from the broker and waits for the driver task to finish.
    ///
    /// Waits for outstanding publish confirmations first, so a producer that
    /// closes after publishing learns whether the broker took its events.
    pub async fn close(&self) -> Result<(), TransportError> {
        let flushed = self.wait_for_publish_confirmations().await;
        self.closing.store(true, Ordering::SeqCst);
        let disconnected = self
            .client
            .disconnect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()));
        let driver = self.driver.lock().unwrap().take();
        if let Some(handle) = driver {
            let _ = handle.await;
        }
        flushed.and(disconnected)
    }

    async fn wait_for_publish_confirmations(&self) -> Result<(), TransportError> {
        let deadline = tokio::time::Instant::now() + FLUSH_TIMEOUT;
        loop {
            let outstanding = self.inflight_publishes.load(Ordering::SeqCst);
            if outstanding == 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TransportError::Publish(format!(
                    "{outstanding} publishes not confirmed by the broker"
                )));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Hands an incoming publish to the stream bound to its topic.
///
/// Returns the publish back when no live stream wants it, so the driver can
/// acknowledge it; a stream that has been dropped releases its binding.
async fn dispatch(subscriptions: &Mutex<SubscriptionMap>, publish: Publish) -> Option<Publish> {
    let tx = subscriptions.lock().unwrap().get(&publish.topic).cloned();
    let Some(tx) = tx else {
        debug!(topic = %publish.topic, "no live stream for topic");
        return Some(publish);
    };
    match tx.send(publish).await {
        Ok(()) => None,
        Err(async_channel::SendError(publish)) => {
            subscriptions.lock().unwrap().remove(&publish.topic);
            debug!(topic = %publish.topic, "stream dropped, releasing its topic binding");
            Some(publish)
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), TransportError> {
        let body = serde_json::to_vec(event)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, body)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        self.inflight_publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        pool: &str,
    ) -> Result<Box<dyn EventStream>, TransportError> {
        let rx = {
            let mut subscriptions = self.subscriptions.lock().unwrap();
            if subscriptions.contains_key(topic) {
                return Err(TransportError::Subscribe(format!(
                    "topic {topic} already has a live stream on this connection"
                )));
            }
            let (tx, rx) = async_channel::bounded(64);
            subscriptions.insert(topic.to_string(), tx);
            rx
        };

        let filter = format!("$share/{pool}/{topic}");
        if let Err(e) = self.client.subscribe(&filter, QoS::AtLeastOnce).await {
            self.subscriptions.lock().unwrap().remove(topic);
            return Err(TransportError::Subscribe(e.to_string()));
        }
        info!(topic, pool, "subscribed to topic");

        Ok(Box::new(MqttEventStream {
            client: self.client.clone(),
            rx,
            topic: topic.to_string(),
            pending: None,
        }))
    }
}

struct MqttEventStream {
    client: AsyncClient,
    rx: async_channel::Receiver<Publish>,
    topic: String,
    /// The delivery handed out by the last `next` call, not yet acked.
    pending: Option<Publish>,
}

#[async_trait]
impl EventStream for MqttEventStream {
    async fn next(&mut self) -> Option<Result<Delivery, TransportError>> {
        loop {
            let publish = match self.rx.recv().await {
                Ok(publish) => publish,
                Err(async_channel::RecvError) => return None,
            };

            match serde_json::from_slice::<Event>(&publish.payload) {
                Ok(event) => {
                    let metadata = Metadata::new(Some(publish.pkid.to_string()));
                    self.pending = Some(publish);
                    return Some(Ok(Delivery { event, metadata }));
                }
                Err(e) => {
                    // Not an event envelope. Permanent, so ack and move on.
                    warn!(topic = %self.topic, "discarding undecodable message: {e}");
                    if let Err(e) = self.client.ack(&publish).await {
                        return Some(Err(TransportError::Ack(e.to_string())));
                    }
                }
            }
        }
    }

    async fn ack(&mut self) -> Result<(), TransportError> {
        if let Some(publish) = self.pending.take() {
            self.client
                .ack(&publish)
                .await
                .map_err(|e| TransportError::Ack(e.to_string()))?;
        }
        Ok(())
    }
}
