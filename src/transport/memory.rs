//! In-process channel-backed transport
//!
//! Models the bus with one MPMC channel per (topic, pool) binding: a publish
//! fans out to every pool subscribed on the topic, and within a pool the
//! channel delivers each event to exactly one subscriber. Used by tests in
//! place of a live broker; acknowledgement is a no-op.

use crate::core::{Delivery, Event, EventStream, Metadata, Transport};
use crate::transport::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

type PoolChannels = HashMap<String, (async_channel::Sender<Event>, async_channel::Receiver<Event>)>;

pub struct MemoryTransport {
    // topic -> pool -> shared channel
    topics: Mutex<HashMap<String, PoolChannels>>,
    capacity: usize,
    next_message_id: Arc<AtomicU64>,
}

impl MemoryTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
            next_message_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Drops every binding, closing all open event streams.
    pub fn close(&self) {
        self.topics.lock().unwrap().clear();
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), TransportError> {
        let senders: Vec<async_channel::Sender<Event>> = {
            let topics = self.topics.lock().unwrap();
            match topics.get(topic) {
                Some(pools) => pools.values().map(|(tx, _)| tx.clone()).collect(),
                None => Vec::new(),
            }
        };

        if senders.is_empty() {
            // No binding on the topic; the bus drops the message.
            debug!(topic, "publish on topic with no subscribers");
            return Ok(());
        }

        for tx in senders {
            tx.send(event.clone())
                .await
                .map_err(|e| TransportError::Publish(e.to_string()))?;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        pool: &str,
    ) -> Result<Box<dyn EventStream>, TransportError> {
        let rx = {
            let mut topics = self.topics.lock().unwrap();
            let pools = topics.entry(topic.to_string()).or_default();
            let (_, rx) = pools
                .entry(pool.to_string())
                .or_insert_with(|| async_channel::bounded(self.capacity));
            rx.clone()
        };

        Ok(Box::new(MemoryEventStream {
            rx,
            next_message_id: self.next_message_id.clone(),
        }))
    }
}

struct MemoryEventStream {
    rx: async_channel::Receiver<Event>,
    next_message_id: Arc<AtomicU64>,
}

#[async_trait]
impl EventStream for MemoryEventStream {
    async fn next(&mut self) -> Option<Result<Delivery, TransportError>> {
        match self.rx.recv().await {
            Ok(event) => {
                let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
                Some(Ok(Delivery {
                    event,
                    metadata: Metadata::new(Some(format!("mem-{id}"))),
                }))
            }
            // All senders dropped; the binding is gone.
            Err(async_channel::RecvError) => None,
        }
    }

    async fn ack(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Level, Payload};

    fn event(event_type: &str) -> Event {
        Event {
            context: Payload::new(),
            publisher_id: "test".into(),
            event_type: event_type.into(),
            payload: Payload::new(),
            level: Level::Info,
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let bus = MemoryTransport::default();
        bus.publish("notification", &event("vm.info")).await.unwrap();
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = MemoryTransport::default();
        let mut stream = bus.subscribe("notification", "test").await.unwrap();

        bus.publish("notification", &event("vm.info")).await.unwrap();

        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.event.event_type, "vm.info");
        assert!(delivery.metadata.message_id.is_some());
        stream.ack().await.unwrap();
    }

    #[tokio::test]
    async fn events_are_split_within_one_pool() {
        let bus = MemoryTransport::default();
        let mut a = bus.subscribe("notification", "test").await.unwrap();
        let mut b = bus.subscribe("notification", "test").await.unwrap();

        bus.publish("notification", &event("e.1")).await.unwrap();
        bus.publish("notification", &event("e.2")).await.unwrap();

        // Each event goes to exactly one member of the pool.
        let first = a.next().await.unwrap().unwrap();
        let second = b.next().await.unwrap().unwrap();
        let mut types = vec![first.event.event_type, second.event.event_type];
        types.sort();
        assert_eq!(types, vec!["e.1".to_string(), "e.2".to_string()]);
    }

    #[tokio::test]
    async fn each_pool_sees_every_event() {
        let bus = MemoryTransport::default();
        let mut a = bus.subscribe("notification", "pool-a").await.unwrap();
        let mut b = bus.subscribe("notification", "pool-b").await.unwrap();

        bus.publish("notification", &event("vm.info")).await.unwrap();

        assert_eq!(a.next().await.unwrap().unwrap().event.event_type, "vm.info");
        assert_eq!(b.next().await.unwrap().unwrap().event.event_type, "vm.info");
    }

    #[tokio::test]
    async fn other_topics_do_not_receive_the_event() {
        let bus = MemoryTransport::default();
        let mut stream = bus.subscribe("other", "test").await.unwrap();

        bus.publish("notification", &event("vm.info")).await.unwrap();

        tokio::select! {
            _ = stream.next() => panic!("event leaked across topics"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
        }
    }
}
