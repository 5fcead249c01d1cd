//! Producer-side event publishing
//!
//! A notifier carries a fixed publisher identity and target topic. Each
//! publish builds an immutable event and hands it to the transport; the
//! call may block on transport I/O and any failure surfaces to the caller.

use crate::config::MessagingConfig;
use crate::core::{Event, Level, Payload, Transport};
use crate::transport::TransportError;
use std::sync::Arc;
use tracing::debug;

pub struct Notifier {
    transport: Arc<dyn Transport>,
    topic: String,
    publisher_id: String,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn Transport>,
        messaging: &MessagingConfig,
        publisher_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            topic: messaging.topic.clone(),
            publisher_id: publisher_id.into(),
        }
    }

    pub async fn publish(
        &self,
        level: Level,
        context: Payload,
        event_type: &str,
        payload: Payload,
    ) -> Result<(), TransportError> {
        let event = Event {
            context,
            publisher_id: self.publisher_id.clone(),
            event_type: event_type.to_string(),
            payload,
            level,
        };
        debug!(topic = %self.topic, event_type, %level, "publishing event");
        self.transport.publish(&self.topic, &event).await?;
        metrics::counter!("events_published_total").increment(1);
        Ok(())
    }

    pub async fn info(
        &self,
        context: Payload,
        event_type: &str,
        payload: Payload,
    ) -> Result<(), TransportError> {
        self.publish(Level::Info, context, event_type, payload).await
    }

    pub async fn warn(
        &self,
        context: Payload,
        event_type: &str,
        payload: Payload,
    ) -> Result<(), TransportError> {
        self.publish(Level::Warn, context, event_type, payload).await
    }

    pub async fn error(
        &self,
        context: Payload,
        event_type: &str,
        payload: Payload,
    ) -> Result<(), TransportError> {
        self.publish(Level::Error, context, event_type, payload).await
    }
}
