//! Level-routed notification handling
//!
//! One handler instance per consumer process. The handler is stateless aside
//! from its fixed schema: every dispatch validates the payload and either
//! emits an acceptance record or records the rejection reason. The three
//! level entry points share a single validation and formatting routine, kept
//! as thin aliases so the per-level contract stays visible at the seam.

use crate::core::{Delivery, Event, HandleOutcome, Level, ObservationSink};
use crate::schema::{self, Schema};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct NotificationHandler {
    schema: Schema,
    sink: Arc<dyn ObservationSink>,
}

impl NotificationHandler {
    pub fn new(schema: Schema, sink: Arc<dyn ObservationSink>) -> Self {
        Self { schema, sink }
    }

    /// Handler with the default line-oriented log sink.
    pub fn with_log_sink(schema: Schema) -> Self {
        Self::new(schema, Arc::new(LogSink))
    }

    pub fn info(&self, delivery: &Delivery) -> HandleOutcome {
        self.handle(Level::Info, delivery)
    }

    pub fn warn(&self, delivery: &Delivery) -> HandleOutcome {
        self.handle(Level::Warn, delivery)
    }

    pub fn error(&self, delivery: &Delivery) -> HandleOutcome {
        self.handle(Level::Error, delivery)
    }

    /// Validates the delivery's payload and emits the observation record.
    ///
    /// Never panics or propagates an error out of the dispatch loop:
    /// a validation failure is reported through the sink and the returned
    /// outcome only.
    pub fn handle(&self, level: Level, delivery: &Delivery) -> HandleOutcome {
        let event = &delivery.event;
        match schema::validate(&event.payload, &self.schema) {
            Ok(()) => {
                self.sink.accepted(level, event);
                HandleOutcome::Accepted
            }
            Err(err) => {
                let reason = err.to_string();
                self.sink.rejected(level, event, &reason);
                HandleOutcome::Rejected(reason)
            }
        }
    }
}

/// The default observation sink: line-oriented log output, one line for the
/// publisher id, one for the event type, a pretty-printed payload block, and
/// a leveled line noting receipt or validation failure.
pub struct LogSink;

impl ObservationSink for LogSink {
    fn accepted(&self, level: Level, event: &Event) {
        info!("publisher id: {}", event.publisher_id);
        info!("event type: {}", event.event_type);
        let payload = serde_json::to_string_pretty(&event.payload).unwrap_or_default();
        info!("payload:\n{}", payload);
        match level {
            Level::Info => info!(
                publisher_id = %event.publisher_id,
                event_type = %event.event_type,
                "received info notification"
            ),
            Level::Warn => warn!(
                publisher_id = %event.publisher_id,
                event_type = %event.event_type,
                "received warn notification"
            ),
            Level::Error => error!(
                publisher_id = %event.publisher_id,
                event_type = %event.event_type,
                "received error notification"
            ),
        }
    }

    fn rejected(&self, level: Level, event: &Event, reason: &str) {
        error!(
            level = %level,
            publisher_id = %event.publisher_id,
            event_type = %event.event_type,
            reason,
            "payload failed schema validation"
        );
    }
}
