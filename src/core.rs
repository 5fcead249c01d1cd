//! Core event model and service traits for vmnotify
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application.

use crate::transport::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A payload is a flat mapping of field names to JSON scalar values.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Severity level of an event. Exactly one level is attached to every
/// event and selects the handler entry point on the consumer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    /// All levels, in ascending severity order.
    pub const ALL: [Level; 3] = [Level::Info, Level::Warn, Level::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Level::Info),
            "warn" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            other => Err(format!("unknown level: {other}")),
        }
    }
}

/// A leveled notification event. Immutable once constructed: the notifier
/// builds it at publish time and consumers only ever read it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Opaque request context, carried but not interpreted.
    #[serde(default)]
    pub context: Payload,
    /// Identity of the producer that emitted the event.
    pub publisher_id: String,
    /// Free-form dotted classification, e.g. `vm.info`.
    pub event_type: String,
    /// The structured payload subject to schema validation.
    pub payload: Payload,
    pub level: Level,
}

/// Transport-supplied delivery metadata. Read-only to the core.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Message identifier assigned by the transport, if any.
    pub message_id: Option<String>,
    /// When the transport handed the event to this consumer.
    pub received_at: DateTime<Utc>,
}

impl Metadata {
    pub fn new(message_id: Option<String>) -> Self {
        Self {
            message_id,
            received_at: Utc::now(),
        }
    }
}

/// One received event together with its transport metadata. Lives for the
/// duration of a single dispatch call.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub event: Event,
    pub metadata: Metadata,
}

/// Result of handling one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// Payload passed schema validation and the observation record was emitted.
    Accepted,
    /// Payload failed schema validation; the reason was recorded. A rejected
    /// event is still acknowledged, since a malformed payload is a permanent
    /// condition that re-delivery would not fix.
    Rejected(String),
}

// =============================================================================
// Service Traits
// =============================================================================

/// Connection to a message bus, supplying publish and subscribe primitives.
///
/// The pool label partitions consumers sharing a topic into one work-sharing
/// group; load-splitting among pool members is the transport's job, the core
/// only passes the label through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes an event onto the named topic.
    ///
    /// May block on transport I/O. A failure to reach the bus is surfaced
    /// as a `TransportError`, never swallowed.
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), TransportError>;

    /// Binds to a topic as a member of the given pool and returns a
    /// blocking source of events, infinite until dropped.
    async fn subscribe(
        &self,
        topic: &str,
        pool: &str,
    ) -> Result<Box<dyn EventStream>, TransportError>;
}

/// A blocking source of deliveries from one topic binding.
///
/// At most one delivery is outstanding per stream: the dispatch loop is
/// strictly sequential, so the stream tracks the unacknowledged delivery
/// internally and `ack` always refers to the most recent one.
#[async_trait]
pub trait EventStream: Send {
    /// Waits for the next delivery. Returns `None` once the stream is
    /// closed, or `Err` on a transport-level failure.
    async fn next(&mut self) -> Option<Result<Delivery, TransportError>>;

    /// Acknowledges the most recently received delivery.
    async fn ack(&mut self) -> Result<(), TransportError>;
}

/// Receives the observation records the handler emits for each dispatch.
pub trait ObservationSink: Send + Sync {
    fn accepted(&self, level: Level, event: &Event);
    fn rejected(&self, level: Level, event: &Event, reason: &str);
}
