//! Transport implementations
//!
//! The core only depends on the `Transport` and `EventStream` traits from
//! `crate::core`. This module provides the two concrete transports: an MQTT
//! client for a real broker and an in-process channel bus used by tests.

pub mod memory;
pub mod mqtt;

use thiserror::Error;

/// Connectivity or configuration failure reaching the message bus.
///
/// Fatal to the current publish or subscribe attempt; surfaced to the
/// caller, never retried at this layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    #[error("failed to publish event: {0}")]
    Publish(String),

    #[error("failed to subscribe to topic: {0}")]
    Subscribe(String),

    #[error("failed to acknowledge delivery: {0}")]
    Ack(String),

    #[error("failed to encode event: {0}")]
    Codec(#[from] serde_json::Error),
}
