//! vmnotify - a minimal leveled publish/subscribe notification utility
//!
//! A producer emits leveled (info/warn/error) structured events tagged with
//! a publisher identity and event type onto a named topic; consumers
//! subscribe to that topic, validate each event's payload against a
//! required-field schema, and react per severity level.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod handler;
pub mod internal_metrics;
pub mod listener;
pub mod notifier;
pub mod payload;
pub mod schema;
pub mod transport;

// Re-export the event model for convenience
pub use crate::core::{Delivery, Event, HandleOutcome, Level, Metadata, Payload};
