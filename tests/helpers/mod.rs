//! Shared fakes and builders for the integration tests.

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vmnotify::core::{Event, Level, ObservationSink, Payload};

/// An observation sink that records every accepted and rejected dispatch.
#[derive(Default)]
pub struct RecordingSink {
    pub accepted: Mutex<Vec<(Level, Event)>>,
    pub rejected: Mutex<Vec<(Level, Event, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.lock().unwrap().len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.lock().unwrap().len()
    }
}

impl ObservationSink for RecordingSink {
    fn accepted(&self, level: Level, event: &Event) {
        self.accepted.lock().unwrap().push((level, event.clone()));
    }

    fn rejected(&self, level: Level, event: &Event, reason: &str) {
        self.rejected
            .lock()
            .unwrap()
            .push((level, event.clone(), reason.to_string()));
    }
}

/// A sink that blocks inside the dispatch for a while before recording,
/// used to request shutdown while a dispatch is in flight.
pub struct SlowSink {
    pub inner: Arc<RecordingSink>,
    pub delay: Duration,
}

impl ObservationSink for SlowSink {
    fn accepted(&self, level: Level, event: &Event) {
        std::thread::sleep(self.delay);
        self.inner.accepted(level, event);
    }

    fn rejected(&self, level: Level, event: &Event, reason: &str) {
        std::thread::sleep(self.delay);
        self.inner.rejected(level, event, reason);
    }
}

/// A payload satisfying the VM instance schema.
pub fn instance_payload() -> Payload {
    let mut payload = Payload::new();
    payload.insert("instanceID".into(), json!("i-1"));
    payload.insert("instanceName".into(), json!("vm1"));
    payload.insert("ram".into(), json!(512));
    payload.insert("cpu".into(), json!(1));
    payload.insert("flavor".into(), json!("small"));
    payload
}
