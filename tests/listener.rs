//! End-to-end dispatch tests over the in-memory transport: publish through
//! a `Notifier`, consume through a `Listener`, observe via a recording sink.

mod helpers;

use helpers::{instance_payload, RecordingSink, SlowSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use vmnotify::config::MessagingConfig;
use vmnotify::core::{Level, Payload, Transport};
use vmnotify::handler::NotificationHandler;
use vmnotify::listener::Listener;
use vmnotify::notifier::Notifier;
use vmnotify::schema::Schema;
use vmnotify::transport::memory::MemoryTransport;

fn messaging() -> MessagingConfig {
    MessagingConfig {
        topic: "notification".into(),
        pool: "test".into(),
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn each_level_reaches_exactly_one_handler_invocation() {
    let bus: Arc<dyn Transport> = Arc::new(MemoryTransport::default());
    let sink = RecordingSink::new();
    let handler = NotificationHandler::new(Schema::instance_fields(), sink.clone());
    let listener = Listener::new(bus.clone(), &messaging(), handler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_task = tokio::spawn(listener.run(shutdown_rx));

    let notifier = Notifier::new(bus, &messaging(), "compute-1");
    for level in Level::ALL {
        notifier
            .publish(level, Payload::new(), "vm.lifecycle", instance_payload())
            .await
            .unwrap();
    }

    wait_for(|| sink.accepted_count() == 3).await;

    let accepted = sink.accepted.lock().unwrap();
    let levels: Vec<Level> = accepted.iter().map(|(l, _)| *l).collect();
    assert_eq!(levels, vec![Level::Info, Level::Warn, Level::Error]);
    for (_, event) in accepted.iter() {
        assert_eq!(event.publisher_id, "compute-1");
        assert_eq!(event.event_type, "vm.lifecycle");
        assert_eq!(event.payload, instance_payload());
    }
    drop(accepted);
    assert_eq!(sink.rejected_count(), 0);

    shutdown_tx.send(true).unwrap();
    listener_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn rejection_names_the_missing_field_and_emits_no_acceptance() {
    let bus: Arc<dyn Transport> = Arc::new(MemoryTransport::default());
    let sink = RecordingSink::new();
    let handler = NotificationHandler::new(Schema::instance_fields(), sink.clone());
    let listener = Listener::new(bus.clone(), &messaging(), handler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_task = tokio::spawn(listener.run(shutdown_rx));

    let mut payload = instance_payload();
    payload.remove("flavor");
    let notifier = Notifier::new(bus, &messaging(), "compute-1");
    notifier
        .info(Payload::new(), "vm.info", payload)
        .await
        .unwrap();

    wait_for(|| sink.rejected_count() == 1).await;

    let rejected = sink.rejected.lock().unwrap();
    assert!(rejected[0].2.contains("flavor"));
    drop(rejected);
    assert_eq!(sink.accepted_count(), 0);

    shutdown_tx.send(true).unwrap();
    listener_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn rejection_does_not_halt_the_loop() {
    let bus: Arc<dyn Transport> = Arc::new(MemoryTransport::default());
    let sink = RecordingSink::new();
    let handler = NotificationHandler::new(Schema::instance_fields(), sink.clone());
    let listener = Listener::new(bus.clone(), &messaging(), handler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_task = tokio::spawn(listener.run(shutdown_rx));

    let notifier = Notifier::new(bus, &messaging(), "compute-1");
    let mut broken = instance_payload();
    broken.remove("instanceID");
    notifier
        .info(Payload::new(), "vm.broken", broken)
        .await
        .unwrap();
    notifier
        .info(Payload::new(), "vm.ok", instance_payload())
        .await
        .unwrap();

    wait_for(|| sink.accepted_count() == 1 && sink.rejected_count() == 1).await;

    let accepted = sink.accepted.lock().unwrap();
    assert_eq!(accepted[0].1.event_type, "vm.ok");
    drop(accepted);

    shutdown_tx.send(true).unwrap();
    listener_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn dispatching_the_same_event_twice_yields_two_acceptances() {
    let bus: Arc<dyn Transport> = Arc::new(MemoryTransport::default());
    let sink = RecordingSink::new();
    let handler = NotificationHandler::new(Schema::instance_fields(), sink.clone());
    let listener = Listener::new(bus.clone(), &messaging(), handler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_task = tokio::spawn(listener.run(shutdown_rx));

    let notifier = Notifier::new(bus, &messaging(), "compute-1");
    for _ in 0..2 {
        notifier
            .info(Payload::new(), "vm.info", instance_payload())
            .await
            .unwrap();
    }

    // No deduplication is claimed.
    wait_for(|| sink.accepted_count() == 2).await;

    shutdown_tx.send(true).unwrap();
    listener_task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_mid_dispatch_completes_the_inflight_event() {
    let bus: Arc<dyn Transport> = Arc::new(MemoryTransport::default());
    let inner = RecordingSink::new();
    let slow = Arc::new(SlowSink {
        inner: inner.clone(),
        delay: Duration::from_millis(300),
    });
    let handler = NotificationHandler::new(Schema::instance_fields(), slow);
    let listener = Listener::new(bus.clone(), &messaging(), handler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_task = tokio::spawn(listener.run(shutdown_rx));

    let notifier = Notifier::new(bus, &messaging(), "compute-1");
    notifier
        .info(Payload::new(), "vm.info", instance_payload())
        .await
        .unwrap();

    // Let the dispatch start, then request shutdown while it is in flight.
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();

    timeout(Duration::from_secs(2), listener_task)
        .await
        .expect("listener did not stop")
        .unwrap()
        .unwrap();

    // The in-flight dispatch was completed and recorded before the exit.
    assert_eq!(inner.accepted_count(), 1);
}

#[tokio::test]
async fn closed_stream_stops_the_listener_cleanly() {
    let bus = Arc::new(MemoryTransport::default());
    let sink = RecordingSink::new();
    let handler = NotificationHandler::new(Schema::instance_fields(), sink);
    let listener = Listener::new(bus.clone(), &messaging(), handler);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_task = tokio::spawn(listener.run(shutdown_rx));

    // Give the listener time to bind, then tear down the bus side.
    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.close();

    timeout(Duration::from_secs(2), listener_task)
        .await
        .expect("listener did not stop")
        .unwrap()
        .unwrap();
}
