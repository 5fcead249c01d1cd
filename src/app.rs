//! The server and client application logic, decoupled from the entry point.
//!
//! Both functions take the transport as a trait object so integration tests
//! can drive them with the in-memory bus instead of a live broker.

use crate::cli::ClientArgs;
use crate::config::Config;
use crate::core::{Payload, Transport};
use crate::handler::NotificationHandler;
use crate::listener::Listener;
use crate::notifier::Notifier;
use crate::schema::Schema;
use crate::transport::TransportError;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Binds a listener to the configured topic and pool and runs it until the
/// shutdown signal fires.
pub async fn run_server(
    config: &Config,
    transport: Arc<dyn Transport>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let handler = NotificationHandler::with_log_sink(Schema::instance_fields());
    let listener = Listener::new(transport, &config.messaging, handler);
    listener.run(shutdown_rx).await
}

/// Publishes the payload once per selected level.
///
/// The payload is loaded and validated as structured data by the caller
/// before any transport connection is made.
pub async fn run_client(
    config: &Config,
    transport: Arc<dyn Transport>,
    args: &ClientArgs,
    payload: Payload,
) -> Result<(), TransportError> {
    let notifier = Notifier::new(transport, &config.messaging, args.producer_id.clone());

    for level in args.levels() {
        notifier
            .publish(level, Payload::new(), &args.event_type, payload.clone())
            .await?;
        info!(%level, event_type = %args.event_type, "event published");
    }

    Ok(())
}
