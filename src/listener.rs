//! Blocking consumption loop for one topic and pool
//!
//! A listener owns one topic binding and one handler, and processes events
//! strictly sequentially: a dispatch always runs to completion before the
//! next event is pulled, including across a shutdown request. Concurrency
//! across events is only achieved by running several listener instances in
//! the same pool, each independent; the transport splits the work.

use crate::config::MessagingConfig;
use crate::core::{HandleOutcome, Level, Transport};
use crate::handler::NotificationHandler;
use crate::transport::TransportError;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub struct Listener {
    transport: Arc<dyn Transport>,
    topic: String,
    pool: String,
    handler: NotificationHandler,
}

impl Listener {
    pub fn new(
        transport: Arc<dyn Transport>,
        messaging: &MessagingConfig,
        handler: NotificationHandler,
    ) -> Self {
        Self {
            transport,
            topic: messaging.topic.clone(),
            pool: messaging.pool.clone(),
            handler,
        }
    }

    /// Binds to the topic and runs the receive-then-dispatch loop until the
    /// shutdown signal fires or the stream closes.
    ///
    /// The select only guards the wait for the next delivery; once an event
    /// is in hand it is dispatched and acknowledged un-interrupted, so a
    /// shutdown requested mid-dispatch drains the in-flight event before the
    /// loop exits. Dropping the stream on return releases the topic binding.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        let mut stream = self.transport.subscribe(&self.topic, &self.pool).await?;
        info!(topic = %self.topic, pool = %self.pool, "listener started");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("listener received shutdown signal");
                    break;
                }
                next = stream.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!("transport failure while receiving: {e}");
                    return Err(e);
                }
                None => {
                    info!("event stream closed, listener stopping");
                    break;
                }
            };

            metrics::counter!("events_received_total").increment(1);

            // Route by level to the matching handler entry point. The
            // dispatch completes before the next event is pulled.
            let outcome = match delivery.event.level {
                Level::Info => self.handler.info(&delivery),
                Level::Warn => self.handler.warn(&delivery),
                Level::Error => self.handler.error(&delivery),
            };

            match outcome {
                HandleOutcome::Accepted => {
                    metrics::counter!("events_accepted_total").increment(1);
                }
                HandleOutcome::Rejected(reason) => {
                    metrics::counter!("events_rejected_total").increment(1);
                    warn!(
                        event_type = %delivery.event.event_type,
                        reason,
                        "event rejected, acknowledging anyway"
                    );
                }
            }

            // Both outcomes acknowledge: a validation failure is permanent
            // and re-delivery would not help.
            stream.ack().await?;
        }

        info!(topic = %self.topic, "listener stopped");
        Ok(())
    }
}
