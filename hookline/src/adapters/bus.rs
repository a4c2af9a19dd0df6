//! Event-bus adapter (RabbitMQ via lapin).
//!
//! Each delivery body is a webhook payload; message headers are handed to
//! the verifier alongside it. There is no caller to answer, so outcomes map
//! onto acknowledgements:
//! - dispatched: ack
//! - verification/payload failure: nack without requeue (dead-letter)
//! - dispatch failure: nack with requeue on first delivery, dead-letter on
//!   redelivery

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::{AdapterError, Receiver};
use crate::config::Config;
use crate::error::DispatchError;
use crate::event::WebhookEvent;
use crate::headers::Headers;
use crate::router::Router;
use crate::verify::Verifier;

/// Consumer tag announced to the broker.
pub const CONSUMER_TAG: &str = "hookline-consumer";

/// What to tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Nack without requeue.
    Reject,
    /// Nack with requeue.
    Retry,
}

#[derive(Clone)]
pub struct BusAdapter {
    receiver: Receiver,
}

impl BusAdapter {
    pub fn new<V: Verifier + 'static>(verifier: V, router: Arc<Router>) -> Self {
        Self {
            receiver: Receiver::new(Arc::new(verifier), router),
        }
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DispatchError, &WebhookEvent) + Send + Sync + 'static,
    {
        self.receiver.set_error_callback(Arc::new(callback));
        self
    }

    /// Process one delivery and decide how to acknowledge it.
    pub async fn process(&self, body: &[u8], headers: &Headers, redelivered: bool) -> Disposition {
        match self.receiver.receive(body, headers).await {
            Ok(()) => Disposition::Ack,
            Err(AdapterError::Rejected(_)) => Disposition::Reject,
            Err(AdapterError::Dispatch(_)) if redelivered => {
                warn!("dispatch_failed_after_redelivery");
                Disposition::Reject
            }
            Err(AdapterError::Dispatch(_)) => Disposition::Retry,
        }
    }

    /// Consume the configured queue until `shutdown` completes or the
    /// broker closes the consumer.
    ///
    /// This function:
    /// 1. Connects to RabbitMQ using the configured URL
    /// 2. Sets QoS so at most `consumer_prefetch` deliveries are in flight
    /// 3. Declares the durable queue (idempotent operation)
    /// 4. Spawns a task per delivery and acks/nacks its outcome
    /// 5. On stop, waits for in-flight deliveries to settle before closing
    pub async fn run<S>(&self, config: &Config, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        info!(url_length = config.amqp_url.len(), "rabbitmq_connecting");

        let conn = Connection::connect(&config.amqp_url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        info!("rabbitmq_connected");

        let channel = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        channel
            .basic_qos(config.consumer_prefetch, BasicQosOptions::default())
            .await
            .context("Failed to set QoS")?;

        info!(prefetch_count = config.consumer_prefetch, "rabbitmq_qos_set");

        channel
            .queue_declare(
                &config.event_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("Failed to declare event queue")?;

        let mut consumer = channel
            .basic_consume(
                &config.event_queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("Failed to start consumer")?;

        info!(queue = %config.event_queue, "rabbitmq_consumer_started");

        let channel = Arc::new(channel);
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("consumer_stopping");
                    break;
                }
                delivery = consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            let adapter = self.clone();
                            let channel = Arc::clone(&channel);

                            tasks.spawn(async move {
                                let headers = delivery
                                    .properties
                                    .headers()
                                    .as_ref()
                                    .map(Headers::from)
                                    .unwrap_or_default();

                                let disposition = adapter
                                    .process(&delivery.data, &headers, delivery.redelivered)
                                    .await;

                                settle(&channel, delivery.delivery_tag, disposition).await;
                            });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "rabbitmq_delivery_error");
                        }
                        None => {
                            warn!("rabbitmq_consumer_closed");
                            break;
                        }
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_task_outcome(joined);
                }
            }
        }

        drain_in_flight(&mut tasks).await;

        if let Err(e) = channel.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_channel_close_error");
        }
        if let Err(e) = conn.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_connection_close_error");
        }

        info!("consumer_shutdown_complete");
        Ok(())
    }
}

/// Wait for every spawned delivery to finish settling.
async fn drain_in_flight(tasks: &mut JoinSet<()>) {
    if tasks.is_empty() {
        return;
    }

    info!(in_flight = tasks.len(), "consumer_draining");
    while let Some(joined) = tasks.join_next().await {
        log_task_outcome(joined);
    }
}

fn log_task_outcome(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "delivery_task_failed");
    }
}

async fn settle(channel: &Channel, delivery_tag: u64, disposition: Disposition) {
    let result = match disposition {
        Disposition::Ack => {
            channel
                .basic_ack(delivery_tag, BasicAckOptions::default())
                .await
        }
        Disposition::Reject | Disposition::Retry => {
            channel
                .basic_nack(
                    delivery_tag,
                    BasicNackOptions {
                        requeue: disposition == Disposition::Retry,
                        ..Default::default()
                    },
                )
                .await
        }
    };

    if let Err(e) = result {
        error!(
            delivery_tag = delivery_tag,
            disposition = ?disposition,
            error = %e,
            "rabbitmq_settle_failed"
        );
    }
}
