//! Hookline Consumer - RabbitMQ webhook event consumer.
//!
//! This binary consumes webhook payloads published to the event queue,
//! verifies them and dispatches them to the registered handlers.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookline::adapters::shutdown_signal;
use hookline::{app, BusAdapter, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("consumer_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        queue = %config.event_queue,
        prefetch = config.consumer_prefetch,
        signing_configured = config.signature_verification_enabled(),
        "config_loaded"
    );

    let router = Arc::new(app::default_router());
    let adapter = BusAdapter::new(app::verifier(&config), router).on_error(|err, event| {
        tracing::error!(
            event_id = %event.id(),
            event_type = %event.event_type(),
            error = %err,
            "consumer_dispatch_error"
        );
    });

    adapter.run(&config, shutdown_signal()).await?;

    Ok(())
}
