//! Hookline Web Server - webhook receiver.
//!
//! This binary provides a web server that:
//! - Receives webhooks over HTTP on the configured path
//! - Verifies the HMAC signature against the raw body
//! - Dispatches the event to the registered handlers
//! - Returns 200 on success, 400 on rejection, 500 on handler failure

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hookline::adapters::shutdown_signal;
use hookline::{app, Config, HttpAdapter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        webhook_path = %config.webhook_path,
        signing_configured = config.signature_verification_enabled(),
        tolerance_secs = config.signature_tolerance_secs,
        "config_loaded"
    );

    let router = Arc::new(app::default_router());
    info!(event_types = ?router.event_types(), "router_ready");

    let app = HttpAdapter::new(app::verifier(&config), router)
        .on_error(|err, event| {
            tracing::error!(
                event_id = %event.id(),
                event_type = %event.event_type(),
                error = %err,
                "webhook_dispatch_error"
            );
        })
        .into_router(&config.webhook_path);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("web_server_shutting_down");
        })
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}
