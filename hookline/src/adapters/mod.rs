//! Transport adapters.
//!
//! Each adapter turns a transport-native delivery into `(raw body, headers)`,
//! runs the configured [`Verifier`], dispatches the event on a shared
//! [`Router`] and maps the outcome back onto the transport:
//!
//! | Outcome              | HTTP | Function     | Bus                  |
//! |----------------------|------|--------------|----------------------|
//! | dispatched           | 200  | `Ok`         | ack                  |
//! | verification/payload | 400  | `Err`        | nack, no requeue     |
//! | dispatch failure     | 500  | `Err`        | nack, requeue once   |

pub mod bus;
pub mod function;
pub mod http;

use std::sync::Arc;

use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};

use crate::error::{DispatchError, VerifyError};
use crate::event::WebhookEvent;
use crate::headers::Headers;
use crate::router::Router;
use crate::verify::Verifier;

pub use bus::{BusAdapter, Disposition};
pub use function::{FunctionAdapter, FunctionInvocation, InvocationContext};
pub use http::{HttpAdapter, WebhookResponse};

/// Observability hook invoked when a dispatch fails.
pub type ErrorCallback = Arc<dyn Fn(&DispatchError, &WebhookEvent) + Send + Sync>;

/// Failure seen by an adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Rejected before dispatch; never reaches handler code.
    #[error(transparent)]
    Rejected(#[from] VerifyError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Verify-then-dispatch sequence shared by every adapter.
#[derive(Clone)]
pub struct Receiver {
    verifier: Arc<dyn Verifier>,
    router: Arc<Router>,
    on_error: Option<ErrorCallback>,
}

impl Receiver {
    pub fn new(verifier: Arc<dyn Verifier>, router: Arc<Router>) -> Self {
        Self {
            verifier,
            router,
            on_error: None,
        }
    }

    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }

    /// Verify a raw delivery and dispatch the resulting event.
    pub async fn receive(&self, raw: &[u8], headers: &Headers) -> Result<(), AdapterError> {
        let verified = match self.verifier.verify(raw, headers).await {
            Ok(verified) => verified,
            Err(e) => {
                warn!(error = %e, body_length = raw.len(), "webhook_rejected");
                return Err(e.into());
            }
        };

        self.dispatch(verified.event).await
    }

    /// Dispatch an event that the transport has already validated.
    pub async fn dispatch(&self, event: WebhookEvent) -> Result<(), AdapterError> {
        let event = Arc::new(event);

        match self.router.dispatch_shared(Arc::clone(&event)).await {
            Ok(()) => {
                info!(event_id = %event.id(), event_type = %event.event_type(), "webhook_dispatched");
                Ok(())
            }
            Err(e) => {
                error!(
                    event_id = %event.id(),
                    event_type = %event.event_type(),
                    error = %e,
                    "dispatch_failed"
                );
                if let Some(callback) = &self.on_error {
                    callback(&e, &*event);
                }
                Err(e.into())
            }
        }
    }
}

/// Create a future that completes when a shutdown signal is received.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
