//! HTTP adapter (axum).
//!
//! The webhook endpoint takes the body as raw [`Bytes`] so the verifier sees
//! exactly what the sender signed:
//! 1. Verify signature and payload (400 on failure, nothing dispatched)
//! 2. Dispatch on the shared router
//! 3. Return 200 `{"received": true}`, or 500 if dispatch failed so the
//!    sender retries

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::{AdapterError, Receiver};
use crate::error::DispatchError;
use crate::event::WebhookEvent;
use crate::headers::Headers;
use crate::router::Router;
use crate::verify::Verifier;

/// Shared state for the webhook endpoint.
#[derive(Clone)]
pub struct HttpAdapter {
    receiver: Receiver,
}

impl HttpAdapter {
    pub fn new<V: Verifier + 'static>(verifier: V, router: Arc<Router>) -> Self {
        Self {
            receiver: Receiver::new(Arc::new(verifier), router),
        }
    }

    /// Invoke `callback` whenever dispatch fails, before the 500 is sent.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DispatchError, &WebhookEvent) + Send + Sync + 'static,
    {
        self.receiver.set_error_callback(Arc::new(callback));
        self
    }

    /// Build an axum router serving `POST path` and `GET /health`.
    pub fn into_router(self, path: &str) -> axum::Router {
        axum::Router::new()
            .route("/health", get(health))
            .route(path, post(receive_webhook))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Webhook
// =============================================================================

/// Webhook response body.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResponse {
    fn received() -> Self {
        Self {
            received: Some(true),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            received: None,
            error: Some(message.into()),
        }
    }
}

/// Webhook endpoint.
pub async fn receive_webhook(
    State(adapter): State<HttpAdapter>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let headers = Headers::from(&headers);

    match adapter.receiver.receive(&body, &headers).await {
        Ok(()) => (StatusCode::OK, Json(WebhookResponse::received())),
        Err(AdapterError::Rejected(e)) => {
            (StatusCode::BAD_REQUEST, Json(WebhookResponse::error(e.to_string())))
        }
        // Handler details stay in the logs; the sender only needs to retry.
        Err(AdapterError::Dispatch(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(WebhookResponse::error("webhook dispatch failed")),
        ),
    }
}
