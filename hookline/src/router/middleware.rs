//! Middleware pipeline.
//!
//! A middleware receives the event and a [`Next`] continuation. It can:
//! - call [`Next::run`] to continue, optionally with a replaced event
//! - return [`Next::reject`] (or any `Err`) to abort
//! - return `Ok(())` without the event reaching the end of the pipeline,
//!   which short-circuits and fails the dispatch with
//!   [`MiddlewareError::ShortCircuited`](crate::error::MiddlewareError)
//!
//! The whole pipeline completes before any handler runs. [`Next::run`]
//! returns once the remaining middleware has accepted the event; handler
//! outcomes are never visible to (and cannot be altered by) middleware.
//!
//! Middleware runs in registration order and holds no router state.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{info, warn};

use super::Router;
use crate::error::{DispatchError, MiddlewareError};
use crate::event::WebhookEvent;

pub trait Middleware: Send + Sync + 'static {
    /// Name reported in errors and logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn handle<'a>(
        &'a self,
        event: Arc<WebhookEvent>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), DispatchError>>;
}

/// Event that made it through every stage, waiting for handler fan-out.
pub(crate) type Delivered = Mutex<Option<Arc<WebhookEvent>>>;

/// Continuation handed to each middleware.
pub struct Next<'a> {
    pub(super) router: &'a Router,
    pub(super) index: usize,
    pub(super) middleware: &'a str,
    pub(super) delivered: &'a Delivered,
}

impl<'a> Next<'a> {
    /// Continue with the remaining middleware.
    ///
    /// Resolves once the rest of the pipeline has accepted `event`; the
    /// handlers run only after every middleware has returned.
    pub async fn run(self, event: Arc<WebhookEvent>) -> Result<(), DispatchError> {
        self.router
            .run_pipeline(self.index, event, self.delivered)
            .await
    }

    /// Build the error for an explicit abort by the current middleware.
    pub fn reject<M>(&self, reason: M) -> DispatchError
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        MiddlewareError::Rejected {
            middleware: self.middleware.to_string(),
            reason: anyhow::Error::msg(reason),
        }
        .into()
    }

    /// Name of the middleware holding this continuation.
    pub fn middleware(&self) -> &str {
        self.middleware
    }
}

/// Record the event leaving the last stage.
pub(super) fn deliver(delivered: &Delivered, event: Arc<WebhookEvent>) {
    *delivered.lock().unwrap_or_else(PoisonError::into_inner) = Some(event);
}

pub(super) fn is_delivered(delivered: &Delivered) -> bool {
    delivered
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

/// Middleware built from a closure by [`Router::use_fn`].
pub(super) struct FnMiddleware<F> {
    pub(super) name: String,
    pub(super) f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(Arc<WebhookEvent>, Next<'a>) -> BoxFuture<'a, Result<(), DispatchError>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(
        &'a self,
        event: Arc<WebhookEvent>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), DispatchError>> {
        (self.f)(event, next)
    }
}

/// Logs every event entering the pipeline and whether it got through.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn name(&self) -> &str {
        "tracing"
    }

    fn handle<'a>(
        &'a self,
        event: Arc<WebhookEvent>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            let event_id = event.id().to_string();
            let event_type = event.event_type().to_string();
            let started = Instant::now();

            info!(event_id = %event_id, event_type = %event_type, "event_received");

            let result = next.run(event).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok(()) => info!(
                    event_id = %event_id,
                    event_type = %event_type,
                    elapsed_ms = elapsed_ms,
                    "event_accepted"
                ),
                Err(e) => warn!(
                    event_id = %event_id,
                    event_type = %event_type,
                    elapsed_ms = elapsed_ms,
                    error = %e,
                    "event_stopped"
                ),
            }

            result
        })
    }
}
