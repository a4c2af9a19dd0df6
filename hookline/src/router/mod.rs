//! Event router: middleware pipeline followed by handler fan-out.
//!
//! ## Dispatch
//!
//! ```text
//! event → middleware[0] → … → middleware[n] ⇒ handlers[event.type] (in order)
//! ```
//!
//! 1. Middleware runs in registration order; an abort or error in any stage
//!    stops the dispatch before a single handler runs.
//! 2. Handlers start only once every middleware has returned `Ok`, and they
//!    receive the event as it left the last stage. Middleware never sees
//!    handler results.
//! 3. Handlers for the event type run sequentially in registration order.
//!    A failing (or panicking) handler does not stop its siblings; every
//!    failure is collected into one [`HandlerErrors`].
//! 4. An event type with no handlers is a successful no-op.
//!
//! Registration takes `&mut self` and dispatch takes `&self`, so once a
//! router is shared behind an `Arc` it is read-only and concurrent
//! dispatches need no locking.

pub mod middleware;
pub mod registry;
pub mod typed;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, info_span, Instrument};

use crate::error::{DispatchError, HandlerErrors, HandlerFailure, MiddlewareError};
use crate::event::WebhookEvent;

pub use middleware::{Middleware, Next, TracingMiddleware};
pub use registry::{BoxHandler, HandlerRegistry, RegisteredHandler};
pub use typed::{EventKind, TypedRouter};

use middleware::{deliver, is_delivered, Delivered, FnMiddleware};

#[derive(Default)]
pub struct Router {
    registry: HandlerRegistry,
    middleware: Vec<Box<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event_type`.
    ///
    /// Repeated registrations for the same type accumulate and run in the
    /// order they were added. Types are not validated against any schema.
    ///
    /// # Panics
    ///
    /// Panics if `event_type` is empty.
    pub fn on<F, Fut>(&mut self, event_type: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<WebhookEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(event_type, None, handler)
    }

    /// Like [`Router::on`], with a label used in logs and errors.
    pub fn on_named<F, Fut>(&mut self, event_type: &str, name: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<WebhookEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(event_type, Some(name.to_string()), handler)
    }

    fn register<F, Fut>(&mut self, event_type: &str, label: Option<String>, handler: F) -> &mut Self
    where
        F: Fn(Arc<WebhookEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        assert!(!event_type.is_empty(), "event type must not be empty");

        let handler: BoxHandler =
            Arc::new(move |event: Arc<WebhookEvent>| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(handler(event))
            });
        self.registry.register(event_type, label, handler);
        self
    }

    /// Append a middleware to the pipeline.
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Append a closure middleware to the pipeline.
    ///
    /// ```rust,no_run
    /// # let mut router = hookline::Router::new();
    /// router.use_fn("drop-test-events", |event, next| {
    ///     Box::pin(async move {
    ///         if event.id().starts_with("evt_test_") {
    ///             return Err(next.reject("test event"));
    ///         }
    ///         next.run(event).await
    ///     })
    /// });
    /// ```
    pub fn use_fn<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: for<'a> Fn(Arc<WebhookEvent>, Next<'a>) -> BoxFuture<'a, Result<(), DispatchError>>
            + Send
            + Sync
            + 'static,
    {
        self.use_middleware(FnMiddleware {
            name: name.to_string(),
            f,
        })
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.registry.handler_count(event_type)
    }

    pub fn event_types(&self) -> Vec<&str> {
        self.registry.event_types()
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// Route one verified event through the pipeline and its handlers.
    ///
    /// Succeeds only if no middleware aborted and every matched handler
    /// returned `Ok`.
    pub async fn dispatch(&self, event: WebhookEvent) -> Result<(), DispatchError> {
        self.dispatch_shared(Arc::new(event)).await
    }

    /// Like [`Router::dispatch`], for callers that keep their own handle
    /// on the event.
    pub async fn dispatch_shared(&self, event: Arc<WebhookEvent>) -> Result<(), DispatchError> {
        let span = info_span!(
            "dispatch",
            event_id = %event.id(),
            event_type = %event.event_type()
        );

        async move {
            let delivered: Delivered = Mutex::new(None);
            self.run_pipeline(0, event, &delivered).await?;

            let event = delivered
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .ok_or_else(|| MiddlewareError::ShortCircuited {
                    middleware: self
                        .middleware
                        .first()
                        .map_or("pipeline", |m| m.name())
                        .to_string(),
                })?;

            self.fan_out(event).await
        }
        .instrument(span)
        .await
    }

    /// Run middleware from `index` onward. Resolves `Ok` once the event has
    /// passed the last stage and been stored in `delivered`.
    pub(crate) fn run_pipeline<'a>(
        &'a self,
        index: usize,
        event: Arc<WebhookEvent>,
        delivered: &'a Delivered,
    ) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            let Some(middleware) = self.middleware.get(index) else {
                deliver(delivered, event);
                return Ok(());
            };

            let name = middleware.name();
            let next = Next {
                router: self,
                index: index + 1,
                middleware: name,
                delivered,
            };

            let outcome = AssertUnwindSafe(async { middleware.handle(event, next).await })
                .catch_unwind()
                .await;

            match outcome {
                // Returned Ok without the event reaching the end: either
                // `next` was never called or its error was swallowed.
                Ok(Ok(())) if !is_delivered(delivered) => {
                    debug!(middleware = %name, "middleware_short_circuited");
                    Err(MiddlewareError::ShortCircuited {
                        middleware: name.to_string(),
                    }
                    .into())
                }
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(middleware = %name, panic = %message, "middleware_panicked");
                    Err(MiddlewareError::Panicked {
                        middleware: name.to_string(),
                        message,
                    }
                    .into())
                }
            }
        })
    }

    async fn fan_out(&self, event: Arc<WebhookEvent>) -> Result<(), DispatchError> {
        let handlers = self.registry.handlers_for(event.event_type());
        if handlers.is_empty() {
            debug!("event_unhandled");
            return Ok(());
        }

        let mut failures = Vec::new();

        for registered in handlers {
            let pending = Arc::clone(&event);
            let outcome = AssertUnwindSafe(async { (registered.handler)(pending).await })
                .catch_unwind()
                .await;

            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(panic) => anyhow::anyhow!("handler panicked: {}", panic_message(panic.as_ref())),
            };

            error!(handler = %registered.label, error = %format!("{error:#}"), "handler_failed");
            failures.push(HandlerFailure {
                handler: registered.label.clone(),
                error,
            });
        }

        debug!(
            handlers = handlers.len(),
            failed = failures.len(),
            "handlers_completed"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HandlerErrors {
                event_id: event.id().to_string(),
                event_type: event.event_type().to_string(),
                invoked: handlers.len(),
                failures,
            }
            .into())
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let middleware: Vec<&str> = self.middleware.iter().map(|m| m.name()).collect();
        f.debug_struct("Router")
            .field("middleware", &middleware)
            .field("handlers", &self.registry)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
