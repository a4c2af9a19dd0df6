//! Router variant keyed by a closed set of event types.
//!
//! Registration takes an enum instead of a string, so a misspelled type is a
//! compile error. Dispatch is unchanged: events whose type is outside the set
//! are routed exactly like unregistered types on [`Router`] (a no-op).

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::{Middleware, Next, Router};
use crate::error::DispatchError;
use crate::event::WebhookEvent;

/// A known event type.
pub trait EventKind: Copy + Send + Sync + 'static {
    /// Wire discriminator, e.g. `"payment_intent.succeeded"`.
    fn as_str(self) -> &'static str;
}

pub struct TypedRouter<K> {
    inner: Router,
    _kind: PhantomData<fn() -> K>,
}

impl<K: EventKind> TypedRouter<K> {
    pub fn new() -> Self {
        Self {
            inner: Router::new(),
            _kind: PhantomData,
        }
    }

    pub fn on<F, Fut>(&mut self, kind: K, handler: F) -> &mut Self
    where
        F: Fn(Arc<WebhookEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.on(kind.as_str(), handler);
        self
    }

    pub fn on_named<F, Fut>(&mut self, kind: K, name: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<WebhookEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.on_named(kind.as_str(), name, handler);
        self
    }

    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.inner.use_middleware(middleware);
        self
    }

    pub fn use_fn<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: for<'a> Fn(Arc<WebhookEvent>, Next<'a>) -> BoxFuture<'a, Result<(), DispatchError>>
            + Send
            + Sync
            + 'static,
    {
        self.inner.use_fn(name, f);
        self
    }

    pub fn handler_count(&self, kind: K) -> usize {
        self.inner.handler_count(kind.as_str())
    }

    pub async fn dispatch(&self, event: WebhookEvent) -> Result<(), DispatchError> {
        self.inner.dispatch(event).await
    }

    /// Untyped view, for adapters that take a [`Router`].
    pub fn into_inner(self) -> Router {
        self.inner
    }
}

impl<K: EventKind> Default for TypedRouter<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EventKind> From<TypedRouter<K>> for Router {
    fn from(router: TypedRouter<K>) -> Self {
        router.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    enum Payment {
        Succeeded,
        Failed,
    }

    impl EventKind for Payment {
        fn as_str(self) -> &'static str {
            match self {
                Payment::Succeeded => "payment_intent.succeeded",
                Payment::Failed => "payment_intent.payment_failed",
            }
        }
    }

    fn event(event_type: &str) -> WebhookEvent {
        WebhookEvent::from_value(&json!({"id": "evt_1", "type": event_type, "data": {}})).unwrap()
    }

    #[tokio::test]
    async fn test_typed_routing_matches_string_routing() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut router = TypedRouter::<Payment>::new();

        let sink = Arc::clone(&calls);
        router.on(Payment::Succeeded, move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(event.event_type().to_string());
                Ok(())
            }
        });

        router.dispatch(event("payment_intent.succeeded")).await.unwrap();
        router.dispatch(event("payment_intent.payment_failed")).await.unwrap();
        router.dispatch(event("customer.created")).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["payment_intent.succeeded"]);
        assert_eq!(router.handler_count(Payment::Succeeded), 1);
        assert_eq!(router.handler_count(Payment::Failed), 0);
    }

    #[test]
    fn test_into_router() {
        let mut router = TypedRouter::<Payment>::new();
        router.on_named(Payment::Failed, "notify", |_event| async { Ok(()) });

        let router: Router = router.into();
        assert_eq!(router.event_types(), vec!["payment_intent.payment_failed"]);
    }
}
