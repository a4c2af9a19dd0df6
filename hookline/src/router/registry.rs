//! Handler registry: event type to ordered handler list.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::event::WebhookEvent;

/// Type-erased handler stored in the registry.
///
/// Handlers share the dispatched event through an `Arc`, so fan-out to many
/// handlers never copies the payload.
pub type BoxHandler =
    Arc<dyn Fn(Arc<WebhookEvent>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Clone)]
pub struct RegisteredHandler {
    /// Label used in logs and in [`HandlerErrors`](crate::error::HandlerErrors).
    pub label: String,
    pub handler: BoxHandler,
}

/// Maps event types to handlers in registration order.
///
/// Entries are created lazily on first registration; looking up a type that
/// was never registered yields an empty slice.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<RegisteredHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event_type`.
    ///
    /// Without a label the handler is named `"<type>#<position>"`.
    pub fn register(&mut self, event_type: &str, label: Option<String>, handler: BoxHandler) {
        let entry = self.handlers.entry(event_type.to_string()).or_default();
        let label = label.unwrap_or_else(|| format!("{}#{}", event_type, entry.len()));
        entry.push(RegisteredHandler { label, handler });
    }

    pub fn handlers_for(&self, event_type: &str) -> &[RegisteredHandler] {
        self.handlers
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers_for(event_type).len()
    }

    /// Registered event types, sorted.
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for event_type in self.event_types() {
            let labels: Vec<&str> = self
                .handlers_for(event_type)
                .iter()
                .map(|h| h.label.as_str())
                .collect();
            map.entry(&event_type, &labels);
        }
        map.finish()
    }
}
