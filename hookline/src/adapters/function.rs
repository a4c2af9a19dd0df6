//! Function-as-a-service adapter.
//!
//! The platform (e.g. an event bus rule targeting a function) guarantees
//! origin, so no signature is checked: the adapter validates the shape of
//! `detail`, dispatches, and returns `Err` on any failure so the platform's
//! own retry and dead-letter policy applies.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{AdapterError, Receiver};
use crate::error::{DispatchError, PayloadError, VerifyError};
use crate::event::WebhookEvent;
use crate::router::Router;
use crate::verify::StructuralVerifier;

/// Platform envelope delivered to the function.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionInvocation {
    /// Envelope id assigned by the platform (not the event id).
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "detail-type")]
    pub detail_type: Option<String>,
    /// The webhook event itself: `{ id, type, data }`.
    #[serde(default)]
    pub detail: Value,
}

/// Per-invocation metadata supplied by the platform runtime.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub request_id: String,
    pub function_name: String,
}

#[derive(Clone)]
pub struct FunctionAdapter {
    receiver: Receiver,
}

impl FunctionAdapter {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            receiver: Receiver::new(Arc::new(StructuralVerifier), router),
        }
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DispatchError, &WebhookEvent) + Send + Sync + 'static,
    {
        self.receiver.set_error_callback(Arc::new(callback));
        self
    }

    /// Handle one invocation. Any `Err` should be returned to the platform.
    pub async fn handle(
        &self,
        invocation: FunctionInvocation,
        context: &InvocationContext,
    ) -> Result<(), AdapterError> {
        info!(
            request_id = %context.request_id,
            function_name = %context.function_name,
            envelope_id = ?invocation.id,
            source = ?invocation.source,
            detail_type = ?invocation.detail_type,
            "function_invoked"
        );

        let event = match WebhookEvent::from_value(&invocation.detail) {
            Ok(event) => event,
            Err(e) => {
                warn!(request_id = %context.request_id, error = %e, "function_detail_invalid");
                return Err(VerifyError::from(e).into());
            }
        };

        self.receiver.dispatch(event).await
    }

    /// Handle an invocation given as raw JSON.
    pub async fn handle_json(
        &self,
        payload: &[u8],
        context: &InvocationContext,
    ) -> Result<(), AdapterError> {
        let invocation: FunctionInvocation = serde_json::from_slice(payload)
            .map_err(|e| VerifyError::from(PayloadError::from(e)))?;
        self.handle(invocation, context).await
    }
}
