//! Default wiring used by the bundled binaries.
//!
//! Registers request logging and handlers for the payment lifecycle events
//! the service acts on. Everything else is received and acknowledged.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::router::{EventKind, TracingMiddleware, TypedRouter};
use crate::verify::{SignatureVerifier, StructuralVerifier, Verifier};
use crate::Router;

/// Payment events handled by the default router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded,
    Failed,
    Refunded,
}

impl EventKind for PaymentEvent {
    fn as_str(self) -> &'static str {
        match self {
            PaymentEvent::Succeeded => "payment_intent.succeeded",
            PaymentEvent::Failed => "payment_intent.payment_failed",
            PaymentEvent::Refunded => "charge.refunded",
        }
    }
}

/// Build the router served by the binaries.
pub fn default_router() -> Router {
    let mut router = TypedRouter::<PaymentEvent>::new();
    router.use_middleware(TracingMiddleware);

    router.on_named(PaymentEvent::Succeeded, "record_payment", |event| async move {
        info!(
            event_id = %event.id(),
            amount = ?event.data().get("amount"),
            currency = ?event.data().get("currency"),
            "payment_succeeded"
        );
        Ok(())
    });

    router.on_named(PaymentEvent::Failed, "flag_failed_payment", |event| async move {
        warn!(
            event_id = %event.id(),
            reason = ?event.data().get("failure_message"),
            "payment_failed"
        );
        Ok(())
    });

    router.on_named(PaymentEvent::Refunded, "record_refund", |event| async move {
        info!(
            event_id = %event.id(),
            amount_refunded = ?event.data().get("amount_refunded"),
            "charge_refunded"
        );
        Ok(())
    });

    router.into_inner()
}

/// Pick the verifier for the configured environment.
///
/// Without a signing secret only payload shape is checked.
pub fn verifier(config: &Config) -> Arc<dyn Verifier> {
    match &config.signing_secret {
        Some(secret) => Arc::new(
            SignatureVerifier::new(secret.as_bytes())
                .with_tolerance(config.signature_tolerance_secs),
        ),
        None => {
            warn!("signature_verification_disabled");
            Arc::new(StructuralVerifier)
        }
    }
}
