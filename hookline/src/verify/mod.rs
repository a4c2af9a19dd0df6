//! Verifier contract: untrusted bytes in, trusted [`WebhookEvent`] out.
//!
//! A verifier is the only place authenticity is enforced. It receives the
//! unparsed wire body (signature schemes are byte-exact) and the request
//! headers, and it is transport-agnostic: the HTTP, function and bus
//! adapters all hand it the same `(&[u8], &Headers)` pair.
//!
//! - [`SignatureVerifier`]: HMAC-SHA256 over timestamp + body
//! - [`StructuralVerifier`]: shape checks only, for platforms that already
//!   guarantee origin

pub mod signature;

use std::sync::Arc;

use futures::future::{self, BoxFuture};
use serde_json::Value;

use crate::error::{PayloadError, VerifyError};
use crate::event::{VerifyResult, WebhookEvent};
use crate::headers::Headers;

pub use signature::{sign, SignatureVerifier, SIGNATURE_HEADER};

/// Converts a raw inbound payload into a verified event.
///
/// Implementations must be free of side effects.
pub trait Verifier: Send + Sync {
    fn verify<'a>(
        &'a self,
        raw: &'a [u8],
        headers: &'a Headers,
    ) -> BoxFuture<'a, Result<VerifyResult, VerifyError>>;
}

impl<V: Verifier + ?Sized> Verifier for Arc<V> {
    fn verify<'a>(
        &'a self,
        raw: &'a [u8],
        headers: &'a Headers,
    ) -> BoxFuture<'a, Result<VerifyResult, VerifyError>> {
        (**self).verify(raw, headers)
    }
}

/// Parse a payload into a [`VerifyResult`], keeping the full document as `raw`.
pub fn parse_payload(raw: &[u8]) -> Result<VerifyResult, PayloadError> {
    let document: Value = serde_json::from_slice(raw)?;
    let event = WebhookEvent::from_value(&document)?;
    Ok(VerifyResult::with_raw(event, document))
}

/// Verifier that only checks payload shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralVerifier;

impl Verifier for StructuralVerifier {
    fn verify<'a>(
        &'a self,
        raw: &'a [u8],
        _headers: &'a Headers,
    ) -> BoxFuture<'a, Result<VerifyResult, VerifyError>> {
        Box::pin(future::ready(parse_payload(raw).map_err(VerifyError::from)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_structural_verifier_accepts_valid_payload() {
        let body = br#"{"id":"evt_1","type":"x.done","data":{"k":1},"livemode":false}"#;
        let result = StructuralVerifier.verify(body, &Headers::new()).await.unwrap();

        assert_eq!(result.event.id(), "evt_1");
        assert_eq!(result.event.event_type(), "x.done");
        assert_eq!(result.event.data(), &json!({"k": 1}));
        assert_eq!(result.raw.unwrap()["livemode"], json!(false));
    }

    #[tokio::test]
    async fn test_structural_verifier_rejects_missing_data() {
        let body = br#"{"id":"evt_1","type":"x.done"}"#;
        let err = StructuralVerifier.verify(body, &Headers::new()).await.unwrap_err();

        assert!(matches!(
            err,
            VerifyError::Payload(PayloadError::MissingField("data"))
        ));
    }

    #[tokio::test]
    async fn test_arc_dyn_verifier() {
        let verifier: Arc<dyn Verifier> = Arc::new(StructuralVerifier);
        let body = br#"{"id":"evt_1","type":"a","data":{}}"#;

        assert!(verifier.verify(body, &Headers::new()).await.is_ok());
    }
}
