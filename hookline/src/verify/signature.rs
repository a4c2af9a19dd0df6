//! HMAC-SHA256 webhook signature verification.
//!
//! Senders sign `"{timestamp}.{body}"` with a shared secret and send the
//! result in the `Hookline-Signature` header:
//!
//! ```text
//! Hookline-Signature: t=1700000000,v1=5257a869e7ecebeda32affa62cdca3fa51cad7e77a0e56ff536d0ce8e108d8bd
//! ```
//!
//! Several `v1` entries may be present while a secret is being rotated; any
//! match is accepted. Unknown keys are ignored. The timestamp must fall
//! within the configured tolerance of the local clock (prevents replay).

use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use super::{parse_payload, Verifier};
use crate::error::{VerificationError, VerifyError};
use crate::event::VerifyResult;
use crate::headers::Headers;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "hookline-signature";

/// Default tolerance for signature timestamps, in seconds.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Verifier for HMAC-signed payloads.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance_secs: u64,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: u64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Check `raw` against the signature header as of `now` (unix seconds).
    pub fn check(
        &self,
        raw: &[u8],
        headers: &Headers,
        now: u64,
    ) -> Result<(), VerificationError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .ok_or(VerificationError::MissingSignature(SIGNATURE_HEADER))?;

        let parsed = parse_signature_header(header)?;

        let age = now.abs_diff(parsed.timestamp);
        if age > self.tolerance_secs {
            warn!(
                webhook_time = parsed.timestamp,
                current_time = now,
                age_seconds = age,
                tolerance_seconds = self.tolerance_secs,
                "signature_stale"
            );
            return Err(VerificationError::StaleTimestamp {
                age_secs: age,
                tolerance_secs: self.tolerance_secs,
            });
        }

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| VerificationError::MalformedSignature("unusable signing key".to_string()))?;
        mac.update(parsed.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(raw);

        // verify_slice compares in constant time
        let matched = parsed
            .signatures
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok());

        if !matched {
            warn!(
                candidates = parsed.signatures.len(),
                body_length = raw.len(),
                "signature_mismatch"
            );
            return Err(VerificationError::SignatureMismatch);
        }

        Ok(())
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl Verifier for SignatureVerifier {
    fn verify<'a>(
        &'a self,
        raw: &'a [u8],
        headers: &'a Headers,
    ) -> BoxFuture<'a, Result<VerifyResult, VerifyError>> {
        Box::pin(async move {
            // Authenticate the exact bytes before parsing anything.
            self.check(raw, headers, unix_now())?;
            Ok(parse_payload(raw)?)
        })
    }
}

struct SignatureHeader {
    timestamp: u64,
    signatures: Vec<Vec<u8>>,
}

fn parse_signature_header(header: &str) -> Result<SignatureHeader, VerificationError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(VerificationError::MalformedSignature(format!(
                "expected key=value, got `{}`",
                part.trim()
            )));
        };

        match key {
            "t" => {
                let parsed = value.parse::<u64>().map_err(|_| {
                    VerificationError::MalformedSignature(format!("invalid timestamp `{value}`"))
                })?;
                timestamp = Some(parsed);
            }
            "v1" => {
                let decoded = hex::decode(value).map_err(|_| {
                    VerificationError::MalformedSignature("v1 signature is not hex".to_string())
                })?;
                signatures.push(decoded);
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| VerificationError::MalformedSignature("missing timestamp".to_string()))?;

    if signatures.is_empty() {
        return Err(VerificationError::MalformedSignature(
            "no v1 signature".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Produce a `Hookline-Signature` header value for `body`.
pub fn sign(secret: &[u8], timestamp: u64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadError;

    const SECRET: &[u8] = b"whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"x.done","data":{"k":1}}"#;
    const NOW: u64 = 1_700_000_000;

    fn headers_with(value: &str) -> Headers {
        [("Hookline-Signature", value)].into_iter().collect()
    }

    #[test]
    fn test_check_valid() {
        let verifier = SignatureVerifier::new(SECRET);
        let headers = headers_with(&sign(SECRET, NOW, BODY));

        assert!(verifier.check(BODY, &headers, NOW).is_ok());
        assert!(verifier.check(BODY, &headers, NOW + 299).is_ok());
    }

    #[test]
    fn test_check_missing_header() {
        let verifier = SignatureVerifier::new(SECRET);
        let err = verifier.check(BODY, &Headers::new(), NOW).unwrap_err();

        assert!(matches!(err, VerificationError::MissingSignature(_)));
    }

    #[test]
    fn test_check_malformed_headers() {
        let verifier = SignatureVerifier::new(SECRET);

        for value in ["garbage", "t=abc,v1=00", "v1=00", "t=1700000000", "t=1700000000,v1=zz"] {
            let err = verifier.check(BODY, &headers_with(value), NOW).unwrap_err();
            assert!(
                matches!(err, VerificationError::MalformedSignature(_)),
                "{value} => {err:?}"
            );
        }
    }

    #[test]
    fn test_check_stale() {
        let verifier = SignatureVerifier::new(SECRET).with_tolerance(60);
        let headers = headers_with(&sign(SECRET, NOW - 61, BODY));

        let err = verifier.check(BODY, &headers, NOW).unwrap_err();
        assert!(matches!(
            err,
            VerificationError::StaleTimestamp {
                age_secs: 61,
                tolerance_secs: 60
            }
        ));
    }

    #[test]
    fn test_check_future_timestamp_rejected() {
        let verifier = SignatureVerifier::new(SECRET);
        let headers = headers_with(&sign(SECRET, NOW + 3600, BODY));

        assert!(verifier.check(BODY, &headers, NOW).is_err());
    }

    #[test]
    fn test_check_wrong_secret() {
        let verifier = SignatureVerifier::new(SECRET);
        let headers = headers_with(&sign(b"other", NOW, BODY));

        let err = verifier.check(BODY, &headers, NOW).unwrap_err();
        assert!(matches!(err, VerificationError::SignatureMismatch));
    }

    #[test]
    fn test_check_tampered_body() {
        let verifier = SignatureVerifier::new(SECRET);
        let headers = headers_with(&sign(SECRET, NOW, BODY));
        let tampered = br#"{"id":"evt_1","type":"x.done","data":{"k":2}}"#;

        let err = verifier.check(tampered, &headers, NOW).unwrap_err();
        assert!(matches!(err, VerificationError::SignatureMismatch));
    }

    #[test]
    fn test_check_rotated_secret() {
        let verifier = SignatureVerifier::new(SECRET);
        let old = sign(b"old-secret", NOW, BODY);
        let current = sign(SECRET, NOW, BODY);
        let current_sig = current.split_once("v1=").unwrap().1;
        let header = format!("{old},v1={current_sig},v0=ignored");

        assert!(verifier.check(BODY, &headers_with(&header), NOW).is_ok());
    }

    #[tokio::test]
    async fn test_verify_parses_after_signature() {
        let verifier = SignatureVerifier::new(SECRET);
        let headers = headers_with(&sign(SECRET, unix_now(), BODY));

        let result = verifier.verify(BODY, &headers).await.unwrap();
        assert_eq!(result.event.id(), "evt_1");
        assert_eq!(result.event.event_type(), "x.done");
    }

    #[tokio::test]
    async fn test_verify_signed_but_malformed_payload() {
        let verifier = SignatureVerifier::new(SECRET);
        let body = br#"{"id":"evt_1","type":"x.done"}"#;
        let headers = headers_with(&sign(SECRET, unix_now(), body));

        let err = verifier.verify(body, &headers).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Payload(PayloadError::MissingField("data"))
        ));
    }

    #[tokio::test]
    async fn test_verify_unsigned_never_parses() {
        let verifier = SignatureVerifier::new(SECRET);
        let err = verifier.verify(b"not json", &Headers::new()).await.unwrap_err();

        assert!(matches!(err, VerifyError::Verification(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", SignatureVerifier::new(SECRET));
        assert!(!debug.contains("whsec_test"));
    }
}
