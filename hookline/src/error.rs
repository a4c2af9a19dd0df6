//! Error kinds shared by verifiers, the router and the transport adapters.
//!
//! - [`VerifyError`]: raised before an event exists; adapters answer with a
//!   4xx-equivalent and never dispatch.
//! - [`DispatchError`]: raised by [`Router::dispatch`](crate::Router::dispatch);
//!   adapters answer with a 5xx-equivalent.

use std::fmt;

use thiserror::Error;

/// The request could not be authenticated.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("missing {0} header")]
    MissingSignature(&'static str),

    #[error("malformed signature header: {0}")]
    MalformedSignature(String),

    #[error("signature timestamp outside tolerance ({age_secs}s old, tolerance {tolerance_secs}s)")]
    StaleTimestamp { age_secs: u64, tolerance_secs: u64 },

    #[error("signature does not match payload")]
    SignatureMismatch,
}

/// The payload is not a structurally valid event.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// Failure of a [`Verifier`](crate::verify::Verifier).
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("invalid payload: {0}")]
    Payload(#[from] PayloadError),
}

/// A pipeline stage stopped the event before any handler ran.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("middleware `{middleware}` rejected event: {reason}")]
    Rejected {
        middleware: String,
        reason: anyhow::Error,
    },

    #[error("middleware `{middleware}` short-circuited the pipeline")]
    ShortCircuited { middleware: String },

    #[error("middleware `{middleware}` panicked: {message}")]
    Panicked { middleware: String, message: String },
}

/// One handler that failed during a dispatch.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: anyhow::Error,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.handler, self.error)
    }
}

/// Every handler failure collected for a single dispatch.
#[derive(Debug)]
pub struct HandlerErrors {
    pub event_id: String,
    pub event_type: String,
    /// Handlers that ran for this event, failed or not.
    pub invoked: usize,
    pub failures: Vec<HandlerFailure>,
}

impl HandlerErrors {
    /// Labels of the failing handlers, in dispatch order.
    pub fn handlers(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.handler.as_str()).collect()
    }
}

impl fmt::Display for HandlerErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} handlers failed for `{}` ({})",
            self.failures.len(),
            self.invoked,
            self.event_type,
            self.event_id
        )?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HandlerErrors {}

/// Failure of [`Router::dispatch`](crate::Router::dispatch).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error(transparent)]
    Handlers(#[from] HandlerErrors),
}
