//! Hookline - verified webhook intake and typed event routing.
//!
//! This library provides the shared modules for the two Hookline binaries:
//! - `hookline-web`: HTTP server receiving signed webhooks
//! - `hookline-consumer`: RabbitMQ consumer receiving webhook events
//!
//! ## Architecture
//!
//! ```text
//! transport → Verifier → WebhookEvent → middleware (in order) → handlers[type] → outcome
//! ```
//!
//! The [`Router`] is transport-agnostic; adapters only translate a native
//! delivery into `(raw body, headers)` and the router's outcome back into a
//! status code or acknowledgement.

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod event;
pub mod headers;
pub mod router;
pub mod verify;

// Re-export commonly used types
pub use adapters::{AdapterError, BusAdapter, FunctionAdapter, HttpAdapter};
pub use config::Config;
pub use error::{
    DispatchError, HandlerErrors, MiddlewareError, PayloadError, VerificationError, VerifyError,
};
pub use event::{VerifyResult, WebhookEvent};
pub use headers::Headers;
pub use router::{EventKind, Middleware, Next, Router, TracingMiddleware, TypedRouter};
pub use verify::{SignatureVerifier, StructuralVerifier, Verifier};
