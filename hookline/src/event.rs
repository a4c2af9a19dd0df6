//! Canonical webhook event model.
//!
//! A [`WebhookEvent`] is the trusted, typed form of a provider notification.
//! Its fields are private and it can only be built through
//! [`WebhookEvent::from_value`] / [`WebhookEvent::from_slice`], which enforce
//! the structural rules every verifier relies on:
//!
//! - `id`: non-empty string
//! - `type`: non-empty string (dot-delimited discriminator)
//! - `data`: JSON object

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PayloadError;

/// A verified webhook occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: Value,
}

impl WebhookEvent {
    /// Build an event from an already-parsed JSON document.
    ///
    /// Unknown top-level fields are ignored; they survive in
    /// [`VerifyResult::raw`] when the verifier keeps the document.
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let object = value.as_object().ok_or(PayloadError::NotAnObject)?;

        let id = required_string(object, "id")?;
        let event_type = required_string(object, "type")?;
        let data = match object.get("data") {
            None | Some(Value::Null) => return Err(PayloadError::MissingField("data")),
            Some(data @ Value::Object(_)) => data.clone(),
            Some(_) => {
                return Err(PayloadError::InvalidField {
                    field: "data",
                    expected: "an object",
                })
            }
        };

        Ok(Self {
            id,
            event_type,
            data,
        })
    }

    /// Parse raw JSON bytes into an event.
    pub fn from_slice(raw: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(raw)?;
        Self::from_value(&value)
    }

    /// Provider-assigned identifier, unique per occurrence.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Discriminator used for routing, e.g. `payment_intent.succeeded`.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Opaque payload; its shape is keyed by the event type.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Return a copy of this event carrying a different payload.
    ///
    /// `id` and `type` are carried over unchanged, so a middleware that
    /// enriches the payload can never alter routing.
    pub fn with_data(&self, data: Map<String, Value>) -> Self {
        Self {
            id: self.id.clone(),
            event_type: self.event_type.clone(),
            data: Value::Object(data),
        }
    }
}

fn required_string(object: &Map<String, Value>, field: &'static str) -> Result<String, PayloadError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(PayloadError::MissingField(field)),
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(_) => Err(PayloadError::InvalidField {
            field,
            expected: "a non-empty string",
        }),
    }
}

/// Output of a [`Verifier`](crate::verify::Verifier).
#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub event: WebhookEvent,
    /// Full provider document, for handlers that need fields beyond
    /// `id`/`type`/`data`.
    pub raw: Option<Value>,
}

impl VerifyResult {
    pub fn new(event: WebhookEvent) -> Self {
        Self { event, raw: None }
    }

    pub fn with_raw(event: WebhookEvent, raw: Value) -> Self {
        Self {
            event,
            raw: Some(raw),
        }
    }
}
