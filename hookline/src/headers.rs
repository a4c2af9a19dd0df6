//! Case-insensitive header mapping handed to verifiers.
//!
//! Every transport extracts its headers into this one shape so the same
//! [`Verifier`](crate::verify::Verifier) works behind HTTP, a function
//! platform or a message bus.

use std::collections::HashMap;

use axum::http::HeaderMap;
use lapin::types::{AMQPValue, FieldTable};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value under the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Look up a header by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Non-UTF-8 header values are dropped; no signature scheme uses them.
impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        map.iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect()
    }
}

/// Only string-like AMQP header values are carried over.
impl From<&FieldTable> for Headers {
    fn from(table: &FieldTable) -> Self {
        table
            .inner()
            .iter()
            .filter_map(|(name, value)| {
                let value = match value {
                    AMQPValue::LongString(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
                    AMQPValue::ShortString(s) => s.as_str().to_string(),
                    _ => return None,
                };
                Some((name.as_str().to_string(), value))
            })
            .collect()
    }
}
