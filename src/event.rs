//! Event representation handed to the output by the host pipeline.
//!
//! An [`Event`] carries a timestamp, a map of structured fields, and the
//! delivery-criticality flag used to pick the severity of failure logs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the field read by the text serializer.
pub const MESSAGE_FIELD: &str = "Msg";

/// Structured field value.
///
/// Serialises untagged so every variant maps to its plain JSON form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    /// Integers above `i64::MAX`.
    Unsigned(u64),
    Float(f64),
    String(String),
    Array(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    fn as_object(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    Self::Unsigned(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// Immutable record submitted for delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
    guaranteed: bool,
}

impl Event {
    /// Create a best-effort event stamped with the current time.
    pub fn new(fields: BTreeMap<String, FieldValue>) -> Self {
        Self {
            timestamp: Utc::now(),
            fields,
            guaranteed: false,
        }
    }

    /// Create an event whose only field is [`MESSAGE_FIELD`].
    pub fn with_message(message: impl Into<FieldValue>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(MESSAGE_FIELD.to_owned(), message.into());
        Self::new(fields)
    }

    /// Override the event timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Add or replace a field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Mark the event as guaranteed (or best-effort).
    pub fn guaranteed(mut self, guaranteed: bool) -> Self {
        self.guaranteed = guaranteed;
        self
    }

    /// Whether delivery failures should be logged at error severity.
    pub fn is_guaranteed(&self) -> bool {
        self.guaranteed
    }

    /// Look up a field by key.
    ///
    /// The literal key is tried first; otherwise the key is treated as a
    /// dot-separated path into nested objects.
    pub fn get_value(&self, key: &str) -> Option<&FieldValue> {
        if let Some(value) = self.fields.get(key) {
            return Some(value);
        }
        let mut segments = key.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.timestamp.to_rfc3339(), self.fields)
    }
}
