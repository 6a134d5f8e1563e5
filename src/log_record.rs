//! Log record representation accepted by the transport.
//!
//! A [`LogRecord`] is an arbitrary JSON object. Well-known keys such as
//! `level`, `message` and `timestamp` sit alongside any caller-defined fields;
//! the transport never interprets them beyond merging static metadata in.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding the record's severity.
pub const LEVEL_KEY: &str = "level";
/// Key holding the record's human-readable message.
pub const MESSAGE_KEY: &str = "message";

/// Structured log entry supplied by a caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord {
    fields: Map<String, Value>,
}

impl LogRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a record carrying `level` and `message`.
    pub fn with_message(level: &str, message: impl Into<String>) -> Self {
        Self::new()
            .with_field(LEVEL_KEY, level)
            .with_field(MESSAGE_KEY, message.into())
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key` to `value`, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Look up a field by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, Value>> for LogRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Non-object values are wrapped under the `message` key.
impl From<Value> for LogRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            other => Self::new().with_field(MESSAGE_KEY, other),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = self.get(LEVEL_KEY).and_then(Value::as_str).unwrap_or("-");
        match self.get(MESSAGE_KEY) {
            Some(Value::String(message)) => write!(f, "{level} - {message}"),
            Some(other) => write!(f, "{level} - {other}"),
            None => write!(f, "{level} - "),
        }
    }
}
