//! Stored document types.
//!
//! This module defines the [`Document`] type, which wraps a JSON payload with
//! the persistence metadata every document store keeps: collection, id,
//! version and timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON document with persistence metadata.
///
/// The version starts at 1 and increases by one on every write. It is the
/// basis of optimistic locking: writers carry the version they observed and
/// the store refuses the write when it no longer matches.
///
/// # Examples
///
/// ```
/// use tandem_persistence::types::Document;
/// use serde_json::json;
///
/// let doc = Document::new("users", "u1", json!({"email": "a@example.com"}));
/// assert_eq!(doc.version(), 1);
/// assert_eq!(doc.field_str("email"), Some("a@example.com"));
///
/// let next = doc.next_version(json!({"email": "b@example.com"}));
/// assert_eq!(next.version(), 2);
/// assert_eq!(next.created_at(), doc.created_at());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    collection: String,
    id: String,
    version: u64,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Document {
    /// Creates the first version of a document.
    pub fn new(collection: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        let now = Utc::now();
        Self {
            collection: collection.into(),
            id: id.into(),
            version: 1,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a document from stored parts.
    pub fn from_parts(
        collection: impl Into<String>,
        id: impl Into<String>,
        version: u64,
        data: Value,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            version,
            data,
            created_at,
            updated_at,
        }
    }

    /// Returns the successor of this document carrying new data.
    pub fn next_version(&self, data: Value) -> Self {
        Self {
            collection: self.collection.clone(),
            id: self.id.clone(),
            version: self.version + 1,
            data,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the JSON payload.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Consumes the document and returns its payload.
    pub fn into_data(self) -> Value {
        self.data
    }

    /// Returns when the document was first created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the document was last written.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns a top-level string field.
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Returns whether a top-level field holds the given value.
    ///
    /// Strings compare directly, numbers and booleans by their JSON text.
    pub fn field_matches(&self, field: &str, value: &str) -> bool {
        field_value_matches(self.data.get(field), value)
    }
}

pub(crate) fn field_value_matches(field: Option<&Value>, value: &str) -> bool {
    match field {
        Some(Value::String(s)) => s == value,
        Some(Value::Number(n)) => n.to_string() == value,
        Some(Value::Bool(b)) => b.to_string() == value,
        _ => false,
    }
}
