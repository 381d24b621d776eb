//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Keyed document store abstraction."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Stored document representation.
pub type Document = serde_json::Value;

/// Predicate evaluated by [`Connection::delete_where`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Documents whose timestamp `field` is strictly earlier than `cutoff`.
    ///
    /// Documents missing the field, or holding something other than an
    /// RFC 3339 timestamp, never match.
    OlderThan {
        /// Name of the top-level timestamp field.
        field: String,
        /// Exclusive upper bound.
        cutoff: DateTime<Utc>,
    },
}

impl Filter {
    /// Build an [`Filter::OlderThan`] predicate.
    pub fn older_than(field: impl Into<String>, cutoff: DateTime<Utc>) -> Self {
        Self::OlderThan {
            field: field.into(),
            cutoff,
        }
    }

    /// Evaluate the predicate against a document.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::OlderThan { field, cutoff } => document
                .get(field)
                .and_then(|value| value.as_str())
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|stamp| stamp.with_timezone(&Utc) < *cutoff)
                .unwrap_or(false),
        }
    }
}

/// A checked-out store connection.
///
/// Implementations return the connection to its pool when dropped, so a
/// connection lives exactly as long as the operation holding it.
pub trait Connection {
    /// Fetch a document by key. Absence is `Ok(None)`, not an error.
    fn find_by_key(&mut self, collection: &str, key: &str) -> Result<Option<Document>>;

    /// Insert a new document, failing with `DuplicateKey` if the key exists.
    fn insert(&mut self, collection: &str, key: &str, document: Document) -> Result<()>;

    /// Insert or fully replace the document stored under `key`.
    fn upsert(&mut self, collection: &str, key: &str, document: Document) -> Result<()>;

    /// Remove every document matching `filter`, returning how many were removed.
    fn delete_where(&mut self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Declare a secondary index on `field`.
    fn ensure_index(&mut self, collection: &str, field: &str) -> Result<()>;

    /// Typed variant of [`Connection::find_by_key`].
    fn find_record<T>(&mut self, collection: &str, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        Self: Sized,
    {
        match self.find_by_key(collection, key)? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// Typed variant of [`Connection::insert`].
    fn insert_record<T>(&mut self, collection: &str, key: &str, record: &T) -> Result<()>
    where
        T: Serialize,
        Self: Sized,
    {
        let document = serde_json::to_value(record)?;
        self.insert(collection, key, document)
    }

    /// Typed variant of [`Connection::upsert`].
    fn upsert_record<T>(&mut self, collection: &str, key: &str, record: &T) -> Result<()>
    where
        T: Serialize,
        Self: Sized,
    {
        let document = serde_json::to_value(record)?;
        self.upsert(collection, key, document)
    }
}

/// Pool of store connections.
pub trait Store: Send + Sync {
    /// Connection type handed out by this store.
    type Connection: Connection;

    /// Check out a connection for the duration of one operation.
    fn connect(&self) -> Result<Self::Connection>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn older_than_matches_only_earlier_timestamps() {
        let now = Utc::now();
        let filter = Filter::older_than("collected", now - Duration::minutes(60));

        let stale = json!({ "collected": (now - Duration::minutes(90)).to_rfc3339() });
        let fresh = json!({ "collected": (now - Duration::minutes(10)).to_rfc3339() });
        assert!(filter.matches(&stale));
        assert!(!filter.matches(&fresh));
    }

    #[test]
    fn older_than_ignores_missing_or_malformed_fields() {
        let filter = Filter::older_than("end", Utc::now());
        assert!(!filter.matches(&json!({ "begin": "2020-01-01T00:00:00Z" })));
        assert!(!filter.matches(&json!({ "end": "yesterday" })));
        assert!(!filter.matches(&json!({ "end": 42 })));
    }

    #[test]
    fn boundary_is_exclusive() {
        let cutoff = Utc::now();
        let filter = Filter::older_than("collected", cutoff);
        assert!(!filter.matches(&json!({ "collected": cutoff.to_rfc3339() })));
    }
}
