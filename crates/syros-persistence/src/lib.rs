//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Persistence facade for collected inventory and health checks."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
//! Write-path persistence for the syros indexer.
//!
//! Health checks go through the transition protocol: every write compares the
//! incoming status with the stored one, appends an audit entry to the check log
//! when it changed, and maintains the `since` timestamp. Everything else is a
//! plain keyed upsert. The retention sweeper bounds storage growth.

use std::time::Duration;

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Error type for the persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Wrapper for IO errors encountered while reading/writing collection files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper for Prometheus metrics registration failures.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    /// An insert targeted a key that already exists.
    #[error("duplicate key {key} in {collection}")]
    DuplicateKey {
        /// Collection the insert targeted.
        collection: String,
        /// Conflicting key.
        key: String,
    },
    /// No pooled connection became available in time.
    #[error("no store connection available within {timeout:?}")]
    PoolTimeout {
        /// How long the caller waited.
        timeout: Duration,
    },
    /// Collection names double as file names and must stay within `[a-z0-9_]`.
    #[error("invalid collection name {0:?}")]
    InvalidCollection(String),
    /// A configured collection name is not part of the catalogue.
    #[error("unknown collection {0:?}")]
    UnknownCollection(String),
    /// A collection file line could not be decoded.
    #[error("corrupt record in {collection} at line {line}: {reason}")]
    Corrupt {
        /// Collection whose file is damaged.
        collection: String,
        /// One-based line number.
        line: usize,
        /// Decoder message.
        reason: String,
    },
}

pub mod checks;
pub mod collections;
pub mod document_store;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod store;
pub mod sweeper;
pub mod transition;

#[cfg(test)]
mod testing;

pub use checks::{BatchReport, CheckUpsertService};
pub use collections::Collection;
pub use document_store::{DocumentConnection, DocumentStore, StoreOptions};
pub use metrics::RepositoryMetrics;
pub use models::{
    ClusterCheck, ClusterCheckLog, DockerContainer, DockerHost, HealthCheck, HostCheck,
    HostCheckLog, Record, SyrosService, VSphereDatastore, VSphereHost, VSphereVm,
};
pub use repository::Repository;
pub use store::{Connection, Document, Filter, Store};
pub use sweeper::{
    start_sweeper, RetentionPolicy, RetentionSweeper, SweepReport, SweeperHandle,
    DEFAULT_SWEEP_INTERVAL,
};
pub use transition::{Transition, TransitionRecorder};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_display() {
        let err = PersistenceError::DuplicateKey {
            collection: "checks".into(),
            key: "chk1".into(),
        };
        assert_eq!(format!("{err}"), "duplicate key chk1 in checks");
    }
}
