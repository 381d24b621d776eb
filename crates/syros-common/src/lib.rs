//! ---
//! syros_section: "01-core-functionality"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Shared primitives and utilities for the indexer runtime."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
//! Shared primitives for the syros workspace: configuration loading and
//! tracing initialisation.

pub mod config;
pub mod logging;

pub use config::{
    DatabaseConfig, IndexerConfig, LoadedIndexerConfig, LoggingConfig, MetricsConfig,
    RetentionConfig,
};
pub use logging::{init_tracing, LogFormat};
