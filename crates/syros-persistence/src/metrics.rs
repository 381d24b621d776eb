//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Prometheus instrumentation for the persistence facade."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{self, Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

use crate::Result;

/// Metrics published by the repository and the retention sweeper.
#[derive(Clone)]
pub struct RepositoryMetrics {
    documents_written: IntCounterVec,
    transitions: IntCounterVec,
    lookup_failures: IntCounterVec,
    write_failures: IntCounterVec,
    documents_removed: IntCounterVec,
    sweep_duration: Histogram,
    #[allow(dead_code)]
    registry: Arc<Registry>,
}

impl RepositoryMetrics {
    /// Register all repository metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let documents_written = IntCounterVec::new(
            Opts::new(
                "syros_documents_written_total",
                "Total number of documents inserted or upserted",
            ),
            &["collection"],
        )?;
        registry.register(Box::new(documents_written.clone()))?;

        let transitions = IntCounterVec::new(
            Opts::new(
                "syros_check_transitions_total",
                "Total number of health check status changes detected",
            ),
            &["collection"],
        )?;
        registry.register(Box::new(transitions.clone()))?;

        let lookup_failures = IntCounterVec::new(
            Opts::new(
                "syros_lookup_failures_total",
                "Total number of stored snapshot lookups that failed",
            ),
            &["collection"],
        )?;
        registry.register(Box::new(lookup_failures.clone()))?;

        let write_failures = IntCounterVec::new(
            Opts::new(
                "syros_write_failures_total",
                "Total number of failed store writes by operation",
            ),
            &["collection", "operation"],
        )?;
        registry.register(Box::new(write_failures.clone()))?;

        let documents_removed = IntCounterVec::new(
            Opts::new(
                "syros_retention_removed_total",
                "Total number of documents removed by the retention sweeper",
            ),
            &["collection"],
        )?;
        registry.register(Box::new(documents_removed.clone()))?;

        let sweep_duration = Histogram::with_opts(
            HistogramOpts::new(
                "syros_retention_sweep_seconds",
                "Duration of a retention sweep across all configured collections",
            )
            .buckets(prometheus::exponential_buckets(0.001, 2.0, 14)?),
        )?;
        registry.register(Box::new(sweep_duration.clone()))?;

        Ok(Self {
            documents_written,
            transitions,
            lookup_failures,
            write_failures,
            documents_removed,
            sweep_duration,
            registry,
        })
    }

    /// Record a successful insert or upsert.
    pub fn record_written(&self, collection: &str) {
        self.documents_written
            .with_label_values(&[collection])
            .inc();
    }

    /// Record a detected status change.
    pub fn record_transition(&self, collection: &str) {
        self.transitions.with_label_values(&[collection]).inc();
    }

    /// Record a failed lookup of the stored snapshot.
    pub fn record_lookup_failure(&self, collection: &str) {
        self.lookup_failures.with_label_values(&[collection]).inc();
    }

    /// Record a failed write (`insert`, `upsert`, `delete` or `connect`).
    pub fn record_write_failure(&self, collection: &str, operation: &str) {
        self.write_failures
            .with_label_values(&[collection, operation])
            .inc();
    }

    /// Add to the number of documents removed from a collection.
    pub fn record_removed(&self, collection: &str, removed: u64) {
        self.documents_removed
            .with_label_values(&[collection])
            .inc_by(removed);
    }

    /// Observe the wall time of one sweep.
    pub fn observe_sweep_duration(&self, seconds: f64) {
        self.sweep_duration.observe(seconds);
    }
}

impl std::fmt::Debug for RepositoryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryMetrics").finish_non_exhaustive()
    }
}
