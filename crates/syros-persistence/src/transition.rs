//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Health check status transition detection and audit logging."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use std::sync::Arc;

use tracing::{debug, error};

use crate::collections::Collection;
use crate::metrics::RepositoryMetrics;
use crate::models::{HealthCheck, Record};
use crate::store::Connection;
use crate::Result;

/// What the recorder concluded about an incoming snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No stored snapshot exists; the caller must insert.
    FirstSighting,
    /// Same status as stored; `since` was carried forward.
    Unchanged,
    /// Status differs from the stored one; `since` restarted at `collected`.
    Changed {
        /// Whether the audit entry reached the log collection.
        log_written: bool,
    },
}

/// Compares incoming health check snapshots with the stored version and
/// appends an audit entry to the log collection on every status change.
#[derive(Debug, Clone)]
pub struct TransitionRecorder {
    checks: Collection,
    log: Collection,
    metrics: Option<Arc<RepositoryMetrics>>,
}

impl TransitionRecorder {
    /// Recorder reading snapshots from `checks` and appending to `log`.
    pub fn new(checks: Collection, log: Collection) -> Self {
        Self {
            checks,
            log,
            metrics: None,
        }
    }

    /// Recorder wired to the collections of check type `C`.
    pub fn for_check<C: HealthCheck>() -> Self {
        Self::new(C::COLLECTION, <C::Log as Record>::COLLECTION)
    }

    /// Attach metrics.
    pub fn with_metrics(mut self, metrics: Option<Arc<RepositoryMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Collection holding the current snapshots.
    pub fn checks(&self) -> Collection {
        self.checks
    }

    /// Collection receiving audit entries.
    pub fn log(&self) -> Collection {
        self.log
    }

    /// Set `incoming.since` from the stored snapshot and log a transition if
    /// the status changed.
    ///
    /// A lookup error is returned untouched and `incoming` is left as it was;
    /// the caller is expected to skip the snapshot. A failed log insert is
    /// logged and reported through [`Transition::Changed`] but does not fail
    /// the call. The stored snapshot itself is never written here.
    pub fn record<C, K>(&self, conn: &mut K, incoming: &mut C) -> Result<Transition>
    where
        C: HealthCheck,
        K: Connection,
    {
        let stored: Option<C> = conn.find_record(self.checks.name(), incoming.id())?;
        let Some(stored) = stored else {
            incoming.set_since(incoming.collected());
            return Ok(Transition::FirstSighting);
        };

        if stored.status() == incoming.status() {
            // out-of-order snapshots must not end up with since > collected
            incoming.set_since(stored.since().min(incoming.collected()));
            return Ok(Transition::Unchanged);
        }

        let entry = stored.transition_log(stored.since(), incoming.collected());
        let log_written = match conn.insert_record(self.log.name(), entry.key(), &entry) {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_written(self.log.name());
                }
                true
            }
            Err(err) => {
                error!(
                    collection = self.log.name(),
                    check_id = incoming.id(),
                    error = %err,
                    "transition log insert failed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_write_failure(self.log.name(), "insert");
                }
                false
            }
        };

        debug!(
            collection = self.checks.name(),
            check_id = incoming.id(),
            from = stored.status(),
            to = incoming.status(),
            "check status changed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(self.checks.name());
        }
        incoming.set_since(incoming.collected());
        Ok(Transition::Changed { log_written })
    }
}
