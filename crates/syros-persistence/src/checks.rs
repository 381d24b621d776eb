//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Single and batch health check writes."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, error};

use crate::metrics::RepositoryMetrics;
use crate::models::HealthCheck;
use crate::store::{Connection, Store};
use crate::transition::{Transition, TransitionRecorder};

/// Per-call tally of what happened to each submitted check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Checks stored for the first time.
    pub inserted: usize,
    /// Checks that replaced a stored snapshot.
    pub updated: usize,
    /// Status changes detected (a subset of `updated` unless the write failed).
    pub transitions: usize,
    /// Checks skipped because the stored snapshot could not be read.
    pub skipped: usize,
    /// Checks whose write failed.
    pub failed: usize,
}

impl BatchReport {
    /// Number of checks that reached the store.
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Writes health checks through the transition protocol.
///
/// Items are processed in order on one pooled connection; a failing item is
/// logged and skipped without affecting the rest of the batch. Concurrent
/// writers of the same check id are not serialized: both may read the same
/// stored snapshot and both may append a log entry for one transition.
#[derive(Debug, Clone)]
pub struct CheckUpsertService<C> {
    recorder: TransitionRecorder,
    metrics: Option<Arc<RepositoryMetrics>>,
    _check: PhantomData<fn() -> C>,
}

impl<C: HealthCheck> CheckUpsertService<C> {
    /// Service bound to the collections of check type `C`.
    pub fn new(metrics: Option<Arc<RepositoryMetrics>>) -> Self {
        let recorder = TransitionRecorder::for_check::<C>().with_metrics(metrics.clone());
        Self::with_recorder(recorder, metrics)
    }

    /// Service using an explicitly configured recorder.
    pub fn with_recorder(
        recorder: TransitionRecorder,
        metrics: Option<Arc<RepositoryMetrics>>,
    ) -> Self {
        Self {
            recorder,
            metrics,
            _check: PhantomData,
        }
    }

    /// Recorder used by this service.
    pub fn recorder(&self) -> &TransitionRecorder {
        &self.recorder
    }

    /// Write a single check.
    pub fn upsert_one<S: Store>(&self, store: &S, check: C) -> BatchReport {
        self.upsert_many(store, std::iter::once(check))
    }

    /// Write checks sequentially, isolating per-item failures.
    pub fn upsert_many<S, I>(&self, store: &S, checks: I) -> BatchReport
    where
        S: Store,
        I: IntoIterator<Item = C>,
    {
        let collection = self.recorder.checks().name();
        let mut report = BatchReport::default();

        let mut conn = match store.connect() {
            Ok(conn) => conn,
            Err(err) => {
                report.failed = checks.into_iter().count();
                error!(
                    collection,
                    dropped = report.failed,
                    error = %err,
                    "store connection unavailable"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_write_failure(collection, "connect");
                }
                return report;
            }
        };

        for check in checks {
            self.apply(&mut conn, check, &mut report);
        }
        debug!(
            collection,
            inserted = report.inserted,
            updated = report.updated,
            transitions = report.transitions,
            skipped = report.skipped,
            failed = report.failed,
            "checks written"
        );
        report
    }

    fn apply<K: Connection>(&self, conn: &mut K, mut check: C, report: &mut BatchReport) {
        let collection = self.recorder.checks().name();

        let transition = match self.recorder.record(conn, &mut check) {
            Ok(transition) => transition,
            Err(err) => {
                error!(
                    collection,
                    check_id = check.id(),
                    error = %err,
                    "stored check lookup failed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_lookup_failure(collection);
                }
                report.skipped += 1;
                return;
            }
        };

        if matches!(transition, Transition::Changed { .. }) {
            report.transitions += 1;
        }

        let (operation, result) = match transition {
            Transition::FirstSighting => {
                ("insert", conn.insert_record(collection, check.id(), &check))
            }
            Transition::Unchanged | Transition::Changed { .. } => {
                ("upsert", conn.upsert_record(collection, check.id(), &check))
            }
        };

        match result {
            Ok(()) => {
                match transition {
                    Transition::FirstSighting => report.inserted += 1,
                    _ => report.updated += 1,
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_written(collection);
                }
            }
            Err(err) => {
                error!(
                    collection,
                    check_id = check.id(),
                    operation,
                    error = %err,
                    "check write failed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_write_failure(collection, operation);
                }
                report.failed += 1;
            }
        }
    }
}
