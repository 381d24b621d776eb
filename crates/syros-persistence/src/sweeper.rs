//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Retention sweeps removing stale documents."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use indexmap::IndexMap;
use syros_common::config::RetentionConfig;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collections::Collection;
use crate::metrics::RepositoryMetrics;
use crate::store::{Connection, Filter, Store};
use crate::{PersistenceError, Result};

/// Period between two sweeps unless configured otherwise.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Which collections are swept, how old a document may get, and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    collections: Vec<Collection>,
    stale_minutes: i64,
    interval: Duration,
}

impl RetentionPolicy {
    /// Build a policy; `None` when `stale_minutes <= 0` (retention disabled).
    pub fn new(collections: Vec<Collection>, stale_minutes: i64) -> Option<Self> {
        if stale_minutes <= 0 {
            return None;
        }
        Some(Self {
            collections,
            stale_minutes,
            interval: DEFAULT_SWEEP_INTERVAL,
        })
    }

    /// Build a policy from the `[retention]` configuration block.
    pub fn from_config(config: &RetentionConfig) -> Result<Option<Self>> {
        let collections = config
            .collections
            .iter()
            .map(|name| {
                Collection::from_str(name)
                    .map_err(|_| PersistenceError::UnknownCollection(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(collections, config.stale_minutes)
            .map(|policy| policy.with_interval(config.interval)))
    }

    /// Override the sweep period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Collections swept on every tick, in order.
    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    /// Age in minutes beyond which documents are removed.
    pub fn stale_minutes(&self) -> i64 {
        self.stale_minutes
    }

    /// Sweep period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Documents with a time field earlier than this are stale at `now`.
    ///
    /// `None` when the threshold reaches past the earliest representable
    /// timestamp, in which case nothing is stale.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        ChronoDuration::try_minutes(self.stale_minutes)
            .and_then(|staleness| now.checked_sub_signed(staleness))
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Documents removed per successfully swept collection.
    pub removed: IndexMap<Collection, u64>,
    /// Collections whose delete failed.
    pub failed: Vec<Collection>,
}

impl SweepReport {
    /// Documents removed across all collections.
    pub fn total_removed(&self) -> u64 {
        self.removed.values().sum()
    }
}

/// Deletes documents whose time field fell behind the staleness threshold.
#[derive(Debug)]
pub struct RetentionSweeper<S> {
    store: S,
    policy: RetentionPolicy,
    metrics: Option<Arc<RepositoryMetrics>>,
}

impl<S: Store> RetentionSweeper<S> {
    pub fn new(store: S, policy: RetentionPolicy, metrics: Option<Arc<RepositoryMetrics>>) -> Self {
        Self {
            store,
            policy,
            metrics,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Run one sweep now.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now())
    }

    /// Run one sweep as if the current time were `now`.
    ///
    /// A single connection serves every collection of the sweep. A failing
    /// collection is logged and recorded in the report; the remaining ones
    /// are still swept.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();
        let Some(cutoff) = self.policy.cutoff(now) else {
            debug!(
                stale_minutes = self.policy.stale_minutes,
                "staleness threshold predates every timestamp; nothing to sweep"
            );
            for &collection in &self.policy.collections {
                report.removed.insert(collection, 0);
            }
            return report;
        };

        let mut conn = match self.store.connect() {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "retention sweep skipped; store connection unavailable");
                report.failed = self.policy.collections.clone();
                return report;
            }
        };

        for &collection in &self.policy.collections {
            let filter = Filter::older_than(collection.time_field(), cutoff);
            match conn.delete_where(collection.name(), &filter) {
                Ok(removed) => {
                    if removed > 0 {
                        info!(collection = collection.name(), removed, "removed stale documents");
                        if let Some(metrics) = &self.metrics {
                            metrics.record_removed(collection.name(), removed);
                        }
                    }
                    report.removed.insert(collection, removed);
                }
                Err(err) => {
                    error!(collection = collection.name(), error = %err, "retention delete failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_write_failure(collection.name(), "delete");
                    }
                    report.failed.push(collection);
                }
            }
        }
        drop(conn);

        if let Some(metrics) = &self.metrics {
            metrics.observe_sweep_duration(started.elapsed().as_secs_f64());
        }
        report
    }
}

impl<S: Store + 'static> RetentionSweeper<S> {
    /// Run sweeps on the policy interval until `cancel` fires.
    ///
    /// The first sweep happens one full interval after spawning. Must be
    /// called from within a tokio runtime.
    pub fn spawn(self, cancel: CancellationToken) -> SweeperHandle {
        let sweeper = Arc::new(self);
        let task = tokio::spawn(run_sweep_loop(sweeper, cancel.clone()));
        SweeperHandle { cancel, task }
    }
}

async fn run_sweep_loop<S: Store + 'static>(
    sweeper: Arc<RetentionSweeper<S>>,
    cancel: CancellationToken,
) {
    let period = sweeper.policy().interval();
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        stale_minutes = sweeper.policy().stale_minutes(),
        interval_secs = period.as_secs(),
        collections = sweeper.policy().collections().len(),
        "retention sweeper started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("retention sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {
                let worker = Arc::clone(&sweeper);
                match tokio::task::spawn_blocking(move || worker.sweep()).await {
                    Ok(report) => debug!(
                        removed = report.total_removed(),
                        failed = report.failed.len(),
                        "retention sweep finished"
                    ),
                    Err(err) => error!(error = %err, "retention sweep task aborted"),
                }
            }
        }
    }
}

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Token that stops the sweeper when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the sweeper and wait for the in-flight sweep, if any, to end.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            error!(error = %err, "retention sweeper join error");
        }
    }
}

/// Spawn a sweeper for `policy`, or do nothing when retention is disabled.
pub fn start_sweeper<S: Store + 'static>(
    store: S,
    policy: Option<RetentionPolicy>,
    metrics: Option<Arc<RepositoryMetrics>>,
    cancel: CancellationToken,
) -> Option<SweeperHandle> {
    let Some(policy) = policy else {
        info!("retention sweeper disabled");
        return None;
    };
    Some(RetentionSweeper::new(store, policy, metrics).spawn(cancel))
}
