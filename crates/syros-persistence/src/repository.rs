//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Repository facade over the document store."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use std::sync::Arc;

use strum::IntoEnumIterator;
use tracing::{error, info};

use crate::checks::{BatchReport, CheckUpsertService};
use crate::collections::Collection;
use crate::metrics::RepositoryMetrics;
use crate::models::{
    ClusterCheck, DockerContainer, DockerHost, HostCheck, Record, SyrosService, VSphereDatastore,
    VSphereHost, VSphereVm,
};
use crate::store::{Connection, Store};
use crate::Result;

/// Entry point used by the ingestion pipeline to persist collected data.
#[derive(Debug, Clone)]
pub struct Repository<S> {
    store: S,
    host_checks: CheckUpsertService<HostCheck>,
    cluster_checks: CheckUpsertService<ClusterCheck>,
    metrics: Option<Arc<RepositoryMetrics>>,
}

impl<S: Store> Repository<S> {
    /// Wrap a store.
    pub fn new(store: S, metrics: Option<Arc<RepositoryMetrics>>) -> Self {
        Self {
            host_checks: CheckUpsertService::new(metrics.clone()),
            cluster_checks: CheckUpsertService::new(metrics.clone()),
            store,
            metrics,
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Metrics handle, if any.
    pub fn metrics(&self) -> Option<Arc<RepositoryMetrics>> {
        self.metrics.clone()
    }

    /// Declare every secondary index of the catalogue.
    ///
    /// Unlike the write path this fails loudly: the indexer must not start
    /// against a store it could not prepare.
    pub fn initialize(&self) -> Result<()> {
        let mut conn = self.store.connect()?;
        let mut declared = 0usize;
        for collection in Collection::iter() {
            for field in collection.index_fields() {
                conn.ensure_index(collection.name(), field)?;
                declared += 1;
            }
        }
        info!(indexes = declared, "repository indexes ensured");
        Ok(())
    }

    /// Write host-scoped checks through the transition protocol.
    pub fn upsert_checks(&self, checks: impl IntoIterator<Item = HostCheck>) -> BatchReport {
        self.host_checks.upsert_many(&self.store, checks)
    }

    /// Write one cluster-scoped check through the transition protocol.
    pub fn upsert_cluster_check(&self, check: ClusterCheck) -> BatchReport {
        self.cluster_checks.upsert_one(&self.store, check)
    }

    /// Write cluster-scoped checks through the transition protocol.
    pub fn upsert_cluster_checks(
        &self,
        checks: impl IntoIterator<Item = ClusterCheck>,
    ) -> BatchReport {
        self.cluster_checks.upsert_many(&self.store, checks)
    }

    pub fn upsert_host(&self, host: DockerHost) -> usize {
        self.upsert_records([host])
    }

    pub fn upsert_container(&self, container: DockerContainer) -> usize {
        self.upsert_records([container])
    }

    pub fn upsert_containers(
        &self,
        containers: impl IntoIterator<Item = DockerContainer>,
    ) -> usize {
        self.upsert_records(containers)
    }

    pub fn upsert_service(&self, service: SyrosService) -> usize {
        self.upsert_records([service])
    }

    pub fn upsert_vsphere_hosts(&self, hosts: impl IntoIterator<Item = VSphereHost>) -> usize {
        self.upsert_records(hosts)
    }

    pub fn upsert_vsphere_datastores(
        &self,
        stores: impl IntoIterator<Item = VSphereDatastore>,
    ) -> usize {
        self.upsert_records(stores)
    }

    pub fn upsert_vsphere_vms(&self, vms: impl IntoIterator<Item = VSphereVm>) -> usize {
        self.upsert_records(vms)
    }

    /// Replace keyed records field-for-field, returning how many were written.
    /// Failures are logged per record and do not stop the batch.
    pub fn upsert_records<R, I>(&self, records: I) -> usize
    where
        R: Record,
        I: IntoIterator<Item = R>,
    {
        let collection = R::COLLECTION.name();
        let mut conn = match self.store.connect() {
            Ok(conn) => conn,
            Err(err) => {
                error!(collection, error = %err, "store connection unavailable");
                self.record_failure(collection, "connect");
                return 0;
            }
        };

        let mut written = 0;
        for record in records {
            match conn.upsert_record(collection, record.key(), &record) {
                Ok(()) => {
                    written += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_written(collection);
                    }
                }
                Err(err) => {
                    error!(collection, key = record.key(), error = %err, "upsert failed");
                    self.record_failure(collection, "upsert");
                }
            }
        }
        written
    }

    fn record_failure(&self, collection: &str, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_write_failure(collection, operation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::DocumentStore;
    use crate::testing::{cluster_check, host_check, FaultyStore, Op};
    use chrono::{Duration, Utc};

    fn container(id: &str, state: &str) -> DockerContainer {
        DockerContainer {
            id: id.into(),
            host_id: "host-1".into(),
            host_name: "web-1".into(),
            environment: "prod".into(),
            name: format!("/{id}"),
            image: "nginx:1.25".into(),
            state: state.into(),
            status: String::new(),
            collected: Utc::now(),
        }
    }

    #[test]
    fn initialize_declares_catalogue_indexes() {
        let store = DocumentStore::in_memory();
        let repo = Repository::new(store.clone(), None);
        repo.initialize().unwrap();

        assert_eq!(
            store.indexes("checks"),
            vec!["collected", "environment", "host_id"]
        );
        assert_eq!(store.indexes("cluster_checks_log"), vec!["begin", "check_id", "end"]);
        assert_eq!(store.indexes("vsphere_dstores"), vec!["collected"]);
    }

    #[test]
    fn initialize_surfaces_setup_failure() {
        let store = FaultyStore::new();
        store.fail(Op::Index, "checks_log");
        let repo = Repository::new(store.clone(), None);
        assert!(repo.initialize().is_err());
        assert_eq!(store.inner().active_connections(), 0);
    }

    #[test]
    fn plain_records_are_replaced_without_history() {
        let store = DocumentStore::in_memory();
        let repo = Repository::new(store.clone(), None);

        let batch = vec![container("c1", "running"), container("c2", "running")];
        assert_eq!(repo.upsert_containers(batch), 2);
        assert_eq!(repo.upsert_container(container("c1", "exited")), 1);

        let docs = store.dump("containers");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["state"], "exited");
    }

    #[test]
    fn services_keep_their_type_field() {
        let store = DocumentStore::in_memory();
        let repo = Repository::new(store.clone(), None);
        let service = SyrosService {
            id: "indexer-1".into(),
            hostname: "idx-1".into(),
            kind: "indexer".into(),
            environment: "prod".into(),
            config: serde_json::json!({"stale": 1440}),
            collected: Utc::now(),
        };
        assert_eq!(repo.upsert_service(service), 1);
        assert_eq!(store.dump("syros_services")[0]["type"], "indexer");
    }

    #[test]
    fn failing_record_upserts_are_isolated() {
        let store = FaultyStore::new();
        store.fail(Op::Upsert, "containers");
        let repo = Repository::new(store.clone(), None);
        assert_eq!(repo.upsert_containers(vec![container("c1", "running")]), 0);

        let host = DockerHost {
            id: "host-1".into(),
            name: "web-1".into(),
            environment: "prod".into(),
            docker_version: "24.0.7".into(),
            operating_system: "Ubuntu 22.04".into(),
            ncpu: 8,
            mem_total: 32 << 30,
            containers: 3,
            containers_running: 2,
            collected: Utc::now(),
        };
        assert_eq!(repo.upsert_host(host), 1);
    }

    #[test]
    fn check_families_route_through_repository() {
        let store = DocumentStore::in_memory();
        let repo = Repository::new(store.clone(), None);
        let t0 = Utc::now() - Duration::minutes(5);

        repo.upsert_checks(vec![host_check("h", "passing", t0)]);
        repo.upsert_checks(vec![host_check("h", "critical", t0 + Duration::minutes(1))]);
        repo.upsert_cluster_check(cluster_check("q", "passing", t0));
        let report = repo.upsert_cluster_checks(vec![cluster_check(
            "q",
            "warning",
            t0 + Duration::minutes(2),
        )]);

        assert_eq!(report.transitions, 1);
        assert_eq!(store.count("checks_log"), 1);
        assert_eq!(store.count("cluster_checks_log"), 1);
    }
}
