//! ---
//! syros_section: "15-testing-qa"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "test"
//! syros_description: "Fault injection and fixtures for persistence unit tests."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::document_store::{DocumentConnection, DocumentStore};
use crate::models::{ClusterCheck, HostCheck};
use crate::store::{Connection, Document, Filter, Store};
use crate::{PersistenceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Connect,
    Find,
    Insert,
    Upsert,
    Delete,
    Index,
}

type Plan = Arc<Mutex<HashSet<(Op, String)>>>;

/// Document store that fails selected operations on selected collections.
#[derive(Clone)]
pub(crate) struct FaultyStore {
    inner: DocumentStore,
    plan: Plan,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: DocumentStore::in_memory(),
            plan: Arc::default(),
        }
    }

    pub(crate) fn inner(&self) -> &DocumentStore {
        &self.inner
    }

    pub(crate) fn fail(&self, op: Op, collection: &str) {
        self.plan.lock().insert((op, collection.to_owned()));
    }

    pub(crate) fn heal(&self) {
        self.plan.lock().clear();
    }
}

fn check(plan: &Plan, op: Op, collection: &str) -> Result<()> {
    if plan.lock().contains(&(op, collection.to_owned())) {
        return Err(PersistenceError::Io(io::Error::other(format!(
            "injected {op:?} fault on {collection}"
        ))));
    }
    Ok(())
}

pub(crate) struct FaultyConnection {
    inner: DocumentConnection,
    plan: Plan,
}

impl Store for FaultyStore {
    type Connection = FaultyConnection;

    fn connect(&self) -> Result<FaultyConnection> {
        check(&self.plan, Op::Connect, "*")?;
        Ok(FaultyConnection {
            inner: self.inner.connect()?,
            plan: Arc::clone(&self.plan),
        })
    }
}

impl Connection for FaultyConnection {
    fn find_by_key(&mut self, collection: &str, key: &str) -> Result<Option<Document>> {
        check(&self.plan, Op::Find, collection)?;
        self.inner.find_by_key(collection, key)
    }

    fn insert(&mut self, collection: &str, key: &str, document: Document) -> Result<()> {
        check(&self.plan, Op::Insert, collection)?;
        self.inner.insert(collection, key, document)
    }

    fn upsert(&mut self, collection: &str, key: &str, document: Document) -> Result<()> {
        check(&self.plan, Op::Upsert, collection)?;
        self.inner.upsert(collection, key, document)
    }

    fn delete_where(&mut self, collection: &str, filter: &Filter) -> Result<u64> {
        check(&self.plan, Op::Delete, collection)?;
        self.inner.delete_where(collection, filter)
    }

    fn ensure_index(&mut self, collection: &str, field: &str) -> Result<()> {
        check(&self.plan, Op::Index, collection)?;
        self.inner.ensure_index(collection, field)
    }
}

pub(crate) fn host_check(id: &str, status: &str, collected: DateTime<Utc>) -> HostCheck {
    HostCheck {
        id: id.to_owned(),
        check_id: "service:web".to_owned(),
        name: "web health".to_owned(),
        host_id: "host-1".to_owned(),
        host_name: "web-1".to_owned(),
        environment: "prod".to_owned(),
        status: status.to_owned(),
        output: format!("{status} output"),
        notes: String::new(),
        service_id: "web".to_owned(),
        service_name: "web".to_owned(),
        collected,
        since: DateTime::<Utc>::default(),
    }
}

pub(crate) fn cluster_check(id: &str, status: &str, collected: DateTime<Utc>) -> ClusterCheck {
    ClusterCheck {
        id: id.to_owned(),
        name: "consul quorum".to_owned(),
        environment: "prod".to_owned(),
        status: status.to_owned(),
        output: String::new(),
        host_names: vec!["consul-1".to_owned(), "consul-2".to_owned()],
        collected,
        since: DateTime::<Utc>::default(),
    }
}
