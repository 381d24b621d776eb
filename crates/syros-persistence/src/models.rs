//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Persisted inventory and health check records."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collections::Collection;

/// A document stored under a stable key in a fixed collection.
pub trait Record: Serialize + DeserializeOwned {
    /// Collection the record lives in.
    const COLLECTION: Collection;

    /// Storage key.
    fn key(&self) -> &str;
}

/// Capabilities the transition protocol needs from a health check snapshot.
///
/// `since` belongs to the persistence layer: whatever the collector sent is
/// overwritten before the snapshot is stored.
pub trait HealthCheck: Record {
    /// Audit entry written when the status changes.
    type Log: Record;

    /// Identity of the check.
    fn id(&self) -> &str;
    /// Opaque status, compared only for equality.
    fn status(&self) -> &str;
    /// When the snapshot was captured.
    fn collected(&self) -> DateTime<Utc>;
    /// When the current status began.
    fn since(&self) -> DateTime<Utc>;
    /// Overwrite the start of the current status.
    fn set_since(&mut self, since: DateTime<Utc>);
    /// Build the audit entry describing this (stored) version, which held
    /// its status from `begin` until `end`.
    fn transition_log(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Self::Log;
}

/// Host-scoped health check as reported by a Consul agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCheck {
    pub id: String,
    pub check_id: String,
    pub name: String,
    pub host_id: String,
    pub host_name: String,
    pub environment: String,
    pub status: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    pub collected: DateTime<Utc>,
    #[serde(default)]
    pub since: DateTime<Utc>,
}

/// Closed status period of a host-scoped check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCheckLog {
    pub id: String,
    pub check_id: String,
    pub name: String,
    pub host_id: String,
    pub host_name: String,
    pub environment: String,
    pub status: String,
    pub output: String,
    pub service_name: String,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Whole seconds between `begin` and `end`.
    pub duration: i64,
}

impl Record for HostCheck {
    const COLLECTION: Collection = Collection::Checks;

    fn key(&self) -> &str {
        &self.id
    }
}

impl Record for HostCheckLog {
    const COLLECTION: Collection = Collection::ChecksLog;

    fn key(&self) -> &str {
        &self.id
    }
}

impl HealthCheck for HostCheck {
    type Log = HostCheckLog;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn collected(&self) -> DateTime<Utc> {
        self.collected
    }

    fn since(&self) -> DateTime<Utc> {
        self.since
    }

    fn set_since(&mut self, since: DateTime<Utc>) {
        self.since = since;
    }

    fn transition_log(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> HostCheckLog {
        HostCheckLog {
            id: Uuid::new_v4().to_string(),
            check_id: self.id.clone(),
            name: self.name.clone(),
            host_id: self.host_id.clone(),
            host_name: self.host_name.clone(),
            environment: self.environment.clone(),
            status: self.status.clone(),
            output: self.output.clone(),
            service_name: self.service_name.clone(),
            begin,
            end,
            duration: (end - begin).num_seconds(),
        }
    }
}

/// Cluster-wide health check evaluated by the indexer itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCheck {
    pub id: String,
    pub name: String,
    pub environment: String,
    pub status: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub host_names: Vec<String>,
    pub collected: DateTime<Utc>,
    #[serde(default)]
    pub since: DateTime<Utc>,
}

/// Closed status period of a cluster check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCheckLog {
    pub id: String,
    pub check_id: String,
    pub name: String,
    pub environment: String,
    pub status: String,
    pub output: String,
    pub host_names: Vec<String>,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: i64,
}

impl Record for ClusterCheck {
    const COLLECTION: Collection = Collection::ClusterChecks;

    fn key(&self) -> &str {
        &self.id
    }
}

impl Record for ClusterCheckLog {
    const COLLECTION: Collection = Collection::ClusterChecksLog;

    fn key(&self) -> &str {
        &self.id
    }
}

impl HealthCheck for ClusterCheck {
    type Log = ClusterCheckLog;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn collected(&self) -> DateTime<Utc> {
        self.collected
    }

    fn since(&self) -> DateTime<Utc> {
        self.since
    }

    fn set_since(&mut self, since: DateTime<Utc>) {
        self.since = since;
    }

    fn transition_log(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> ClusterCheckLog {
        ClusterCheckLog {
            id: Uuid::new_v4().to_string(),
            check_id: self.id.clone(),
            name: self.name.clone(),
            environment: self.environment.clone(),
            status: self.status.clone(),
            output: self.output.clone(),
            host_names: self.host_names.clone(),
            begin,
            end,
            duration: (end - begin).num_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerHost {
    pub id: String,
    pub name: String,
    pub environment: String,
    #[serde(default)]
    pub docker_version: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub ncpu: i64,
    #[serde(default)]
    pub mem_total: i64,
    #[serde(default)]
    pub containers: i64,
    #[serde(default)]
    pub containers_running: i64,
    pub collected: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerContainer {
    pub id: String,
    pub host_id: String,
    pub host_name: String,
    pub environment: String,
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub status: String,
    pub collected: DateTime<Utc>,
}

/// Agent or indexer instance registered with the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyrosService {
    pub id: String,
    pub hostname: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub environment: String,
    #[serde(default)]
    pub config: serde_json::Value,
    pub collected: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VSphereHost {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub power_state: String,
    #[serde(default)]
    pub ncpu: i64,
    #[serde(default)]
    pub memory: i64,
    pub collected: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VSphereDatastore {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub capacity: i64,
    #[serde(default)]
    pub free_space: i64,
    pub collected: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VSphereVm {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub host_id: String,
    #[serde(default)]
    pub power_state: String,
    #[serde(default)]
    pub guest_os: String,
    pub collected: DateTime<Utc>,
}

macro_rules! keyed_record {
    ($($record:ty => $collection:expr),+ $(,)?) => {
        $(
            impl Record for $record {
                const COLLECTION: Collection = $collection;

                fn key(&self) -> &str {
                    &self.id
                }
            }
        )+
    };
}

keyed_record! {
    DockerHost => Collection::Hosts,
    DockerContainer => Collection::Containers,
    SyrosService => Collection::SyrosServices,
    VSphereHost => Collection::VsphereHosts,
    VSphereDatastore => Collection::VsphereDatastores,
    VSphereVm => Collection::VsphereVms,
}
