//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Collection catalogue with staleness and index fields."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Every collection the indexer writes to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    /// Docker hosts.
    Hosts,
    /// Docker containers.
    Containers,
    /// Host-scoped health checks.
    Checks,
    /// Status transitions of host-scoped checks.
    ChecksLog,
    /// Cluster-scoped health checks.
    ClusterChecks,
    /// Status transitions of cluster-scoped checks.
    ClusterChecksLog,
    /// Syros agent and indexer services.
    SyrosServices,
    /// vSphere ESXi hosts.
    VsphereHosts,
    /// vSphere datastores.
    #[strum(serialize = "vsphere_dstores")]
    VsphereDatastores,
    /// vSphere virtual machines.
    VsphereVms,
}

impl Collection {
    /// Wire name of the collection.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Timestamp field the retention sweeper compares against.
    pub fn time_field(self) -> &'static str {
        match self {
            Collection::ChecksLog | Collection::ClusterChecksLog => "end",
            _ => "collected",
        }
    }

    /// Whether documents are only ever appended.
    pub fn is_append_only(self) -> bool {
        matches!(self, Collection::ChecksLog | Collection::ClusterChecksLog)
    }

    /// Secondary index fields declared at startup.
    pub fn index_fields(self) -> &'static [&'static str] {
        match self {
            Collection::Hosts => &["environment", "collected"],
            Collection::Containers => &["host_id", "environment", "collected"],
            Collection::Checks => &["host_id", "environment", "collected"],
            Collection::ChecksLog | Collection::ClusterChecksLog => &["check_id", "begin", "end"],
            Collection::ClusterChecks => &["environment", "collected"],
            Collection::SyrosServices => &["environment", "collected"],
            Collection::VsphereHosts | Collection::VsphereDatastores | Collection::VsphereVms => {
                &["collected"]
            }
        }
    }
}
