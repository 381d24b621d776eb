//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "integration-tests"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "File-backed repository behaviour across restarts."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use syros_persistence::{
    Collection, DocumentStore, HostCheck, HostCheckLog, Repository, RetentionPolicy,
    RetentionSweeper, StoreOptions, VSphereVm,
};
use tempfile::tempdir;

fn check(status: &str, collected: DateTime<Utc>) -> HostCheck {
    HostCheck {
        id: "web-1:http".into(),
        check_id: "http".into(),
        name: "HTTP endpoint".into(),
        host_id: "host-1".into(),
        host_name: "web-1".into(),
        environment: "prod".into(),
        status: status.into(),
        output: String::new(),
        notes: String::new(),
        service_id: String::new(),
        service_name: String::new(),
        collected,
        since: collected,
    }
}

#[test]
fn check_history_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let t0 = Utc::now() - Duration::minutes(30);

    {
        let store = DocumentStore::open(dir.path(), StoreOptions::default())?;
        let repo = Repository::new(store, None);
        repo.initialize()?;
        repo.upsert_checks(vec![check("passing", t0)]);
        repo.upsert_checks(vec![check("critical", t0 + Duration::minutes(5))]);
    }

    let store = DocumentStore::open(dir.path(), StoreOptions::default())?;
    let repo = Repository::new(store.clone(), None);
    let report = repo.upsert_checks(vec![check("critical", t0 + Duration::minutes(10))]);
    assert_eq!(report.updated, 1);
    assert_eq!(report.transitions, 0);

    let stored: HostCheck = serde_json::from_value(store.dump("checks").remove(0))?;
    assert_eq!(stored.status, "critical");
    assert_eq!(stored.since, t0 + Duration::minutes(5));
    assert_eq!(stored.collected, t0 + Duration::minutes(10));

    let logs = store.dump("checks_log");
    assert_eq!(logs.len(), 1);
    let log: HostCheckLog = serde_json::from_value(logs[0].clone())?;
    assert_eq!(log.status, "passing");
    assert_eq!(log.begin, t0);
    assert_eq!(log.end, t0 + Duration::minutes(5));
    assert_eq!(log.duration, 300);
    Ok(())
}

#[test]
fn sweep_is_persisted_to_disk() -> Result<()> {
    let dir = tempdir()?;
    let now = Utc::now();
    let vm = |id: &str, collected: DateTime<Utc>| VSphereVm {
        id: id.into(),
        name: id.into(),
        host_id: "esx-1".into(),
        power_state: "poweredOn".into(),
        guest_os: "ubuntu64Guest".into(),
        collected,
    };

    {
        let store = DocumentStore::open(dir.path(), StoreOptions::default())?;
        let repo = Repository::new(store.clone(), None);
        repo.upsert_vsphere_vms(vec![
            vm("vm-old", now - Duration::hours(3)),
            vm("vm-new", now - Duration::minutes(1)),
        ]);

        let policy = RetentionPolicy::new(vec![Collection::VsphereVms], 60).expect("enabled");
        let report = RetentionSweeper::new(store, policy, None).sweep_at(now);
        assert_eq!(report.removed.get(&Collection::VsphereVms), Some(&1));
    }

    let reopened = DocumentStore::open(dir.path(), StoreOptions::default())?;
    let docs = reopened.dump("vsphere_vms");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["id"], "vm-new");
    Ok(())
}
