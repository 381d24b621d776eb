//! ---
//! syros_section: "01-core-functionality"
//! syros_subsection: "binary"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Binary entrypoint for the syros indexer."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use syros_common::config::IndexerConfig;
use syros_common::logging::init_tracing;
use syros_metrics::{new_registry, spawn_http_server, IndexerMetrics, SharedRegistry};
use syros_persistence::{
    start_sweeper, ClusterCheck, DocumentStore, DockerContainer, DockerHost, HostCheck,
    Repository, RepositoryMetrics, RetentionPolicy, RetentionSweeper, SyrosService,
    VSphereDatastore, VSphereHost, VSphereVm,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "syros indexer",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "MINUTES",
        allow_negative_numbers = true,
        help = "Override retention staleness; zero or negative disables sweeping"
    )]
    stale_minutes: Option<i64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Prepare the store and run the retention sweeper until interrupted")]
    Run,
    #[command(about = "Declare the store indexes and exit")]
    Init,
    #[command(about = "Run a single retention sweep and exit")]
    Sweep,
    #[command(about = "Write a JSON array of collected documents through the repository")]
    Ingest {
        #[arg(long, value_enum)]
        kind: IngestKind,
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum IngestKind {
    Checks,
    ClusterChecks,
    Hosts,
    Containers,
    Services,
    VsphereHosts,
    VsphereDatastores,
    VsphereVms,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/indexer.toml"));
    candidates.push(PathBuf::from("configs/indexer.example.toml"));

    let load_started = Instant::now();
    let loaded_config = IndexerConfig::load_with_source(&candidates)?;
    let mut config = loaded_config.config;
    let load_duration = load_started.elapsed();
    if let Some(stale_minutes) = cli.stale_minutes {
        config.retention.stale_minutes = stale_minutes;
    }

    init_tracing("syros-indexer", &config.logging)?;
    info!(config_path = %loaded_config.source.display(), "configuration loaded");

    let metrics_registry = new_registry();
    let indexer_metrics = IndexerMetrics::new(metrics_registry.clone())?;
    indexer_metrics.observe_config_load(load_duration.as_secs_f64());
    indexer_metrics.inc_start();
    let repository_metrics = Arc::new(RepositoryMetrics::new(metrics_registry.clone())?);

    let store = DocumentStore::from_config(&config.database).with_context(|| {
        format!(
            "failed to open store {}",
            config.database.directory.join(&config.database.name).display()
        )
    })?;
    let repository = Repository::new(store.clone(), Some(repository_metrics.clone()));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            run_indexer(
                config,
                repository,
                indexer_metrics,
                metrics_registry,
                repository_metrics,
            )
            .await?
        }
        Commands::Init => {
            repository.initialize()?;
            println!("indexes ensured in {}", describe_store(&store));
        }
        Commands::Sweep => {
            let Some(policy) = RetentionPolicy::from_config(&config.retention)? else {
                println!("retention disabled (stale_minutes = {})", config.retention.stale_minutes);
                return Ok(());
            };
            let report = RetentionSweeper::new(store, policy, Some(repository_metrics)).sweep();
            for (collection, removed) in &report.removed {
                println!("{collection}: {removed} removed");
            }
            for collection in &report.failed {
                println!("{collection}: sweep failed");
            }
            println!("total: {}", report.total_removed());
        }
        Commands::Ingest { kind, file } => {
            let written = ingest(&repository, kind, &file)?;
            println!("{written} documents written from {}", file.display());
        }
    }

    Ok(())
}

async fn run_indexer(
    config: IndexerConfig,
    repository: Repository<DocumentStore>,
    indexer_metrics: IndexerMetrics,
    metrics_registry: SharedRegistry,
    repository_metrics: Arc<RepositoryMetrics>,
) -> Result<()> {
    repository
        .initialize()
        .context("failed to prepare store indexes")?;

    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_http_server(metrics_registry, config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let policy = RetentionPolicy::from_config(&config.retention)?;
    indexer_metrics.set_retention_enabled(policy.is_some());
    let cancel = CancellationToken::new();
    let sweeper = start_sweeper(
        repository.store().clone(),
        policy,
        Some(repository_metrics),
        cancel.clone(),
    );

    info!(
        store = %describe_store(repository.store()),
        "indexer running; waiting for termination signal"
    );
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    cancel.cancel();
    if let Some(handle) = sweeper {
        handle.shutdown().await;
    }
    if let Some(server) = metrics_server {
        if let Err(err) = server.shutdown().await {
            warn!(error = %err, "metrics server shutdown failed");
        }
    }

    Ok(())
}

fn ingest(repository: &Repository<DocumentStore>, kind: IngestKind, file: &Path) -> Result<usize> {
    let written = match kind {
        IngestKind::Checks => {
            let report = repository.upsert_checks(read_batch::<HostCheck>(file)?);
            info!(?report, "host checks ingested");
            report.written()
        }
        IngestKind::ClusterChecks => {
            let report = repository.upsert_cluster_checks(read_batch::<ClusterCheck>(file)?);
            info!(?report, "cluster checks ingested");
            report.written()
        }
        IngestKind::Hosts => repository.upsert_records(read_batch::<DockerHost>(file)?),
        IngestKind::Containers => {
            repository.upsert_containers(read_batch::<DockerContainer>(file)?)
        }
        IngestKind::Services => repository.upsert_records(read_batch::<SyrosService>(file)?),
        IngestKind::VsphereHosts => {
            repository.upsert_vsphere_hosts(read_batch::<VSphereHost>(file)?)
        }
        IngestKind::VsphereDatastores => {
            repository.upsert_vsphere_datastores(read_batch::<VSphereDatastore>(file)?)
        }
        IngestKind::VsphereVms => repository.upsert_vsphere_vms(read_batch::<VSphereVm>(file)?),
    };
    Ok(written)
}

fn read_batch<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("unable to read batch file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse batch file {}", path.display()))
}

fn describe_store(store: &DocumentStore) -> String {
    store
        .root()
        .map(|root| root.display().to_string())
        .unwrap_or_else(|| "memory".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syros_persistence::StoreOptions;
    use tempfile::tempdir;

    #[test]
    fn cli_accepts_negative_staleness_override() {
        let cli = Cli::try_parse_from(["syros-indexer", "--stale-minutes", "-1", "sweep"]).unwrap();
        assert_eq!(cli.stale_minutes, Some(-1));
        assert!(matches!(cli.command, Some(Commands::Sweep)));
    }

    #[test]
    fn cli_parses_ingest_kind() {
        let cli = Cli::try_parse_from([
            "syros-indexer",
            "ingest",
            "--kind",
            "vsphere-datastores",
            "batch.json",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Ingest { kind, file }) => {
                assert_eq!(kind, IngestKind::VsphereDatastores);
                assert_eq!(file, PathBuf::from("batch.json"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ingest_routes_checks_through_transition_protocol() {
        let dir = tempdir().unwrap();
        let batch = dir.path().join("checks.json");
        fs::write(
            &batch,
            r#"[
                {"id": "c1", "check_id": "http", "name": "HTTP", "host_id": "h1",
                 "host_name": "web-1", "environment": "prod", "status": "passing",
                 "output": "", "notes": "", "service_id": "", "service_name": "",
                 "collected": "2024-05-01T12:00:00Z"},
                {"id": "c1", "check_id": "http", "name": "HTTP", "host_id": "h1",
                 "host_name": "web-1", "environment": "prod", "status": "critical",
                 "output": "timeout", "notes": "", "service_id": "", "service_name": "",
                 "collected": "2024-05-01T12:01:00Z"}
            ]"#,
        )
        .unwrap();

        let store = DocumentStore::open(dir.path().join("db"), StoreOptions::default()).unwrap();
        let repository = Repository::new(store.clone(), None);
        assert_eq!(ingest(&repository, IngestKind::Checks, &batch).unwrap(), 2);
        assert_eq!(store.count("checks"), 1);
        assert_eq!(store.count("checks_log"), 1);
    }

    #[test]
    fn malformed_batch_is_reported() {
        let dir = tempdir().unwrap();
        let batch = dir.path().join("hosts.json");
        fs::write(&batch, "{not json").unwrap();
        let repository = Repository::new(DocumentStore::in_memory(), None);
        let err = ingest(&repository, IngestKind::Hosts, &batch).unwrap_err();
        assert!(err.to_string().contains("failed to parse batch file"));
    }
}
