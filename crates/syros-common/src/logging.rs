//! ---
//! syros_section: "01-core-functionality"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Tracing subscriber setup for the indexer and its one-shot commands."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "SYROS_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

/// Console output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// How often the log file is rolled over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(value: LogRotation) -> Self {
        match value {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Pick the filter directive: `SYROS_LOG`, then `RUST_LOG`, then `info`.
///
/// A directive that does not parse is reported on stderr and the next
/// source is tried.
fn resolve_filter(syros_log: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    for (source, directive) in [(LOG_ENV, syros_log), ("RUST_LOG", rust_log)] {
        let Some(directive) = directive.filter(|d| !d.trim().is_empty()) else {
            continue;
        };
        match EnvFilter::try_new(directive) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("ignoring invalid {source} directive {directive:?}: {err}"),
        }
    }
    EnvFilter::new(DEFAULT_DIRECTIVE)
}

fn console_layer<S>(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().boxed(),
        LogFormat::Pretty => layer.with_target(true).boxed(),
    }
}

/// Install the global subscriber for `service_name`.
///
/// The log file `<prefix>.log` under `config.directory` always receives JSON
/// and rolls over per `config.rotation`. The console layer is skipped when
/// `config.stdout` is off, which keeps the output of one-shot commands clean.
/// Calling this again after a subscriber is installed is a no-op.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("unable to create log directory {}", config.directory.display())
    })?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);

    let appender = RollingFileAppender::builder()
        .rotation(config.rotation.into())
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(&config.directory)
        .with_context(|| format!("unable to open log file in {}", config.directory.display()))?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let mut guards = vec![file_guard];

    let console = if config.stdout {
        let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(stdout_guard);
        Some(console_layer(config.format, stdout_writer))
    } else {
        None
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer);

    let filter = resolve_filter(
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
    );

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .is_ok();
    if !installed {
        return Ok(());
    }
    let _ = GUARDS.set(guards);

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        rotation = ?config.rotation,
        stdout = config.stdout,
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn syros_log_takes_precedence() {
        let rendered =
            resolve_filter(Some("debug,syros_persistence=trace"), Some("warn")).to_string();
        assert!(rendered.contains("syros_persistence=trace"));
        assert!(!rendered.contains("warn"));
    }

    #[test]
    fn invalid_directive_falls_through_to_next_source() {
        assert_eq!(resolve_filter(Some("syros=loudest"), Some("warn")).to_string(), "warn");
        assert_eq!(resolve_filter(Some("  "), None).to_string(), DEFAULT_DIRECTIVE);
        assert_eq!(resolve_filter(None, None).to_string(), DEFAULT_DIRECTIVE);
    }

    #[test]
    fn rotation_parses_from_config_names() {
        let config: LoggingConfig = toml::from_str("rotation = \"never\"\nstdout = false").unwrap();
        assert_eq!(config.rotation, LogRotation::Never);
        assert!(!config.stdout);
        assert_eq!(LoggingConfig::default().rotation, LogRotation::Daily);
    }

    #[test]
    fn init_creates_log_directory_and_tolerates_reinit() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("indexer-test".into()),
            rotation: LogRotation::Never,
            stdout: false,
        };
        init_tracing("syros-indexer", &config).unwrap();
        init_tracing("syros-indexer", &config).unwrap();
        assert!(config.directory.is_dir());
    }
}
