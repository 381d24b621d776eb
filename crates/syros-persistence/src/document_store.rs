//! ---
//! syros_section: "03-persistence"
//! syros_subsection: "module"
//! syros_type: "source"
//! syros_scope: "code"
//! syros_description: "Pooled document store backed by memory or JSON line files."
//! syros_version: "v0.0.0-prealpha"
//! syros_owner: "tbd"
//! ---
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use syros_common::config::DatabaseConfig;
use tracing::{debug, info, warn};

use crate::store::{Connection, Document, Filter, Store};
use crate::{PersistenceError, Result};

const COLLECTION_EXTENSION: &str = "jsonl";
/// Collection files shorter than this are never compacted on write.
const COMPACT_MIN_LINES: usize = 64;
/// Compact once the file holds this many lines per live document.
const COMPACT_RATIO: usize = 2;

/// Connection pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Upper bound on simultaneously checked-out connections.
    pub max_connections: usize,
    /// How long `connect` waits for a free connection.
    pub acquire_timeout: Duration,
}

impl StoreOptions {
    /// Derive pool options from the database configuration block.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            acquire_timeout: config.timeout,
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 16,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// One line of a collection file.
#[derive(Debug, Serialize, Deserialize)]
struct StoredLine {
    key: String,
    document: Document,
}

type CollectionData = IndexMap<String, Document>;

fn needs_compaction(lines: usize, live: usize) -> bool {
    lines >= COMPACT_MIN_LINES && lines > live.max(1) * COMPACT_RATIO
}

struct Pool {
    max: usize,
    timeout: Duration,
    in_use: Mutex<usize>,
    released: Condvar,
}

impl Pool {
    fn new(options: StoreOptions) -> Self {
        Self {
            max: options.max_connections.max(1),
            timeout: options.acquire_timeout,
            in_use: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    fn acquire(&self) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        let mut in_use = self.in_use.lock();
        while *in_use >= self.max {
            if self.released.wait_until(&mut in_use, deadline).timed_out() && *in_use >= self.max {
                return Err(PersistenceError::PoolTimeout {
                    timeout: self.timeout,
                });
            }
        }
        *in_use += 1;
        Ok(())
    }

    fn release(&self) {
        let mut in_use = self.in_use.lock();
        *in_use = in_use.saturating_sub(1);
        drop(in_use);
        self.released.notify_one();
    }
}

struct Shared {
    root: Option<PathBuf>,
    collections: Mutex<HashMap<String, CollectionData>>,
    indexes: Mutex<HashMap<String, BTreeSet<String>>>,
    /// Lines currently in each collection file.
    lines: Mutex<HashMap<String, usize>>,
    pool: Pool,
}

impl Shared {
    fn collection_path(&self, collection: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{collection}.{COLLECTION_EXTENSION}")))
    }
}

/// Keyed document store with a bounded connection pool.
///
/// Without a root directory everything lives in memory. With one, each
/// collection is a `<name>.jsonl` file. Writes append a line and opening the
/// store replays the lines, last write per key winning. The file is compacted
/// to one line per live document on open, after deletions, and whenever
/// superseded lines outnumber live documents.
#[derive(Clone)]
pub struct DocumentStore {
    shared: Arc<Shared>,
}

impl DocumentStore {
    /// Build an in-memory store with default pool options.
    pub fn in_memory() -> Self {
        Self::in_memory_with(StoreOptions::default())
    }

    /// Build an in-memory store with explicit pool options.
    pub fn in_memory_with(options: StoreOptions) -> Self {
        Self::from_parts(None, HashMap::new(), HashMap::new(), options)
    }

    /// Open (or create) a file-backed store rooted at `root`.
    pub fn open(root: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let mut collections = HashMap::new();
        let mut lines = HashMap::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(COLLECTION_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            validate_name(name)?;
            let (data, line_count) = load_collection(name, &path)?;
            if line_count > data.len() {
                write_collection(&path, data.iter())?;
                debug!(
                    collection = name,
                    documents = data.len(),
                    superseded = line_count - data.len(),
                    "collection compacted on open"
                );
            } else {
                debug!(collection = name, documents = data.len(), "collection loaded");
            }
            lines.insert(name.to_owned(), data.len());
            collections.insert(name.to_owned(), data);
        }

        info!(root = %root.display(), collections = collections.len(), "document store opened");
        Ok(Self::from_parts(Some(root), collections, lines, options))
    }

    /// Open the store described by the `[database]` configuration block.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::open(
            config.directory.join(&config.name),
            StoreOptions::from_config(config),
        )
    }

    fn from_parts(
        root: Option<PathBuf>,
        collections: HashMap<String, CollectionData>,
        lines: HashMap<String, usize>,
        options: StoreOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                root,
                collections: Mutex::new(collections),
                indexes: Mutex::new(HashMap::new()),
                lines: Mutex::new(lines),
                pool: Pool::new(options),
            }),
        }
    }

    /// Directory holding the collection files, if file-backed.
    pub fn root(&self) -> Option<&Path> {
        self.shared.root.as_deref()
    }

    /// Number of connections currently checked out.
    pub fn active_connections(&self) -> usize {
        *self.shared.pool.in_use.lock()
    }

    /// Index fields declared for `collection`.
    pub fn indexes(&self, collection: &str) -> Vec<String> {
        self.shared
            .indexes
            .lock()
            .get(collection)
            .map(|fields| fields.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of documents stored in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.shared
            .collections
            .lock()
            .get(collection)
            .map(IndexMap::len)
            .unwrap_or_default()
    }

    /// Copy of every document in `collection`, in insertion order.
    pub fn dump(&self, collection: &str) -> Vec<Document> {
        self.shared
            .collections
            .lock()
            .get(collection)
            .map(|data| data.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("root", &self.shared.root)
            .finish_non_exhaustive()
    }
}

impl Store for DocumentStore {
    type Connection = DocumentConnection;

    fn connect(&self) -> Result<DocumentConnection> {
        self.shared.pool.acquire()?;
        Ok(DocumentConnection {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Connection checked out of a [`DocumentStore`]; returned to the pool on drop.
pub struct DocumentConnection {
    shared: Arc<Shared>,
}

impl DocumentConnection {
    fn append(&self, collection: &str, key: &str, document: &Document) -> Result<()> {
        let Some(path) = self.shared.collection_path(collection) else {
            return Ok(());
        };
        let line = serde_json::to_string(&StoredLine {
            key: key.to_owned(),
            document: document.clone(),
        })?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Count the line just appended and compact the file once superseded
    /// lines dominate it. A failed compaction leaves the longer, still valid,
    /// file in place.
    fn track_append(&self, collection: &str, data: &CollectionData) {
        let Some(path) = self.shared.collection_path(collection) else {
            return;
        };
        let mut lines = self.shared.lines.lock();
        let count = lines.entry(collection.to_owned()).or_default();
        *count += 1;
        if !needs_compaction(*count, data.len()) {
            return;
        }
        match write_collection(&path, data.iter()) {
            Ok(()) => {
                debug!(
                    collection,
                    documents = data.len(),
                    superseded = *count - data.len(),
                    "collection compacted"
                );
                *count = data.len();
            }
            Err(err) => warn!(collection, error = %err, "collection compaction failed"),
        }
    }
}

impl Connection for DocumentConnection {
    fn find_by_key(&mut self, collection: &str, key: &str) -> Result<Option<Document>> {
        validate_name(collection)?;
        let collections = self.shared.collections.lock();
        Ok(collections
            .get(collection)
            .and_then(|data| data.get(key))
            .cloned())
    }

    fn insert(&mut self, collection: &str, key: &str, document: Document) -> Result<()> {
        validate_name(collection)?;
        let mut collections = self.shared.collections.lock();
        if collections
            .get(collection)
            .is_some_and(|data| data.contains_key(key))
        {
            return Err(PersistenceError::DuplicateKey {
                collection: collection.to_owned(),
                key: key.to_owned(),
            });
        }
        self.append(collection, key, &document)?;
        let data = collections.entry(collection.to_owned()).or_default();
        data.insert(key.to_owned(), document);
        self.track_append(collection, data);
        Ok(())
    }

    fn upsert(&mut self, collection: &str, key: &str, document: Document) -> Result<()> {
        validate_name(collection)?;
        let mut collections = self.shared.collections.lock();
        self.append(collection, key, &document)?;
        let data = collections.entry(collection.to_owned()).or_default();
        data.insert(key.to_owned(), document);
        self.track_append(collection, data);
        Ok(())
    }

    fn delete_where(&mut self, collection: &str, filter: &Filter) -> Result<u64> {
        validate_name(collection)?;
        let mut collections = self.shared.collections.lock();
        let Some(data) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let removed = data.values().filter(|doc| filter.matches(doc)).count();
        if removed == 0 {
            return Ok(0);
        }
        if let Some(path) = self.shared.collection_path(collection) {
            write_collection(&path, data.iter().filter(|(_, doc)| !filter.matches(doc)))?;
        }
        data.retain(|_, doc| !filter.matches(doc));
        self.shared
            .lines
            .lock()
            .insert(collection.to_owned(), data.len());
        Ok(removed as u64)
    }

    fn ensure_index(&mut self, collection: &str, field: &str) -> Result<()> {
        validate_name(collection)?;
        self.shared
            .indexes
            .lock()
            .entry(collection.to_owned())
            .or_default()
            .insert(field.to_owned());
        Ok(())
    }
}

impl Drop for DocumentConnection {
    fn drop(&mut self) {
        self.shared.pool.release();
    }
}

fn validate_name(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidCollection(collection.to_owned()))
    }
}

/// Atomically replace the file at `path` with one line per entry.
fn write_collection<'a>(
    path: &Path,
    entries: impl Iterator<Item = (&'a String, &'a Document)>,
) -> Result<()> {
    let staging = path.with_extension(format!("{COLLECTION_EXTENSION}.tmp"));
    {
        let mut writer = BufWriter::new(File::create(&staging)?);
        for (key, document) in entries {
            let line = serde_json::to_string(&StoredLine {
                key: key.clone(),
                document: document.clone(),
            })?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&staging, path)?;
    Ok(())
}

/// Replay a collection file, returning the live documents and the number of
/// non-empty lines read.
fn load_collection(name: &str, path: &Path) -> Result<(CollectionData, usize)> {
    let reader = BufReader::new(File::open(path)?);
    let mut data = CollectionData::new();
    let mut line_count = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let stored: StoredLine =
            serde_json::from_str(&line).map_err(|err| PersistenceError::Corrupt {
                collection: name.to_owned(),
                line: index + 1,
                reason: err.to_string(),
            })?;
        data.insert(stored.key, stored.document);
        line_count += 1;
    }
    Ok((data, line_count))
}
