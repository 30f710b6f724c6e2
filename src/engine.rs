//! High-level storage engine composing the in-memory index and segment log.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::index::Index;
use crate::log::Log;
use crate::record::Record;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Concurrent key-value store with append-only persistence.
///
/// Cloning produces another handle onto the same engine.
#[derive(Clone)]
pub struct TideKv {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    index: Index,
    log: Log,
}

/// Builder used to configure the storage engine before opening it.
#[derive(Clone, Debug)]
pub struct TideKvBuilder {
    directory: PathBuf,
    config: EngineConfig,
}

impl TideKv {
    /// Opens the engine inside the provided directory with default
    /// configuration, replaying existing segments first.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        TideKvBuilder::new(directory).build()
    }

    /// Returns a builder to customize the engine's sizing parameters.
    pub fn builder(directory: impl AsRef<Path>) -> TideKvBuilder {
        TideKvBuilder::new(directory)
    }

    /// Stores or updates a value.
    pub fn put(&self, key: i32, value: String) -> Result<()> {
        self.write(key, Some(value))
    }

    /// Marks the key deleted with a tombstone record. The key stays in the
    /// index; lookups report no value.
    pub fn delete(&self, key: i32) -> Result<()> {
        self.write(key, None)
    }

    /// Returns the value stored for the key, or `None` when the key is
    /// unknown or tombstoned.
    pub fn get(&self, key: i32) -> Result<Option<String>> {
        match self.inner.index.get(key) {
            Some(pointer) => self.inner.log.read(&pointer),
            None => Ok(None),
        }
    }

    /// Whether the key has an index entry, tombstoned or not.
    pub fn contains(&self, key: i32) -> bool {
        self.inner.index.contains(key)
    }

    /// Number of keys tracked by the index, tombstones included.
    pub fn key_count(&self) -> usize {
        self.inner.index.len()
    }

    /// Shuts the engine down: reader pools drain and stop, then the write
    /// handle closes. Later operations fail with
    /// [`TideError::Closed`](crate::TideError::Closed).
    pub fn close(&self) {
        self.inner.log.close();
    }

    fn write(&self, key: i32, value: Option<String>) -> Result<()> {
        let record = Record::new(next_timestamp(), key, value)?;
        self.inner
            .index
            .update_with(key, || self.inner.log.append(&record))
    }
}

impl TideKvBuilder {
    /// Creates a builder rooted at the provided directory with default
    /// sizing.
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            config: EngineConfig::default(),
        }
    }

    /// Overrides the segment rotation threshold in bytes.
    pub fn segment_size_limit(mut self, bytes: u64) -> Self {
        self.config.segment_size_limit = bytes;
        self
    }

    /// Overrides the two-phase append chunk size in bytes.
    pub fn append_chunk_size(mut self, bytes: usize) -> Self {
        self.config.append_chunk_size = bytes;
        self
    }

    /// Overrides the number of read handles opened per segment.
    pub fn reader_pool_size(mut self, width: usize) -> Self {
        self.config.reader_pool_size = width;
        self
    }

    /// Builds the engine, replaying the segment files into the index.
    pub fn build(self) -> Result<TideKv> {
        let (log, replayed) = Log::open(&self.directory, self.config)?;
        let records = replayed.len();
        let index = Index::rebuild(replayed);
        info!(
            records,
            keys = index.len(),
            "index rebuilt from segment replay"
        );
        Ok(TideKv {
            inner: Arc::new(EngineInner { index, log }),
        })
    }
}

/// Millisecond wall-clock timestamp, forced non-decreasing within this
/// process.
fn next_timestamp() -> i64 {
    static LAST: AtomicI64 = AtomicI64::new(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0);
    LAST.fetch_max(now, Ordering::SeqCst).max(now)
}
