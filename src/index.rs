//! Index lifecycle.
//!
//! An [`Index`] ties together the persisted configuration, the
//! [`IndexManager`] holding the published segment set, and the
//! [`IndexWriter`] owning the in-memory buffer. Searchers are created from
//! the index and take a fresh snapshot for every query.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use lexis::config::{FieldConfig, IndexConfig};
//! use lexis::document::Document;
//! use lexis::index::Index;
//! use lexis::storage::memory::MemoryStorage;
//!
//! # fn main() -> lexis::error::Result<()> {
//! let config = IndexConfig::with_fields(vec![FieldConfig::text("body")]);
//! let index = Index::create(Arc::new(MemoryStorage::new_default()), config)?;
//!
//! let writer = index.writer();
//! writer.add_document(&Document::builder(1).add_text("body", "hello world").build())?;
//! writer.commit()?;
//!
//! assert_eq!(index.stats().live_doc_count, 1);
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod manifest;
pub mod segment_set;
pub mod writer;

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::analyzer::PerFieldAnalyzer;
use crate::config::IndexConfig;
use crate::error::{LexisError, Result};
use crate::search::Searcher;
use crate::segment::{SegmentId, SegmentStats};
use crate::storage::file::{FileStorage, FileStorageConfig};
use crate::storage::{Storage, StorageOutput};

pub use manager::IndexManager;
pub use segment_set::{LiveSegment, SegmentSet, Snapshot};
pub use writer::IndexWriter;

/// Name of the persisted configuration file.
pub const CONFIG_FILE: &str = "index.json";

/// Format version of [`CONFIG_FILE`].
const INDEX_FORMAT_VERSION: u32 = 1;

/// Contents of [`CONFIG_FILE`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexMetadata {
    format_version: u32,
    created_at: DateTime<Utc>,
    config: IndexConfig,
}

/// Statistics of an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of published segments.
    pub segment_count: usize,

    /// Documents in published segments, including deleted ones.
    pub doc_count: u64,

    /// Documents visible to queries.
    pub live_doc_count: u64,

    /// Documents deleted but not yet merged away.
    pub deleted_count: u64,

    /// Documents waiting in the writer's buffer.
    pub buffered_docs: usize,

    /// Size of the published segment files.
    pub size_bytes: u64,

    /// Segments excluded from snapshots after failing validation.
    pub corrupt_segments: Vec<SegmentId>,

    pub generation: u64,
    pub snapshot_version: u64,
    pub created_at: DateTime<Utc>,
    pub segments: Vec<SegmentStats>,
}

/// A full-text index.
#[derive(Debug)]
pub struct Index {
    storage: Arc<dyn Storage>,
    metadata: IndexMetadata,
    config: Arc<IndexConfig>,
    analyzers: Arc<PerFieldAnalyzer>,
    manager: Arc<IndexManager>,
    writer: Arc<IndexWriter>,
}

impl Index {
    /// Create a new index in empty storage.
    pub fn create(storage: Arc<dyn Storage>, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        if storage.file_exists(CONFIG_FILE) {
            return Err(LexisError::index("an index already exists in this storage"));
        }

        let metadata = IndexMetadata {
            format_version: INDEX_FORMAT_VERSION,
            created_at: Utc::now(),
            config,
        };
        write_metadata(&storage, &metadata)?;
        let manager = IndexManager::create(Arc::clone(&storage))?;
        info!(fields = metadata.config.fields.len(), "created index");

        Self::assemble(storage, metadata, manager)
    }

    /// Open an existing index.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        let metadata = read_metadata(&storage)?;
        let manager = IndexManager::open(Arc::clone(&storage))?;
        Self::assemble(storage, metadata, manager)
    }

    /// Create a new index in a directory.
    pub fn create_in_dir<P: AsRef<Path>>(dir: P, config: IndexConfig) -> Result<Self> {
        let storage = FileStorage::new(&dir, FileStorageConfig::new(&dir))?;
        Self::create(Arc::new(storage), config)
    }

    /// Open an existing index in a directory.
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let storage = FileStorage::new(&dir, FileStorageConfig::new(&dir))?;
        Self::open(Arc::new(storage))
    }

    /// Whether `storage` holds an index.
    pub fn exists(storage: &Arc<dyn Storage>) -> bool {
        storage.file_exists(CONFIG_FILE)
    }

    fn assemble(
        storage: Arc<dyn Storage>,
        metadata: IndexMetadata,
        manager: IndexManager,
    ) -> Result<Self> {
        let config = Arc::new(metadata.config.clone());
        let analyzers = Arc::new(PerFieldAnalyzer::new(&config)?);
        let manager = Arc::new(manager);
        let writer = Arc::new(IndexWriter::new(
            Arc::clone(&manager),
            Arc::clone(&analyzers),
            &config,
        )?);

        Ok(Index {
            storage,
            metadata,
            config,
            analyzers,
            manager,
            writer,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn analyzers(&self) -> &Arc<PerFieldAnalyzer> {
        &self.analyzers
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    /// The writer of this index. All clones share one buffer.
    pub fn writer(&self) -> Arc<IndexWriter> {
        Arc::clone(&self.writer)
    }

    /// A searcher over the published segments.
    pub fn searcher(&self) -> Result<Searcher> {
        Searcher::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.analyzers),
            &self.config,
        )
    }

    /// Snapshot of the published segments.
    pub fn snapshot(&self) -> Snapshot {
        self.manager.current_snapshot()
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.manager.current_snapshot();
        let segments: Vec<SegmentStats> = snapshot.segments().iter().map(|s| s.stats()).collect();

        IndexStats {
            segment_count: segments.len(),
            doc_count: snapshot.doc_count(),
            live_doc_count: snapshot.live_doc_count(),
            deleted_count: snapshot.doc_count() - snapshot.live_doc_count(),
            buffered_docs: self.writer.buffered_docs(),
            size_bytes: segments.iter().map(|s| s.size_bytes).sum(),
            corrupt_segments: self.manager.corrupt_segments(),
            generation: self.manager.generation(),
            snapshot_version: snapshot.version(),
            created_at: self.metadata.created_at,
            segments,
        }
    }

    /// Commit pending work and stop background merging.
    pub fn close(&self) -> Result<()> {
        self.writer.close()
    }
}

fn write_metadata(storage: &Arc<dyn Storage>, metadata: &IndexMetadata) -> Result<()> {
    let json = serde_json::to_vec_pretty(metadata)?;
    let (temp_name, mut output) = storage.create_temp_output(CONFIG_FILE)?;
    let written = output
        .write_all(&json)
        .map_err(LexisError::from)
        .and_then(|_| output.close());
    if let Err(err) = written.and_then(|_| storage.rename_file(&temp_name, CONFIG_FILE)) {
        let _ = storage.delete_file(&temp_name);
        return Err(err);
    }
    Ok(())
}

fn read_metadata(storage: &Arc<dyn Storage>) -> Result<IndexMetadata> {
    if !storage.file_exists(CONFIG_FILE) {
        return Err(LexisError::index("no index found in this storage"));
    }
    let mut json = String::new();
    storage.open_input(CONFIG_FILE)?.read_to_string(&mut json)?;
    let metadata: IndexMetadata = serde_json::from_str(&json)?;
    if metadata.format_version != INDEX_FORMAT_VERSION {
        return Err(LexisError::index(format!(
            "unsupported index format version {}",
            metadata.format_version
        )));
    }
    metadata.config.validate()?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;
    use crate::document::Document;
    use crate::storage::memory::MemoryStorage;

    fn config() -> IndexConfig {
        IndexConfig {
            background_merge: false,
            ..IndexConfig::with_fields(vec![FieldConfig::text("title"), FieldConfig::text("body")])
        }
    }

    #[test]
    fn test_create_then_open() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        assert!(!Index::exists(&storage));

        let index = Index::create(Arc::clone(&storage), config()).unwrap();
        index
            .writer()
            .add_document(&Document::builder(1).add_text("body", "rust").build())
            .unwrap();
        index.close().unwrap();
        let created_at = index.stats().created_at;
        drop(index);

        assert!(Index::exists(&storage));
        assert!(Index::create(Arc::clone(&storage), config()).is_err());

        let index = Index::open(storage).unwrap();
        assert_eq!(index.config(), &config());
        let stats = index.stats();
        assert_eq!(stats.live_doc_count, 1);
        assert_eq!(stats.segment_count, 1);
        assert_eq!(stats.created_at, created_at);
    }

    #[test]
    fn test_open_without_index() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        assert!(Index::open(storage).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let result = Index::create(Arc::clone(&storage), IndexConfig::with_fields(vec![]));
        assert!(matches!(result, Err(LexisError::Config(_))));
        assert!(storage.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_stats_count_deletions() {
        let index = Index::create(Arc::new(MemoryStorage::new_default()), config()).unwrap();
        let writer = index.writer();
        for id in 1..=3 {
            writer
                .add_document(&Document::builder(id).add_text("title", "t").build())
                .unwrap();
        }
        writer.flush().unwrap();
        writer.delete_document(2).unwrap();
        writer
            .add_document(&Document::builder(4).add_text("title", "t").build())
            .unwrap();

        let stats = index.stats();
        assert_eq!(stats.doc_count, 3);
        assert_eq!(stats.live_doc_count, 2);
        assert_eq!(stats.deleted_count, 1);
        assert_eq!(stats.buffered_docs, 1);
        assert!(stats.corrupt_segments.is_empty());
    }
}
