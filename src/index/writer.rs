//! The indexing path.
//!
//! [`IndexWriter`] owns the in-memory [`SegmentBuilder`]. Documents are
//! analysed into the builder until its estimated size reaches the memory
//! budget, at which point the builder is flushed as a new segment and
//! registered with the [`IndexManager`]. The builder is never visible to
//! queries.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::analysis::analyzer::PerFieldAnalyzer;
use crate::config::IndexConfig;
use crate::document::{DocId, Document};
use crate::error::{LexisError, Result};
use crate::index::manager::IndexManager;
use crate::merge::merger::{MergeStats, SegmentMerger};
use crate::merge::policy::{MergePolicy, TieredMergePolicy};
use crate::merge::scheduler::MergeScheduler;
use crate::segment::format::write_segment;
use crate::segment::{Segment, SegmentBuilder, SegmentMeta, segment_file_name};
use crate::util::retry::{RetryConfig, retry};

/// Adds, replaces and deletes documents.
#[derive(Debug)]
pub struct IndexWriter {
    manager: Arc<IndexManager>,
    merger: Arc<SegmentMerger>,
    policy: Arc<dyn MergePolicy>,
    builder: Mutex<SegmentBuilder>,
    scheduler: Mutex<Option<MergeScheduler>>,
    memory_budget: usize,
    retry: RetryConfig,
}

impl IndexWriter {
    /// A writer using the size-tiered merge policy of `config`.
    pub fn new(
        manager: Arc<IndexManager>,
        analyzers: Arc<PerFieldAnalyzer>,
        config: &IndexConfig,
    ) -> Result<Self> {
        let policy = Arc::new(TieredMergePolicy::new(config.merge.clone()));
        Self::with_policy(manager, analyzers, config, policy)
    }

    pub fn with_policy(
        manager: Arc<IndexManager>,
        analyzers: Arc<PerFieldAnalyzer>,
        config: &IndexConfig,
        policy: Arc<dyn MergePolicy>,
    ) -> Result<Self> {
        let merger = Arc::new(SegmentMerger::new(
            Arc::clone(manager.storage()),
            config.retry.clone(),
        ));
        let scheduler = if config.background_merge {
            Some(MergeScheduler::start(
                Arc::clone(&manager),
                Arc::clone(&merger),
                Arc::clone(&policy),
            )?)
        } else {
            None
        };

        Ok(IndexWriter {
            manager,
            merger,
            policy,
            builder: Mutex::new(SegmentBuilder::new(analyzers)),
            scheduler: Mutex::new(scheduler),
            memory_budget: config.memory_budget_bytes,
            retry: config.retry.clone(),
        })
    }

    /// Add a document, replacing any document with the same id.
    ///
    /// A published copy stays visible until the replacement is flushed; both
    /// change in the same set version. Flushes the buffer when the memory
    /// budget is exceeded.
    pub fn add_document(&self, doc: &Document) -> Result<()> {
        let mut builder = self.builder.lock();

        match builder.add_document(doc) {
            Ok(_) => {}
            Err(LexisError::ResourceExhausted(reason)) if !builder.is_empty() => {
                debug!(%reason, "buffer full, flushing before retrying the document");
                self.flush_locked(&mut builder)?;
                builder.add_document(doc)?;
            }
            Err(err) => return Err(err),
        }

        if builder.estimated_bytes() >= self.memory_budget {
            debug!(
                bytes = builder.estimated_bytes(),
                budget = self.memory_budget,
                "memory budget reached, forcing flush"
            );
            self.flush_locked(&mut builder)?;
        }
        Ok(())
    }

    /// Delete a document. Returns whether a live copy existed.
    pub fn delete_document(&self, doc_id: DocId) -> Result<bool> {
        Ok(self.delete_documents(&[doc_id])? > 0)
    }

    /// Delete documents, returning how many live copies were removed.
    ///
    /// Published copies become invisible to new snapshots immediately.
    pub fn delete_documents(&self, doc_ids: &[DocId]) -> Result<usize> {
        let mut builder = self.builder.lock();
        let buffered = doc_ids.iter().filter(|&&id| builder.delete(id)).count();
        let published = self.manager.delete_documents(doc_ids)?;
        Ok(buffered + published)
    }

    /// Write the buffered documents as a new segment.
    ///
    /// Returns `None` when nothing needed flushing.
    pub fn flush(&self) -> Result<Option<SegmentMeta>> {
        let mut builder = self.builder.lock();
        self.flush_locked(&mut builder)
    }

    fn flush_locked(&self, builder: &mut SegmentBuilder) -> Result<Option<SegmentMeta>> {
        if builder.is_empty() {
            return Ok(None);
        }

        let id = self.manager.allocate_segment_id();
        let Some(parts) = builder.build_parts(id)? else {
            debug!(docs = builder.doc_count(), "every buffered document was deleted");
            builder.reset();
            return Ok(None);
        };

        let storage = self.manager.storage();
        let size_bytes = retry(&self.retry, "flush", |_| write_segment(storage, &parts))?;
        let segment = match Segment::open(Arc::clone(storage), id) {
            Ok(segment) => segment,
            Err(err) => {
                let _ = storage.delete_file(&segment_file_name(id));
                return Err(err);
            }
        };
        self.manager
            .register_segment_replacing(segment, &builder.superseded_ids())?;

        let meta = SegmentMeta {
            id,
            doc_count: parts.doc_count,
            size_bytes,
            deletions: None,
        };
        info!(
            segment = id,
            docs = builder.doc_count(),
            live = builder.live_doc_count(),
            bytes = size_bytes,
            "flushed segment"
        );
        builder.reset();

        if let Some(scheduler) = self.scheduler.lock().as_ref() {
            scheduler.request_merge();
        }
        Ok(Some(meta))
    }

    /// Flush and make deletions durable.
    pub fn commit(&self) -> Result<()> {
        self.flush()?;
        self.manager.persist()
    }

    /// Run the merge policy on the calling thread.
    ///
    /// Returns the number of merges performed.
    pub fn merge_now(&self) -> Result<usize> {
        self.manager.run_merges(&self.merger, self.policy.as_ref())
    }

    /// Flush, then merge the whole index into a single segment.
    pub fn force_merge(&self) -> Result<Option<MergeStats>> {
        self.flush()?;
        self.manager.force_merge(&self.merger)
    }

    /// Ask the background worker to run the merge policy and wait for it.
    pub fn wait_for_merges(&self) -> Result<usize> {
        match self.scheduler.lock().as_ref() {
            Some(scheduler) => scheduler.merge_and_wait(),
            None => Ok(0),
        }
    }

    /// Number of buffered documents, including superseded copies.
    pub fn buffered_docs(&self) -> usize {
        self.builder.lock().doc_count()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.builder.lock().estimated_bytes()
    }

    /// Commit and stop the background merge worker.
    pub fn close(&self) -> Result<()> {
        self.commit()?;
        if let Some(mut scheduler) = self.scheduler.lock().take() {
            scheduler.shutdown();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;
    use crate::merge::policy::NoMergePolicy;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn writer_with(config: IndexConfig) -> (Arc<IndexManager>, IndexWriter) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let manager = Arc::new(IndexManager::create(storage).unwrap());
        let analyzers = Arc::new(PerFieldAnalyzer::new(&config).unwrap());
        let writer = IndexWriter::with_policy(
            Arc::clone(&manager),
            analyzers,
            &config,
            Arc::new(NoMergePolicy),
        )
        .unwrap();
        (manager, writer)
    }

    fn config() -> IndexConfig {
        IndexConfig {
            background_merge: false,
            ..IndexConfig::with_fields(vec![FieldConfig::text("body")])
        }
    }

    fn doc(id: DocId, text: &str) -> Document {
        Document::builder(id).add_text("body", text).build()
    }

    #[test]
    fn test_buffer_is_invisible_until_flush() {
        let (manager, writer) = writer_with(config());
        writer.add_document(&doc(1, "hello")).unwrap();
        assert_eq!(writer.buffered_docs(), 1);
        assert!(!manager.current_snapshot().contains(1));

        let meta = writer.flush().unwrap().unwrap();
        assert_eq!(meta.doc_count, 1);
        assert!(manager.current_snapshot().contains(1));
        assert_eq!(writer.buffered_docs(), 0);
        assert!(writer.flush().unwrap().is_none());
    }

    #[test]
    fn test_memory_budget_forces_flush() {
        let (manager, writer) = writer_with(IndexConfig {
            memory_budget_bytes: 512,
            ..config()
        });
        for i in 0..20 {
            writer
                .add_document(&doc(i, "some words that take up buffer space"))
                .unwrap();
        }
        let snapshot = manager.current_snapshot();
        assert!(snapshot.segments().len() > 1);
        assert!(writer.buffered_bytes() < 512);
    }

    #[test]
    fn test_upsert_replaces_published_copy() {
        let (manager, writer) = writer_with(config());
        writer.add_document(&doc(7, "old")).unwrap();
        writer.flush().unwrap();
        writer.add_document(&doc(7, "new")).unwrap();
        writer.flush().unwrap();

        let snapshot = manager.current_snapshot();
        assert_eq!(snapshot.live_doc_count(), 1);
        let old = &snapshot.segments()[0];
        assert_eq!(old.live_count(), 0);
    }

    #[test]
    fn test_upsert_keeps_published_copy_until_flush() {
        let (manager, writer) = writer_with(config());
        writer.add_document(&doc(7, "alpha")).unwrap();
        writer.flush().unwrap();

        writer.add_document(&doc(7, "alpha beta")).unwrap();
        let snapshot = manager.current_snapshot();
        assert!(snapshot.contains(7));
        assert_eq!(snapshot.live_doc_count(), 1);

        writer.flush().unwrap();
        let after = manager.current_snapshot();
        assert!(after.contains(7));
        assert_eq!(after.live_doc_count(), 1);
        assert_eq!(after.segments()[0].live_count(), 0);
        assert_eq!(after.segments()[1].live_count(), 1);
        assert_eq!(snapshot.segments()[0].live_count(), 1);
        assert!(after.version() > snapshot.version());
    }

    #[test]
    fn test_delete_after_upsert_removes_both_copies() {
        let (manager, writer) = writer_with(config());
        writer.add_document(&doc(7, "alpha")).unwrap();
        writer.flush().unwrap();
        writer.add_document(&doc(7, "alpha beta")).unwrap();

        assert_eq!(writer.delete_documents(&[7]).unwrap(), 2);
        assert!(writer.flush().unwrap().is_none());
        assert!(!manager.current_snapshot().contains(7));
    }

    #[test]
    fn test_delete_buffered_and_published() {
        let (manager, writer) = writer_with(config());
        writer.add_document(&doc(1, "a")).unwrap();
        writer.flush().unwrap();
        writer.add_document(&doc(2, "b")).unwrap();

        assert_eq!(writer.delete_documents(&[1, 2, 3]).unwrap(), 2);
        assert!(!writer.delete_document(1).unwrap());
        assert!(writer.flush().unwrap().is_none());
        assert_eq!(manager.current_snapshot().live_doc_count(), 0);
    }

    #[test]
    fn test_failed_flush_keeps_buffer() {
        let memory = Arc::new(MemoryStorage::new_default());
        let storage: Arc<dyn Storage> = memory.clone();
        let manager = Arc::new(IndexManager::create(storage).unwrap());
        let config = IndexConfig {
            retry: RetryConfig::no_retry(),
            ..config()
        };
        let analyzers = Arc::new(PerFieldAnalyzer::new(&config).unwrap());
        let writer = IndexWriter::new(Arc::clone(&manager), analyzers, &config).unwrap();

        writer.add_document(&doc(1, "a")).unwrap();
        memory.fail_next_closes(1);
        assert!(writer.flush().is_err());
        assert_eq!(writer.buffered_docs(), 1);
        assert!(manager.current_snapshot().segments().is_empty());

        writer.flush().unwrap();
        assert!(manager.current_snapshot().contains(1));
    }

    #[test]
    fn test_force_merge_compacts_everything() {
        let (manager, writer) = writer_with(config());
        for i in 0..3 {
            writer.add_document(&doc(i, "x")).unwrap();
            writer.flush().unwrap();
        }
        writer.delete_document(1).unwrap();
        writer.add_document(&doc(9, "x")).unwrap();

        let stats = writer.force_merge().unwrap().unwrap();
        assert_eq!(stats.segments_merged, 4);
        assert_eq!(stats.deleted_docs_removed, 1);

        let snapshot = manager.current_snapshot();
        assert_eq!(snapshot.segments().len(), 1);
        assert_eq!(snapshot.live_doc_count(), 3);
        assert_eq!(writer.merge_now().unwrap(), 0);
    }
}
