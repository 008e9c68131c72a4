//! Opened, validated segments.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::document::DocId;
use crate::error::{LexisError, Result};
use crate::segment::attributes::{AttributeStore, StoredDocument};
use crate::segment::deletion::DeletionBitmap;
use crate::segment::dictionary::{TermDictionary, TermInfo};
use crate::segment::format::{SegmentHeader, SegmentLayout};
use crate::segment::posting::PostingCursor;
use crate::segment::segment_file_name;
use crate::segment::types::{LocalDocNo, SegmentId, SegmentStats};
use crate::storage::{FileData, Storage};

/// An immutable segment shared by the index and in-flight snapshots.
///
/// The dictionary and attribute store are decoded when the segment is
/// opened; postings are decoded lazily from the (possibly memory-mapped)
/// file image. Once [`retire`](Self::retire)d, the backing file is deleted
/// when the last reference is dropped.
pub struct Segment {
    id: SegmentId,
    file_name: String,
    storage: Arc<dyn Storage>,
    data: FileData,
    header: SegmentHeader,
    dictionary: TermDictionary,
    store: AttributeStore,
    base_deletions: DeletionBitmap,
    retired: AtomicBool,
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("doc_count", &self.header.doc_count)
            .field("term_count", &self.header.term_count)
            .field("retired", &self.retired.load(Ordering::Relaxed))
            .finish()
    }
}

impl Segment {
    /// Open and validate the segment `id`.
    ///
    /// Any structural problem is reported as
    /// [`LexisError::SegmentCorruption`].
    pub fn open(storage: Arc<dyn Storage>, id: SegmentId) -> Result<Arc<Segment>> {
        let file_name = segment_file_name(id);
        let data = storage.read_all(&file_name)?;

        let corrupt = |reason: String| LexisError::corruption(&file_name, reason);
        let layout = SegmentLayout::parse(&file_name, &data)?;
        let header = layout.header.clone();
        if header.segment_id != id {
            return Err(corrupt(format!("header names segment {}", header.segment_id)));
        }

        let postings_len = layout.postings.len() as u64;
        let dictionary = TermDictionary::decode(layout.dictionary, postings_len)
            .map_err(|e| corrupt(format!("dictionary: {e}")))?;
        if dictionary.len() != header.term_count as usize {
            return Err(corrupt(format!(
                "dictionary holds {} terms, header says {}",
                dictionary.len(),
                header.term_count
            )));
        }

        let store = AttributeStore::decode(
            layout.attributes,
            header.doc_count,
            header.field_count as usize,
        )
        .map_err(|e| corrupt(format!("attributes: {e}")))?;

        let base_deletions = DeletionBitmap::decode(layout.deletions)
            .map_err(|e| corrupt(format!("deletions: {e}")))?;
        if base_deletions.doc_count() != header.doc_count {
            return Err(corrupt("deletion bitmap size mismatch".to_string()));
        }

        debug!(
            segment = id,
            docs = header.doc_count,
            terms = header.term_count,
            bytes = data.len(),
            "opened segment"
        );

        Ok(Arc::new(Segment {
            id,
            file_name,
            storage,
            data,
            header,
            dictionary,
            store,
            base_deletions,
            retired: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn doc_count(&self) -> u32 {
        self.header.doc_count
    }

    pub fn field_count(&self) -> usize {
        self.header.field_count as usize
    }

    pub fn term_count(&self) -> u32 {
        self.header.term_count
    }

    /// Size of the segment file in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Deletions recorded in the segment file itself.
    pub fn base_deletions(&self) -> &DeletionBitmap {
        &self.base_deletions
    }

    /// Dictionary entry of `term`.
    pub fn term_info(&self, term: &str) -> Option<&TermInfo> {
        self.dictionary.get(term)
    }

    /// Cursor over the postings of `term`, `None` when absent.
    pub fn postings(&self, term: &str) -> Result<Option<PostingCursor<'_>>> {
        match self.term_info(term) {
            Some(info) => self.postings_for(info).map(Some),
            None => Ok(None),
        }
    }

    /// Cursor over a posting block described by a dictionary entry.
    pub fn postings_for(&self, info: &TermInfo) -> Result<PostingCursor<'_>> {
        let layout_start = self.header.postings.offset as usize;
        let start = layout_start + info.offset as usize;
        let end = start + info.len as usize;
        let block = self
            .data
            .get(start..end)
            .ok_or_else(|| LexisError::corruption(&self.file_name, "posting block out of bounds"))?;
        PostingCursor::new(block, info.doc_freq, info.skip_count)
    }

    /// All terms with their dictionary entries, in sorted order.
    pub fn terms(&self) -> impl ExactSizeIterator<Item = (&str, &TermInfo)> {
        self.dictionary.iter()
    }

    pub fn stored(&self, local: LocalDocNo) -> Option<&StoredDocument> {
        self.store.get(local)
    }

    pub fn doc_id(&self, local: LocalDocNo) -> Option<DocId> {
        self.store.get(local).map(|d| d.doc_id)
    }

    /// Local numbers holding `doc_id`.
    pub fn lookup(&self, doc_id: DocId) -> Vec<LocalDocNo> {
        match self.store.lookup(doc_id) {
            Some(_) => self.store.lookup_all(doc_id),
            None => Vec::new(),
        }
    }

    /// Sum of field lengths per field over every document in the file.
    pub fn total_field_lengths(&self) -> &[u64] {
        self.store.total_field_lengths()
    }

    pub fn stored_documents(&self) -> impl Iterator<Item = &StoredDocument> {
        self.store.iter()
    }

    /// Statistics under the given deletion bitmap.
    pub fn stats(&self, deletions: &DeletionBitmap) -> SegmentStats {
        SegmentStats {
            id: self.id,
            doc_count: self.doc_count(),
            live_doc_count: deletions.live_count(),
            term_count: self.term_count(),
            size_bytes: self.size_bytes(),
            total_field_lengths: self.total_field_lengths().to_vec(),
        }
    }

    /// Mark the segment for physical deletion once unreferenced.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if !self.is_retired() {
            return;
        }
        match self.storage.delete_file(&self.file_name) {
            Ok(()) => debug!(segment = self.id, file = %self.file_name, "reclaimed retired segment"),
            Err(err) => warn!(
                segment = self.id,
                file = %self.file_name,
                error = %err,
                "failed to delete retired segment"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::PerFieldAnalyzer;
    use crate::config::{FieldConfig, IndexConfig};
    use crate::document::{AttributeValue, Document};
    use crate::segment::builder::SegmentBuilder;
    use crate::segment::format::write_segment;
    use crate::storage::memory::MemoryStorage;

    fn write_test_segment(storage: &Arc<dyn Storage>, id: SegmentId) {
        let config = IndexConfig::with_fields(vec![FieldConfig::text("body")]);
        let mut builder = SegmentBuilder::new(Arc::new(PerFieldAnalyzer::new(&config).unwrap()));
        for i in 0..200u64 {
            let text = if i % 2 == 0 { "even number" } else { "odd number" };
            builder
                .add_document(
                    &Document::builder(1000 + i)
                        .add_text("body", text)
                        .add_attribute("n", i as i64)
                        .build(),
                )
                .unwrap();
        }
        let parts = builder.build_parts(id).unwrap().unwrap();
        write_segment(storage, &parts).unwrap();
    }

    #[test]
    fn test_open_and_read() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        write_test_segment(&storage, 3);

        let segment = Segment::open(Arc::clone(&storage), 3).unwrap();
        assert_eq!(segment.doc_count(), 200);
        assert_eq!(segment.term_count(), 3);
        assert_eq!(segment.total_field_lengths(), &[400]);
        assert_eq!(segment.term_info("number").unwrap().doc_freq, 200);

        let mut cursor = segment.postings("odd").unwrap().unwrap();
        assert_eq!(cursor.doc(), Some(1));
        assert_eq!(cursor.seek(150).unwrap(), Some(151));
        assert!(segment.postings("missing").unwrap().is_none());

        assert_eq!(segment.doc_id(5), Some(1005));
        assert_eq!(segment.lookup(1005), vec![5]);
        assert_eq!(
            segment.stored(5).unwrap().attributes.get("n"),
            Some(&AttributeValue::Int(5))
        );
    }

    #[test]
    fn test_wrong_id_is_corruption() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        write_test_segment(&storage, 3);
        storage.rename_file(&segment_file_name(3), &segment_file_name(4)).unwrap();
        let err = Segment::open(storage, 4).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_retired_segment_deleted_on_last_drop() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        write_test_segment(&storage, 1);

        let segment = Segment::open(Arc::clone(&storage), 1).unwrap();
        let snapshot_ref = Arc::clone(&segment);
        segment.retire();
        drop(segment);
        assert!(storage.file_exists(&segment_file_name(1)));

        drop(snapshot_ref);
        assert!(!storage.file_exists(&segment_file_name(1)));
    }
}
