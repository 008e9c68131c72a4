//! In-memory segment builder.
//!
//! The builder accumulates an inverted structure (term → growing postings)
//! for the documents added since the last flush. It is owned exclusively by
//! the indexing path and never read by queries.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use tracing::trace;

use crate::analysis::analyzer::{Analyzer, PerFieldAnalyzer};
use crate::analysis::token::Token;
use crate::document::{DocId, Document, FieldText};
use crate::error::{LexisError, Result};
use crate::segment::attributes::{self, StoredDocument};
use crate::segment::deletion::DeletionBitmap;
use crate::segment::dictionary::{DictionaryWriter, TermInfo};
use crate::segment::format::SegmentParts;
use crate::segment::posting::PostingEncoder;
use crate::segment::types::{LocalDocNo, SegmentId, make_position};

const TERM_OVERHEAD: usize = 64;
const POSTING_OVERHEAD: usize = 32;
const DOC_OVERHEAD: usize = 64;

#[derive(Debug)]
struct BufferedPosting {
    doc: LocalDocNo,
    positions: Vec<u32>,
}

/// Accumulates documents until they are flushed as a segment.
#[derive(Debug)]
pub struct SegmentBuilder {
    analyzers: Arc<PerFieldAnalyzer>,
    postings: AHashMap<String, Vec<BufferedPosting>>,
    docs: Vec<StoredDocument>,
    live_ids: AHashMap<DocId, LocalDocNo>,
    deleted: AHashSet<LocalDocNo>,
    // Ids whose published copies this buffer replaces once flushed.
    superseded: AHashSet<DocId>,
    estimated_bytes: usize,
}

impl SegmentBuilder {
    pub fn new(analyzers: Arc<PerFieldAnalyzer>) -> Self {
        SegmentBuilder {
            analyzers,
            postings: AHashMap::new(),
            docs: Vec::new(),
            live_ids: AHashMap::new(),
            deleted: AHashSet::new(),
            superseded: AHashSet::new(),
            estimated_bytes: 0,
        }
    }

    /// Analyze and buffer a document, returning its local number.
    ///
    /// A buffered document with the same id is superseded.
    pub fn add_document(&mut self, doc: &Document) -> Result<LocalDocNo> {
        let local = LocalDocNo::try_from(self.docs.len())
            .map_err(|_| LexisError::resource_exhausted("segment document limit reached"))?;

        for name in doc.fields.keys() {
            if self.analyzers.field_index(name).is_none() {
                trace!(doc_id = doc.id, field = %name, "ignoring unconfigured field");
            }
        }

        let analyzers = Arc::clone(&self.analyzers);
        let mut field_lengths = vec![0u32; analyzers.len()];
        for (field, analyzer) in analyzers.iter().enumerate() {
            let Some(content) = doc.field(analyzer.field()) else {
                continue;
            };
            field_lengths[field] = self.index_field(local, field, analyzer, content)?;
        }

        if let Some(previous) = self.live_ids.insert(doc.id, local) {
            self.deleted.insert(previous);
        }
        self.superseded.insert(doc.id);

        self.estimated_bytes += DOC_OVERHEAD
            + field_lengths.len() * 4
            + doc
                .attributes
                .iter()
                .map(|(k, v)| k.len() + 16 + v.as_str().map_or(0, str::len))
                .sum::<usize>();
        self.docs.push(StoredDocument {
            doc_id: doc.id,
            field_lengths,
            attributes: doc.attributes.clone(),
        });
        Ok(local)
    }

    fn index_field(
        &mut self,
        local: LocalDocNo,
        field: usize,
        analyzer: &Analyzer,
        content: &FieldText,
    ) -> Result<u32> {
        let mut length = 0u32;
        match content {
            FieldText::Text(text) => {
                for token in analyzer.analyze(text)? {
                    self.add_token(local, field, token);
                    length += 1;
                }
            }
            FieldText::Bytes(bytes) => {
                for token in analyzer.analyze_bytes(bytes)? {
                    self.add_token(local, field, token);
                    length += 1;
                }
            }
        }
        Ok(length)
    }

    fn add_token(&mut self, local: LocalDocNo, field: usize, token: Token) {
        let position = make_position(field, token.position);

        if let Some(list) = self.postings.get_mut(&token.text) {
            match list.last_mut() {
                Some(last) if last.doc == local => last.positions.push(position),
                _ => {
                    list.push(BufferedPosting {
                        doc: local,
                        positions: vec![position],
                    });
                    self.estimated_bytes += POSTING_OVERHEAD;
                }
            }
        } else {
            self.estimated_bytes += TERM_OVERHEAD + token.text.len() + POSTING_OVERHEAD;
            self.postings.insert(
                token.text,
                vec![BufferedPosting {
                    doc: local,
                    positions: vec![position],
                }],
            );
        }
        self.estimated_bytes += 4;
    }

    /// Tombstone a buffered document. Returns whether it was buffered.
    pub fn delete(&mut self, doc_id: DocId) -> bool {
        match self.live_ids.remove(&doc_id) {
            Some(local) => {
                self.deleted.insert(local);
                true
            }
            None => false,
        }
    }

    /// Whether a live copy of `doc_id` is buffered.
    pub fn contains(&self, doc_id: DocId) -> bool {
        self.live_ids.contains_key(&doc_id)
    }

    /// Ids of every document added since the last reset, sorted. Published
    /// copies of these are replaced when the buffer is flushed.
    pub fn superseded_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.superseded.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of buffered documents, including superseded ones.
    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Number of buffered live documents.
    pub fn live_doc_count(&self) -> usize {
        self.live_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Rough memory footprint of the buffer.
    pub fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }

    /// External ids of the buffered live documents.
    pub fn live_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.live_ids.keys().copied()
    }

    /// Encode the buffer as segment sections without consuming it, so a
    /// failed write can be retried.
    ///
    /// Returns `None` when no live document is buffered.
    pub fn build_parts(&self, segment_id: SegmentId) -> Result<Option<SegmentParts>> {
        if self.live_ids.is_empty() {
            return Ok(None);
        }

        let mut terms: Vec<&String> = self.postings.keys().collect();
        terms.sort_unstable();

        let mut encoder = PostingEncoder::new();
        let mut postings = Vec::new();
        let mut dictionary = DictionaryWriter::new();

        for term in terms {
            for posting in &self.postings[term] {
                encoder.add(posting.doc, &posting.positions)?;
            }
            let offset = postings.len() as u64;
            let encoded = encoder.finish(&mut postings);
            dictionary.add(term, &TermInfo::new(offset, encoded))?;
        }

        let doc_count = self.docs.len() as u32;
        let mut deletions = DeletionBitmap::new(doc_count);
        for &local in &self.deleted {
            deletions.delete(local)?;
        }

        Ok(Some(SegmentParts {
            segment_id,
            doc_count,
            term_count: dictionary.len(),
            field_count: self.analyzers.len() as u32,
            postings,
            dictionary: dictionary.finish(),
            attributes: attributes::encode_store(self.docs.iter()),
            deletions: deletions.encode(),
        }))
    }

    /// Drop everything buffered.
    pub fn reset(&mut self) {
        self.postings.clear();
        self.docs.clear();
        self.live_ids.clear();
        self.deleted.clear();
        self.superseded.clear();
        self.estimated_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, IndexConfig};
    use crate::segment::dictionary::TermDictionary;
    use crate::segment::posting::PostingCursor;

    fn builder() -> SegmentBuilder {
        let config = IndexConfig::with_fields(vec![
            FieldConfig::text("title"),
            FieldConfig::text("body"),
        ]);
        SegmentBuilder::new(Arc::new(PerFieldAnalyzer::new(&config).unwrap()))
    }

    fn doc(id: DocId, title: &str, body: &str) -> Document {
        Document::builder(id)
            .add_text("title", title)
            .add_text("body", body)
            .build()
    }

    #[test]
    fn test_local_numbers_in_insertion_order() {
        let mut b = builder();
        assert_eq!(b.add_document(&doc(100, "a", "b")).unwrap(), 0);
        assert_eq!(b.add_document(&doc(50, "a", "b")).unwrap(), 1);
        assert_eq!(b.doc_count(), 2);
        assert!(b.estimated_bytes() > 0);
    }

    #[test]
    fn test_build_parts_sorted_dictionary_and_positions() {
        let mut b = builder();
        b.add_document(&doc(1, "Quick fox", "the fox jumps")).unwrap();
        b.add_document(&doc(2, "lazy dog", "")).unwrap();

        let parts = b.build_parts(7).unwrap().unwrap();
        assert_eq!(parts.doc_count, 2);
        assert_eq!(parts.field_count, 2);

        let dict = TermDictionary::decode(&parts.dictionary, parts.postings.len() as u64).unwrap();
        let terms: Vec<&str> = dict.iter().map(|(t, _)| t).collect();
        assert_eq!(terms, vec!["dog", "fox", "jumps", "lazy", "quick", "the"]);

        let info = dict.get("fox").unwrap();
        assert_eq!(info.doc_freq, 1);
        assert_eq!(info.total_freq, 2);
        let block = &parts.postings[info.offset as usize..(info.offset + info.len) as usize];
        let mut cursor = PostingCursor::new(block, info.doc_freq, info.skip_count).unwrap();
        assert_eq!(cursor.doc(), Some(0));
        assert_eq!(
            cursor.positions().unwrap(),
            &[make_position(0, 1), make_position(1, 1)]
        );
    }

    #[test]
    fn test_upsert_inside_buffer_tombstones_previous_copy() {
        let mut b = builder();
        b.add_document(&doc(1, "old", "")).unwrap();
        b.add_document(&doc(1, "new", "")).unwrap();
        assert_eq!(b.live_doc_count(), 1);

        let parts = b.build_parts(1).unwrap().unwrap();
        let deletions = DeletionBitmap::decode(&parts.deletions).unwrap();
        assert!(deletions.is_deleted(0));
        assert!(!deletions.is_deleted(1));
    }

    #[test]
    fn test_superseded_ids_until_reset() {
        let mut b = builder();
        b.add_document(&doc(3, "a", "")).unwrap();
        b.add_document(&doc(1, "b", "")).unwrap();
        b.add_document(&doc(3, "c", "")).unwrap();
        assert_eq!(b.superseded_ids(), vec![1, 3]);

        b.reset();
        assert!(b.superseded_ids().is_empty());
    }

    #[test]
    fn test_fully_deleted_buffer_builds_nothing() {
        let mut b = builder();
        b.add_document(&doc(1, "x", "")).unwrap();
        assert!(b.delete(1));
        assert!(!b.delete(1));
        assert!(b.build_parts(1).unwrap().is_none());

        b.reset();
        assert!(b.is_empty());
    }
}
