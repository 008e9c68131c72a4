//! K-way segment merging.
//!
//! Inputs are a contiguous run of the segment set. Documents are renumbered
//! in input order with deleted documents dropped, so the merged segment
//! preserves the global document order of its inputs. Term dictionaries are
//! merged through a binary heap keyed by term (ties broken by input order)
//! and, for each term, the posting lists of the inputs are concatenated.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{LexisError, Result};
use crate::index::segment_set::LiveSegment;
use crate::segment::attributes;
use crate::segment::dictionary::{DictionaryWriter, TermInfo};
use crate::segment::format::{SegmentParts, write_segment};
use crate::segment::posting::PostingEncoder;
use crate::segment::{DeletionBitmap, LocalDocNo, Segment, SegmentId, segment_file_name};
use crate::storage::Storage;
use crate::util::retry::{RetryConfig, retry};
use crate::util::varint::encode_u64_into;

/// Statistics about a merge operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeStats {
    pub segments_merged: usize,
    pub docs_before: u64,
    pub docs_after: u64,
    pub deleted_docs_removed: u64,
    pub terms_merged: u64,
    pub size_before: u64,
    pub size_after: u64,
    pub merge_time_ms: u64,
}

/// New local numbers of the documents of one input.
#[derive(Debug, Clone)]
pub struct DocRemap {
    pub segment: SegmentId,

    /// The deletions the merge honoured.
    pub deletions: Arc<DeletionBitmap>,

    map: Vec<Option<LocalDocNo>>,
}

impl DocRemap {
    fn build(entry: &LiveSegment, next: &mut LocalDocNo) -> Self {
        let map = (0..entry.doc_count())
            .map(|local| {
                if entry.is_deleted(local) {
                    None
                } else {
                    let new = *next;
                    *next += 1;
                    Some(new)
                }
            })
            .collect();
        DocRemap {
            segment: entry.id(),
            deletions: Arc::clone(&entry.deletions),
            map,
        }
    }

    /// New number of an input document, `None` if it was dropped.
    #[inline]
    pub fn get(&self, local: LocalDocNo) -> Option<LocalDocNo> {
        self.map.get(local as usize).copied().flatten()
    }
}

/// Result of a merge.
#[derive(Debug)]
pub struct MergeResult {
    /// The merged segment, `None` when every input document was deleted.
    pub segment: Option<Arc<Segment>>,

    /// One entry per input, in input order.
    pub remaps: Vec<DocRemap>,

    pub stats: MergeStats,
}

struct HeapEntry<'a> {
    term: &'a str,
    input: usize,
    info: &'a TermInfo,
}

impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry<'_> {}

impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.term
            .cmp(other.term)
            .then_with(|| self.input.cmp(&other.input))
    }
}

/// Writes merged segments.
#[derive(Debug)]
pub struct SegmentMerger {
    storage: Arc<dyn Storage>,
    retry: RetryConfig,
}

impl SegmentMerger {
    pub fn new(storage: Arc<dyn Storage>, retry: RetryConfig) -> Self {
        SegmentMerger { storage, retry }
    }

    /// Merge `inputs` into a new segment `new_id`.
    ///
    /// The inputs are left untouched; publishing the result in place of the
    /// inputs is up to the caller.
    pub fn merge(&self, inputs: &[LiveSegment], new_id: SegmentId) -> Result<MergeResult> {
        if inputs.is_empty() {
            return Err(LexisError::index("no segments to merge"));
        }
        let field_count = inputs[0].segment.field_count();
        if inputs.iter().any(|s| s.segment.field_count() != field_count) {
            return Err(LexisError::index("cannot merge segments with different field counts"));
        }

        let start = Instant::now();
        debug!(
            segment = new_id,
            inputs = ?inputs.iter().map(LiveSegment::id).collect::<Vec<_>>(),
            "merge started"
        );

        let mut next = 0;
        let remaps: Vec<DocRemap> = inputs.iter().map(|e| DocRemap::build(e, &mut next)).collect();
        let doc_count = next;

        let mut stats = MergeStats {
            segments_merged: inputs.len(),
            docs_before: inputs.iter().map(|s| u64::from(s.doc_count())).sum(),
            docs_after: u64::from(doc_count),
            size_before: inputs.iter().map(|s| s.segment.size_bytes()).sum(),
            ..Default::default()
        };
        stats.deleted_docs_removed = stats.docs_before - stats.docs_after;

        if doc_count == 0 {
            stats.merge_time_ms = start.elapsed().as_millis() as u64;
            info!(segment = new_id, inputs = inputs.len(), "merge dropped every document");
            return Ok(MergeResult {
                segment: None,
                remaps,
                stats,
            });
        }

        let parts = self.build_parts(inputs, &remaps, new_id, doc_count, field_count)?;
        stats.terms_merged = u64::from(parts.term_count);

        retry(&self.retry, "merge", |_| write_segment(&self.storage, &parts))?;
        let segment = match Segment::open(Arc::clone(&self.storage), new_id) {
            Ok(segment) => segment,
            Err(err) => {
                let _ = self.storage.delete_file(&segment_file_name(new_id));
                return Err(err);
            }
        };

        stats.size_after = segment.size_bytes();
        stats.merge_time_ms = start.elapsed().as_millis() as u64;
        info!(
            segment = new_id,
            inputs = stats.segments_merged,
            docs = stats.docs_after,
            removed = stats.deleted_docs_removed,
            terms = stats.terms_merged,
            bytes = stats.size_after,
            elapsed_ms = stats.merge_time_ms,
            "merge finished"
        );

        Ok(MergeResult {
            segment: Some(segment),
            remaps,
            stats,
        })
    }

    fn build_parts(
        &self,
        inputs: &[LiveSegment],
        remaps: &[DocRemap],
        new_id: SegmentId,
        doc_count: u32,
        field_count: usize,
    ) -> Result<SegmentParts> {
        let mut iters: Vec<_> = inputs.iter().map(|s| s.segment.terms()).collect();
        let mut heap = BinaryHeap::with_capacity(iters.len());
        for (input, iter) in iters.iter_mut().enumerate() {
            if let Some((term, info)) = iter.next() {
                heap.push(Reverse(HeapEntry { term, input, info }));
            }
        }

        let mut encoder = PostingEncoder::new();
        let mut postings = Vec::new();
        let mut dictionary = DictionaryWriter::new();
        let mut group: Vec<(usize, &TermInfo)> = Vec::with_capacity(inputs.len());

        while let Some(Reverse(first)) = heap.pop() {
            let term = first.term;
            group.clear();
            group.push((first.input, first.info));
            while heap.peek().is_some_and(|Reverse(e)| e.term == term) {
                if let Some(Reverse(entry)) = heap.pop() {
                    group.push((entry.input, entry.info));
                }
            }

            for &(input, info) in &group {
                let segment = &inputs[input].segment;
                let remap = &remaps[input];
                let mut cursor = segment.postings_for(info)?;
                while let Some(doc) = cursor.doc() {
                    if let Some(new_doc) = remap.get(doc) {
                        encoder.add(new_doc, cursor.positions()?)?;
                    }
                    cursor.advance()?;
                }
                if let Some((term, info)) = iters[input].next() {
                    heap.push(Reverse(HeapEntry { term, input, info }));
                }
            }

            if encoder.doc_freq() > 0 {
                let offset = postings.len() as u64;
                let encoded = encoder.finish(&mut postings);
                dictionary.add(term, &TermInfo::new(offset, encoded))?;
            }
        }

        let survivors = inputs.iter().zip(remaps).flat_map(|(entry, remap)| {
            entry
                .segment
                .stored_documents()
                .enumerate()
                .filter(move |(local, _)| remap.get(*local as LocalDocNo).is_some())
                .map(|(_, doc)| doc)
        });
        let mut attribute_section = Vec::new();
        encode_u64_into(u64::from(doc_count), &mut attribute_section);
        for doc in survivors {
            attributes::encode_document(doc, &mut attribute_section);
        }

        Ok(SegmentParts {
            segment_id: new_id,
            doc_count,
            term_count: dictionary.len(),
            field_count: field_count as u32,
            postings,
            dictionary: dictionary.finish(),
            attributes: attribute_section,
            deletions: DeletionBitmap::new(doc_count).encode(),
        })
    }
}
