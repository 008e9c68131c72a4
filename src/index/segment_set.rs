//! Versioned segment sets and snapshots.
//!
//! A [`SegmentSet`] is never modified once published. Every change to the
//! index (a flush, a merge, a deletion) produces a new set which the
//! [`IndexManager`](crate::index::manager::IndexManager) swaps in atomically.
//! A [`Snapshot`] is a reference-counted handle on one set; holding it keeps
//! every segment of the set, and therefore its file, alive.

use std::sync::Arc;

use crate::document::DocId;
use crate::merge::policy::SegmentInfo;
use crate::segment::types::DeletionRef;
use crate::segment::{DeletionBitmap, LocalDocNo, Segment, SegmentId, SegmentMeta, SegmentStats};

/// A segment together with the deletions visible in one set version.
#[derive(Debug, Clone)]
pub struct LiveSegment {
    pub segment: Arc<Segment>,
    pub deletions: Arc<DeletionBitmap>,

    /// Sidecar currently persisted for this segment.
    pub persisted: Option<DeletionRef>,

    /// Deletions changed since the sidecar was written.
    pub dirty: bool,
}

impl LiveSegment {
    /// A freshly opened segment carrying the deletions of its file.
    pub fn new(segment: Arc<Segment>) -> Self {
        let deletions = Arc::new(segment.base_deletions().clone());
        LiveSegment {
            segment,
            deletions,
            persisted: None,
            dirty: false,
        }
    }

    pub fn id(&self) -> SegmentId {
        self.segment.id()
    }

    pub fn doc_count(&self) -> u32 {
        self.segment.doc_count()
    }

    pub fn live_count(&self) -> u32 {
        self.deletions.live_count()
    }

    #[inline]
    pub fn is_deleted(&self, local: LocalDocNo) -> bool {
        self.deletions.is_deleted(local)
    }

    pub fn meta(&self) -> SegmentMeta {
        SegmentMeta {
            id: self.id(),
            doc_count: self.doc_count(),
            size_bytes: self.segment.size_bytes(),
            deletions: self.persisted.clone(),
        }
    }

    pub fn stats(&self) -> SegmentStats {
        self.segment.stats(&self.deletions)
    }

    pub fn merge_info(&self) -> SegmentInfo {
        SegmentInfo {
            id: self.id(),
            size_bytes: self.segment.size_bytes(),
            doc_count: self.doc_count(),
            deleted_count: self.deletions.deleted_count(),
        }
    }
}

/// One immutable version of the live segments, in global order.
#[derive(Debug, Default)]
pub struct SegmentSet {
    version: u64,
    segments: Vec<LiveSegment>,
    bases: Vec<u64>,
    excluded: Vec<SegmentId>,
}

impl SegmentSet {
    pub fn new(version: u64, segments: Vec<LiveSegment>, excluded: Vec<SegmentId>) -> Self {
        let mut bases = Vec::with_capacity(segments.len());
        let mut base = 0u64;
        for entry in &segments {
            bases.push(base);
            base += u64::from(entry.doc_count());
        }
        SegmentSet {
            version,
            segments,
            bases,
            excluded,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn segments(&self) -> &[LiveSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn position(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id() == id)
    }

    pub fn get(&self, id: SegmentId) -> Option<&LiveSegment> {
        self.segments.iter().find(|s| s.id() == id)
    }

    /// Global number of the first document of the segment at `index`.
    pub fn base(&self, index: usize) -> u64 {
        self.bases.get(index).copied().unwrap_or(0)
    }

    /// Segments left out of the set because they failed validation.
    pub fn excluded(&self) -> &[SegmentId] {
        &self.excluded
    }

    pub fn doc_count(&self) -> u64 {
        self.segments.iter().map(|s| u64::from(s.doc_count())).sum()
    }

    pub fn live_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| u64::from(s.live_count())).sum()
    }
}

/// A consistent, reference-counted view of the index.
#[derive(Debug, Clone)]
pub struct Snapshot {
    set: Arc<SegmentSet>,
}

impl Snapshot {
    pub fn new(set: Arc<SegmentSet>) -> Self {
        Snapshot { set }
    }

    pub fn version(&self) -> u64 {
        self.set.version()
    }

    pub fn segments(&self) -> &[LiveSegment] {
        self.set.segments()
    }

    pub fn set(&self) -> &SegmentSet {
        &self.set
    }

    pub fn doc_count(&self) -> u64 {
        self.set.doc_count()
    }

    pub fn live_doc_count(&self) -> u64 {
        self.set.live_doc_count()
    }

    /// Global number of a segment-local document.
    pub fn global_doc(&self, segment_index: usize, local: LocalDocNo) -> u64 {
        self.set.base(segment_index) + u64::from(local)
    }

    /// Whether some segments were excluded, making results partial.
    pub fn is_partial(&self) -> bool {
        !self.set.excluded().is_empty()
    }

    pub fn excluded_segments(&self) -> &[SegmentId] {
        self.set.excluded()
    }

    /// Whether a live copy of `doc_id` is visible in this snapshot.
    pub fn contains(&self, doc_id: DocId) -> bool {
        self.segments().iter().any(|entry| {
            entry
                .segment
                .lookup(doc_id)
                .into_iter()
                .any(|local| !entry.is_deleted(local))
        })
    }

    /// Number of documents containing `term`, over every segment.
    pub fn doc_freq(&self, term: &str) -> u64 {
        self.segments()
            .iter()
            .filter_map(|s| s.segment.term_info(term))
            .map(|info| u64::from(info.doc_freq))
            .sum()
    }

    /// Sum of field lengths per field over every segment.
    pub fn total_field_lengths(&self, field_count: usize) -> Vec<u64> {
        let mut totals = vec![0u64; field_count];
        for entry in self.segments() {
            for (total, len) in totals.iter_mut().zip(entry.segment.total_field_lengths()) {
                *total += len;
            }
        }
        totals
    }
}
