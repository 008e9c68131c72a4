//! Core segment types.

use serde::{Deserialize, Serialize};

/// Identifier of a segment, unique for the lifetime of an index.
pub type SegmentId = u64;

/// Document number local to one segment, assigned from 0 in insertion order.
pub type LocalDocNo = u32;

/// Number of bits of a hit position holding the word position.
pub const WORD_POSITION_BITS: u32 = 24;

const WORD_POSITION_MASK: u32 = (1 << WORD_POSITION_BITS) - 1;

/// Pack a field index and a word position into a hit position.
///
/// Positions of different fields never compare as adjacent, so phrase and
/// proximity matching cannot cross field boundaries.
#[inline]
pub fn make_position(field: usize, word: u32) -> u32 {
    ((field as u32) << WORD_POSITION_BITS) | (word & WORD_POSITION_MASK)
}

/// Field index of a hit position.
#[inline]
pub fn position_field(position: u32) -> usize {
    (position >> WORD_POSITION_BITS) as usize
}

/// Word position of a hit position.
#[inline]
pub fn position_word(position: u32) -> u32 {
    position & WORD_POSITION_MASK
}

/// Reference to a persisted deletion sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRef {
    /// Sidecar generation; increases with every persisted change.
    pub generation: u64,

    /// Number of deleted documents recorded in the sidecar.
    pub deleted_count: u32,
}

/// What the manifest records about a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: SegmentId,
    pub doc_count: u32,
    pub size_bytes: u64,
    pub deletions: Option<DeletionRef>,
}

/// Statistics of a segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentStats {
    pub id: SegmentId,
    pub doc_count: u32,
    pub live_doc_count: u32,
    pub term_count: u32,
    pub size_bytes: u64,
    /// Sum of field lengths over all documents, per field.
    pub total_field_lengths: Vec<u64>,
}
