//! Immutable on-disk segments.
//!
//! A segment is produced by flushing the in-memory [`builder::SegmentBuilder`]
//! or by merging other segments, and is never modified afterwards. Each
//! segment file holds:
//!
//! - a header with section offsets,
//! - posting lists with skip tables ([`posting`]),
//! - a sorted, prefix-compressed term dictionary ([`dictionary`]),
//! - a per-document attribute store ([`attributes`]),
//! - the deletion bitmap at write time ([`deletion`]),
//! - a CRC32 trailer.
//!
//! Deletions made after publication live in checksummed sidecar files so the
//! segment body stays immutable. See [`format`] for the byte layout.

pub mod attributes;
pub mod builder;
pub mod deletion;
pub mod dictionary;
pub mod format;
pub mod posting;
pub mod reader;
pub mod types;

pub use builder::SegmentBuilder;
pub use deletion::DeletionBitmap;
pub use reader::Segment;
pub use types::{LocalDocNo, SegmentId, SegmentMeta, SegmentStats};

/// File name of the segment with the given id.
pub fn segment_file_name(id: SegmentId) -> String {
    format!("seg_{id:016x}.{}", format::SEGMENT_EXTENSION)
}

/// File name of a deletion sidecar generation of a segment.
pub fn deletion_file_name(id: SegmentId, generation: u64) -> String {
    format!("seg_{id:016x}.{generation}.{}", format::DELETION_EXTENSION)
}

/// Parse a segment id back out of a segment file name.
pub fn parse_segment_file_name(name: &str) -> Option<SegmentId> {
    let hex = name
        .strip_prefix("seg_")?
        .strip_suffix(&format!(".{}", format::SEGMENT_EXTENSION))?;
    if hex.len() != 16 {
        return None;
    }
    SegmentId::from_str_radix(hex, 16).ok()
}
