//! Deletion bitmaps (tombstones).
//!
//! A set bit marks a local document as deleted. Bitmaps attached to a live
//! segment are never mutated in place: deleting produces a modified copy that
//! is published with the next segment-set version, so snapshots keep the
//! bitmap they started with.

use std::sync::Arc;

use bit_vec::BitVec;
use tracing::debug;

use crate::error::{LexisError, Result};
use crate::segment::types::{LocalDocNo, SegmentId};
use crate::storage::structured::{SliceReader, StructReader, StructWriter};
use crate::storage::Storage;
use crate::util::varint::encode_u64_into;

/// Magic number of a deletion sidecar file ("LXDL").
pub const DELETION_MAGIC: u32 = 0x4C44_584C;

/// Sidecar format version.
pub const DELETION_VERSION: u32 = 1;

/// A bitmap-based deletion tracker for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionBitmap {
    deleted_docs: BitVec,
    deleted_count: u32,
}

impl DeletionBitmap {
    /// A bitmap with no deletions for `doc_count` documents.
    pub fn new(doc_count: u32) -> Self {
        DeletionBitmap {
            deleted_docs: BitVec::from_elem(doc_count as usize, false),
            deleted_count: 0,
        }
    }

    /// Mark a document as deleted. Returns whether it was live.
    pub fn delete(&mut self, doc: LocalDocNo) -> Result<bool> {
        let index = doc as usize;
        match self.deleted_docs.get(index) {
            None => Err(LexisError::index(format!(
                "document {doc} out of range for a segment of {} documents",
                self.doc_count()
            ))),
            Some(true) => Ok(false),
            Some(false) => {
                self.deleted_docs.set(index, true);
                self.deleted_count += 1;
                Ok(true)
            }
        }
    }

    /// Check if a document is deleted.
    #[inline]
    pub fn is_deleted(&self, doc: LocalDocNo) -> bool {
        self.deleted_docs.get(doc as usize).unwrap_or(false)
    }

    pub fn doc_count(&self) -> u32 {
        self.deleted_docs.len() as u32
    }

    pub fn deleted_count(&self) -> u32 {
        self.deleted_count
    }

    pub fn live_count(&self) -> u32 {
        self.doc_count() - self.deleted_count
    }

    /// Deletion ratio (0.0 to 1.0).
    pub fn deletion_ratio(&self) -> f64 {
        if self.doc_count() == 0 {
            0.0
        } else {
            f64::from(self.deleted_count) / f64::from(self.doc_count())
        }
    }

    pub fn has_deletions(&self) -> bool {
        self.deleted_count > 0
    }

    /// Local numbers of deleted documents.
    pub fn deleted_docs(&self) -> impl Iterator<Item = LocalDocNo> + '_ {
        self.deleted_docs
            .iter()
            .enumerate()
            .filter(|(_, bit)| *bit)
            .map(|(i, _)| i as LocalDocNo)
    }

    /// Encode as a segment section: varint doc count, then packed bits.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_u64_into(u64::from(self.doc_count()), &mut out);
        out.extend_from_slice(&self.deleted_docs.to_bytes());
        out
    }

    /// Decode a segment section.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = SliceReader::new(bytes);
        let doc_count = reader.read_varint_u32()?;
        let packed = reader.read_raw(bytes.len() - reader.position())?;
        Self::from_packed(doc_count, packed)
    }

    fn from_packed(doc_count: u32, packed: &[u8]) -> Result<Self> {
        let expected = (doc_count as usize).div_ceil(8);
        if packed.len() != expected {
            return Err(LexisError::storage(format!(
                "deletion bitmap has {} bytes, expected {expected}",
                packed.len()
            )));
        }
        let mut deleted_docs = BitVec::from_bytes(packed);
        deleted_docs.truncate(doc_count as usize);
        let deleted_count = deleted_docs.iter().filter(|b| *b).count() as u32;
        Ok(DeletionBitmap {
            deleted_docs,
            deleted_count,
        })
    }

    /// Persist as a checksummed sidecar file, publishing by rename.
    pub fn write_sidecar(&self, storage: &Arc<dyn Storage>, name: &str, segment: SegmentId) -> Result<()> {
        let (temp_name, output) = storage.create_temp_output(name)?;
        let written = (|| {
            let mut writer = StructWriter::new(output);
            writer.write_u32(DELETION_MAGIC)?;
            writer.write_u32(DELETION_VERSION)?;
            writer.write_u64(segment)?;
            writer.write_u32(self.doc_count())?;
            writer.write_u32(self.deleted_count)?;
            writer.write_bytes(&self.deleted_docs.to_bytes())?;
            writer.close()
        })();

        if let Err(err) = written {
            let _ = storage.delete_file(&temp_name);
            return Err(err);
        }
        storage.rename_file(&temp_name, name)?;
        debug!(file = name, segment, deleted = self.deleted_count, "wrote deletion sidecar");
        Ok(())
    }

    /// Load a sidecar written by [`write_sidecar`](Self::write_sidecar).
    pub fn read_sidecar(storage: &Arc<dyn Storage>, name: &str, segment: SegmentId) -> Result<Self> {
        let corrupt = |reason: String| LexisError::corruption(name, reason);

        let input = storage.open_input(name)?;
        let mut reader = StructReader::new(input)?;
        if reader.read_u32()? != DELETION_MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }
        let version = reader.read_u32()?;
        if version != DELETION_VERSION {
            return Err(corrupt(format!("unsupported version {version}")));
        }
        let owner = reader.read_u64()?;
        if owner != segment {
            return Err(corrupt(format!("belongs to segment {owner}, not {segment}")));
        }
        let doc_count = reader.read_u32()?;
        let deleted_count = reader.read_u32()?;
        let packed = reader.read_bytes()?;
        if !reader.verify_checksum()? {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        let bitmap = Self::from_packed(doc_count, &packed).map_err(|e| corrupt(e.to_string()))?;
        if bitmap.deleted_count != deleted_count {
            return Err(corrupt("deleted count mismatch".to_string()));
        }
        Ok(bitmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_delete_and_counts() {
        let mut bitmap = DeletionBitmap::new(10);
        assert!(bitmap.delete(3).unwrap());
        assert!(!bitmap.delete(3).unwrap());
        assert!(bitmap.delete(9).unwrap());
        assert!(bitmap.delete(10).is_err());

        assert!(bitmap.is_deleted(3));
        assert!(!bitmap.is_deleted(4));
        assert!(!bitmap.is_deleted(100));
        assert_eq!(bitmap.deleted_count(), 2);
        assert_eq!(bitmap.live_count(), 8);
        assert!((bitmap.deletion_ratio() - 0.2).abs() < f64::EPSILON);
        assert_eq!(bitmap.deleted_docs().collect::<Vec<_>>(), vec![3, 9]);
    }

    #[test]
    fn test_section_decode() {
        let mut bitmap = DeletionBitmap::new(13);
        bitmap.delete(0).unwrap();
        bitmap.delete(12).unwrap();

        let decoded = DeletionBitmap::decode(&bitmap.encode()).unwrap();
        assert_eq!(decoded, bitmap);

        let empty = DeletionBitmap::decode(&DeletionBitmap::new(0).encode()).unwrap();
        assert_eq!(empty.doc_count(), 0);
    }

    #[test]
    fn test_sidecar() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let mut bitmap = DeletionBitmap::new(100);
        bitmap.delete(42).unwrap();

        bitmap.write_sidecar(&storage, "seg.1.del", 7).unwrap();
        let loaded = DeletionBitmap::read_sidecar(&storage, "seg.1.del", 7).unwrap();
        assert_eq!(loaded, bitmap);

        let err = DeletionBitmap::read_sidecar(&storage, "seg.1.del", 8).unwrap_err();
        assert!(err.is_corruption());
    }
}
