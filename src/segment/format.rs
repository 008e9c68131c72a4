//! Segment file layout.
//!
//! All integers are little-endian.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "LXSG"
//! 4       4     format version
//! 8       8     segment id
//! 16      4     document count
//! 20      4     term count
//! 24      4     field count
//! 28      4     reserved (0)
//! 32      64    (offset u64, length u64) of the postings, dictionary,
//!               attribute and deletion sections, in that order
//! 96      ..    sections
//! end-4   4     CRC32 of every preceding byte
//! ```
//!
//! Files are written to a temporary name, synced and renamed, so a segment
//! file under its final name is always complete.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::error::{LexisError, Result};
use crate::segment::segment_file_name;
use crate::segment::types::SegmentId;
use crate::storage::structured::{StructWriter, verify_trailer};
use crate::storage::Storage;

/// Magic number at the start of every segment file ("LXSG").
pub const SEGMENT_MAGIC: u32 = 0x4753_584C;

/// Current segment format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the fixed header.
pub const HEADER_LEN: usize = 96;

/// Extension of segment files.
pub const SEGMENT_EXTENSION: &str = "lxs";

/// Extension of deletion sidecar files.
pub const DELETION_EXTENSION: &str = "del";

/// Location of one section inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Section {
    pub offset: u64,
    pub len: u64,
}

impl Section {
    fn slice<'a>(&self, body: &'a [u8]) -> Option<&'a [u8]> {
        let start = usize::try_from(self.offset).ok()?;
        let len = usize::try_from(self.len).ok()?;
        body.get(start..start.checked_add(len)?)
    }
}

/// Decoded segment header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    pub segment_id: SegmentId,
    pub doc_count: u32,
    pub term_count: u32,
    pub field_count: u32,
    pub postings: Section,
    pub dictionary: Section,
    pub attributes: Section,
    pub deletions: Section,
}

impl SegmentHeader {
    fn sections(&self) -> [Section; 4] {
        [self.postings, self.dictionary, self.attributes, self.deletions]
    }

    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut buf[0..4], SEGMENT_MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], FORMAT_VERSION);
        LittleEndian::write_u64(&mut buf[8..16], self.segment_id);
        LittleEndian::write_u32(&mut buf[16..20], self.doc_count);
        LittleEndian::write_u32(&mut buf[20..24], self.term_count);
        LittleEndian::write_u32(&mut buf[24..28], self.field_count);
        for (i, section) in self.sections().iter().enumerate() {
            let at = 32 + i * 16;
            LittleEndian::write_u64(&mut buf[at..at + 8], section.offset);
            LittleEndian::write_u64(&mut buf[at + 8..at + 16], section.len);
        }
        buf
    }

    fn decode(body: &[u8]) -> std::result::Result<Self, String> {
        if body.len() < HEADER_LEN {
            return Err(format!("file shorter than header ({} bytes)", body.len()));
        }
        let magic = LittleEndian::read_u32(&body[0..4]);
        if magic != SEGMENT_MAGIC {
            return Err(format!("bad magic {magic:#010x}"));
        }
        let version = LittleEndian::read_u32(&body[4..8]);
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }

        let section = |i: usize| {
            let at = 32 + i * 16;
            Section {
                offset: LittleEndian::read_u64(&body[at..at + 8]),
                len: LittleEndian::read_u64(&body[at + 8..at + 16]),
            }
        };

        Ok(SegmentHeader {
            segment_id: LittleEndian::read_u64(&body[8..16]),
            doc_count: LittleEndian::read_u32(&body[16..20]),
            term_count: LittleEndian::read_u32(&body[20..24]),
            field_count: LittleEndian::read_u32(&body[24..28]),
            postings: section(0),
            dictionary: section(1),
            attributes: section(2),
            deletions: section(3),
        })
    }
}

/// Encoded sections of a segment about to be written.
#[derive(Debug, Default)]
pub struct SegmentParts {
    pub segment_id: SegmentId,
    pub doc_count: u32,
    pub term_count: u32,
    pub field_count: u32,
    pub postings: Vec<u8>,
    pub dictionary: Vec<u8>,
    pub attributes: Vec<u8>,
    pub deletions: Vec<u8>,
}

/// Borrowed view of a validated segment file.
#[derive(Debug)]
pub struct SegmentLayout<'a> {
    pub header: SegmentHeader,
    pub postings: &'a [u8],
    pub dictionary: &'a [u8],
    pub attributes: &'a [u8],
    pub deletions: &'a [u8],
}

impl<'a> SegmentLayout<'a> {
    /// Validate checksum, header and section bounds of a file image.
    pub fn parse(file_name: &str, bytes: &'a [u8]) -> Result<Self> {
        let corrupt = |reason: String| LexisError::corruption(file_name, reason);

        let body = verify_trailer(bytes).ok_or_else(|| corrupt("checksum mismatch".into()))?;
        let header = SegmentHeader::decode(body).map_err(corrupt)?;

        let slice = |section: Section, what: &str| {
            if section.offset < HEADER_LEN as u64 {
                return Err(corrupt(format!("{what} section overlaps the header")));
            }
            section
                .slice(body)
                .ok_or_else(|| corrupt(format!("{what} section out of bounds")))
        };

        Ok(SegmentLayout {
            postings: slice(header.postings, "postings")?,
            dictionary: slice(header.dictionary, "dictionary")?,
            attributes: slice(header.attributes, "attribute")?,
            deletions: slice(header.deletions, "deletion")?,
            header,
        })
    }
}

/// Write a segment under its final name via a temporary file.
///
/// Returns the size of the published file.
pub fn write_segment(storage: &Arc<dyn Storage>, parts: &SegmentParts) -> Result<u64> {
    let final_name = segment_file_name(parts.segment_id);

    let mut offset = HEADER_LEN as u64;
    let mut next = |len: usize| {
        let section = Section {
            offset,
            len: len as u64,
        };
        offset += len as u64;
        section
    };
    let header = SegmentHeader {
        segment_id: parts.segment_id,
        doc_count: parts.doc_count,
        term_count: parts.term_count,
        field_count: parts.field_count,
        postings: next(parts.postings.len()),
        dictionary: next(parts.dictionary.len()),
        attributes: next(parts.attributes.len()),
        deletions: next(parts.deletions.len()),
    };

    let (temp_name, output) = storage.create_temp_output(&final_name)?;
    let written = (|| {
        let mut writer = StructWriter::new(output);
        writer.write_raw(&header.encode())?;
        writer.write_raw(&parts.postings)?;
        writer.write_raw(&parts.dictionary)?;
        writer.write_raw(&parts.attributes)?;
        writer.write_raw(&parts.deletions)?;
        let size = writer.position() + 4;
        writer.close()?;
        Ok::<u64, LexisError>(size)
    })();

    let size = match written {
        Ok(size) => size,
        Err(err) => {
            let _ = storage.delete_file(&temp_name);
            return Err(err);
        }
    };

    if let Err(err) = storage.rename_file(&temp_name, &final_name) {
        let _ = storage.delete_file(&temp_name);
        return Err(err);
    }

    debug!(
        segment = parts.segment_id,
        file = %final_name,
        docs = parts.doc_count,
        terms = parts.term_count,
        bytes = size,
        "published segment"
    );
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn parts() -> SegmentParts {
        SegmentParts {
            segment_id: 9,
            doc_count: 2,
            term_count: 1,
            field_count: 1,
            postings: vec![1, 2, 3],
            dictionary: vec![4, 5],
            attributes: vec![6],
            deletions: vec![],
        }
    }

    #[test]
    fn test_write_and_parse() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let size = write_segment(&storage, &parts()).unwrap();

        let name = segment_file_name(9);
        assert_eq!(storage.list_files().unwrap(), vec![name.clone()]);
        assert_eq!(storage.file_size(&name).unwrap(), size);

        let data = storage.read_all(&name).unwrap();
        let layout = SegmentLayout::parse(&name, &data).unwrap();
        assert_eq!(layout.header.segment_id, 9);
        assert_eq!(layout.header.doc_count, 2);
        assert_eq!(layout.postings, &[1, 2, 3]);
        assert_eq!(layout.dictionary, &[4, 5]);
        assert_eq!(layout.attributes, &[6]);
        assert!(layout.deletions.is_empty());
    }

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let memory = Arc::new(MemoryStorage::new_default());
        memory.fail_next_closes(1);
        let storage: Arc<dyn Storage> = memory;

        assert!(write_segment(&storage, &parts()).is_err());
        assert!(storage.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_detects_corruption() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        write_segment(&storage, &parts()).unwrap();
        let name = segment_file_name(9);
        let mut bytes = storage.read_all(&name).unwrap().to_vec();

        bytes[HEADER_LEN] ^= 0xFF;
        let err = SegmentLayout::parse(&name, &bytes).unwrap_err();
        assert!(err.is_corruption());

        assert!(SegmentLayout::parse(&name, &bytes[..10]).is_err());
    }
}
