//! The index manifest.
//!
//! The manifest lists the segments of the index in global order together
//! with their deletion sidecars. It is rewritten (temp file, then rename)
//! after every change to the segment set, so the manifest on disk always
//! describes a complete set of published files.
//!
//! ```text
//! u32 magic "LXMF", u32 version, u64 generation, u64 next segment id,
//! u32 count, count × entry        (live segments, global order)
//! u32 count, count × entry        (quarantined segments)
//! entry: u64 id, u32 doc count, u64 size, u8 has sidecar,
//!        [u64 generation, u32 deleted count]
//! u32 CRC32 trailer
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::error::{LexisError, Result};
use crate::segment::SegmentMeta;
use crate::segment::types::DeletionRef;
use crate::storage::{Storage, StorageInput, StorageOutput, StructReader, StructWriter};

/// Name of the manifest file.
pub const MANIFEST_FILE: &str = "MANIFEST";

/// Magic number of the manifest ("LXMF").
pub const MANIFEST_MAGIC: u32 = 0x464D_584C;

/// Manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Persisted state of the segment set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    /// Incremented on every write.
    pub generation: u64,

    /// Next unallocated segment id.
    pub next_segment_id: u64,

    /// Live segments in global order.
    pub segments: Vec<SegmentMeta>,

    /// Segments that failed validation and await a rebuild.
    pub quarantined: Vec<SegmentMeta>,
}

fn write_entry<W: StorageOutput>(writer: &mut StructWriter<W>, meta: &SegmentMeta) -> Result<()> {
    writer.write_u64(meta.id)?;
    writer.write_u32(meta.doc_count)?;
    writer.write_u64(meta.size_bytes)?;
    match &meta.deletions {
        Some(deletions) => {
            writer.write_u8(1)?;
            writer.write_u64(deletions.generation)?;
            writer.write_u32(deletions.deleted_count)?;
        }
        None => writer.write_u8(0)?,
    }
    Ok(())
}

fn read_entry<R: StorageInput>(reader: &mut StructReader<R>) -> Result<SegmentMeta> {
    let id = reader.read_u64()?;
    let doc_count = reader.read_u32()?;
    let size_bytes = reader.read_u64()?;
    let deletions = match reader.read_u8()? {
        0 => None,
        1 => Some(DeletionRef {
            generation: reader.read_u64()?,
            deleted_count: reader.read_u32()?,
        }),
        flag => {
            return Err(LexisError::corruption(
                MANIFEST_FILE,
                format!("bad sidecar flag {flag}"),
            ));
        }
    };
    Ok(SegmentMeta {
        id,
        doc_count,
        size_bytes,
        deletions,
    })
}

fn read_entries<R: StorageInput>(reader: &mut StructReader<R>) -> Result<Vec<SegmentMeta>> {
    let count = reader.read_u32()?;
    (0..count).map(|_| read_entry(reader)).collect()
}

impl Manifest {
    pub fn exists(storage: &Arc<dyn Storage>) -> bool {
        storage.file_exists(MANIFEST_FILE)
    }

    /// Write the manifest under a temporary name and publish it by rename.
    pub fn write(&self, storage: &Arc<dyn Storage>) -> Result<()> {
        let (temp_name, output) = storage.create_temp_output(MANIFEST_FILE)?;
        let written = (|| {
            let mut writer = StructWriter::new(output);
            writer.write_u32(MANIFEST_MAGIC)?;
            writer.write_u32(MANIFEST_VERSION)?;
            writer.write_u64(self.generation)?;
            writer.write_u64(self.next_segment_id)?;
            for list in [&self.segments, &self.quarantined] {
                writer.write_u32(list.len() as u32)?;
                for meta in list {
                    write_entry(&mut writer, meta)?;
                }
            }
            writer.close()
        })();

        if let Err(err) = written {
            let _ = storage.delete_file(&temp_name);
            return Err(err);
        }
        if let Err(err) = storage.rename_file(&temp_name, MANIFEST_FILE) {
            let _ = storage.delete_file(&temp_name);
            return Err(err);
        }
        debug!(
            generation = self.generation,
            segments = self.segments.len(),
            quarantined = self.quarantined.len(),
            "wrote manifest"
        );
        Ok(())
    }

    pub fn read(storage: &Arc<dyn Storage>) -> Result<Self> {
        let corrupt = |reason: String| LexisError::corruption(MANIFEST_FILE, reason);

        let input = storage.open_input(MANIFEST_FILE)?;
        let mut reader = StructReader::new(input)?;
        let magic = reader.read_u32()?;
        if magic != MANIFEST_MAGIC {
            return Err(corrupt(format!("bad magic {magic:#010x}")));
        }
        let version = reader.read_u32()?;
        if version != MANIFEST_VERSION {
            return Err(corrupt(format!("unsupported version {version}")));
        }

        let generation = reader.read_u64()?;
        let next_segment_id = reader.read_u64()?;
        let segments = read_entries(&mut reader)?;
        let quarantined = read_entries(&mut reader)?;
        if !reader.verify_checksum()? {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        if let Some(meta) = segments
            .iter()
            .chain(&quarantined)
            .find(|m| m.id >= next_segment_id)
        {
            return Err(corrupt(format!(
                "segment {} is not below the next segment id {next_segment_id}",
                meta.id
            )));
        }

        Ok(Manifest {
            generation,
            next_segment_id,
            segments,
            quarantined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_write_and_read() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        assert!(!Manifest::exists(&storage));

        let manifest = Manifest {
            generation: 4,
            next_segment_id: 10,
            segments: vec![
                SegmentMeta {
                    id: 3,
                    doc_count: 100,
                    size_bytes: 4096,
                    deletions: Some(DeletionRef {
                        generation: 2,
                        deleted_count: 7,
                    }),
                },
                SegmentMeta {
                    id: 9,
                    doc_count: 5,
                    size_bytes: 300,
                    deletions: None,
                },
            ],
            quarantined: vec![SegmentMeta {
                id: 1,
                doc_count: 1,
                size_bytes: 1,
                deletions: None,
            }],
        };
        manifest.write(&storage).unwrap();
        assert!(Manifest::exists(&storage));
        assert_eq!(storage.list_files().unwrap(), vec![MANIFEST_FILE.to_string()]);
        assert_eq!(Manifest::read(&storage).unwrap(), manifest);
    }

    #[test]
    fn test_damaged_manifest() {
        let memory = Arc::new(MemoryStorage::new_default());
        let storage: Arc<dyn Storage> = memory.clone();
        Manifest::default().write(&storage).unwrap();

        let mut bytes = storage.read_all(MANIFEST_FILE).unwrap().to_vec();
        bytes[9] ^= 0x40;
        memory.put_file(MANIFEST_FILE, bytes);
        assert!(Manifest::read(&storage).unwrap_err().is_corruption());
    }
}
