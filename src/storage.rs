//! Storage abstraction layer for lexis.
//!
//! Segments, deletion sidecars and the manifest are all written through the
//! [`Storage`] trait, so the engine runs unchanged on disk ([`file`]) or fully
//! in memory ([`memory`], used heavily by tests).
//!
//! Publication is always write-temp-then-rename: a writer obtains a temporary
//! output from [`Storage::create_temp_output`], writes and syncs the complete
//! file, and only then calls [`Storage::rename_file`] to give it its final
//! name. Readers never observe a partially written file under a final name.
//!
//! # Example
//!
//! ```
//! use lexis::storage::{StorageConfig, StorageFactory};
//! use lexis::storage::memory::MemoryStorageConfig;
//!
//! # fn main() -> lexis::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?;
//! assert!(storage.list_files()?.is_empty());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io::{Read, Seek, Write};
use std::ops::Deref;
use std::sync::Arc;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{LexisError, Result};

pub mod file;
pub mod memory;
pub mod structured;

pub use structured::{StructReader, StructWriter};

/// Suffix used for files that have not been published yet.
pub const TEMP_SUFFIX: &str = ".tmp";

/// A trait for storage backends that can store and retrieve data.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Open an existing file for streaming reads.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files in the storage, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Atomically rename a file, replacing any existing target.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Create a uniquely named temporary file whose name starts with `prefix`.
    fn create_temp_output(&self, prefix: &str) -> Result<(String, Box<dyn StorageOutput>)>;

    /// Read a whole file for random access.
    ///
    /// Backends may return a memory mapping instead of a copy.
    fn read_all(&self, name: &str) -> Result<FileData>;

    /// Sync all pending writes to storage.
    fn sync(&self) -> Result<()>;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + fmt::Debug {
    /// Get the size of the input stream.
    fn size(&self) -> Result<u64>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Seek + Send + fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Get the current position in the output stream.
    fn position(&self) -> Result<u64>;

    /// Close the output stream, making its contents durable.
    fn close(&mut self) -> Result<()>;
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn position(&self) -> Result<u64> {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }
}

/// The full contents of a file, either owned or memory-mapped.
pub enum FileData {
    /// Bytes copied into memory.
    Owned(Arc<[u8]>),
    /// A read-only memory mapping of the file.
    Mapped(Mmap),
}

impl FileData {
    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Deref for FileData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileData::Owned(bytes) => bytes,
            FileData::Mapped(mmap) => mmap,
        }
    }
}

impl AsRef<[u8]> for FileData {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for FileData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            FileData::Owned(_) => "owned",
            FileData::Mapped(_) => "mapped",
        };
        f.debug_struct("FileData")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

/// Configuration for storage backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    /// File-based storage configuration (includes path).
    File(file::FileStorageConfig),

    /// Memory-based storage configuration.
    Memory(memory::MemoryStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(memory::MemoryStorageConfig::default())
    }
}

/// A factory for creating storage instances.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a new storage instance with the given configuration.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(mem_config) => {
                let storage = memory::MemoryStorage::new(mem_config);
                Ok(Arc::new(storage))
            }
            StorageConfig::File(file_config) => {
                let path = file_config.path.clone();
                let storage = file::FileStorage::new(&path, file_config)?;
                Ok(Arc::new(storage))
            }
        }
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// I/O error.
    IoError(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for LexisError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::FileNotFound(name) => LexisError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {name}"),
            )),
            StorageError::IoError(msg) => LexisError::storage(msg),
        }
    }
}

/// Whether `name` denotes an unpublished temporary file.
pub fn is_temp_file(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::FileNotFound("seg.lxs".to_string());
        assert_eq!(err.to_string(), "File not found: seg.lxs");

        let err = StorageError::IoError("disk full".to_string());
        assert_eq!(err.to_string(), "I/O error: disk full");
    }

    #[test]
    fn test_not_found_maps_to_permanent_io_error() {
        let err: LexisError = StorageError::FileNotFound("x".to_string()).into();
        assert!(matches!(err, LexisError::Io(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_file_data_deref() {
        let data = FileData::Owned(Arc::from(vec![1u8, 2, 3]));
        assert_eq!(data.len(), 3);
        assert_eq!(&data[..], &[1, 2, 3]);
        assert!(!data.is_empty());
    }

    #[test]
    fn test_temp_file_detection() {
        assert!(is_temp_file("seg_1.lxs.1234.tmp"));
        assert!(!is_temp_file("seg_1.lxs"));
    }
}
