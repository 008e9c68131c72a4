//! File-based storage implementation.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LexisError, Result};
use crate::storage::{FileData, Storage, StorageError, StorageInput, StorageOutput, TEMP_SUFFIX};

/// Configuration for a directory-backed storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Root directory of the index.
    pub path: PathBuf,

    /// Memory-map files returned by [`Storage::read_all`].
    #[serde(default = "default_use_mmap")]
    pub use_mmap: bool,

    /// Buffer size for streaming readers and writers.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Flush the buffer after every write call.
    #[serde(default)]
    pub sync_writes: bool,
}

fn default_use_mmap() -> bool {
    true
}

fn default_buffer_size() -> usize {
    64 * 1024
}

impl FileStorageConfig {
    /// Default configuration rooted at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            use_mmap: default_use_mmap(),
            buffer_size: default_buffer_size(),
            sync_writes: false,
        }
    }
}

/// A file-based storage implementation.
#[derive(Debug)]
pub struct FileStorage {
    /// The root directory for storage.
    directory: PathBuf,
    /// Storage configuration.
    config: FileStorageConfig,
}

impl FileStorage {
    /// Create a new file storage in the given directory.
    pub fn new<P: AsRef<Path>>(directory: P, config: FileStorageConfig) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        if !directory.exists() {
            std::fs::create_dir_all(&directory)?;
        }

        if !directory.is_dir() {
            return Err(LexisError::storage(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        Ok(FileStorage { directory, config })
    }

    /// Root directory of this storage.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn not_found_or_io(name: &str, e: std::io::Error) -> LexisError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::FileNotFound(name.to_string()).into()
        } else {
            LexisError::Io(e)
        }
    }

    /// fsync the directory so that renames survive a crash.
    fn sync_directory(&self) -> Result<()> {
        #[cfg(unix)]
        {
            File::open(&self.directory)?.sync_all()?;
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let file = File::open(self.file_path(name)).map_err(|e| Self::not_found_or_io(name, e))?;
        Ok(Box::new(FileInput::new(file, self.config.buffer_size)?))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.file_path(name))?;

        Ok(Box::new(FileOutput::new(
            file,
            self.config.buffer_size,
            self.config.sync_writes,
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.file_path(name)) {
            Ok(()) => {
                debug!(file = name, "deleted file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let metadata = self
            .file_path(name)
            .metadata()
            .map_err(|e| Self::not_found_or_io(name, e))?;
        Ok(metadata.len())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        std::fs::rename(self.file_path(old_name), self.file_path(new_name))?;
        self.sync_directory()
    }

    fn create_temp_output(&self, prefix: &str) -> Result<(String, Box<dyn StorageOutput>)> {
        for _ in 0..16 {
            let temp_name = format!("{prefix}.{}{TEMP_SUFFIX}", uuid::Uuid::new_v4().simple());
            let file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.file_path(&temp_name))
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            let output = FileOutput::new(file, self.config.buffer_size, self.config.sync_writes);
            return Ok((temp_name, Box::new(output)));
        }

        Err(StorageError::IoError("Could not create temporary file".to_string()).into())
    }

    fn read_all(&self, name: &str) -> Result<FileData> {
        let file = File::open(self.file_path(name)).map_err(|e| Self::not_found_or_io(name, e))?;
        let len = file.metadata()?.len();

        // Mapping a zero-length file fails on some platforms.
        if self.config.use_mmap && len > 0 {
            // SAFETY: published files are immutable; they are only ever
            // replaced by rename and deleted once no reader holds them.
            let mmap = unsafe { Mmap::map(&file)? };
            return Ok(FileData::Mapped(mmap));
        }

        let mut bytes = Vec::with_capacity(len as usize);
        BufReader::with_capacity(self.config.buffer_size, file).read_to_end(&mut bytes)?;
        Ok(FileData::Owned(Arc::from(bytes)))
    }

    fn sync(&self) -> Result<()> {
        self.sync_directory()
    }
}

/// A file input implementation.
#[derive(Debug)]
pub struct FileInput {
    reader: BufReader<File>,
    size: u64,
}

impl FileInput {
    fn new(file: File, buffer_size: usize) -> Result<Self> {
        let size = file.metadata()?.len();
        let reader = BufReader::with_capacity(buffer_size, file);
        Ok(FileInput { reader, size })
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// A file output implementation.
#[derive(Debug)]
pub struct FileOutput {
    writer: BufWriter<File>,
    sync_writes: bool,
    position: u64,
}

impl FileOutput {
    fn new(file: File, buffer_size: usize, sync_writes: bool) -> Self {
        FileOutput {
            writer: BufWriter::with_capacity(buffer_size, file),
            sync_writes,
            position: 0,
        }
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let bytes_written = self.writer.write(buf)?;
        self.position += bytes_written as u64;

        if self.sync_writes {
            self.writer.flush()?;
        }

        Ok(bytes_written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl Seek for FileOutput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = self.writer.seek(pos)?;
        self.position = new_pos;
        Ok(new_pos)
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        self.flush_and_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, FileStorage) {
        let temp_dir = TempDir::new().unwrap();
        let config = FileStorageConfig::new(temp_dir.path());
        let storage = FileStorage::new(temp_dir.path(), config).unwrap();
        (temp_dir, storage)
    }

    #[test]
    fn test_create_and_read_file() {
        let (_temp_dir, storage) = create_test_storage();

        let mut output = storage.create_output("test.txt").unwrap();
        output.write_all(b"Hello, World!").unwrap();
        output.close().unwrap();

        let mut input = storage.open_input("test.txt").unwrap();
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer).unwrap();

        assert_eq!(buffer, b"Hello, World!");
        assert_eq!(input.size().unwrap(), 13);
    }

    #[test]
    fn test_file_operations() {
        let (_temp_dir, storage) = create_test_storage();

        assert!(!storage.file_exists("nonexistent.txt"));

        let mut output = storage.create_output("test.txt").unwrap();
        output.write_all(b"Test content").unwrap();
        output.close().unwrap();

        assert!(storage.file_exists("test.txt"));
        assert_eq!(storage.file_size("test.txt").unwrap(), 12);
        assert_eq!(storage.list_files().unwrap(), vec!["test.txt"]);

        storage.rename_file("test.txt", "renamed.txt").unwrap();
        assert!(!storage.file_exists("test.txt"));
        assert!(storage.file_exists("renamed.txt"));

        storage.delete_file("renamed.txt").unwrap();
        assert!(!storage.file_exists("renamed.txt"));

        // Deleting again is fine.
        storage.delete_file("renamed.txt").unwrap();
    }

    #[test]
    fn test_temp_output_then_publish() {
        let (_temp_dir, storage) = create_test_storage();

        let (temp_name, mut output) = storage.create_temp_output("seg_1.lxs").unwrap();
        assert!(temp_name.starts_with("seg_1.lxs."));
        assert!(temp_name.ends_with(TEMP_SUFFIX));

        output.write_all(b"segment bytes").unwrap();
        output.close().unwrap();

        storage.rename_file(&temp_name, "seg_1.lxs").unwrap();
        assert!(!storage.file_exists(&temp_name));
        assert_eq!(storage.file_size("seg_1.lxs").unwrap(), 13);
    }

    #[test]
    fn test_read_all_mapped_and_owned() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = FileStorageConfig::new(temp_dir.path());
        let storage = FileStorage::new(temp_dir.path(), config.clone()).unwrap();

        let mut output = storage.create_output("data.bin").unwrap();
        output.write_all(&[7u8; 100]).unwrap();
        output.close().unwrap();

        let data = storage.read_all("data.bin").unwrap();
        assert!(matches!(data, FileData::Mapped(_)));
        assert_eq!(data.len(), 100);

        config.use_mmap = false;
        let storage = FileStorage::new(temp_dir.path(), config).unwrap();
        let data = storage.read_all("data.bin").unwrap();
        assert!(matches!(data, FileData::Owned(_)));
        assert_eq!(&data[..3], &[7, 7, 7]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let (_temp_dir, storage) = create_test_storage();
        let err = storage.read_all("missing").unwrap_err();
        match err {
            LexisError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
