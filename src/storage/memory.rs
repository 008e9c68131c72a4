//! In-memory storage implementation for testing and ephemeral indexes.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{FileData, Storage, StorageError, StorageInput, StorageOutput, TEMP_SUFFIX};

type FileMap = Arc<Mutex<HashMap<String, Arc<[u8]>>>>;

/// Configuration for memory storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    /// Initial capacity of the file table.
    #[serde(default)]
    pub initial_capacity: usize,
}

/// An in-memory storage implementation.
///
/// Files only become visible once their output is closed, mirroring a
/// durable write on disk. Failures can be injected to exercise the retry
/// paths of flush and merge.
#[derive(Debug)]
pub struct MemoryStorage {
    files: FileMap,
    temp_counter: AtomicU64,
    failing_closes: Arc<AtomicU32>,
}

impl MemoryStorage {
    /// Create a new memory storage.
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(Mutex::new(HashMap::with_capacity(config.initial_capacity))),
            temp_counter: AtomicU64::new(0),
            failing_closes: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Create a new memory storage with default configuration.
    pub fn new_default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Get the total size of all files.
    pub fn total_size(&self) -> u64 {
        self.files.lock().values().map(|data| data.len() as u64).sum()
    }

    /// Make the next `count` output closes fail with a transient I/O error.
    pub fn fail_next_closes(&self, count: u32) {
        self.failing_closes.store(count, Ordering::SeqCst);
    }

    /// Replace the raw contents of a file, bypassing the output path.
    pub fn put_file(&self, name: &str, bytes: Vec<u8>) {
        self.files.lock().insert(name.to_string(), Arc::from(bytes));
    }

    fn get(&self, name: &str) -> Result<Arc<[u8]>> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()).into())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new_default()
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        Ok(Box::new(MemoryInput::new(self.get(name)?)))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(Box::new(MemoryOutput::new(
            name.to_string(),
            Arc::clone(&self.files),
            Arc::clone(&self.failing_closes),
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.lock().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut file_names: Vec<String> = self.files.lock().keys().cloned().collect();
        file_names.sort();
        Ok(file_names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(self.get(name)?.len() as u64)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut files = self.files.lock();
        let data = files
            .remove(old_name)
            .ok_or_else(|| StorageError::FileNotFound(old_name.to_string()))?;
        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn create_temp_output(&self, prefix: &str) -> Result<(String, Box<dyn StorageOutput>)> {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp_name = format!("{prefix}.{n}{TEMP_SUFFIX}");
        let output = self.create_output(&temp_name)?;
        Ok((temp_name, output))
    }

    fn read_all(&self, name: &str) -> Result<FileData> {
        Ok(FileData::Owned(self.get(name)?))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// A memory-based input implementation.
#[derive(Debug)]
pub struct MemoryInput {
    cursor: Cursor<Arc<[u8]>>,
    size: u64,
}

impl MemoryInput {
    fn new(data: Arc<[u8]>) -> Self {
        let size = data.len() as u64;
        MemoryInput {
            cursor: Cursor::new(data),
            size,
        }
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// A memory-based output implementation.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    cursor: Cursor<Vec<u8>>,
    files: FileMap,
    failing_closes: Arc<AtomicU32>,
    closed: bool,
}

impl MemoryOutput {
    fn new(name: String, files: FileMap, failing_closes: Arc<AtomicU32>) -> Self {
        MemoryOutput {
            name,
            cursor: Cursor::new(Vec::new()),
            files,
            failing_closes,
            closed: false,
        }
    }

    fn check_open(&self) -> std::io::Result<()> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }
        Ok(())
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.check_open()?;
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryOutput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.check_open()?;
        self.cursor.seek(pos)
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.cursor.position())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let injected = self
            .failing_closes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            self.closed = true;
            return Err(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                format!("injected failure closing {}", self.name),
            )
            .into());
        }

        let bytes = std::mem::take(self.cursor.get_mut());
        self.files.lock().insert(self.name.clone(), Arc::from(bytes));
        self.closed = true;
        Ok(())
    }
}
