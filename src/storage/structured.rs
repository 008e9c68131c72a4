//! Structured binary I/O for index files.
//!
//! [`StructWriter`] and [`StructReader`] stream little-endian primitives,
//! varints and length-prefixed strings while maintaining a running CRC32 over
//! every byte. The writer appends the checksum as a 4-byte trailer on close;
//! the reader verifies it after the last field.
//!
//! Segment files are opened whole (often memory-mapped), so [`SliceReader`]
//! decodes the same primitives from a byte slice at arbitrary offsets, and
//! [`verify_trailer`] checks the checksum of a complete file in one pass.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{LexisError, Result};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint::{self, encode_u64};

/// Size of the checksum trailer in bytes.
pub const CHECKSUM_LEN: usize = 4;

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: Hasher,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.update(&[value]);
        Ok(())
    }

    /// Write a u16 value (little-endian).
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.update(&value.to_le_bytes());
        Ok(())
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.update(&value.to_le_bytes());
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.update(&value.to_le_bytes());
        Ok(())
    }

    /// Write a f64 value (little-endian).
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.writer.write_f64::<LittleEndian>(value)?;
        self.update(&value.to_le_bytes());
        Ok(())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let encoded = encode_u64(value);
        self.write_raw(&encoded)
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.write_raw(value)
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.update(value);
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.position += data.len() as u64;
    }

    /// Write the checksum trailer, then flush, sync and close the output.
    pub fn close(mut self) -> Result<()> {
        let checksum = self.hasher.finalize();
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.writer.flush_and_sync()?;
        self.writer.close()
    }
}

/// A structured file reader for binary data.
pub struct StructReader<R: StorageInput> {
    reader: R,
    hasher: Hasher,
    position: u64,
    file_size: u64,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured file reader.
    pub fn new(reader: R) -> Result<Self> {
        let file_size = reader.size()?;
        Ok(StructReader {
            reader,
            hasher: Hasher::new(),
            position: 0,
            file_size,
        })
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.reader.read_u8()?;
        self.update(&[value]);
        Ok(value)
    }

    /// Read a u16 value (little-endian).
    pub fn read_u16(&mut self) -> Result<u16> {
        let value = self.reader.read_u16::<LittleEndian>()?;
        self.update(&value.to_le_bytes());
        Ok(value)
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.reader.read_u32::<LittleEndian>()?;
        self.update(&value.to_le_bytes());
        Ok(value)
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let value = self.reader.read_u64::<LittleEndian>()?;
        self.update(&value.to_le_bytes());
        Ok(value)
    }

    /// Read a f64 value (little-endian).
    pub fn read_f64(&mut self) -> Result<f64> {
        let value = self.reader.read_f64::<LittleEndian>()?;
        self.update(&value.to_le_bytes());
        Ok(value)
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, raw) = varint::read_u64(&mut self.reader)?;
        self.update(&raw);
        Ok(value)
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| LexisError::storage(format!("Invalid UTF-8: {e}")))
    }

    /// Read bytes with length prefix.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_varint()?;
        if self.position + length > self.file_size {
            return Err(LexisError::storage(format!(
                "Length prefix {length} runs past end of file"
            )));
        }
        self.read_raw(length as usize)
    }

    /// Read exact number of raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.update(&bytes);
        Ok(bytes)
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Check if only the checksum trailer remains.
    pub fn is_eof(&self) -> bool {
        self.position >= self.file_size.saturating_sub(CHECKSUM_LEN as u64)
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.position += data.len() as u64;
    }

    /// Read the trailer and compare it with the checksum of everything read.
    pub fn verify_checksum(self) -> Result<bool> {
        let StructReader {
            mut reader,
            hasher,
            position,
            file_size,
        } = self;
        if position + CHECKSUM_LEN as u64 != file_size {
            return Ok(false);
        }
        let stored = reader.read_u32::<LittleEndian>()?;
        Ok(stored == hasher.finalize())
    }
}

/// Check the CRC32 trailer of a complete file image.
///
/// Returns the body (everything before the trailer) when the checksum
/// matches.
pub fn verify_trailer(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() < CHECKSUM_LEN {
        return None;
    }
    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let stored = LittleEndian::read_u32(trailer);
    (crc32fast::hash(body) == stored).then_some(body)
}

/// Decoder for primitives at arbitrary offsets of an in-memory file image.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    /// Start reading `bytes` at offset zero.
    pub fn new(bytes: &'a [u8]) -> Self {
        SliceReader { bytes, pos: 0 }
    }

    /// Start reading `bytes` at `pos`.
    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        SliceReader { bytes, pos }
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether the whole slice has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| LexisError::storage("Read past end of buffer"))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        varint::read_u64_at(self.bytes, &mut self.pos)
    }

    pub fn read_varint_u32(&mut self) -> Result<u32> {
        varint::read_u32_at(self.bytes, &mut self.pos)
    }

    /// Borrow `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Borrow a length-prefixed byte string.
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        self.take(len)
    }

    /// Borrow a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<&'a str> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|e| LexisError::storage(format!("Invalid UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_struct_writer_reader() {
        let storage = MemoryStorage::new_default();

        {
            let output = storage.create_output("test.bin").unwrap();
            let mut writer = StructWriter::new(output);

            writer.write_u8(42).unwrap();
            writer.write_u16(1234).unwrap();
            writer.write_u32(0xDEADBEEF).unwrap();
            writer.write_u64(0x123456789ABCDEF0).unwrap();
            writer.write_varint(12345).unwrap();
            writer.write_f64(1.5).unwrap();
            writer.write_string("Hello, World!").unwrap();
            writer.write_bytes(&[1, 2, 3, 4, 5]).unwrap();

            writer.close().unwrap();
        }

        let input = storage.open_input("test.bin").unwrap();
        let mut reader = StructReader::new(input).unwrap();

        assert_eq!(reader.read_u8().unwrap(), 42);
        assert_eq!(reader.read_u16().unwrap(), 1234);
        assert_eq!(reader.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.read_u64().unwrap(), 0x123456789ABCDEF0);
        assert_eq!(reader.read_varint().unwrap(), 12345);
        assert_eq!(reader.read_f64().unwrap(), 1.5);
        assert_eq!(reader.read_string().unwrap(), "Hello, World!");
        assert_eq!(reader.read_bytes().unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(reader.is_eof());
        assert!(reader.verify_checksum().unwrap());
    }

    #[test]
    fn test_checksum_covers_every_byte() {
        let storage = MemoryStorage::new_default();
        {
            let output = storage.create_output("f").unwrap();
            let mut writer = StructWriter::new(output);
            writer.write_u32(1).unwrap();
            writer.write_u32(2).unwrap();
            writer.close().unwrap();
        }

        let mut bytes = storage.read_all("f").unwrap().to_vec();
        assert!(verify_trailer(&bytes).is_some());

        // Flip a bit in the first field, not just the last one written.
        bytes[0] ^= 0x01;
        assert!(verify_trailer(&bytes).is_none());

        storage.put_file("f", bytes);
        let input = storage.open_input("f").unwrap();
        let mut reader = StructReader::new(input).unwrap();
        reader.read_u32().unwrap();
        reader.read_u32().unwrap();
        assert!(!reader.verify_checksum().unwrap());
    }

    #[test]
    fn test_slice_reader() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u32.to_le_bytes());
        crate::util::varint::encode_u64_into(3, &mut buf);
        buf.extend_from_slice(b"abc");

        let mut reader = SliceReader::new(&buf);
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.read_str().unwrap(), "abc");
        assert!(reader.is_empty());
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_short_file_has_no_trailer() {
        assert!(verify_trailer(&[1, 2]).is_none());
    }
}
