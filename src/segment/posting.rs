//! Posting list encoding and the pull-based posting cursor.
//!
//! A term's posting block is a skip table followed by the posting stream:
//!
//! ```text
//! skip table: skip_count × (u32 last_doc, u32 stream_offset), little-endian
//! stream:     per posting
//!               varint doc delta   (relative to the previous doc, first vs 0)
//!               varint term freq
//!               varint positions byte length
//!               varint position deltas × term freq
//! ```
//!
//! Skip entry `i` is written after posting `(i + 1) * SKIP_INTERVAL - 1`: it
//! holds that posting's document and the stream offset of the next one, so a
//! cursor can jump over whole blocks when seeking. Positions carry their byte
//! length so they can be skipped without decoding and are only decoded when a
//! phrase, proximity or ranking step asks for them.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{LexisError, Result};
use crate::segment::types::LocalDocNo;
use crate::util::varint::{self, encode_u64_into};

/// Number of postings between skip entries.
pub const SKIP_INTERVAL: u32 = 64;

/// Size of one skip entry in bytes.
pub const SKIP_ENTRY_LEN: usize = 8;

/// Summary of an encoded posting block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodedPostings {
    pub doc_freq: u32,
    pub total_freq: u64,
    pub skip_count: u32,
    pub len: u64,
}

/// Incremental encoder for one posting list at a time.
///
/// Buffers are reused across terms.
#[derive(Debug, Default)]
pub struct PostingEncoder {
    stream: Vec<u8>,
    skips: Vec<(u32, u32)>,
    positions: Vec<u8>,
    prev_doc: LocalDocNo,
    doc_freq: u32,
    total_freq: u64,
}

impl PostingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a posting. Documents must be strictly increasing and
    /// positions ascending.
    pub fn add(&mut self, doc: LocalDocNo, positions: &[u32]) -> Result<()> {
        if self.doc_freq > 0 && doc <= self.prev_doc {
            return Err(LexisError::index(format!(
                "posting for doc {doc} is not after doc {}",
                self.prev_doc
            )));
        }
        if positions.is_empty() {
            return Err(LexisError::index(format!("posting for doc {doc} has no positions")));
        }

        self.positions.clear();
        let mut prev_pos = 0u32;
        for (i, &pos) in positions.iter().enumerate() {
            if i > 0 && pos <= prev_pos {
                return Err(LexisError::index(format!(
                    "positions of doc {doc} are not strictly ascending"
                )));
            }
            encode_u64_into(u64::from(pos - prev_pos), &mut self.positions);
            prev_pos = pos;
        }

        let delta = doc - if self.doc_freq > 0 { self.prev_doc } else { 0 };
        encode_u64_into(u64::from(delta), &mut self.stream);
        encode_u64_into(positions.len() as u64, &mut self.stream);
        encode_u64_into(self.positions.len() as u64, &mut self.stream);
        self.stream.extend_from_slice(&self.positions);

        self.prev_doc = doc;
        self.doc_freq += 1;
        self.total_freq += positions.len() as u64;

        if self.doc_freq % SKIP_INTERVAL == 0 {
            let offset = u32::try_from(self.stream.len())
                .map_err(|_| LexisError::resource_exhausted("posting list exceeds 4 GiB"))?;
            self.skips.push((doc, offset));
        }
        Ok(())
    }

    /// Number of postings added since the last `finish`.
    pub fn doc_freq(&self) -> u32 {
        self.doc_freq
    }

    /// Write the block (skip table then stream) to `out` and reset.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> EncodedPostings {
        // A skip entry pointing at the end of the stream is useless.
        if self
            .skips
            .last()
            .is_some_and(|&(_, offset)| offset as usize == self.stream.len())
        {
            self.skips.pop();
        }

        let start = out.len();
        for &(doc, offset) in &self.skips {
            let mut entry = [0u8; SKIP_ENTRY_LEN];
            LittleEndian::write_u32(&mut entry[..4], doc);
            LittleEndian::write_u32(&mut entry[4..], offset);
            out.extend_from_slice(&entry);
        }
        out.extend_from_slice(&self.stream);

        let encoded = EncodedPostings {
            doc_freq: self.doc_freq,
            total_freq: self.total_freq,
            skip_count: self.skips.len() as u32,
            len: (out.len() - start) as u64,
        };

        self.stream.clear();
        self.skips.clear();
        self.prev_doc = 0;
        self.doc_freq = 0;
        self.total_freq = 0;
        encoded
    }
}

/// Pull-based cursor over one term's postings in one segment.
///
/// A fresh cursor is positioned on its first posting; [`doc`](Self::doc)
/// returns `None` once the list is exhausted.
#[derive(Debug, Clone)]
pub struct PostingCursor<'a> {
    skips: &'a [u8],
    stream: &'a [u8],
    doc_freq: u32,
    /// Offset of the next undecoded posting in `stream`.
    offset: usize,
    /// Postings decoded so far, including the current one.
    consumed: u32,
    doc: Option<LocalDocNo>,
    freq: u32,
    positions_range: (usize, usize),
    positions: Vec<u32>,
    positions_loaded: bool,
}

impl<'a> PostingCursor<'a> {
    /// Open a cursor over an encoded block.
    pub fn new(block: &'a [u8], doc_freq: u32, skip_count: u32) -> Result<Self> {
        let skip_len = skip_count as usize * SKIP_ENTRY_LEN;
        if block.len() < skip_len {
            return Err(LexisError::storage("posting block shorter than its skip table"));
        }
        let (skips, stream) = block.split_at(skip_len);
        let mut cursor = PostingCursor {
            skips,
            stream,
            doc_freq,
            offset: 0,
            consumed: 0,
            doc: None,
            freq: 0,
            positions_range: (0, 0),
            positions: Vec::new(),
            positions_loaded: false,
        };
        cursor.advance()?;
        Ok(cursor)
    }

    /// A cursor with no postings.
    pub fn empty() -> Self {
        PostingCursor {
            skips: &[],
            stream: &[],
            doc_freq: 0,
            offset: 0,
            consumed: 0,
            doc: None,
            freq: 0,
            positions_range: (0, 0),
            positions: Vec::new(),
            positions_loaded: false,
        }
    }

    /// Current document, `None` when exhausted.
    #[inline]
    pub fn doc(&self) -> Option<LocalDocNo> {
        self.doc
    }

    /// Term frequency in the current document.
    #[inline]
    pub fn freq(&self) -> u32 {
        self.freq
    }

    /// Number of documents in the list.
    #[inline]
    pub fn doc_freq(&self) -> u32 {
        self.doc_freq
    }

    /// Move to the next posting.
    pub fn advance(&mut self) -> Result<Option<LocalDocNo>> {
        if self.consumed >= self.doc_freq {
            self.doc = None;
            return Ok(None);
        }

        let prev = if self.consumed == 0 { 0 } else { self.doc.unwrap_or(0) };
        let delta = varint::read_u32_at(self.stream, &mut self.offset)?;
        let freq = varint::read_u32_at(self.stream, &mut self.offset)?;
        let positions_len = varint::read_u64_at(self.stream, &mut self.offset)? as usize;
        let start = self.offset;
        let end = start
            .checked_add(positions_len)
            .filter(|&end| end <= self.stream.len())
            .ok_or_else(|| LexisError::storage("positions run past end of posting block"))?;

        let doc = prev
            .checked_add(delta)
            .ok_or_else(|| LexisError::storage("document delta overflow"))?;
        self.offset = end;
        self.consumed += 1;
        self.doc = Some(doc);
        self.freq = freq;
        self.positions_range = (start, end);
        self.positions_loaded = false;
        Ok(self.doc)
    }

    /// Move to the first posting whose document is `>= target`.
    pub fn seek(&mut self, target: LocalDocNo) -> Result<Option<LocalDocNo>> {
        match self.doc {
            None => return Ok(None),
            Some(doc) if doc >= target => return Ok(Some(doc)),
            _ => {}
        }

        let skip_count = self.skips.len() / SKIP_ENTRY_LEN;
        if skip_count > 0 {
            let entry = |i: usize| {
                let bytes = &self.skips[i * SKIP_ENTRY_LEN..(i + 1) * SKIP_ENTRY_LEN];
                (
                    LittleEndian::read_u32(&bytes[..4]),
                    LittleEndian::read_u32(&bytes[4..]) as usize,
                )
            };

            // Number of skip entries whose last doc is below the target.
            let (mut lo, mut hi) = (0usize, skip_count);
            while lo < hi {
                let mid = (lo + hi) / 2;
                if entry(mid).0 < target {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }

            if lo > 0 {
                let (last_doc, offset) = entry(lo - 1);
                if offset > self.offset {
                    self.offset = offset;
                    self.consumed = lo as u32 * SKIP_INTERVAL;
                    self.doc = Some(last_doc);
                }
            }
        }

        while let Some(doc) = self.advance()? {
            if doc >= target {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    /// Positions of the term in the current document, decoded on demand.
    pub fn positions(&mut self) -> Result<&[u32]> {
        if !self.positions_loaded {
            self.positions.clear();
            let (start, end) = self.positions_range;
            let bytes = &self.stream[start..end];
            let mut pos = 0usize;
            let mut value = 0u32;
            for _ in 0..self.freq {
                let delta = varint::read_u32_at(bytes, &mut pos)?;
                value = value
                    .checked_add(delta)
                    .ok_or_else(|| LexisError::storage("position delta overflow"))?;
                self.positions.push(value);
            }
            if pos != bytes.len() {
                return Err(LexisError::storage("position block length mismatch"));
            }
            self.positions_loaded = true;
        }
        Ok(&self.positions)
    }
}
