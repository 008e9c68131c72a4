//! Sorted term dictionary.
//!
//! Terms are stored in strictly increasing byte order with front coding:
//!
//! ```text
//! varint term_count
//! per term: varint shared_prefix_len, varint suffix_len, suffix bytes,
//!           varint doc_freq, varint total_freq,
//!           varint postings_offset, varint postings_len, varint skip_count
//! ```
//!
//! The dictionary is decoded eagerly when a segment is opened; lookups are a
//! binary search and merges scan it sequentially.

use crate::error::{LexisError, Result};
use crate::segment::posting::EncodedPostings;
use crate::storage::structured::SliceReader;
use crate::util::varint::encode_u64_into;

/// Where a term's postings live and how many there are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermInfo {
    /// Number of documents containing the term.
    pub doc_freq: u32,
    /// Total number of occurrences.
    pub total_freq: u64,
    /// Offset of the posting block inside the postings section.
    pub offset: u64,
    /// Length of the posting block.
    pub len: u64,
    /// Number of skip entries at the start of the block.
    pub skip_count: u32,
}

impl TermInfo {
    pub fn new(offset: u64, encoded: EncodedPostings) -> Self {
        TermInfo {
            doc_freq: encoded.doc_freq,
            total_freq: encoded.total_freq,
            offset,
            len: encoded.len,
            skip_count: encoded.skip_count,
        }
    }
}

/// Encodes dictionary entries in sorted order.
#[derive(Debug, Default)]
pub struct DictionaryWriter {
    body: Vec<u8>,
    prev_term: String,
    count: u32,
}

impl DictionaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a term; terms must arrive in strictly increasing order.
    pub fn add(&mut self, term: &str, info: &TermInfo) -> Result<()> {
        if self.count > 0 && term <= self.prev_term.as_str() {
            return Err(LexisError::index(format!(
                "dictionary term '{term}' is not after '{}'",
                self.prev_term
            )));
        }

        let shared = self
            .prev_term
            .bytes()
            .zip(term.bytes())
            .take_while(|(a, b)| a == b)
            .count();
        let suffix = &term.as_bytes()[shared..];

        encode_u64_into(shared as u64, &mut self.body);
        encode_u64_into(suffix.len() as u64, &mut self.body);
        self.body.extend_from_slice(suffix);
        encode_u64_into(u64::from(info.doc_freq), &mut self.body);
        encode_u64_into(info.total_freq, &mut self.body);
        encode_u64_into(info.offset, &mut self.body);
        encode_u64_into(info.len, &mut self.body);
        encode_u64_into(u64::from(info.skip_count), &mut self.body);

        self.prev_term.clear();
        self.prev_term.push_str(term);
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Produce the encoded section.
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 5);
        encode_u64_into(u64::from(self.count), &mut out);
        out.extend_from_slice(&self.body);
        out
    }
}

/// A decoded term dictionary.
#[derive(Debug, Default)]
pub struct TermDictionary {
    terms: Vec<Box<str>>,
    infos: Vec<TermInfo>,
}

impl TermDictionary {
    /// Decode a dictionary section, checking every posting block lies
    /// within `postings_len` bytes.
    pub fn decode(bytes: &[u8], postings_len: u64) -> Result<Self> {
        let mut reader = SliceReader::new(bytes);
        let count = reader.read_varint()? as usize;
        if count > bytes.len() {
            return Err(LexisError::storage("implausible dictionary term count"));
        }

        let mut terms: Vec<Box<str>> = Vec::with_capacity(count);
        let mut infos = Vec::with_capacity(count);
        let mut term = Vec::<u8>::new();

        for _ in 0..count {
            let shared = reader.read_varint()? as usize;
            if shared > term.len() {
                return Err(LexisError::storage("dictionary prefix longer than previous term"));
            }
            let suffix = reader.read_bytes()?;
            term.truncate(shared);
            term.extend_from_slice(suffix);

            let info = TermInfo {
                doc_freq: reader.read_varint_u32()?,
                total_freq: reader.read_varint()?,
                offset: reader.read_varint()?,
                len: reader.read_varint()?,
                skip_count: reader.read_varint_u32()?,
            };
            if info.offset.checked_add(info.len).is_none_or(|end| end > postings_len) {
                return Err(LexisError::storage("posting block outside postings section"));
            }

            let text = std::str::from_utf8(&term)
                .map_err(|e| LexisError::storage(format!("dictionary term is not UTF-8: {e}")))?;
            if terms.last().is_some_and(|prev| prev.as_ref() >= text) {
                return Err(LexisError::storage("dictionary terms are not sorted"));
            }
            terms.push(text.into());
            infos.push(info);
        }

        if !reader.is_empty() {
            return Err(LexisError::storage("trailing bytes after dictionary"));
        }

        Ok(TermDictionary { terms, infos })
    }

    /// Look up a term by binary search.
    pub fn get(&self, term: &str) -> Option<&TermInfo> {
        self.terms
            .binary_search_by(|t| t.as_ref().cmp(term))
            .ok()
            .map(|i| &self.infos[i])
    }

    /// Terms and their infos in sorted order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &TermInfo)> {
        self.terms.iter().map(|t| t.as_ref()).zip(self.infos.iter())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
