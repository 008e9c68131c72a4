//! Per-document attribute store.
//!
//! For every local document the store keeps the external id, the number of
//! indexed tokens per field (for length normalization) and the attribute
//! map.
//!
//! ```text
//! varint doc_count
//! per doc: u64 external_id, varint field_count, varint length × field_count,
//!          varint attr_count, per attr: string name, u8 tag, value
//! ```

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::document::{AttributeValue, DocId};
use crate::error::{LexisError, Result};
use crate::segment::types::LocalDocNo;
use crate::storage::structured::SliceReader;
use crate::util::varint::encode_u64_into;

const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_STR: u8 = 3;

/// Stored data of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub doc_id: DocId,
    pub field_lengths: Vec<u32>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl StoredDocument {
    /// Number of indexed tokens in all fields.
    pub fn total_length(&self) -> u64 {
        self.field_lengths.iter().map(|&l| u64::from(l)).sum()
    }
}

/// Append one document to an encoded store body.
pub fn encode_document(doc: &StoredDocument, out: &mut Vec<u8>) {
    out.extend_from_slice(&doc.doc_id.to_le_bytes());
    encode_u64_into(doc.field_lengths.len() as u64, out);
    for &len in &doc.field_lengths {
        encode_u64_into(u64::from(len), out);
    }
    encode_u64_into(doc.attributes.len() as u64, out);
    for (name, value) in &doc.attributes {
        encode_u64_into(name.len() as u64, out);
        out.extend_from_slice(name.as_bytes());
        match value {
            AttributeValue::Bool(v) => {
                out.push(TAG_BOOL);
                out.push(u8::from(*v));
            }
            AttributeValue::Int(v) => {
                out.push(TAG_INT);
                out.extend_from_slice(&v.to_le_bytes());
            }
            AttributeValue::Float(v) => {
                out.push(TAG_FLOAT);
                out.extend_from_slice(&v.to_le_bytes());
            }
            AttributeValue::Str(v) => {
                out.push(TAG_STR);
                encode_u64_into(v.len() as u64, out);
                out.extend_from_slice(v.as_bytes());
            }
        }
    }
}

/// Encode a whole attribute section.
pub fn encode_store<'a, I>(docs: I) -> Vec<u8>
where
    I: ExactSizeIterator<Item = &'a StoredDocument>,
{
    let mut out = Vec::new();
    encode_u64_into(docs.len() as u64, &mut out);
    for doc in docs {
        encode_document(doc, &mut out);
    }
    out
}

fn decode_document(reader: &mut SliceReader<'_>, field_count: usize) -> Result<StoredDocument> {
    let doc_id = reader.read_u64()?;

    let lengths = reader.read_varint()? as usize;
    if lengths != field_count {
        return Err(LexisError::storage(format!(
            "document {doc_id} has {lengths} field lengths, expected {field_count}"
        )));
    }
    let field_lengths = (0..lengths)
        .map(|_| reader.read_varint_u32())
        .collect::<Result<Vec<_>>>()?;

    let attr_count = reader.read_varint()? as usize;
    let mut attributes = BTreeMap::new();
    for _ in 0..attr_count {
        let name = reader.read_str()?.to_string();
        let value = match reader.read_u8()? {
            TAG_BOOL => AttributeValue::Bool(reader.read_u8()? != 0),
            TAG_INT => AttributeValue::Int(reader.read_u64()? as i64),
            TAG_FLOAT => AttributeValue::Float(reader.read_f64()?),
            TAG_STR => AttributeValue::Str(reader.read_str()?.to_string()),
            tag => {
                return Err(LexisError::storage(format!("unknown attribute tag {tag}")));
            }
        };
        attributes.insert(name, value);
    }

    Ok(StoredDocument {
        doc_id,
        field_lengths,
        attributes,
    })
}

/// Decoded attribute store of a segment.
#[derive(Debug, Default)]
pub struct AttributeStore {
    docs: Vec<StoredDocument>,
    by_id: AHashMap<DocId, LocalDocNo>,
    total_field_lengths: Vec<u64>,
}

impl AttributeStore {
    /// Decode an attribute section holding `doc_count` documents.
    pub fn decode(bytes: &[u8], doc_count: u32, field_count: usize) -> Result<Self> {
        let mut reader = SliceReader::new(bytes);
        let stored = reader.read_varint()?;
        if stored != u64::from(doc_count) {
            return Err(LexisError::storage(format!(
                "attribute store holds {stored} documents, header says {doc_count}"
            )));
        }

        let mut docs = Vec::with_capacity(doc_count as usize);
        let mut by_id = AHashMap::with_capacity(doc_count as usize);
        let mut total_field_lengths = vec![0u64; field_count];

        for local in 0..doc_count {
            let doc = decode_document(&mut reader, field_count)?;
            for (total, &len) in total_field_lengths.iter_mut().zip(&doc.field_lengths) {
                *total += u64::from(len);
            }
            // A later copy of an id supersedes an earlier one.
            by_id.insert(doc.doc_id, local);
            docs.push(doc);
        }

        if !reader.is_empty() {
            return Err(LexisError::storage("trailing bytes after attribute store"));
        }

        Ok(AttributeStore {
            docs,
            by_id,
            total_field_lengths,
        })
    }

    pub fn get(&self, local: LocalDocNo) -> Option<&StoredDocument> {
        self.docs.get(local as usize)
    }

    /// Local number of the latest copy of an external id.
    pub fn lookup(&self, doc_id: DocId) -> Option<LocalDocNo> {
        self.by_id.get(&doc_id).copied()
    }

    /// Every local number holding `doc_id`, in ascending order.
    pub fn lookup_all(&self, doc_id: DocId) -> Vec<LocalDocNo> {
        self.docs
            .iter()
            .enumerate()
            .filter(|(_, d)| d.doc_id == doc_id)
            .map(|(i, _)| i as LocalDocNo)
            .collect()
    }

    pub fn total_field_lengths(&self) -> &[u64] {
        &self.total_field_lengths
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredDocument> {
        self.docs.iter()
    }
}
