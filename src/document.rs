//! Documents and attribute values.
//!
//! A [`Document`] carries an external 64-bit id, full-text field content
//! keyed by field name and scalar attributes used for filtering, sorting and
//! grouping.
//!
//! ```
//! use lexis::document::{AttributeValue, Document};
//!
//! let doc = Document::builder(7)
//!     .add_text("title", "Rust Programming Guide")
//!     .add_attribute("year", 2024i64)
//!     .add_attribute("price", 39.99)
//!     .build();
//!
//! assert_eq!(doc.id, 7);
//! assert_eq!(doc.attribute("year"), Some(&AttributeValue::Int(2024)));
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// External document identifier.
pub type DocId = u64;

/// Content of one full-text field.
///
/// Byte content is decoded with the field's configured encoding at
/// analysis time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldText {
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldText {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldText::Text(text) => text.as_bytes(),
            FieldText::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for FieldText {
    fn from(text: &str) -> Self {
        FieldText::Text(text.to_string())
    }
}

impl From<String> for FieldText {
    fn from(text: String) -> Self {
        FieldText::Text(text)
    }
}

impl From<Vec<u8>> for FieldText {
    fn from(bytes: Vec<u8>) -> Self {
        FieldText::Bytes(bytes)
    }
}

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttributeValue {
    /// Numeric view, used by range filters and numeric sorting.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            AttributeValue::Str(_) => None,
        }
    }

    /// Integer view, used by value and integer range filters.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Total order used for attribute sorting.
    ///
    /// Numbers (including booleans) compare numerically and sort before
    /// strings; NaN sorts after every other number.
    pub fn sort_cmp(&self, other: &AttributeValue) -> Ordering {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.as_str().cmp(&other.as_str()),
        }
    }

    /// Hashable key identifying the group of this value.
    pub fn group_key(&self) -> GroupKey {
        match self {
            AttributeValue::Bool(v) => GroupKey::Int(i64::from(*v)),
            AttributeValue::Int(v) => GroupKey::Int(*v),
            AttributeValue::Float(v) => GroupKey::Float(v.to_bits()),
            AttributeValue::Str(s) => GroupKey::Str(s.clone()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Str(v)
    }
}

/// Grouping key derived from an [`AttributeValue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Int(i64),
    Float(u64),
    Str(String),
}

/// A document to be indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// External identifier, unique among live documents.
    pub id: DocId,

    /// Full-text content by field name.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldText>,

    /// Attributes by name.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Document {
    pub fn new(id: DocId) -> Self {
        Document {
            id,
            fields: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn builder(id: DocId) -> DocumentBuilder {
        DocumentBuilder {
            doc: Document::new(id),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldText> {
        self.fields.get(name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// Builder for [`Document`].
#[derive(Debug)]
pub struct DocumentBuilder {
    doc: Document,
}

impl DocumentBuilder {
    /// Add text content for a field.
    pub fn add_text<S: Into<String>, T: Into<String>>(mut self, field: S, text: T) -> Self {
        self.doc
            .fields
            .insert(field.into(), FieldText::Text(text.into()));
        self
    }

    /// Add raw bytes for a field, decoded with the field encoding.
    pub fn add_bytes<S: Into<String>>(mut self, field: S, bytes: Vec<u8>) -> Self {
        self.doc.fields.insert(field.into(), FieldText::Bytes(bytes));
        self
    }

    pub fn add_attribute<S: Into<String>, V: Into<AttributeValue>>(
        mut self,
        name: S,
        value: V,
    ) -> Self {
        self.doc.attributes.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Document {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order() {
        let values = [
            AttributeValue::Str("b".into()),
            AttributeValue::Float(2.5),
            AttributeValue::Int(3),
            AttributeValue::Str("a".into()),
            AttributeValue::Bool(false),
        ];
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.sort_cmp(b));

        assert_eq!(
            sorted,
            vec![
                AttributeValue::Bool(false),
                AttributeValue::Float(2.5),
                AttributeValue::Int(3),
                AttributeValue::Str("a".into()),
                AttributeValue::Str("b".into()),
            ]
        );
    }

    #[test]
    fn test_group_keys() {
        assert_eq!(
            AttributeValue::Int(1).group_key(),
            AttributeValue::Bool(true).group_key()
        );
        assert_ne!(
            AttributeValue::Int(1).group_key(),
            AttributeValue::Str("1".into()).group_key()
        );
    }

    #[test]
    fn test_json_document() {
        let json = r#"{"id": 5, "fields": {"body": "hello"}, "attributes": {"n": 3, "tag": "x", "ok": true, "f": 0.5}}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.id, 5);
        assert_eq!(doc.field("body"), Some(&FieldText::Text("hello".into())));
        assert_eq!(doc.attribute("n"), Some(&AttributeValue::Int(3)));
        assert_eq!(doc.attribute("ok"), Some(&AttributeValue::Bool(true)));
        assert_eq!(doc.attribute("f"), Some(&AttributeValue::Float(0.5)));
        assert_eq!(doc.attribute("tag").and_then(|v| v.as_str()), Some("x"));
    }
}
