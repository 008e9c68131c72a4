//! Text analysis: turning field text into normalized, positioned terms.
//!
//! A field's [`analyzer::Analyzer`] runs a Unicode word tokenizer followed by
//! a chain of token filters (casefolding, length bounds, stop words,
//! stemming). The same analyzer is used when indexing and when planning
//! queries, so a query term matches exactly the terms a document produced.
//!
//! ```
//! use lexis::analysis::tokenize;
//! use lexis::analysis::stemmer::Language;
//! use lexis::config::FieldConfig;
//!
//! # fn main() -> lexis::error::Result<()> {
//! let field = FieldConfig::text("body").with_stemming(Language::English);
//! let terms: Vec<_> = tokenize(b"Foxes Running", &field)?.collect();
//! assert_eq!(terms, vec![("fox".to_string(), 0), ("run".to_string(), 1)]);
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod encoding;
pub mod stemmer;
pub mod token;
pub mod token_filter;
pub mod tokenizer;

use crate::config::FieldConfig;
use crate::error::Result;

/// Analyze raw bytes of one field, yielding `(term, word_position)` pairs.
///
/// The bytes are decoded with the field's configured encoding first; an
/// unknown encoding label is an error.
pub fn tokenize(bytes: &[u8], config: &FieldConfig) -> Result<impl Iterator<Item = (String, u32)>> {
    let analyzer = analyzer::Analyzer::for_field(config)?;
    let tokens = analyzer.analyze_bytes(bytes)?;
    Ok(tokens.into_iter().map(|t| (t.text, t.position)))
}
