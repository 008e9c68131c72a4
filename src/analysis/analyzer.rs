//! Analyzers combining a tokenizer with a chain of filters.

use std::fmt;
use std::sync::Arc;

use encoding_rs::Encoding;

use crate::analysis::encoding;
use crate::analysis::stemmer::{SnowballStemmer, Stemmer};
use crate::analysis::token::{Token, TokenStream};
use crate::analysis::token_filter::{
    Filter, LengthFilter, LowercaseFilter, StemFilter, StopFilter,
};
use crate::analysis::tokenizer::{Tokenizer, UnicodeWordTokenizer};
use crate::config::{FieldConfig, IndexConfig};
use crate::error::{LexisError, Result};

/// The analysis pipeline of one field.
#[derive(Clone)]
pub struct Analyzer {
    field: String,
    encoding: &'static Encoding,
    tokenizer: Arc<dyn Tokenizer>,
    filters: Vec<Arc<dyn Filter>>,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filters: Vec<&str> = self.filters.iter().map(|f| f.name()).collect();
        f.debug_struct("Analyzer")
            .field("field", &self.field)
            .field("encoding", &self.encoding.name())
            .field("tokenizer", &self.tokenizer.name())
            .field("filters", &filters)
            .finish()
    }
}

impl Analyzer {
    /// Build the pipeline described by `config` with Snowball stemming.
    pub fn for_field(config: &FieldConfig) -> Result<Self> {
        Self::with_stemmer(config, Arc::new(SnowballStemmer))
    }

    /// Build the pipeline described by `config` with a custom stemmer.
    pub fn with_stemmer(config: &FieldConfig, stemmer: Arc<dyn Stemmer>) -> Result<Self> {
        let mut filters: Vec<Arc<dyn Filter>> = Vec::new();

        if config.lowercase {
            filters.push(Arc::new(LowercaseFilter::new()));
        }
        filters.push(Arc::new(LengthFilter::new(
            config.min_term_len,
            config.max_term_len,
        )));
        if !config.stop_words.is_empty() {
            filters.push(Arc::new(StopFilter::with_words(&config.stop_words)));
        }
        if let Some(language) = config.stem_language {
            filters.push(Arc::new(StemFilter::new(stemmer, language)));
        }

        Ok(Analyzer {
            field: config.name.clone(),
            encoding: encoding::lookup(&config.encoding)?,
            tokenizer: Arc::new(UnicodeWordTokenizer::new()),
            filters,
        })
    }

    /// Name of the analysed field.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Analyze text lazily.
    pub fn analyze<'a>(&'a self, text: &'a str) -> Result<TokenStream<'a>> {
        let mut tokens = self.tokenizer.tokenize(text)?;
        for filter in &self.filters {
            tokens = filter.filter(tokens)?;
        }
        Ok(tokens)
    }

    /// Decode raw bytes with the field encoding, then analyze them.
    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<Vec<Token>> {
        let text = encoding::decode(bytes, self.encoding);
        let tokens = self.analyze(&text)?.collect();
        Ok(tokens)
    }

    /// Analyze text and return only the terms.
    pub fn terms(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.analyze(text)?.map(|t| t.text).collect())
    }
}

/// The analyzers of every field of an index, in field-index order.
#[derive(Debug, Clone)]
pub struct PerFieldAnalyzer {
    analyzers: Vec<Analyzer>,
}

impl PerFieldAnalyzer {
    /// Build analyzers for all fields of `config`.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        Self::with_stemmer(config, Arc::new(SnowballStemmer))
    }

    /// Build analyzers sharing a custom stemmer.
    pub fn with_stemmer(config: &IndexConfig, stemmer: Arc<dyn Stemmer>) -> Result<Self> {
        let analyzers = config
            .fields
            .iter()
            .map(|field| Analyzer::with_stemmer(field, Arc::clone(&stemmer)))
            .collect::<Result<Vec<_>>>()?;
        Ok(PerFieldAnalyzer { analyzers })
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Analyzer of the field at `index`.
    pub fn get(&self, index: usize) -> Option<&Analyzer> {
        self.analyzers.get(index)
    }

    /// Index of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.analyzers.iter().position(|a| a.field() == name)
    }

    /// Resolve field names to indexes, failing on unknown names.
    pub fn resolve_fields(&self, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.field_index(name).ok_or_else(|| {
                    LexisError::malformed_query(format!("unknown field '{name}'"))
                })
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Analyzer> {
        self.analyzers.iter()
    }
}
