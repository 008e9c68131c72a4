//! # lexis
//!
//! A segment-based full-text indexing and query engine.
//!
//! ## Features
//!
//! - Unicode tokenization with casefolding, stop words and Snowball stemming
//! - Immutable, checksummed on-disk segments with skip tables
//! - Size-tiered background merging with logical deletions
//! - Lock-free snapshots for concurrent queries while indexing
//! - Boolean, phrase, proximity and field-limited queries
//! - Proximity, BM25, TF-IDF and word count ranking
//! - Attribute filters, sorting and grouping

pub mod analysis;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod merge;
pub mod query;
pub mod search;
pub mod segment;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::config::{FieldConfig, IndexConfig};
    pub use crate::document::{AttributeValue, DocId, Document};
    pub use crate::error::{LexisError, Result};
    pub use crate::index::{Index, IndexWriter};
    pub use crate::query::{Filter, QueryNode, RankingMode, SearchRequest, SearchResults, SortMode};
    pub use crate::search::Searcher;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
