//! Search requests and results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::{AttributeValue, DocId};
use crate::query::ast::QueryNode;
use crate::query::cancel::CancellationToken;
use crate::query::scorer::RankingMode;
use crate::segment::attributes::StoredDocument;

/// A query given as a tree or as a query string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryInput {
    Text(String),
    Node(QueryNode),
}

impl From<&str> for QueryInput {
    fn from(text: &str) -> Self {
        QueryInput::Text(text.to_string())
    }
}

impl From<String> for QueryInput {
    fn from(text: String) -> Self {
        QueryInput::Text(text)
    }
}

impl From<QueryNode> for QueryInput {
    fn from(node: QueryNode) -> Self {
        QueryInput::Node(node)
    }
}

/// Attribute filter, checked before a match is scored.
///
/// A document without the attribute never matches the filter, so it is
/// dropped by an including filter and kept by an excluding one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Attribute equals one of the values.
    Values {
        attribute: String,
        values: Vec<AttributeValue>,
        #[serde(default)]
        exclude: bool,
    },

    /// Integer attribute in `min..=max`.
    Range {
        attribute: String,
        min: i64,
        max: i64,
        #[serde(default)]
        exclude: bool,
    },

    /// Numeric attribute in `min..=max`.
    FloatRange {
        attribute: String,
        min: f64,
        max: f64,
        #[serde(default)]
        exclude: bool,
    },
}

impl Filter {
    pub fn values<S: Into<String>>(attribute: S, values: Vec<AttributeValue>) -> Self {
        Filter::Values {
            attribute: attribute.into(),
            values,
            exclude: false,
        }
    }

    pub fn range<S: Into<String>>(attribute: S, min: i64, max: i64) -> Self {
        Filter::Range {
            attribute: attribute.into(),
            min,
            max,
            exclude: false,
        }
    }

    pub fn float_range<S: Into<String>>(attribute: S, min: f64, max: f64) -> Self {
        Filter::FloatRange {
            attribute: attribute.into(),
            min,
            max,
            exclude: false,
        }
    }

    /// Invert the filter.
    pub fn excluding(mut self) -> Self {
        match &mut self {
            Filter::Values { exclude, .. }
            | Filter::Range { exclude, .. }
            | Filter::FloatRange { exclude, .. } => *exclude = true,
        }
        self
    }

    /// Whether `doc` passes the filter.
    pub fn accepts(&self, doc: &StoredDocument) -> bool {
        let (attribute, exclude) = match self {
            Filter::Values {
                attribute, exclude, ..
            }
            | Filter::Range {
                attribute, exclude, ..
            }
            | Filter::FloatRange {
                attribute, exclude, ..
            } => (attribute, *exclude),
        };

        let matched = doc.attributes.get(attribute).is_some_and(|value| match self {
            Filter::Values { values, .. } => values
                .iter()
                .any(|v| v.sort_cmp(value) == std::cmp::Ordering::Equal),
            Filter::Range { min, max, .. } => {
                value.as_i64().is_some_and(|v| (*min..=*max).contains(&v))
            }
            Filter::FloatRange { min, max, .. } => {
                value.as_f64().is_some_and(|v| v >= *min && v <= *max)
            }
        });
        matched != exclude
    }
}

/// Order of the results.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "by", content = "attribute", rename_all = "snake_case")]
pub enum SortMode {
    /// Score descending.
    #[default]
    Relevance,

    /// Attribute ascending, then score descending.
    AttributeAsc(String),

    /// Attribute descending, then score descending.
    AttributeDesc(String),
}

impl SortMode {
    /// Attribute the results are sorted by, if any.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            SortMode::Relevance => None,
            SortMode::AttributeAsc(attr) | SortMode::AttributeDesc(attr) => Some(attr),
        }
    }
}

/// A search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: QueryInput,

    /// Ranking; the searcher's default when unset.
    #[serde(default)]
    pub ranking: Option<RankingMode>,

    #[serde(default)]
    pub sort: SortMode,

    /// Page size; the searcher's default when unset.
    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default)]
    pub offset: usize,

    /// Collapse hits sharing a value of this attribute.
    #[serde(default)]
    pub group_by: Option<String>,

    #[serde(default)]
    pub filters: Vec<Filter>,

    /// Upper bound on `offset + limit`; the searcher's default when unset.
    #[serde(default)]
    pub max_matches: Option<usize>,

    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl SearchRequest {
    pub fn new<Q: Into<QueryInput>>(query: Q) -> Self {
        SearchRequest {
            query: query.into(),
            ranking: None,
            sort: SortMode::Relevance,
            limit: None,
            offset: 0,
            group_by: None,
            filters: Vec::new(),
            max_matches: None,
            cancellation: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_ranking(mut self, ranking: RankingMode) -> Self {
        self.ranking = Some(ranking);
        self
    }

    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_group_by<S: Into<String>>(mut self, attribute: S) -> Self {
        self.group_by = Some(attribute.into());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_max_matches(mut self, max_matches: usize) -> Self {
        self.max_matches = Some(max_matches);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Outcome of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Ok,
    /// The query had no searchable terms.
    EmptyQuery,
    /// Some segments were excluded after failing validation.
    Partial,
}

/// One result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f32,
    pub attributes: BTreeMap<String, AttributeValue>,

    /// Number of matches in the hit's group, when grouping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_count: Option<u64>,
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,

    /// Matches after deletions and filters; groups when grouping.
    pub total_matched: u64,

    pub status: SearchStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,

    /// Version of the snapshot the query ran against.
    pub snapshot_version: u64,

    pub took_ms: u64,
}

impl SearchResults {
    /// Results of a query that matched nothing.
    pub fn empty(status: SearchStatus, snapshot_version: u64) -> Self {
        SearchResults {
            hits: Vec::new(),
            total_matched: 0,
            status,
            warnings: Vec::new(),
            snapshot_version,
            took_ms: 0,
        }
    }

    pub fn doc_ids(&self) -> Vec<DocId> {
        self.hits.iter().map(|h| h.doc_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(attributes: &[(&str, AttributeValue)]) -> StoredDocument {
        StoredDocument {
            doc_id: 1,
            field_lengths: vec![1],
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_filters() {
        let doc = stored(&[
            ("year", AttributeValue::Int(2020)),
            ("price", AttributeValue::Float(9.5)),
            ("lang", AttributeValue::from("en")),
        ]);

        assert!(Filter::range("year", 2000, 2020).accepts(&doc));
        assert!(!Filter::range("year", 2021, 2030).accepts(&doc));
        assert!(Filter::range("year", 2021, 2030).excluding().accepts(&doc));
        assert!(Filter::float_range("price", 9.0, 10.0).accepts(&doc));
        assert!(Filter::float_range("year", 2019.5, 2020.5).accepts(&doc));
        assert!(Filter::values("lang", vec!["de".into(), "en".into()]).accepts(&doc));
        assert!(!Filter::values("lang", vec!["de".into()]).accepts(&doc));

        // Missing attributes never match.
        assert!(!Filter::range("stock", 0, 10).accepts(&doc));
        assert!(Filter::range("stock", 0, 10).excluding().accepts(&doc));
    }

    #[test]
    fn test_request_from_json() {
        let json = r#"{
            "query": "rust -java",
            "limit": 5,
            "sort": {"by": "attribute_desc", "attribute": "year"},
            "filters": [{"type": "range", "attribute": "year", "min": 2000, "max": 2024}],
            "ranking": {"mode": "word_count"}
        }"#;
        let request: SearchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.query, QueryInput::Text("rust -java".to_string()));
        assert_eq!(request.limit, Some(5));
        assert_eq!(request.sort, SortMode::AttributeDesc("year".to_string()));
        assert_eq!(request.ranking, Some(RankingMode::WordCount));
        assert_eq!(request.filters, vec![Filter::range("year", 2000, 2024)]);

        let json = r#"{"query": {"phrase": ["a", "b"]}}"#;
        let request: SearchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.query, QueryInput::Node(QueryNode::phrase(["a", "b"])));
        assert_eq!(request.sort, SortMode::Relevance);
    }
}
