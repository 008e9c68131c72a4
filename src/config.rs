//! Index configuration.
//!
//! An [`IndexConfig`] is supplied when an index is created and persisted next
//! to the segments as `index.json`, so that reopening an index analyses
//! queries exactly the way its documents were analysed.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::analysis::stemmer::Language;
use crate::error::{LexisError, Result};
use crate::merge::policy::MergePolicyConfig;
use crate::query::scorer::RankingMode;
use crate::util::retry::RetryConfig;

/// Maximum number of full-text fields; the field index occupies 8 bits of a
/// hit position.
pub const MAX_FIELDS: usize = 255;

/// Name of the persisted configuration file.
pub const CONFIG_FILE: &str = "index.json";

/// Analysis settings of one full-text field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Field name as it appears in documents and `@field` query limits.
    pub name: String,

    /// Weight of hits in this field when ranking.
    pub weight: u32,

    /// Casefold tokens before any other normalization.
    pub lowercase: bool,

    /// Snowball stemming language, or none for no stemming.
    pub stem_language: Option<Language>,

    /// Minimum term length in characters; shorter tokens are dropped.
    pub min_term_len: usize,

    /// Maximum term length in characters; longer tokens are dropped.
    pub max_term_len: usize,

    /// Stop words, matched after casefolding and before stemming.
    pub stop_words: Vec<String>,

    /// Encoding label of raw byte input (WHATWG labels, e.g. `utf-8`,
    /// `windows-1251`, `koi8-r`).
    pub encoding: String,
}

impl Default for FieldConfig {
    fn default() -> Self {
        FieldConfig {
            name: String::new(),
            weight: 1,
            lowercase: true,
            stem_language: None,
            min_term_len: 1,
            max_term_len: 64,
            stop_words: Vec::new(),
            encoding: "utf-8".to_string(),
        }
    }
}

impl FieldConfig {
    /// A casefolded, unstemmed text field.
    pub fn text<S: Into<String>>(name: S) -> Self {
        FieldConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the stemming language.
    pub fn with_stemming(mut self, language: Language) -> Self {
        self.stem_language = Some(language);
        self
    }

    /// Set the ranking weight.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Set the stop word list.
    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_words = words.into_iter().map(Into::into).collect();
        self
    }

    /// Set the encoding label of raw byte input.
    pub fn with_encoding<S: Into<String>>(mut self, label: S) -> Self {
        self.encoding = label.into();
        self
    }
}

/// Query-side defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Ranking used when a request does not name one.
    pub default_ranking: RankingMode,

    /// Threads used to execute segments in parallel; 0 means one per CPU,
    /// 1 executes segments sequentially on the calling thread.
    pub search_threads: usize,

    /// Page size used when a request does not name one.
    pub default_limit: usize,

    /// Upper bound on `offset + limit`.
    pub max_matches: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            default_ranking: RankingMode::default(),
            search_threads: 0,
            default_limit: 20,
            max_matches: 1000,
        }
    }
}

/// Configuration of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Full-text fields, in field-index order.
    pub fields: Vec<FieldConfig>,

    /// Estimated size of the in-memory buffer that forces a flush.
    pub memory_budget_bytes: usize,

    /// Run the size-tiered merge policy on a background thread after flushes.
    pub background_merge: bool,

    /// Merge policy parameters.
    pub merge: MergePolicyConfig,

    /// Retry behaviour of flush and merge.
    pub retry: RetryConfig,

    /// Query-side defaults.
    pub search: SearchConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            fields: vec![FieldConfig::text("content")],
            memory_budget_bytes: 32 * 1024 * 1024,
            background_merge: true,
            merge: MergePolicyConfig::default(),
            retry: RetryConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl IndexConfig {
    /// A configuration with the given fields and defaults elsewhere.
    pub fn with_fields(fields: Vec<FieldConfig>) -> Self {
        IndexConfig {
            fields,
            ..Default::default()
        }
    }

    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(LexisError::config("at least one field is required"));
        }
        if self.fields.len() > MAX_FIELDS {
            return Err(LexisError::config(format!(
                "{} fields configured, at most {MAX_FIELDS} are supported",
                self.fields.len()
            )));
        }

        let mut seen = AHashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(LexisError::config("field name must not be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(LexisError::config(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
            if field.min_term_len == 0 || field.min_term_len > field.max_term_len {
                return Err(LexisError::config(format!(
                    "field '{}': invalid term length bounds {}..={}",
                    field.name, field.min_term_len, field.max_term_len
                )));
            }
            if encoding_rs::Encoding::for_label(field.encoding.as_bytes()).is_none() {
                return Err(LexisError::UnsupportedEncoding(field.encoding.clone()));
            }
        }

        if self.memory_budget_bytes == 0 {
            return Err(LexisError::config("memory budget must be positive"));
        }
        if self.search.max_matches == 0 {
            return Err(LexisError::config("max_matches must be positive"));
        }

        self.merge.validate()
    }

    /// Index of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: IndexConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IndexConfig::default();
        config.validate().unwrap();
        assert_eq!(config.field_index("content"), Some(0));
        assert_eq!(config.field_index("missing"), None);
    }

    #[test]
    fn test_rejects_duplicate_fields() {
        let config = IndexConfig::with_fields(vec![
            FieldConfig::text("title"),
            FieldConfig::text("title"),
        ]);
        assert!(matches!(config.validate(), Err(LexisError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_term_bounds() {
        let mut field = FieldConfig::text("body");
        field.min_term_len = 10;
        field.max_term_len = 3;
        let config = IndexConfig::with_fields(vec![field]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_encoding() {
        let config =
            IndexConfig::with_fields(vec![FieldConfig::text("body").with_encoding("no-such")]);
        assert!(matches!(
            config.validate(),
            Err(LexisError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_json_round_trip_with_partial_input() {
        let json = r#"{
            "fields": [
                {"name": "title", "weight": 3, "stem_language": "english"},
                {"name": "body"}
            ],
            "memory_budget_bytes": 1048576
        }"#;

        let config = IndexConfig::from_json_str(json).unwrap();
        assert_eq!(config.fields[0].weight, 3);
        assert_eq!(config.fields[0].stem_language, Some(Language::English));
        assert!(config.fields[1].lowercase);
        assert_eq!(config.memory_budget_bytes, 1 << 20);
        assert_eq!(config.search.default_limit, 20);

        let again = IndexConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
        assert_eq!(again, config);
    }
}
