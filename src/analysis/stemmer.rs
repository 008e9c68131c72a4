//! Stemming capability boundary.
//!
//! The engine only depends on the [`Stemmer`] trait. [`SnowballStemmer`]
//! provides the Snowball algorithms through `rust-stemmers`; [`NoopStemmer`]
//! is used when a field has no stemming language.

use std::fmt;

use rust_stemmers::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Languages with a Snowball stemming algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Arabic,
    Danish,
    Dutch,
    English,
    Finnish,
    French,
    German,
    Greek,
    Hungarian,
    Italian,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
    Tamil,
    Turkish,
}

impl Language {
    fn algorithm(self) -> Algorithm {
        match self {
            Language::Arabic => Algorithm::Arabic,
            Language::Danish => Algorithm::Danish,
            Language::Dutch => Algorithm::Dutch,
            Language::English => Algorithm::English,
            Language::Finnish => Algorithm::Finnish,
            Language::French => Algorithm::French,
            Language::German => Algorithm::German,
            Language::Greek => Algorithm::Greek,
            Language::Hungarian => Algorithm::Hungarian,
            Language::Italian => Algorithm::Italian,
            Language::Norwegian => Algorithm::Norwegian,
            Language::Portuguese => Algorithm::Portuguese,
            Language::Romanian => Algorithm::Romanian,
            Language::Russian => Algorithm::Russian,
            Language::Spanish => Algorithm::Spanish,
            Language::Swedish => Algorithm::Swedish,
            Language::Tamil => Algorithm::Tamil,
            Language::Turkish => Algorithm::Turkish,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// Trait for stemming algorithms.
pub trait Stemmer: Send + Sync + fmt::Debug {
    /// Reduce `word` to its stem in `language`.
    fn stem(&self, word: &str, language: Language) -> Result<String>;

    /// Get the name of this stemmer.
    fn name(&self) -> &'static str;
}

/// Snowball stemmers backed by `rust-stemmers`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnowballStemmer;

impl Stemmer for SnowballStemmer {
    fn stem(&self, word: &str, language: Language) -> Result<String> {
        let stemmer = rust_stemmers::Stemmer::create(language.algorithm());
        Ok(stemmer.stem(word).into_owned())
    }

    fn name(&self) -> &'static str {
        "snowball"
    }
}

/// A stemmer that returns words unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStemmer;

impl Stemmer for NoopStemmer {
    fn stem(&self, word: &str, _language: Language) -> Result<String> {
        Ok(word.to_string())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
