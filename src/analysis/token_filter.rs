//! Token filters transforming token streams.
//!
//! ```text
//! Tokenizer → Lowercase → Length → Stop Words → Stemmer → Index
//! ```
//!
//! Filters drop tokens without renumbering positions, so phrase queries keep
//! counting removed words.

use std::sync::{Arc, LazyLock};

use ahash::AHashSet;
use tracing::trace;

use crate::analysis::stemmer::{Language, Stemmer};
use crate::analysis::token::TokenStream;
use crate::error::Result;

/// Default English stop words.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Default English stop words as a set.
pub static ENGLISH_STOP_WORDS_SET: LazyLock<AHashSet<String>> =
    LazyLock::new(|| ENGLISH_STOP_WORDS.iter().map(|&s| s.to_string()).collect());

/// Trait for filters that transform token streams.
pub trait Filter: Send + Sync {
    /// Apply this filter to a token stream.
    fn filter<'a>(&'a self, tokens: TokenStream<'a>) -> Result<TokenStream<'a>>;

    /// Get the name of this filter (for debugging and configuration).
    fn name(&self) -> &'static str;
}

/// Casefolds tokens.
#[derive(Clone, Debug, Default)]
pub struct LowercaseFilter;

impl LowercaseFilter {
    pub fn new() -> Self {
        LowercaseFilter
    }
}

impl Filter for LowercaseFilter {
    fn filter<'a>(&'a self, tokens: TokenStream<'a>) -> Result<TokenStream<'a>> {
        Ok(Box::new(tokens.map(|mut token| {
            if token.text.chars().any(|c| !c.is_lowercase()) {
                token.text = token.text.to_lowercase();
            }
            token
        })))
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}

/// Drops tokens whose character length is outside `min..=max`.
#[derive(Clone, Debug)]
pub struct LengthFilter {
    min: usize,
    max: usize,
}

impl LengthFilter {
    pub fn new(min: usize, max: usize) -> Self {
        LengthFilter { min, max }
    }
}

impl Filter for LengthFilter {
    fn filter<'a>(&'a self, tokens: TokenStream<'a>) -> Result<TokenStream<'a>> {
        Ok(Box::new(tokens.filter(move |token| {
            let len = token.char_len();
            len >= self.min && len <= self.max
        })))
    }

    fn name(&self) -> &'static str {
        "length"
    }
}

/// Removes stop words.
#[derive(Clone, Debug)]
pub struct StopFilter {
    stop_words: Arc<AHashSet<String>>,
}

impl StopFilter {
    /// Filter with the default English stop words.
    pub fn new() -> Self {
        StopFilter {
            stop_words: Arc::new(ENGLISH_STOP_WORDS_SET.clone()),
        }
    }

    /// Filter with a custom word list. Words are casefolded.
    pub fn with_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        StopFilter {
            stop_words: Arc::new(words.into_iter().map(|w| w.as_ref().to_lowercase()).collect()),
        }
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.stop_words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stop_words.is_empty()
    }
}

impl Default for StopFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for StopFilter {
    fn filter<'a>(&'a self, tokens: TokenStream<'a>) -> Result<TokenStream<'a>> {
        Ok(Box::new(
            tokens.filter(move |token| !self.stop_words.contains(&token.text)),
        ))
    }

    fn name(&self) -> &'static str {
        "stop"
    }
}

/// Reduces tokens to their stems.
///
/// Stemming is best-effort: when the stemmer fails or produces an empty
/// stem, the unstemmed token is kept.
#[derive(Clone, Debug)]
pub struct StemFilter {
    stemmer: Arc<dyn Stemmer>,
    language: Language,
}

impl StemFilter {
    pub fn new(stemmer: Arc<dyn Stemmer>, language: Language) -> Self {
        StemFilter { stemmer, language }
    }

    /// Stem a single word, falling back to the word itself.
    pub fn stem_word(&self, word: &str) -> String {
        match self.stemmer.stem(word, self.language) {
            Ok(stem) if !stem.is_empty() => stem,
            Ok(_) => word.to_string(),
            Err(err) => {
                trace!(word, error = %err, "stemming failed, keeping unstemmed term");
                word.to_string()
            }
        }
    }
}

impl Filter for StemFilter {
    fn filter<'a>(&'a self, tokens: TokenStream<'a>) -> Result<TokenStream<'a>> {
        Ok(Box::new(tokens.map(move |mut token| {
            token.text = self.stem_word(&token.text);
            token
        })))
    }

    fn name(&self) -> &'static str {
        "stem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::stemmer::SnowballStemmer;
    use crate::analysis::token::Token;
    use crate::error::LexisError;

    fn stream(words: &[&str]) -> TokenStream<'static> {
        let tokens: Vec<Token> = words
            .iter()
            .enumerate()
            .map(|(i, w)| Token::new(*w, i as u32))
            .collect();
        Box::new(tokens.into_iter())
    }

    #[test]
    fn test_lowercase_filter() {
        let filter = LowercaseFilter::new();
        let result: Vec<_> = filter.filter(stream(&["Hello", "WORLD", "ÉTÉ"])).unwrap().collect();
        assert_eq!(result[0].text, "hello");
        assert_eq!(result[1].text, "world");
        assert_eq!(result[2].text, "été");
    }

    #[test]
    fn test_stop_filter_keeps_positions() {
        let filter = StopFilter::new();
        let result: Vec<_> = filter
            .filter(stream(&["the", "quick", "brown"]))
            .unwrap()
            .collect();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].text, "quick");
        assert_eq!(result[0].position, 1);
    }

    #[test]
    fn test_length_filter() {
        let filter = LengthFilter::new(2, 4);
        let result: Vec<_> = filter
            .filter(stream(&["a", "ab", "abcd", "abcde"]))
            .unwrap()
            .map(|t| t.text)
            .collect();
        assert_eq!(result, vec!["ab", "abcd"]);
    }

    #[derive(Debug)]
    struct FailingStemmer;

    impl Stemmer for FailingStemmer {
        fn stem(&self, _word: &str, _language: Language) -> Result<String> {
            Err(LexisError::analysis("stemmer unavailable"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_stem_filter_falls_back_on_failure() {
        let filter = StemFilter::new(Arc::new(FailingStemmer), Language::English);
        let result: Vec<_> = filter.filter(stream(&["running"])).unwrap().collect();
        assert_eq!(result[0].text, "running");
    }

    #[test]
    fn test_stem_filter() {
        let filter = StemFilter::new(Arc::new(SnowballStemmer), Language::English);
        let result: Vec<_> = filter
            .filter(stream(&["jumping", "foxes"]))
            .unwrap()
            .map(|t| t.text)
            .collect();
        assert_eq!(result, vec!["jump", "fox"]);
    }
}
