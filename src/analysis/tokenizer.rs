//! Tokenizers split text into word tokens.

use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::{MAX_WORD_POSITION, Token, TokenStream};
use crate::error::Result;

/// Trait for tokenizers that convert text into tokens.
pub trait Tokenizer: Send + Sync {
    /// Tokenize `text` lazily.
    fn tokenize<'a>(&self, text: &'a str) -> Result<TokenStream<'a>>;

    /// Get the name of this tokenizer (for debugging and configuration).
    fn name(&self) -> &'static str;
}

/// A tokenizer that splits text on Unicode word boundaries (UAX #29).
///
/// Punctuation and whitespace segments are skipped and do not consume a
/// position. Words past [`MAX_WORD_POSITION`] are not emitted.
#[derive(Clone, Debug, Default)]
pub struct UnicodeWordTokenizer;

impl UnicodeWordTokenizer {
    /// Create a new Unicode word tokenizer.
    pub fn new() -> Self {
        UnicodeWordTokenizer
    }
}

impl Tokenizer for UnicodeWordTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> Result<TokenStream<'a>> {
        let tokens = text
            .unicode_word_indices()
            .zip(0..=MAX_WORD_POSITION)
            .map(|((start, word), position)| {
                Token::with_offsets(word, position, start, start + word.len())
            });
        Ok(Box::new(tokens))
    }

    fn name(&self) -> &'static str {
        "unicode_word"
    }
}
