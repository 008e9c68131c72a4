//! Token types flowing through the analysis pipeline.

use std::fmt;

/// Largest word position that fits the low 24 bits of a hit position.
pub const MAX_WORD_POSITION: u32 = (1 << 24) - 1;

/// A single unit of text after tokenization.
///
/// `position` counts every word the tokenizer produced, so filters that drop
/// tokens (stop words, length bounds) leave gaps rather than renumbering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// The text content of the token.
    pub text: String,

    /// Word position inside the field (0-based).
    pub position: u32,

    /// Byte offset where the token starts in the analysed text.
    pub start_offset: usize,

    /// Byte offset where the token ends in the analysed text.
    pub end_offset: usize,
}

impl Token {
    /// Create a token without offsets.
    pub fn new<S: Into<String>>(text: S, position: u32) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset: 0,
            end_offset: 0,
        }
    }

    /// Create a token with byte offsets.
    pub fn with_offsets<S: Into<String>>(
        text: S,
        position: u32,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
        }
    }

    /// Length of the token text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.text, self.position)
    }
}

/// A lazily evaluated stream of tokens borrowing the analysed text.
pub type TokenStream<'a> = Box<dyn Iterator<Item = Token> + 'a>;
