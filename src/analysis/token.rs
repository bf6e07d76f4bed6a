//! Token representation.

/// A single term produced by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The normalized term text.
    pub text: String,

    /// Position of the token in the source text. Stop words removed from the
    /// stream still consume a position; alternative forms of one word share it.
    pub position: u32,

    /// Byte offset of the word start in the source text.
    pub start_offset: usize,

    /// Byte offset one past the word end in the source text.
    pub end_offset: usize,
}

impl Token {
    pub fn new(
        text: impl Into<String>,
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
}

/// A stream of tokens.
pub type TokenStream = Box<dyn Iterator<Item = Token> + Send>;
