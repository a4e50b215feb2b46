//! Error types for lexical analysis.

use fwsc_util::Span;
use thiserror::Error;

/// Error type for the lexer. The first error aborts the phase.
#[derive(Debug, Clone, Error)]
pub enum LexError {
    /// A character that cannot start any token.
    #[error("unexpected character `{ch}`")]
    UnexpectedChar { ch: char, span: Span },

    /// A string literal that runs to end of input.
    #[error("unterminated string literal")]
    UnterminatedString { span: Span },

    /// A numeric literal the lexer could not parse.
    #[error("malformed number literal `{text}`")]
    MalformedNumber { text: String, span: Span },

    /// An unknown escape sequence inside a string literal.
    #[error("unknown escape sequence `\\{ch}`")]
    UnknownEscape { ch: char, span: Span },
}

impl LexError {
    /// The source location of the error.
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::MalformedNumber { span, .. }
            | LexError::UnknownEscape { span, .. } => *span,
        }
    }
}

/// Result type alias for lexer operations.
pub type Result<T> = std::result::Result<T, LexError>;
