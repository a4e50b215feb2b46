//! Error types for parsing.

use fwsc_util::Span;
use thiserror::Error;

/// Error type for the parser. The first error aborts the phase.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// The token stream did not match the grammar.
    #[error("expected {expected}, found {found}")]
    Expected {
        expected: String,
        found: String,
        span: Span,
    },

    /// `if` is an expression; both branches are required.
    #[error("`if` expression requires an `else` branch")]
    MissingElse { span: Span },

    /// A lambda parameter without a type annotation.
    #[error("lambda parameter `{name}` needs a type annotation")]
    MissingParamType { name: String, span: Span },
}

impl ParseError {
    /// The source location of the error.
    pub fn span(&self) -> Span {
        match self {
            ParseError::Expected { span, .. }
            | ParseError::MissingElse { span }
            | ParseError::MissingParamType { span, .. } => *span,
        }
    }
}

/// Result type alias for parser operations.
pub type Result<T> = std::result::Result<T, ParseError>;
