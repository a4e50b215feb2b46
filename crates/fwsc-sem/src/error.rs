//! Error types for type checking.

use fwsc_util::Span;
use thiserror::Error;

/// A type error. One error aborts the whole pass; there is no recovery
/// or multi-error accumulation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TypeError {
    /// Human-readable description.
    pub message: String,
    /// Primary location (where the caret points).
    pub span: Span,
    /// Secondary locations, e.g. the two sides of a mismatch.
    pub sub_spans: Vec<Span>,
}

impl TypeError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            sub_spans: Vec::new(),
        }
    }

    pub fn with_sub_spans(mut self, sub_spans: Vec<Span>) -> Self {
        self.sub_spans = sub_spans;
        self
    }
}

/// Result type alias for typer and solver operations.
pub type Result<T> = std::result::Result<T, TypeError>;
