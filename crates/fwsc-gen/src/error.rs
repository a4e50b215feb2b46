//! Error types for C code generation.
//!
//! These should not fire on well-formed typer output; they exist so a
//! middle-end bug surfaces as a reported error instead of a panic.

use thiserror::Error;

/// Error type for the code generator.
#[derive(Debug, Clone, Error)]
pub enum CodeGenError {
    /// A binding was referenced before its code was generated.
    #[error("forward reference to `{0}` before its code has been generated")]
    ForwardReference(String),

    /// A recursive block binding whose lambda captures local state; its
    /// peers call it by name and cannot supply the environment.
    #[error("recursive binding `{0}` captures variables and can not be lowered")]
    RecursiveCapture(String),

    /// A typed-tree shape the generator does not lower.
    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),

    /// Internal error - indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for code generation operations.
pub type Result<T> = std::result::Result<T, CodeGenError>;
