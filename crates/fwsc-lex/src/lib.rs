//! fwsc-lex - Lexical Analysis
//!
//! Transforms Featherweight Scala source text into a token stream.
//!
//! ```text
//! Source text
//!      │
//!      ▼
//!  [Cursor]  ──  position / line / column bookkeeping
//!      │
//!      ▼
//!  [Lexer]   ──  dispatch on first character
//!      │
//!      ▼
//!  Vec<Token>  (every token carries its Span)
//! ```
//!
//! The lexer is a hand-written dispatch-on-first-character scanner.
//! `//` line comments and all whitespace (including newlines) are
//! skipped; the parser relies on keywords and delimiters, not layout.
//! The first lexical error aborts the phase and is reported with its
//! span.

mod cursor;
mod error;
mod lexer;
mod token;

pub use cursor::Cursor;
pub use error::{LexError, Result};
pub use lexer::{tokenize, Lexer};
pub use token::{keyword_from_ident, Token, TokenKind};
