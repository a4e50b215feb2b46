//! Error and warning reporting infrastructure.
//!
//! Compiler phases surface failures as `Result` values carrying message
//! and span; the driver converts them into [`Diagnostic`]s and renders
//! them with [`Diagnostic::render`] as an annotated source line with a
//! caret and an optional hint:
//!
//! ```text
//! error: can not assign to immutable value `x`
//!   --> demo.scala:3:5
//!    |
//!  3 |     x = 2
//!    |       ^
//!    = help: declare the binding with `var` to allow reassignment
//! ```

use std::fmt;

use crate::{SourceMap, Span};

/// Diagnostic severity level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// An error that aborts compilation.
    Error,
    /// A warning that does not abort compilation.
    Warning,
    /// Additional information attached to another diagnostic.
    Note,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warning => write!(f, "warning"),
            Level::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with severity and location.
///
/// # Examples
///
/// ```
/// use fwsc_util::diagnostic::{Diagnostic, Level};
/// use fwsc_util::Span;
///
/// let diag = Diagnostic::error("unknown symbol `frobnicate`", Span::DUMMY);
/// assert_eq!(diag.level, Level::Error);
/// ```
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Severity.
    pub level: Level,
    /// Main message.
    pub message: String,
    /// Primary source location; the caret points here.
    pub span: Span,
    /// Secondary locations (e.g. the two sides of a type mismatch).
    pub sub_spans: Vec<Span>,
    /// Context notes.
    pub notes: Vec<String>,
    /// Fix suggestions.
    pub helps: Vec<String>,
}

impl Diagnostic {
    pub fn new(level: Level, message: impl Into<String>, span: Span) -> Self {
        Self {
            level,
            message: message.into(),
            span,
            sub_spans: Vec::new(),
            notes: Vec::new(),
            helps: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Error, message, span)
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Warning, message, span)
    }

    pub fn with_sub_spans(mut self, spans: Vec<Span>) -> Self {
        self.sub_spans = spans;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.helps.push(help.into());
        self
    }

    /// Render the diagnostic against a source map.
    ///
    /// Produces the annotated line with a caret under the span start and
    /// the note/help trailers. Spans with line 0 (dummy spans) render the
    /// header only.
    pub fn render(&self, map: &SourceMap) -> String {
        let mut out = format!("{}: {}", self.level, self.message);
        if self.span.line == 0 {
            return out;
        }
        let file = match map.file(self.span.file_id) {
            Some(f) => f,
            None => return out,
        };
        out.push_str(&format!(
            "\n  --> {}:{}:{}",
            file.name, self.span.line, self.span.column
        ));
        if let Some(text) = file.line_text(self.span.line) {
            let line_no = self.span.line.to_string();
            let gutter = " ".repeat(line_no.len());
            out.push_str(&format!("\n {} |", gutter));
            out.push_str(&format!("\n {} | {}", line_no, text));
            let col = (self.span.column as usize).saturating_sub(1);
            let width = self.span.len().max(1).min(text.len().saturating_sub(col).max(1));
            out.push_str(&format!(
                "\n {} | {}{}",
                gutter,
                " ".repeat(col),
                "^".repeat(width)
            ));
            for note in &self.notes {
                out.push_str(&format!("\n {} = note: {}", gutter, note));
            }
            for help in &self.helps {
                out.push_str(&format!("\n {} = help: {}", gutter, help));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceMap;

    #[test]
    fn test_level_display() {
        assert_eq!(format!("{}", Level::Error), "error");
        assert_eq!(format!("{}", Level::Warning), "warning");
        assert_eq!(format!("{}", Level::Note), "note");
    }

    #[test]
    fn test_diagnostic_error() {
        let diag = Diagnostic::error("boom", Span::DUMMY);
        assert_eq!(diag.level, Level::Error);
        assert_eq!(diag.message, "boom");
    }

    #[test]
    fn test_render_dummy_span_is_header_only() {
        let map = SourceMap::new();
        let diag = Diagnostic::error("boom", Span::DUMMY);
        assert_eq!(diag.render(&map), "error: boom");
    }

    #[test]
    fn test_render_caret_position() {
        let mut map = SourceMap::new();
        let id = map.add_file("demo.scala", "val x = 1\nx = 2\n");
        let span = Span::with_file(12, 13, id, 2, 3);
        let diag = Diagnostic::error("can not assign to immutable value `x`", span)
            .with_help("declare the binding with `var` to allow reassignment");
        let rendered = diag.render(&map);
        assert!(rendered.contains("--> demo.scala:2:3"));
        assert!(rendered.contains("2 | x = 2"));
        assert!(rendered.contains("|   ^"));
        assert!(rendered.contains("help: declare the binding"));
    }

    #[test]
    fn test_render_notes() {
        let mut map = SourceMap::new();
        let id = map.add_file("demo.scala", "if a then 1 else 2.0\n");
        let span = Span::with_file(0, 2, id, 1, 1);
        let diag = Diagnostic::error("branch mismatch", span)
            .with_note("then branch has type Int")
            .with_note("else branch has type Float");
        let rendered = diag.render(&map);
        assert!(rendered.contains("note: then branch has type Int"));
        assert!(rendered.contains("note: else branch has type Float"));
    }
}
