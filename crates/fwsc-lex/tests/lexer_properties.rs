//! Property tests for the lexer.

use fwsc_lex::{tokenize, TokenKind};
use fwsc_util::FileId;
use proptest::prelude::*;

proptest! {
    /// Any ASCII identifier that is not a keyword lexes to a single
    /// `Ident` token followed by `Eof`.
    #[test]
    fn ident_roundtrip(name in "[a-z_][a-zA-Z0-9_]{0,12}") {
        prop_assume!(fwsc_lex::keyword_from_ident(&name).is_none());
        let tokens = tokenize(&name, FileId::DUMMY).unwrap();
        prop_assert_eq!(tokens.len(), 2);
        match tokens[0].kind {
            TokenKind::Ident(sym) => prop_assert_eq!(sym.as_str(), name.as_str()),
            other => prop_assert!(false, "expected identifier, got {:?}", other),
        }
        prop_assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    /// Non-negative integer literals lex back to their value.
    #[test]
    fn int_roundtrip(value in 0i64..1_000_000_000) {
        let src = value.to_string();
        let tokens = tokenize(&src, FileId::DUMMY).unwrap();
        prop_assert_eq!(tokens[0].kind, TokenKind::Int(value));
    }

    /// Whitespace between tokens never changes the token sequence.
    #[test]
    fn whitespace_insensitive(pad in " {0,4}") {
        let sep = if pad.is_empty() { " " } else { pad.as_str() };
        let src = format!("val{}x{}={}1", sep, sep, sep);
        let kinds: Vec<_> = tokenize(&src, FileId::DUMMY)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        let baseline: Vec<_> = tokenize("val x = 1", FileId::DUMMY)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        prop_assert_eq!(kinds, baseline);
    }
}
