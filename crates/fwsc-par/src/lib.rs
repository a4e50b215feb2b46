//! fwsc-par - Syntax Analysis
//!
//! Builds the untyped AST from the token stream.
//!
//! ```text
//! Vec<Token>
//!      │
//!      ▼
//!  [Parser]  ──  recursive descent; Pratt core for expressions
//!      │
//!      ▼
//!  ast::Program  (spans on every node)
//! ```
//!
//! The surface language is small and statement-light: a program is a
//! sequence of class definitions and top-level `val`/`var` bindings;
//! blocks hold bindings, assignments and expressions with an optional
//! trailing result expression. `if`/`while`/lambdas are expressions.
//! Semicolons between items are optional; keywords and delimiters carry
//! the structure.
//!
//! The first syntax error aborts the phase and is reported with its
//! span.

pub mod ast;
mod error;
mod expr;
mod types;

pub use ast::*;
pub use error::{ParseError, Result};

use fwsc_lex::{Token, TokenKind};
use fwsc_util::{Span, Symbol};

/// Parse a complete token stream into a [`Program`].
///
/// # Examples
///
/// ```
/// use fwsc_util::FileId;
///
/// let tokens = fwsc_lex::tokenize("val x = 1", FileId::DUMMY).unwrap();
/// let program = fwsc_par::parse(tokens).unwrap();
/// assert_eq!(program.items.len(), 1);
/// ```
pub fn parse(tokens: Vec<Token>) -> Result<Program> {
    Parser::new(tokens).parse_program()
}

/// The recursive-descent parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a parser over a token stream ending in `Eof`.
    pub fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(
            tokens.last().map(|t| t.kind),
            Some(TokenKind::Eof)
        ));
        Self { tokens, pos: 0 }
    }

    // =====================================================================
    // Token stream primitives
    // =====================================================================

    fn peek(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn nth_kind(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn bump(&mut self) -> Token {
        let token = *self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            Span::DUMMY
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        if self.check(kind) {
            Ok(self.bump())
        } else {
            Err(self.error_expected(&kind.describe()))
        }
    }

    fn expect_ident(&mut self) -> Result<(Symbol, Span)> {
        match self.peek().kind {
            TokenKind::Ident(sym) => {
                let span = self.bump().span;
                Ok((sym, span))
            }
            _ => Err(self.error_expected("an identifier")),
        }
    }

    fn error_expected(&self, expected: &str) -> ParseError {
        let found = self.peek();
        ParseError::Expected {
            expected: expected.to_string(),
            found: found.kind.describe(),
            span: found.span,
        }
    }

    fn eat_separators(&mut self) {
        while self.eat(&TokenKind::Semi) {}
    }

    // =====================================================================
    // Items
    // =====================================================================

    /// program := (classDef | localDef)*
    pub fn parse_program(&mut self) -> Result<Program> {
        let mut items = Vec::new();
        self.eat_separators();
        while !self.check(&TokenKind::Eof) {
            if self.check(&TokenKind::Class) {
                items.push(Item::Class(self.parse_class()?));
            } else {
                items.push(Item::Def(self.parse_local_def()?));
            }
            self.eat_separators();
        }
        Ok(Program { items })
    }

    /// classDef := 'class' IDENT params? '{' memberDef* '}'
    fn parse_class(&mut self) -> Result<ClassDef> {
        let start = self.expect(&TokenKind::Class)?.span;
        let (name, name_span) = self.expect_ident()?;
        let params = if self.check(&TokenKind::LParen) {
            self.parse_params()?
        } else {
            Vec::new()
        };
        self.expect(&TokenKind::LBrace)?;
        let mut members = Vec::new();
        self.eat_separators();
        while !self.check(&TokenKind::RBrace) {
            members.push(self.parse_member()?);
            self.eat_separators();
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(ClassDef {
            name,
            name_span,
            params,
            members,
            span: start.merge(self.prev_span()),
        })
    }

    /// memberDef := ('val'|'var') IDENT (':' type)? '=' expr
    fn parse_member(&mut self) -> Result<MemberDef> {
        let mutable = match self.peek().kind {
            TokenKind::Val => false,
            TokenKind::Var => true,
            _ => return Err(self.error_expected("`val` or `var`")),
        };
        let start = self.bump().span;
        let (name, name_span) = self.expect_ident()?;
        let ascription = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::Assign)?;
        let body = self.parse_expr()?;
        let span = start.merge(body.span);
        Ok(MemberDef {
            mutable,
            name,
            name_span,
            ascription,
            body,
            span,
        })
    }

    /// localDef := binding | assignment | expression
    fn parse_local_def(&mut self) -> Result<LocalDef> {
        match self.peek().kind {
            TokenKind::Val | TokenKind::Var => {
                let mutable = self.peek().kind == TokenKind::Var;
                let start = self.bump().span;
                let (name, name_span) = self.expect_ident()?;
                let ascription = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                self.expect(&TokenKind::Assign)?;
                let body = self.parse_expr()?;
                let span = start.merge(body.span);
                Ok(LocalDef {
                    kind: LocalDefKind::Bind {
                        mutable,
                        name,
                        name_span,
                        ascription,
                        body,
                    },
                    span,
                })
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.check(&TokenKind::Assign) {
                    let eq_span = self.bump().span;
                    let value = self.parse_expr()?;
                    let span = expr.span.merge(value.span);
                    Ok(LocalDef {
                        kind: LocalDefKind::Assign {
                            target: expr,
                            eq_span,
                            value,
                        },
                        span,
                    })
                } else {
                    let span = expr.span;
                    Ok(LocalDef {
                        kind: LocalDefKind::Eval(expr),
                        span,
                    })
                }
            }
        }
    }

    /// block := '{' (localDef sep)* expr? '}'
    ///
    /// A trailing expression item becomes the block's result.
    pub(crate) fn parse_block_body(&mut self) -> Result<(Vec<LocalDef>, Option<Box<Expr>>)> {
        self.expect(&TokenKind::LBrace)?;
        let mut defs = Vec::new();
        self.eat_separators();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            defs.push(self.parse_local_def()?);
            self.eat_separators();
        }
        self.expect(&TokenKind::RBrace)?;
        let tail = match defs.last() {
            Some(LocalDef {
                kind: LocalDefKind::Eval(_),
                ..
            }) => match defs.pop() {
                Some(LocalDef {
                    kind: LocalDefKind::Eval(expr),
                    ..
                }) => Some(Box::new(expr)),
                _ => unreachable!(),
            },
            _ => None,
        };
        Ok((defs, tail))
    }

    /// params := '(' (IDENT ':' type),* ')'
    pub(crate) fn parse_params(&mut self) -> Result<Vec<Param>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (name, name_span) = self.expect_ident()?;
                if !self.eat(&TokenKind::Colon) {
                    return Err(ParseError::MissingParamType {
                        name: name.as_str().to_string(),
                        span: name_span,
                    });
                }
                let ty = self.parse_type()?;
                let span = name_span.merge(self.prev_span());
                params.push(Param { name, ty, span });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwsc_util::FileId;

    fn parse_ok(src: &str) -> Program {
        let tokens = fwsc_lex::tokenize(src, FileId::DUMMY).unwrap();
        parse(tokens).unwrap()
    }

    fn parse_err(src: &str) -> ParseError {
        let tokens = fwsc_lex::tokenize(src, FileId::DUMMY).unwrap();
        parse(tokens).unwrap_err()
    }

    #[test]
    fn test_empty_program() {
        assert!(parse_ok("").items.is_empty());
    }

    #[test]
    fn test_top_level_binding() {
        let program = parse_ok("val x = 1");
        assert_eq!(program.items.len(), 1);
        match &program.items[0] {
            Item::Def(def) => match &def.kind {
                LocalDefKind::Bind { mutable, name, .. } => {
                    assert!(!mutable);
                    assert_eq!(name.as_str(), "x");
                }
                other => panic!("expected binding, got {:?}", other),
            },
            other => panic!("expected def, got {:?}", other),
        }
    }

    #[test]
    fn test_var_binding_with_ascription() {
        let program = parse_ok("var total: Int = 0");
        match &program.items[0] {
            Item::Def(def) => match &def.kind {
                LocalDefKind::Bind {
                    mutable, ascription, ..
                } => {
                    assert!(mutable);
                    assert!(matches!(
                        ascription.as_ref().unwrap().kind,
                        TypeExprKind::Int
                    ));
                }
                other => panic!("expected binding, got {:?}", other),
            },
            other => panic!("expected def, got {:?}", other),
        }
    }

    #[test]
    fn test_class_with_members() {
        let program = parse_ok(
            "class Counter(start: Int) { var count = start; val step: Int = 1 }",
        );
        match &program.items[0] {
            Item::Class(class) => {
                assert_eq!(class.name.as_str(), "Counter");
                assert_eq!(class.params.len(), 1);
                assert_eq!(class.members.len(), 2);
                assert!(class.members[0].mutable);
                assert!(!class.members[1].mutable);
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_class_member_must_be_binding() {
        let err = parse_err("class C { 1 + 2 }");
        assert!(matches!(err, ParseError::Expected { .. }));
    }

    #[test]
    fn test_assignment_item() {
        let program = parse_ok("val x = 1; x = 2");
        assert_eq!(program.items.len(), 2);
        match &program.items[1] {
            Item::Def(def) => assert!(matches!(def.kind, LocalDefKind::Assign { .. })),
            other => panic!("expected def, got {:?}", other),
        }
    }

    #[test]
    fn test_block_trailing_expr() {
        let program = parse_ok("val x = { val y = 1; y + 1 }");
        match &program.items[0] {
            Item::Def(def) => match &def.kind {
                LocalDefKind::Bind { body, .. } => match &body.kind {
                    ExprKind::Block(defs, tail) => {
                        assert_eq!(defs.len(), 1);
                        assert!(tail.is_some());
                    }
                    other => panic!("expected block, got {:?}", other),
                },
                other => panic!("expected binding, got {:?}", other),
            },
            other => panic!("expected def, got {:?}", other),
        }
    }

    #[test]
    fn test_block_without_tail() {
        let program = parse_ok("val x = { val y = 1 }");
        match &program.items[0] {
            Item::Def(def) => match &def.kind {
                LocalDefKind::Bind { body, .. } => match &body.kind {
                    ExprKind::Block(defs, tail) => {
                        assert_eq!(defs.len(), 1);
                        assert!(tail.is_none());
                    }
                    other => panic!("expected block, got {:?}", other),
                },
                other => panic!("expected binding, got {:?}", other),
            },
            other => panic!("expected def, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_param_type() {
        let err = parse_err("val f = (x) => x");
        assert!(matches!(err, ParseError::MissingParamType { .. }));
    }

    #[test]
    fn test_assignment_eq_span_points_at_token() {
        let src = "val x = 1; x = 2";
        let program = parse_ok(src);
        match &program.items[1] {
            Item::Def(def) => match &def.kind {
                LocalDefKind::Assign { eq_span, .. } => {
                    assert_eq!(&src[eq_span.start..eq_span.end], "=");
                }
                other => panic!("expected assignment, got {:?}", other),
            },
            other => panic!("expected def, got {:?}", other),
        }
    }
}
