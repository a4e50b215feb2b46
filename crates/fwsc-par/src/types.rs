//! Parsing of written types.
//!
//! ```text
//! type := 'Int' | 'Float' | 'Boolean' | 'String' | 'Unit'
//!       | 'Array' '[' type ']'
//!       | IDENT                        -- a class name
//!       | type '=>' type               -- right associative
//!       | '(' type,* ')' '=>' type
//!       | '(' type ')'
//! ```

use fwsc_lex::TokenKind;

use crate::ast::{TypeExpr, TypeExprKind};
use crate::error::Result;
use crate::Parser;

impl Parser {
    /// Parse a type expression.
    pub(crate) fn parse_type(&mut self) -> Result<TypeExpr> {
        let atom = self.parse_type_atom()?;
        if self.eat(&TokenKind::FatArrow) {
            let ret = self.parse_type()?;
            let span = atom.span.merge(ret.span);
            return Ok(TypeExpr {
                kind: TypeExprKind::Fn(vec![atom], Box::new(ret)),
                span,
            });
        }
        Ok(atom)
    }

    fn parse_type_atom(&mut self) -> Result<TypeExpr> {
        match self.peek().kind {
            TokenKind::Ident(sym) => {
                let span = self.bump().span;
                let kind = match sym.as_str() {
                    "Int" => TypeExprKind::Int,
                    "Float" => TypeExprKind::Float,
                    "Boolean" => TypeExprKind::Boolean,
                    "String" => TypeExprKind::Str,
                    "Unit" => TypeExprKind::Unit,
                    "Array" => {
                        self.expect(&TokenKind::LBracket)?;
                        let elem = self.parse_type()?;
                        self.expect(&TokenKind::RBracket)?;
                        return Ok(TypeExpr {
                            kind: TypeExprKind::Array(Box::new(elem)),
                            span: span.merge(self.prev_span()),
                        });
                    }
                    _ => TypeExprKind::Named(sym),
                };
                Ok(TypeExpr { kind, span })
            }
            TokenKind::LParen => {
                let start = self.bump().span;
                if self.eat(&TokenKind::RParen) {
                    // '()' only occurs as an empty parameter list.
                    self.expect(&TokenKind::FatArrow)?;
                    let ret = self.parse_type()?;
                    let span = start.merge(ret.span);
                    return Ok(TypeExpr {
                        kind: TypeExprKind::Fn(Vec::new(), Box::new(ret)),
                        span,
                    });
                }
                let mut list = vec![self.parse_type()?];
                while self.eat(&TokenKind::Comma) {
                    list.push(self.parse_type()?);
                }
                self.expect(&TokenKind::RParen)?;
                if self.eat(&TokenKind::FatArrow) {
                    let ret = self.parse_type()?;
                    let span = start.merge(ret.span);
                    Ok(TypeExpr {
                        kind: TypeExprKind::Fn(list, Box::new(ret)),
                        span,
                    })
                } else if list.len() == 1 {
                    Ok(list.pop().expect("len checked"))
                } else {
                    Err(self.error_expected("`=>` after a parameter type list"))
                }
            }
            _ => Err(self.error_expected("a type")),
        }
    }
}
