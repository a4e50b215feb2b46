//! Expression parsing using Pratt parsing (top-down operator precedence).
//!
//! # Operator precedence (loosest to tightest)
//!
//! | Level | Operators                  | Associativity |
//! |-------|----------------------------|---------------|
//! | 1     | `\|\|`                     | Left          |
//! | 2     | `&&`                       | Left          |
//! | 3     | `==`, `!=`                 | Left          |
//! | 4     | `<`, `<=`, `>`, `>=`       | Left          |
//! | 5     | `+`, `-`                   | Left          |
//! | 6     | `*`, `/`, `%`              | Left          |
//! | 7     | `^`                        | Right         |
//! | 8     | unary `!`, `-`             | Prefix        |
//! | 9     | call `f(...)`, select `.m` | Postfix       |
//!
//! `if`/`while`/lambda forms sit above the operator grammar; they are
//! recognized at expression entry and may appear inside operands only
//! when parenthesized.

use fwsc_lex::TokenKind;
use fwsc_util::Span;

use crate::ast::{BinOp, Expr, ExprKind, UnOp};
use crate::error::{ParseError, Result};
use crate::Parser;

/// Binding power levels for Pratt parsing.
/// Higher numbers bind tighter.
mod bp {
    pub const MIN: u8 = 0;
    pub const LOGICAL_OR: u8 = 2;
    pub const LOGICAL_AND: u8 = 4;
    pub const EQUALITY: u8 = 6;
    pub const COMPARISON: u8 = 8;
    pub const ADDITIVE: u8 = 10;
    pub const MULTIPLICATIVE: u8 = 12;
    pub const POWER: u8 = 14;
}

/// Infix operator table: token → (op, left binding power, right-assoc).
fn infix(kind: &TokenKind) -> Option<(BinOp, u8, bool)> {
    let entry = match kind {
        TokenKind::OrOr => (BinOp::Or, bp::LOGICAL_OR, false),
        TokenKind::AndAnd => (BinOp::And, bp::LOGICAL_AND, false),
        TokenKind::EqEq => (BinOp::Eq, bp::EQUALITY, false),
        TokenKind::Ne => (BinOp::Ne, bp::EQUALITY, false),
        TokenKind::Lt => (BinOp::Lt, bp::COMPARISON, false),
        TokenKind::Le => (BinOp::Le, bp::COMPARISON, false),
        TokenKind::Gt => (BinOp::Gt, bp::COMPARISON, false),
        TokenKind::Ge => (BinOp::Ge, bp::COMPARISON, false),
        TokenKind::Plus => (BinOp::Add, bp::ADDITIVE, false),
        TokenKind::Minus => (BinOp::Sub, bp::ADDITIVE, false),
        TokenKind::Star => (BinOp::Mul, bp::MULTIPLICATIVE, false),
        TokenKind::Slash => (BinOp::Div, bp::MULTIPLICATIVE, false),
        TokenKind::Percent => (BinOp::Rem, bp::MULTIPLICATIVE, false),
        TokenKind::Caret => (BinOp::Pow, bp::POWER, true),
        _ => return None,
    };
    Some(entry)
}

impl Parser {
    /// Main expression entry point.
    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        match self.peek().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::LParen if self.is_lambda_start() => self.parse_lambda(),
            _ => self.parse_binary(bp::MIN),
        }
    }

    fn parse_binary(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, l_bp, right_assoc)) = infix(&self.peek().kind) {
            if l_bp < min_bp {
                break;
            }
            let op_span = self.bump().span;
            let next_min = if right_assoc { l_bp } else { l_bp + 1 };
            let rhs = self.parse_binary(next_min)?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary(op, op_span, Box::new(lhs), Box::new(rhs)),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let op_span = self.bump().span;
            let operand = self.parse_unary()?;
            let span = op_span.merge(operand.span);
            return Ok(Expr {
                kind: ExprKind::Unary(op, op_span, Box::new(operand)),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().kind {
                TokenKind::LParen => {
                    self.bump();
                    let args = self.parse_args()?;
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr {
                        kind: ExprKind::Apply(Box::new(expr), args),
                        span,
                    };
                }
                TokenKind::Dot => {
                    self.bump();
                    let (member, member_span) = self.expect_ident()?;
                    let span = expr.span.merge(member_span);
                    expr = Expr {
                        kind: ExprKind::Select(Box::new(expr), member, member_span),
                        span,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = *self.peek();
        match token.kind {
            TokenKind::Int(value) => {
                self.bump();
                Ok(self.expr(ExprKind::IntLit(value), token.span))
            }
            TokenKind::Float(value) => {
                self.bump();
                Ok(self.expr(ExprKind::FloatLit(value), token.span))
            }
            TokenKind::True => {
                self.bump();
                Ok(self.expr(ExprKind::BoolLit(true), token.span))
            }
            TokenKind::False => {
                self.bump();
                Ok(self.expr(ExprKind::BoolLit(false), token.span))
            }
            TokenKind::Str(value) => {
                self.bump();
                Ok(self.expr(ExprKind::StrLit(value), token.span))
            }
            TokenKind::Ident(name) => {
                self.bump();
                Ok(self.expr(ExprKind::Ident(name), token.span))
            }
            TokenKind::New => {
                let start = self.bump().span;
                let (class, class_span) = self.expect_ident()?;
                self.expect(&TokenKind::LParen)?;
                let args = self.parse_args()?;
                let span = start.merge(self.prev_span());
                Ok(self.expr(ExprKind::New(class, class_span, args), span))
            }
            TokenKind::LBracket => {
                let start = self.bump().span;
                let len = self.parse_expr()?;
                self.expect(&TokenKind::RBracket)?;
                let span = start.merge(self.prev_span());
                Ok(self.expr(ExprKind::ArrayAlloc(Box::new(len)), span))
            }
            TokenKind::LParen => {
                if self.is_lambda_start() {
                    return self.parse_lambda();
                }
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBrace => {
                let start = self.peek().span;
                let (defs, tail) = self.parse_block_body()?;
                let span = start.merge(self.prev_span());
                Ok(self.expr(ExprKind::Block(defs, tail), span))
            }
            _ => Err(self.error_expected("an expression")),
        }
    }

    /// if := 'if' expr 'then' expr 'else' expr
    fn parse_if(&mut self) -> Result<Expr> {
        let start = self.expect(&TokenKind::If)?.span;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::Then)?;
        let then_arm = self.parse_expr()?;
        if !self.eat(&TokenKind::Else) {
            return Err(ParseError::MissingElse { span: start });
        }
        let else_arm = self.parse_expr()?;
        let span = start.merge(else_arm.span);
        Ok(self.expr(
            ExprKind::If(Box::new(cond), Box::new(then_arm), Box::new(else_arm)),
            span,
        ))
    }

    /// while := 'while' expr 'do' expr
    fn parse_while(&mut self) -> Result<Expr> {
        let start = self.expect(&TokenKind::While)?.span;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::Do)?;
        let body = self.parse_expr()?;
        let span = start.merge(body.span);
        Ok(self.expr(ExprKind::While(Box::new(cond), Box::new(body)), span))
    }

    /// lambda := '(' params ')' (':' type)? '=>' expr
    fn parse_lambda(&mut self) -> Result<Expr> {
        let start = self.peek().span;
        let params = self.parse_params()?;
        let ret = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::FatArrow)?;
        let body = self.parse_expr()?;
        let span = start.merge(body.span);
        Ok(self.expr(ExprKind::Lambda(params, ret, Box::new(body)), span))
    }

    /// Decide whether a `(` starts a lambda parameter list.
    ///
    /// `()` followed by `=>` or `:`, `(ident :`, or `(ident) =>` (the
    /// last so an unannotated parameter gets the dedicated error
    /// instead of a generic parse failure): anything else is a
    /// parenthesized expression.
    fn is_lambda_start(&self) -> bool {
        if !self.check(&TokenKind::LParen) {
            return false;
        }
        match self.nth_kind(1) {
            TokenKind::RParen => {
                matches!(self.nth_kind(2), TokenKind::FatArrow | TokenKind::Colon)
            }
            TokenKind::Ident(_) => {
                matches!(self.nth_kind(2), TokenKind::Colon)
                    || (matches!(self.nth_kind(2), TokenKind::RParen)
                        && matches!(self.nth_kind(3), TokenKind::FatArrow))
            }
            _ => false,
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn expr(&self, kind: ExprKind, span: Span) -> Expr {
        Expr { kind, span }
    }
}
