//! Code bundles: a C expression packaged with the statements it
//! depends on.
//!
//! Every typed expression lowers to one of these. The generator
//! combines bundles by concatenating prefixes; lifting a bundle into a
//! statement context means emitting its prefix and then using its
//! result expression wherever the ambient statement needs it.

use crate::c_ast::{CExpr, CStmt, CType};

/// The result of lowering one typed expression.
#[derive(Debug, Clone)]
pub enum Bundle {
    /// An expression with no prefix.
    Pure(CExpr),
    /// An expression that requires `stmts` to run first.
    Block { expr: CExpr, stmts: Vec<CStmt> },
    /// A statement sequence with no result (Unit-typed positions).
    Stmts(Vec<CStmt>),
    /// A binding: the result is the named local after `stmts` ran.
    Variable {
        name: String,
        ty: CType,
        stmts: Vec<CStmt>,
    },
    /// A `{func, env}` closure value.
    Closure { expr: CExpr, stmts: Vec<CStmt> },
    /// A non-capturing function; callable directly by name. The
    /// signature is kept so value uses can synthesize an adapter.
    SimpleFunc {
        name: String,
        params: Vec<CType>,
        ret: CType,
    },
    /// A recursive-group placeholder: the symbol's C name is fixed, but
    /// its function has not been emitted yet. Callable by name only.
    Rec { name: String },
}

impl Bundle {
    /// The prefix statements, discarding the result expression unless
    /// it has effects. Placeholder and function bundles contribute
    /// nothing in statement position.
    pub fn into_stmts(self) -> Vec<CStmt> {
        match self {
            Bundle::Pure(expr) => {
                if expr.has_effects() {
                    vec![CStmt::Expr(expr)]
                } else {
                    Vec::new()
                }
            }
            Bundle::Block { expr, mut stmts } => {
                if expr.has_effects() {
                    stmts.push(CStmt::Expr(expr));
                }
                stmts
            }
            Bundle::Stmts(stmts) => stmts,
            Bundle::Variable { stmts, .. } => stmts,
            Bundle::Closure { mut stmts, expr } => {
                if expr.has_effects() {
                    stmts.push(CStmt::Expr(expr));
                }
                stmts
            }
            Bundle::SimpleFunc { .. } | Bundle::Rec { .. } => Vec::new(),
        }
    }
}
