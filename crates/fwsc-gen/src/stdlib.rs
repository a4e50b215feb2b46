//! The emitted standard-library stub.
//!
//! Definitions here are loaded lazily: the closure struct when the
//! first closure is built, each I/O helper on its first use. Header
//! requirements ride along as [`Includes`] flags that the printer turns
//! into `#include` lines.

use fwsc_sem::Primitive;

use crate::c_ast::{CBinOp, CExpr, CFuncDef, CStmt, CStructDef, CType, CUnOp};

/// Which headers the generated unit needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Includes {
    pub stdio: bool,
    pub stdlib: bool,
    pub math: bool,
}

/// The runtime closure representation: a `{func, env}` pair.
pub const CLOSURE_STRUCT: &str = "closure";

pub fn closure_struct() -> CStructDef {
    CStructDef {
        name: CLOSURE_STRUCT.to_string(),
        fields: vec![
            ("func".to_string(), CType::Void.ptr()),
            ("env".to_string(), CType::Void.ptr()),
        ],
    }
}

/// The C name a primitive is emitted under.
pub fn prim_c_name(prim: Primitive) -> &'static str {
    // printf is libc's own; the rest are emitted helpers.
    prim.name()
}

/// The helper definition backing a primitive, if it needs one.
pub fn prim_func(prim: Primitive) -> Option<CFuncDef> {
    match prim {
        Primitive::ReadInt => Some(read_helper("readInt", CType::Int, "%d")),
        Primitive::ReadFloat => Some(read_helper("readFloat", CType::Double, "%lf")),
        Primitive::PrintlnInt => Some(println_helper("printlnInt", CType::Int, "%d\n")),
        Primitive::PrintlnFloat => Some(println_helper("printlnFloat", CType::Double, "%f\n")),
        Primitive::Printf => None,
    }
}

fn read_helper(name: &str, ty: CType, fmt: &str) -> CFuncDef {
    CFuncDef {
        name: name.to_string(),
        params: Vec::new(),
        ret: ty.clone(),
        body: vec![
            CStmt::VarDef {
                name: "x".to_string(),
                ty,
                init: None,
            },
            CStmt::Expr(CExpr::call(
                CExpr::ident("scanf"),
                vec![
                    CExpr::StrLit(fmt.to_string()),
                    CExpr::Unary(CUnOp::AddrOf, Box::new(CExpr::ident("x"))),
                ],
            )),
            CStmt::Return(Some(CExpr::ident("x"))),
        ],
    }
}

fn println_helper(name: &str, ty: CType, fmt: &str) -> CFuncDef {
    CFuncDef {
        name: name.to_string(),
        params: vec![("x".to_string(), ty)],
        ret: CType::Void,
        body: vec![CStmt::Expr(CExpr::call(
            CExpr::ident("printf"),
            vec![CExpr::StrLit(fmt.to_string()), CExpr::ident("x")],
        ))],
    }
}

/// The power operator has no C counterpart; it lowers to `pow`.
pub fn pow_call(lhs: CExpr, rhs: CExpr) -> CExpr {
    CExpr::call(CExpr::ident("pow"), vec![lhs, rhs])
}

/// Multiply-based array allocation size: `sizeof(T) * n`.
pub fn array_size(elem: CType, len: CExpr) -> CExpr {
    CExpr::Binary(
        CBinOp::Mul,
        Box::new(CExpr::SizeOf(elem)),
        Box::new(len),
    )
}
