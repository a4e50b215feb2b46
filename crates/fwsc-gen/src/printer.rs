//! Renders the C definition list to text.
//!
//! Output layout, in order: `#include` lines for the requested headers,
//! forward struct typedefs (so structs may point at each other
//! regardless of definition order), function-pointer typedefs, struct
//! bodies, prototypes for every function (mutual recursion links), then
//! the function bodies. Composite expressions are rendered fully
//! parenthesized; given the same definition list the output is
//! byte-identical.

use crate::c_ast::{CDef, CExpr, CStmt, CType};
use crate::codegen::CUnit;

/// Render a whole translation unit.
pub fn print_unit(unit: &CUnit) -> String {
    let mut out = String::new();

    if unit.includes.stdio {
        out.push_str("#include <stdio.h>\n");
    }
    if unit.includes.stdlib {
        out.push_str("#include <stdlib.h>\n");
    }
    if unit.includes.math {
        out.push_str("#include <math.h>\n");
    }
    if unit.includes.stdio || unit.includes.stdlib || unit.includes.math {
        out.push('\n');
    }

    for def in &unit.defs {
        if let CDef::Struct(s) = def {
            out.push_str(&format!("typedef struct {0} {0};\n", s.name));
        }
    }
    for def in &unit.defs {
        if let CDef::Alias(a) = def {
            let params = if a.params.is_empty() {
                "void".to_string()
            } else {
                a.params
                    .iter()
                    .map(render_type)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            out.push_str(&format!(
                "typedef {} (*{})({});\n",
                render_type(&a.ret),
                a.name,
                params
            ));
        }
    }
    out.push('\n');

    for def in &unit.defs {
        if let CDef::Struct(s) = def {
            out.push_str(&format!("struct {} {{\n", s.name));
            for (name, ty) in &s.fields {
                out.push_str(&format!("    {} {};\n", render_type(ty), name));
            }
            out.push_str("};\n\n");
        }
    }

    for def in &unit.defs {
        if let CDef::Func(f) = def {
            if f.name != "main" {
                out.push_str(&format!("{};\n", signature(f)));
            }
        }
    }
    out.push('\n');

    for def in &unit.defs {
        if let CDef::Func(f) = def {
            out.push_str(&format!("{} {{\n", signature(f)));
            for stmt in &f.body {
                render_stmt(stmt, 1, &mut out);
            }
            out.push_str("}\n\n");
        }
    }

    out
}

fn signature(f: &crate::c_ast::CFuncDef) -> String {
    let params = if f.params.is_empty() {
        "void".to_string()
    } else {
        f.params
            .iter()
            .map(|(name, ty)| format!("{} {}", render_type(ty), name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("{} {}({})", render_type(&f.ret), f.name, params)
}

fn render_type(ty: &CType) -> String {
    match ty {
        CType::Int => "int".to_string(),
        CType::Double => "double".to_string(),
        CType::Char => "char".to_string(),
        CType::Void => "void".to_string(),
        CType::Ptr(inner) => format!("{}*", render_type(inner)),
        CType::Struct(name) | CType::Alias(name) => name.clone(),
    }
}

fn render_stmt(stmt: &CStmt, level: usize, out: &mut String) {
    let pad = "    ".repeat(level);
    match stmt {
        CStmt::Return(None) => out.push_str(&format!("{}return;\n", pad)),
        CStmt::Return(Some(expr)) => {
            out.push_str(&format!("{}return {};\n", pad, render_expr(expr)))
        }
        CStmt::If {
            cond,
            then_body,
            else_body,
        } => {
            out.push_str(&format!("{}if ({}) {{\n", pad, render_expr(cond)));
            for s in then_body {
                render_stmt(s, level + 1, out);
            }
            if else_body.is_empty() {
                out.push_str(&format!("{}}}\n", pad));
            } else {
                out.push_str(&format!("{}}} else {{\n", pad));
                for s in else_body {
                    render_stmt(s, level + 1, out);
                }
                out.push_str(&format!("{}}}\n", pad));
            }
        }
        CStmt::While { cond, body } => {
            out.push_str(&format!("{}while ({}) {{\n", pad, render_expr(cond)));
            for s in body {
                render_stmt(s, level + 1, out);
            }
            out.push_str(&format!("{}}}\n", pad));
        }
        CStmt::Break => out.push_str(&format!("{}break;\n", pad)),
        CStmt::Continue => out.push_str(&format!("{}continue;\n", pad)),
        CStmt::VarDef { name, ty, init } => match init {
            Some(expr) => out.push_str(&format!(
                "{}{} {} = {};\n",
                pad,
                render_type(ty),
                name,
                render_expr(expr)
            )),
            None => out.push_str(&format!("{}{} {};\n", pad, render_type(ty), name)),
        },
        CStmt::Assign { target, value } => out.push_str(&format!(
            "{}{} = {};\n",
            pad,
            render_expr(target),
            render_expr(value)
        )),
        CStmt::Expr(expr) => out.push_str(&format!("{}{};\n", pad, render_expr(expr))),
    }
}

fn render_expr(expr: &CExpr) -> String {
    match expr {
        CExpr::IntLit(v) => format!("{}", v),
        CExpr::FloatLit(v) => format!("{:?}", v),
        CExpr::StrLit(s) => format!("\"{}\"", escape_c(s)),
        CExpr::Null => "NULL".to_string(),
        CExpr::Ident(name) => name.clone(),
        CExpr::Binary(op, lhs, rhs) => format!(
            "({} {} {})",
            render_expr(lhs),
            op.token(),
            render_expr(rhs)
        ),
        CExpr::Unary(op, inner) => format!("({}{})", op.token(), render_expr(inner)),
        CExpr::Field { obj, field, arrow } => format!(
            "{}{}{}",
            render_expr(obj),
            if *arrow { "->" } else { "." },
            field
        ),
        CExpr::Index(arr, idx) => format!("{}[{}]", render_expr(arr), render_expr(idx)),
        CExpr::Call { callee, args } => {
            let args = args.iter().map(render_expr).collect::<Vec<_>>().join(", ");
            format!("{}({})", render_expr(callee), args)
        }
        CExpr::Cast(ty, inner) => format!("(({})({}))", render_type(ty), render_expr(inner)),
        CExpr::SizeOf(ty) => format!("sizeof({})", render_type(ty)),
    }
}

fn escape_c(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::c_ast::{CBinOp, CFuncDef, CStructDef, CUnOp};
    use crate::stdlib::Includes;

    fn unit(defs: Vec<CDef>, includes: Includes) -> CUnit {
        CUnit { defs, includes }
    }

    #[test]
    fn test_includes() {
        let rendered = print_unit(&unit(
            vec![],
            Includes {
                stdio: true,
                stdlib: false,
                math: true,
            },
        ));
        assert!(rendered.contains("#include <stdio.h>"));
        assert!(rendered.contains("#include <math.h>"));
        assert!(!rendered.contains("stdlib.h"));
    }

    #[test]
    fn test_struct_forward_typedef_and_body() {
        let rendered = print_unit(&unit(
            vec![CDef::Struct(CStructDef {
                name: "closure".into(),
                fields: vec![
                    ("func".into(), CType::Void.ptr()),
                    ("env".into(), CType::Void.ptr()),
                ],
            })],
            Includes::default(),
        ));
        assert!(rendered.contains("typedef struct closure closure;"));
        assert!(rendered.contains("struct closure {\n    void* func;\n    void* env;\n};"));
    }

    #[test]
    fn test_function_prototype_and_body() {
        let rendered = print_unit(&unit(
            vec![CDef::Func(CFuncDef {
                name: "add1".into(),
                params: vec![("n".into(), CType::Int)],
                ret: CType::Int,
                body: vec![CStmt::Return(Some(CExpr::Binary(
                    CBinOp::Add,
                    Box::new(CExpr::ident("n")),
                    Box::new(CExpr::IntLit(1)),
                )))],
            })],
            Includes::default(),
        ));
        assert!(rendered.contains("int add1(int n);"));
        assert!(rendered.contains("int add1(int n) {\n    return (n + 1);\n}"));
    }

    #[test]
    fn test_main_has_no_prototype() {
        let rendered = print_unit(&unit(
            vec![CDef::Func(CFuncDef {
                name: "main".into(),
                params: vec![],
                ret: CType::Int,
                body: vec![CStmt::Return(Some(CExpr::IntLit(0)))],
            })],
            Includes::default(),
        ));
        assert!(!rendered.contains("int main(void);"));
        assert!(rendered.contains("int main(void) {"));
    }

    #[test]
    fn test_cast_call_shape() {
        // The closure call site: ((fnp__1)(cl->func))(cl->env, 3)
        let call = CExpr::call(
            CExpr::cast(
                CType::Alias("fnp__1".into()),
                CExpr::arrow(CExpr::ident("cl"), "func"),
            ),
            vec![CExpr::arrow(CExpr::ident("cl"), "env"), CExpr::IntLit(3)],
        );
        assert_eq!(
            render_expr(&call),
            "((fnp__1)(cl->func))(cl->env, 3)"
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(render_expr(&CExpr::StrLit("%d\n".into())), "\"%d\\n\"");
        assert_eq!(render_expr(&CExpr::StrLit("a\"b\\c".into())), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(render_expr(&CExpr::FloatLit(2.0)), "2.0");
        assert_eq!(render_expr(&CExpr::FloatLit(0.5)), "0.5");
    }

    #[test]
    fn test_unary_addr_of() {
        let expr = CExpr::Unary(CUnOp::AddrOf, Box::new(CExpr::ident("x")));
        assert_eq!(render_expr(&expr), "(&x)");
    }

    #[test]
    fn test_while_with_break() {
        let mut out = String::new();
        render_stmt(
            &CStmt::While {
                cond: CExpr::IntLit(1),
                body: vec![CStmt::Break],
            },
            0,
            &mut out,
        );
        assert_eq!(out, "while (1) {\n    break;\n}\n");
    }
}
