//! The code generator: typed tree → C definitions.
//!
//! One pass over the typed arena. Global state is the growing list of
//! emitted top-level definitions plus a stack of generation frames, one
//! per function being emitted, each carrying the current closure
//! environment (if any) and the way to reach `self` (if inside a
//! class).
//!
//! The interesting parts:
//!
//! - **Closure conversion** ([`CodeGen::lower_lambda`]): a lambda with
//!   captured names gets an environment struct, a lifted function whose
//!   first parameter is the environment pointer, and use-site code that
//!   mallocs and fills the environment and the `{func, env}` pair.
//! - **Recursive blocks**: `val f = (…) => …` bindings are pre-assigned
//!   a stable mangled name (a `Rec` placeholder), so peer lambdas can
//!   call each other by name before any of them has been emitted.
//! - **Classes** ([`CodeGen::lower_class`]): a struct with one field
//!   per member, methods lowered as closures whose environment carries
//!   `self`, and a `C_new` constructor that allocates and fills the
//!   instance.

use fwsc_par::{BinOp, UnOp};
use fwsc_sem::hir::{ClassId, DefId, DefKind, ExprId, ExprKind};
use fwsc_sem::{Dealias, Entry, Hir, Module, Primitive, SymbolId, Type};
use fwsc_util::{FxHashMap, FxHashSet, NameGen};

use crate::c_ast::{
    CBinOp, CDef, CExpr, CFuncDef, CStmt, CStructDef, CType, CTypeAlias, CUnOp,
};
use crate::bundle::Bundle;
use crate::error::{CodeGenError, Result};
use crate::stdlib::{self, Includes, CLOSURE_STRUCT};

/// The finished translation unit, ready for the printer.
#[derive(Debug)]
pub struct CUnit {
    pub defs: Vec<CDef>,
    pub includes: Includes,
}

/// Lower a checked module to C definitions.
pub fn lower(hir: &Hir, module: &Module, names: NameGen) -> Result<CUnit> {
    let mut cg = CodeGen::new(hir, names);

    for &cid in &module.class_order {
        cg.lower_class(cid)?;
    }

    // The top-level binding group becomes the body of C main; the entry
    // closure is invoked once at the end.
    let mut body = Vec::new();
    cg.frames.push(GenFrame::plain());
    cg.lower_def_list(&module.top_defs, &mut body)?;
    match module.entry {
        Entry::TopLevel(main_sym) => {
            let call = match cg.sym_code.get(&main_sym).cloned() {
                Some(SymCode::Func { name, .. }) => CExpr::call(CExpr::ident(name), vec![]),
                Some(SymCode::Local(name)) => cg.call_closure(
                    CExpr::ident(name),
                    &[],
                    &Type::Unit,
                    vec![],
                    &mut body,
                )?,
                _ => {
                    return Err(CodeGenError::Internal(
                        "entry binding has no generated code".into(),
                    ))
                }
            };
            body.push(CStmt::Expr(call));
        }
        Entry::MainClass(cid) => {
            let sname = cg.struct_name(cid);
            let ctor = format!("{}_new", hir.class(cid).name);
            let m = cg.names.fresh_c("m");
            body.push(CStmt::VarDef {
                name: m.clone(),
                ty: CType::Struct(sname).ptr(),
                init: Some(CExpr::call(CExpr::ident(ctor), vec![])),
            });
            let call = cg.call_closure(
                CExpr::arrow(CExpr::ident(m), "main"),
                &[],
                &Type::Unit,
                vec![],
                &mut body,
            )?;
            body.push(CStmt::Expr(call));
        }
    }
    cg.frames.pop();
    body.push(CStmt::Return(Some(CExpr::IntLit(0))));
    cg.defs.push(CDef::Func(CFuncDef {
        name: "main".to_string(),
        params: Vec::new(),
        ret: CType::Int,
        body,
    }));

    Ok(CUnit {
        defs: cg.defs,
        includes: cg.includes,
    })
}

/// How an identifier lowers.
#[derive(Debug, Clone)]
enum SymCode {
    /// A local C variable.
    Local(String),
    /// A function parameter.
    Param(String),
    /// A directly callable emitted function.
    Func {
        name: String,
        params: Vec<CType>,
        ret: CType,
    },
    /// A recursive-group placeholder: name fixed, code pending.
    Rec(String),
}

/// Closure environment of the function currently being emitted.
struct EnvCtx {
    /// Name of the environment parameter.
    param: String,
    /// Captured symbol → field name.
    fields: FxHashMap<SymbolId, String>,
}

/// One generation frame: pushed per emitted function.
struct GenFrame {
    env: Option<EnvCtx>,
    /// How to reach the current instance, when inside a class.
    self_expr: Option<CExpr>,
    self_class: Option<ClassId>,
}

impl GenFrame {
    fn plain() -> Self {
        GenFrame {
            env: None,
            self_expr: None,
            self_class: None,
        }
    }
}

pub struct CodeGen<'a> {
    hir: &'a Hir,
    names: NameGen,
    defs: Vec<CDef>,
    sym_code: FxHashMap<SymbolId, SymCode>,
    frames: Vec<GenFrame>,
    /// C function type → emitted typedef name, so every call site casts
    /// through the same alias.
    alias_cache: FxHashMap<(Vec<CType>, CType), String>,
    /// Plain function → value-adapter taking the unused env parameter.
    shim_cache: FxHashMap<String, String>,
    includes: Includes,
    closure_emitted: bool,
    prims_emitted: FxHashSet<&'static str>,
    /// Symbols whose `Rec` placeholder has been referenced.
    rec_used: FxHashSet<SymbolId>,
}

impl<'a> CodeGen<'a> {
    pub fn new(hir: &'a Hir, names: NameGen) -> Self {
        Self {
            hir,
            names,
            defs: Vec::new(),
            sym_code: FxHashMap::default(),
            frames: Vec::new(),
            alias_cache: FxHashMap::default(),
            shim_cache: FxHashMap::default(),
            includes: Includes::default(),
            closure_emitted: false,
            prims_emitted: FxHashSet::default(),
            rec_used: FxHashSet::default(),
        }
    }

    // =====================================================================
    // Types
    // =====================================================================

    fn c_type(&mut self, ty: &Type) -> Result<CType> {
        Ok(match ty {
            Type::Int => CType::Int,
            Type::Float => CType::Double,
            Type::Bool => CType::Int,
            Type::Str => CType::Char.ptr(),
            // Unit has no C value; a dummy int stands in where one is
            // syntactically required.
            Type::Unit => CType::Int,
            Type::Array(elem) => self.c_type(elem)?.ptr(),
            Type::Lambda(_, _) => {
                // Mentioning the type is enough to need the struct.
                self.require_closure();
                CType::Struct(CLOSURE_STRUCT.to_string()).ptr()
            }
            Type::Class(cid) | Type::ClassVar(cid) => {
                CType::Struct(self.struct_name(*cid)).ptr()
            }
            Type::Ref(inner) => self.c_type(inner)?,
            Type::Var(_) | Type::Named(_) => {
                return Err(CodeGenError::UnsupportedShape(format!(
                    "uninstantiated type `{}` reached code generation",
                    self.hir.display_type(ty)
                )))
            }
        })
    }

    fn c_ret_type(&mut self, ty: &Type) -> Result<CType> {
        match ty.value_ty() {
            Type::Unit => Ok(CType::Void),
            other => self.c_type(other),
        }
    }

    fn struct_name(&self, cid: ClassId) -> String {
        format!("{}_struct", self.hir.class(cid).name)
    }

    // =====================================================================
    // Runtime stubs
    // =====================================================================

    fn require_closure(&mut self) {
        if !self.closure_emitted {
            self.closure_emitted = true;
            self.defs.push(CDef::Struct(stdlib::closure_struct()));
        }
        self.includes.stdlib = true;
    }

    fn require_prim(&mut self, prim: Primitive) {
        self.includes.stdio = true;
        let name = stdlib::prim_c_name(prim);
        if self.prims_emitted.insert(name) {
            if let Some(def) = stdlib::prim_func(prim) {
                self.defs.push(CDef::Func(def));
            }
        }
    }

    fn malloc_struct(&mut self, name: &str) -> CExpr {
        self.includes.stdlib = true;
        let ty = CType::Struct(name.to_string());
        CExpr::cast(
            ty.clone().ptr(),
            CExpr::call(CExpr::ident("malloc"), vec![CExpr::SizeOf(ty)]),
        )
    }

    fn fn_alias(&mut self, params: Vec<CType>, ret: CType) -> String {
        let key = (params.clone(), ret.clone());
        if let Some(name) = self.alias_cache.get(&key) {
            return name.clone();
        }
        let name = self.names.fresh_c("fnp");
        self.defs.push(CDef::Alias(CTypeAlias {
            name: name.clone(),
            params,
            ret,
        }));
        self.alias_cache.insert(key, name.clone());
        name
    }

    /// Adapter for a non-capturing function used as a closure value:
    /// same signature plus the conventional leading env parameter.
    fn shim_for(&mut self, name: &str, params: &[CType], ret: &CType) -> String {
        if let Some(shim) = self.shim_cache.get(name) {
            return shim.clone();
        }
        let shim = self.names.fresh_c(&format!("{}_value", name));
        let mut fparams = vec![("env".to_string(), CType::Void.ptr())];
        let mut args = Vec::new();
        for (i, ty) in params.iter().enumerate() {
            let pname = format!("a{}", i);
            args.push(CExpr::ident(pname.clone()));
            fparams.push((pname, ty.clone()));
        }
        let call = CExpr::call(CExpr::ident(name), args);
        let body = if *ret == CType::Void {
            vec![CStmt::Expr(call)]
        } else {
            vec![CStmt::Return(Some(call))]
        };
        self.defs.push(CDef::Func(CFuncDef {
            name: shim.clone(),
            params: fparams,
            ret: ret.clone(),
            body,
        }));
        self.shim_cache.insert(name.to_string(), shim.clone());
        shim
    }

    // =====================================================================
    // Bundles
    // =====================================================================

    fn bundle_of(&self, stmts: Vec<CStmt>, expr: CExpr) -> Bundle {
        if stmts.is_empty() {
            Bundle::Pure(expr)
        } else {
            Bundle::Block { expr, stmts }
        }
    }

    /// Turn a bundle into prefix statements plus a value expression.
    ///
    /// Function bundles are wrapped into heap closures here; a `Rec`
    /// placeholder has no value yet and is a hard error.
    fn value_parts(&mut self, bundle: Bundle) -> Result<(Vec<CStmt>, CExpr)> {
        match bundle {
            Bundle::Pure(expr) => Ok((Vec::new(), expr)),
            Bundle::Block { expr, stmts } => Ok((stmts, expr)),
            Bundle::Stmts(stmts) => Ok((stmts, CExpr::IntLit(0))),
            Bundle::Variable { name, stmts, .. } => Ok((stmts, CExpr::Ident(name))),
            Bundle::Closure { expr, stmts } => Ok((stmts, expr)),
            Bundle::SimpleFunc { name, params, ret } => {
                let shim = self.shim_for(&name, &params, &ret);
                self.require_closure();
                let cl = self.names.fresh_c("cl");
                let stmts = vec![
                    CStmt::VarDef {
                        name: cl.clone(),
                        ty: CType::Struct(CLOSURE_STRUCT.to_string()).ptr(),
                        init: Some(self.malloc_struct(CLOSURE_STRUCT)),
                    },
                    CStmt::Assign {
                        target: CExpr::arrow(CExpr::ident(cl.clone()), "func"),
                        value: CExpr::cast(CType::Void.ptr(), CExpr::ident(shim)),
                    },
                    CStmt::Assign {
                        target: CExpr::arrow(CExpr::ident(cl.clone()), "env"),
                        value: CExpr::Null,
                    },
                ];
                Ok((stmts, CExpr::Ident(cl)))
            }
            Bundle::Rec { name } => Err(CodeGenError::ForwardReference(name)),
        }
    }

    // =====================================================================
    // Expressions
    // =====================================================================

    fn lower_expr(&mut self, id: ExprId) -> Result<Bundle> {
        let hir = self.hir;
        let node = &hir.exprs[id];
        match &node.kind {
            ExprKind::IntLit(v) => Ok(Bundle::Pure(CExpr::IntLit(*v))),
            ExprKind::FloatLit(v) => Ok(Bundle::Pure(CExpr::FloatLit(*v))),
            ExprKind::BoolLit(v) => Ok(Bundle::Pure(CExpr::IntLit(i64::from(*v)))),
            ExprKind::StrLit(s) => Ok(Bundle::Pure(CExpr::StrLit(s.as_str().to_string()))),

            ExprKind::Var(sym) => self.lower_var(*sym),

            ExprKind::Select { recv, member } => {
                let bundle = self.lower_expr(*recv)?;
                let (stmts, recv_expr) = self.value_parts(bundle)?;
                Ok(self.bundle_of(stmts, CExpr::arrow(recv_expr, member.as_str())))
            }

            ExprKind::Index { arr, index } => {
                let (mut stmts, arr_expr) = {
                    let b = self.lower_expr(*arr)?;
                    self.value_parts(b)?
                };
                let (istmts, idx_expr) = {
                    let b = self.lower_expr(*index)?;
                    self.value_parts(b)?
                };
                stmts.extend(istmts);
                Ok(self.bundle_of(
                    stmts,
                    CExpr::Index(Box::new(arr_expr), Box::new(idx_expr)),
                ))
            }

            ExprKind::Call { .. } => self.lower_call(id),
            ExprKind::Binary { .. } => self.lower_binary(id),

            ExprKind::Unary { op, operand } => {
                let b = self.lower_expr(*operand)?;
                let (stmts, e) = self.value_parts(b)?;
                let cop = match op {
                    UnOp::Neg => CUnOp::Neg,
                    UnOp::Not => CUnOp::Not,
                };
                Ok(self.bundle_of(stmts, CExpr::Unary(cop, Box::new(e))))
            }

            ExprKind::If { .. } => self.lower_if(id),
            ExprKind::While { .. } => self.lower_while(id),

            ExprKind::Block { defs, tail } => {
                let defs = defs.clone();
                let tail = *tail;
                let is_unit = matches!(node.ty.value_ty(), Type::Unit);
                let mut stmts = Vec::new();
                self.lower_def_list(&defs, &mut stmts)?;
                match tail {
                    Some(t) if !is_unit => {
                        let b = self.lower_expr(t)?;
                        let (ts, te) = self.value_parts(b)?;
                        stmts.extend(ts);
                        Ok(Bundle::Block { expr: te, stmts })
                    }
                    Some(t) => {
                        let b = self.lower_expr(t)?;
                        stmts.extend(b.into_stmts());
                        Ok(Bundle::Stmts(stmts))
                    }
                    None => Ok(Bundle::Stmts(stmts)),
                }
            }

            ExprKind::Lambda { .. } => self.lower_lambda(id, None, None),

            ExprKind::New { class, args } => {
                let ctor = format!("{}_new", hir.class(*class).name);
                let mut stmts = Vec::new();
                let mut arg_exprs = Vec::new();
                for &arg in args {
                    let b = self.lower_expr(arg)?;
                    let (s, e) = self.value_parts(b)?;
                    stmts.extend(s);
                    arg_exprs.push(e);
                }
                Ok(self.bundle_of(stmts, CExpr::call(CExpr::ident(ctor), arg_exprs)))
            }

            ExprKind::ArrayAlloc { len } => {
                let elem_cty = match node.ty.value_ty() {
                    Type::Array(elem) => self.c_type(elem)?,
                    other => {
                        return Err(CodeGenError::Internal(format!(
                            "array allocation typed as `{}`",
                            hir.display_type(other)
                        )))
                    }
                };
                let b = self.lower_expr(*len)?;
                let (stmts, len_expr) = self.value_parts(b)?;
                self.includes.stdlib = true;
                let alloc = CExpr::cast(
                    elem_cty.clone().ptr(),
                    CExpr::call(
                        CExpr::ident("malloc"),
                        vec![stdlib::array_size(elem_cty, len_expr)],
                    ),
                );
                Ok(self.bundle_of(stmts, alloc))
            }
        }
    }

    fn lower_var(&mut self, sym: SymbolId) -> Result<Bundle> {
        // Captured names come first: inside a closure body the original
        // binding is out of C scope and must be read through the env.
        if let Some(frame) = self.frames.last() {
            if let Some(env) = &frame.env {
                if let Some(field) = env.fields.get(&sym) {
                    return Ok(Bundle::Pure(CExpr::arrow(
                        CExpr::ident(env.param.clone()),
                        field.clone(),
                    )));
                }
            }
        }
        let info = self.hir.symbols.info(sym);
        match &info.dealias {
            Dealias::Member { .. } => {
                let self_expr = self
                    .frames
                    .last()
                    .and_then(|f| f.self_expr.clone())
                    .ok_or_else(|| {
                        CodeGenError::Internal("member access without an instance".into())
                    })?;
                Ok(Bundle::Pure(CExpr::Field {
                    obj: Box::new(self_expr),
                    field: info.name.as_str().to_string(),
                    arrow: true,
                }))
            }
            Dealias::Primitive(_) => Err(CodeGenError::UnsupportedShape(format!(
                "primitive `{}` used as a value",
                info.name
            ))),
            Dealias::Class(_) => Err(CodeGenError::UnsupportedShape(format!(
                "class `{}` used as a value",
                info.name
            ))),
            _ => match self.sym_code.get(&sym).cloned() {
                Some(SymCode::Local(name)) | Some(SymCode::Param(name)) => {
                    Ok(Bundle::Pure(CExpr::Ident(name)))
                }
                Some(SymCode::Func { name, params, ret }) => {
                    Ok(Bundle::SimpleFunc { name, params, ret })
                }
                Some(SymCode::Rec(name)) => {
                    self.rec_used.insert(sym);
                    Ok(Bundle::Rec { name })
                }
                None => Err(CodeGenError::ForwardReference(
                    info.name.as_str().to_string(),
                )),
            },
        }
    }

    fn lower_call(&mut self, id: ExprId) -> Result<Bundle> {
        let hir = self.hir;
        let (callee, args) = match &hir.exprs[id].kind {
            ExprKind::Call { callee, args } => (*callee, args.clone()),
            _ => return Err(CodeGenError::Internal("lower_call on non-call".into())),
        };
        let is_unit = matches!(hir.exprs[id].ty.value_ty(), Type::Unit);

        // Primitive callees lower to direct libc / helper calls.
        if let ExprKind::Var(sym) = hir.exprs[callee].kind {
            if let Dealias::Primitive(prim) = hir.symbols.info(sym).dealias {
                return self.lower_prim_call(prim, &args, is_unit);
            }
        }

        let callee_bundle = self.lower_expr(callee)?;
        let mut stmts;
        let call = match callee_bundle {
            // A known function: call it by name, no environment.
            Bundle::SimpleFunc { name, .. } | Bundle::Rec { name } => {
                stmts = Vec::new();
                let mut arg_exprs = Vec::new();
                for &arg in &args {
                    let b = self.lower_expr(arg)?;
                    let (s, e) = self.value_parts(b)?;
                    stmts.extend(s);
                    arg_exprs.push(e);
                }
                CExpr::call(CExpr::ident(name), arg_exprs)
            }
            // Anything else is a closure value: unpack, cast, call. The
            // closure is bound to its temporary before the arguments
            // run, preserving left-to-right evaluation.
            other => {
                let (s, closure_expr) = self.value_parts(other)?;
                stmts = s;
                let (param_tys, ret_ty) = match hir.exprs[callee].ty.value_ty() {
                    Type::Lambda(params, ret) => (params.clone(), (**ret).clone()),
                    other => {
                        return Err(CodeGenError::Internal(format!(
                            "call through non-lambda type `{}`",
                            hir.display_type(other)
                        )))
                    }
                };
                let tmp = self.bind_closure_tmp(closure_expr, &mut stmts);
                let mut arg_exprs = Vec::new();
                for &arg in &args {
                    let b = self.lower_expr(arg)?;
                    let (s, e) = self.value_parts(b)?;
                    stmts.extend(s);
                    arg_exprs.push(e);
                }
                self.closure_call_expr(&tmp, &param_tys, &ret_ty, arg_exprs)?
            }
        };

        if is_unit {
            stmts.push(CStmt::Expr(call));
            Ok(Bundle::Stmts(stmts))
        } else {
            Ok(self.bundle_of(stmts, call))
        }
    }

    /// Bind a closure value to a fresh temporary so its `func` and
    /// `env` slots can be read twice.
    fn bind_closure_tmp(&mut self, closure_expr: CExpr, stmts: &mut Vec<CStmt>) -> String {
        let tmp = self.names.fresh_c("cl");
        stmts.push(CStmt::VarDef {
            name: tmp.clone(),
            ty: CType::Struct(CLOSURE_STRUCT.to_string()).ptr(),
            init: Some(closure_expr),
        });
        tmp
    }

    /// Emit `((alias)(tmp->func))(tmp->env, args…)`.
    fn closure_call_expr(
        &mut self,
        tmp: &str,
        param_tys: &[Type],
        ret_ty: &Type,
        args: Vec<CExpr>,
    ) -> Result<CExpr> {
        self.require_closure();
        let mut cparams = vec![CType::Void.ptr()];
        for ty in param_tys {
            cparams.push(self.c_type(ty.value_ty())?);
        }
        let cret = self.c_ret_type(ret_ty)?;
        let alias = self.fn_alias(cparams, cret);
        let func = CExpr::cast(
            CType::Alias(alias),
            CExpr::arrow(CExpr::ident(tmp.to_string()), "func"),
        );
        let mut call_args = vec![CExpr::arrow(CExpr::ident(tmp.to_string()), "env")];
        call_args.extend(args);
        Ok(CExpr::call(func, call_args))
    }

    /// Full closure invocation for a known closure expression.
    fn call_closure(
        &mut self,
        closure_expr: CExpr,
        param_tys: &[Type],
        ret_ty: &Type,
        args: Vec<CExpr>,
        stmts: &mut Vec<CStmt>,
    ) -> Result<CExpr> {
        let tmp = self.bind_closure_tmp(closure_expr, stmts);
        self.closure_call_expr(&tmp, param_tys, ret_ty, args)
    }

    fn lower_prim_call(
        &mut self,
        prim: Primitive,
        args: &[ExprId],
        is_unit: bool,
    ) -> Result<Bundle> {
        let mut stmts = Vec::new();
        let mut arg_exprs = Vec::new();
        for &arg in args {
            let b = self.lower_expr(arg)?;
            let (s, e) = self.value_parts(b)?;
            stmts.extend(s);
            arg_exprs.push(e);
        }
        self.require_prim(prim);
        let call = CExpr::call(CExpr::ident(stdlib::prim_c_name(prim)), arg_exprs);
        if is_unit {
            stmts.push(CStmt::Expr(call));
            Ok(Bundle::Stmts(stmts))
        } else {
            Ok(self.bundle_of(stmts, call))
        }
    }

    fn lower_binary(&mut self, id: ExprId) -> Result<Bundle> {
        let hir = self.hir;
        let (op, lhs, rhs) = match &hir.exprs[id].kind {
            ExprKind::Binary { op, lhs, rhs } => (*op, *lhs, *rhs),
            _ => return Err(CodeGenError::Internal("lower_binary on non-binary".into())),
        };
        let is_int = matches!(hir.exprs[id].ty.value_ty(), Type::Int);

        let lb = self.lower_expr(lhs)?;
        let (mut stmts, le) = self.value_parts(lb)?;
        let rb = self.lower_expr(rhs)?;
        let (rs, re) = self.value_parts(rb)?;

        // Short-circuit operators whose right side needs statements
        // cannot stay a C `&&`/`||`; lower through a temporary.
        if matches!(op, BinOp::And | BinOp::Or) && !rs.is_empty() {
            let t = self.names.fresh_c("t");
            stmts.push(CStmt::VarDef {
                name: t.clone(),
                ty: CType::Int,
                init: None,
            });
            stmts.push(CStmt::Assign {
                target: CExpr::ident(t.clone()),
                value: le,
            });
            let cond = match op {
                BinOp::And => CExpr::ident(t.clone()),
                _ => CExpr::Unary(CUnOp::Not, Box::new(CExpr::ident(t.clone()))),
            };
            let mut then_body = rs;
            then_body.push(CStmt::Assign {
                target: CExpr::ident(t.clone()),
                value: re,
            });
            stmts.push(CStmt::If {
                cond,
                then_body,
                else_body: Vec::new(),
            });
            return Ok(Bundle::Block {
                expr: CExpr::Ident(t),
                stmts,
            });
        }
        stmts.extend(rs);

        if op == BinOp::Pow {
            self.includes.math = true;
            let call = stdlib::pow_call(le, re);
            let expr = if is_int {
                CExpr::cast(CType::Int, call)
            } else {
                call
            };
            return Ok(self.bundle_of(stmts, expr));
        }

        let cop = match op {
            BinOp::Add => CBinOp::Add,
            BinOp::Sub => CBinOp::Sub,
            BinOp::Mul => CBinOp::Mul,
            BinOp::Div => CBinOp::Div,
            BinOp::Rem => CBinOp::Rem,
            BinOp::Lt => CBinOp::Lt,
            BinOp::Le => CBinOp::Le,
            BinOp::Gt => CBinOp::Gt,
            BinOp::Ge => CBinOp::Ge,
            BinOp::Eq => CBinOp::Eq,
            BinOp::Ne => CBinOp::Ne,
            BinOp::And => CBinOp::And,
            BinOp::Or => CBinOp::Or,
            BinOp::Pow => unreachable!("handled above"),
        };
        Ok(self.bundle_of(stmts, CExpr::Binary(cop, Box::new(le), Box::new(re))))
    }

    fn lower_if(&mut self, id: ExprId) -> Result<Bundle> {
        let hir = self.hir;
        let (cond, then_arm, else_arm) = match &hir.exprs[id].kind {
            ExprKind::If {
                cond,
                then_arm,
                else_arm,
            } => (*cond, *then_arm, *else_arm),
            _ => return Err(CodeGenError::Internal("lower_if on non-if".into())),
        };
        let node_ty = hir.exprs[id].ty.value_ty().clone();

        let cb = self.lower_expr(cond)?;
        let (mut stmts, ce) = self.value_parts(cb)?;
        let then_bundle = self.lower_expr(then_arm)?;
        let else_bundle = self.lower_expr(else_arm)?;

        if matches!(node_ty, Type::Unit) {
            stmts.push(CStmt::If {
                cond: ce,
                then_body: then_bundle.into_stmts(),
                else_body: else_bundle.into_stmts(),
            });
            return Ok(Bundle::Stmts(stmts));
        }

        // The branches assign into a fresh local of the result type.
        let t = self.names.fresh_c("t");
        let cty = self.c_type(&node_ty)?;
        let (mut then_body, te) = self.value_parts(then_bundle)?;
        then_body.push(CStmt::Assign {
            target: CExpr::ident(t.clone()),
            value: te,
        });
        let (mut else_body, ee) = self.value_parts(else_bundle)?;
        else_body.push(CStmt::Assign {
            target: CExpr::ident(t.clone()),
            value: ee,
        });
        stmts.push(CStmt::VarDef {
            name: t.clone(),
            ty: cty,
            init: None,
        });
        stmts.push(CStmt::If {
            cond: ce,
            then_body,
            else_body,
        });
        Ok(Bundle::Block {
            expr: CExpr::Ident(t),
            stmts,
        })
    }

    fn lower_while(&mut self, id: ExprId) -> Result<Bundle> {
        let (cond, body) = match &self.hir.exprs[id].kind {
            ExprKind::While { cond, body } => (*cond, *body),
            _ => return Err(CodeGenError::Internal("lower_while on non-while".into())),
        };

        let cb = self.lower_expr(cond)?;
        let (cstmts, ce) = self.value_parts(cb)?;
        let body_stmts = self.lower_expr(body)?.into_stmts();

        // A condition with its own prefix must re-run it every
        // iteration: loop forever, re-evaluate, break when false.
        let stmt = if cstmts.is_empty() {
            CStmt::While {
                cond: ce,
                body: body_stmts,
            }
        } else {
            let mut loop_body = cstmts;
            loop_body.push(CStmt::If {
                cond: CExpr::Unary(CUnOp::Not, Box::new(ce)),
                then_body: vec![CStmt::Break],
                else_body: Vec::new(),
            });
            loop_body.extend(body_stmts);
            CStmt::While {
                cond: CExpr::IntLit(1),
                body: loop_body,
            }
        };
        Ok(Bundle::Stmts(vec![stmt]))
    }

    // =====================================================================
    // Definitions
    // =====================================================================

    /// Lower a block's (or the top level's) definitions into `out`.
    ///
    /// `val f = (…) => …` bindings are pre-assigned `Rec` placeholders
    /// with their final mangled name, so peer lambdas resolve each
    /// other by name before any function has been emitted.
    fn lower_def_list(&mut self, def_ids: &[DefId], out: &mut Vec<CStmt>) -> Result<()> {
        let hir = self.hir;

        for &d in def_ids {
            if let DefKind::Bind { sym, body, .. } = &hir.defs[d].kind {
                if matches!(hir.exprs[*body].kind, ExprKind::Lambda { .. }) {
                    let name = self.names.fresh_c(hir.symbols.info(*sym).name.as_str());
                    self.sym_code.insert(*sym, SymCode::Rec(name));
                }
            }
        }

        for &d in def_ids {
            match &hir.defs[d].kind {
                DefKind::Bind { sym, body, .. } => {
                    let sym = *sym;
                    let body = *body;
                    if matches!(hir.exprs[body].kind, ExprKind::Lambda { .. }) {
                        let forced = match self.sym_code.get(&sym) {
                            Some(SymCode::Rec(name)) => name.clone(),
                            _ => {
                                return Err(CodeGenError::Internal(
                                    "lambda binding lost its placeholder".into(),
                                ))
                            }
                        };
                        let bundle = self.lower_lambda(body, Some(forced), None)?;
                        match bundle {
                            Bundle::SimpleFunc { name, params, ret } => {
                                self.sym_code
                                    .insert(sym, SymCode::Func { name, params, ret });
                            }
                            Bundle::Closure { expr, stmts } => {
                                if self.rec_used.contains(&sym) {
                                    return Err(CodeGenError::RecursiveCapture(
                                        hir.symbols.info(sym).name.as_str().to_string(),
                                    ));
                                }
                                let local =
                                    self.names.fresh_c(hir.symbols.info(sym).name.as_str());
                                out.push(CStmt::VarDef {
                                    name: local.clone(),
                                    ty: CType::Struct(CLOSURE_STRUCT.to_string()).ptr(),
                                    init: None,
                                });
                                out.extend(stmts);
                                out.push(CStmt::Assign {
                                    target: CExpr::ident(local.clone()),
                                    value: expr,
                                });
                                self.sym_code.insert(sym, SymCode::Local(local));
                            }
                            _ => {
                                return Err(CodeGenError::Internal(
                                    "lambda lowered to a non-function bundle".into(),
                                ))
                            }
                        }
                    } else {
                        // Non-lambda binding: declaration first, then the
                        // prefix, then the assignment.
                        let bundle = self.lower_expr(body)?;
                        let cty = self.c_type(hir.exprs[body].ty.value_ty())?;
                        let local = self.names.fresh_c(hir.symbols.info(sym).name.as_str());
                        let (bstmts, bexpr) = self.value_parts(bundle)?;
                        let mut stmts = vec![CStmt::VarDef {
                            name: local.clone(),
                            ty: cty.clone(),
                            init: None,
                        }];
                        stmts.extend(bstmts);
                        stmts.push(CStmt::Assign {
                            target: CExpr::ident(local.clone()),
                            value: bexpr,
                        });
                        let var_bundle = Bundle::Variable {
                            name: local.clone(),
                            ty: cty,
                            stmts,
                        };
                        out.extend(var_bundle.into_stmts());
                        self.sym_code.insert(sym, SymCode::Local(local));
                    }
                }
                DefKind::Assign { target, value } => {
                    let tb = self.lower_expr(*target)?;
                    let (tstmts, texpr) = self.value_parts(tb)?;
                    let vb = self.lower_expr(*value)?;
                    let (vstmts, vexpr) = self.value_parts(vb)?;
                    out.extend(tstmts);
                    out.extend(vstmts);
                    out.push(CStmt::Assign {
                        target: texpr,
                        value: vexpr,
                    });
                }
                DefKind::Eval(expr) => {
                    let bundle = self.lower_expr(*expr)?;
                    out.extend(bundle.into_stmts());
                }
            }
        }
        Ok(())
    }

    // =====================================================================
    // Lambdas (closure conversion)
    // =====================================================================

    fn lower_lambda(
        &mut self,
        id: ExprId,
        forced_name: Option<String>,
        method_of: Option<ClassId>,
    ) -> Result<Bundle> {
        let hir = self.hir;
        let (params, body, free) = match &hir.exprs[id].kind {
            ExprKind::Lambda { params, body, free } => (params.clone(), *body, free.clone()),
            _ => return Err(CodeGenError::Internal("lower_lambda on non-lambda".into())),
        };
        let (param_tys, ret_ty) = match hir.exprs[id].ty.value_ty() {
            Type::Lambda(params, ret) => (params.clone(), (**ret).clone()),
            other => {
                return Err(CodeGenError::Internal(format!(
                    "lambda typed as `{}`",
                    hir.display_type(other)
                )))
            }
        };

        // Filter the typer's free names down to genuine captures:
        // members ride on `self`, primitives and classes are global,
        // and names bound to emitted (or pending) functions are called
        // directly by name.
        let mut captured: Vec<SymbolId> = Vec::new();
        let mut needs_self = method_of.is_some();
        for &f in &free {
            match &hir.symbols.info(f).dealias {
                Dealias::Member { .. } => needs_self = true,
                Dealias::Primitive(_) | Dealias::Class(_) => {}
                _ => match self.sym_code.get(&f) {
                    Some(SymCode::Func { .. }) | Some(SymCode::Rec(_)) => {}
                    _ => captured.push(f),
                },
            }
        }

        let ret_cty = self.c_ret_type(&ret_ty)?;
        let mut param_ctys = Vec::new();
        for ty in &param_tys {
            param_ctys.push(self.c_type(ty.value_ty())?);
        }
        let fname = match forced_name {
            Some(name) => name,
            None => self.names.fresh_c("fn"),
        };

        if captured.is_empty() && !needs_self {
            // Plain function, directly callable.
            self.frames.push(GenFrame::plain());
            let mut fparams = Vec::new();
            for (&psym, pcty) in params.iter().zip(param_ctys.iter()) {
                let pname = self.names.fresh_c(hir.symbols.info(psym).name.as_str());
                self.sym_code.insert(psym, SymCode::Param(pname.clone()));
                fparams.push((pname, pcty.clone()));
            }
            let body_bundle = self.lower_expr(body);
            self.frames.pop();
            let fbody = self.function_body(body_bundle?, &ret_cty)?;
            self.defs.push(CDef::Func(CFuncDef {
                name: fname.clone(),
                params: fparams,
                ret: ret_cty.clone(),
                body: fbody,
            }));
            return Ok(Bundle::SimpleFunc {
                name: fname,
                params: param_ctys,
                ret: ret_cty,
            });
        }

        // Environment synthesis: one field per captured name, plus a
        // `self` slot for method bodies.
        self.require_closure();
        let env_struct = self.names.fresh_c(&format!("{}_env", fname));
        let mut fields: Vec<(String, CType)> = Vec::new();
        let mut field_map: FxHashMap<SymbolId, String> = FxHashMap::default();
        for &csym in &captured {
            let base = hir.symbols.info(csym).name.as_str();
            let field = if fields.iter().any(|(n, _)| n == base) || base == "self" {
                self.names.fresh_c(base)
            } else {
                base.to_string()
            };
            let cty = self.c_type(hir.symbol_type(csym).value_ty())?;
            fields.push((field.clone(), cty));
            field_map.insert(csym, field);
        }
        let self_class = method_of.or_else(|| self.frames.last().and_then(|f| f.self_class));
        if needs_self {
            let cid = self_class.ok_or_else(|| {
                CodeGenError::Internal("member reference outside a class".into())
            })?;
            fields.push((
                "self".to_string(),
                CType::Struct(self.struct_name(cid)).ptr(),
            ));
        }
        self.defs.push(CDef::Struct(CStructDef {
            name: env_struct.clone(),
            fields,
        }));

        // The lifted function: env pointer first, then the parameters.
        self.frames.push(GenFrame {
            env: Some(EnvCtx {
                param: "env".to_string(),
                fields: field_map.clone(),
            }),
            self_expr: if needs_self {
                Some(CExpr::arrow(CExpr::ident("env"), "self"))
            } else {
                None
            },
            self_class,
        });
        let mut fparams = vec![(
            "env".to_string(),
            CType::Struct(env_struct.clone()).ptr(),
        )];
        for (&psym, pcty) in params.iter().zip(param_ctys.iter()) {
            let pname = self.names.fresh_c(hir.symbols.info(psym).name.as_str());
            self.sym_code.insert(psym, SymCode::Param(pname.clone()));
            fparams.push((pname, pcty.clone()));
        }
        let body_bundle = self.lower_expr(body);
        self.frames.pop();
        let fbody = self.function_body(body_bundle?, &ret_cty)?;
        self.defs.push(CDef::Func(CFuncDef {
            name: fname.clone(),
            params: fparams,
            ret: ret_cty,
            body: fbody,
        }));

        // Use site: malloc the env, fill it from the current frame,
        // malloc the closure pair.
        let mut stmts = Vec::new();
        let ev = self.names.fresh_c("env");
        stmts.push(CStmt::VarDef {
            name: ev.clone(),
            ty: CType::Struct(env_struct.clone()).ptr(),
            init: Some(self.malloc_struct(&env_struct)),
        });
        for &csym in &captured {
            let field = field_map[&csym].clone();
            let vb = self.lower_var(csym)?;
            let (vstmts, vexpr) = self.value_parts(vb)?;
            stmts.extend(vstmts);
            stmts.push(CStmt::Assign {
                target: CExpr::arrow(CExpr::ident(ev.clone()), field),
                value: vexpr,
            });
        }
        if needs_self {
            let self_expr = self
                .frames
                .last()
                .and_then(|f| f.self_expr.clone())
                .ok_or_else(|| {
                    CodeGenError::Internal("closure needs `self` outside a class".into())
                })?;
            stmts.push(CStmt::Assign {
                target: CExpr::arrow(CExpr::ident(ev.clone()), "self"),
                value: self_expr,
            });
        }
        let cl = self.names.fresh_c("cl");
        stmts.push(CStmt::VarDef {
            name: cl.clone(),
            ty: CType::Struct(CLOSURE_STRUCT.to_string()).ptr(),
            init: Some(self.malloc_struct(CLOSURE_STRUCT)),
        });
        stmts.push(CStmt::Assign {
            target: CExpr::arrow(CExpr::ident(cl.clone()), "func"),
            value: CExpr::cast(CType::Void.ptr(), CExpr::ident(fname)),
        });
        stmts.push(CStmt::Assign {
            target: CExpr::arrow(CExpr::ident(cl.clone()), "env"),
            value: CExpr::cast(CType::Void.ptr(), CExpr::ident(ev)),
        });
        Ok(Bundle::Closure {
            expr: CExpr::Ident(cl),
            stmts,
        })
    }

    fn function_body(&mut self, bundle: Bundle, ret: &CType) -> Result<Vec<CStmt>> {
        if *ret == CType::Void {
            Ok(bundle.into_stmts())
        } else {
            let (mut stmts, expr) = self.value_parts(bundle)?;
            stmts.push(CStmt::Return(Some(expr)));
            Ok(stmts)
        }
    }

    // =====================================================================
    // Classes
    // =====================================================================

    fn lower_class(&mut self, cid: ClassId) -> Result<()> {
        let hir = self.hir;
        let class = &hir.classes[cid];
        let sname = self.struct_name(cid);

        let mut fields = Vec::new();
        for m in &class.members {
            fields.push((m.name.as_str().to_string(), self.c_type(m.ty.value_ty())?));
        }
        self.defs.push(CDef::Struct(CStructDef {
            name: sname.clone(),
            fields,
        }));

        // Constructor: allocate, initialize members in order, return.
        let mut fparams = Vec::new();
        for (p, &psym) in class.params.iter().zip(&class.param_syms) {
            let pname = self.names.fresh_c(p.name.as_str());
            self.sym_code.insert(psym, SymCode::Param(pname.clone()));
            fparams.push((pname, self.c_type(p.ty.value_ty())?));
        }

        let mut body = Vec::new();
        body.push(CStmt::VarDef {
            name: "obj".to_string(),
            ty: CType::Struct(sname.clone()).ptr(),
            init: Some(self.malloc_struct(&sname)),
        });
        self.frames.push(GenFrame {
            env: None,
            self_expr: Some(CExpr::ident("obj")),
            self_class: Some(cid),
        });
        for m in &class.members {
            let body_id = m.body.ok_or_else(|| {
                CodeGenError::Internal(format!("member `{}` has no checked body", m.name))
            })?;
            let bundle = if matches!(hir.exprs[body_id].kind, ExprKind::Lambda { .. }) {
                self.lower_lambda(body_id, None, Some(cid))?
            } else {
                self.lower_expr(body_id)?
            };
            let (stmts, expr) = self.value_parts(bundle)?;
            body.extend(stmts);
            body.push(CStmt::Assign {
                target: CExpr::arrow(CExpr::ident("obj"), m.name.as_str()),
                value: expr,
            });
        }
        self.frames.pop();
        body.push(CStmt::Return(Some(CExpr::ident("obj"))));

        self.defs.push(CDef::Func(CFuncDef {
            name: format!("{}_new", class.name),
            params: fparams,
            ret: CType::Struct(sname).ptr(),
            body,
        }));
        Ok(())
    }
}
