//! The typer: constraint-emitting traversal over the untyped tree.
//!
//! The traversal produces arena nodes, records every node in the current
//! *typing frame*, and emits equality constraints into the solver.
//! Frames are pushed in lock-step with lexical scopes (plus around class
//! bodies); when a recursive group finishes, the frame is
//! *force-instantiated*: the solver runs and the substitution is applied
//! to every in-flight node, failing if any variable remains.
//!
//! Recursive groups follow the placeholder protocol: every `val`/`var`
//! of a block (and every class member) is pre-declared with a
//! provisional `X` type or its ascription, bodies are checked in order,
//! and each body's type is equated with its placeholder. Identifier
//! resolution through a placeholder is what makes forward references
//! inside the group work.
//!
//! Free names are tracked during resolution: whenever a symbol resolves
//! to a frame outside an enclosing lambda, it is pushed onto that
//! lambda's free-name list. The code generator turns those lists into
//! closure environments.

use fwsc_par as ast;
use fwsc_par::{BinOp, UnOp};
use fwsc_util::{FxHashMap, Span, Symbol};

use crate::error::{Result, TypeError};
use crate::hir::{
    ClassId, CtorParam, DefId, DefKind, Entry, Expr, ExprId, ExprKind, Hir, LocalDef, Member,
    Module,
};
use crate::scope::{Dealias, Primitive, SymbolId};
use crate::solver::Solver;
use crate::types::{Predicate, Type};

/// Check a whole program, producing the typed arena and its top-level
/// structure.
pub fn type_check(program: &ast::Program) -> Result<(Hir, Module)> {
    Typer::new().run(program)
}

/// An entry in a typing frame: a node whose type must be instantiated
/// when the frame closes.
#[derive(Clone, Copy)]
enum FrameEntry {
    Expr(ExprId),
    Member(ClassId, usize),
}

/// Free-name collector for one enclosing lambda.
struct FreeFrame {
    /// Scope-frame index of the lambda's parameter frame; symbols
    /// declared shallower than this are free.
    depth: usize,
    free: Vec<SymbolId>,
}

pub struct Typer {
    hir: Hir,
    solver: Solver,
    frames: Vec<Vec<FrameEntry>>,
    lambda_stack: Vec<FreeFrame>,
    class_preds: FxHashMap<ClassId, Vec<Predicate>>,
}

impl Typer {
    pub fn new() -> Self {
        let mut hir = Hir::new();
        for prim in Primitive::ALL {
            hir.symbols.add(
                Symbol::intern(prim.name()),
                Dealias::Primitive(prim),
                Span::DUMMY,
                false,
            );
        }
        Self {
            hir,
            solver: Solver::new(),
            frames: Vec::new(),
            lambda_stack: Vec::new(),
            class_preds: FxHashMap::default(),
        }
    }

    fn run(mut self, program: &ast::Program) -> Result<(Hir, Module)> {
        self.hir.symbols.enter_scope();
        self.frames.push(Vec::new());

        // Collect class declarations so classes and top-level bindings
        // may reference each other in any order.
        let class_ids = self.declare_classes(program)?;
        let class_names: Vec<Symbol> = class_ids.iter().map(|&c| self.hir.classes[c].name).collect();
        self.solver.set_class_names(class_names);
        self.predeclare_class_shapes(program, &class_ids)?;

        let mut next_class = 0;
        for item in &program.items {
            if let ast::Item::Class(class) = item {
                let cid = class_ids[next_class];
                next_class += 1;
                self.type_class(cid, class)?;
            }
        }

        let top_items: Vec<&ast::LocalDef> = program
            .items
            .iter()
            .filter_map(|item| match item {
                ast::Item::Def(def) => Some(def),
                ast::Item::Class(_) => None,
            })
            .collect();
        let top_defs = self.type_def_group(&top_items)?;
        self.force_instantiate_current()?;

        let entry = self.resolve_entry()?;
        self.seal_check()?;

        self.frames.pop();
        self.hir.symbols.exit_scope();

        Ok((
            self.hir,
            Module {
                top_defs,
                class_order: class_ids,
                entry,
            },
        ))
    }

    // =====================================================================
    // Declaration collection
    // =====================================================================

    fn declare_classes(&mut self, program: &ast::Program) -> Result<Vec<ClassId>> {
        let mut ids = Vec::new();
        for item in &program.items {
            if let ast::Item::Class(class) = item {
                if self.hir.symbols.find_here(class.name).is_some() {
                    return Err(TypeError::new(
                        format!("duplicate definition of `{}` in the same scope", class.name),
                        class.name_span,
                    ));
                }
                let cid = self.hir.classes.push(crate::hir::ClassItem {
                    name: class.name,
                    span: class.span,
                    params: Vec::new(),
                    param_syms: Vec::new(),
                    members: Vec::new(),
                    sealed: false,
                });
                self.hir
                    .symbols
                    .add(class.name, Dealias::Class(cid), class.name_span, false);
                ids.push(cid);
            }
        }
        Ok(ids)
    }

    /// Resolve constructor parameter annotations and give every member a
    /// declared or provisional type, before any body is checked.
    fn predeclare_class_shapes(
        &mut self,
        program: &ast::Program,
        class_ids: &[ClassId],
    ) -> Result<()> {
        let mut next = 0;
        for item in &program.items {
            let class = match item {
                ast::Item::Class(class) => class,
                ast::Item::Def(_) => continue,
            };
            let cid = class_ids[next];
            next += 1;

            let mut params = Vec::new();
            for p in &class.params {
                params.push(CtorParam {
                    name: p.name,
                    ty: self.resolve_type_expr(&p.ty)?,
                    span: p.span,
                });
            }

            let mut members: Vec<Member> = Vec::new();
            for m in &class.members {
                if members.iter().any(|existing| existing.name == m.name) {
                    return Err(TypeError::new(
                        format!(
                            "duplicate member `{}` in class `{}`",
                            m.name, class.name
                        ),
                        m.name_span,
                    ));
                }
                let ty = match &m.ascription {
                    Some(te) => self.resolve_type_expr(te)?,
                    None => Type::Var(self.solver.fresh_decl_var(m.name_span)),
                };
                members.push(Member {
                    name: m.name,
                    mutable: m.mutable,
                    ty,
                    body: None,
                    span: m.span,
                });
            }

            let item = &mut self.hir.classes[cid];
            item.params = params;
            item.members = members;
        }
        Ok(())
    }

    // =====================================================================
    // Classes
    // =====================================================================

    fn type_class(&mut self, cid: ClassId, class: &ast::ClassDef) -> Result<()> {
        self.hir.symbols.enter_scope();
        self.frames.push(Vec::new());

        let mut param_syms = Vec::new();
        for (i, p) in class.params.iter().enumerate() {
            let ty = self.hir.classes[cid].params[i].ty.clone();
            let sym = self
                .hir
                .symbols
                .add(p.name, Dealias::Param { ty }, p.span, false);
            param_syms.push(sym);
        }
        self.hir.classes[cid].param_syms = param_syms;

        for (i, m) in class.members.iter().enumerate() {
            self.hir.symbols.add(
                m.name,
                Dealias::Member {
                    class: cid,
                    index: i,
                },
                m.name_span,
                m.mutable,
            );
            self.record(FrameEntry::Member(cid, i));
        }

        for (i, m) in class.members.iter().enumerate() {
            let body = self.type_expr(&m.body)?;
            let body_ty = self.value_ty_of(body);
            let decl_ty = self.hir.classes[cid].members[i].ty.clone();
            self.solver.add_equality(
                decl_ty,
                body_ty,
                m.span,
                Some(m.name_span),
                Some(self.hir.exprs[body].span),
            );
            self.hir.classes[cid].members[i].body = Some(body);
        }

        self.force_instantiate_current()?;
        self.discharge_predicates(cid)?;
        self.hir.classes[cid].sealed = true;

        self.frames.pop();
        self.hir.symbols.exit_scope();
        Ok(())
    }

    /// Check every member requirement accumulated through selections on
    /// the open class form against the now-known member types.
    fn discharge_predicates(&mut self, cid: ClassId) -> Result<()> {
        let preds = match self.class_preds.remove(&cid) {
            Some(preds) => preds,
            None => return Ok(()),
        };
        for pred in preds {
            let member_ty = match self.hir.classes[cid].member(pred.member) {
                Some((_, member)) => member.ty.clone(),
                None => {
                    return Err(TypeError::new(
                        format!(
                            "class `{}` has no member `{}`",
                            self.hir.classes[cid].name, pred.member
                        ),
                        pred.span,
                    ))
                }
            };
            self.solver
                .add_equality(pred.ty, member_ty, pred.span, None, None);
        }
        self.solver.solve()
    }

    // =====================================================================
    // Recursive groups (blocks and the top level)
    // =====================================================================

    /// Type a definition list in the current scope using the recursive
    /// group rule: pre-declare placeholders, check bodies in order,
    /// equate each placeholder with its body's type. The caller runs
    /// force-instantiation when the group's frame closes.
    fn type_def_group(&mut self, defs: &[&ast::LocalDef]) -> Result<Vec<DefId>> {
        let mut placeholders: Vec<Option<SymbolId>> = vec![None; defs.len()];
        for (i, def) in defs.iter().enumerate() {
            if let ast::LocalDefKind::Bind {
                mutable,
                name,
                name_span,
                ascription,
                ..
            } = &def.kind
            {
                if self.hir.symbols.find_here(*name).is_some() {
                    return Err(TypeError::new(
                        format!("duplicate definition of `{}` in the same scope", name),
                        *name_span,
                    ));
                }
                let ty = match ascription {
                    Some(te) => self.resolve_type_expr(te)?,
                    None => Type::Var(self.solver.fresh_decl_var(*name_span)),
                };
                let sym = self
                    .hir
                    .symbols
                    .add(*name, Dealias::Placeholder { ty }, *name_span, *mutable);
                placeholders[i] = Some(sym);
            }
        }

        let mut out = Vec::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            let def_id = match &def.kind {
                ast::LocalDefKind::Bind {
                    mutable,
                    name_span,
                    body,
                    ..
                } => {
                    let sym = placeholders[i].expect("binding was pre-declared");
                    let body_id = self.type_expr(body)?;
                    let body_ty = self.value_ty_of(body_id);
                    let decl_ty = self.hir.symbol_type(sym);
                    self.solver.add_equality(
                        decl_ty,
                        body_ty,
                        def.span,
                        Some(*name_span),
                        Some(self.hir.exprs[body_id].span),
                    );
                    let def_id = self.hir.defs.push(LocalDef {
                        kind: DefKind::Bind {
                            sym,
                            mutable: *mutable,
                            body: body_id,
                        },
                        span: def.span,
                    });
                    self.hir.symbols.set_dealias(sym, Dealias::Def(def_id));
                    def_id
                }
                ast::LocalDefKind::Assign {
                    target,
                    eq_span,
                    value,
                } => self.type_assign(target, *eq_span, value, def.span)?,
                ast::LocalDefKind::Eval(expr) => {
                    let id = self.type_expr(expr)?;
                    self.hir.defs.push(LocalDef {
                        kind: DefKind::Eval(id),
                        span: def.span,
                    })
                }
            };
            out.push(def_id);
        }
        Ok(out)
    }

    fn type_assign(
        &mut self,
        target: &ast::Expr,
        eq_span: Span,
        value: &ast::Expr,
        span: Span,
    ) -> Result<DefId> {
        let target_id = match &target.kind {
            ast::ExprKind::Ident(name) => {
                let sym = self.lookup_ident(*name, target.span)?;
                let info = self.hir.symbols.info(sym);
                match info.dealias {
                    Dealias::Class(_) | Dealias::Primitive(_) => {
                        return Err(TypeError::new(
                            format!("can not assign to `{}`", name),
                            eq_span,
                        ))
                    }
                    _ => {}
                }
                if !info.mutable {
                    return Err(TypeError::new(
                        format!("can not assign to immutable value `{}`", name),
                        eq_span,
                    ));
                }
                let ty = Type::Ref(Box::new(self.hir.symbol_type(sym)));
                self.mk(ExprKind::Var(sym), ty, target.span)
            }
            _ => self.type_expr(target)?,
        };

        let slot_ty = match &self.hir.exprs[target_id].ty {
            Type::Ref(inner) => (**inner).clone(),
            _ => {
                return Err(TypeError::new(
                    "can not assign: expression is not an assignable reference",
                    eq_span,
                ))
            }
        };

        let value_id = self.type_expr(value)?;
        let value_ty = self.value_ty_of(value_id);
        self.solver.add_equality(
            slot_ty,
            value_ty,
            eq_span,
            Some(target.span),
            Some(self.hir.exprs[value_id].span),
        );

        Ok(self.hir.defs.push(LocalDef {
            kind: DefKind::Assign {
                target: target_id,
                value: value_id,
            },
            span,
        }))
    }

    // =====================================================================
    // Expressions
    // =====================================================================

    fn type_expr(&mut self, expr: &ast::Expr) -> Result<ExprId> {
        let span = expr.span;
        match &expr.kind {
            ast::ExprKind::IntLit(v) => Ok(self.mk(ExprKind::IntLit(*v), Type::Int, span)),
            ast::ExprKind::FloatLit(v) => Ok(self.mk(ExprKind::FloatLit(*v), Type::Float, span)),
            ast::ExprKind::BoolLit(v) => Ok(self.mk(ExprKind::BoolLit(*v), Type::Bool, span)),
            ast::ExprKind::StrLit(v) => Ok(self.mk(ExprKind::StrLit(*v), Type::Str, span)),

            ast::ExprKind::Ident(name) => {
                let sym = self.lookup_ident(*name, span)?;
                if let Dealias::Class(_) = self.hir.symbols.info(sym).dealias {
                    return Err(TypeError::new(
                        format!("class `{}` cannot be used as a value", name),
                        span,
                    ));
                }
                let mut ty = self.hir.symbol_type(sym);
                if self.hir.symbols.info(sym).mutable {
                    ty = Type::Ref(Box::new(ty));
                }
                Ok(self.mk(ExprKind::Var(sym), ty, span))
            }

            ast::ExprKind::Select(recv, member, member_span) => {
                self.type_select(recv, *member, *member_span, span)
            }

            ast::ExprKind::Apply(callee, args) => self.type_apply(callee, args, span),

            ast::ExprKind::Binary(op, op_span, lhs, rhs) => {
                self.type_binary(*op, *op_span, lhs, rhs, span)
            }

            ast::ExprKind::Unary(op, op_span, operand) => {
                self.type_unary(*op, *op_span, operand, span)
            }

            ast::ExprKind::If(cond, then_arm, else_arm) => {
                self.type_if(cond, then_arm, else_arm, span)
            }

            ast::ExprKind::While(cond, body) => {
                let cond_id = self.type_expr(cond)?;
                self.require_bool(cond_id, "while condition")?;
                let body_id = self.type_expr(body)?;
                Ok(self.mk(
                    ExprKind::While {
                        cond: cond_id,
                        body: body_id,
                    },
                    Type::Unit,
                    span,
                ))
            }

            ast::ExprKind::Block(defs, tail) => {
                self.hir.symbols.enter_scope();
                self.frames.push(Vec::new());
                let items: Vec<&ast::LocalDef> = defs.iter().collect();
                let def_ids = self.type_def_group(&items)?;
                self.force_instantiate_current()?;
                let tail_id = match tail {
                    Some(expr) => Some(self.type_expr(expr)?),
                    None => None,
                };
                self.frames.pop();
                self.hir.symbols.exit_scope();
                let ty = match tail_id {
                    Some(id) => self.value_ty_of(id),
                    None => Type::Unit,
                };
                Ok(self.mk(
                    ExprKind::Block {
                        defs: def_ids,
                        tail: tail_id,
                    },
                    ty,
                    span,
                ))
            }

            ast::ExprKind::Lambda(params, ret, body) => self.type_lambda(params, ret, body, span),

            ast::ExprKind::New(name, name_span, args) => {
                self.type_new(*name, *name_span, args, span)
            }

            ast::ExprKind::ArrayAlloc(len) => {
                let len_id = self.type_expr(len)?;
                let len_ty = self.value_ty_of(len_id);
                self.solver.add_equality(
                    len_ty,
                    Type::Int,
                    self.hir.exprs[len_id].span,
                    None,
                    None,
                );
                let elem = Type::Var(self.solver.fresh_expr_var(span));
                Ok(self.mk(
                    ExprKind::ArrayAlloc { len: len_id },
                    Type::Array(Box::new(elem)),
                    span,
                ))
            }
        }
    }

    fn type_select(
        &mut self,
        recv: &ast::Expr,
        member: Symbol,
        member_span: Span,
        span: Span,
    ) -> Result<ExprId> {
        let recv_id = self.type_expr(recv)?;
        let recv_ty = self.solver.shallow_resolve(&self.value_ty_of(recv_id));
        match recv_ty {
            Type::Class(cid) => {
                let (ty, mutable) = match self.hir.classes[cid].member(member) {
                    Some((_, m)) => (m.ty.clone(), m.mutable),
                    None => {
                        return Err(TypeError::new(
                            format!(
                                "class `{}` has no member `{}`",
                                self.hir.classes[cid].name, member
                            ),
                            member_span,
                        ))
                    }
                };
                let ty = if mutable {
                    Type::Ref(Box::new(ty))
                } else {
                    ty
                };
                Ok(self.mk(
                    ExprKind::Select {
                        recv: recv_id,
                        member,
                    },
                    ty,
                    span,
                ))
            }
            Type::ClassVar(cid) => {
                let var = Type::Var(self.solver.fresh_expr_var(member_span));
                self.class_preds.entry(cid).or_default().push(Predicate {
                    member,
                    ty: var.clone(),
                    span: member_span,
                });
                Ok(self.mk(
                    ExprKind::Select {
                        recv: recv_id,
                        member,
                    },
                    var,
                    span,
                ))
            }
            Type::Var(_) => Err(TypeError::new(
                "member selection on a value whose type is not yet known",
                span,
            )),
            other => Err(TypeError::new(
                format!(
                    "member selection on non-class type `{}`",
                    self.hir.display_type(&other)
                ),
                span,
            )),
        }
    }

    fn type_apply(&mut self, callee: &ast::Expr, args: &[ast::Expr], span: Span) -> Result<ExprId> {
        let callee_id = self.type_expr(callee)?;

        // printf is variadic beyond its format string.
        if self.is_primitive(callee_id, Primitive::Printf) {
            if args.is_empty() {
                return Err(TypeError::new("printf needs a format string", span));
            }
            let mut arg_ids = Vec::new();
            for (i, arg) in args.iter().enumerate() {
                let id = self.type_expr(arg)?;
                if i == 0 {
                    let ty = self.value_ty_of(id);
                    self.solver.add_equality(
                        ty,
                        Type::Str,
                        self.hir.exprs[id].span,
                        None,
                        None,
                    );
                }
                arg_ids.push(id);
            }
            return Ok(self.mk(
                ExprKind::Call {
                    callee: callee_id,
                    args: arg_ids,
                },
                Type::Unit,
                span,
            ));
        }

        let callee_ty = self.solver.shallow_resolve(&self.value_ty_of(callee_id));
        match callee_ty {
            Type::Array(elem) => {
                if args.len() != 1 {
                    return Err(TypeError::new(
                        format!("array indexing takes exactly one argument, found {}", args.len()),
                        span,
                    ));
                }
                let index = self.type_expr(&args[0])?;
                let index_ty = self.value_ty_of(index);
                self.solver.add_equality(
                    index_ty,
                    Type::Int,
                    self.hir.exprs[index].span,
                    None,
                    None,
                );
                Ok(self.mk(
                    ExprKind::Index {
                        arr: callee_id,
                        index,
                    },
                    Type::Ref(elem),
                    span,
                ))
            }
            Type::Lambda(params, ret) => {
                if params.len() != args.len() {
                    return Err(TypeError::new(
                        format!(
                            "arity mismatch: expected {} arguments, found {}",
                            params.len(),
                            args.len()
                        ),
                        span,
                    ));
                }
                let mut arg_ids = Vec::new();
                for (param_ty, arg) in params.iter().zip(args) {
                    let id = self.type_expr(arg)?;
                    let arg_ty = self.value_ty_of(id);
                    self.solver.add_equality(
                        param_ty.clone(),
                        arg_ty,
                        self.hir.exprs[id].span,
                        None,
                        Some(self.hir.exprs[id].span),
                    );
                    arg_ids.push(id);
                }
                Ok(self.mk(
                    ExprKind::Call {
                        callee: callee_id,
                        args: arg_ids,
                    },
                    *ret,
                    span,
                ))
            }
            Type::Var(_) => {
                // The callee's type is still open: constrain it to a
                // lambda of the actual argument types.
                let mut arg_ids = Vec::new();
                let mut arg_tys = Vec::new();
                for arg in args {
                    let id = self.type_expr(arg)?;
                    arg_tys.push(self.value_ty_of(id));
                    arg_ids.push(id);
                }
                let result = Type::Var(self.solver.fresh_decl_var(span));
                let callee_val_ty = self.value_ty_of(callee_id);
                self.solver.add_equality(
                    callee_val_ty,
                    Type::Lambda(arg_tys, Box::new(result.clone())),
                    span,
                    Some(self.hir.exprs[callee_id].span),
                    None,
                );
                Ok(self.mk(
                    ExprKind::Call {
                        callee: callee_id,
                        args: arg_ids,
                    },
                    result,
                    span,
                ))
            }
            other => Err(TypeError::new(
                format!(
                    "expression of type `{}` cannot be applied",
                    self.hir.display_type(&other)
                ),
                span,
            )),
        }
    }

    fn type_binary(
        &mut self,
        op: BinOp,
        op_span: Span,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        span: Span,
    ) -> Result<ExprId> {
        let lhs_id = self.type_expr(lhs)?;
        let rhs_id = self.type_expr(rhs)?;
        let lhs_ty = self.value_ty_of(lhs_id);
        let rhs_ty = self.value_ty_of(rhs_id);

        // Equality works on any pair of equal types.
        if matches!(op, BinOp::Eq | BinOp::Ne) {
            match (self.instantiated(&lhs_ty), self.instantiated(&rhs_ty)) {
                (Some(a), Some(b)) => {
                    if a != b {
                        return Err(TypeError::new(
                            format!(
                                "operator `{}` cannot compare `{}` and `{}`",
                                op,
                                self.hir.display_type(&a),
                                self.hir.display_type(&b)
                            ),
                            op_span,
                        )
                        .with_sub_spans(vec![lhs.span, rhs.span]));
                    }
                }
                _ => {
                    self.solver.add_equality(
                        lhs_ty,
                        rhs_ty,
                        op_span,
                        Some(lhs.span),
                        Some(rhs.span),
                    );
                }
            }
            return Ok(self.mk(
                ExprKind::Binary {
                    op,
                    lhs: lhs_id,
                    rhs: rhs_id,
                },
                Type::Bool,
                span,
            ));
        }

        // Probe the signature table: first accepting candidate wins.
        let lhs_inst = self.instantiated(&lhs_ty);
        let rhs_inst = self.instantiated(&rhs_ty);
        for (want_l, want_r, result) in binop_signatures(op) {
            let l_hit = lhs_inst.as_ref() == Some(&want_l);
            let r_hit = rhs_inst.as_ref() == Some(&want_r);
            let accepted = match (l_hit, r_hit) {
                (true, true) => true,
                (true, false) if rhs_inst.is_none() => {
                    self.solver.add_equality(
                        rhs_ty.clone(),
                        want_r.clone(),
                        op_span,
                        None,
                        Some(rhs.span),
                    );
                    true
                }
                (false, true) if lhs_inst.is_none() => {
                    self.solver.add_equality(
                        lhs_ty.clone(),
                        want_l.clone(),
                        op_span,
                        None,
                        Some(lhs.span),
                    );
                    true
                }
                _ => false,
            };
            if accepted {
                return Ok(self.mk(
                    ExprKind::Binary {
                        op,
                        lhs: lhs_id,
                        rhs: rhs_id,
                    },
                    result,
                    span,
                ));
            }
        }

        Err(TypeError::new(
            format!(
                "operator `{}` cannot be applied to `{}` and `{}`",
                op,
                self.hir.display_type(&lhs_ty),
                self.hir.display_type(&rhs_ty)
            ),
            op_span,
        )
        .with_sub_spans(vec![lhs.span, rhs.span]))
    }

    fn type_unary(
        &mut self,
        op: UnOp,
        op_span: Span,
        operand: &ast::Expr,
        span: Span,
    ) -> Result<ExprId> {
        let operand_id = self.type_expr(operand)?;
        let operand_ty = self.value_ty_of(operand_id);
        let result = match op {
            // `!` forces Boolean, so an open operand is constrained.
            UnOp::Not => {
                match self.instantiated(&operand_ty) {
                    Some(Type::Bool) => {}
                    Some(other) => {
                        return Err(TypeError::new(
                            format!(
                                "operator `!` cannot be applied to `{}`",
                                self.hir.display_type(&other)
                            ),
                            op_span,
                        ))
                    }
                    None => {
                        self.solver.add_equality(
                            operand_ty,
                            Type::Bool,
                            op_span,
                            None,
                            Some(operand.span),
                        );
                    }
                }
                Type::Bool
            }
            // `-` is ambiguous between Int and Float; the operand must
            // already be instantiated.
            UnOp::Neg => match self.instantiated(&operand_ty) {
                Some(Type::Int) => Type::Int,
                Some(Type::Float) => Type::Float,
                Some(other) => {
                    return Err(TypeError::new(
                        format!(
                            "operator `-` cannot be applied to `{}`",
                            self.hir.display_type(&other)
                        ),
                        op_span,
                    ))
                }
                None => {
                    return Err(TypeError::new(
                        "operator `-` needs an operand of known numeric type",
                        op_span,
                    ))
                }
            },
        };
        Ok(self.mk(
            ExprKind::Unary {
                op,
                operand: operand_id,
            },
            result,
            span,
        ))
    }

    fn type_if(
        &mut self,
        cond: &ast::Expr,
        then_arm: &ast::Expr,
        else_arm: &ast::Expr,
        span: Span,
    ) -> Result<ExprId> {
        let cond_id = self.type_expr(cond)?;
        self.require_bool(cond_id, "if condition")?;
        let then_id = self.type_expr(then_arm)?;
        let else_id = self.type_expr(else_arm)?;
        let then_ty = self.value_ty_of(then_id);
        let else_ty = self.value_ty_of(else_id);

        let ty = match (self.instantiated(&then_ty), self.instantiated(&else_ty)) {
            // Both branches known and different: fail now rather than
            // queueing a constraint that cannot hold.
            (Some(a), Some(b)) => {
                if a != b {
                    return Err(TypeError::new(
                        format!(
                            "branch mismatch: `then` branch has type `{}` but `else` branch has type `{}`",
                            self.hir.display_type(&a),
                            self.hir.display_type(&b)
                        ),
                        span,
                    )
                    .with_sub_spans(vec![then_arm.span, else_arm.span]));
                }
                a
            }
            _ => {
                self.solver.add_equality(
                    then_ty.clone(),
                    else_ty,
                    span,
                    Some(then_arm.span),
                    Some(else_arm.span),
                );
                then_ty
            }
        };

        Ok(self.mk(
            ExprKind::If {
                cond: cond_id,
                then_arm: then_id,
                else_arm: else_id,
            },
            ty,
            span,
        ))
    }

    fn type_lambda(
        &mut self,
        params: &[ast::Param],
        ret: &Option<ast::TypeExpr>,
        body: &ast::Expr,
        span: Span,
    ) -> Result<ExprId> {
        let mut param_tys = Vec::new();
        for p in params {
            param_tys.push(self.resolve_type_expr(&p.ty)?);
        }

        self.hir.symbols.enter_scope();
        self.lambda_stack.push(FreeFrame {
            depth: self.hir.symbols.depth() - 1,
            free: Vec::new(),
        });

        let mut param_syms = Vec::new();
        for (p, ty) in params.iter().zip(param_tys.iter()) {
            if self.hir.symbols.find_here(p.name).is_some() {
                self.lambda_stack.pop();
                self.hir.symbols.exit_scope();
                return Err(TypeError::new(
                    format!("duplicate parameter `{}`", p.name),
                    p.span,
                ));
            }
            let sym = self
                .hir
                .symbols
                .add(p.name, Dealias::Param { ty: ty.clone() }, p.span, false);
            param_syms.push(sym);
        }

        let body_result = self.type_expr(body);
        let free = self
            .lambda_stack
            .pop()
            .expect("lambda frame pushed above")
            .free;
        self.hir.symbols.exit_scope();
        let body_id = body_result?;
        let body_ty = self.value_ty_of(body_id);

        // A written return type is a hard equality, not a constraint.
        if let Some(te) = ret {
            let want = self.resolve_type_expr(te)?;
            let got = self
                .solver
                .substitute(&body_ty)
                .unwrap_or_else(|_| body_ty.clone());
            if got != want {
                return Err(TypeError::new(
                    format!(
                        "lambda return type mismatch: declared `{}`, body has type `{}`",
                        self.hir.display_type(&want),
                        self.hir.display_type(&got)
                    ),
                    te.span,
                ));
            }
        }

        let ty = Type::Lambda(param_tys, Box::new(body_ty));
        Ok(self.mk(
            ExprKind::Lambda {
                params: param_syms,
                body: body_id,
                free,
            },
            ty,
            span,
        ))
    }

    fn type_new(
        &mut self,
        name: Symbol,
        name_span: Span,
        args: &[ast::Expr],
        span: Span,
    ) -> Result<ExprId> {
        let sym = match self.hir.symbols.find(name) {
            Some(sym) => sym,
            None => {
                return Err(TypeError::new(
                    format!("unknown class `{}`", name),
                    name_span,
                ))
            }
        };
        let cid = match self.hir.symbols.info(sym).dealias {
            Dealias::Class(cid) => cid,
            _ => {
                return Err(TypeError::new(
                    format!("`{}` is not a class", name),
                    name_span,
                ))
            }
        };

        let params: Vec<Type> = self.hir.classes[cid]
            .params
            .iter()
            .map(|p| p.ty.clone())
            .collect();
        if params.len() != args.len() {
            return Err(TypeError::new(
                format!(
                    "arity mismatch: class `{}` expects {} constructor arguments, found {}",
                    name,
                    params.len(),
                    args.len()
                ),
                span,
            ));
        }

        let mut arg_ids = Vec::new();
        for (param_ty, arg) in params.into_iter().zip(args) {
            let id = self.type_expr(arg)?;
            let arg_ty = self.value_ty_of(id);
            self.solver.add_equality(
                param_ty,
                arg_ty,
                self.hir.exprs[id].span,
                None,
                Some(self.hir.exprs[id].span),
            );
            arg_ids.push(id);
        }

        let ty = if self.hir.classes[cid].sealed {
            Type::Class(cid)
        } else {
            Type::ClassVar(cid)
        };
        Ok(self.mk(
            ExprKind::New {
                class: cid,
                args: arg_ids,
            },
            ty,
            span,
        ))
    }

    // =====================================================================
    // Shared machinery
    // =====================================================================

    fn mk(&mut self, kind: ExprKind, ty: Type, span: Span) -> ExprId {
        let id = self.hir.exprs.push(Expr { kind, ty, span });
        self.record(FrameEntry::Expr(id));
        id
    }

    fn record(&mut self, entry: FrameEntry) {
        self.frames
            .last_mut()
            .expect("a typing frame is always open")
            .push(entry);
    }

    fn value_ty_of(&self, id: ExprId) -> Type {
        self.hir.exprs[id].ty.value_ty().clone()
    }

    /// Fully substituted form of a type, if no variable remains open.
    fn instantiated(&self, ty: &Type) -> Option<Type> {
        self.solver.substitute(ty).ok()
    }

    fn lookup_ident(&mut self, name: Symbol, span: Span) -> Result<SymbolId> {
        let sym = self
            .hir
            .symbols
            .find(name)
            .ok_or_else(|| TypeError::new(format!("unknown symbol `{}`", name), span))?;
        self.note_free(sym);
        Ok(sym)
    }

    /// Record `sym` as free in every enclosing lambda it escapes.
    fn note_free(&mut self, sym: SymbolId) {
        let depth = self.hir.symbols.info(sym).depth;
        for frame in &mut self.lambda_stack {
            if depth < frame.depth && !frame.free.contains(&sym) {
                frame.free.push(sym);
            }
        }
    }

    fn require_bool(&mut self, cond: ExprId, what: &str) -> Result<()> {
        let ty = self.value_ty_of(cond);
        match self.instantiated(&ty) {
            Some(Type::Bool) => Ok(()),
            Some(other) => Err(TypeError::new(
                format!(
                    "{} must be Boolean, found `{}`",
                    what,
                    self.hir.display_type(&other)
                ),
                self.hir.exprs[cond].span,
            )),
            None => {
                self.solver.add_equality(
                    ty,
                    Type::Bool,
                    self.hir.exprs[cond].span,
                    None,
                    None,
                );
                Ok(())
            }
        }
    }

    fn resolve_type_expr(&mut self, te: &ast::TypeExpr) -> Result<Type> {
        let ty = match &te.kind {
            ast::TypeExprKind::Int => Type::Int,
            ast::TypeExprKind::Float => Type::Float,
            ast::TypeExprKind::Boolean => Type::Bool,
            ast::TypeExprKind::Str => Type::Str,
            ast::TypeExprKind::Unit => Type::Unit,
            ast::TypeExprKind::Array(elem) => {
                Type::Array(Box::new(self.resolve_type_expr(elem)?))
            }
            ast::TypeExprKind::Fn(params, ret) => {
                let params = params
                    .iter()
                    .map(|p| self.resolve_type_expr(p))
                    .collect::<Result<Vec<_>>>()?;
                Type::Lambda(params, Box::new(self.resolve_type_expr(ret)?))
            }
            ast::TypeExprKind::Named(name) => {
                let sym = self.hir.symbols.find(*name).ok_or_else(|| {
                    TypeError::new(format!("`{}` is not a type", name), te.span)
                })?;
                match self.hir.symbols.info(sym).dealias {
                    Dealias::Class(cid) => Type::Class(cid),
                    _ => {
                        return Err(TypeError::new(
                            format!("`{}` is not a type", name),
                            te.span,
                        ))
                    }
                }
            }
        };
        Ok(ty)
    }

    fn is_primitive(&self, expr: ExprId, prim: Primitive) -> bool {
        match &self.hir.exprs[expr].kind {
            ExprKind::Var(sym) => {
                matches!(self.hir.symbols.info(*sym).dealias, Dealias::Primitive(p) if p == prim)
            }
            _ => false,
        }
    }

    /// Solve the queued constraints and write the substitution back into
    /// every node recorded in the current frame, failing on residual
    /// variables.
    fn force_instantiate_current(&mut self) -> Result<()> {
        self.solver.solve()?;
        let entries: Vec<FrameEntry> = self
            .frames
            .last()
            .expect("a typing frame is always open")
            .clone();
        for entry in entries {
            match entry {
                FrameEntry::Expr(id) => {
                    let ty = self.hir.exprs[id].ty.clone();
                    match self.solver.substitute(&ty) {
                        Ok(solved) => self.hir.exprs[id].ty = solved,
                        Err(var) => {
                            return Err(TypeError::new(
                                format!(
                                    "can not infer a concrete type: `{}` is unconstrained",
                                    self.solver.var_name(var)
                                ),
                                self.hir.exprs[id].span,
                            ))
                        }
                    }
                }
                FrameEntry::Member(cid, index) => {
                    let ty = self.hir.classes[cid].members[index].ty.clone();
                    match self.solver.substitute(&ty) {
                        Ok(solved) => self.hir.classes[cid].members[index].ty = solved,
                        Err(var) => {
                            return Err(TypeError::new(
                                format!(
                                    "can not infer a concrete type for member `{}`: `{}` is unconstrained",
                                    self.hir.classes[cid].members[index].name,
                                    self.solver.var_name(var)
                                ),
                                self.hir.classes[cid].members[index].span,
                            ))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_entry(&mut self) -> Result<Entry> {
        let main = Symbol::intern("main");
        let wanted = Type::Lambda(vec![], Box::new(Type::Unit));

        if let Some(sym) = self.hir.symbols.find_here(main) {
            let ty = self.hir.symbol_type(sym);
            let ty = self.solver.substitute(&ty).unwrap_or(ty);
            if ty != wanted {
                return Err(TypeError::new(
                    format!(
                        "`main` must have type () => Unit, found `{}`",
                        self.hir.display_type(&ty)
                    ),
                    self.hir.symbols.info(sym).span,
                ));
            }
            return Ok(Entry::TopLevel(sym));
        }

        let main_class = Symbol::intern("Main");
        for (cid, class) in self.hir.classes.iter_enumerated() {
            if class.name != main_class {
                continue;
            }
            if !class.params.is_empty() {
                return Err(TypeError::new(
                    "class Main must not take constructor parameters",
                    class.span,
                ));
            }
            let member = class.member(main).ok_or_else(|| {
                TypeError::new("class Main has no member `main`", class.span)
            })?;
            let ty = self.solver.substitute(&member.1.ty).unwrap_or_else(|_| member.1.ty.clone());
            if ty != wanted {
                return Err(TypeError::new(
                    format!(
                        "`main` must have type () => Unit, found `{}`",
                        self.hir.display_type(&ty)
                    ),
                    member.1.span,
                ));
            }
            return Ok(Entry::MainClass(cid));
        }

        Err(TypeError::new(
            "program has no `main` entry point",
            Span::DUMMY,
        ))
    }

    /// Final whole-tree pass: apply the substitution to every node (the
    /// trailing expressions of blocks are typed after their frame has
    /// been instantiated) and collapse the residual open class forms,
    /// which all refer to classes sealed by now.
    fn seal_check(&mut self) -> Result<()> {
        for id in self.hir.exprs.indices().collect::<Vec<_>>() {
            let ty = self.hir.exprs[id].ty.clone();
            match self.solver.substitute(&ty) {
                Ok(solved) => self.hir.exprs[id].ty = strip_class_vars(solved),
                Err(var) => {
                    return Err(TypeError::new(
                        format!(
                            "can not infer a concrete type: `{}` is unconstrained",
                            self.solver.var_name(var)
                        ),
                        self.hir.exprs[id].span,
                    ))
                }
            }
        }
        for cid in self.hir.classes.indices().collect::<Vec<_>>() {
            for index in 0..self.hir.classes[cid].members.len() {
                let ty = self.hir.classes[cid].members[index].ty.clone();
                self.hir.classes[cid].members[index].ty = strip_class_vars(ty);
            }
        }
        Ok(())
    }
}

impl Default for Typer {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse every open class form to its sealed counterpart.
fn strip_class_vars(ty: Type) -> Type {
    match ty {
        Type::ClassVar(c) => Type::Class(c),
        Type::Array(elem) => Type::Array(Box::new(strip_class_vars(*elem))),
        Type::Ref(inner) => Type::Ref(Box::new(strip_class_vars(*inner))),
        Type::Lambda(params, ret) => Type::Lambda(
            params.into_iter().map(strip_class_vars).collect(),
            Box::new(strip_class_vars(*ret)),
        ),
        other => other,
    }
}

/// The fixed binary operator signature table.
fn binop_signatures(op: BinOp) -> Vec<(Type, Type, Type)> {
    use Type::{Bool, Float, Int};
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Pow => vec![
            (Int, Int, Int),
            (Float, Float, Float),
        ],
        BinOp::Rem => vec![(Int, Int, Int)],
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => vec![
            (Int, Int, Bool),
            (Float, Float, Bool),
        ],
        BinOp::And | BinOp::Or => vec![(Bool, Bool, Bool)],
        // Equality is handled separately: any same-type pair.
        BinOp::Eq | BinOp::Ne => Vec::new(),
    }
}
