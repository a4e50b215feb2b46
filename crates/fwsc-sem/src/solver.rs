//! The constraint solver.
//!
//! Equality constraints accumulate in a queue during a typing traversal
//! and are discharged by [`Solver::solve`], a standard unification with
//! an occurs check. Bindings go into a substitution vector; chains are
//! followed on resolution, so earlier constraints never need rewriting.
//!
//! Variable metadata (prefix and origin span) exists purely for
//! diagnostics: `T`-prefixed variables come from expressions,
//! `X`-prefixed ones from forward-declared recursive bindings.

use std::collections::VecDeque;

use fwsc_util::{IndexVec, Idx, Span, Symbol};

use crate::error::{Result, TypeError};
use crate::hir::ClassId;
use crate::types::{render_type, Type, TyVarId};

/// Diagnostic metadata for one unification variable.
#[derive(Debug, Clone)]
pub struct VarInfo {
    /// `"T"` for expression variables, `"X"` for recursive bindings.
    pub prefix: &'static str,
    /// Where the variable was introduced.
    pub origin: Span,
}

/// An equality constraint between two types.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub lhs: Type,
    pub rhs: Type,
    /// Where the constraint arose.
    pub span: Span,
    /// Optional span of the left-hand side's source.
    pub lhs_span: Option<Span>,
    /// Optional span of the right-hand side's source.
    pub rhs_span: Option<Span>,
}

/// Accumulates and solves equality constraints.
pub struct Solver {
    vars: IndexVec<TyVarId, VarInfo>,
    subst: IndexVec<TyVarId, Option<Type>>,
    queue: VecDeque<Constraint>,
    /// Class names for error rendering, filled once declarations are
    /// collected.
    class_names: Vec<Symbol>,
}

impl Solver {
    pub fn new() -> Self {
        Self {
            vars: IndexVec::new(),
            subst: IndexVec::new(),
            queue: VecDeque::new(),
            class_names: Vec::new(),
        }
    }

    /// Register class names so mismatch messages can print them.
    pub fn set_class_names(&mut self, names: Vec<Symbol>) {
        self.class_names = names;
    }

    /// Fresh `T`-prefixed variable for an expression position.
    pub fn fresh_expr_var(&mut self, origin: Span) -> TyVarId {
        self.fresh("T", origin)
    }

    /// Fresh `X`-prefixed variable for a forward-declared binding.
    pub fn fresh_decl_var(&mut self, origin: Span) -> TyVarId {
        self.fresh("X", origin)
    }

    fn fresh(&mut self, prefix: &'static str, origin: Span) -> TyVarId {
        self.subst.push(None);
        self.vars.push(VarInfo { prefix, origin })
    }

    /// Diagnostic name of a variable, e.g. `X$3`.
    pub fn var_name(&self, var: TyVarId) -> String {
        format!("{}${}", self.vars[var].prefix, var.0)
    }

    /// Origin span of a variable.
    pub fn var_origin(&self, var: TyVarId) -> Span {
        self.vars[var].origin
    }

    /// Record an equality constraint.
    ///
    /// Callers strip the `Ref` wrapper before queueing; l-value-ness is
    /// tracked syntactically, never through the solver.
    pub fn add_equality(
        &mut self,
        lhs: Type,
        rhs: Type,
        span: Span,
        lhs_span: Option<Span>,
        rhs_span: Option<Span>,
    ) {
        debug_assert!(!matches!(lhs, Type::Ref(_)) && !matches!(rhs, Type::Ref(_)));
        self.queue.push_back(Constraint {
            lhs,
            rhs,
            span,
            lhs_span,
            rhs_span,
        });
    }

    /// Solve all queued constraints.
    pub fn solve(&mut self) -> Result<()> {
        while let Some(constraint) = self.queue.pop_front() {
            let (lhs, rhs) = (constraint.lhs.clone(), constraint.rhs.clone());
            self.unify(&lhs, &rhs, &constraint)?;
        }
        Ok(())
    }

    /// Follow the substitution chain at the root of a type.
    pub fn shallow_resolve(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        while let Type::Var(v) = current {
            match &self.subst[v] {
                Some(next) => current = next.clone(),
                None => return Type::Var(v),
            }
        }
        current
    }

    /// Replace every variable in `ty` by its solution.
    ///
    /// Returns `Err(var)` carrying the first still-open variable, or
    /// `Ok` with the fully substituted type.
    pub fn substitute(&self, ty: &Type) -> std::result::Result<Type, TyVarId> {
        match ty {
            Type::Var(v) => match &self.subst[*v] {
                Some(next) => self.substitute(next),
                None => Err(*v),
            },
            Type::Array(elem) => Ok(Type::Array(Box::new(self.substitute(elem)?))),
            Type::Ref(inner) => Ok(Type::Ref(Box::new(self.substitute(inner)?))),
            Type::Lambda(params, ret) => {
                let params = params
                    .iter()
                    .map(|p| self.substitute(p))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Type::Lambda(params, Box::new(self.substitute(ret)?)))
            }
            other => Ok(other.clone()),
        }
    }

    fn unify(&mut self, lhs: &Type, rhs: &Type, constraint: &Constraint) -> Result<()> {
        let lhs = self.shallow_resolve(lhs);
        let rhs = self.shallow_resolve(rhs);

        match (&lhs, &rhs) {
            (Type::Var(a), Type::Var(b)) if a == b => Ok(()),
            (Type::Var(v), other) | (other, Type::Var(v)) => {
                if self.occurs(*v, other) {
                    return Err(TypeError::new(
                        format!(
                            "infinite type: `{}` occurs in `{}`",
                            self.var_name(*v),
                            self.show(other)
                        ),
                        constraint.span,
                    ));
                }
                self.subst[*v] = Some(other.clone());
                Ok(())
            }

            (Type::Int, Type::Int)
            | (Type::Float, Type::Float)
            | (Type::Bool, Type::Bool)
            | (Type::Str, Type::Str)
            | (Type::Unit, Type::Unit) => Ok(()),

            (Type::Array(a), Type::Array(b)) => self.unify(a, b, constraint),

            (Type::Lambda(p1, r1), Type::Lambda(p2, r2)) => {
                if p1.len() != p2.len() {
                    return Err(self.mismatch(&lhs, &rhs, constraint));
                }
                self.unify(r1, r2, constraint)?;
                for (a, b) in p1.iter().zip(p2.iter()) {
                    self.unify(a, b, constraint)?;
                }
                Ok(())
            }

            (Type::Ref(a), Type::Ref(b)) => self.unify(a, b, constraint),

            // Classes are nominal: equal iff the same definition.
            (Type::Class(a), Type::Class(b))
            | (Type::ClassVar(a), Type::Class(b))
            | (Type::Class(a), Type::ClassVar(b))
            | (Type::ClassVar(a), Type::ClassVar(b)) => {
                if a == b {
                    Ok(())
                } else {
                    Err(self.mismatch(&lhs, &rhs, constraint))
                }
            }

            (Type::Named(_), _) | (_, Type::Named(_)) => Err(TypeError::new(
                "internal: unresolved type name reached the solver",
                constraint.span,
            )),

            _ => Err(self.mismatch(&lhs, &rhs, constraint)),
        }
    }

    /// Occurs check, iterative to survive deeply nested types.
    fn occurs(&self, var: TyVarId, ty: &Type) -> bool {
        let mut stack = vec![ty.clone()];
        while let Some(current) = stack.pop() {
            match current {
                Type::Var(v) => {
                    if v == var {
                        return true;
                    }
                    if let Some(next) = &self.subst[v] {
                        stack.push(next.clone());
                    }
                }
                Type::Array(elem) | Type::Ref(elem) => stack.push(*elem),
                Type::Lambda(params, ret) => {
                    stack.extend(params);
                    stack.push(*ret);
                }
                _ => {}
            }
        }
        false
    }

    fn mismatch(&self, lhs: &Type, rhs: &Type, constraint: &Constraint) -> TypeError {
        let mut sub_spans = Vec::new();
        if let Some(s) = constraint.lhs_span {
            sub_spans.push(s);
        }
        if let Some(s) = constraint.rhs_span {
            sub_spans.push(s);
        }
        TypeError::new(
            format!(
                "type mismatch: expected `{}`, found `{}`",
                self.show(lhs),
                self.show(rhs)
            ),
            constraint.span,
        )
        .with_sub_spans(sub_spans)
    }

    /// Render a type for solver error messages.
    pub fn show(&self, ty: &Type) -> String {
        let class_name = |c: ClassId| {
            self.class_names
                .get(c.index())
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| format!("<class {}>", c.0))
        };
        let var_name = |v: TyVarId| self.var_name(v);
        render_type(ty, &class_name, &var_name)
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwsc_util::Idx;

    fn eq(solver: &mut Solver, lhs: Type, rhs: Type) {
        solver.add_equality(lhs, rhs, Span::DUMMY, None, None);
    }

    #[test]
    fn test_unify_ground() {
        let mut solver = Solver::new();
        eq(&mut solver, Type::Int, Type::Int);
        eq(&mut solver, Type::Bool, Type::Bool);
        assert!(solver.solve().is_ok());
    }

    #[test]
    fn test_unify_ground_mismatch() {
        let mut solver = Solver::new();
        eq(&mut solver, Type::Int, Type::Float);
        let err = solver.solve().unwrap_err();
        assert!(err.message.contains("type mismatch"));
        assert!(err.message.contains("Int"));
        assert!(err.message.contains("Float"));
    }

    #[test]
    fn test_bind_variable() {
        let mut solver = Solver::new();
        let v = solver.fresh_expr_var(Span::DUMMY);
        eq(&mut solver, Type::Var(v), Type::Int);
        solver.solve().unwrap();
        assert_eq!(solver.substitute(&Type::Var(v)), Ok(Type::Int));
    }

    #[test]
    fn test_substitution_chain() {
        let mut solver = Solver::new();
        let a = solver.fresh_expr_var(Span::DUMMY);
        let b = solver.fresh_expr_var(Span::DUMMY);
        eq(&mut solver, Type::Var(a), Type::Var(b));
        eq(&mut solver, Type::Var(b), Type::Float);
        solver.solve().unwrap();
        assert_eq!(solver.substitute(&Type::Var(a)), Ok(Type::Float));
    }

    #[test]
    fn test_substitute_reports_open_var() {
        let mut solver = Solver::new();
        let v = solver.fresh_decl_var(Span::DUMMY);
        assert_eq!(solver.substitute(&Type::Var(v)), Err(v));
        assert_eq!(
            solver.substitute(&Type::Array(Box::new(Type::Var(v)))),
            Err(v)
        );
    }

    #[test]
    fn test_lambda_decomposition() {
        let mut solver = Solver::new();
        let v = solver.fresh_expr_var(Span::DUMMY);
        eq(
            &mut solver,
            Type::Lambda(vec![Type::Int], Box::new(Type::Var(v))),
            Type::Lambda(vec![Type::Int], Box::new(Type::Bool)),
        );
        solver.solve().unwrap();
        assert_eq!(solver.substitute(&Type::Var(v)), Ok(Type::Bool));
    }

    #[test]
    fn test_lambda_arity_mismatch() {
        let mut solver = Solver::new();
        eq(
            &mut solver,
            Type::Lambda(vec![Type::Int], Box::new(Type::Int)),
            Type::Lambda(vec![Type::Int, Type::Int], Box::new(Type::Int)),
        );
        assert!(solver.solve().is_err());
    }

    #[test]
    fn test_occurs_check() {
        let mut solver = Solver::new();
        let v = solver.fresh_expr_var(Span::DUMMY);
        eq(
            &mut solver,
            Type::Var(v),
            Type::Lambda(vec![Type::Var(v)], Box::new(Type::Int)),
        );
        let err = solver.solve().unwrap_err();
        assert!(err.message.contains("infinite type"));
    }

    #[test]
    fn test_array_decomposition() {
        let mut solver = Solver::new();
        let v = solver.fresh_expr_var(Span::DUMMY);
        eq(
            &mut solver,
            Type::Array(Box::new(Type::Var(v))),
            Type::Array(Box::new(Type::Int)),
        );
        solver.solve().unwrap();
        assert_eq!(solver.substitute(&Type::Var(v)), Ok(Type::Int));
    }

    #[test]
    fn test_class_nominal_equality() {
        let mut solver = Solver::new();
        solver.set_class_names(vec![Symbol::intern("A"), Symbol::intern("B")]);
        eq(
            &mut solver,
            Type::Class(ClassId::from_usize(0)),
            Type::Class(ClassId::from_usize(0)),
        );
        solver.solve().unwrap();

        eq(
            &mut solver,
            Type::Class(ClassId::from_usize(0)),
            Type::Class(ClassId::from_usize(1)),
        );
        let err = solver.solve().unwrap_err();
        assert!(err.message.contains('A'));
        assert!(err.message.contains('B'));
    }

    #[test]
    fn test_class_var_unifies_with_same_class() {
        let mut solver = Solver::new();
        eq(
            &mut solver,
            Type::ClassVar(ClassId::from_usize(0)),
            Type::Class(ClassId::from_usize(0)),
        );
        solver.solve().unwrap();
    }

    #[test]
    fn test_var_names() {
        let mut solver = Solver::new();
        let t = solver.fresh_expr_var(Span::DUMMY);
        let x = solver.fresh_decl_var(Span::DUMMY);
        assert_eq!(solver.var_name(t), "T$0");
        assert_eq!(solver.var_name(x), "X$1");
    }
}
