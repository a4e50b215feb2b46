//! The type representation.
//!
//! Ground types, arrays, lambda types and classes are the user-visible
//! part. Three forms exist only inside the checker:
//!
//! - [`Type::Var`]: a unification variable owned by the solver.
//! - [`Type::ClassVar`]: the open form of a class whose membership set
//!   is still being learned; member selections on it accumulate
//!   [`Predicate`]s that are discharged when the class seals.
//! - [`Type::Ref`]: an l-value marker. It never reaches the solver at a
//!   constraint root and is erased on every value read.

use fwsc_util::{define_idx, Span, Symbol};

use crate::hir::ClassId;

define_idx!(
    /// Handle of a unification variable; metadata lives in the solver.
    TyVarId
);

/// A type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Float,
    Bool,
    Str,
    Unit,
    /// `Array[T]`
    Array(Box<Type>),
    /// `(T1, ..., Tn) => R`
    Lambda(Vec<Type>, Box<Type>),
    /// A fully-known class.
    Class(ClassId),
    /// A class still being checked; selections produce predicates.
    ClassVar(ClassId),
    /// A unification variable.
    Var(TyVarId),
    /// A type written as a bare identifier, not yet resolved.
    Named(Symbol),
    /// L-value wrapper: the node it annotates is assignable.
    Ref(Box<Type>),
}

impl Type {
    /// Strip the l-value wrapper, if any.
    pub fn value_ty(&self) -> &Type {
        match self {
            Type::Ref(inner) => inner,
            other => other,
        }
    }

    /// Owned variant of [`Type::value_ty`].
    pub fn into_value(self) -> Type {
        match self {
            Type::Ref(inner) => *inner,
            other => other,
        }
    }

    /// True if any unification variable occurs anywhere in the type.
    pub fn contains_vars(&self) -> bool {
        match self {
            Type::Var(_) => true,
            Type::Array(elem) | Type::Ref(elem) => elem.contains_vars(),
            Type::Lambda(params, ret) => {
                params.iter().any(Type::contains_vars) || ret.contains_vars()
            }
            _ => false,
        }
    }
}

/// A membership requirement discovered through `e.m` on an open class.
#[derive(Debug, Clone)]
pub struct Predicate {
    /// The selected member name.
    pub member: Symbol,
    /// The type the selection was given (a fresh variable).
    pub ty: Type,
    /// Span of the selection, for diagnostics.
    pub span: Span,
}

/// Render a type with caller-supplied naming for classes and variables.
///
/// Both the solver (which knows variable prefixes) and the typed tree
/// (which knows class names) render through this one function so their
/// output stays consistent.
pub fn render_type(
    ty: &Type,
    class_name: &dyn Fn(ClassId) -> String,
    var_name: &dyn Fn(TyVarId) -> String,
) -> String {
    match ty {
        Type::Int => "Int".to_string(),
        Type::Float => "Float".to_string(),
        Type::Bool => "Boolean".to_string(),
        Type::Str => "String".to_string(),
        Type::Unit => "Unit".to_string(),
        Type::Array(elem) => format!("Array[{}]", render_type(elem, class_name, var_name)),
        Type::Lambda(params, ret) => {
            let ret = render_type(ret, class_name, var_name);
            match params.as_slice() {
                [single] if !matches!(single, Type::Lambda(_, _)) => {
                    format!("{} => {}", render_type(single, class_name, var_name), ret)
                }
                _ => {
                    let list: Vec<String> = params
                        .iter()
                        .map(|p| render_type(p, class_name, var_name))
                        .collect();
                    format!("({}) => {}", list.join(", "), ret)
                }
            }
        }
        Type::Class(id) | Type::ClassVar(id) => class_name(*id),
        Type::Var(v) => var_name(*v),
        Type::Named(sym) => sym.as_str().to_string(),
        Type::Ref(inner) => render_type(inner, class_name, var_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_ty_strips_ref() {
        let ty = Type::Ref(Box::new(Type::Int));
        assert_eq!(ty.value_ty(), &Type::Int);
        assert_eq!(Type::Int.value_ty(), &Type::Int);
    }

    #[test]
    fn test_contains_vars() {
        assert!(!Type::Int.contains_vars());
        assert!(Type::Var(TyVarId(0)).contains_vars());
        assert!(Type::Array(Box::new(Type::Var(TyVarId(1)))).contains_vars());
        assert!(
            Type::Lambda(vec![Type::Int], Box::new(Type::Var(TyVarId(2)))).contains_vars()
        );
        assert!(!Type::Lambda(vec![Type::Int], Box::new(Type::Unit)).contains_vars());
    }

    #[test]
    fn test_render_ground() {
        let cn: &dyn Fn(ClassId) -> String = &|c| format!("C{}", c.0);
        let vn: &dyn Fn(TyVarId) -> String = &|v| format!("?{}", v.0);
        assert_eq!(render_type(&Type::Bool, cn, vn), "Boolean");
        assert_eq!(render_type(&Type::Str, cn, vn), "String");
    }

    #[test]
    fn test_render_lambda() {
        let cn: &dyn Fn(ClassId) -> String = &|c| format!("C{}", c.0);
        let vn: &dyn Fn(TyVarId) -> String = &|v| format!("?{}", v.0);
        let unary = Type::Lambda(vec![Type::Int], Box::new(Type::Int));
        assert_eq!(render_type(&unary, cn, vn), "Int => Int");
        let binary = Type::Lambda(vec![Type::Int, Type::Float], Box::new(Type::Bool));
        assert_eq!(render_type(&binary, cn, vn), "(Int, Float) => Boolean");
        let nullary = Type::Lambda(vec![], Box::new(Type::Unit));
        assert_eq!(render_type(&nullary, cn, vn), "() => Unit");
    }

    #[test]
    fn test_render_ref_is_transparent() {
        let cn: &dyn Fn(ClassId) -> String = &|c| format!("C{}", c.0);
        let vn: &dyn Fn(TyVarId) -> String = &|v| format!("?{}", v.0);
        let ty = Type::Ref(Box::new(Type::Array(Box::new(Type::Int))));
        assert_eq!(render_type(&ty, cn, vn), "Array[Int]");
    }
}
