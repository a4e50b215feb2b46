//! The typed tree.
//!
//! Typed nodes live in arenas inside [`Hir`] and reference each other by
//! handle (`ExprId`, `DefId`, `ClassId`); symbols point back into the
//! tree through their dealias slots. The handle representation keeps the
//! symbol ↔ tree reference cycle trivially safe and lets the typing
//! frames revisit every in-flight node during force-instantiation.

use fwsc_util::{define_idx, IndexVec, Span, Symbol};

use crate::scope::{SymbolId, SymbolTable};
use crate::types::{render_type, Type};

define_idx!(
    /// Handle of a typed expression.
    ExprId
);
define_idx!(
    /// Handle of a typed local (or top-level) definition.
    DefId
);
define_idx!(
    /// Handle of a class.
    ClassId
);

/// A typed expression: kind, inferred type, source span.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StrLit(Symbol),
    /// A resolved identifier.
    Var(SymbolId),
    /// `recv.member` on a class instance.
    Select { recv: ExprId, member: Symbol },
    /// `arr(i)`: array indexing, an l-value.
    Index { arr: ExprId, index: ExprId },
    /// `f(args)` on a lambda-typed callee (or a primitive).
    Call { callee: ExprId, args: Vec<ExprId> },
    Binary {
        op: fwsc_par::BinOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Unary {
        op: fwsc_par::UnOp,
        operand: ExprId,
    },
    If {
        cond: ExprId,
        then_arm: ExprId,
        else_arm: ExprId,
    },
    While { cond: ExprId, body: ExprId },
    Block {
        defs: Vec<DefId>,
        tail: Option<ExprId>,
    },
    Lambda {
        params: Vec<SymbolId>,
        body: ExprId,
        /// Symbols referenced in the body that resolve outside the
        /// lambda's parameters and body-local bindings.
        free: Vec<SymbolId>,
    },
    New { class: ClassId, args: Vec<ExprId> },
    /// `[n]`: allocate an array of `n` elements.
    ArrayAlloc { len: ExprId },
}

/// A typed block item.
#[derive(Debug, Clone)]
pub struct LocalDef {
    pub kind: DefKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum DefKind {
    Bind {
        sym: SymbolId,
        mutable: bool,
        body: ExprId,
    },
    Assign { target: ExprId, value: ExprId },
    Eval(ExprId),
}

/// A constructor parameter (annotation required, so the type is known
/// before the class body is checked).
#[derive(Debug, Clone)]
pub struct CtorParam {
    pub name: Symbol,
    pub ty: Type,
    pub span: Span,
}

/// A class member slot. `body` is filled when the member is checked;
/// until then the slot only carries its declared or provisional type.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: Symbol,
    pub mutable: bool,
    pub ty: Type,
    pub body: Option<ExprId>,
    pub span: Span,
}

/// A class definition.
#[derive(Debug, Clone)]
pub struct ClassItem {
    pub name: Symbol,
    pub span: Span,
    pub params: Vec<CtorParam>,
    /// Parameter symbols, filled when the class body is checked.
    pub param_syms: Vec<SymbolId>,
    pub members: Vec<Member>,
    /// False while the class is being checked; selections on unsealed
    /// classes go through the predicate machinery.
    pub sealed: bool,
}

impl ClassItem {
    /// Find a member by name.
    pub fn member(&self, name: Symbol) -> Option<(usize, &Member)> {
        self.members
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
    }
}

/// How the emitted program starts.
#[derive(Debug, Clone, Copy)]
pub enum Entry {
    /// A top-level `val main: () => Unit`.
    TopLevel(SymbolId),
    /// Member `main` of a parameterless class `Main`.
    MainClass(ClassId),
}

/// Top-level structure of a checked program.
#[derive(Debug)]
pub struct Module {
    /// Top-level bindings in order, one recursive group.
    pub top_defs: Vec<DefId>,
    /// Classes in declaration order.
    pub class_order: Vec<ClassId>,
    pub entry: Entry,
}

/// The arenas every typed node lives in.
#[derive(Debug, Default)]
pub struct Hir {
    pub exprs: IndexVec<ExprId, Expr>,
    pub defs: IndexVec<DefId, LocalDef>,
    pub classes: IndexVec<ClassId, ClassItem>,
    pub symbols: SymbolTable,
}

impl Hir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id]
    }

    pub fn def(&self, id: DefId) -> &LocalDef {
        &self.defs[id]
    }

    pub fn class(&self, id: ClassId) -> &ClassItem {
        &self.classes[id]
    }

    /// The type a symbol currently resolves to, through its dealias slot.
    pub fn symbol_type(&self, sym: SymbolId) -> Type {
        use crate::scope::Dealias;
        match &self.symbols.info(sym).dealias {
            Dealias::Placeholder { ty } | Dealias::Param { ty } => ty.clone(),
            Dealias::Def(def) => match &self.defs[*def].kind {
                DefKind::Bind { body, .. } => self.exprs[*body].ty.value_ty().clone(),
                _ => Type::Unit,
            },
            Dealias::Member { class, index } => self.classes[*class].members[*index].ty.clone(),
            Dealias::Class(class) => Type::Class(*class),
            Dealias::Primitive(prim) => prim.ty(),
        }
    }

    /// Render a type with class names filled in. Unsolved variables
    /// render as `?N`; after checking completes none remain.
    pub fn display_type(&self, ty: &Type) -> String {
        let class_name = |c: ClassId| self.classes[c].name.as_str().to_string();
        let var_name = |v: crate::types::TyVarId| format!("?{}", v.0);
        render_type(ty, &class_name, &var_name)
    }
}
