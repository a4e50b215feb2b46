//! Symbols and lexically nested scopes.
//!
//! Symbols live in one arena ([`SymbolTable`]) and are referenced by
//! [`SymbolId`] handles everywhere else: the typed tree stores handles,
//! and the mutable *dealias* slot on each symbol records what the symbol
//! currently resolves to. During recursive typing a symbol starts as a
//! [`Dealias::Placeholder`] carrying a provisional type and is flipped to
//! its final definition once the binding's body has been checked.
//!
//! Scope frames are insertion-ordered maps stacked innermost-last;
//! `find` walks outward, `find_here` consults only the top frame.

use fwsc_util::{define_idx, IndexVec, Span, Symbol};
use indexmap::IndexMap;

use crate::hir::{ClassId, DefId};
use crate::types::Type;

define_idx!(
    /// Handle into the symbol arena.
    SymbolId
);

/// The ground functions every program can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    ReadInt,
    ReadFloat,
    PrintlnInt,
    PrintlnFloat,
    Printf,
}

impl Primitive {
    pub const ALL: [Primitive; 5] = [
        Primitive::ReadInt,
        Primitive::ReadFloat,
        Primitive::PrintlnInt,
        Primitive::PrintlnFloat,
        Primitive::Printf,
    ];

    /// Source-level name.
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::ReadInt => "readInt",
            Primitive::ReadFloat => "readFloat",
            Primitive::PrintlnInt => "printlnInt",
            Primitive::PrintlnFloat => "printlnFloat",
            Primitive::Printf => "printf",
        }
    }

    /// Declared type. `printf` is variadic beyond its format string; the
    /// typer special-cases its applications.
    pub fn ty(&self) -> Type {
        match self {
            Primitive::ReadInt => Type::Lambda(vec![], Box::new(Type::Int)),
            Primitive::ReadFloat => Type::Lambda(vec![], Box::new(Type::Float)),
            Primitive::PrintlnInt => Type::Lambda(vec![Type::Int], Box::new(Type::Unit)),
            Primitive::PrintlnFloat => Type::Lambda(vec![Type::Float], Box::new(Type::Unit)),
            Primitive::Printf => Type::Lambda(vec![Type::Str], Box::new(Type::Unit)),
        }
    }
}

/// What a symbol currently resolves to.
#[derive(Debug, Clone)]
pub enum Dealias {
    /// A pre-declared binding whose body has not been checked yet; the
    /// type is a fresh `X` variable or the user's ascription.
    Placeholder { ty: Type },
    /// A checked local (or top-level) definition.
    Def(DefId),
    /// A class member slot.
    Member { class: ClassId, index: usize },
    /// A lambda or constructor parameter.
    Param { ty: Type },
    /// A class name.
    Class(ClassId),
    /// A built-in ground function.
    Primitive(Primitive),
}

/// One symbol: name, dealias slot, declaration site, mutability, and the
/// index of the scope frame it was declared in (used for free-name
/// tracking).
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub name: Symbol,
    pub dealias: Dealias,
    pub span: Span,
    pub mutable: bool,
    pub depth: usize,
}

/// Arena of symbols plus the stack of scope frames.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: IndexVec<SymbolId, SymbolInfo>,
    frames: Vec<IndexMap<Symbol, SymbolId>>,
}

impl SymbolTable {
    /// A fresh table with a single root frame (the prelude lives there).
    pub fn new() -> Self {
        Self {
            symbols: IndexVec::new(),
            frames: vec![IndexMap::new()],
        }
    }

    /// Number of frames currently on the stack.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a new innermost frame.
    pub fn enter_scope(&mut self) {
        self.frames.push(IndexMap::new());
    }

    /// Pop the innermost frame. Symbols declared in it stay in the arena
    /// and remain reachable through handles.
    pub fn exit_scope(&mut self) {
        debug_assert!(self.frames.len() > 1, "cannot exit the root scope");
        self.frames.pop();
    }

    /// Declare a symbol in the innermost frame.
    pub fn add(&mut self, name: Symbol, dealias: Dealias, span: Span, mutable: bool) -> SymbolId {
        let depth = self.frames.len() - 1;
        let id = self.symbols.push(SymbolInfo {
            name,
            dealias,
            span,
            mutable,
            depth,
        });
        self.frames
            .last_mut()
            .expect("at least the root frame")
            .insert(name, id);
        id
    }

    /// Look a name up in the innermost frame only.
    pub fn find_here(&self, name: Symbol) -> Option<SymbolId> {
        self.frames
            .last()
            .and_then(|frame| frame.get(&name))
            .copied()
    }

    /// Look a name up walking outward through all frames.
    pub fn find(&self, name: Symbol) -> Option<SymbolId> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(&name))
            .copied()
    }

    pub fn info(&self, id: SymbolId) -> &SymbolInfo {
        &self.symbols[id]
    }

    /// Flip a symbol's dealias slot (placeholder → final definition).
    pub fn set_dealias(&mut self, id: SymbolId, dealias: Dealias) {
        self.symbols[id].dealias = dealias;
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
