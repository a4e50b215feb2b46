//! fwsc-sem - Type Checking with Constraint-Based Inference
//!
//! The first half of the compiler's middle end: turns the untyped AST
//! into a typed tree, inferring types Hindley-Milner style.
//!
//! ```text
//! ast::Program
//!      │
//!      ▼
//!  [Typer]  ──  traversal; emits equality constraints
//!      │              │
//!      │              ▼
//!      │         [Solver]  ──  unification + occurs check
//!      │              │
//!      ▼              ▼
//!  Hir (typed arena)  substitution
//! ```
//!
//! Key moving parts:
//!
//! - **Scope stack with dealias slots** ([`scope`]): symbols resolve
//!   through a mutable slot that flips from placeholder to final
//!   definition during recursive typing.
//! - **Typing frames** ([`typer`]): every typed node is recorded in the
//!   frame of its lexical level; closing a recursive group runs the
//!   solver and *force-instantiates* the whole frame.
//! - **Open classes** ([`types::Predicate`]): while a class is being
//!   checked, selections on its instances accumulate membership
//!   predicates that are discharged when the class seals.
//! - **L-values**: mutable bindings, mutable members and array elements
//!   type as [`types::Type::Ref`], an internal marker the code
//!   generator erases.
//!
//! A single [`error::TypeError`] aborts the pass; the driver renders it
//! against the source map.

pub mod error;
pub mod hir;
pub mod scope;
pub mod solver;
pub mod typer;
pub mod types;

pub use error::{Result, TypeError};
pub use hir::{ClassId, DefId, Entry, ExprId, Hir, Module};
pub use scope::{Dealias, Primitive, SymbolId, SymbolTable};
pub use solver::Solver;
pub use typer::type_check;
pub use types::{Predicate, TyVarId, Type};
