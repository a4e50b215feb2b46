//! fwsc-util - Core Utilities and Foundation Types
//!
//! Foundation types shared by every phase of the fwsc compiler:
//!
//! - [`Span`] / [`SourceMap`]: byte-accurate source locations and the file
//!   table diagnostics are rendered against.
//! - [`Symbol`]: 4-byte interned string handles with O(1) comparison.
//! - [`IndexVec`] / [`Idx`] / [`define_idx!`]: typed index spaces so that
//!   expression handles, definition handles and symbol handles cannot be
//!   mixed up.
//! - [`diagnostic`]: error levels and the annotated-source-line renderer
//!   used by the driver.
//! - [`NameGen`]: the unique-name service threaded through the typer and
//!   the code generator. Resettable per compilation so that compiling the
//!   same tree twice yields byte-identical output.
//!
//! None of these types know anything about the source language; they are
//! deliberately the bottom of the crate graph.

pub mod diagnostic;
mod index_vec;
mod names;
mod span;
mod symbol;

pub use index_vec::{Idx, IndexVec};
pub use names::NameGen;
pub use span::{FileId, SourceFile, SourceMap, Span};
pub use symbol::Symbol;

// Re-export the hash types the rest of the workspace uses.
pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
