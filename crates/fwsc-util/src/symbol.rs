//! String interning.
//!
//! A [`Symbol`] is a compact (4-byte) handle to a string stored in a
//! process-global table, giving O(1) equality and hashing for the
//! identifiers a compiler shuffles around by the thousand. Strings are
//! leaked into the table and never removed; the set of distinct
//! identifiers in a compilation is small and bounded.

use std::fmt;
use std::sync::{Mutex, OnceLock};

use rustc_hash::FxHashMap;

/// An interned string identifier.
///
/// # Examples
///
/// ```
/// use fwsc_util::Symbol;
///
/// let a = Symbol::intern("main");
/// let b = Symbol::intern("main");
/// let c = Symbol::intern("fact");
///
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// assert_eq!(a.as_str(), "main");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    /// Index into the global string table.
    index: u32,
}

struct Interner {
    index: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

fn interner() -> &'static Mutex<Interner> {
    static INTERNER: OnceLock<Mutex<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| {
        Mutex::new(Interner {
            index: FxHashMap::default(),
            strings: Vec::new(),
        })
    })
}

impl Symbol {
    /// Intern a string, returning its symbol.
    ///
    /// Thread-safe; interning the same string twice returns the same
    /// symbol.
    pub fn intern(string: &str) -> Self {
        let mut table = interner().lock().expect("interner poisoned");
        if let Some(&index) = table.index.get(string) {
            return Symbol { index };
        }
        // Leak to get a 'static str; entries are never removed.
        let owned: &'static str = Box::leak(string.to_string().into_boxed_str());
        let index = table.strings.len() as u32;
        table.strings.push(owned);
        table.index.insert(owned, index);
        Symbol { index }
    }

    /// The string this symbol stands for.
    pub fn as_str(&self) -> &'static str {
        let table = interner().lock().expect("interner poisoned");
        table.strings[self.index as usize]
    }

    /// Raw index value, for debugging.
    pub fn as_u32(&self) -> u32 {
        self.index
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
