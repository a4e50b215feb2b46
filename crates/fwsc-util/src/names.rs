//! Unique-name service.
//!
//! One [`NameGen`] is created per compilation and threaded through the
//! typer and the code generator. Determinism matters: after a fresh
//! generator, compiling the same tree twice must yield byte-identical
//! output, which downstream consumers rely on.

/// Monotonic unique-name generator.
///
/// Two flavors share one counter: `fresh` produces `prefix$N` names for
/// compiler-internal entities (type variables, typed-tree temporaries),
/// `fresh_c` produces `prefix__N` names that are valid C identifiers for
/// everything that lands in the emitted translation unit.
///
/// # Examples
///
/// ```
/// use fwsc_util::NameGen;
///
/// let mut names = NameGen::new();
/// assert_eq!(names.fresh("tmp"), "tmp$0");
/// assert_eq!(names.fresh_c("env"), "env__1");
/// names.reset();
/// assert_eq!(names.fresh("tmp"), "tmp$0");
/// ```
#[derive(Debug, Default)]
pub struct NameGen {
    next: u32,
}

impl NameGen {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    fn bump(&mut self) -> u32 {
        let n = self.next;
        self.next += 1;
        n
    }

    /// Next `prefix$N` name.
    pub fn fresh(&mut self, prefix: &str) -> String {
        format!("{}${}", prefix, self.bump())
    }

    /// Next `prefix__N` name, safe as a C identifier.
    pub fn fresh_c(&mut self, prefix: &str) -> String {
        format!("{}__{}", prefix, self.bump())
    }

    /// Restart numbering. Call between compilations, never during one.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}
