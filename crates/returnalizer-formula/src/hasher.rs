use rustc_hash::FxHasher;
use std::hash::Hasher;

/// Deterministic hasher for structural AST fingerprints.
///
/// Fingerprints key the interpreter's sub-expression cache, so they must be
/// stable across runs; `FxHasher` has no random seed.
#[derive(Default)]
pub(crate) struct FormulaHasher {
    inner: FxHasher,
}

impl FormulaHasher {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Hasher for FormulaHasher {
    fn finish(&self) -> u64 {
        self.inner.finish()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.inner.write(bytes);
    }
}
