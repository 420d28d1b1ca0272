use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::builtins;
use crate::function::Function;

/// Builtins keyed by uppercase name; aliases point at the same instance.
static REG: Lazy<FxHashMap<String, Arc<dyn Function>>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    for f in builtins::all() {
        for alias in f.aliases() {
            map.insert(alias.to_ascii_uppercase(), Arc::clone(&f));
        }
        map.insert(f.name().to_ascii_uppercase(), f);
    }
    map
});

/// Case-insensitive lookup. An `_xlfn.` prefix (as written by spreadsheet
/// files for newer functions) is ignored.
pub fn get(name: &str) -> Option<Arc<dyn Function>> {
    let upper = name.to_ascii_uppercase();
    let key = upper.strip_prefix("_XLFN.").unwrap_or(&upper);
    REG.get(key).map(Arc::clone)
}

/// Every registered canonical name, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REG.values().map(|f| f.name()).collect();
    names.sort_unstable();
    names.dedup();
    names
}
