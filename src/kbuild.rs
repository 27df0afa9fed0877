//! The `Kbuild` evaluation context (spec section 5): one condition
//! algebra instance plus one variable store, scoped to exactly one
//! directory. A fresh `Kbuild` is built for each directory visited and
//! discarded once that directory's artifacts are collected — nothing
//! here is meant to outlive a single `collect::collect_directory` call.
//!
//! Grounded on `alg.py`'s `Kbuild` class, which bundles the same two
//! pieces (its BDD/ZSolver pair and `self.variables`) per directory.

use std::collections::HashSet;

use crate::condition::Registry;
use crate::store::Store;

pub struct Kbuild {
    pub registry: Registry,
    pub store: Store,
    /// Variable names currently being expanded, so a variable that
    /// references itself (directly or through a chain of `+=`/recursive
    /// definitions) is caught instead of overflowing the stack the way
    /// `make` itself only catches by erroring out eagerly.
    pub(crate) expanding: HashSet<String>,
    /// Names that have already been reported as undefined (`alg.py`'s
    /// `undefined_variables`, spec 4.4). Once a name lands here, reading
    /// it again returns its sentinel `$(name)` text verbatim instead of
    /// re-warning or re-parsing it as if it were ordinary recursive text.
    pub(crate) undefined: HashSet<String>,
    /// Spec 4.4/6's `do_boolean_configs` knob: when true, `CONFIG_*`
    /// expands to a two-valued (`y`/undefined) multiverse; when false
    /// (the default, matching Kconfig's own tristate symbols), to the
    /// three-valued `y`/`m`/undefined form.
    pub do_boolean_configs: bool,
}

impl Kbuild {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            store: Store::new(),
            expanding: HashSet::new(),
            undefined: HashSet::new(),
            do_boolean_configs: false,
        }
    }

    pub fn with_boolean_configs(mut self, do_boolean_configs: bool) -> Self {
        self.do_boolean_configs = do_boolean_configs;
        self
    }

    /// A human-readable dump of every variable's multiverse, standing in
    /// for the original's `getSymbTable` debug helper and backing the
    /// CLI's `--table` flag.
    pub fn symbol_table(&self) -> String {
        let mut names: Vec<&String> = self.store.names().collect();
        names.sort();
        let mut out = String::new();
        for name in names {
            let entry = match self.store.get(name) {
                Some(e) => e,
                None => continue,
            };
            out.push_str(name);
            out.push('\n');
            for def in entry.multiverse.iter() {
                let cond_str = self
                    .registry
                    .to_dnf_string(&def.cond)
                    .unwrap_or_else(|_| "?".to_string());
                let value_str = def.value.as_deref().unwrap_or("<undefined>");
                out.push_str(&format!("  [{cond_str}] = {value_str}\n"));
            }
        }
        out
    }
}

impl Default for Kbuild {
    fn default() -> Self {
        Self::new()
    }
}
