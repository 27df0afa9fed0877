//! The artifact inventory produced by collecting one directory (spec
//! 4.7's "Results"), grounded on `alg.py`'s `datastructures.Results`.

use std::collections::HashMap;

use crate::condition::Condition;

#[derive(Debug, Default)]
pub struct Results {
    pub compilation_units: Vec<String>,
    pub library_units: Vec<String>,
    pub composites: Vec<String>,
    pub hostprog_units: Vec<String>,
    /// `<name>.o` host-program targets that are themselves composites
    /// (have a matching `<name>-objs`). Spec Open Question (c): the
    /// original hard-errors when this set is non-empty rather than
    /// resolving it; this crate surfaces that as
    /// [`crate::error::Error::HostProgComposite`] instead of silently
    /// dropping the unit, so this set is always empty by the time a
    /// directory finishes collecting successfully, but the field stays
    /// so the aggregate shape matches spec 3 exactly.
    pub hostprog_composites: Vec<String>,
    pub clean_files: Vec<String>,
    pub subdirs: Vec<String>,
    /// Units found only via `obj-$(...)`/`lib-$(...)`/`hostprogs-$(...)`-
    /// shaped variable names whose `$(...)` fragment this evaluator could
    /// not statically resolve to a literal `-y`/`-m` suffix (spec 4.8
    /// step 6) — i.e. units whose configurability is itself unknown,
    /// not units that happen to always build.
    pub unconfigurable_units: Vec<String>,
    pub presence_conditions: HashMap<String, Condition>,
}

impl Results {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or extend) the presence condition under which `name` was
    /// reached. A name seen from more than one seed or composite chain
    /// is reachable under the disjunction of every path that found it.
    pub fn add_presence(&mut self, name: String, cond: Condition) {
        match self.presence_conditions.remove(&name) {
            Some(existing) => {
                self.presence_conditions.insert(name, existing.or(&cond));
            }
            None => {
                self.presence_conditions.insert(name, cond);
            }
        }
    }

    pub fn dedup(&mut self) {
        for list in [
            &mut self.compilation_units,
            &mut self.library_units,
            &mut self.composites,
            &mut self.hostprog_units,
            &mut self.hostprog_composites,
            &mut self.clean_files,
            &mut self.subdirs,
        ] {
            list.sort();
            list.dedup();
        }
    }
}
