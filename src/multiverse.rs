//! The multiverse: a condition-indexed set of possible values (spec 4.3).
//!
//! Grounded on `alg.py`'s `Multiverse`/`CondDef` pair and its `hoist`
//! helper, which every multi-valued primitive (variable expansion,
//! function application, statement interpretation) in that file routes
//! through whenever it combines more than one condition-indexed input.

use crate::condition::Condition;

/// One `(condition, value)` pair. `value: None` represents "undefined
/// under this condition" (spec 3, "Undefined value").
#[derive(Clone, Debug)]
pub struct CondDef {
    pub cond: Condition,
    pub value: Option<String>,
}

/// A set of `CondDef`s describing every value a variable or expression
/// may take, keyed by the condition under which it takes that value.
/// Entries are never allowed to carry an unsatisfiable condition (spec
/// 4.3's "C5: never add a pair whose condition is F").
#[derive(Clone, Debug, Default)]
pub struct Multiverse {
    pub entries: Vec<CondDef>,
}

impl Multiverse {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn single(cond: Condition, value: Option<String>) -> Self {
        let mut mv = Self::new();
        mv.push(cond, value);
        mv
    }

    /// Add an entry, dropping it silently if its condition is already
    /// unsatisfiable.
    pub fn push(&mut self, cond: Condition, value: Option<String>) {
        if cond.is_false() {
            return;
        }
        self.entries.push(CondDef { cond, value });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CondDef> {
        self.entries.iter()
    }

    /// Merge entries that carry the same value by disjoining their
    /// conditions (`alg.py`'s `join_values`), so the multiverse stays as
    /// small as the underlying BDDs allow instead of growing with every
    /// branch point visited.
    pub fn join_values(&self) -> Self {
        let mut out: Vec<CondDef> = Vec::new();
        'entries: for entry in &self.entries {
            for existing in out.iter_mut() {
                if existing.value == entry.value {
                    existing.cond = existing.cond.or(&entry.cond);
                    continue 'entries;
                }
            }
            out.push(entry.clone());
        }
        Self { entries: out }
    }

    /// Conjoin `outer` onto every entry's condition, for when a
    /// multiverse built in one scope (e.g. inside an `ifeq` branch) is
    /// folded back into the enclosing one.
    pub fn scoped(&self, outer: &Condition) -> Self {
        let mut mv = Self::new();
        for entry in &self.entries {
            mv.push(outer.and(&entry.cond), entry.value.clone());
        }
        mv
    }
}

/// Lift a combining function pointwise over any number of multiverses
/// (`alg.py`'s `hoist`). Every reachable combination of entries, one per
/// input multiverse, is combined under the conjunction of their
/// conditions; combinations whose conjoined condition is unsatisfiable
/// are pruned before `combine` ever runs on them. `top` is the ambient
/// condition already governing the call site (usually the interpreter's
/// current presence condition), so the result never claims reachability
/// wider than its caller's.
pub fn hoist<F>(top: &Condition, universes: &[Multiverse], combine: F) -> Multiverse
where
    F: Fn(&[Option<&str>]) -> Option<String>,
{
    let mut out = Multiverse::new();
    let mut val_stack: Vec<Option<String>> = Vec::with_capacity(universes.len());
    hoist_rec(universes, 0, top.clone(), &mut val_stack, &combine, &mut out);
    out.join_values()
}

fn hoist_rec<F>(
    universes: &[Multiverse],
    idx: usize,
    acc_cond: Condition,
    val_stack: &mut Vec<Option<String>>,
    combine: &F,
    out: &mut Multiverse,
) where
    F: Fn(&[Option<&str>]) -> Option<String>,
{
    if acc_cond.is_false() {
        return;
    }
    if idx == universes.len() {
        let refs: Vec<Option<&str>> = val_stack.iter().map(|v| v.as_deref()).collect();
        let value = combine(&refs);
        out.push(acc_cond, value);
        return;
    }
    for entry in &universes[idx].entries {
        let next_cond = acc_cond.and(&entry.cond);
        if next_cond.is_false() {
            continue;
        }
        val_stack.push(entry.value.clone());
        hoist_rec(universes, idx + 1, next_cond, val_stack, combine, out);
        val_stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Registry;

    #[test]
    fn push_drops_unsatisfiable_entries() {
        let reg = Registry::new();
        let mut mv = Multiverse::new();
        mv.push(reg.falsity(), Some("x".into()));
        assert!(mv.is_empty());
    }

    #[test]
    fn join_values_merges_same_value_entries() {
        let mut reg = Registry::new();
        let a = reg.atom("A").unwrap();
        let b = reg.atom("B").unwrap();
        let mut mv = Multiverse::new();
        mv.push(a.clone(), Some("x".into()));
        mv.push(b.clone(), Some("x".into()));
        let joined = mv.join_values();
        assert_eq!(joined.entries.len(), 1);
        assert_eq!(joined.entries[0].cond, a.or(&b));
    }

    #[test]
    fn hoist_concatenates_pointwise() {
        let mut reg = Registry::new();
        let a = reg.atom("A").unwrap();

        let mut left = Multiverse::new();
        left.push(a.clone(), Some("foo".into()));
        left.push(a.not(), Some("bar".into()));

        let mut right = Multiverse::new();
        right.push(reg.truth(), Some("!".into()));

        let out = hoist(&reg.truth(), &[left, right], |vals| {
            Some(format!("{}{}", vals[0].unwrap_or(""), vals[1].unwrap_or("")))
        });

        let mut values: Vec<_> = out.entries.iter().map(|e| e.value.clone()).collect();
        values.sort();
        assert_eq!(values, vec![Some("bar!".to_string()), Some("foo!".to_string())]);
    }

    #[test]
    fn hoist_prunes_unreachable_combinations() {
        let mut reg = Registry::new();
        let a = reg.atom("A").unwrap();

        let mut only_true = Multiverse::new();
        only_true.push(a.clone(), Some("t".into()));

        let mut only_false = Multiverse::new();
        only_false.push(a.not(), Some("f".into()));

        // Both inputs only have entries under mutually exclusive
        // conditions (A, !A), so the pointwise product is empty.
        let out = hoist(&reg.truth(), &[only_true, only_false], |vals| {
            Some(format!("{:?}{:?}", vals[0], vals[1]))
        });
        assert!(out.is_empty());
    }
}
