//! The condition algebra (spec 4.1, "Condition algebra") and the
//! boolean-variable registry (spec 4.2). Every condition is carried as a
//! BDD (canonical, cheap equality and pruning) and a symbolic boolean
//! formula (human-readable) at once, in lockstep, by construction: there
//! is no code path that can update one side without the other.
//!
//! No teacher module does anything like this; it is grounded on
//! `examples/other_examples/2794931b_ellmau-adf-obdd__lib-src-adfbiodivine.rs.rs`,
//! which pairs `biodivine_lib_bdd::Bdd` with
//! `boolean_expression::BooleanExpression` for the same reason (a
//! canonical decision diagram plus a readable formula tree over the same
//! atoms).

use std::collections::HashMap;
use std::fmt;

use biodivine_lib_bdd::boolean_expression::BooleanExpression;
use biodivine_lib_bdd::{Bdd, BddVariable, BddVariableSet, BddVariableSetBuilder};

use crate::error::CondError;

/// Upper bound on distinct symbolic atoms a single directory's evaluation
/// may introduce. `biodivine-lib-bdd`, like most BDD packages, fixes its
/// variable universe at construction time, so [`Registry`] pre-allocates
/// a generous pool of anonymous slots and hands them out to symbolic
/// names lazily as [`Registry::get_or_create`] is called, which gives
/// callers the lazy, idempotent allocation spec 4.2 describes without
/// needing a BDD crate that supports post-hoc variable growth.
const ATOM_POOL: usize = 4096;

/// A named boolean atom, paired in both the BDD and symbolic worlds.
#[derive(Clone, Debug)]
pub struct BoolVar {
    pub name: String,
    pub index: usize,
    pub(crate) bdd: Bdd,
    pub(crate) formula: BooleanExpression,
}

/// A literal produced when decoding a condition into disjunctive-normal
/// form: either an atom or its negation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Pos(String),
    Neg(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Pos(n) => write!(f, "{n}"),
            Literal::Neg(n) => write!(f, "!{n}"),
        }
    }
}

/// A condition: a boolean formula over named atoms, carried as a BDD and
/// a symbolic formula simultaneously (spec 3, "Condition (C)").
#[derive(Clone, Debug)]
pub struct Condition {
    pub(crate) bdd: Bdd,
    pub(crate) formula: BooleanExpression,
}

impl Condition {
    pub fn and(&self, other: &Condition) -> Condition {
        Condition {
            bdd: self.bdd.and(&other.bdd),
            formula: BooleanExpression::And(
                Box::new(self.formula.clone()),
                Box::new(other.formula.clone()),
            ),
        }
    }

    pub fn or(&self, other: &Condition) -> Condition {
        Condition {
            bdd: self.bdd.or(&other.bdd),
            formula: BooleanExpression::Or(
                Box::new(self.formula.clone()),
                Box::new(other.formula.clone()),
            ),
        }
    }

    pub fn not(&self) -> Condition {
        Condition {
            bdd: self.bdd.not(),
            formula: BooleanExpression::Not(Box::new(self.formula.clone())),
        }
    }

    pub fn is_false(&self) -> bool {
        self.bdd.is_false()
    }

    pub fn is_true(&self) -> bool {
        self.bdd.is_true()
    }
}

impl PartialEq for Condition {
    /// BDD equality: cheap and canonical, since every `Condition` in a
    /// given `Kbuild` instance is built over the same variable ordering
    /// (spec 4.1: "BDD equality is used for `cond != F` fast paths").
    fn eq(&self, other: &Self) -> bool {
        self.bdd == other.bdd
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_formula(&self.formula))
    }
}

fn format_formula(e: &BooleanExpression) -> String {
    match e {
        BooleanExpression::Const(true) => "1".to_string(),
        BooleanExpression::Const(false) => "0".to_string(),
        BooleanExpression::Variable(name) => name.clone(),
        BooleanExpression::Not(a) => format!("!{}", format_formula(a)),
        BooleanExpression::And(a, b) => format!("({} && {})", format_formula(a), format_formula(b)),
        BooleanExpression::Or(a, b) => format!("({} || {})", format_formula(a), format_formula(b)),
        // This algebra never constructs Iff/Xor/Imp nodes itself.
        other => format!("{other:?}"),
    }
}

/// Maps symbolic atom names to BDD variables, the boolean-variable
/// registry (spec 4.2, C2). Owned exclusively by one `Kbuild` instance
/// for the directory it is evaluating (spec 5).
pub struct Registry {
    var_set: BddVariableSet,
    slots: Vec<BddVariable>,
    by_name: HashMap<String, BoolVar>,
}

impl Registry {
    pub fn new() -> Self {
        let mut builder = BddVariableSetBuilder::new();
        let names: Vec<String> = (0..ATOM_POOL).map(|i| format!("__atom_{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let slots = builder.make_variables(&refs);
        let var_set = builder.build();
        Self {
            var_set,
            slots,
            by_name: HashMap::new(),
        }
    }

    pub fn truth(&self) -> Condition {
        Condition {
            bdd: self.var_set.mk_true(),
            formula: BooleanExpression::Const(true),
        }
    }

    pub fn falsity(&self) -> Condition {
        Condition {
            bdd: self.var_set.mk_false(),
            formula: BooleanExpression::Const(false),
        }
    }

    /// Idempotent: repeated calls with the same name return the same
    /// `BoolVar` (spec 4.2, "Collisions on name MUST return the same
    /// BoolVar").
    pub fn get_or_create(&mut self, name: &str) -> Result<BoolVar, CondError> {
        if let Some(existing) = self.by_name.get(name) {
            return Ok(existing.clone());
        }
        let index = self.by_name.len();
        let slot = *self
            .slots
            .get(index)
            .ok_or(CondError::CapacityExceeded(ATOM_POOL))?;
        let bdd = self.var_set.mk_literal(slot, true);
        let bv = BoolVar {
            name: name.to_string(),
            index,
            bdd,
            formula: BooleanExpression::Variable(name.to_string()),
        };
        self.by_name.insert(name.to_string(), bv.clone());
        Ok(bv)
    }

    pub fn atom(&mut self, name: &str) -> Result<Condition, CondError> {
        let bv = self.get_or_create(name)?;
        Ok(Condition {
            bdd: bv.bdd,
            formula: bv.formula,
        })
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Decode a condition into a disjunction of conjunctions of literals
    /// over registered atoms (spec 4.1's "CNF export"; in this
    /// implementation a manual recursive case split over registered
    /// atoms using only `and`/`not`/`is_false`/`is_true`, rather than a
    /// BDD-crate-specific minterm iterator).
    pub fn to_dnf(&self, cond: &Condition) -> Result<Vec<Vec<Literal>>, CondError> {
        let mut ordered: Vec<&BoolVar> = self.by_name.values().collect();
        ordered.sort_by_key(|bv| bv.index);
        let names: Vec<String> = ordered.into_iter().map(|bv| bv.name.clone()).collect();

        let mut out = Vec::new();
        let mut acc = Vec::new();
        self.split(&cond.bdd, &names, &mut acc, &mut out)?;
        Ok(out)
    }

    fn split(
        &self,
        bdd: &Bdd,
        remaining: &[String],
        acc: &mut Vec<Literal>,
        out: &mut Vec<Vec<Literal>>,
    ) -> Result<(), CondError> {
        if bdd.is_false() {
            return Ok(());
        }
        let (name, rest) = match remaining.split_first() {
            None => {
                if !bdd.is_true() {
                    return Err(CondError::UnknownAtom(self.len()));
                }
                out.push(acc.clone());
                return Ok(());
            }
            Some(pair) => pair,
        };
        if bdd.is_true() {
            out.push(acc.clone());
            return Ok(());
        }
        let bv = self.by_name.get(name).expect("name enumerated from by_name");
        let pos = bdd.and(&bv.bdd);
        if !pos.is_false() {
            acc.push(Literal::Pos(name.clone()));
            self.split(&pos, rest, acc, out)?;
            acc.pop();
        }
        let neg_atom = bv.bdd.not();
        let neg = bdd.and(&neg_atom);
        if !neg.is_false() {
            acc.push(Literal::Neg(name.clone()));
            self.split(&neg, rest, acc, out)?;
            acc.pop();
        }
        Ok(())
    }

    /// Render a condition's DNF as a human-readable string, e.g.
    /// `"A && B || !C"`. Used by `Kbuild::symbol_table` when `do_table`
    /// is set; not a substitute for the dedicated pretty-printer the spec
    /// keeps out of scope.
    pub fn to_dnf_string(&self, cond: &Condition) -> Result<String, CondError> {
        if cond.is_true() {
            return Ok("1".to_string());
        }
        if cond.is_false() {
            return Ok("0".to_string());
        }
        let terms = self.to_dnf(cond)?;
        let rendered: Vec<String> = terms
            .iter()
            .map(|term| {
                term.iter()
                    .map(|l| l.to_string())
                    .collect::<Vec<_>>()
                    .join(" && ")
            })
            .collect();
        Ok(rendered.join(" || "))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoms_are_idempotent() {
        let mut reg = Registry::new();
        let a1 = reg.get_or_create("CONFIG_FOO").unwrap();
        let a2 = reg.get_or_create("CONFIG_FOO").unwrap();
        assert_eq!(a1.index, a2.index);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn distinct_names_get_distinct_atoms() {
        let mut reg = Registry::new();
        let a = reg.atom("A").unwrap();
        let b = reg.atom("B").unwrap();
        assert_ne!(a, b);
        assert!(a.and(&b.not()) != reg.falsity());
    }

    #[test]
    fn and_or_not_are_sound() {
        let mut reg = Registry::new();
        let a = reg.atom("A").unwrap();
        let not_a = a.not();
        assert!(a.and(&not_a).is_false());
        assert!(a.or(&not_a).is_true());
    }

    #[test]
    fn dnf_round_trip() {
        let mut reg = Registry::new();
        let a = reg.atom("A").unwrap();
        let b = reg.atom("B").unwrap();
        let c = a.and(&b).or(&a.not());

        let terms = reg.to_dnf(&c).unwrap();
        let mut rebuilt = reg.falsity();
        for term in &terms {
            let mut conj = reg.truth();
            for lit in term {
                let atom = reg.atom(match lit {
                    Literal::Pos(n) | Literal::Neg(n) => n,
                }).unwrap();
                let lit_cond = match lit {
                    Literal::Pos(_) => atom,
                    Literal::Neg(_) => atom.not(),
                };
                conj = conj.and(&lit_cond);
            }
            rebuilt = rebuilt.or(&conj);
        }
        assert_eq!(rebuilt, c);
    }

    #[test]
    fn pruning_never_keeps_false() {
        let mut reg = Registry::new();
        let a = reg.atom("A").unwrap();
        let f = a.and(&a.not());
        assert!(f.is_false());
    }
}
