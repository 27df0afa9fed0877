//! The expansion engine (spec 4.5, C5): turns an `Expansion` AST node
//! into a `Multiverse` of fully-resolved strings under the presence
//! condition the caller is evaluating in.
//!
//! Grounded on `alg.py`'s `process_expansion`/`process_function_*`/
//! `process_variableref`, and its `hoist` helper for combining several
//! multi-valued sub-expansions pointwise rather than picking just one
//! branch.

use itertools::Itertools;

use crate::ast::{Element, Expansion, Function};
use crate::condition::Condition;
use crate::error::Error;
use crate::kbuild::Kbuild;
use crate::multiverse::{hoist, Multiverse};
use crate::parser;
use crate::store::Flavor;
use crate::system::warnln;

impl Kbuild {
    /// Expand a sequence of `Element`s, concatenating each element's
    /// contribution pointwise across every reachable combination (spec
    /// 4.5's "C5: expansion is concatenation of hoisted pieces").
    pub fn expand(&mut self, cond: &Condition, expansion: &Expansion) -> Result<Multiverse, Error> {
        let mut pieces = Vec::with_capacity(expansion.len());
        for el in expansion {
            pieces.push(self.expand_element(cond, el)?);
        }
        Ok(hoist(cond, &pieces, |vals| {
            if vals.is_empty() {
                return Some(String::new());
            }
            let mut out = String::new();
            for v in vals {
                out.push_str(v.unwrap_or(""));
            }
            Some(out)
        }))
    }

    fn expand_element(&mut self, cond: &Condition, el: &Element) -> Result<Multiverse, Error> {
        match el {
            Element::Text(t) => Ok(Multiverse::single(cond.clone(), Some(t.clone()))),
            Element::VarRef(name_expr) => {
                let names = self.expand(cond, name_expr)?;
                self.expand_variable_refs(cond, &names)
            }
            Element::Call(f) => self.expand_function(cond, f),
        }
    }

    /// Resolve each named variable in `names` to its own multiverse of
    /// values, scoped under the condition each name was reached under
    /// (`alg.py`'s `process_variableref`).
    fn expand_variable_refs(
        &mut self,
        cond: &Condition,
        names: &Multiverse,
    ) -> Result<Multiverse, Error> {
        let mut out = Multiverse::new();
        for name_def in names.iter() {
            let here = cond.and(&name_def.cond);
            if here.is_false() {
                continue;
            }
            let Some(name) = &name_def.value else {
                // `$()` with an undefined name expands to nothing, like
                // `make` itself, not an error.
                out.push(here, None);
                continue;
            };
            let resolved = self.expand_variable(&here, name)?;
            for entry in resolved.iter() {
                out.push(entry.cond.clone(), entry.value.clone());
            }
        }
        Ok(out.join_values())
    }

    /// Resolve one variable name's multiverse under `cond`. Recursively
    /// (`=`) flavored values are stored as their raw, unexpanded RHS text
    /// and only parsed and expanded here, on each reference (spec 4.4);
    /// simply (`:=`) flavored values were already expanded at assignment
    /// time and are used as-is.
    pub fn expand_variable(&mut self, cond: &Condition, name: &str) -> Result<Multiverse, Error> {
        if !self.expanding.insert(name.to_string()) {
            warnln!("`{name}` references itself recursively; treating as undefined here");
            return Ok(Multiverse::single(cond.clone(), None));
        }
        let result = self.expand_variable_inner(cond, name);
        self.expanding.remove(name);
        result
    }

    fn expand_variable_inner(&mut self, cond: &Condition, name: &str) -> Result<Multiverse, Error> {
        if !self.store.is_defined(name) && name == "BITS" {
            return self.expand_bits(cond);
        }
        if name == "CONFIG_WORD_SIZE" {
            return Err(Error::NotImplemented(
                name.to_string(),
                "no Kconfig default resolution",
            ));
        }
        if !self.store.is_defined(name) && name == "MMU" {
            return Err(Error::NotImplemented(
                name.to_string(),
                "no arch Makefile globals",
            ));
        }
        if name.starts_with("CONFIG_") {
            return self.expand_config(cond, name);
        }

        if !self.store.is_defined(name) {
            // Spec 4.4's undefined-reference sentinel (`alg.py`'s
            // `undefined_variables` set): record a single self-referential
            // `$(name)` entry at T, but only warn the first time `name` is
            // seen (testable property 6 — idempotent, not re-warned or
            // re-grown on a second reference).
            if self.undefined.insert(name.to_string()) {
                warnln!("undefined variable expansion: `{name}`");
            }
            let truth = self.registry.truth();
            self.store
                .set(name, &truth, Some(format!("$({name})")), Flavor::Recursive);
            // Returned verbatim below rather than threaded through the
            // ordinary Recursive-flavor arm: that arm re-parses and
            // re-expands its raw text, which for this sentinel is its own
            // name and would either loop forever or (caught by the
            // self-reference guard in `expand_variable`) silently degrade
            // to `None`, masking the sentinel with a spurious "references
            // itself recursively" warning.
            return Ok(Multiverse::single(cond.clone(), Some(format!("$({name})"))));
        }

        let entry = self.store.get(name).cloned().expect("checked is_defined above");
        let mut out = Multiverse::new();
        for def in entry.multiverse.iter() {
            let here = cond.and(&def.cond);
            if here.is_false() {
                continue;
            }
            match (entry.flavor, &def.value) {
                (_, None) => out.push(here, None),
                (Flavor::Simple, Some(v)) => out.push(here, Some(v.clone())),
                (Flavor::Recursive, Some(raw)) if self.undefined.contains(name) => {
                    // Still-undefined sentinel text: return as-is, never
                    // re-parsed (spec 9's "tagged variant... rather than
                    // attempt fixed-point expansion").
                    out.push(here, Some(raw.clone()));
                }
                (Flavor::Recursive, Some(raw)) => {
                    let parsed = parser::parse_expansion(raw);
                    let sub = self.expand(&here, &parsed)?;
                    for e in sub.iter() {
                        out.push(e.cond.clone(), e.value.clone());
                    }
                }
            }
        }
        Ok(out.join_values())
    }

    /// `$(BITS)` (spec 4.4): a builtin two-valued atom, standing in for
    /// the arch word size the original leaves as a `TODO` to pull from
    /// top-level makefiles.
    fn expand_bits(&mut self, cond: &Condition) -> Result<Multiverse, Error> {
        let bits32 = self.registry.atom("BITS=32")?;
        let bits64 = self.registry.atom("BITS=64")?;
        let mut out = Multiverse::new();
        out.push(cond.and(&bits32), Some("32".to_string()));
        out.push(cond.and(&bits64), Some("64".to_string()));
        Ok(out)
    }

    /// `$(CONFIG_*)` (spec 4.4): boolean or tristate depending on
    /// [`Kbuild::do_boolean_configs`]. `CONFIG_*` is always resolved this
    /// way, even if something in the makefile itself assigned a value to
    /// a same-named variable — matching the original, where Kconfig
    /// symbols never come from the makefile's own variable store.
    fn expand_config(&mut self, cond: &Condition, name: &str) -> Result<Multiverse, Error> {
        let mut out = Multiverse::new();
        if self.do_boolean_configs {
            let v = self.registry.atom(name)?;
            out.push(cond.and(&v), Some("y".to_string()));
            out.push(cond.and(&v.not()), None);
        } else {
            let equals_y = self.registry.atom(&format!("{name}=y"))?;
            let equals_m = self.registry.atom(&format!("{name}=m"))?;
            let defined = self.registry.atom(&format!("defined({name})"))?;

            let is_y = defined.and(&equals_y).and(&equals_m.not());
            let is_m = defined.and(&equals_m).and(&equals_y.not());
            let not_defined = defined.not().or(&is_y.not().and(&is_m.not()));

            out.push(cond.and(&is_y), Some("y".to_string()));
            out.push(cond.and(&is_m), Some("m".to_string()));
            out.push(cond.and(&not_defined), None);
        }
        Ok(out)
    }

    /// Fetch a variable's value without re-expanding a recursive
    /// flavor's RHS (`alg.py`'s `$(value ...)` support).
    fn fn_value(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 1 {
            return Err(Error::UnsupportedNode("value".to_string()));
        }
        let names = self.expand(cond, &f.args[0])?;
        let mut out = Multiverse::new();
        for name_def in names.iter() {
            let here = cond.and(&name_def.cond);
            if here.is_false() {
                continue;
            }
            let Some(name) = &name_def.value else {
                out.push(here, None);
                continue;
            };
            match self.store.get(name) {
                None => out.push(here, None),
                Some(entry) => {
                    for def in entry.multiverse.iter() {
                        let scope = here.and(&def.cond);
                        if !scope.is_false() {
                            out.push(scope, def.value.clone());
                        }
                    }
                }
            }
        }
        Ok(out.join_values())
    }

    fn expand_args(&mut self, cond: &Condition, args: &[Expansion]) -> Result<Vec<Multiverse>, Error> {
        args.iter().map(|a| self.expand(cond, a)).collect()
    }

    fn expand_function(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        match f.name.as_str() {
            "subst" => self.fn_subst(cond, f),
            "patsubst" => self.fn_patsubst(cond, f),
            "filter" => self.fn_filter(cond, f, false),
            "filter-out" => self.fn_filter(cond, f, true),
            "if" => self.fn_if(cond, f),
            "addprefix" => self.fn_addprefix(cond, f),
            "addsuffix" => self.fn_addsuffix(cond, f),
            "strip" => self.fn_strip(cond, f),
            "firstword" => self.fn_word_edge(cond, f, true),
            "lastword" => self.fn_word_edge(cond, f, false),
            "words" => self.fn_words(cond, f),
            "word" => self.fn_word(cond, f),
            "sort" => self.fn_sort(cond, f),
            "findstring" => self.fn_findstring(cond, f),
            "dir" | "notdir" | "basename" | "suffix" => self.fn_path(cond, f),
            "join" => self.fn_join(cond, f),
            "value" => self.fn_value(cond, f),
            // These depend on the filesystem, a shell, or recipe-time
            // evaluation order the evaluator never has (spec Non-goals:
            // no recipe execution); they expand to nothing rather than
            // failing the whole directory.
            "call" | "foreach" | "eval" | "wildcard" | "shell" | "error" | "warning" | "info"
            | "origin" => {
                warnln!("`{}` has no evaluated semantics here; treating as empty", f.name);
                Ok(Multiverse::single(cond.clone(), None))
            }
            other => Err(Error::UnsupportedNode(other.to_string())),
        }
    }

    fn fn_subst(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 3 {
            return Err(Error::UnsupportedNode("subst".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            let from = vals[0].unwrap_or("");
            let to = vals[1].unwrap_or("");
            let text = vals[2].unwrap_or("");
            if from.is_empty() {
                Some(text.to_string())
            } else {
                Some(text.replace(from, to))
            }
        }))
    }

    fn fn_patsubst(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 3 {
            return Err(Error::UnsupportedNode("patsubst".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            let pattern = vals[0].unwrap_or("");
            let replacement = vals[1].unwrap_or("");
            let text = vals[2].unwrap_or("");
            Some(patsubst_text(pattern, replacement, text))
        }))
    }

    fn fn_filter(&mut self, cond: &Condition, f: &Function, negate: bool) -> Result<Multiverse, Error> {
        if f.args.len() != 2 {
            return Err(Error::UnsupportedNode(f.name.clone()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, move |vals| {
            let patterns = vals[0].unwrap_or("");
            let text = vals[1].unwrap_or("");
            Some(filter_text(patterns, text, negate))
        }))
    }

    fn fn_if(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() < 2 || f.args.len() > 3 {
            return Err(Error::UnsupportedNode("if".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            let truthy = !vals[0].unwrap_or("").is_empty();
            if truthy {
                Some(vals[1].unwrap_or("").to_string())
            } else if vals.len() > 2 {
                Some(vals[2].unwrap_or("").to_string())
            } else {
                Some(String::new())
            }
        }))
    }

    fn fn_addprefix(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 2 {
            return Err(Error::UnsupportedNode("addprefix".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            let prefix = vals[0].unwrap_or("");
            let text = vals[1].unwrap_or("");
            Some(text.split_whitespace().map(|w| format!("{prefix}{w}")).join(" "))
        }))
    }

    fn fn_addsuffix(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 2 {
            return Err(Error::UnsupportedNode("addsuffix".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            let suffix = vals[0].unwrap_or("");
            let text = vals[1].unwrap_or("");
            Some(text.split_whitespace().map(|w| format!("{w}{suffix}")).join(" "))
        }))
    }

    fn fn_strip(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 1 {
            return Err(Error::UnsupportedNode("strip".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            Some(vals[0].unwrap_or("").split_whitespace().join(" "))
        }))
    }

    fn fn_word_edge(&mut self, cond: &Condition, f: &Function, first: bool) -> Result<Multiverse, Error> {
        if f.args.len() != 1 {
            return Err(Error::UnsupportedNode(f.name.clone()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, move |vals| {
            let words: Vec<&str> = vals[0].unwrap_or("").split_whitespace().collect();
            let picked = if first { words.first() } else { words.last() };
            Some(picked.copied().unwrap_or("").to_string())
        }))
    }

    fn fn_words(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 1 {
            return Err(Error::UnsupportedNode("words".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            Some(vals[0].unwrap_or("").split_whitespace().count().to_string())
        }))
    }

    fn fn_word(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 2 {
            return Err(Error::UnsupportedNode("word".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            let n: usize = vals[0].unwrap_or("").trim().parse().unwrap_or(0);
            let words: Vec<&str> = vals[1].unwrap_or("").split_whitespace().collect();
            if n == 0 {
                Some(String::new())
            } else {
                Some(words.get(n - 1).copied().unwrap_or("").to_string())
            }
        }))
    }

    fn fn_sort(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 1 {
            return Err(Error::UnsupportedNode("sort".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            let mut words: Vec<&str> = vals[0].unwrap_or("").split_whitespace().collect();
            words.sort_unstable();
            words.dedup();
            Some(words.join(" "))
        }))
    }

    fn fn_findstring(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 2 {
            return Err(Error::UnsupportedNode("findstring".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            let needle = vals[0].unwrap_or("");
            let haystack = vals[1].unwrap_or("");
            if haystack.contains(needle) {
                Some(needle.to_string())
            } else {
                Some(String::new())
            }
        }))
    }

    fn fn_path(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 1 {
            return Err(Error::UnsupportedNode(f.name.clone()));
        }
        let args = self.expand_args(cond, &f.args)?;
        let op = f.name.clone();
        Ok(hoist(cond, &args, move |vals| {
            Some(vals[0].unwrap_or("").split_whitespace().map(|w| path_op(&op, w)).join(" "))
        }))
    }

    fn fn_join(&mut self, cond: &Condition, f: &Function) -> Result<Multiverse, Error> {
        if f.args.len() != 2 {
            return Err(Error::UnsupportedNode("join".to_string()));
        }
        let args = self.expand_args(cond, &f.args)?;
        Ok(hoist(cond, &args, |vals| {
            let a: Vec<&str> = vals[0].unwrap_or("").split_whitespace().collect();
            let b: Vec<&str> = vals[1].unwrap_or("").split_whitespace().collect();
            let n = a.len().max(b.len());
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                let x = a.get(i).copied().unwrap_or("");
                let y = b.get(i).copied().unwrap_or("");
                out.push(format!("{x}{y}"));
            }
            Some(out.join(" "))
        }))
    }
}

fn word_matches_pattern(pattern: &str, word: &str) -> bool {
    if let Some(pct) = pattern.find('%') {
        let prefix = &pattern[..pct];
        let suffix = &pattern[pct + 1..];
        word.starts_with(prefix) && word.ends_with(suffix) && word.len() >= prefix.len() + suffix.len()
    } else {
        word == pattern
    }
}

fn filter_text(patterns: &str, text: &str, negate: bool) -> String {
    let pats: Vec<&str> = patterns.split_whitespace().collect();
    text.split_whitespace()
        .filter(|w| pats.iter().any(|p| word_matches_pattern(p, w)) != negate)
        .join(" ")
}

fn patsubst_one(pattern: &str, replacement: &str, word: &str) -> String {
    if let Some(pct) = pattern.find('%') {
        let prefix = &pattern[..pct];
        let suffix = &pattern[pct + 1..];
        if word.starts_with(prefix) && word.ends_with(suffix) && word.len() >= prefix.len() + suffix.len() {
            let stem = &word[prefix.len()..word.len() - suffix.len()];
            return match replacement.find('%') {
                Some(rpct) => format!("{}{}{}", &replacement[..rpct], stem, &replacement[rpct + 1..]),
                None => replacement.to_string(),
            };
        }
        word.to_string()
    } else if word == pattern {
        replacement.to_string()
    } else {
        word.to_string()
    }
}

fn patsubst_text(pattern: &str, replacement: &str, text: &str) -> String {
    text.split_whitespace()
        .map(|w| patsubst_one(pattern, replacement, w))
        .join(" ")
}

fn path_op(op: &str, word: &str) -> String {
    let last_slash = word.rfind('/').map(|i| i + 1).unwrap_or(0);
    match op {
        "dir" => match word.rfind('/') {
            Some(i) => word[..=i].to_string(),
            None => "./".to_string(),
        },
        "notdir" => word[last_slash..].to_string(),
        "basename" => match word.rfind('.') {
            Some(i) if i >= last_slash => word[..i].to_string(),
            _ => word.to_string(),
        },
        "suffix" => match word.rfind('.') {
            Some(i) if i >= last_slash => word[i..].to_string(),
            _ => String::new(),
        },
        _ => word.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AssignOp;
    use crate::store::Flavor;

    fn expand_str(kb: &mut Kbuild, s: &str) -> Vec<String> {
        let top = kb.registry.truth();
        let expansion = parser::parse_expansion(s);
        let mv = kb.expand(&top, &expansion).unwrap();
        mv.iter().filter_map(|e| e.value.clone()).collect()
    }

    #[test]
    fn plain_text_expands_to_itself() {
        let mut kb = Kbuild::new();
        assert_eq!(expand_str(&mut kb, "hello"), vec!["hello".to_string()]);
    }

    #[test]
    fn simple_flavored_variable_is_used_verbatim() {
        let mut kb = Kbuild::new();
        let top = kb.registry.truth();
        kb.store.set("CC", &top, Some("gcc".into()), Flavor::Simple);
        assert_eq!(expand_str(&mut kb, "$(CC)"), vec!["gcc".to_string()]);
    }

    #[test]
    fn recursive_flavored_variable_reexpands_on_reference() {
        let mut kb = Kbuild::new();
        let top = kb.registry.truth();
        kb.store.set("BASE", &top, Some("root".into()), Flavor::Recursive);
        kb.store.set("DERIVED", &top, Some("$(BASE)/sub".into()), Flavor::Recursive);
        assert_eq!(expand_str(&mut kb, "$(DERIVED)"), vec!["root/sub".to_string()]);
    }

    #[test]
    fn conditional_assignment_produces_branching_multiverse() {
        let mut kb = Kbuild::new();
        let a = kb.registry.atom("CONFIG_A").unwrap();
        kb.store.set("X", &a, Some("yes".into()), Flavor::Simple);
        kb.store.set("X", &a.not(), Some("no".into()), Flavor::Simple);

        let top = kb.registry.truth();
        let expansion = parser::parse_expansion("$(X)");
        let mv = kb.expand(&top, &expansion).unwrap();
        let mut values: Vec<_> = mv.iter().filter_map(|e| e.value.clone()).collect();
        values.sort();
        assert_eq!(values, vec!["no".to_string(), "yes".to_string()]);
    }

    #[test]
    fn patsubst_applies_percent_wildcard() {
        assert_eq!(patsubst_text("%.c", "%.o", "foo.c bar.c"), "foo.o bar.o");
    }

    #[test]
    fn filter_out_removes_matching_words() {
        assert_eq!(filter_text("%.o", "foo.o bar.c baz.o", true), "bar.c");
    }

    #[test]
    fn if_function_picks_branch_per_condition() {
        let mut kb = Kbuild::new();
        let a = kb.registry.atom("CONFIG_A").unwrap();
        kb.store.set("FLAG", &a, Some("1".into()), Flavor::Simple);
        kb.store.set("FLAG", &a.not(), Some("".into()), Flavor::Simple);
        let top = kb.registry.truth();
        let expansion = parser::parse_expansion("$(if $(FLAG),yes,no)");
        let mv = kb.expand(&top, &expansion).unwrap();
        let mut values: Vec<_> = mv.iter().filter_map(|e| e.value.clone()).collect();
        values.sort();
        assert_eq!(values, vec!["no".to_string(), "yes".to_string()]);
    }

    #[test]
    fn undefined_variable_expands_to_literal_sentinel() {
        let mut kb = Kbuild::new();
        assert_eq!(expand_str(&mut kb, "$(MISSING)"), vec!["$(MISSING)".to_string()]);
    }

    #[test]
    fn undefined_variable_is_idempotent_on_second_reference() {
        // Testable property 6: referencing an undefined variable twice
        // adds exactly one entry to the store, and must not be confused
        // with genuine self-reference (no "references itself recursively"
        // warning, just the one undefined-expansion warning).
        let mut kb = Kbuild::new();
        let top = kb.registry.truth();
        let expansion = parser::parse_expansion("$(MISSING)");
        kb.expand(&top, &expansion).unwrap();
        kb.expand(&top, &expansion).unwrap();

        assert_eq!(kb.store.get("MISSING").unwrap().multiverse.entries.len(), 1);
        assert_eq!(
            kb.store.get("MISSING").unwrap().multiverse.entries[0].value,
            Some("$(MISSING)".to_string())
        );
    }

    #[test]
    fn assign_op_round_trips_through_ast() {
        // Sanity check that AssignOp is in scope for other modules' tests
        // to compare against (kept here since expand.rs re-exports none
        // of its own AssignOp-specific behavior).
        assert_eq!(AssignOp::Append, AssignOp::Append);
    }
}
