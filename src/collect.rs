//! The artifact collector (spec 4.8, C7): a fixed-point walk over a set
//! of seed variables that resolves composites, descends subdirectories,
//! and produces the presence-condition map.
//!
//! Grounded on `alg.py`'s `Run.extract`/`collect_units`/`collect_defs`/
//! `get_presence_conditions`.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use crate::condition::Condition;
use crate::error::Error;
use crate::kbuild::Kbuild;
use crate::results::Results;
use crate::system::{exists, warnln};

const OBJ_SEEDS: &[&str] = &[
    "obj-y", "obj-m", "core-y", "core-m", "drivers-y", "drivers-m", "net-y", "net-m", "libs-y",
    "libs-m", "head-y", "head-m",
];
const LIB_SEEDS: &[&str] = &["lib-y", "lib-m"];
const HOSTPROG_SEEDS: &[&str] = &["hostprogs-y", "hostprogs-m", "host-progs", "always"];

/// Collect every artifact a single directory's already-interpreted
/// `Kbuild` instance produces, folding them into `results`. Returns the
/// subdirectories discovered (for the driver to recurse into, spec 4.9).
pub fn collect_directory(
    kb: &mut Kbuild,
    dir: &Path,
    results: &mut Results,
) -> Result<Vec<PathBuf>, Error> {
    let mut units: HashSet<String> = HashSet::new();
    let mut subdirs: HashSet<String> = HashSet::new();
    let mut composites: HashSet<String> = HashSet::new();

    collect_units(kb, dir, seed_set(OBJ_SEEDS), &mut units, &mut subdirs, &mut composites)?;

    for var in ["subdir-y", "subdir-m"] {
        for token in split_defs(kb, var)? {
            subdirs.insert(join_normalized(dir, &token));
        }
    }

    let mut library_units: HashSet<String> = HashSet::new();
    collect_units(
        kb,
        dir,
        seed_set(LIB_SEEDS),
        &mut library_units,
        &mut subdirs,
        &mut composites,
    )?;

    let mut hostprog_units: HashSet<String> = HashSet::new();
    let mut hostprog_composites: HashSet<String> = HashSet::new();
    for var in HOSTPROG_SEEDS {
        for token in split_defs(kb, var)? {
            let composite_name = format!("{token}-objs");
            let unit_name = join_normalized(dir, &token);
            if kb.store.is_defined(&composite_name) {
                hostprog_composites.insert(unit_name);
            } else {
                hostprog_units.insert(unit_name);
            }
        }
    }
    if let Some(first) = hostprog_composites.iter().next().cloned() {
        // Spec Open Question (c): the original hard-errors on
        // host-program composites rather than resolving them; replicated
        // here as a reported error instead of silently dropping the
        // unit (DESIGN.md).
        return Err(Error::HostProgComposite(first));
    }

    let mut clean_files: HashSet<String> = HashSet::new();
    for token in split_defs(kb, "clean-files")? {
        clean_files.insert(join_normalized(dir, &token));
    }

    let mut unconfigurable_units: HashSet<String> = HashSet::new();
    collect_unconfigurable(kb, dir, &composites, &mut unconfigurable_units)?;
    for name in &units {
        unconfigurable_units.remove(name);
    }
    for name in &library_units {
        unconfigurable_units.remove(name);
    }
    for name in &composites {
        unconfigurable_units.remove(name);
    }
    for name in &subdirs {
        unconfigurable_units.remove(name);
    }

    check_unexpanded(units.iter(), "compilation unit");
    check_unexpanded(subdirs.iter(), "subdirectory");
    check_unexpanded(kb.store.names(), "variable name");

    let top = kb.registry.truth();
    let mut pcs: HashMap<String, Condition> = HashMap::new();
    let seed_names: Vec<String> = OBJ_SEEDS
        .iter()
        .chain(LIB_SEEDS.iter())
        .map(|s| s.to_string())
        .collect();
    get_presence_conditions(kb, &seed_names, &top, &mut pcs)?;
    for (token, cond) in pcs {
        let filename = join_normalized(dir, &token);
        results.add_presence(filename, cond);
    }

    results.compilation_units.extend(units);
    results.library_units.extend(library_units);
    results.composites.extend(composites);
    results.hostprog_units.extend(hostprog_units);
    results.clean_files.extend(clean_files);
    results.unconfigurable_units.extend(unconfigurable_units);
    results.subdirs.extend(subdirs.iter().cloned());
    results.dedup();

    Ok(subdirs.into_iter().map(PathBuf::from).collect())
}

fn seed_set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Expand `var`'s full multiverse and flatten every universe's value into
/// whitespace-delimited tokens, discarding the condition under which each
/// token was reached (`alg.py`'s `split_defs`): collection only cares
/// which tokens *can* appear in some universe, not which. Precise
/// per-token reachability is recovered separately by
/// [`get_presence_conditions`].
fn split_defs(kb: &mut Kbuild, var: &str) -> Result<Vec<String>, Error> {
    if !kb.store.is_defined(var) {
        return Ok(Vec::new());
    }
    let top = kb.registry.truth();
    let values = kb.expand_variable(&top, var)?;
    let mut out = Vec::new();
    for def in values.iter() {
        let Some(v) = &def.value else { continue };
        out.extend(v.split_whitespace().map(str::to_string));
    }
    Ok(out)
}

/// Fixed-point loop resolving `pending_vars` into compilation units,
/// subdirectories, and composites (`alg.py`'s `collect_units`).
fn collect_units(
    kb: &mut Kbuild,
    dir: &Path,
    mut pending_vars: HashSet<String>,
    units: &mut HashSet<String>,
    subdirs: &mut HashSet<String>,
    composites: &mut HashSet<String>,
) -> Result<(), Error> {
    let mut processed_vars: HashSet<String> = HashSet::new();
    while let Some(var) = pending_vars.iter().next().cloned() {
        pending_vars.remove(&var);
        processed_vars.insert(var.clone());
        for elem in split_defs(kb, &var)? {
            collect_one(
                kb,
                dir,
                &elem,
                units,
                subdirs,
                composites,
                &processed_vars,
                &mut pending_vars,
            );
        }
    }
    Ok(())
}

/// Resolve a single whitespace-token from a pending variable's value
/// (`alg.py`'s `collect_defs`).
fn collect_one(
    kb: &Kbuild,
    dir: &Path,
    elem: &str,
    units: &mut HashSet<String>,
    subdirs: &mut HashSet<String>,
    composites: &mut HashSet<String>,
    processed_vars: &HashSet<String>,
    pending_vars: &mut HashSet<String>,
) {
    let unit_name = join_normalized(dir, elem);
    if let Some(stem) = elem.strip_suffix(".o") {
        if units.contains(&unit_name) {
            return;
        }
        let objs_var = format!("{stem}-objs");
        let y_var = format!("{stem}-y");
        let has_objs = kb.store.is_defined(&objs_var);
        let has_y = kb.store.is_defined(&y_var);
        if has_objs || has_y {
            // `scripts/Makefile.build` assembles composite `.o` targets
            // from `<stem>-objs`/`<stem>-y`.
            if !processed_vars.contains(&objs_var) && !processed_vars.contains(&y_var) {
                composites.insert(unit_name.clone());
                pending_vars.insert(objs_var);
                pending_vars.insert(y_var);
            }
            let c_file = dir.join(format!("{stem}.c"));
            let s_file = dir.join(format!("{stem}.S"));
            if exists(&c_file) || exists(&s_file) {
                units.insert(unit_name);
            }
        } else {
            units.insert(unit_name);
        }
    } else if let Some(sub) = elem.strip_suffix('/') {
        // `scripts/Makefile.lib` takes anything ending in `/` as a
        // subdirectory.
        let new_dir = if sub.starts_with('/') {
            PathBuf::from(sub)
        } else {
            dir.join(sub)
        };
        if new_dir.is_dir() {
            subdirs.insert(new_dir.to_string_lossy().to_string());
        }
    }
}

/// Spec 4.8 step 6: collect every store name that looks like an
/// unconfigurable residue of `obj-$`/`lib-$`/`hostprogs-$`/composite-stem
/// variable naming, then run the ordinary collector over that set so its
/// tokens get normalized the same way.
fn collect_unconfigurable(
    kb: &mut Kbuild,
    dir: &Path,
    composites: &HashSet<String>,
    unconfigurable_units: &mut HashSet<String>,
) -> Result<(), Error> {
    let mut prefixes: HashSet<String> = ["obj-$", "lib-$", "hostprogs-$"]
        .into_iter()
        .map(str::to_string)
        .collect();
    for composite in composites {
        let base = Path::new(composite)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| composite.clone());
        let stem = base.strip_suffix(".o").unwrap_or(&base);
        prefixes.insert(format!("{stem}-$"));
    }

    let mut unconfigurable_vars: HashSet<String> = HashSet::new();
    let names: Vec<String> = kb.store.names().cloned().collect();
    for name in &names {
        for prefix in &prefixes {
            if name.starts_with(prefix.as_str())
                && !name.ends_with('-')
                && !name.ends_with("-y")
                && !name.ends_with("-m")
                && !name.ends_with("-objs")
                && name != "host-progs"
            {
                unconfigurable_vars.insert(name.clone());
            } else if name.starts_with(&prefix[..prefix.len() - 1]) && name.ends_with('-') {
                unconfigurable_vars.insert(name.clone());
            }
        }
    }

    // Same set reused as both the "units" and the "subdirs"/"composites"
    // output, matching the original: collection here is purely about
    // discovering *names*, not sorting them into the usual buckets.
    let mut dummy_subdirs = unconfigurable_units.clone();
    let mut dummy_composites = unconfigurable_units.clone();
    collect_units(
        kb,
        dir,
        unconfigurable_vars,
        unconfigurable_units,
        &mut dummy_subdirs,
        &mut dummy_composites,
    )?;
    unconfigurable_units.extend(dummy_subdirs);
    unconfigurable_units.extend(dummy_composites);
    Ok(())
}

/// Spec 4.8 step 7: accumulate presence conditions for `obj-y`/`obj-m`/
/// `lib-y`/`lib-m` (and, recursively, the composites they resolve to)
/// token by token. Uses [`Kbuild::expand_variable`] (rather than the raw
/// unexpanded text the original reads token-by-token) so a `RECURSIVE`
/// seed variable's nested references are resolved before being split,
/// not left as literal `$(...)` text (DESIGN.md).
fn get_presence_conditions(
    kb: &mut Kbuild,
    vars: &[String],
    top: &Condition,
    pcs: &mut HashMap<String, Condition>,
) -> Result<(), Error> {
    let mut pending: Vec<String> = vars
        .iter()
        .filter(|v| kb.store.is_defined(v))
        .cloned()
        .collect();
    let mut seen: HashSet<String> = HashSet::new();
    while let Some(name) = pending.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let values = kb.expand_variable(top, &name)?;
        for def in values.iter() {
            if def.cond.is_false() {
                continue;
            }
            let Some(value) = &def.value else { continue };
            for token in value.split_whitespace() {
                let entry = pcs.remove(token);
                let updated = match entry {
                    Some(existing) => existing.or(&def.cond),
                    None => def.cond.clone(),
                };
                pcs.insert(token.to_string(), updated);

                if let Some(stem) = token.strip_suffix(".o") {
                    let objs_var = format!("{stem}-objs");
                    let y_var = format!("{stem}-y");
                    if kb.store.is_defined(&objs_var) || kb.store.is_defined(&y_var) {
                        get_presence_conditions(kb, &[objs_var, y_var], &def.cond, pcs)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Spec 4.8's closing warning: flag any leftover `$(...)` in
/// compilation-unit names, subdirectory names, or variable names, since
/// those indicate a configuration the evaluator never resolved.
fn check_unexpanded<'a, I: Iterator<Item = &'a String>>(names: I, what: &str) {
    for name in names {
        if crate::interpreter::has_unexpanded(name) {
            warnln!("unresolved expansion left in {what} name: `{name}`");
        }
    }
}

/// A lightweight `os.path.normpath`-equivalent: join then collapse `.`/
/// `..` components without touching the filesystem.
fn join_normalized(dir: &Path, rel: &str) -> String {
    let joined = dir.join(rel);
    let mut out: Vec<Component> = Vec::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(out.last(), Some(Component::RootDir) | None) {
                    out.pop();
                } else {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    let mut result = PathBuf::new();
    for component in out {
        result.push(component.as_os_str());
    }
    result.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::store::Flavor;
    use std::path::Path;

    #[test]
    fn join_normalized_collapses_dot_segments() {
        assert_eq!(join_normalized(Path::new("a/b"), "./c"), "a/b/c");
        assert_eq!(join_normalized(Path::new("a/b"), "../c"), "a/c");
    }

    #[test]
    fn simple_obj_y_becomes_a_compilation_unit() {
        let mut kb = Kbuild::new();
        let top = kb.registry.truth();
        let mf = parser::parse("obj-y += foo.o\n").unwrap();
        kb.interpret(Path::new("."), &top, &mf.statements).unwrap();

        let mut results = Results::new();
        collect_directory(&mut kb, Path::new("drivers"), &mut results).unwrap();
        assert!(results.compilation_units.contains(&"drivers/foo.o".to_string()));
    }

    #[test]
    fn composite_objs_are_recorded_without_becoming_compilation_units() {
        let mut kb = Kbuild::new();
        let top = kb.registry.truth();
        let mf = parser::parse("obj-y += mod.o\nmod-objs := a.o b.o\n").unwrap();
        kb.interpret(Path::new("."), &top, &mf.statements).unwrap();

        let mut results = Results::new();
        collect_directory(&mut kb, Path::new("drivers"), &mut results).unwrap();
        assert!(results.composites.contains(&"drivers/mod.o".to_string()));
        // mod.c/mod.S don't exist on disk, so mod.o isn't a compilation unit.
        assert!(!results.compilation_units.contains(&"drivers/mod.o".to_string()));
        assert!(results.presence_conditions.contains_key("drivers/a.o"));
        assert!(results.presence_conditions.contains_key("drivers/b.o"));
    }

    #[test]
    fn boolean_config_presence_condition_matches_the_atom() {
        let mut kb = Kbuild::new().with_boolean_configs(true);
        let top = kb.registry.truth();
        let mf = parser::parse("obj-$(CONFIG_FOO) += foo.o\n").unwrap();
        kb.interpret(Path::new("."), &top, &mf.statements).unwrap();

        let mut results = Results::new();
        collect_directory(&mut kb, Path::new("."), &mut results).unwrap();
        let cond = results.presence_conditions.get("foo.o").unwrap();
        let atom = kb.registry.atom("CONFIG_FOO").unwrap();
        assert_eq!(cond, &atom);
    }

    #[test]
    fn hostprog_composite_is_reported_as_an_error() {
        let mut kb = Kbuild::new();
        let top = kb.registry.truth();
        let mf = parser::parse("hostprogs-y += tool\ntool-objs := a.o b.o\n").unwrap();
        kb.interpret(Path::new("."), &top, &mf.statements).unwrap();

        let mut results = Results::new();
        let err = collect_directory(&mut kb, Path::new("."), &mut results).unwrap_err();
        assert!(matches!(err, Error::HostProgComposite(_)));
    }

    #[test]
    fn clean_files_are_collected() {
        let mut kb = Kbuild::new();
        let top = kb.registry.truth();
        kb.store.set("clean-files", &top, Some("*.o *.tmp".into()), Flavor::Simple);

        let mut results = Results::new();
        collect_directory(&mut kb, Path::new("drivers"), &mut results).unwrap();
        assert!(results.clean_files.contains(&"drivers/*.o".to_string()));
        assert!(results.clean_files.contains(&"drivers/*.tmp".to_string()));
    }
}
