//! The directory driver (spec 4.9, C8): locates and parses each
//! directory's makefile, evaluates it in a fresh [`Kbuild`], collects its
//! artifacts, and recurses into discovered subdirectories.
//!
//! Grounded on `alg.py`'s `Run.run`/`Run.get_makefile`, restructured
//! around the teacher's `Options`/`build::run` entry-point shape.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::collect;
use crate::config::Settings;
use crate::error::Error;
use crate::kbuild::Kbuild;
use crate::parser;
use crate::results::Results;
use crate::store::Flavor;
use crate::system::{debugln, locate_makefile, read_to_string, warnln};

pub struct Driver {
    settings: Settings,
}

impl Driver {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Evaluate every configured entry point, following subdirectories
    /// when `do_recursive` is set, and return the merged artifact
    /// inventory.
    ///
    /// A missing makefile at one of `settings.paths` is fatal (the user
    /// asked for that directory explicitly); a missing makefile in a
    /// subdirectory discovered through recursion is logged and skipped,
    /// since `subdir-y`/`obj-y` entries routinely name directories that
    /// turn out to be configuration-gated away in a given tree (spec
    /// section 7's "degrade gracefully" philosophy, applied to
    /// recursion specifically).
    pub fn run(&self) -> Result<Results, Error> {
        let mut results = Results::new();
        let mut queue: VecDeque<(PathBuf, bool)> =
            self.settings.paths.iter().map(|p| (p.clone(), true)).collect();

        while let Some((entry, explicit)) = queue.pop_front() {
            let makefile_path = match locate_makefile(&entry) {
                Ok(p) => p,
                Err(e) => {
                    if explicit {
                        return Err(e);
                    }
                    warnln!("no Kbuild/Makefile in `{}`; skipping", entry.display());
                    continue;
                }
            };
            let dir = makefile_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or(entry.clone());

            let subdirs = self.extract_directory(&makefile_path, &dir, &mut results)?;
            if self.settings.do_recursive {
                for sub in subdirs {
                    queue.push_back((sub, false));
                }
            }
        }

        Ok(results)
    }

    fn extract_directory(
        &self,
        makefile_path: &Path,
        dir: &Path,
        results: &mut Results,
    ) -> Result<Vec<PathBuf>, Error> {
        let text = read_to_string(makefile_path)?;
        let makefile = parser::parse(&text)?;

        let mut kb = Kbuild::new().with_boolean_configs(self.settings.do_boolean_configs);
        let top = kb.registry.truth();
        for (name, value) in &self.settings.defines {
            // `alg.py`'s `add_definitions` treats `--define` the same as
            // a plain `=` assignment (RECURSIVE), so a define value that
            // itself contains `$(...)` is expanded at use time rather
            // than frozen at seed time.
            kb.store.set(name, &top, Some(value.clone()), Flavor::Recursive);
        }

        kb.interpret(dir, &top, &makefile.statements)?;

        if self.settings.do_table {
            debugln!("symbol table for `{}`:\n{}", dir.display(), kb.symbol_table());
        }

        collect::collect_directory(&mut kb, dir, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, contents: &str) {
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn missing_explicit_entry_point_is_fatal() {
        let settings = Settings {
            paths: vec![PathBuf::from("/nonexistent/path/for/kmax/tests")],
            do_boolean_configs: false,
            do_recursive: true,
            do_table: false,
            defines: Vec::new(),
        };
        let driver = Driver::new(settings);
        assert!(matches!(driver.run(), Err(Error::MakefileNotFound(_))));
    }

    #[test]
    fn single_directory_with_no_subdirs_recursive_setting_has_no_effect() {
        let dir = std::env::temp_dir().join(format!("kmax-driver-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        write_file(&dir.join("Kbuild"), "obj-y += foo.o\n");

        let settings = Settings {
            paths: vec![dir.clone()],
            do_boolean_configs: false,
            do_recursive: true,
            do_table: false,
            defines: Vec::new(),
        };
        let driver = Driver::new(settings);
        let results = driver.run().unwrap();
        let expected = dir.join("foo.o").to_string_lossy().into_owned();
        assert!(results.compilation_units.contains(&expected));

        std::fs::remove_dir_all(&dir).ok();
    }
}
