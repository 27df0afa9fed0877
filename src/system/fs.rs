//! Thin, `Result`-returning wrappers around file-system access.

use std::path::{Path, PathBuf};

use crate::error::Error;

/// Read an entire file to a string, wrapping I/O errors with the path.
pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String, Error> {
    std::fs::read_to_string(path.as_ref())
        .map_err(|e| Error::ReadFile(path.as_ref().display().to_string(), e))
}

pub fn exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists()
}

pub fn is_dir<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().is_dir()
}

/// Locate the makefile for a directory or file entry point (spec 4.9 /
/// `Run.get_makefile`): prefer `Kbuild`, fall back to `Makefile`. If the
/// entry point is already a file, it is used as-is.
pub fn locate_makefile<P: AsRef<Path>>(entry: P) -> Result<PathBuf, Error> {
    let entry = entry.as_ref();
    if entry.is_file() {
        return Ok(entry.to_path_buf());
    }
    if !entry.is_dir() {
        return Err(Error::MakefileNotFound(entry.display().to_string()));
    }
    let kbuild = entry.join("Kbuild");
    if kbuild.is_file() {
        return Ok(kbuild);
    }
    let makefile = entry.join("Makefile");
    if makefile.is_file() {
        return Ok(makefile);
    }
    Err(Error::MakefileNotFound(entry.display().to_string()))
}
