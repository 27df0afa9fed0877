//! Symbolic evaluator for Kbuild-style makefiles: walks a directory tree,
//! interpreting each `Kbuild`/`Makefile` under a condition algebra instead
//! of a single fixed configuration, and reports every compilation unit,
//! subdirectory, composite, and library/host artifact together with the
//! presence condition under which it exists.

pub mod ast;
pub mod collect;
pub mod condition;
pub mod config;
pub mod driver;
pub mod error;
pub mod expand;
pub mod interpreter;
pub mod kbuild;
pub mod multiverse;
pub mod parser;
pub mod results;
pub mod store;
pub mod system;

pub use config::{Cli, ProjectConfig, Settings};
pub use driver::Driver;
pub use error::Error;
pub use kbuild::Kbuild;
pub use results::Results;
