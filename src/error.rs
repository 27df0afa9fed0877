//! Error types

use thiserror::Error;

use crate::system::errorln;

/// Failures from the condition algebra (BDD side).
#[derive(Debug, Error)]
pub enum CondError {
    #[error("minterm references unregistered atom slot {0}")]
    UnknownAtom(usize),
    #[error("condition algebra ran out of atom slots ({0} registered)")]
    CapacityExceeded(usize),
}

/// Crate-wide error type. Only genuinely fatal conditions (spec section 7)
/// are represented here; everything else is handled by logging a warning
/// and continuing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read `{0}`: {1}")]
    ReadFile(String, std::io::Error),

    #[error("`{0}` not found (expected a `Kbuild` or `Makefile`)")]
    MakefileNotFound(String),

    #[error("cannot parse makefile syntax near line {0}: {1}")]
    Parse(usize, String),

    #[error("unsupported statement or expansion node: {0}")]
    UnsupportedNode(String),

    #[error("unsupported conditional branch: {0}")]
    UnsupportedCondition(String),

    #[error("host-program composite `{0}` is not supported")]
    HostProgComposite(String),

    #[error("`{0}` has no defined semantics here: {1}")]
    NotImplemented(String, &'static str),

    #[error("malformed `--define` argument `{0}`, expected NAME=VALUE")]
    MalformedDefine(String),

    #[error("cannot parse project config `{0}`: {1}")]
    ParseProjectConfig(String, toml::de::Error),

    #[error(transparent)]
    Condition(#[from] CondError),
}

impl Error {
    pub fn print(&self) {
        errorln!("{}", self);
    }
}
