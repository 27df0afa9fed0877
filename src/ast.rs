//! Abstract syntax for the supported makefile subset (spec section 6).
//!
//! Deliberately small: this models only what the evaluation engine
//! (`expand.rs`, `interpreter.rs`, `collect.rs`) actually consumes.
//! Constructs outside that subset (recipe bodies, pattern rules,
//! automatic variables) still parse, so a real Kbuild fragment containing
//! them doesn't fail to load, but they fold to inert data here.

/// One piece of an expansion: literal text, or something requiring
/// evaluation. `$@`/`$<`/other automatic variables have no grammar of
/// their own and show up as `Text` verbatim, since nothing here ever
/// resolves them (spec's Non-goals: no recipe execution).
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Text(String),
    VarRef(Expansion),
    Call(Function),
}

/// A sequence of elements concatenated together, e.g. `$(CC)-unused`
/// parses to `[VarRef([Text("CC")]), Text("-unused")]`.
pub type Expansion = Vec<Element>;

/// A function call, `$(name arg1,arg2,...)`. Functions the expansion
/// engine doesn't special-case still parse fine, so a directory that
/// merely contains one elsewhere doesn't fail to load; they only error
/// out if actually expanded (`Error::UnsupportedNode`).
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub args: Vec<Expansion>,
}

/// The left-hand side of an assignment. Kbuild occasionally expands
/// variable names too (`$(obj)-y := ...`), so this is an `Expansion`,
/// not a bare string.
pub type Name = Expansion;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Recursive,
    /// `:=`
    Simple,
    /// `+=`
    Append,
    /// `?=`
    Conditional,
}

/// The test governing one branch of an `ifdef`/`ifeq` chain (spec 4.5's
/// "Conditional blocks"). `negate` captures `ifndef`/`ifneq` at parse
/// time rather than pushing a `Not` onto every reference.
#[derive(Clone, Debug, PartialEq)]
pub enum BranchCondition {
    Ifdef { name: Name, negate: bool },
    Ifeq { negate: bool, lhs: Expansion, rhs: Expansion },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Assign {
        name: Name,
        op: AssignOp,
        value: Expansion,
    },
    /// `ifdef`/`ifeq` with any number of `else if`/`else` tails.
    Conditional {
        branches: Vec<(BranchCondition, Vec<Statement>)>,
        else_branch: Option<Vec<Statement>>,
    },
    Include {
        path: Expansion,
    },
    /// A rule (`target: prereqs` plus recipe lines). Parsed so files that
    /// contain ordinary build rules alongside Kbuild variable blocks
    /// still load, but never interpreted: recipe execution and
    /// dependency tracking are explicit Non-goals.
    Rule {
        target: Expansion,
        recipe: Vec<String>,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Makefile {
    pub statements: Vec<Statement>,
}
