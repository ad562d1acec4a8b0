//! Back-reference expression descriptor — the parsed form of
//! `${(<hint>):<argument>}`.

use std::fmt;

/// Base name anchoring graph references at the document root.
pub const BASE_ROOT: &str = "root";
/// Base name selecting the ambient global scope for variable references.
pub const BASE_GLOBAL: &str = "global";

/// Reference kind, selected by the first hint token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Addresses a node of the value graph by path (`@path`, `@tree`,
    /// `@object`, `@obj`).
    Graph,
    /// Addresses a scope variable (`@var`, `@variable`, `@value`, or no
    /// hint at all).
    Variable,
}

/// Structured form of a back-reference expression.
#[derive(Debug, Clone, PartialEq)]
pub struct BackRefExpr {
    pub kind: RefKind,
    /// Resolution anchor: `root`, `this`/`current`, `global`, or a named
    /// scope key.
    pub base: String,
    /// Number of leading `../` tokens — each one means "one level up from
    /// the current path". Graph kind only; ignored for variables.
    pub parent_hops: usize,
    /// Remaining dot/slash-delimited path. Empty means the base itself
    /// (the `^` root self-token normalizes here).
    pub segments: Vec<String>,
    /// Original expression text. Memoization key for the resolved table.
    pub source: String,
}

impl BackRefExpr {
    pub fn is_root_base(&self) -> bool {
        self.base == BASE_ROOT
    }

    /// `this`, `current`, and the empty base all anchor at the enclosing
    /// container.
    pub fn is_current_base(&self) -> bool {
        matches!(self.base.as_str(), "this" | "current" | "")
    }

    pub fn is_global_base(&self) -> bool {
        self.base == BASE_GLOBAL
    }

    /// True when the expression addresses its base with no further
    /// navigation.
    pub fn targets_base(&self) -> bool {
        self.parent_hops == 0 && self.segments.is_empty()
    }
}

impl fmt::Display for BackRefExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
