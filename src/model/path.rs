//! Path stack — the ordered key sequence from the serialization root to the
//! node currently being visited.

use std::fmt;

use smallvec::SmallVec;

/// Self-token addressing the serialization root itself.
pub const ROOT_TOKEN: &str = "^";

/// One step along a traversal path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    /// Object field key.
    Key(String),
    /// Array element index.
    Index(usize),
}

impl fmt::Display for PathSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSeg::Key(k) => write!(f, "{k}"),
            PathSeg::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Mutable traversal path, pushed/popped as the walk descends/ascends.
///
/// Length is bounded by the recursion cap, so the inline capacity covers the
/// common case without heap allocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathStack {
    segs: SmallVec<[PathSeg; 8]>,
}

impl PathStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_key(&mut self, key: impl Into<String>) {
        self.segs.push(PathSeg::Key(key.into()));
    }

    pub fn push_index(&mut self, index: usize) {
        self.segs.push(PathSeg::Index(index));
    }

    pub fn pop(&mut self) -> Option<PathSeg> {
        self.segs.pop()
    }

    pub fn depth(&self) -> usize {
        self.segs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segs.is_empty()
    }

    /// Segments in root-to-current order, for the cycle guard.
    pub fn segs(&self) -> &[PathSeg] {
        &self.segs
    }

    pub fn join(&self, sep: &str) -> String {
        let parts: Vec<String> = self.segs.iter().map(ToString::to_string).collect();
        parts.join(sep)
    }

    /// Canonical back-reference expression addressing the current node from
    /// the root. The empty path addresses the root itself.
    pub fn expression(&self) -> String {
        if self.is_empty() {
            format!("${{(@path;@base:root):{ROOT_TOKEN}}}")
        } else {
            format!("${{(@path;@base:root):{}}}", self.join("."))
        }
    }
}
