//! Resolved table — the memo/aliasing store.
//!
//! Associates a canonical back-reference key with a previously encountered
//! node and, once serialization of that node finishes, its text fragment.
//! This is what turns the naive unbounded walk over a cyclic or aliased
//! graph into a single-visit walk: each identity is fully serialized at
//! most once, every later sighting is a table hit.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::model::ValueId;

/// One memo entry. `root`/`current` record the traversal context the entry
/// was created under, so identity scans can be narrowed to one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    /// Canonical back-reference expression text.
    pub key: String,
    /// The node the key addresses, once known.
    pub value: Option<ValueId>,
    /// Root of the traversal that created the entry.
    pub root: Option<ValueId>,
    /// Container enclosing the node at creation time.
    pub current: Option<ValueId>,
    /// Finished JSON text of the node. Absent while the node is still
    /// mid-serialization — that absence is how a true cycle looks.
    pub fragment: Option<String>,
}

impl ResolvedEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            root: None,
            current: None,
            fragment: None,
        }
    }

    pub fn with_value(key: impl Into<String>, value: ValueId) -> Self {
        Self {
            value: Some(value),
            ..Self::new(key)
        }
    }

    pub fn with_context(mut self, root: Option<ValueId>, current: Option<ValueId>) -> Self {
        self.root = root;
        self.current = current;
        self
    }
}

/// Memo store keyed by back-reference expression text.
///
/// Owned by one encode/decode call at a time; sharing across *sequential*
/// calls over one arena is supported and is how cross-document aliasing
/// works. Not internally synchronized — see [`SharedResolvedTable`].
#[derive(Debug, Clone, Default)]
pub struct ResolvedTable {
    entries: HashMap<String, ResolvedEntry>,
}

impl ResolvedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Exact string-key lookup.
    pub fn get(&self, key: &str) -> Option<&ResolvedEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ResolvedEntry> {
        self.entries.get_mut(key)
    }

    /// Insert or overwrite a full entry under its own key.
    pub fn set(&mut self, entry: ResolvedEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Insert or overwrite, wrapping a raw node id into an entry.
    pub fn set_value(&mut self, key: impl Into<String>, value: ValueId) {
        let entry = ResolvedEntry::with_value(key, value);
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Linear scan for an entry holding `value`, optionally narrowed to a
    /// recorded root/current context. This is the aliasing detector: it
    /// finds a node again no matter which path reached it first.
    pub fn find(
        &self,
        value: ValueId,
        root: Option<ValueId>,
        current: Option<ValueId>,
    ) -> Option<&ResolvedEntry> {
        self.entries.values().find(|entry| {
            entry.value == Some(value)
                && (root.is_none() || entry.root == root)
                && (current.is_none() || entry.current == current)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedEntry> {
        self.entries.values()
    }
}

/// Cross-call sharing handle.
///
/// The table itself is not thread-safe; this wrapper is the external
/// synchronization for callers that keep one table alive across calls
/// (cross-document aliasing) or hand it between threads.
#[derive(Debug, Clone, Default)]
pub struct SharedResolvedTable {
    inner: Arc<Mutex<ResolvedTable>>,
}

impl SharedResolvedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a closure against the locked table.
    pub fn with<R>(&self, f: impl FnOnce(&mut ResolvedTable) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let mut table = ResolvedTable::new();
        assert!(table.get("k").is_none());
        table.set_value("k", ValueId(3));
        assert_eq!(table.get("k").and_then(|e| e.value), Some(ValueId(3)));

        // set overwrites
        table.set(ResolvedEntry::with_value("k", ValueId(4)));
        assert_eq!(table.get("k").and_then(|e| e.value), Some(ValueId(4)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_find_by_identity() {
        let mut table = ResolvedTable::new();
        table.set(ResolvedEntry::with_value("a", ValueId(1)).with_context(Some(ValueId(0)), None));
        table.set(ResolvedEntry::with_value("b", ValueId(2)).with_context(Some(ValueId(9)), None));

        assert_eq!(table.find(ValueId(2), None, None).map(|e| e.key.as_str()), Some("b"));
        assert!(table.find(ValueId(2), Some(ValueId(0)), None).is_none());
        assert!(table.find(ValueId(5), None, None).is_none());
    }

    #[test]
    fn test_shared_table() {
        let shared = SharedResolvedTable::new();
        shared.with(|t| t.set_value("k", ValueId(1)));
        let hit = shared.with(|t| t.get("k").and_then(|e| e.value));
        assert_eq!(hit, Some(ValueId(1)));
    }
}
