//! ValueGraph — arena storage for value nodes.
//!
//! Nodes live in a flat slab addressed by `ValueId`. Containers reference
//! children by index, so aliasing is two slots holding one id and a cycle is
//! an id reachable from itself. Nothing here traverses unboundedly: the
//! walks below carry visited bitmaps or active stacks.

use hashbrown::HashSet;
use serde_json::Value as Json;

use crate::{Error, Result};
use super::{Value, ValueId};

/// Arena of value nodes. One graph may host several document roots; that is
/// how cross-document aliasing works.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueGraph {
    nodes: Vec<Value>,
}

impl ValueGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { nodes: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: ValueId) -> bool {
        (id.0 as usize) < self.nodes.len()
    }

    /// Allocate a node and return its id.
    pub fn alloc(&mut self, value: Value) -> ValueId {
        let id = ValueId(self.nodes.len() as u32);
        self.nodes.push(value);
        id
    }

    pub fn get(&self, id: ValueId) -> Option<&Value> {
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: ValueId) -> Option<&mut Value> {
        self.nodes.get_mut(id.0 as usize)
    }

    // ========================================================================
    // Builder helpers
    // ========================================================================

    pub fn alloc_object(&mut self) -> ValueId {
        self.alloc(Value::Object(Vec::new()))
    }

    pub fn alloc_array(&mut self) -> ValueId {
        self.alloc(Value::Array(Vec::new()))
    }

    /// Set a field on an object node, replacing any existing value under the
    /// same key. No-op (returning false) when `id` is not an object.
    pub fn set_field(&mut self, id: ValueId, key: impl Into<String>, child: ValueId) -> bool {
        let key = key.into();
        match self.get_mut(id) {
            Some(Value::Object(fields)) => {
                if let Some(slot) = fields.iter_mut().find(|(k, _)| *k == key) {
                    slot.1 = child;
                } else {
                    fields.push((key, child));
                }
                true
            }
            _ => false,
        }
    }

    /// Append an element to an array node.
    pub fn push_elem(&mut self, id: ValueId, child: ValueId) -> bool {
        match self.get_mut(id) {
            Some(Value::Array(items)) => {
                items.push(child);
                true
            }
            _ => false,
        }
    }

    /// Look up an object field by key.
    pub fn field(&self, id: ValueId, key: &str) -> Option<ValueId> {
        match self.get(id)? {
            Value::Object(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| *v),
            _ => None,
        }
    }

    /// Look up an array element by index.
    pub fn index(&self, id: ValueId, index: usize) -> Option<ValueId> {
        match self.get(id)? {
            Value::Array(items) => items.get(index).copied(),
            _ => None,
        }
    }

    // ========================================================================
    // Plain-JSON interop
    // ========================================================================

    /// Import a parsed JSON tree into the arena. Trees are strictly shaped,
    /// so this never aliases and never cycles.
    pub fn from_json(&mut self, json: &Json) -> ValueId {
        match json {
            Json::Null => self.alloc(Value::Null),
            Json::Bool(b) => self.alloc(Value::Bool(*b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    self.alloc(Value::Int(i))
                } else if let Some(u) = n.as_u64() {
                    self.alloc(Value::BigInt(u as i128))
                } else {
                    self.alloc(Value::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            Json::String(s) => self.alloc(Value::String(s.clone())),
            Json::Array(items) => {
                let children: Vec<ValueId> = items.iter().map(|j| self.from_json(j)).collect();
                self.alloc(Value::Array(children))
            }
            Json::Object(fields) => {
                let children: Vec<(String, ValueId)> = fields
                    .iter()
                    .map(|(k, j)| (k.clone(), self.from_json(j)))
                    .collect();
                self.alloc(Value::Object(children))
            }
        }
    }

    /// Export a subtree as a plain JSON tree. Shared acyclic subtrees are
    /// re-embedded by duplication; a true cycle cannot be expressed and
    /// yields `Error::CyclicGraph`.
    pub fn to_json(&self, id: ValueId) -> Result<Json> {
        let mut active = IdSet::new();
        self.to_json_inner(id, &mut active)
    }

    fn to_json_inner(&self, id: ValueId, active: &mut IdSet) -> Result<Json> {
        let value = self.get(id).ok_or(Error::DanglingRef(id))?;
        let json = match value {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::BigInt(b) => {
                if let Ok(i) = i64::try_from(*b) {
                    Json::from(i)
                } else if let Ok(u) = u64::try_from(*b) {
                    Json::from(u)
                } else {
                    Json::String(b.to_string())
                }
            }
            Value::String(s) => Json::String(s.clone()),
            Value::Func { name } => {
                let mut obj = serde_json::Map::new();
                obj.insert("type".into(), Json::String("function".into()));
                obj.insert(
                    "name".into(),
                    Json::String(name.clone().unwrap_or_else(|| "anonymous".into())),
                );
                Json::Object(obj)
            }
            Value::Date(dt) => Json::from(dt.timestamp_millis()),
            Value::Array(items) => {
                if !active.insert(id) {
                    return Err(Error::CyclicGraph);
                }
                let mut out = Vec::with_capacity(items.len());
                for child in items {
                    out.push(self.to_json_inner(*child, active)?);
                }
                active.remove(id);
                Json::Array(out)
            }
            Value::Object(fields) => {
                if !active.insert(id) {
                    return Err(Error::CyclicGraph);
                }
                let mut out = serde_json::Map::new();
                for (key, child) in fields {
                    out.insert(key.clone(), self.to_json_inner(*child, active)?);
                }
                active.remove(id);
                Json::Object(out)
            }
        };
        Ok(json)
    }

    // ========================================================================
    // Structural equality
    // ========================================================================

    /// Deep structural equality between two subtrees, possibly in different
    /// graphs. Terminates on cycles: a node pair already under comparison is
    /// assumed equal (bisimulation), so two structurally identical cyclic
    /// graphs compare equal regardless of arena layout.
    pub fn structural_eq(&self, a: ValueId, other: &ValueGraph, b: ValueId) -> bool {
        let mut pairs = HashSet::new();
        self.structural_eq_inner(a, other, b, &mut pairs)
    }

    fn structural_eq_inner(
        &self,
        a: ValueId,
        other: &ValueGraph,
        b: ValueId,
        pairs: &mut HashSet<(u32, u32)>,
    ) -> bool {
        let (Some(va), Some(vb)) = (self.get(a), other.get(b)) else {
            return false;
        };
        match (va, vb) {
            (Value::Array(xs), Value::Array(ys)) => {
                if xs.len() != ys.len() || !pairs.insert((a.0, b.0)) {
                    return xs.len() == ys.len();
                }
                xs.iter()
                    .zip(ys)
                    .all(|(x, y)| self.structural_eq_inner(*x, other, *y, pairs))
            }
            (Value::Object(xs), Value::Object(ys)) => {
                if xs.len() != ys.len() || !pairs.insert((a.0, b.0)) {
                    return xs.len() == ys.len();
                }
                xs.iter().zip(ys).all(|((kx, x), (ky, y))| {
                    kx == ky && self.structural_eq_inner(*x, other, *y, pairs)
                })
            }
            (x, y) => x == y,
        }
    }

    // ========================================================================
    // Preview
    // ========================================================================

    /// Bounded best-effort rendering, one container level deep. Used when a
    /// traversal is aborted and a human-readable stand-in is needed.
    pub fn preview(&self, id: ValueId) -> String {
        let Some(value) = self.get(id) else {
            return format!("<dangling {id}>");
        };
        match value {
            Value::Array(items) => {
                let inner: Vec<String> = items
                    .iter()
                    .map(|c| self.preview_scalar(*c))
                    .collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Object(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(k, c)| format!("{k}: {}", self.preview_scalar(*c)))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            scalar => scalar.to_string(),
        }
    }

    fn preview_scalar(&self, id: ValueId) -> String {
        match self.get(id) {
            Some(v) => v.to_string(),
            None => format!("<dangling {id}>"),
        }
    }
}

// ============================================================================
// IdSet — visited-identity bitmap
// ============================================================================

/// Bitmap over `ValueId`s. The visited set of a traversal: an identity is
/// inserted before its children are walked, which is what makes true cycles
/// terminate.
#[derive(Debug, Clone, Default)]
pub struct IdSet {
    bits: Vec<u64>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an id. Returns true if it was not already present.
    pub fn insert(&mut self, id: ValueId) -> bool {
        let (word, bit) = (id.0 as usize / 64, id.0 as usize % 64);
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        let fresh = self.bits[word] & (1 << bit) == 0;
        self.bits[word] |= 1 << bit;
        fresh
    }

    pub fn remove(&mut self, id: ValueId) {
        let (word, bit) = (id.0 as usize / 64, id.0 as usize % 64);
        if word < self.bits.len() {
            self.bits[word] &= !(1 << bit);
        }
    }

    pub fn contains(&self, id: ValueId) -> bool {
        let (word, bit) = (id.0 as usize / 64, id.0 as usize % 64);
        self.bits.get(word).is_some_and(|w| w & (1 << bit) != 0)
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }
}
