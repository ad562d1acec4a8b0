//! Decoder — standard JSON parse followed by an interpolation pass that
//! rewrites back-reference expressions into live graph references.
//!
//! Stage one is plain serde_json. Stage two walks the freshly imported
//! arena: every container is registered under its canonical path key (the
//! mirror image of the encoder's first-sighting registration), and every
//! string leaf matching the grammar is resolved and patched in place. A
//! graph reference resolving to a container patches in the live id — that
//! is what reconstructs aliasing and true cycles in the decoded result.

use std::time::{Duration, Instant};

use hashbrown::HashMap;
use serde_json::Value as Json;

use crate::cycle::{
    detect_cycles, CHAIN_MAX_REPETITIONS, CHAIN_RUN_LENGTH, PATH_MAX_REPETITIONS, PATH_RUN_LENGTH,
};
use crate::encode::{CYCLE_SENTINEL, DEFAULT_MAX_DEPTH};
use crate::grammar::{self, BackRefExpr, RefKind};
use crate::model::{PathStack, Value, ValueGraph, ValueId};
use crate::resolved::{ResolvedEntry, ResolvedTable};
use crate::{Error, Result};

// ============================================================================
// Scope
// ============================================================================

/// Named values available to variable references.
///
/// Entries are plain JSON trees; resolution imports them into the target
/// arena on first use. Lookups honor the `_`-prefixed private-field
/// convention: a miss on `name` retries `_name`.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: HashMap<String, Json>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Json>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Json> {
        self.vars
            .get(name)
            .or_else(|| self.vars.get(format!("_{name}").as_str()))
    }

    pub fn require(&self, name: &str) -> Result<&Json> {
        self.get(name).ok_or_else(|| Error::ScopeMissing(name.to_owned()))
    }

    /// Dotted-path lookup: first segment names a scope entry, the rest
    /// navigate into it.
    pub fn lookup(&self, segments: &[String]) -> Option<&Json> {
        let (first, rest) = segments.split_first()?;
        let mut node = self.get(first)?;
        for seg in rest {
            node = json_member(node, seg)?;
        }
        Some(node)
    }
}

fn json_member<'a>(node: &'a Json, seg: &str) -> Option<&'a Json> {
    match node {
        Json::Object(map) => map
            .get(seg)
            .or_else(|| map.get(format!("_{seg}").as_str())),
        Json::Array(items) => items.get(seg.parse::<usize>().ok()?),
        _ => None,
    }
}

// ============================================================================
// Options
// ============================================================================

/// Decoder configuration.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Call-scoped variables.
    pub scope: Scope,
    /// Fallback scope for `@base:global` variable references. Explicit by
    /// design: there is no process-wide lookup.
    pub globals: Scope,
    /// Recursion cap for the interpolation walk.
    pub max_depth: usize,
    /// Wall-clock budget; on expiry the remaining subtree stays verbatim.
    pub max_run_time: Option<Duration>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            scope: Scope::new(),
            globals: Scope::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_run_time: None,
        }
    }
}

impl DecodeOptions {
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_globals(mut self, globals: Scope) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Json>) -> Self {
        self.scope.set(name, value);
        self
    }

    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<Json>) -> Self {
        self.globals.set(name, value);
        self
    }

    pub fn with_max_depth(mut self, cap: usize) -> Self {
        self.max_depth = cap;
        self
    }

    pub fn with_max_run_time(mut self, budget: Duration) -> Self {
        self.max_run_time = Some(budget);
        self
    }
}

/// A decoded document: the arena it was imported into plus its root.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub graph: ValueGraph,
    pub root: ValueId,
}

// ============================================================================
// Entry points
// ============================================================================

/// Decode JSON text into a fresh value graph.
pub fn decode(text: &str, opts: &DecodeOptions) -> Result<Decoded> {
    let mut graph = ValueGraph::new();
    let root = decode_into(&mut graph, text, opts)?;
    Ok(Decoded { graph, root })
}

/// Decode into an existing arena. Several documents decoded into one arena
/// can alias each other's nodes (with a shared table, see
/// [`decode_with_table`]).
pub fn decode_into(graph: &mut ValueGraph, text: &str, opts: &DecodeOptions) -> Result<ValueId> {
    let mut table = ResolvedTable::new();
    // a private table serves one call; the pass only matters when the text
    // carries expressions
    decode_inner(graph, text, opts, &mut table, text.contains("${"))
}

/// Decode with a caller-owned resolved table. A table kept across
/// sequential calls lets a later document's back-references resolve to
/// nodes registered while decoding an earlier one — so the registration
/// pass always runs here, expressions in the text or not.
pub fn decode_with_table(
    graph: &mut ValueGraph,
    text: &str,
    opts: &DecodeOptions,
    table: &mut ResolvedTable,
) -> Result<ValueId> {
    decode_inner(graph, text, opts, table, true)
}

fn decode_inner(
    graph: &mut ValueGraph,
    text: &str,
    opts: &DecodeOptions,
    table: &mut ResolvedTable,
    run_pass: bool,
) -> Result<ValueId> {
    let mut root = match serde_json::from_str::<Json>(text) {
        Ok(json) => graph.from_json(&json),
        Err(err) => {
            // documented fallback, not an error: the raw text survives as a
            // single-element sequence
            tracing::debug!(error = %err, "input is not parseable JSON, wrapping raw text");
            let raw = graph.alloc(Value::String(text.to_owned()));
            graph.alloc(Value::Array(vec![raw]))
        }
    };

    if run_pass {
        let mut ctx = InterpCtx {
            graph,
            root,
            table,
            opts,
            path: PathStack::new(),
            ancestors: Vec::new(),
            start: Instant::now(),
        };
        interpolate(&mut ctx, root);

        // a bare expression document resolves at the root itself
        let root_expr = match ctx.graph.get(root) {
            Some(Value::String(s)) if grammar::is_expression(s) => grammar::parse(s),
            _ => None,
        };
        if let Some(expr) = root_expr {
            let mut chain = Vec::new();
            if let Resolution::Value(v) = resolve_expr(&mut ctx, &expr, &mut chain) {
                root = v;
            }
        }
    }
    Ok(root)
}

// ============================================================================
// Interpolation walk
// ============================================================================

struct InterpCtx<'a> {
    graph: &'a mut ValueGraph,
    root: ValueId,
    table: &'a mut ResolvedTable,
    opts: &'a DecodeOptions,
    path: PathStack,
    ancestors: Vec<ValueId>,
    start: Instant,
}

enum Slot {
    Field { pos: usize, key: String, child: ValueId },
    Elem { pos: usize, child: ValueId },
}

fn interpolate(ctx: &mut InterpCtx, id: ValueId) {
    if let Some(budget) = ctx.opts.max_run_time {
        if ctx.start.elapsed() >= budget {
            return;
        }
    }
    if ctx.path.depth() > ctx.opts.max_depth {
        return;
    }
    if detect_cycles(ctx.path.segs(), PATH_RUN_LENGTH, PATH_MAX_REPETITIONS) {
        return;
    }
    if !matches!(ctx.graph.get(id), Some(v) if v.is_container()) {
        return;
    }

    // Register this container under its canonical path key — the decode-side
    // mirror of the encoder's first-sighting registration. Root-anchored
    // references resolve straight through these entries.
    let key = ctx.path.expression();
    if ctx.table.get(&key).is_none() {
        ctx.table.set(
            ResolvedEntry::with_value(key, id)
                .with_context(Some(ctx.root), ctx.ancestors.last().copied()),
        );
    }

    let slots = snapshot(ctx.graph, id);
    ctx.ancestors.push(id);
    for slot in &slots {
        let child = match slot {
            Slot::Field { child, .. } | Slot::Elem { child, .. } => *child,
        };
        let expr = match ctx.graph.get(child) {
            Some(Value::String(s)) if grammar::is_expression(s) => grammar::parse(s),
            _ => None,
        };
        if let Some(expr) = expr {
            let mut chain = Vec::new();
            match resolve_expr(ctx, &expr, &mut chain) {
                Resolution::Value(resolved) => patch(ctx.graph, id, slot, resolved),
                Resolution::Cycle => {
                    let marker = ctx.graph.alloc(Value::String(CYCLE_SENTINEL.into()));
                    patch(ctx.graph, id, slot, marker);
                }
                // unresolvable references stay verbatim
                Resolution::Unresolved => {}
            }
        } else if matches!(ctx.graph.get(child), Some(v) if v.is_container()) {
            match slot {
                Slot::Field { key, .. } => ctx.path.push_key(key.clone()),
                Slot::Elem { pos, .. } => ctx.path.push_index(*pos),
            }
            interpolate(ctx, child);
            ctx.path.pop();
        }
    }
    ctx.ancestors.pop();
}

fn snapshot(graph: &ValueGraph, id: ValueId) -> Vec<Slot> {
    match graph.get(id) {
        Some(Value::Object(fields)) => fields
            .iter()
            .enumerate()
            .map(|(pos, (key, child))| Slot::Field { pos, key: key.clone(), child: *child })
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(pos, child)| Slot::Elem { pos, child: *child })
            .collect(),
        _ => Vec::new(),
    }
}

fn patch(graph: &mut ValueGraph, parent: ValueId, slot: &Slot, new_child: ValueId) {
    match (graph.get_mut(parent), slot) {
        (Some(Value::Object(fields)), Slot::Field { pos, .. }) => {
            if let Some(field) = fields.get_mut(*pos) {
                field.1 = new_child;
            }
        }
        (Some(Value::Array(items)), Slot::Elem { pos, .. }) => {
            if let Some(item) = items.get_mut(*pos) {
                *item = new_child;
            }
        }
        _ => {}
    }
}

// ============================================================================
// Resolution
// ============================================================================

enum Resolution {
    Value(ValueId),
    Cycle,
    Unresolved,
}

fn resolve_expr(ctx: &mut InterpCtx, expr: &BackRefExpr, chain: &mut Vec<String>) -> Resolution {
    // Memoized resolutions and registered containers hit here — including
    // nodes registered by an earlier decode through a shared table.
    if let Some(entry) = ctx.table.get(&expr.source) {
        if let Some(v) = entry.value {
            return Resolution::Value(v);
        }
    }

    chain.push(expr.source.clone());
    if detect_cycles(chain, CHAIN_RUN_LENGTH, CHAIN_MAX_REPETITIONS) {
        chain.pop();
        return Resolution::Cycle;
    }
    let resolution = match expr.kind {
        RefKind::Graph => resolve_graph(ctx, expr, chain),
        RefKind::Variable => resolve_variable(ctx, expr, chain),
    };
    chain.pop();

    if let Resolution::Value(v) = resolution {
        ctx.table.set_value(expr.source.clone(), v);
    }
    resolution
}

fn resolve_graph(ctx: &mut InterpCtx, expr: &BackRefExpr, chain: &mut Vec<String>) -> Resolution {
    let mut node = if expr.is_root_base() {
        // `../` never applies to root-anchored references
        ctx.root
    } else if expr.is_current_base() {
        // anchor at the enclosing container, then hop up
        let len = ctx.ancestors.len();
        let hops = expr.parent_hops.min(len.saturating_sub(1));
        match len.checked_sub(hops + 1).and_then(|i| ctx.ancestors.get(i)) {
            Some(id) => *id,
            None => ctx.root,
        }
    } else {
        // named anchor from scope
        let opts = ctx.opts;
        let Some(json) = opts
            .scope
            .get(&expr.base)
            .or_else(|| opts.globals.get(&expr.base))
        else {
            return Resolution::Unresolved;
        };
        let json = json.clone();
        ctx.graph.from_json(&json)
    };

    for seg in &expr.segments {
        node = match deref_expression(ctx, node, chain) {
            Deref::Node(n) => n,
            Deref::Cycle => return Resolution::Cycle,
            Deref::Unresolved => return Resolution::Unresolved,
        };
        let next = match ctx.graph.get(node) {
            Some(Value::Object(_)) => ctx
                .graph
                .field(node, seg)
                .or_else(|| ctx.graph.field(node, &format!("_{seg}"))),
            Some(Value::Array(_)) => {
                seg.parse::<usize>().ok().and_then(|i| ctx.graph.index(node, i))
            }
            _ => None,
        };
        let Some(next) = next else {
            return Resolution::Unresolved;
        };
        node = next;
    }

    // the addressed node may itself be another expression
    match deref_expression(ctx, node, chain) {
        Deref::Node(n) => node = n,
        Deref::Cycle => return Resolution::Cycle,
        Deref::Unresolved => return Resolution::Unresolved,
    }

    // containers resolve to the live reference; scalars are copied by value
    match ctx.graph.get(node) {
        Some(v) if v.is_container() => Resolution::Value(node),
        Some(v) => {
            let copy = v.clone();
            Resolution::Value(ctx.graph.alloc(copy))
        }
        None => Resolution::Unresolved,
    }
}

fn resolve_variable(ctx: &mut InterpCtx, expr: &BackRefExpr, chain: &mut Vec<String>) -> Resolution {
    let opts = ctx.opts;
    let json = opts.scope.lookup(&expr.segments).or_else(|| {
        if expr.is_global_base() {
            opts.globals.lookup(&expr.segments)
        } else {
            None
        }
    });
    let Some(json) = json else {
        return Resolution::Unresolved;
    };

    // a variable holding another expression chains through it
    if let Json::String(s) = json {
        if grammar::is_expression(s) {
            return match grammar::parse(s) {
                Some(inner) => resolve_expr(ctx, &inner, chain),
                None => Resolution::Unresolved,
            };
        }
    }
    let json = json.clone();
    Resolution::Value(ctx.graph.from_json(&json))
}

enum Deref {
    Node(ValueId),
    Cycle,
    Unresolved,
}

/// Follow a node that turns out to be an expression string.
fn deref_expression(ctx: &mut InterpCtx, node: ValueId, chain: &mut Vec<String>) -> Deref {
    let expr = match ctx.graph.get(node) {
        Some(Value::String(s)) if grammar::is_expression(s) => grammar::parse(s),
        _ => None,
    };
    match expr {
        None => Deref::Node(node),
        Some(expr) => match resolve_expr(ctx, &expr, chain) {
            Resolution::Value(v) => Deref::Node(v),
            Resolution::Cycle => Deref::Cycle,
            Resolution::Unresolved => Deref::Unresolved,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_underscore_convention() {
        let mut scope = Scope::new();
        scope.set("_secret", Json::from(7));
        assert_eq!(scope.get("secret"), Some(&Json::from(7)));
        assert!(scope.get("missing").is_none());
        assert!(scope.require("missing").is_err());
    }

    #[test]
    fn test_scope_dotted_lookup() {
        let mut scope = Scope::new();
        scope.set("user", serde_json::json!({"name": {"first": "Ada"}, "_age": 3}));
        let segs: Vec<String> = vec!["user".into(), "name".into(), "first".into()];
        assert_eq!(scope.lookup(&segs), Some(&Json::from("Ada")));
        let segs: Vec<String> = vec!["user".into(), "age".into()];
        assert_eq!(scope.lookup(&segs), Some(&Json::from(3)));
    }

    #[test]
    fn test_plain_document_no_interpolation() {
        let decoded = decode(r#"{"a":1}"#, &DecodeOptions::default()).unwrap();
        let a = decoded.graph.field(decoded.root, "a").unwrap();
        assert_eq!(decoded.graph.get(a), Some(&Value::Int(1)));
    }

    #[test]
    fn test_variable_interpolation() {
        let opts = DecodeOptions::default().with_var("name", "Ada");
        let decoded = decode(r#"{"greeting":"${name}"}"#, &opts).unwrap();
        let g = decoded.graph.field(decoded.root, "greeting").unwrap();
        assert_eq!(decoded.graph.get(g), Some(&Value::String("Ada".into())));
    }

    #[test]
    fn test_global_fallback() {
        let opts = DecodeOptions::default().with_global("answer", 42);
        let decoded = decode(r#"{"x":"${answer}"}"#, &opts).unwrap();
        let x = decoded.graph.field(decoded.root, "x").unwrap();
        assert_eq!(decoded.graph.get(x), Some(&Value::Int(42)));
    }

    #[test]
    fn test_unresolvable_left_verbatim() {
        let decoded = decode(r#"{"x":"${nobody}"}"#, &DecodeOptions::default()).unwrap();
        let x = decoded.graph.field(decoded.root, "x").unwrap();
        assert_eq!(decoded.graph.get(x), Some(&Value::String("${nobody}".into())));
    }

    #[test]
    fn test_variable_chain() {
        let opts = DecodeOptions::default()
            .with_var("a", "${b}")
            .with_var("b", "done");
        let decoded = decode(r#"{"x":"${a}"}"#, &opts).unwrap();
        let x = decoded.graph.field(decoded.root, "x").unwrap();
        assert_eq!(decoded.graph.get(x), Some(&Value::String("done".into())));
    }

    #[test]
    fn test_variable_self_loop_detected() {
        let opts = DecodeOptions::default().with_var("me", "${me}");
        let decoded = decode(r#"{"x":"${me}"}"#, &opts).unwrap();
        let x = decoded.graph.field(decoded.root, "x").unwrap();
        assert_eq!(
            decoded.graph.get(x),
            Some(&Value::String(CYCLE_SENTINEL.into()))
        );
    }
}
