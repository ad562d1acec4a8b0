//! Encoder — walks a value graph and emits JSON text, substituting
//! back-reference expressions wherever a node has already been seen.
//!
//! The walk is single-visit: a container is fully serialized the first time
//! its identity appears; every later sighting (an alias, or the node itself
//! mid-serialization — a true cycle) emits the expression recorded at the
//! first sighting. Degraded output is always preferred to failure: depth,
//! time, and per-field problems substitute sentinels and keep going.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::cycle::{detect_cycles, PATH_MAX_REPETITIONS, PATH_RUN_LENGTH};
use crate::model::{IdSet, PathStack, Value, ValueGraph, ValueId};
use crate::resolved::{ResolvedEntry, ResolvedTable};
use crate::{Error, Result};

/// Substituted for a node past the recursion cap.
pub const RECURSION_SENTINEL: &str = "Maximum Recursion Exceeded";
/// Substituted for a branch the repeat detector flagged.
pub const CYCLE_SENTINEL: &str = "Cycle Detected";
/// Default recursion cap.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Keys never serialized, before any caller-supplied filtering.
const DEFAULT_EXCLUDE: [&str; 6] =
    ["constructor", "prototype", "toJson", "toObject", "global", "this"];

/// What the null handler asks the encoder to emit for an undefined value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NullPolicy {
    /// Emit an empty quoted string (the default).
    EmptyString,
    /// Pass through as JSON `null`.
    Null,
    /// Emit an arbitrary replacement string.
    Text(String),
}

pub type NullHandler = Box<dyn Fn(&PathStack) -> NullPolicy>;
pub type ErrorHook = Box<dyn Fn(&str, &Error)>;
pub type DateFormatter = Box<dyn Fn(&DateTime<Utc>) -> String>;

/// Encoder configuration.
pub struct EncodeOptions {
    /// Policy for `Value::Undefined`. `None` means [`NullPolicy::EmptyString`].
    pub null_handler: Option<NullHandler>,
    /// Emit functions as empty strings instead of descriptor objects.
    pub omit_functions: bool,
    /// Force-quote booleans.
    pub quote_booleans: bool,
    /// Force-quote numbers (including big integers).
    pub quote_numbers: bool,
    /// When non-empty, only these keys are serialized.
    pub include: Vec<String>,
    /// Keys dropped in addition to the built-in exclusion set.
    pub exclude: Vec<String>,
    /// Recursion cap; deeper nodes become [`RECURSION_SENTINEL`].
    pub max_depth: usize,
    /// Wall-clock budget for the whole call. `None` means unlimited.
    pub max_run_time: Option<Duration>,
    /// Renders dates as strings; the default is epoch milliseconds.
    pub date_formatter: Option<DateFormatter>,
    /// Per-field error hook. The default logs a warning and continues.
    pub on_error: Option<ErrorHook>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            null_handler: None,
            omit_functions: false,
            quote_booleans: false,
            quote_numbers: false,
            include: Vec::new(),
            exclude: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_run_time: None,
            date_formatter: None,
            on_error: None,
        }
    }
}

impl EncodeOptions {
    pub fn with_max_depth(mut self, cap: usize) -> Self {
        self.max_depth = cap;
        self
    }

    pub fn with_max_run_time(mut self, budget: Duration) -> Self {
        self.max_run_time = Some(budget);
        self
    }

    pub fn with_include(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn omitting_functions(mut self) -> Self {
        self.omit_functions = true;
        self
    }

    pub fn quoting_booleans(mut self) -> Self {
        self.quote_booleans = true;
        self
    }

    pub fn quoting_numbers(mut self) -> Self {
        self.quote_numbers = true;
        self
    }

    pub fn with_null_handler(mut self, handler: NullHandler) -> Self {
        self.null_handler = Some(handler);
        self
    }

    pub fn with_date_formatter(mut self, formatter: DateFormatter) -> Self {
        self.date_formatter = Some(formatter);
        self
    }

    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Serialize the subtree rooted at `root` into JSON text.
///
/// Never fails for well-formed inputs; the only hard error is a root id
/// outside the arena.
pub fn encode(graph: &ValueGraph, root: ValueId, opts: &EncodeOptions) -> Result<String> {
    let mut table = ResolvedTable::new();
    encode_with_table(graph, root, opts, &mut table)
}

/// Serialize with a caller-owned resolved table. Sharing one table across
/// sequential calls over one arena makes later documents reference nodes
/// already serialized by earlier ones instead of re-embedding them.
pub fn encode_with_table(
    graph: &ValueGraph,
    root: ValueId,
    opts: &EncodeOptions,
    table: &mut ResolvedTable,
) -> Result<String> {
    if !graph.contains(root) {
        return Err(Error::InvalidRoot(root));
    }
    let mut ctx = Ctx {
        graph,
        root,
        visited: IdSet::new(),
        path: PathStack::new(),
        table,
        opts,
        start: Instant::now(),
    };
    match encode_node(&mut ctx, root, None) {
        Ok(text) => Ok(text),
        // deadline hit: the whole call degrades to a preview of the value
        // that tripped the check
        Err(Halt::Time(preview)) => Ok(preview),
    }
}

// ============================================================================
// Traversal
// ============================================================================

struct Ctx<'a> {
    graph: &'a ValueGraph,
    root: ValueId,
    visited: IdSet,
    path: PathStack,
    table: &'a mut ResolvedTable,
    opts: &'a EncodeOptions,
    start: Instant,
}

/// Whole-call abort. Everything else degrades in place.
enum Halt {
    Time(String),
}

fn encode_node(ctx: &mut Ctx, id: ValueId, parent: Option<ValueId>) -> std::result::Result<String, Halt> {
    let graph = ctx.graph;

    if let Some(budget) = ctx.opts.max_run_time {
        if ctx.start.elapsed() >= budget {
            return Err(Halt::Time(graph.preview(id)));
        }
    }

    let Some(value) = graph.get(id) else {
        let err = Error::DanglingRef(id);
        report_field_error(ctx, &err);
        return Ok(json_quote(&format!("Error: {err}")));
    };

    let text = match value {
        Value::Undefined => match ctx.opts.null_handler.as_ref() {
            None => json_quote(""),
            Some(handler) => match handler(&ctx.path) {
                NullPolicy::EmptyString => json_quote(""),
                NullPolicy::Null => "null".to_owned(),
                NullPolicy::Text(s) => json_quote(&s),
            },
        },
        Value::Null => "null".to_owned(),
        Value::Bool(b) => {
            if ctx.opts.quote_booleans {
                json_quote(if *b { "true" } else { "false" })
            } else {
                b.to_string()
            }
        }
        Value::Int(i) => quote_number(ctx, i.to_string()),
        Value::BigInt(b) => quote_number(ctx, b.to_string()),
        Value::Float(f) => {
            if f.is_nan() {
                json_quote("NaN")
            } else if f.is_infinite() {
                json_quote("Infinity")
            } else {
                let literal = serde_json::Number::from_f64(*f)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| f.to_string());
                quote_number(ctx, literal)
            }
        }
        Value::String(s) => json_quote(s),
        Value::Func { name } => {
            if ctx.opts.omit_functions {
                json_quote("")
            } else {
                format!(
                    r#"{{"type":"function","name":{}}}"#,
                    json_quote(name.as_deref().unwrap_or("anonymous"))
                )
            }
        }
        Value::Date(dt) => match ctx.opts.date_formatter.as_ref() {
            Some(formatter) => json_quote(&formatter(dt)),
            None => dt.timestamp_millis().to_string(),
        },
        Value::Array(items) => encode_container(ctx, id, parent, Children::Array(items))?,
        Value::Object(fields) => encode_container(ctx, id, parent, Children::Object(fields))?,
    };
    Ok(text)
}

enum Children<'v> {
    Array(&'v [ValueId]),
    Object(&'v [(String, ValueId)]),
}

fn encode_container(
    ctx: &mut Ctx,
    id: ValueId,
    parent: Option<ValueId>,
    children: Children<'_>,
) -> std::result::Result<String, Halt> {
    // A node seen before — aliased, or mid-serialization in a cycle —
    // is never re-embedded: emit the expression of its first sighting.
    if ctx.visited.contains(id) || ctx.table.find(id, None, None).is_some() {
        if let Some(entry) = ctx.table.find(id, None, None) {
            return Ok(json_quote(&entry.key));
        }
        return Ok(json_quote(&ctx.path.expression()));
    }

    if detect_cycles(ctx.path.segs(), PATH_RUN_LENGTH, PATH_MAX_REPETITIONS) {
        return Ok(json_quote(CYCLE_SENTINEL));
    }

    if ctx.path.depth() > ctx.opts.max_depth {
        return Ok(json_quote(RECURSION_SENTINEL));
    }

    // Register before descending: children finding this identity again is
    // exactly the cycle case.
    let key = ctx.path.expression();
    ctx.visited.insert(id);
    ctx.table.set(
        ResolvedEntry::with_value(key.clone(), id).with_context(Some(ctx.root), parent),
    );

    let text = match children {
        Children::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for (i, child) in items.iter().enumerate() {
                ctx.path.push_index(i);
                let piece = encode_node(ctx, *child, Some(id));
                ctx.path.pop();
                parts.push(piece?);
            }
            format!("[{}]", parts.join(","))
        }
        Children::Object(fields) => {
            let mut parts = Vec::with_capacity(fields.len());
            for (k, child) in fields {
                if !key_allowed(ctx.opts, k) {
                    continue;
                }
                ctx.path.push_key(k.clone());
                let piece = encode_node(ctx, *child, Some(id));
                ctx.path.pop();
                parts.push(format!("{}:{}", json_quote(k), piece?));
            }
            format!("{{{}}}", parts.join(","))
        }
    };

    if let Some(entry) = ctx.table.get_mut(&key) {
        entry.fragment = Some(text.clone());
    }
    Ok(text)
}

fn key_allowed(opts: &EncodeOptions, key: &str) -> bool {
    if DEFAULT_EXCLUDE.contains(&key) {
        return false;
    }
    if !opts.include.is_empty() && !opts.include.iter().any(|k| k == key) {
        return false;
    }
    !opts.exclude.iter().any(|k| k == key)
}

fn report_field_error(ctx: &Ctx, err: &Error) {
    let at = ctx.path.join(".");
    match ctx.opts.on_error.as_ref() {
        Some(hook) => hook(&at, err),
        None => tracing::warn!(path = %at, error = %err, "field failed to encode, substituting error marker"),
    }
}

fn quote_number(ctx: &Ctx, literal: String) -> String {
    if ctx.opts.quote_numbers {
        json_quote(&literal)
    } else {
        literal
    }
}

/// JSON string literal with correct escaping.
fn json_quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(graph: &ValueGraph, root: ValueId) -> String {
        encode(graph, root, &EncodeOptions::default()).unwrap()
    }

    #[test]
    fn test_scalars() {
        let mut g = ValueGraph::new();
        let cases = [
            (Value::Null, "null"),
            (Value::Bool(true), "true"),
            (Value::Int(-3), "-3"),
            (Value::String("hi \"there\"".into()), r#""hi \"there\"""#),
            (Value::Undefined, r#""""#),
            (Value::BigInt(170_141_183_460_469_231_731_687_303_715), "170141183460469231731687303715"),
        ];
        for (value, expected) in cases {
            let id = g.alloc(value);
            assert_eq!(enc(&g, id), expected);
        }
    }

    #[test]
    fn test_non_finite_floats() {
        let mut g = ValueGraph::new();
        let nan = g.alloc(Value::Float(f64::NAN));
        let inf = g.alloc(Value::Float(f64::INFINITY));
        let neg = g.alloc(Value::Float(f64::NEG_INFINITY));
        assert_eq!(enc(&g, nan), r#""NaN""#);
        assert_eq!(enc(&g, inf), r#""Infinity""#);
        assert_eq!(enc(&g, neg), r#""Infinity""#);
    }

    #[test]
    fn test_quote_options() {
        let mut g = ValueGraph::new();
        let b = g.alloc(Value::Bool(false));
        let n = g.alloc(Value::Int(42));
        let opts = EncodeOptions::default().quoting_booleans().quoting_numbers();
        assert_eq!(encode(&g, b, &opts).unwrap(), r#""false""#);
        assert_eq!(encode(&g, n, &opts).unwrap(), r#""42""#);
    }

    #[test]
    fn test_function_forms() {
        let mut g = ValueGraph::new();
        let named = g.alloc(Value::Func { name: Some("boot".into()) });
        let anon = g.alloc(Value::Func { name: None });
        assert_eq!(enc(&g, named), r#"{"type":"function","name":"boot"}"#);
        assert_eq!(enc(&g, anon), r#"{"type":"function","name":"anonymous"}"#);
        let opts = EncodeOptions::default().omitting_functions();
        assert_eq!(encode(&g, named, &opts).unwrap(), r#""""#);
    }

    #[test]
    fn test_null_handler_policies() {
        let mut g = ValueGraph::new();
        let u = g.alloc(Value::Undefined);

        let opts = EncodeOptions::default().with_null_handler(Box::new(|_| NullPolicy::Null));
        assert_eq!(encode(&g, u, &opts).unwrap(), "null");

        let opts = EncodeOptions::default()
            .with_null_handler(Box::new(|_| NullPolicy::Text("gone".into())));
        assert_eq!(encode(&g, u, &opts).unwrap(), r#""gone""#);
    }

    #[test]
    fn test_empty_containers() {
        let mut g = ValueGraph::new();
        let obj = g.alloc_object();
        let arr = g.alloc_array();
        assert_eq!(enc(&g, obj), "{}");
        assert_eq!(enc(&g, arr), "[]");
    }

    #[test]
    fn test_default_exclusions() {
        let mut g = ValueGraph::new();
        let v = g.alloc(Value::Int(1));
        let obj = g.alloc_object();
        g.set_field(obj, "constructor", v);
        g.set_field(obj, "prototype", v);
        g.set_field(obj, "this", v);
        g.set_field(obj, "keep", v);
        assert_eq!(enc(&g, obj), r#"{"keep":1}"#);
    }

    #[test]
    fn test_include_exclude_lists() {
        let mut g = ValueGraph::new();
        let v = g.alloc(Value::Int(1));
        let obj = g.alloc_object();
        g.set_field(obj, "a", v);
        g.set_field(obj, "b", v);
        g.set_field(obj, "c", v);

        let opts = EncodeOptions::default().with_include(["a", "c"]);
        assert_eq!(encode(&g, obj, &opts).unwrap(), r#"{"a":1,"c":1}"#);

        let opts = EncodeOptions::default().with_exclude(["b"]);
        assert_eq!(encode(&g, obj, &opts).unwrap(), r#"{"a":1,"c":1}"#);
    }

    #[test]
    fn test_dangling_child_is_field_error() {
        let mut g = ValueGraph::new();
        let obj = g.alloc_object();
        g.set_field(obj, "bad", ValueId(999));
        let text = enc(&g, obj);
        assert!(text.starts_with(r#"{"bad":"Error:"#), "got {text}");
        // still a complete, parseable document
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok());
    }

    #[test]
    fn test_invalid_root_is_hard_error() {
        let g = ValueGraph::new();
        assert!(matches!(
            encode(&g, ValueId(0), &EncodeOptions::default()),
            Err(Error::InvalidRoot(_))
        ));
    }

    #[test]
    fn test_time_budget_degrades() {
        let mut g = ValueGraph::new();
        let v = g.alloc(Value::Int(5));
        let obj = g.alloc_object();
        g.set_field(obj, "x", v);
        let opts = EncodeOptions::default().with_max_run_time(Duration::ZERO);
        let out = encode(&g, obj, &opts).unwrap();
        assert_eq!(out, "{x: 5}");
    }
}
