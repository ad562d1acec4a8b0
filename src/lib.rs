//! # refjson — Cycle-Aware JSON Serialization
//!
//! Converts in-memory value graphs — including graphs with shared
//! references and true cycles — into plain JSON text and back, without
//! losing the structural sharing that tree-shaped JSON cannot express.
//!
//! ## Design Principles
//!
//! 1. **Arena identity**: nodes live in a [`ValueGraph`] slab; aliasing is
//!    two slots holding one [`ValueId`], a cycle is an id reachable from
//!    itself — no owning-pointer loops anywhere
//! 2. **Single-visit walks**: the [`ResolvedTable`] memoizes every first
//!    sighting; later sightings emit a back-reference expression instead of
//!    re-embedding the subtree
//! 3. **Degrade, never fail**: depth caps, wall-clock budgets, the repeat
//!    detector, and per-field error hooks substitute sentinels and keep
//!    going — `encode`/`decode` return `Err` only for invalid arguments
//! 4. **Closed dispatch**: everything matches on [`Value`] variants; there
//!    is no dynamic type probing
//!
//! ## Quick Start
//!
//! ```rust
//! use refjson::{decode, encode, DecodeOptions, EncodeOptions, Value, ValueGraph};
//!
//! let mut g = ValueGraph::new();
//! let four = g.alloc(Value::Int(4));
//! let inner = g.alloc_object();
//! g.set_field(inner, "d", four);
//! let root = g.alloc_object();
//! g.set_field(root, "a", inner);
//! g.set_field(root, "e", inner); // alias: e and a share one node
//!
//! let text = encode(&g, root, &EncodeOptions::default()).unwrap();
//! assert_eq!(text, r#"{"a":{"d":4},"e":"${(@path;@base:root):a}"}"#);
//!
//! // decoding reconstructs the sharing as a live reference
//! let decoded = decode(&text, &DecodeOptions::default()).unwrap();
//! assert_eq!(
//!     decoded.graph.field(decoded.root, "a"),
//!     decoded.graph.field(decoded.root, "e"),
//! );
//! ```
//!
//! ## Wire Format
//!
//! Standard JSON in which selected string leaves follow the grammar
//! `${(@<kind>;@base:<base>):<argument>}` — see the [`grammar`] module.

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod grammar;
pub mod resolved;
pub mod cycle;
pub mod encode;
pub mod decode;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{IdSet, PathSeg, PathStack, Value, ValueGraph, ValueId};

// ============================================================================
// Re-exports: Grammar
// ============================================================================

pub use grammar::{is_expression, parse, BackRefExpr, RefKind};

// ============================================================================
// Re-exports: Resolved table
// ============================================================================

pub use resolved::{ResolvedEntry, ResolvedTable, SharedResolvedTable};

// ============================================================================
// Re-exports: Cycle guard
// ============================================================================

pub use cycle::detect_cycles;

// ============================================================================
// Re-exports: Encode / Decode
// ============================================================================

pub use encode::{encode, encode_with_table, EncodeOptions, NullPolicy};
pub use decode::{decode, decode_into, decode_with_table, Decoded, DecodeOptions, Scope};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The root id handed to a call is outside the arena.
    #[error("invalid root reference: {0}")]
    InvalidRoot(ValueId),

    /// A container child points outside the arena. Surfaces through the
    /// per-field error policy, never as a call failure.
    #[error("dangling value reference: {0}")]
    DanglingRef(ValueId),

    /// Plain-JSON export cannot express a true cycle.
    #[error("graph contains a cycle and cannot be exported as plain JSON")]
    CyclicGraph,

    /// A required scope entry is absent.
    #[error("scope entry not found: {0}")]
    ScopeMissing(String),
}

pub type Result<T> = std::result::Result<T, Error>;
