//! # Back-Reference Grammar
//!
//! The addressing grammar the wire format embeds in string leaves:
//! `${(<hint>):<argument>}`. Pure functions — no I/O, no state, no graph
//! dependency.

pub mod expr;
pub mod parser;

pub use expr::{BackRefExpr, RefKind, BASE_GLOBAL, BASE_ROOT};
pub use parser::{is_expression, parse};
