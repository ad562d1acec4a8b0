//! # Value Graph Model
//!
//! The data the engine moves: arena-stored values addressed by integer id,
//! plus the traversal path type. These types cross every boundary:
//! encoder ↔ decoder ↔ resolved table ↔ user.
//!
//! Design rule: this module is pure data — no I/O, no grammar knowledge,
//! no option handling.

pub mod value;
pub mod graph;
pub mod path;

pub use value::{Value, ValueId};
pub use graph::{IdSet, ValueGraph};
pub use path::{PathSeg, PathStack, ROOT_TOKEN};
