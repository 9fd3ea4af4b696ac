//! Control-flow graphs over method bodies.
//!
//! ```text
//!   IRList ──build──▶ ControlFlowGraph ──linearize──▶ IRList
//!                      │
//!                      ├── Block { entries, preds, succs }
//!                      └── Edge  { GOTO | BRANCH(key) | THROW(type, index) | GHOST }
//! ```
//!
//! A graph is either a read-only snapshot or *editable*. An editable graph
//! owns the body while it exists: the list in [`crate::ir::IRCode`] is
//! emptied and comes back from [`ControlFlowGraph::linearize`] when the
//! graph is cleared. Edits on a snapshot fail with
//! [`CfgError::NotEditable`].
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`graph`] | blocks, edges, queries |
//! | [`build`] | partitioning a list into blocks |
//! | [`linearize`] | block layout and try-region reconstruction |
//! | [`edit`] | splits, insertions, removals, exit block |
//! | [`dominators`] | dominator tree, postorder, natural loops |

pub mod build;
pub mod dominators;
pub mod edit;
pub mod error;
pub mod graph;
pub mod linearize;


pub use dominators::{Dominators, Loop};
pub use error::{CfgError, CfgResult};
pub use graph::{Block, BlockId, ControlFlowGraph, Edge, EdgeId, EdgeType, InsnPos, ThrowInfo};
