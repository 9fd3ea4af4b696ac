//! dexopt - DEX Optimizer Middle End
//!
//! This library holds the in-memory program model and the analyses and
//! transformations of a Dalvik bytecode optimizer: interned symbol tables,
//! a register-based instruction IR, control-flow graphs, a pass manager,
//! a register allocator, whole-program reachability, and the
//! method-override graph.
//!
//! # Architecture
//!
//! ```text
//!   dex (types, strings, members, classes)
//!    │
//!    ▼
//!   ir (IRCode / IRList) ◀──▶ cfg (ControlFlowGraph)
//!    │                          │
//!    │                          ▼
//!    │                       analysis (liveness, reaching defs, fixpoint)
//!    ▼                          │
//!   pass (PassManager) ─────────┼──▶ regalloc
//!                               ├──▶ reachability
//!                               └──▶ method_override_graph
//! ```
//!
//! The symbol tables are process-wide and append-only, so every interned
//! handle is `Copy` and compares by identity. Parallel phases use the
//! containers in [`concurrent`].
//!
//! # Example
//!
//! ```rust
//! use dexopt::ir::ircode_from_string;
//!
//! let mut code = ircode_from_string(
//!     "((load-param v0) (const v1 1) (add-int v2 v0 v1) (return v2))",
//! )
//! .unwrap();
//! code.build_cfg(true).unwrap();
//! assert_eq!(code.cfg().unwrap().num_blocks(), 1);
//! code.clear_cfg();
//! assert_eq!(code.count_opcodes(), 3);
//! ```

pub mod analysis;
pub mod cfg;
pub mod concurrent;
pub mod config;
pub mod dex;
pub mod ir;
pub mod logging;
pub mod method_override_graph;
pub mod pass;
pub mod reachability;
pub mod regalloc;
pub mod walk;

pub use cfg::{CfgError, CfgResult, ControlFlowGraph};
pub use config::{ConfigError, PipelineConfig};
pub use dex::{DexClass, DexError, DexField, DexMethod, DexResult, DexString, DexType};
pub use ir::{IRCode, IRInstruction, IROpcode};
pub use pass::{Pass, PassError, PassManager, PassResult};
