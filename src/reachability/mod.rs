//! Whole-program reachability: mark from the roots, then sweep.
//!
//! ```text
//!   roots ──▶ ┌──────────────── round ────────────────┐
//!             │ parallel closure (work queue)         │
//!             │   visit class / method / field / anno │
//!             │   gather references, mark, push       │
//!             ├───────────────────────────────────────┤
//!             │ serial resolution                     │
//!             │   instantiable × invoked virtuals     │
//!             └──────────── new marks? ───────────────┘
//!                              │ no
//!                              ▼
//!        returning fixpoint ─▶ sweep ─▶ mark abstract ─▶ sweep code
//! ```
//!
//! Each refinement in [`ReachabilityOptions`] narrows what counts as
//! reachable:
//!
//! - baseline: every referenced entity is marked, every marked body is
//!   walked, and overriders in marked classes follow their invoked base;
//! - `cfg_gathering_check_instantiable`: overriders only follow when their
//!   class is instantiable, and only reachable blocks are walked;
//! - `cfg_gathering_check_instance_callable`: instance bodies are walked
//!   only once something can enter them;
//! - `cfg_gathering_check_returning`: methods that never return are
//!   recorded so their call sites can be cut short.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`objects`] | marked sets and the aspects computed alongside them |
//! | [`roots`] | the root set |
//! | [`references`] | what a class, member, annotation or body refers to |
//! | [`closure`] | [`compute_reachable_objects`] |
//! | [`returning`] | the returning-methods fixpoint |
//! | [`graph`] | optional retainer recording for diagnostics |
//! | [`sweep`] | removal and rewriting of what was not marked |

pub mod closure;
pub mod graph;
pub mod objects;
pub mod references;
pub mod returning;
pub mod roots;
pub mod sweep;

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;

pub use closure::compute_reachable_objects;
pub use graph::ReachabilityGraph;
pub use objects::{ReachableAspects, ReachableObject, ReachableObjects};
pub use sweep::{
    mark_classes_abstract, sweep, sweep_code, sweep_uncallable_virtual_methods, SweepCodeStats,
    SweepStats, UncallableStats,
};

use crate::dex::DexType;

/// Entities whose references are not followed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSets {
    /// Classes whose string literals are not read as class names.
    pub string_literals: BTreeSet<DexType>,
    /// Annotation types that never retain anything (system annotations).
    pub system_annos: BTreeSet<DexType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityOptions {
    pub cfg_gathering_check_instantiable: bool,
    pub cfg_gathering_check_instance_callable: bool,
    pub cfg_gathering_check_returning: bool,
    /// Keeping a class does not keep its constructors.
    pub relaxed_keep_class_members: bool,
    /// Annotation types whose carriers are roots.
    pub root_annotations: BTreeSet<DexType>,
    /// Worker threads for the closure; 0 means one per CPU.
    pub num_threads: usize,
    /// Record why each object was marked.
    pub record_graph: bool,
}

impl Default for ReachabilityOptions {
    fn default() -> Self {
        Self {
            cfg_gathering_check_instantiable: false,
            cfg_gathering_check_instance_callable: false,
            cfg_gathering_check_returning: false,
            relaxed_keep_class_members: false,
            root_annotations: BTreeSet::new(),
            num_threads: 0,
            record_graph: false,
        }
    }
}

impl ReachabilityOptions {
    /// Whether bodies are walked block by block instead of as a flat list.
    pub fn cfg_gathering(&self) -> bool {
        self.cfg_gathering_check_instantiable
            || self.cfg_gathering_check_instance_callable
            || self.cfg_gathering_check_returning
    }
}
