//! Dataflow analysis scaffolding.
//!
//! | Analysis | Direction | Domain |
//! |----------|-----------|--------|
//! | [`liveness`] | backward, may | register sets |
//! | [`reaching_defs`] | forward, may | register -> defining instructions |
//! | [`monitor_count`] | forward, must | flat lattice over held-monitor counts |
//!
//! All three are instances of [`fixpoint::MonotonicFixpointIterator`],
//! which walks a [`fixpoint::GraphInterface`] in weak topological order
//! ([`wto`]).

pub mod bitset;
pub mod domain;
pub mod fixpoint;
pub mod liveness;
pub mod monitor_count;
pub mod reaching_defs;
pub mod wto;

#[cfg(test)]
mod tests;

pub use bitset::BitSet;
pub use domain::{AbstractDomain, ConstantDomain, MapOfSetsDomain, RegisterSetDomain};
pub use fixpoint::{
    BackwardNode, Backwards, FixpointAnalyzer, GraphInterface, MonotonicFixpointIterator,
};
pub use liveness::{Liveness, LivenessDomain};
pub use monitor_count::{MonitorCount, MonitorCounts};
pub use reaching_defs::{ReachingDefinitions, ReachingDefsEnvironment};
pub use wto::{Wto, WtoComponent};
