//! The pass pipeline.
//!
//! A pipeline is a list of pass instances named in the config. The
//! [`PassManager`] binds each instance's options, checks that every
//! required property is established by the input or an earlier pass, and
//! runs the passes in order inside a thread pool sized by `global.jobs`.
//!
//! ```text
//!   PipelineConfig ─▶ registry ─▶ bind options ─▶ verify properties
//!                                                       │
//!        ┌──────────────────────────────────────────────┘
//!        ▼
//!   run pass ─▶ invalidate analyses ─▶ property checkers ─▶ IR checker ─┐
//!        ▲                                                              │
//!        └──────────────────────────── next pass ◀──────────────────────┘
//! ```
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`property`] | property names, interactions, pipeline verification |
//! | [`registry`] | process-wide name → factory table |
//! | [`manager`] | [`PassManager`], analyses, metrics |
//! | [`checkers`] | between-pass property checkers |
//! | [`builtin`] | register allocation, unreachable removal, override graph |

pub mod builtin;
pub mod checkers;
pub mod error;
pub mod manager;
pub mod property;
pub mod registry;

#[cfg(test)]
mod tests;

pub use builtin::{MethodOverrideGraphAnalysisPass, RegAllocPass, RemoveUnreachablePass};
pub use checkers::PropertyChecker;
pub use error::{PassError, PassResult};
pub use manager::{PassInfo, PassManager};
pub use property::{Interaction, PropertyInteractions, PropertyName};
pub use registry::{create_pass, register_pass, registered_passes};

use std::any::TypeId;

use crate::config::{ConfigBinder, PipelineConfig};
use crate::dex::DexStoresVector;

/// A unit of the pipeline.
pub trait Pass: Send + Sync {
    /// The registered name. Instances created as `Name#alias` report `Name`.
    fn name(&self) -> &str;

    /// Read options from the instance's config table.
    fn bind_config(&mut self, _binder: &mut ConfigBinder<'_>) {}

    fn get_property_interactions(&self) -> PropertyInteractions;

    /// Analyses only store results in the manager and keep every earlier
    /// analysis valid.
    fn is_analysis(&self) -> bool {
        false
    }

    /// Analysis results that stay valid across this pass.
    fn preserved_analyses(&self) -> Vec<TypeId> {
        Vec::new()
    }

    fn run_pass(
        &mut self,
        stores: &mut DexStoresVector,
        config: &PipelineConfig,
        mgr: &mut PassManager,
    ) -> PassResult<()>;
}
