//! Process-wide pass registry.
//!
//! Passes are registered by name with a factory. The built-in passes are
//! present from first use; other passes register themselves before the
//! pipeline is built. A pipeline entry `Name#alias` creates another
//! instance of `Name`.
//!
//! # Example
//!
//! ```ignore
//! register_pass("MyPass", || Box::new(MyPass::default()));
//! let pass = create_pass("MyPass#late").unwrap();
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use parking_lot::RwLock;
use tracing::warn;

use super::builtin::{MethodOverrideGraphAnalysisPass, RegAllocPass, RemoveUnreachablePass};
use super::Pass;

pub type PassFactory = fn() -> Box<dyn Pass>;

struct PassRegistry {
    factories: BTreeMap<String, PassFactory>,
}

impl PassRegistry {
    fn with_builtins() -> Self {
        let mut factories: BTreeMap<String, PassFactory> = BTreeMap::new();
        factories.insert(RegAllocPass::NAME.to_string(), || Box::new(RegAllocPass::default()));
        factories.insert(RemoveUnreachablePass::NAME.to_string(), || {
            Box::new(RemoveUnreachablePass::default())
        });
        factories.insert(MethodOverrideGraphAnalysisPass::NAME.to_string(), || {
            Box::new(MethodOverrideGraphAnalysisPass::default())
        });
        Self { factories }
    }
}

static REGISTRY: LazyLock<RwLock<PassRegistry>> = LazyLock::new(|| RwLock::new(PassRegistry::with_builtins()));

/// The registered name behind a pipeline entry.
pub fn base_name(instance: &str) -> &str {
    instance.split('#').next().unwrap_or(instance)
}

/// Register `factory` under `name`. Returns false, keeping the existing
/// factory, when the name is taken.
pub fn register_pass(name: &str, factory: PassFactory) -> bool {
    let mut registry = REGISTRY.write();
    if registry.factories.contains_key(name) {
        warn!(target: "dexopt::pass", pass = name, "Pass already registered");
        return false;
    }
    registry.factories.insert(name.to_string(), factory);
    true
}

/// A fresh instance for a pipeline entry, or `None` for an unknown name.
pub fn create_pass(instance: &str) -> Option<Box<dyn Pass>> {
    let factory = *REGISTRY.read().factories.get(base_name(instance))?;
    Some(factory())
}

pub fn is_registered(name: &str) -> bool {
    REGISTRY.read().factories.contains_key(base_name(name))
}

/// Registered names in order.
pub fn registered_passes() -> Vec<String> {
    REGISTRY.read().factories.keys().cloned().collect()
}
