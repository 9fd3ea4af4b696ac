//! Stores, dex files and scopes.
//!
//! A [`DexStore`] is one bytecode container: an ordered sequence of dex files,
//! each an ordered list of classes. The optimizer works on a
//! [`DexStoresVector`]; passes usually flatten it into a [`Scope`].

use itertools::Itertools;

use super::class::DexClass;

/// Classes of one dex file, in file order.
pub type DexClasses = Vec<DexClass>;

/// All classes of the stores, in store/dex/class order.
pub type Scope = Vec<DexClass>;

#[derive(Debug, Clone)]
pub struct DexStore {
    name: String,
    dexen: Vec<DexClasses>,
}

impl DexStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dexen: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The primary store carries the application's main dex files.
    pub fn is_root_store(&self) -> bool {
        self.name == "classes"
    }

    pub fn add_classes(&mut self, classes: DexClasses) {
        self.dexen.push(classes);
    }

    pub fn dexen(&self) -> &[DexClasses] {
        &self.dexen
    }

    pub fn dexen_mut(&mut self) -> &mut Vec<DexClasses> {
        &mut self.dexen
    }

    pub fn num_classes(&self) -> usize {
        self.dexen.iter().map(Vec::len).sum()
    }

    /// Remove every class matching `pred`; returns the removed classes in order.
    pub fn remove_classes(&mut self, mut pred: impl FnMut(DexClass) -> bool) -> Vec<DexClass> {
        let mut removed = Vec::new();
        for dex in &mut self.dexen {
            dex.retain(|cls| {
                let remove = pred(*cls);
                if remove {
                    removed.push(*cls);
                }
                !remove
            });
        }
        removed
    }
}

pub type DexStoresVector = Vec<DexStore>;

/// Flatten the stores into a scope, preserving input order.
pub fn build_class_scope(stores: &[DexStore]) -> Scope {
    stores
        .iter()
        .flat_map(|store| store.dexen.iter())
        .flat_map(|dex| dex.iter().copied())
        .collect()
}

/// Classes in output order.
///
/// With `legacy_order` the input order is kept; otherwise each dex file is
/// sorted by type descriptor.
pub fn ordered_classes(stores: &[DexStore], legacy_order: bool) -> Scope {
    if legacy_order {
        return build_class_scope(stores);
    }
    let mut out = Vec::new();
    for store in stores {
        for dex in &store.dexen {
            out.extend(dex.iter().copied().sorted());
        }
    }
    out
}
