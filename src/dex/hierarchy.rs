//! Class hierarchy: subclass and implementor maps over a scope.

use std::collections::{BTreeMap, BTreeSet};

use super::class::DexClass;
use super::types::DexType;

/// Parent type -> direct children, for every class in a scope.
#[derive(Debug, Default, Clone)]
pub struct ClassHierarchy {
    children: BTreeMap<DexType, BTreeSet<DexType>>,
}

impl ClassHierarchy {
    pub fn build(scope: &[DexClass]) -> Self {
        let mut children: BTreeMap<DexType, BTreeSet<DexType>> = BTreeMap::new();
        for cls in scope {
            if let Some(sup) = cls.super_class() {
                children.entry(sup).or_default().insert(cls.get_type());
            }
        }
        Self { children }
    }

    pub fn get_children(&self, ty: DexType) -> impl Iterator<Item = DexType> + '_ {
        self.children.get(&ty).into_iter().flat_map(|s| s.iter().copied())
    }

    /// Every transitive subclass of `ty`, excluding `ty`.
    pub fn get_all_children(&self, ty: DexType) -> BTreeSet<DexType> {
        let mut out = BTreeSet::new();
        let mut stack = vec![ty];
        while let Some(t) = stack.pop() {
            for child in self.get_children(t) {
                if out.insert(child) {
                    stack.push(child);
                }
            }
        }
        out
    }
}

/// Interface type -> every class implementing it, directly or through a
/// superclass or a super-interface.
#[derive(Debug, Default, Clone)]
pub struct InterfaceMap {
    implementors: BTreeMap<DexType, BTreeSet<DexType>>,
}

impl InterfaceMap {
    pub fn build(scope: &[DexClass], hierarchy: &ClassHierarchy) -> Self {
        let mut implementors: BTreeMap<DexType, BTreeSet<DexType>> = BTreeMap::new();
        for cls in scope {
            if cls.is_interface() {
                continue;
            }
            let mut interfaces = BTreeSet::new();
            collect_interfaces(*cls, &mut interfaces);
            if interfaces.is_empty() {
                continue;
            }
            let mut types = hierarchy.get_all_children(cls.get_type());
            types.insert(cls.get_type());
            for intf in interfaces {
                implementors.entry(intf).or_default().extend(types.iter().copied());
            }
        }
        Self { implementors }
    }

    pub fn get_implementors(&self, intf: DexType) -> BTreeSet<DexType> {
        self.implementors.get(&intf).cloned().unwrap_or_default()
    }
}

/// Interfaces declared by `cls` and, transitively, their super-interfaces.
pub fn collect_interfaces(cls: DexClass, out: &mut BTreeSet<DexType>) {
    for intf in cls.interfaces().iter() {
        if out.insert(intf) {
            if let Some(intf_cls) = intf.class() {
                collect_interfaces(intf_cls, out);
            }
        }
    }
}

/// `ty` followed by each superclass that has a class definition.
pub fn super_chain(ty: DexType) -> Vec<DexType> {
    let mut out = vec![ty];
    let mut current = ty.class().and_then(|c| c.super_class());
    while let Some(t) = current {
        if out.contains(&t) {
            break;
        }
        out.push(t);
        current = t.class().and_then(|c| c.super_class());
    }
    out
}

/// Whether `child` is `parent` or one of its subclasses.
pub fn is_subclass(parent: DexType, child: DexType) -> bool {
    super_chain(child).contains(&parent)
}
