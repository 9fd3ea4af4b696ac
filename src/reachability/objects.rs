//! Marked objects and the aspects computed alongside them.

use std::collections::BTreeSet;
use std::fmt;

use super::graph::ReachabilityGraph;
use crate::concurrent::ConcurrentSet;
use crate::dex::{DexClass, DexField, DexMethod, DexType};

/// Something the closure can mark. `Seed` stands for "kept by the
/// configuration" and is the retainer of every root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReachableObject {
    Seed,
    Class(DexClass),
    Method(DexMethod),
    Field(DexField),
    Anno(DexType),
}

impl fmt::Display for ReachableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReachableObject::Seed => write!(f, "SEED"),
            ReachableObject::Class(cls) => write!(f, "CLASS {}", cls),
            ReachableObject::Method(m) => write!(f, "METHOD {}", m),
            ReachableObject::Field(fld) => write!(f, "FIELD {}", fld),
            ReachableObject::Anno(ty) => write!(f, "ANNO {}", ty),
        }
    }
}

/// The marked sets. Written concurrently by the closure, read afterwards.
#[derive(Debug, Default)]
pub struct ReachableObjects {
    classes: ConcurrentSet<DexClass>,
    methods: ConcurrentSet<DexMethod>,
    fields: ConcurrentSet<DexField>,
    annos: ConcurrentSet<DexType>,
    pub(crate) graph: Option<ReachabilityGraph>,
}

impl ReachableObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `obj`; returns `true` the first time.
    pub fn mark(&self, obj: ReachableObject) -> bool {
        match obj {
            ReachableObject::Seed => false,
            ReachableObject::Class(cls) => self.classes.insert(cls),
            ReachableObject::Method(m) => self.methods.insert(m),
            ReachableObject::Field(f) => self.fields.insert(f),
            ReachableObject::Anno(ty) => self.annos.insert(ty),
        }
    }

    pub fn marked(&self, obj: ReachableObject) -> bool {
        match obj {
            ReachableObject::Seed => true,
            ReachableObject::Class(cls) => self.marked_class(cls),
            ReachableObject::Method(m) => self.marked_method(m),
            ReachableObject::Field(f) => self.marked_field(f),
            ReachableObject::Anno(ty) => self.annos.contains(&ty),
        }
    }

    pub fn marked_class(&self, cls: DexClass) -> bool {
        self.classes.contains(&cls)
    }

    pub fn marked_method(&self, m: DexMethod) -> bool {
        self.methods.contains(&m)
    }

    pub fn marked_field(&self, f: DexField) -> bool {
        self.fields.contains(&f)
    }

    pub fn num_marked_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn num_marked_methods(&self) -> usize {
        self.methods.len()
    }

    pub fn num_marked_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn classes(&self) -> Vec<DexClass> {
        self.classes.to_ordered_keys()
    }

    pub fn methods(&self) -> Vec<DexMethod> {
        self.methods.to_ordered_keys()
    }

    pub fn fields(&self) -> Vec<DexField> {
        self.fields.to_ordered_keys()
    }

    /// The retainer graph, when recording was requested.
    pub fn graph(&self) -> Option<&ReachabilityGraph> {
        self.graph.as_ref()
    }

    /// A chain of retainers leading from `obj` back to the seed.
    pub fn explain(&self, obj: ReachableObject) -> Option<Vec<ReachableObject>> {
        self.graph.as_ref().map(|g| g.explain(obj))
    }
}

/// Facts about the marked program beyond plain marking.
///
/// `instantiable_types`, `directly_instantiable_types` and
/// `invoked_virtual_bases` are always filled in. The `tracks_*` flags say
/// whether the closure enforced the corresponding refinement, i.e. whether
/// the sweeps may rely on the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachableAspects {
    /// Classes a reachable instruction instantiates, kept classes, and all
    /// of their supertypes.
    pub instantiable_types: BTreeSet<DexClass>,
    /// Operands of reachable `new-instance` instructions.
    pub directly_instantiable_types: BTreeSet<DexClass>,
    pub callable_instance_methods: BTreeSet<DexMethod>,
    pub returning_methods: BTreeSet<DexMethod>,
    /// Classes whose instance members are referenced although no instance
    /// of them can exist.
    pub uninstantiable_dependencies: BTreeSet<DexClass>,
    /// Resolved targets of reachable virtual and interface invokes.
    pub invoked_virtual_bases: BTreeSet<DexMethod>,
    pub tracks_instantiable: bool,
    pub tracks_callable: bool,
    pub tracks_returning: bool,
}

impl ReachableAspects {
    pub fn is_instantiable(&self, cls: DexClass) -> bool {
        self.instantiable_types.contains(&cls)
    }

    pub fn is_callable(&self, m: DexMethod) -> bool {
        !self.tracks_callable || self.callable_instance_methods.contains(&m)
    }

    pub fn is_returning(&self, m: DexMethod) -> bool {
        !self.tracks_returning || self.returning_methods.contains(&m)
    }

    /// Whether `ty` names an internal class no instance of which can exist.
    pub fn is_uninstantiable_type(&self, ty: DexType) -> bool {
        self.tracks_instantiable
            && ty
                .class()
                .is_some_and(|cls| !cls.is_external() && !self.instantiable_types.contains(&cls))
    }
}
