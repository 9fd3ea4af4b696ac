//! The root set.
//!
//! Roots are what the configuration keeps: entities a keep rule matched,
//! entities referenced from native code or resources, and entities carrying
//! one of the root annotations. A kept class also keeps its static
//! initializer and, unless `relaxed_keep_class_members` is set, its
//! constructors.

use std::collections::BTreeSet;

use super::objects::ReachableObject;
use super::ReachabilityOptions;
use crate::dex::{DexAnnotationSet, DexClass, DexMethod, DexType};

#[derive(Debug, Default)]
pub(crate) struct RootSet {
    pub objects: Vec<ReachableObject>,
    pub classes: BTreeSet<DexClass>,
    /// Instance methods kept, and thus callable from outside.
    pub callable: BTreeSet<DexMethod>,
}

impl RootSet {
    fn keep_method(&mut self, m: DexMethod) {
        self.objects.push(ReachableObject::Method(m));
        if !m.is_static() {
            self.callable.insert(m);
        }
    }
}

fn has_root_annotation(annos: Option<DexAnnotationSet>, roots: &BTreeSet<DexType>) -> bool {
    !roots.is_empty() && annos.is_some_and(|set| set.types().any(|ty| roots.contains(&ty)))
}

pub(crate) fn compute_roots(scope: &[DexClass], options: &ReachabilityOptions) -> RootSet {
    let mut roots = RootSet::default();
    let root_annos = &options.root_annotations;
    for &cls in scope {
        if cls.is_external() {
            continue;
        }
        let class_kept = cls.rstate().is_root() || has_root_annotation(cls.annotations(), root_annos);
        if class_kept {
            roots.objects.push(ReachableObject::Class(cls));
            roots.classes.insert(cls);
            if let Some(clinit) = cls.clinit() {
                roots.keep_method(clinit);
            }
            if !options.relaxed_keep_class_members {
                for ctor in cls.ctors() {
                    roots.keep_method(ctor);
                }
            }
        }
        for m in cls.all_methods() {
            if m.rstate().is_root() || has_root_annotation(m.annotations(), root_annos) {
                roots.keep_method(m);
            }
        }
        for f in cls.all_fields() {
            if f.rstate().is_root() || has_root_annotation(f.annotations(), root_annos) {
                roots.objects.push(ReachableObject::Field(f));
            }
        }
    }
    roots.objects.sort();
    roots.objects.dedup();
    roots
}
