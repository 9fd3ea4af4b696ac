//! Member resolution.
//!
//! Follows the VM's lookup rules closely enough for whole-program analysis:
//! virtual lookups walk the superclass chain and then the interfaces, direct
//! lookups stay on the named class, static lookups walk superclasses.

use super::class::DexClass;
use super::members::{DexField, DexFieldRef, DexMethod, DexMethodRef};
use super::strings::DexString;
use super::types::{DexProto, DexType};
use crate::ir::IROpcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodSearch {
    /// Private methods and constructors of the named class.
    Direct,
    /// Static methods, walking superclasses.
    Static,
    /// Virtual methods, walking superclasses then interfaces.
    Virtual,
    /// Virtual methods starting at the superclass of the caller's class.
    Super,
    /// Interface methods, walking super-interfaces.
    Interface,
    /// Anything, walking superclasses.
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSearch {
    Static,
    Instance,
    Any,
}

/// The search kind implied by an invoke opcode.
pub fn opcode_to_search(op: IROpcode) -> MethodSearch {
    match op {
        IROpcode::InvokeDirect => MethodSearch::Direct,
        IROpcode::InvokeStatic => MethodSearch::Static,
        IROpcode::InvokeVirtual => MethodSearch::Virtual,
        IROpcode::InvokeSuper => MethodSearch::Super,
        IROpcode::InvokeInterface => MethodSearch::Interface,
        _ => MethodSearch::Any,
    }
}

fn find_in_class(cls: DexClass, name: DexString, proto: DexProto, search: MethodSearch) -> Option<DexMethod> {
    match search {
        MethodSearch::Direct => cls.find_dmethod(name, proto),
        MethodSearch::Static => cls.find_dmethod(name, proto).filter(|m| m.is_static()),
        MethodSearch::Virtual | MethodSearch::Super | MethodSearch::Interface => {
            cls.find_vmethod(name, proto)
        }
        MethodSearch::Any => cls.find_method(name, proto),
    }
}

fn resolve_in_interfaces(cls: DexClass, name: DexString, proto: DexProto) -> Option<DexMethod> {
    for intf in cls.interfaces().iter() {
        if let Some(intf_cls) = intf.class() {
            if let Some(m) = intf_cls.find_vmethod(name, proto) {
                return Some(m);
            }
            if let Some(m) = resolve_in_interfaces(intf_cls, name, proto) {
                return Some(m);
            }
        }
    }
    None
}

/// Resolve (name, proto) starting at `start`.
pub fn resolve_method_in(
    start: DexType,
    name: DexString,
    proto: DexProto,
    search: MethodSearch,
) -> Option<DexMethod> {
    let first = start.class()?;
    if search == MethodSearch::Direct {
        return find_in_class(first, name, proto, search);
    }
    let mut current = Some(first);
    while let Some(cls) = current {
        if let Some(m) = find_in_class(cls, name, proto, search) {
            return Some(m);
        }
        if matches!(search, MethodSearch::Interface) {
            if let Some(m) = resolve_in_interfaces(cls, name, proto) {
                return Some(m);
            }
        }
        current = cls.super_class().and_then(|t| t.class());
    }
    if matches!(search, MethodSearch::Virtual | MethodSearch::Any) {
        // Default and abstract interface methods.
        let mut current = Some(first);
        while let Some(cls) = current {
            if let Some(m) = resolve_in_interfaces(cls, name, proto) {
                return Some(m);
            }
            current = cls.super_class().and_then(|t| t.class());
        }
    }
    None
}

/// Resolve a method reference to a definition.
///
/// `caller` is needed for `Super` searches, which start at the superclass of
/// the caller's class.
pub fn resolve_method(
    mref: DexMethodRef,
    search: MethodSearch,
    caller: Option<DexMethod>,
) -> Option<DexMethod> {
    if search == MethodSearch::Super {
        let start = match caller {
            Some(caller) => caller.class_type().class()?.super_class()?,
            None => mref.class_type(),
        };
        return resolve_method_in(start, mref.name(), mref.proto(), MethodSearch::Virtual);
    }
    if let Some(def) = mref.as_def() {
        // A definition resolves to itself unless the search kind excludes it.
        let matches_kind = match search {
            MethodSearch::Static => def.is_static(),
            MethodSearch::Virtual | MethodSearch::Interface => def.is_virtual(),
            MethodSearch::Direct => !def.is_virtual(),
            _ => true,
        };
        if matches_kind {
            return Some(def);
        }
    }
    resolve_method_in(mref.class_type(), mref.name(), mref.proto(), search)
}

fn field_matches(field: DexField, search: FieldSearch) -> bool {
    match search {
        FieldSearch::Static => field.is_static(),
        FieldSearch::Instance => !field.is_static(),
        FieldSearch::Any => true,
    }
}

fn resolve_field_in(cls: DexClass, name: DexString, ty: DexType, search: FieldSearch) -> Option<DexField> {
    if let Some(f) = cls.find_field(name, ty) {
        if field_matches(f, search) {
            return Some(f);
        }
    }
    if search != FieldSearch::Instance {
        for intf in cls.interfaces().iter() {
            if let Some(f) = intf.class().and_then(|c| resolve_field_in(c, name, ty, search)) {
                return Some(f);
            }
        }
    }
    let parent = cls.super_class()?.class()?;
    resolve_field_in(parent, name, ty, search)
}

/// Resolve a field reference to a definition, walking interfaces and superclasses.
pub fn resolve_field(fref: DexFieldRef, search: FieldSearch) -> Option<DexField> {
    if let Some(def) = fref.as_def() {
        if field_matches(def, search) {
            return Some(def);
        }
    }
    let cls = fref.class_type().class()?;
    resolve_field_in(cls, fref.name(), fref.field_type(), search)
}
