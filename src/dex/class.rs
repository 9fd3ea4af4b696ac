//! Class definitions.
//!
//! A [`DexClass`] is created once per type through [`ClassCreator`] and lives
//! for the rest of the process. Its member lists sit behind a per-class lock:
//! passes mutate one class at a time, parallelism is across classes.
//! Member lists are kept sorted by member order so output is stable.

use std::cmp::Ordering;
use std::fmt;

use parking_lot::RwLock;

use super::access::{DexAccessFlags, ACC_ABSTRACT, ACC_INTERFACE};
use super::annotations::DexAnnotationSet;
use super::error::DexResult;
use super::intern::{leak, pointer_identity};
use super::members::{DexField, DexMethod};
use super::rstate::ReferencedState;
use super::strings::DexString;
use super::types::{DexProto, DexType, DexTypeList};

#[derive(Debug, Clone)]
struct ClassBody {
    super_class: Option<DexType>,
    interfaces: DexTypeList,
    access: DexAccessFlags,
    dmethods: Vec<DexMethod>,
    vmethods: Vec<DexMethod>,
    sfields: Vec<DexField>,
    ifields: Vec<DexField>,
    annotations: Option<DexAnnotationSet>,
    source_file: Option<DexString>,
}

pub struct ClassData {
    ty: DexType,
    external: bool,
    body: RwLock<ClassBody>,
    rstate: ReferencedState,
}

/// A class definition.
#[derive(Clone, Copy)]
pub struct DexClass(&'static ClassData);

pointer_identity!(DexClass);

fn insert_sorted<T: Ord + Copy>(list: &mut Vec<T>, item: T) {
    if let Err(pos) = list.binary_search(&item) {
        list.insert(pos, item);
    }
}

impl DexClass {
    pub fn get_type(&self) -> DexType {
        self.0.ty
    }

    pub fn name(&self) -> DexString {
        self.0.ty.name()
    }

    pub fn is_external(&self) -> bool {
        self.0.external
    }

    pub fn super_class(&self) -> Option<DexType> {
        self.0.body.read().super_class
    }

    pub fn set_super_class(&self, super_class: Option<DexType>) {
        self.0.body.write().super_class = super_class;
    }

    pub fn interfaces(&self) -> DexTypeList {
        self.0.body.read().interfaces
    }

    pub fn set_interfaces(&self, interfaces: DexTypeList) {
        self.0.body.write().interfaces = interfaces;
    }

    pub fn access(&self) -> DexAccessFlags {
        self.0.body.read().access
    }

    pub fn set_access(&self, access: DexAccessFlags) {
        self.0.body.write().access = access;
    }

    pub fn is_interface(&self) -> bool {
        self.access().contains(ACC_INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access().contains(ACC_ABSTRACT)
    }

    pub fn set_abstract(&self) {
        self.0.body.write().access.insert(ACC_ABSTRACT);
    }

    pub fn dmethods(&self) -> Vec<DexMethod> {
        self.0.body.read().dmethods.clone()
    }

    pub fn vmethods(&self) -> Vec<DexMethod> {
        self.0.body.read().vmethods.clone()
    }

    /// Direct methods followed by virtual methods.
    pub fn all_methods(&self) -> Vec<DexMethod> {
        let body = self.0.body.read();
        body.dmethods
            .iter()
            .chain(body.vmethods.iter())
            .copied()
            .collect()
    }

    pub fn sfields(&self) -> Vec<DexField> {
        self.0.body.read().sfields.clone()
    }

    pub fn ifields(&self) -> Vec<DexField> {
        self.0.body.read().ifields.clone()
    }

    pub fn all_fields(&self) -> Vec<DexField> {
        let body = self.0.body.read();
        body.sfields
            .iter()
            .chain(body.ifields.iter())
            .copied()
            .collect()
    }

    /// Add a method to the direct or virtual list according to its virtual-ness.
    pub fn add_method(&self, method: DexMethod) {
        let mut body = self.0.body.write();
        if method.is_virtual() {
            insert_sorted(&mut body.vmethods, method);
        } else {
            insert_sorted(&mut body.dmethods, method);
        }
    }

    /// Returns `true` if the method was a member.
    pub fn remove_method(&self, method: DexMethod) -> bool {
        let mut body = self.0.body.write();
        let before = body.dmethods.len() + body.vmethods.len();
        body.dmethods.retain(|m| *m != method);
        body.vmethods.retain(|m| *m != method);
        before != body.dmethods.len() + body.vmethods.len()
    }

    pub fn add_field(&self, field: DexField) {
        let mut body = self.0.body.write();
        if field.is_static() {
            insert_sorted(&mut body.sfields, field);
        } else {
            insert_sorted(&mut body.ifields, field);
        }
    }

    pub fn remove_field(&self, field: DexField) -> bool {
        let mut body = self.0.body.write();
        let before = body.sfields.len() + body.ifields.len();
        body.sfields.retain(|f| *f != field);
        body.ifields.retain(|f| *f != field);
        before != body.sfields.len() + body.ifields.len()
    }

    /// Keep only the members for which the predicates hold; returns the removed ones.
    pub fn retain_members(
        &self,
        mut keep_method: impl FnMut(DexMethod) -> bool,
        mut keep_field: impl FnMut(DexField) -> bool,
    ) -> (Vec<DexMethod>, Vec<DexField>) {
        let mut guard = self.0.body.write();
        let body = &mut *guard;
        let mut removed_methods = Vec::new();
        let mut removed_fields = Vec::new();
        for list in [&mut body.dmethods, &mut body.vmethods] {
            list.retain(|m| {
                let keep = keep_method(*m);
                if !keep {
                    removed_methods.push(*m);
                }
                keep
            });
        }
        for list in [&mut body.sfields, &mut body.ifields] {
            list.retain(|f| {
                let keep = keep_field(*f);
                if !keep {
                    removed_fields.push(*f);
                }
                keep
            });
        }
        (removed_methods, removed_fields)
    }

    pub fn find_method(&self, name: DexString, proto: DexProto) -> Option<DexMethod> {
        let body = self.0.body.read();
        body.dmethods
            .iter()
            .chain(body.vmethods.iter())
            .find(|m| m.name() == name && m.proto() == proto)
            .copied()
    }

    pub fn find_vmethod(&self, name: DexString, proto: DexProto) -> Option<DexMethod> {
        self.0
            .body
            .read()
            .vmethods
            .iter()
            .find(|m| m.name() == name && m.proto() == proto)
            .copied()
    }

    pub fn find_dmethod(&self, name: DexString, proto: DexProto) -> Option<DexMethod> {
        self.0
            .body
            .read()
            .dmethods
            .iter()
            .find(|m| m.name() == name && m.proto() == proto)
            .copied()
    }

    pub fn find_field(&self, name: DexString, ty: DexType) -> Option<DexField> {
        let body = self.0.body.read();
        body.sfields
            .iter()
            .chain(body.ifields.iter())
            .find(|f| f.name() == name && f.field_type() == ty)
            .copied()
    }

    pub fn clinit(&self) -> Option<DexMethod> {
        self.0
            .body
            .read()
            .dmethods
            .iter()
            .find(|m| m.is_clinit())
            .copied()
    }

    pub fn ctors(&self) -> Vec<DexMethod> {
        self.0
            .body
            .read()
            .dmethods
            .iter()
            .filter(|m| m.is_constructor())
            .copied()
            .collect()
    }

    pub fn annotations(&self) -> Option<DexAnnotationSet> {
        self.0.body.read().annotations.clone()
    }

    pub fn set_annotations(&self, annotations: Option<DexAnnotationSet>) {
        self.0.body.write().annotations = annotations;
    }

    pub fn source_file(&self) -> Option<DexString> {
        self.0.body.read().source_file
    }

    pub fn rstate(&self) -> &'static ReferencedState {
        let data: &'static ClassData = self.0;
        &data.rstate
    }
}

impl PartialOrd for DexClass {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DexClass {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.ty.cmp(&other.0.ty)
    }
}

impl fmt::Display for DexClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.ty)
    }
}

impl fmt::Debug for DexClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexClass({})", self.0.ty)
    }
}

/// Builder for class definitions.
///
/// ```ignore
/// let cls = ClassCreator::new(DexType::make("LFoo;"))
///     .set_super(type_util::java_lang_object())
///     .set_access(ACC_PUBLIC)
///     .add_method(m)
///     .create()?;
/// ```
pub struct ClassCreator {
    ty: DexType,
    external: bool,
    body: ClassBody,
}

impl ClassCreator {
    pub fn new(ty: DexType) -> Self {
        Self {
            ty,
            external: false,
            body: ClassBody {
                super_class: None,
                interfaces: DexTypeList::empty(),
                access: DexAccessFlags::empty(),
                dmethods: Vec::new(),
                vmethods: Vec::new(),
                sfields: Vec::new(),
                ifields: Vec::new(),
                annotations: None,
                source_file: None,
            },
        }
    }

    pub fn set_super(mut self, super_class: DexType) -> Self {
        self.body.super_class = Some(super_class);
        self
    }

    pub fn add_interface(mut self, interface: DexType) -> Self {
        self.body.interfaces = self.body.interfaces.push_back(interface);
        self
    }

    pub fn set_access(mut self, access: DexAccessFlags) -> Self {
        self.body.access = access;
        self
    }

    pub fn set_external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }

    pub fn set_source_file(mut self, file: DexString) -> Self {
        self.body.source_file = Some(file);
        self
    }

    pub fn set_annotations(mut self, annotations: DexAnnotationSet) -> Self {
        self.body.annotations = Some(annotations);
        self
    }

    pub fn add_method(mut self, method: DexMethod) -> Self {
        if method.is_virtual() {
            insert_sorted(&mut self.body.vmethods, method);
        } else {
            insert_sorted(&mut self.body.dmethods, method);
        }
        self
    }

    pub fn add_field(mut self, field: DexField) -> Self {
        if field.is_static() {
            insert_sorted(&mut self.body.sfields, field);
        } else {
            insert_sorted(&mut self.body.ifields, field);
        }
        self
    }

    /// Register the class on its type. Fails if the type already has a class.
    pub fn create(self) -> DexResult<DexClass> {
        if let Some(existing) = self.ty.class() {
            return Err(super::error::DexError::DuplicateClass(
                existing.get_type().to_string(),
            ));
        }
        let cls = DexClass(leak(ClassData {
            ty: self.ty,
            external: self.external,
            body: RwLock::new(self.body),
            rstate: ReferencedState::new(),
        }));
        self.ty.attach_class(cls)?;
        Ok(cls)
    }
}
