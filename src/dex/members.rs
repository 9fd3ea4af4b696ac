//! Field and method references, and their definitions.
//!
//! A reference (`DexFieldRef`, `DexMethodRef`) is interned by
//! (containing type, name, type-or-proto). It is promoted to a definition at
//! most once by attaching a definition payload; from then on the same pointer
//! is also reachable as a `DexField`/`DexMethod` handle.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};
use std::sync::{LazyLock, OnceLock};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard, RwLock};

use super::access::{DexAccessFlags, ACC_ABSTRACT, ACC_NATIVE};
use super::annotations::DexAnnotationSet;
use super::encoded_value::EncodedValue;
use super::error::{DexError, DexResult};
use super::intern::{leak, pointer_identity, InternTable};
use super::rstate::ReferencedState;
use super::strings::DexString;
use super::types::{DexProto, DexType};
use crate::ir::IRCode;

/// Split `LFoo;.name:rest` into its three parts.
fn split_member_descriptor(desc: &str) -> DexResult<(&str, &str, &str)> {
    let invalid = || DexError::InvalidMemberDescriptor(desc.to_string());
    let dot = desc.find(";.").ok_or_else(invalid)?;
    let (cls, rest) = (&desc[..=dot], &desc[dot + 2..]);
    let colon = rest.find(':').ok_or_else(invalid)?;
    let (name, tail) = (&rest[..colon], &rest[colon + 1..]);
    if name.is_empty() || tail.is_empty() {
        return Err(invalid());
    }
    Ok((cls, name, tail))
}

// ============================================================================
// Fields
// ============================================================================

pub struct FieldData {
    class: DexType,
    name: DexString,
    ty: DexType,
    def: OnceLock<FieldDef>,
}

/// Definition payload of a concrete field.
pub struct FieldDef {
    access: AtomicU32,
    external: bool,
    static_value: Mutex<Option<EncodedValue>>,
    annotations: RwLock<Option<DexAnnotationSet>>,
    rstate: ReferencedState,
}

/// A field reference.
#[derive(Clone, Copy)]
pub struct DexFieldRef(&'static FieldData);

/// A field reference known to carry a definition.
#[derive(Clone, Copy)]
pub struct DexField(&'static FieldData);

pointer_identity!(DexFieldRef);
pointer_identity!(DexField);

static FIELDS: LazyLock<InternTable<(DexType, DexString, DexType), DexFieldRef>> =
    LazyLock::new(InternTable::new);

impl DexFieldRef {
    pub fn make(class: DexType, name: DexString, ty: DexType) -> DexFieldRef {
        FIELDS.make(
            &(class, name, ty),
            || (class, name, ty),
            || {
                DexFieldRef(leak(FieldData {
                    class,
                    name,
                    ty,
                    def: OnceLock::new(),
                }))
            },
        )
    }

    /// Parse `LFoo;.bar:I`.
    pub fn make_from_descriptor(desc: &str) -> DexResult<DexFieldRef> {
        let (cls, name, ty) = split_member_descriptor(desc)?;
        Ok(Self::make(
            DexType::make_checked(cls)?,
            DexString::make(name),
            DexType::make_checked(ty)?,
        ))
    }

    pub fn get(class: DexType, name: DexString, ty: DexType) -> Option<DexFieldRef> {
        FIELDS.get(&(class, name, ty))
    }

    pub fn class_type(&self) -> DexType {
        self.0.class
    }

    pub fn name(&self) -> DexString {
        self.0.name
    }

    pub fn field_type(&self) -> DexType {
        self.0.ty
    }

    pub fn is_def(&self) -> bool {
        self.0.def.get().is_some()
    }

    pub fn as_def(&self) -> Option<DexField> {
        self.0.def.get().map(|_| DexField(self.0))
    }

    /// Promote to a definition. Promotion happens once; later calls return the
    /// existing definition unchanged.
    pub fn make_concrete(&self, access: DexAccessFlags, static_value: Option<EncodedValue>) -> DexField {
        self.0.def.get_or_init(|| FieldDef {
            access: AtomicU32::new(access.bits()),
            external: false,
            static_value: Mutex::new(static_value),
            annotations: RwLock::new(None),
            rstate: ReferencedState::new(),
        });
        DexField(self.0)
    }

    /// Promote to a definition living outside the optimized stores.
    pub fn make_external(&self, access: DexAccessFlags) -> DexField {
        self.0.def.get_or_init(|| FieldDef {
            access: AtomicU32::new(access.bits()),
            external: true,
            static_value: Mutex::new(None),
            annotations: RwLock::new(None),
            rstate: ReferencedState::new(),
        });
        DexField(self.0)
    }
}

impl DexField {
    fn def(&self) -> &'static FieldDef {
        let data: &'static FieldData = self.0;
        match data.def.get() {
            Some(def) => def,
            None => unreachable!("DexField handle without a definition"),
        }
    }

    pub fn as_ref(&self) -> DexFieldRef {
        DexFieldRef(self.0)
    }

    pub fn class_type(&self) -> DexType {
        self.0.class
    }

    pub fn name(&self) -> DexString {
        self.0.name
    }

    pub fn field_type(&self) -> DexType {
        self.0.ty
    }

    pub fn access(&self) -> DexAccessFlags {
        DexAccessFlags::from_bits(self.def().access.load(AtomicOrdering::Acquire))
    }

    pub fn set_access(&self, access: DexAccessFlags) {
        self.def().access.store(access.bits(), AtomicOrdering::Release);
    }

    pub fn is_static(&self) -> bool {
        self.access().is_static()
    }

    pub fn is_external(&self) -> bool {
        self.def().external
    }

    pub fn static_value(&self) -> Option<EncodedValue> {
        self.def().static_value.lock().clone()
    }

    pub fn set_static_value(&self, value: Option<EncodedValue>) {
        *self.def().static_value.lock() = value;
    }

    pub fn annotations(&self) -> Option<DexAnnotationSet> {
        self.def().annotations.read().clone()
    }

    pub fn set_annotations(&self, annotations: Option<DexAnnotationSet>) {
        *self.def().annotations.write() = annotations;
    }

    pub fn rstate(&self) -> &'static ReferencedState {
        &self.def().rstate
    }
}

macro_rules! member_order {
    ($handle:ident, $third:ident) => {
        impl PartialOrd for $handle {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $handle {
            fn cmp(&self, other: &Self) -> Ordering {
                if self == other {
                    return Ordering::Equal;
                }
                self.0
                    .class
                    .cmp(&other.0.class)
                    .then_with(|| self.0.name.cmp(&other.0.name))
                    .then_with(|| self.0.$third.cmp(&other.0.$third))
            }
        }
    };
}

member_order!(DexFieldRef, ty);
member_order!(DexField, ty);

impl fmt::Display for DexFieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.0.class, self.0.name, self.0.ty)
    }
}

impl fmt::Debug for DexFieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexFieldRef({})", self)
    }
}

impl fmt::Display for DexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_ref(), f)
    }
}

impl fmt::Debug for DexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexField({})", self)
    }
}

// ============================================================================
// Methods
// ============================================================================

pub struct MethodData {
    class: DexType,
    name: DexString,
    proto: DexProto,
    def: OnceLock<MethodDef>,
}

/// Definition payload of a concrete method.
pub struct MethodDef {
    access: AtomicU32,
    is_virtual: AtomicBool,
    external: bool,
    code: Mutex<Option<IRCode>>,
    annotations: RwLock<Option<DexAnnotationSet>>,
    param_annotations: RwLock<BTreeMap<u32, DexAnnotationSet>>,
    rstate: ReferencedState,
}

/// A method reference.
#[derive(Clone, Copy)]
pub struct DexMethodRef(&'static MethodData);

/// A method reference known to carry a definition.
#[derive(Clone, Copy)]
pub struct DexMethod(&'static MethodData);

pointer_identity!(DexMethodRef);
pointer_identity!(DexMethod);

static METHODS: LazyLock<InternTable<(DexType, DexString, DexProto), DexMethodRef>> =
    LazyLock::new(InternTable::new);

impl DexMethodRef {
    pub fn make(class: DexType, name: DexString, proto: DexProto) -> DexMethodRef {
        METHODS.make(
            &(class, name, proto),
            || (class, name, proto),
            || {
                DexMethodRef(leak(MethodData {
                    class,
                    name,
                    proto,
                    def: OnceLock::new(),
                }))
            },
        )
    }

    /// Parse `LFoo;.bar:(I)V`.
    pub fn make_from_descriptor(desc: &str) -> DexResult<DexMethodRef> {
        let (cls, name, proto) = split_member_descriptor(desc)?;
        Ok(Self::make(
            DexType::make_checked(cls)?,
            DexString::make(name),
            DexProto::from_descriptor(proto)?,
        ))
    }

    pub fn get(class: DexType, name: DexString, proto: DexProto) -> Option<DexMethodRef> {
        METHODS.get(&(class, name, proto))
    }

    pub fn class_type(&self) -> DexType {
        self.0.class
    }

    pub fn name(&self) -> DexString {
        self.0.name
    }

    pub fn proto(&self) -> DexProto {
        self.0.proto
    }

    pub fn is_def(&self) -> bool {
        self.0.def.get().is_some()
    }

    pub fn as_def(&self) -> Option<DexMethod> {
        self.0.def.get().map(|_| DexMethod(self.0))
    }

    pub fn is_constructor(&self) -> bool {
        self.0.name.as_str() == "<init>"
    }

    pub fn is_clinit(&self) -> bool {
        self.0.name.as_str() == "<clinit>"
    }

    /// Promote to a definition. Promotion happens once; a second call with a
    /// different virtual-ness is rejected, otherwise the existing definition is
    /// returned unchanged.
    pub fn make_concrete(
        &self,
        access: DexAccessFlags,
        code: Option<IRCode>,
        is_virtual: bool,
    ) -> DexResult<DexMethod> {
        let mut fresh = false;
        let def = self.0.def.get_or_init(|| {
            fresh = true;
            MethodDef {
                access: AtomicU32::new(access.bits()),
                is_virtual: AtomicBool::new(is_virtual),
                external: false,
                code: Mutex::new(None),
                annotations: RwLock::new(None),
                param_annotations: RwLock::new(BTreeMap::new()),
                rstate: ReferencedState::new(),
            }
        });
        if !fresh && def.is_virtual.load(AtomicOrdering::Acquire) != is_virtual {
            return Err(DexError::DefinitionMismatch(self.to_string()));
        }
        let method = DexMethod(self.0);
        if fresh {
            method.set_code(code);
        }
        Ok(method)
    }

    /// Promote to a definition living outside the optimized stores.
    pub fn make_external(&self, access: DexAccessFlags, is_virtual: bool) -> DexMethod {
        self.0.def.get_or_init(|| MethodDef {
            access: AtomicU32::new(access.bits()),
            is_virtual: AtomicBool::new(is_virtual),
            external: true,
            code: Mutex::new(None),
            annotations: RwLock::new(None),
            param_annotations: RwLock::new(BTreeMap::new()),
            rstate: ReferencedState::new(),
        });
        DexMethod(self.0)
    }
}

impl DexMethod {
    fn def(&self) -> &'static MethodDef {
        let data: &'static MethodData = self.0;
        match data.def.get() {
            Some(def) => def,
            None => unreachable!("DexMethod handle without a definition"),
        }
    }

    pub fn as_ref(&self) -> DexMethodRef {
        DexMethodRef(self.0)
    }

    pub fn class_type(&self) -> DexType {
        self.0.class
    }

    pub fn name(&self) -> DexString {
        self.0.name
    }

    pub fn proto(&self) -> DexProto {
        self.0.proto
    }

    pub fn access(&self) -> DexAccessFlags {
        DexAccessFlags::from_bits(self.def().access.load(AtomicOrdering::Acquire))
    }

    pub fn set_access(&self, access: DexAccessFlags) {
        self.def().access.store(access.bits(), AtomicOrdering::Release);
    }

    pub fn is_virtual(&self) -> bool {
        self.def().is_virtual.load(AtomicOrdering::Acquire)
    }

    pub fn set_virtual(&self, is_virtual: bool) {
        self.def().is_virtual.store(is_virtual, AtomicOrdering::Release);
    }

    pub fn is_external(&self) -> bool {
        self.def().external
    }

    pub fn is_static(&self) -> bool {
        self.access().is_static()
    }

    pub fn is_abstract(&self) -> bool {
        self.access().is_abstract()
    }

    pub fn is_native(&self) -> bool {
        self.access().is_native()
    }

    pub fn is_constructor(&self) -> bool {
        self.as_ref().is_constructor()
    }

    pub fn is_clinit(&self) -> bool {
        self.as_ref().is_clinit()
    }

    /// Whether the method may own a body (not abstract, not native, not external).
    pub fn may_have_code(&self) -> bool {
        let access = self.access();
        !self.is_external() && !access.contains(ACC_ABSTRACT) && !access.contains(ACC_NATIVE)
    }

    pub fn has_code(&self) -> bool {
        self.def().code.lock().is_some()
    }

    /// Lock and borrow the method body.
    ///
    /// The guard holds the method's code lock; do not call back into `code()`
    /// of the same method while it is alive.
    pub fn code(&self) -> Option<MappedMutexGuard<'static, IRCode>> {
        MutexGuard::try_map(self.def().code.lock(), |code| code.as_mut()).ok()
    }

    /// Replace the body, returning the previous one.
    pub fn set_code(&self, code: Option<IRCode>) -> Option<IRCode> {
        std::mem::replace(&mut *self.def().code.lock(), code)
    }

    /// Drop the body (e.g. when the method becomes abstract).
    pub fn release_code(&self) -> Option<IRCode> {
        self.set_code(None)
    }

    pub fn annotations(&self) -> Option<DexAnnotationSet> {
        self.def().annotations.read().clone()
    }

    pub fn set_annotations(&self, annotations: Option<DexAnnotationSet>) {
        *self.def().annotations.write() = annotations;
    }

    pub fn param_annotations(&self) -> BTreeMap<u32, DexAnnotationSet> {
        self.def().param_annotations.read().clone()
    }

    pub fn set_param_annotation(&self, index: u32, annotations: DexAnnotationSet) {
        self.def().param_annotations.write().insert(index, annotations);
    }

    pub fn rstate(&self) -> &'static ReferencedState {
        &self.def().rstate
    }

    /// `LFoo;.bar:(I)V`
    pub fn show(&self) -> String {
        self.to_string()
    }
}

member_order!(DexMethodRef, proto);
member_order!(DexMethod, proto);

impl fmt::Display for DexMethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.0.class, self.0.name, self.0.proto)
    }
}

impl fmt::Debug for DexMethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexMethodRef({})", self)
    }
}

impl fmt::Display for DexMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_ref(), f)
    }
}

impl fmt::Debug for DexMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexMethod({})", self)
    }
}
