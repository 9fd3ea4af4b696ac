//! Interned types, type lists and prototypes.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use parking_lot::RwLock;

use super::class::DexClass;
use super::error::{DexError, DexResult};
use super::intern::{leak, pointer_identity, InternTable};
use super::strings::DexString;
use super::type_util;

pub struct TypeData {
    name: DexString,
    class: RwLock<Option<DexClass>>,
}

/// An interned type, keyed by its descriptor (`Lcom/x/Y;`, `[I`, `V`).
#[derive(Clone, Copy)]
pub struct DexType(&'static TypeData);

pointer_identity!(DexType);

static TYPES: LazyLock<InternTable<DexString, DexType>> = LazyLock::new(InternTable::new);

impl DexType {
    /// Intern the type named by `descriptor`.
    pub fn make(descriptor: &str) -> DexType {
        Self::make_from_string(DexString::make(descriptor))
    }

    pub fn make_from_string(name: DexString) -> DexType {
        TYPES.make(
            &name,
            || name,
            || {
                DexType(leak(TypeData {
                    name,
                    class: RwLock::new(None),
                }))
            },
        )
    }

    /// Intern after validating the descriptor syntax.
    pub fn make_checked(descriptor: &str) -> DexResult<DexType> {
        if !type_util::is_valid_descriptor(descriptor) {
            return Err(DexError::InvalidDescriptor(descriptor.to_string()));
        }
        Ok(Self::make(descriptor))
    }

    pub fn get(descriptor: &str) -> Option<DexType> {
        DexString::get(descriptor).and_then(|s| TYPES.get(&s))
    }

    pub fn name(&self) -> DexString {
        self.0.name
    }

    pub fn as_str(&self) -> &'static str {
        self.0.name.as_str()
    }

    /// The class defined for this type, if any.
    pub fn class(&self) -> Option<DexClass> {
        *self.0.class.read()
    }

    pub(crate) fn attach_class(&self, cls: DexClass) -> DexResult<()> {
        let mut slot = self.0.class.write();
        if slot.is_some() {
            return Err(DexError::DuplicateClass(self.as_str().to_string()));
        }
        *slot = Some(cls);
        Ok(())
    }

    pub fn table_size() -> usize {
        TYPES.len()
    }
}

/// The class registered for `ty`, if any.
pub fn type_class(ty: DexType) -> Option<DexClass> {
    ty.class()
}

impl PartialOrd for DexType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DexType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.name.cmp(&other.0.name)
    }
}

impl fmt::Display for DexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for DexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexType({})", self.as_str())
    }
}

pub struct TypeListData {
    types: Box<[DexType]>,
}

/// An interned ordered list of types.
#[derive(Clone, Copy)]
pub struct DexTypeList(&'static TypeListData);

pointer_identity!(DexTypeList);

static TYPE_LISTS: LazyLock<InternTable<Vec<DexType>, DexTypeList>> =
    LazyLock::new(InternTable::new);

impl DexTypeList {
    pub fn make(types: Vec<DexType>) -> DexTypeList {
        TYPE_LISTS.make(
            types.as_slice(),
            || types.clone(),
            || {
                DexTypeList(leak(TypeListData {
                    types: types.clone().into_boxed_slice(),
                }))
            },
        )
    }

    pub fn empty() -> DexTypeList {
        Self::make(Vec::new())
    }

    pub fn get(types: &[DexType]) -> Option<DexTypeList> {
        TYPE_LISTS.get(types)
    }

    pub fn as_slice(&self) -> &'static [DexType] {
        let data: &'static TypeListData = self.0;
        &data.types
    }

    pub fn len(&self) -> usize {
        self.0.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DexType> + 'static {
        self.as_slice().iter().copied()
    }

    /// A new list with `ty` appended.
    pub fn push_back(&self, ty: DexType) -> DexTypeList {
        let mut types = self.0.types.to_vec();
        types.push(ty);
        Self::make(types)
    }

    /// A new list with `ty` prepended.
    pub fn push_front(&self, ty: DexType) -> DexTypeList {
        let mut types = Vec::with_capacity(self.len() + 1);
        types.push(ty);
        types.extend_from_slice(&self.0.types);
        Self::make(types)
    }

    /// Number of 32-bit register words needed to hold these types.
    pub fn size_in_words(&self) -> usize {
        self.iter()
            .map(|t| if type_util::is_wide_type(t) { 2 } else { 1 })
            .sum()
    }
}

impl PartialOrd for DexTypeList {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DexTypeList {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.types.cmp(&other.0.types)
    }
}

impl fmt::Display for DexTypeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in self.iter() {
            f.write_str(t.as_str())?;
        }
        Ok(())
    }
}

impl fmt::Debug for DexTypeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.types.iter()).finish()
    }
}

pub struct ProtoData {
    rtype: DexType,
    args: DexTypeList,
    shorty: DexString,
}

/// An interned method prototype: return type plus argument list.
#[derive(Clone, Copy)]
pub struct DexProto(&'static ProtoData);

pointer_identity!(DexProto);

static PROTOS: LazyLock<InternTable<(DexType, DexTypeList), DexProto>> =
    LazyLock::new(InternTable::new);

impl DexProto {
    pub fn make(rtype: DexType, args: DexTypeList) -> DexProto {
        PROTOS.make(
            &(rtype, args),
            || (rtype, args),
            || {
                let mut shorty = String::with_capacity(args.len() + 1);
                shorty.push(type_util::shorty_char(rtype));
                for arg in args.iter() {
                    shorty.push(type_util::shorty_char(arg));
                }
                DexProto(leak(ProtoData {
                    rtype,
                    args,
                    shorty: DexString::make(&shorty),
                }))
            },
        )
    }

    pub fn get(rtype: DexType, args: DexTypeList) -> Option<DexProto> {
        PROTOS.get(&(rtype, args))
    }

    /// Parse a `(args)ret` descriptor such as `(IJLjava/lang/String;)V`.
    pub fn from_descriptor(desc: &str) -> DexResult<DexProto> {
        let invalid = || DexError::InvalidDescriptor(desc.to_string());
        let rest = desc.strip_prefix('(').ok_or_else(invalid)?;
        let close = rest.find(')').ok_or_else(invalid)?;
        let (arg_str, ret_str) = (&rest[..close], &rest[close + 1..]);
        let mut args = Vec::new();
        let mut remaining = arg_str;
        while !remaining.is_empty() {
            let len = type_util::descriptor_prefix_len(remaining).ok_or_else(invalid)?;
            args.push(DexType::make_checked(&remaining[..len])?);
            remaining = &remaining[len..];
        }
        let rtype = DexType::make_checked(ret_str)?;
        Ok(Self::make(rtype, DexTypeList::make(args)))
    }

    pub fn return_type(&self) -> DexType {
        self.0.rtype
    }

    pub fn args(&self) -> DexTypeList {
        self.0.args
    }

    pub fn shorty(&self) -> DexString {
        self.0.shorty
    }

    pub fn is_void(&self) -> bool {
        type_util::is_void(self.0.rtype)
    }
}

impl PartialOrd for DexProto {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DexProto {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .rtype
            .cmp(&other.0.rtype)
            .then_with(|| self.0.args.cmp(&other.0.args))
    }
}

impl fmt::Display for DexProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}){}", self.0.args, self.0.rtype)
    }
}

impl fmt::Debug for DexProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexProto({})", self)
    }
}
