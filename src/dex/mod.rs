//! Global symbol tables and class model.
//!
//! Every symbol kind is interned process-wide: `make(key)` returns the one
//! handle for that key, `get(key)` looks it up without creating it. Handles
//! are `Copy`, compare and hash by pointer, and order by their canonical
//! spelling so sorting never depends on interning order.
//!
//! | Symbol | Key | Handle |
//! |--------|-----|--------|
//! | string | text | [`DexString`] |
//! | type | descriptor string | [`DexType`] |
//! | type list | ordered types | [`DexTypeList`] |
//! | proto | (return type, type list) | [`DexProto`] |
//! | field | (container, name, type) | [`DexFieldRef`] / [`DexField`] |
//! | method | (container, name, proto) | [`DexMethodRef`] / [`DexMethod`] |
//!
//! Classes are not interned by key; a class is attached to its type exactly
//! once by [`ClassCreator::create`] and found again with [`type_class`].
//!
//! ```text
//!   DexMethodRef ──make_concrete──> DexMethod ──code()──> IRCode
//!        │                              │
//!        └── class_type() ──> DexType ──class()──> DexClass
//! ```

mod intern;

pub mod access;
pub mod annotations;
pub mod class;
pub mod encoded_value;
pub mod error;
pub mod hierarchy;
pub mod members;
pub mod resolver;
pub mod rstate;
pub mod store;
pub mod strings;
pub mod type_util;
pub mod types;

#[cfg(test)]
mod tests;

pub use access::*;
pub use annotations::{AnnotationElement, AnnotationVisibility, DexAnnotation, DexAnnotationSet};
pub use class::{ClassCreator, DexClass};
pub use encoded_value::EncodedValue;
pub use error::{DexError, DexResult};
pub use hierarchy::{ClassHierarchy, InterfaceMap};
pub use members::{DexField, DexFieldRef, DexMethod, DexMethodRef};
pub use resolver::{resolve_field, resolve_method, FieldSearch, MethodSearch};
pub use rstate::ReferencedState;
pub use store::{build_class_scope, ordered_classes, DexClasses, DexStore, DexStoresVector, Scope};
pub use strings::DexString;
pub use types::{type_class, DexProto, DexType, DexTypeList};
