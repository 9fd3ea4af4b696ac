//! Encoded values: static field initializers and annotation elements.

use std::fmt;

use super::annotations::DexAnnotation;
use super::members::{DexFieldRef, DexMethodRef};
use super::strings::DexString;
use super::types::DexType;

#[derive(Clone, PartialEq)]
pub enum EncodedValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    /// IEEE-754 bits.
    Float(u32),
    /// IEEE-754 bits.
    Double(u64),
    String(DexString),
    Type(DexType),
    Field(DexFieldRef),
    Method(DexMethodRef),
    Enum(DexFieldRef),
    Array(Vec<EncodedValue>),
    Annotation(Box<DexAnnotation>),
}

impl EncodedValue {
    /// Zero/null/false for every kind; the implicit value of an uninitialized static.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Boolean(b) => !b,
            Self::Byte(v) => *v == 0,
            Self::Short(v) => *v == 0,
            Self::Char(v) => *v == 0,
            Self::Int(v) => *v == 0,
            Self::Long(v) => *v == 0,
            Self::Float(v) => *v == 0,
            Self::Double(v) => *v == 0,
            _ => false,
        }
    }

    pub fn gather_strings(&self, out: &mut Vec<DexString>) {
        match self {
            Self::String(s) => out.push(*s),
            Self::Array(values) => values.iter().for_each(|v| v.gather_strings(out)),
            Self::Annotation(anno) => anno.gather_strings(out),
            _ => {}
        }
    }

    pub fn gather_types(&self, out: &mut Vec<DexType>) {
        match self {
            Self::Type(t) => out.push(*t),
            Self::Field(f) | Self::Enum(f) => {
                out.push(f.class_type());
                out.push(f.field_type());
            }
            Self::Method(m) => {
                out.push(m.class_type());
                out.push(m.proto().return_type());
                out.extend(m.proto().args().iter());
            }
            Self::Array(values) => values.iter().for_each(|v| v.gather_types(out)),
            Self::Annotation(anno) => anno.gather_types(out),
            _ => {}
        }
    }

    pub fn gather_fields(&self, out: &mut Vec<DexFieldRef>) {
        match self {
            Self::Field(f) | Self::Enum(f) => out.push(*f),
            Self::Array(values) => values.iter().for_each(|v| v.gather_fields(out)),
            Self::Annotation(anno) => anno.gather_fields(out),
            _ => {}
        }
    }

    pub fn gather_methods(&self, out: &mut Vec<DexMethodRef>) {
        match self {
            Self::Method(m) => out.push(*m),
            Self::Array(values) => values.iter().for_each(|v| v.gather_methods(out)),
            Self::Annotation(anno) => anno.gather_methods(out),
            _ => {}
        }
    }
}

impl fmt::Debug for EncodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Byte(v) => write!(f, "{}b", v),
            Self::Short(v) => write!(f, "{}s", v),
            Self::Char(v) => write!(f, "{}c", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}L", v),
            Self::Float(v) => write!(f, "{}f", f32::from_bits(*v)),
            Self::Double(v) => write!(f, "{}d", f64::from_bits(*v)),
            Self::String(s) => write!(f, "{:?}", s),
            Self::Type(t) => write!(f, "{}", t),
            Self::Field(fr) => write!(f, "{}", fr),
            Self::Method(m) => write!(f, "{}", m),
            Self::Enum(fr) => write!(f, "enum {}", fr),
            Self::Array(values) => f.debug_list().entries(values).finish(),
            Self::Annotation(a) => write!(f, "{:?}", a),
        }
    }
}
