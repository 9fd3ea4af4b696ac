//! Annotations and annotation sets.

use super::encoded_value::EncodedValue;
use super::members::{DexFieldRef, DexMethodRef};
use super::strings::DexString;
use super::types::DexType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationVisibility {
    Build,
    Runtime,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationElement {
    pub name: DexString,
    pub value: EncodedValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DexAnnotation {
    pub ty: DexType,
    pub visibility: AnnotationVisibility,
    pub elements: Vec<AnnotationElement>,
}

impl DexAnnotation {
    pub fn new(ty: DexType, visibility: AnnotationVisibility) -> Self {
        Self {
            ty,
            visibility,
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, name: &str, value: EncodedValue) -> Self {
        self.elements.push(AnnotationElement {
            name: DexString::make(name),
            value,
        });
        self
    }

    /// Build-visibility annotations are dropped from the output and never keep anything alive.
    pub fn is_build_visible(&self) -> bool {
        self.visibility == AnnotationVisibility::Build
    }

    pub fn gather_strings(&self, out: &mut Vec<DexString>) {
        for e in &self.elements {
            out.push(e.name);
            e.value.gather_strings(out);
        }
    }

    pub fn gather_types(&self, out: &mut Vec<DexType>) {
        out.push(self.ty);
        for e in &self.elements {
            e.value.gather_types(out);
        }
    }

    pub fn gather_fields(&self, out: &mut Vec<DexFieldRef>) {
        for e in &self.elements {
            e.value.gather_fields(out);
        }
    }

    pub fn gather_methods(&self, out: &mut Vec<DexMethodRef>) {
        for e in &self.elements {
            e.value.gather_methods(out);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DexAnnotationSet {
    pub annotations: Vec<DexAnnotation>,
}

impl DexAnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, annotation: DexAnnotation) {
        self.annotations.push(annotation);
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn has_type(&self, ty: DexType) -> bool {
        self.annotations.iter().any(|a| a.ty == ty)
    }

    pub fn types(&self) -> impl Iterator<Item = DexType> + '_ {
        self.annotations.iter().map(|a| a.ty)
    }

    pub fn gather_strings(&self, out: &mut Vec<DexString>) {
        self.annotations.iter().for_each(|a| a.gather_strings(out));
    }

    pub fn gather_types(&self, out: &mut Vec<DexType>) {
        self.annotations.iter().for_each(|a| a.gather_types(out));
    }

    pub fn gather_fields(&self, out: &mut Vec<DexFieldRef>) {
        self.annotations.iter().for_each(|a| a.gather_fields(out));
    }

    pub fn gather_methods(&self, out: &mut Vec<DexMethodRef>) {
        self.annotations.iter().for_each(|a| a.gather_methods(out));
    }
}
