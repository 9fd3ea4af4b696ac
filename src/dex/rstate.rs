//! Referenced state: why an entity must be retained.
//!
//! Keep rules, native references and resource references are resolved by
//! external collaborators; they record their verdicts here and reachability
//! reads them back as roots.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ReferencedState {
    keep: AtomicBool,
    keep_name: AtomicBool,
    by_native: AtomicBool,
    by_resources: AtomicBool,
    allowshrinking: AtomicBool,
    generated: AtomicBool,
}

impl ReferencedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark as matched by a keep rule.
    pub fn set_root(&self) {
        self.keep.store(true, Ordering::Release);
    }

    pub fn unset_root(&self) {
        self.keep.store(false, Ordering::Release);
    }

    /// Referenced from native code by a blanket rule.
    pub fn set_blanket_native(&self) {
        self.by_native.store(true, Ordering::Release);
    }

    pub fn set_referenced_by_resources(&self) {
        self.by_resources.store(true, Ordering::Release);
    }

    pub fn set_keepnames(&self) {
        self.keep_name.store(true, Ordering::Release);
    }

    pub fn set_allowshrinking(&self) {
        self.allowshrinking.store(true, Ordering::Release);
    }

    pub fn set_generated(&self) {
        self.generated.store(true, Ordering::Release);
    }

    pub fn is_blanket_native(&self) -> bool {
        self.by_native.load(Ordering::Acquire)
    }

    pub fn is_referenced_by_resources(&self) -> bool {
        self.by_resources.load(Ordering::Acquire)
    }

    pub fn keep_name(&self) -> bool {
        self.keep_name.load(Ordering::Acquire)
    }

    pub fn is_generated(&self) -> bool {
        self.generated.load(Ordering::Acquire)
    }

    /// A keep rule that still allows shrinking does not make a root.
    pub fn has_keep(&self) -> bool {
        self.keep.load(Ordering::Acquire) && !self.allowshrinking.load(Ordering::Acquire)
    }

    pub fn can_delete(&self) -> bool {
        !self.has_keep() && !self.is_blanket_native() && !self.is_referenced_by_resources()
    }

    pub fn can_rename(&self) -> bool {
        self.can_delete() && !self.keep_name()
    }

    pub fn is_root(&self) -> bool {
        !self.can_delete()
    }
}
