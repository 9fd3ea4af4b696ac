//! Walkers over a scope.
//!
//! The sequential walkers visit classes in scope order and, within a class,
//! direct methods before virtual ones. [`parallel`] runs the same visits on
//! the current rayon pool; reductions merge per-class results in class
//! order, so they come out the same for any thread count.

use std::collections::{BTreeMap, BTreeSet};

use crate::dex::{DexClass, DexMethod};
use crate::ir::{IRCode, IRInstruction};

pub fn classes(scope: &[DexClass], mut f: impl FnMut(DexClass)) {
    for cls in scope {
        f(*cls);
    }
}

pub fn methods(scope: &[DexClass], mut f: impl FnMut(DexMethod)) {
    for cls in scope {
        for m in cls.all_methods() {
            f(m);
        }
    }
}

/// Visit every method that has a body, with the body locked.
pub fn code(scope: &[DexClass], mut f: impl FnMut(DexMethod, &mut IRCode)) {
    methods(scope, |m| {
        if let Some(mut code) = m.code() {
            f(m, &mut code);
        }
    });
}

/// Visit every instruction of every body.
pub fn opcodes(scope: &[DexClass], mut f: impl FnMut(DexMethod, &IRInstruction)) {
    code(scope, |m, code| {
        for insn in code.instructions() {
            f(m, insn);
        }
    });
}

/// A value that parallel walks can merge.
///
/// `reduce` must be associative; it is always applied in class order.
pub trait Reducible: Default + Send {
    fn reduce(&mut self, other: Self);
}

macro_rules! reducible_by_add {
    ($($t:ty),*) => {
        $(impl Reducible for $t {
            fn reduce(&mut self, other: Self) {
                *self += other;
            }
        })*
    };
}

reducible_by_add!(usize, u32, u64, i64);

impl Reducible for () {
    fn reduce(&mut self, _other: Self) {}
}

impl<T: Send> Reducible for Vec<T> {
    fn reduce(&mut self, other: Self) {
        self.extend(other);
    }
}

impl<T: Ord + Send> Reducible for BTreeSet<T> {
    fn reduce(&mut self, other: Self) {
        self.extend(other);
    }
}

impl<K: Ord + Send, V: Reducible> Reducible for BTreeMap<K, V> {
    fn reduce(&mut self, other: Self) {
        for (k, v) in other {
            self.entry(k).or_default().reduce(v);
        }
    }
}

impl<A: Reducible, B: Reducible> Reducible for (A, B) {
    fn reduce(&mut self, other: Self) {
        self.0.reduce(other.0);
        self.1.reduce(other.1);
    }
}

pub mod parallel {
    use rayon::prelude::*;

    use super::Reducible;
    use crate::dex::{DexClass, DexMethod};
    use crate::ir::IRCode;

    pub fn classes<F>(scope: &[DexClass], f: F)
    where
        F: Fn(DexClass) + Sync,
    {
        scope.par_iter().for_each(|cls| f(*cls));
    }

    /// Map every method through `f` and reduce the results in class order.
    pub fn methods<T, F>(scope: &[DexClass], f: F) -> T
    where
        T: Reducible,
        F: Fn(DexMethod) -> T + Sync,
    {
        reduce_classes(scope, |cls| {
            let mut acc = T::default();
            for m in cls.all_methods() {
                acc.reduce(f(m));
            }
            acc
        })
    }

    /// Run `f` on every body. Each task only touches its own method.
    pub fn code<F>(scope: &[DexClass], f: F)
    where
        F: Fn(DexMethod, &mut IRCode) + Sync,
    {
        reduce_code(scope, |m, code| f(m, code))
    }

    /// Like [`code`], reducing the per-method results in class order.
    pub fn reduce_code<T, F>(scope: &[DexClass], f: F) -> T
    where
        T: Reducible,
        F: Fn(DexMethod, &mut IRCode) -> T + Sync,
    {
        methods(scope, |m| match m.code() {
            Some(mut code) => f(m, &mut code),
            None => T::default(),
        })
    }

    /// Map every class through `f` and reduce the results in class order.
    pub fn reduce_classes<T, F>(scope: &[DexClass], f: F) -> T
    where
        T: Reducible,
        F: Fn(DexClass) -> T + Sync,
    {
        let partials: Vec<T> = scope.par_iter().map(|cls| f(*cls)).collect();
        partials.into_iter().fold(T::default(), |mut acc, part| {
            acc.reduce(part);
            acc
        })
    }
}
