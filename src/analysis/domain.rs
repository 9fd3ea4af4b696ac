//! Abstract domains.
//!
//! A domain is a join semi-lattice with a least element. Analyses start
//! every unvisited program point at [`AbstractDomain::bottom`] and only ever
//! move up, which is what makes the iteration in
//! [`super::fixpoint::MonotonicFixpointIterator`] terminate.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use super::bitset::BitSet;

pub trait AbstractDomain: Clone + Debug + PartialEq {
    fn bottom() -> Self;

    fn is_bottom(&self) -> bool;

    /// Partial order of the lattice.
    fn leq(&self, other: &Self) -> bool;

    fn join_with(&mut self, other: &Self);

    /// Widening; domains of finite height can keep the default.
    fn widen_with(&mut self, other: &Self) {
        self.join_with(other);
    }

    fn join(mut self, other: &Self) -> Self {
        self.join_with(other);
        self
    }
}

/// Powerset of register numbers ordered by inclusion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterSetDomain(pub BitSet);

impl RegisterSetDomain {
    pub fn contains(&self, reg: u32) -> bool {
        self.0.contains(reg as usize)
    }

    pub fn insert(&mut self, reg: u32) {
        self.0.insert(reg as usize);
    }

    pub fn remove(&mut self, reg: u32) {
        self.0.remove(reg as usize);
    }

    pub fn regs(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().map(|r| r as u32)
    }

    pub fn bits(&self) -> &BitSet {
        &self.0
    }
}

impl AbstractDomain for RegisterSetDomain {
    fn bottom() -> Self {
        Self::default()
    }

    fn is_bottom(&self) -> bool {
        self.0.is_empty()
    }

    fn leq(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    fn join_with(&mut self, other: &Self) {
        self.0.union_with(&other.0);
    }
}

/// Map from keys to powersets, joined pointwise. Missing keys are empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapOfSetsDomain<K: Ord + Clone + Debug, V: Ord + Clone + Debug> {
    map: BTreeMap<K, BTreeSet<V>>,
}

impl<K: Ord + Clone + Debug, V: Ord + Clone + Debug> Default for MapOfSetsDomain<K, V> {
    fn default() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone + Debug, V: Ord + Clone + Debug> MapOfSetsDomain<K, V> {
    pub fn get(&self, key: &K) -> Option<&BTreeSet<V>> {
        self.map.get(key)
    }

    /// Strong update: `key` now maps to exactly `values`.
    pub fn set(&mut self, key: K, values: BTreeSet<V>) {
        if values.is_empty() {
            self.map.remove(&key);
        } else {
            self.map.insert(key, values);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &BTreeSet<V>)> + '_ {
        self.map.iter()
    }
}

impl<K: Ord + Clone + Debug, V: Ord + Clone + Debug> AbstractDomain for MapOfSetsDomain<K, V> {
    fn bottom() -> Self {
        Self::default()
    }

    fn is_bottom(&self) -> bool {
        self.map.is_empty()
    }

    fn leq(&self, other: &Self) -> bool {
        self.map
            .iter()
            .all(|(k, v)| other.map.get(k).is_some_and(|o| v.is_subset(o)))
    }

    fn join_with(&mut self, other: &Self) {
        for (k, v) in &other.map {
            self.map.entry(k.clone()).or_default().extend(v.iter().cloned());
        }
    }
}

/// Flat lattice over a value: `Bottom < Value(x) < Top`, with distinct
/// values joining to `Top`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstantDomain<T> {
    Bottom,
    Value(T),
    Top,
}

impl<T: Clone + Debug + PartialEq> AbstractDomain for ConstantDomain<T> {
    fn bottom() -> Self {
        ConstantDomain::Bottom
    }

    fn is_bottom(&self) -> bool {
        matches!(self, ConstantDomain::Bottom)
    }

    fn leq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstantDomain::Bottom, _) | (_, ConstantDomain::Top) => true,
            (ConstantDomain::Value(a), ConstantDomain::Value(b)) => a == b,
            _ => false,
        }
    }

    fn join_with(&mut self, other: &Self) {
        *self = match (&*self, other) {
            (ConstantDomain::Bottom, o) => o.clone(),
            (s, ConstantDomain::Bottom) => s.clone(),
            (ConstantDomain::Value(a), ConstantDomain::Value(b)) if a == b => {
                ConstantDomain::Value(a.clone())
            }
            _ => ConstantDomain::Top,
        };
    }
}
