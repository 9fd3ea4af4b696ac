//! Deterministic-iteration wrappers over unordered containers.
//!
//! [`UnorderedMap`] and [`UnorderedSet`] keep the O(1) keyed operations of a
//! hash table but do not implement `IntoIterator` or expose `iter()`. Every
//! traversal goes through one of the `unordered_*` adapters below, so a reader
//! can tell at the call site whether the result may depend on hash order:
//!
//! | Adapter | Order-sensitive? |
//! |---------|------------------|
//! | [`unordered_to_ordered`] / [`unordered_to_ordered_keys`] | no, sorts first |
//! | [`unordered_accumulate`] | caller asserts the fold is commutative |
//! | [`unordered_any`] | caller asserts any element will do |
//! | [`unordered_erase_if`] / [`unordered_set_erase_if`] | no, predicate is per element |
//! | [`unordered_all`] / [`unordered_count_if`] | no |
//! | [`unordered_iterable`] | caller asserts the loop body is order-independent |
//!
//! Output-affecting code must use the ordering adapters.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::hash::Hash;

use itertools::Itertools;

use super::hash_utils::{FastHashMap, FastHashSet};

/// Containers whose traversal order is unspecified.
pub trait UnorderedIterable {
    type Item<'a>
    where
        Self: 'a;

    fn unordered_iter(&self) -> impl Iterator<Item = Self::Item<'_>>;
}

/// Containers with a key set.
pub trait UnorderedKeys {
    type Key;

    fn unordered_keys(&self) -> impl Iterator<Item = &Self::Key>;
}

/// Hash map without raw iteration.
#[derive(Clone)]
pub struct UnorderedMap<K, V> {
    inner: FastHashMap<K, V>,
}

impl<K, V> Default for UnorderedMap<K, V> {
    fn default() -> Self {
        Self {
            inner: FastHashMap::default(),
        }
    }
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for UnorderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<K: std::fmt::Debug + Ord + Eq + Hash, V: std::fmt::Debug> std::fmt::Debug
    for UnorderedMap<K, V>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(unordered_to_ordered(self, |a, b| a.0.cmp(b.0)))
            .finish()
    }
}

impl<K: Eq + Hash, V> UnorderedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; returns the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.get(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.get_mut(key)
    }

    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        self.inner.entry(key).or_insert_with(make)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.remove(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.contains_key(key)
    }

    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        usize::from(self.inner.contains_key(key))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for UnorderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<K: Eq + Hash, V> Extend<(K, V)> for UnorderedMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.inner.extend(iter);
    }
}

impl<K, V> UnorderedIterable for UnorderedMap<K, V> {
    type Item<'a>
        = (&'a K, &'a V)
    where
        Self: 'a;

    fn unordered_iter(&self) -> impl Iterator<Item = Self::Item<'_>> {
        self.inner.iter()
    }
}

impl<K, V> UnorderedKeys for UnorderedMap<K, V> {
    type Key = K;

    fn unordered_keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }
}

/// Hash set without raw iteration.
#[derive(Clone)]
pub struct UnorderedSet<K> {
    inner: FastHashSet<K>,
}

impl<K> Default for UnorderedSet<K> {
    fn default() -> Self {
        Self {
            inner: FastHashSet::default(),
        }
    }
}

impl<K: Eq + Hash> PartialEq for UnorderedSet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<K: Eq + Hash> Eq for UnorderedSet<K> {}

impl<K: std::fmt::Debug + Ord + Eq + Hash> std::fmt::Debug for UnorderedSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(unordered_to_ordered_keys(self)).finish()
    }
}

impl<K: Eq + Hash> UnorderedSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the element was not present.
    pub fn insert(&mut self, key: K) -> bool {
        self.inner.insert(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.remove(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.contains(key)
    }

    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        usize::from(self.inner.contains(key))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Union `other` into `self`; returns `true` if anything was added.
    pub fn union_with(&mut self, other: &Self) -> bool
    where
        K: Clone,
    {
        let before = self.inner.len();
        self.inner.extend(other.inner.iter().cloned());
        self.inner.len() != before
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.inner.is_subset(&other.inner)
    }
}

impl<K: Eq + Hash> FromIterator<K> for UnorderedSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<K: Eq + Hash> Extend<K> for UnorderedSet<K> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        self.inner.extend(iter);
    }
}

impl<K> UnorderedIterable for UnorderedSet<K> {
    type Item<'a>
        = &'a K
    where
        Self: 'a;

    fn unordered_iter(&self) -> impl Iterator<Item = Self::Item<'_>> {
        self.inner.iter()
    }
}

impl<K> UnorderedKeys for UnorderedSet<K> {
    type Key = K;

    fn unordered_keys(&self) -> impl Iterator<Item = &K> {
        self.inner.iter()
    }
}

/// Some element of `c`, or `None` if empty.
pub fn unordered_any<C: UnorderedIterable>(c: &C) -> Option<C::Item<'_>> {
    c.unordered_iter().next()
}

/// Fold over `c`. The fold must be commutative and associative.
pub fn unordered_accumulate<'c, C, T, F>(c: &'c C, init: T, f: F) -> T
where
    C: UnorderedIterable,
    F: FnMut(T, C::Item<'c>) -> T,
{
    c.unordered_iter().fold(init, f)
}

pub fn unordered_all<'c, C, F>(c: &'c C, pred: F) -> bool
where
    C: UnorderedIterable,
    F: FnMut(C::Item<'c>) -> bool,
{
    c.unordered_iter().all(pred)
}

pub fn unordered_any_of<'c, C, F>(c: &'c C, pred: F) -> bool
where
    C: UnorderedIterable,
    F: FnMut(C::Item<'c>) -> bool,
{
    c.unordered_iter().any(pred)
}

pub fn unordered_count_if<'c, C, F>(c: &'c C, mut pred: F) -> usize
where
    C: UnorderedIterable,
    F: FnMut(&C::Item<'c>) -> bool,
{
    c.unordered_iter().filter(|item| pred(item)).count()
}

/// Explicit opt-in to raw unordered iteration; the loop body must not
/// depend on the visiting order.
pub fn unordered_iterable<C: UnorderedIterable>(c: &C) -> impl Iterator<Item = C::Item<'_>> {
    c.unordered_iter()
}

/// Remove every map entry matching `pred`; returns the number removed.
pub fn unordered_erase_if<K, V, F>(map: &mut UnorderedMap<K, V>, mut pred: F) -> usize
where
    F: FnMut(&K, &V) -> bool,
{
    let before = map.inner.len();
    map.inner.retain(|k, v| !pred(k, v));
    before - map.inner.len()
}

/// Remove every set element matching `pred`; returns the number removed.
pub fn unordered_set_erase_if<K, F>(set: &mut UnorderedSet<K>, mut pred: F) -> usize
where
    F: FnMut(&K) -> bool,
{
    let before = set.inner.len();
    set.inner.retain(|k| !pred(k));
    before - set.inner.len()
}

/// All elements of `c`, sorted by `cmp`.
pub fn unordered_to_ordered<'c, C, F>(c: &'c C, mut cmp: F) -> Vec<C::Item<'c>>
where
    C: UnorderedIterable,
    F: FnMut(&C::Item<'c>, &C::Item<'c>) -> Ordering,
{
    c.unordered_iter().sorted_by(|a, b| cmp(a, b)).collect()
}

/// All keys of `c`, sorted by their natural order.
pub fn unordered_to_ordered_keys<C>(c: &C) -> Vec<&C::Key>
where
    C: UnorderedKeys,
    C::Key: Ord,
{
    c.unordered_keys().sorted().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_keys_are_sorted() {
        let mut map: UnorderedMap<u32, &str> = UnorderedMap::new();
        for (k, v) in [(5, "e"), (1, "a"), (3, "c")] {
            map.insert(k, v);
        }
        assert_eq!(unordered_to_ordered_keys(&map), vec![&1, &3, &5]);
        let by_value = unordered_to_ordered(&map, |a, b| b.1.cmp(a.1));
        assert_eq!(by_value[0], (&5, &"e"));
    }

    #[test]
    fn test_accumulate_and_erase_if() {
        let mut set: UnorderedSet<u32> = (1..=10).collect();
        let sum = unordered_accumulate(&set, 0u32, |acc, x| acc + x);
        assert_eq!(sum, 55);
        let removed = unordered_set_erase_if(&mut set, |x| x % 2 == 0);
        assert_eq!(removed, 5);
        assert_eq!(unordered_count_if(&set, |x| **x > 5), 2);
        assert!(unordered_all(&set, |x| x % 2 == 1));
    }

    #[test]
    fn test_any_on_singleton() {
        let mut map: UnorderedMap<&str, u8> = UnorderedMap::new();
        assert!(unordered_any(&map).is_none());
        map.insert("only", 1);
        assert_eq!(unordered_any(&map), Some((&"only", &1)));
        assert_eq!(
            unordered_erase_if(&mut map, |_, v| *v == 1),
            1
        );
        assert!(map.is_empty());
    }
}
