//! Sharded concurrent hash containers.
//!
//! Thin wrappers over [`DashMap`] exposing the operation set passes rely on:
//! `insert` reporting whether it inserted, `erase`, `count`, and `update`
//! for an atomic read-modify-write of one entry. Reads and writes of the same
//! key from different threads are serialized by the key's shard lock; bulk
//! reads (`len`, iteration) must not run concurrently with writers if their
//! result matters.
//!
//! Iteration visits shards in shard order and is therefore only exposed
//! through explicitly named helpers (`unordered_for_each`, `to_ordered_keys`,
//! `to_ordered`).

use std::cmp::Ordering;
use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::hash_utils::FastBuildHasher;

/// Default number of shards; must be a power of two for DashMap.
pub const DEFAULT_SHARDS: usize = 32;

/// A sharded concurrent hash map.
pub struct ConcurrentMap<K, V> {
    inner: DashMap<K, V, FastBuildHasher>,
}

impl<K: Eq + Hash, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> std::fmt::Debug for ConcurrentMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl<K: Eq + Hash, V> ConcurrentMap<K, V> {
    /// Create an empty map with [`DEFAULT_SHARDS`] shards.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create an empty map with at least `shards` shards (rounded up to a power of two).
    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(2).next_power_of_two();
        Self {
            inner: DashMap::with_hasher_and_shard_amount(FastBuildHasher::default(), shards),
        }
    }

    /// Insert `value` under `key` unless the key is already present.
    ///
    /// Returns `true` if the value was inserted.
    pub fn insert(&self, key: K, value: V) -> bool {
        match self.inner.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(value);
                true
            }
        }
    }

    /// Insert or overwrite. Returns the previous value, if any.
    pub fn insert_or_assign(&self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    /// Remove `key`. Returns `true` if it was present.
    pub fn erase(&self, key: &K) -> bool {
        self.inner.remove(key).is_some()
    }

    /// Remove `key` and return its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    /// 1 if `key` is present, else 0.
    pub fn count(&self, key: &K) -> usize {
        usize::from(self.inner.contains_key(key))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Clone out the value stored under `key`.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.get(key).map(|r| r.value().clone())
    }

    /// Run `f` on the value stored under `key` while holding its shard lock.
    pub fn with_value<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.inner.get(key).map(|r| f(r.value()))
    }

    /// Atomically run `f(value, existed)` on the entry for `key`, creating a
    /// default value first if the key is absent.
    pub fn update<R>(&self, key: K, f: impl FnOnce(&mut V, bool) -> R) -> R
    where
        V: Default,
    {
        match self.inner.entry(key) {
            Entry::Occupied(mut o) => f(o.get_mut(), true),
            Entry::Vacant(v) => {
                let mut r = v.insert(V::default());
                f(r.value_mut(), false)
            }
        }
    }

    /// Return the value under `key`, creating it with `make` if absent.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V
    where
        V: Clone,
    {
        self.inner.entry(key).or_insert_with(make).value().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Visit every entry in shard order. The visiting order is unspecified;
    /// `f` must be insensitive to it.
    pub fn unordered_for_each(&self, mut f: impl FnMut(&K, &V)) {
        for r in self.inner.iter() {
            f(r.key(), r.value());
        }
    }

    /// Snapshot the keys, sorted.
    pub fn to_ordered_keys(&self) -> Vec<K>
    where
        K: Ord + Clone,
    {
        let mut keys: Vec<K> = self.inner.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Snapshot the entries, sorted by `cmp`.
    pub fn to_ordered<F>(&self, mut cmp: F) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
        F: FnMut(&(K, V), &(K, V)) -> Ordering,
    {
        let mut entries: Vec<(K, V)> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        entries.sort_by(&mut cmp);
        entries
    }

    /// Consume the map, returning its entries sorted by key.
    pub fn into_ordered(self) -> Vec<(K, V)>
    where
        K: Ord,
    {
        let mut entries: Vec<(K, V)> = self.inner.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// A sharded concurrent hash set.
pub struct ConcurrentSet<K> {
    map: ConcurrentMap<K, ()>,
}

impl<K: Eq + Hash> Default for ConcurrentSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> std::fmt::Debug for ConcurrentSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentSet")
            .field("len", &self.map.len())
            .finish()
    }
}

impl<K: Eq + Hash> ConcurrentSet<K> {
    pub fn new() -> Self {
        Self {
            map: ConcurrentMap::new(),
        }
    }

    pub fn with_shards(shards: usize) -> Self {
        Self {
            map: ConcurrentMap::with_shards(shards),
        }
    }

    /// Returns `true` if `key` was not already present.
    pub fn insert(&self, key: K) -> bool {
        self.map.insert(key, ())
    }

    pub fn erase(&self, key: &K) -> bool {
        self.map.erase(key)
    }

    pub fn count(&self, key: &K) -> usize {
        self.map.count(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn unordered_for_each(&self, mut f: impl FnMut(&K)) {
        self.map.unordered_for_each(|k, _| f(k));
    }

    pub fn to_ordered_keys(&self) -> Vec<K>
    where
        K: Ord + Clone,
    {
        self.map.to_ordered_keys()
    }

    /// Consume the set, returning its elements sorted.
    pub fn into_ordered(self) -> Vec<K>
    where
        K: Ord,
    {
        self.map.into_ordered().into_iter().map(|(k, _)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_insert_reports_first_insert_only() {
        let map: ConcurrentMap<u32, &str> = ConcurrentMap::new();
        assert!(map.insert(1, "a"));
        assert!(!map.insert(1, "b"));
        assert_eq!(map.get(&1), Some("a"));
        assert_eq!(map.count(&1), 1);
        assert_eq!(map.count(&2), 0);
    }

    #[test]
    fn test_erase_and_update() {
        let map: ConcurrentMap<&str, u64> = ConcurrentMap::with_shards(31);
        let existed = map.update("x", |v, existed| {
            *v += 5;
            existed
        });
        assert!(!existed);
        map.update("x", |v, _| *v *= 2);
        assert_eq!(map.get(&"x"), Some(10));
        assert!(map.erase(&"x"));
        assert!(!map.erase(&"x"));
        assert!(map.is_empty());
    }

    #[test]
    fn test_concurrent_update_is_atomic() {
        let map: Arc<ConcurrentMap<u32, u64>> = Arc::new(ConcurrentMap::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..1000u32 {
                        map.update(i % 7, |v, _| *v += 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let map = Arc::try_unwrap(map).unwrap_or_else(|_| panic!("map still shared"));
        let total: u64 = map.into_ordered().iter().map(|(_, v)| *v).sum();
        assert_eq!(total, 8000);
    }

    #[test]
    fn test_set_ordered_keys() {
        let set: ConcurrentSet<u32> = ConcurrentSet::new();
        for k in [9, 3, 7, 3, 1] {
            set.insert(k);
        }
        assert_eq!(set.len(), 4);
        assert_eq!(set.to_ordered_keys(), vec![1, 3, 7, 9]);
        assert!(set.contains(&7));
    }
}
