//! Process-wide interning tables.
//!
//! Every symbol kind owns one [`InternTable`]: a sharded map from canonical
//! key to a `Copy` handle wrapping a leaked `&'static` payload. Handles compare
//! and hash by pointer, so two equal keys always produce the same handle and
//! a payload lives for the rest of the process.

use std::borrow::Borrow;
use std::hash::Hash;

use dashmap::DashMap;

use crate::concurrent::FastBuildHasher;

/// Shard count for the symbol tables.
const INTERN_SHARDS: usize = 64;

pub(crate) struct InternTable<K, V> {
    map: DashMap<K, V, FastBuildHasher>,
}

impl<K: Eq + Hash, V: Copy> InternTable<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            map: DashMap::with_hasher_and_shard_amount(FastBuildHasher::default(), INTERN_SHARDS),
        }
    }

    /// Non-creating lookup.
    pub(crate) fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map.get(key).map(|r| *r.value())
    }

    /// Return the handle for `key`, creating it with `create` if absent.
    ///
    /// `create` runs under the shard's write lock, at most once per key.
    pub(crate) fn make<Q>(&self, lookup: &Q, key: impl FnOnce() -> K, create: impl FnOnce() -> V) -> V
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if let Some(v) = self.get(lookup) {
            return v;
        }
        *self.map.entry(key()).or_insert_with(create).value()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}

/// Leak `value` for the remaining lifetime of the process.
pub(crate) fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Implements pointer identity (`PartialEq`, `Eq`, `Hash`) for a handle
/// newtype over `&'static` payload.
macro_rules! pointer_identity {
    ($handle:ident) => {
        impl PartialEq for $handle {
            fn eq(&self, other: &Self) -> bool {
                std::ptr::eq(self.0, other.0)
            }
        }

        impl Eq for $handle {}

        impl std::hash::Hash for $handle {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                std::ptr::hash(self.0, state)
            }
        }
    };
}

pub(crate) use pointer_identity;
