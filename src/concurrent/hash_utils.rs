//! Fast HashMap/HashSet type aliases with optional AES-NI acceleration
//!
//! When the `ahash-hasher` feature is enabled, the aliases use ahash's
//! AES-NI accelerated hasher instead of SipHash. Interned symbols hash by
//! pointer, so the hasher cost dominates lookups in the symbol tables and
//! in the per-method register maps of the allocator.
//!
//! When the feature is disabled, these types are simple aliases to
//! the standard library HashMap/HashSet.
//!
//! None of these containers may be iterated on a path that influences
//! output; see [`crate::concurrent::deterministic`].

#[cfg(feature = "ahash-hasher")]
pub use ahash::{AHashMap as FastHashMap, AHashSet as FastHashSet};

#[cfg(not(feature = "ahash-hasher"))]
pub use std::collections::{HashMap as FastHashMap, HashSet as FastHashSet};

/// Build-hasher used for the sharded maps.
#[cfg(feature = "ahash-hasher")]
pub type FastBuildHasher = ahash::RandomState;

/// Build-hasher used for the sharded maps.
#[cfg(not(feature = "ahash-hasher"))]
pub type FastBuildHasher = std::collections::hash_map::RandomState;
