//! Concurrent containers and deterministic iteration.
//!
//! Two families of containers back every pass:
//!
//! | Family | Types | Used for |
//! |--------|-------|----------|
//! | Sharded concurrent | [`ConcurrentMap`], [`ConcurrentSet`] | cross-task state inside a parallel walk |
//! | Deterministic | [`UnorderedMap`], [`UnorderedSet`] | single-threaded state whose iteration must be reviewed |
//!
//! Iteration over either family is unordered. Any traversal whose result can
//! reach the output goes through an ordering step (`to_ordered_keys`,
//! [`unordered_to_ordered`], [`unordered_to_ordered_keys`]).
//!
//! [`workqueue_run`] drives fixpoint closures (reachability marking) over a
//! pool of scoped worker threads.

pub mod concurrent_map;
pub mod deterministic;
pub mod hash_utils;
pub mod work_queue;

pub use concurrent_map::{ConcurrentMap, ConcurrentSet, DEFAULT_SHARDS};
pub use deterministic::{
    unordered_accumulate, unordered_all, unordered_any, unordered_any_of, unordered_count_if,
    unordered_erase_if, unordered_iterable, unordered_set_erase_if, unordered_to_ordered,
    unordered_to_ordered_keys, UnorderedIterable, UnorderedKeys, UnorderedMap, UnorderedSet,
};
pub use hash_utils::{FastBuildHasher, FastHashMap, FastHashSet};
pub use work_queue::{default_num_threads, resolve_num_threads, workqueue_run, WorkerState};
