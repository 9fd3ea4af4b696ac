//! Retainer recording: for each marked object, the objects whose visit
//! marked it.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use itertools::Itertools;

use super::objects::ReachableObject;
use crate::concurrent::ConcurrentMap;

#[derive(Debug, Default)]
pub struct ReachabilityGraph {
    retainers: ConcurrentMap<ReachableObject, BTreeSet<ReachableObject>>,
}

impl ReachabilityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, obj: ReachableObject, retainer: ReachableObject) {
        self.retainers.update(obj, |set, _| {
            set.insert(retainer);
        });
    }

    pub fn retainers(&self, obj: ReachableObject) -> BTreeSet<ReachableObject> {
        self.retainers.get(&obj).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.retainers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retainers.is_empty()
    }

    /// `obj` followed by one retainer after another until the seed. Takes
    /// the smallest retainer not already on the path; stops early if every
    /// retainer is.
    pub fn explain(&self, obj: ReachableObject) -> Vec<ReachableObject> {
        let mut path = vec![obj];
        let mut on_path: BTreeSet<ReachableObject> = [obj].into_iter().collect();
        let mut cur = obj;
        while cur != ReachableObject::Seed {
            let next = self
                .retainers(cur)
                .into_iter()
                .find(|r| !on_path.contains(r));
            let Some(next) = next else { break };
            on_path.insert(next);
            path.push(next);
            cur = next;
        }
        path
    }

    /// One line per marked object, `obj <- r1, r2`, sorted.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (obj, retainers) in self.retainers.to_ordered(|a, b| a.0.cmp(&b.0)) {
            let _ = writeln!(out, "{} <- {}", obj, retainers.iter().join(", "));
        }
        out
    }
}
