//! Dominator tree and natural loops.
//!
//! Immediate dominators are computed with the iterative scheme of Cooper,
//! Harvey and Kennedy over the reverse postorder of the graph.

use std::collections::{BTreeMap, BTreeSet};

use super::graph::{BlockId, ControlFlowGraph};

/// Immediate dominators. The entry block maps to itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dominators {
    idom: BTreeMap<BlockId, BlockId>,
    entry: BlockId,
}

impl Dominators {
    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        self.idom.get(&b).copied()
    }

    /// Whether `a` dominates `b`. Unreachable blocks are dominated by
    /// nothing.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom.get(&cur) {
                Some(&up) if up != cur => cur = up,
                _ => return false,
            }
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }
}

/// A natural loop: its header and every block in the body, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    pub header: BlockId,
    pub blocks: BTreeSet<BlockId>,
}

impl ControlFlowGraph {
    /// Blocks reachable from the entry, in postorder.
    pub fn postorder(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut visited = BTreeSet::new();
        // Explicit stack of (block, successors, next successor index).
        let mut stack: Vec<(BlockId, Vec<BlockId>, usize)> = Vec::new();
        if self.blocks.contains_key(&self.entry) {
            visited.insert(self.entry);
            stack.push((self.entry, self.succ_blocks(self.entry), 0));
        }
        while let Some((b, succs, next)) = stack.last_mut() {
            if let Some(&s) = succs.get(*next) {
                *next += 1;
                if visited.insert(s) {
                    let s_succs = self.succ_blocks(s);
                    stack.push((s, s_succs, 0));
                }
            } else {
                order.push(*b);
                stack.pop();
            }
        }
        order
    }

    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }

    pub fn dominators(&self) -> Dominators {
        let rpo = self.reverse_postorder();
        let number: BTreeMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, b)| (*b, i)).collect();
        let mut idom: BTreeMap<BlockId, BlockId> = BTreeMap::new();
        idom.insert(self.entry, self.entry);

        let intersect = |idom: &BTreeMap<BlockId, BlockId>, mut a: BlockId, mut b: BlockId| {
            while a != b {
                while number[&a] > number[&b] {
                    a = idom[&a];
                }
                while number[&b] > number[&a] {
                    b = idom[&b];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for p in self.pred_blocks(b) {
                    if !idom.contains_key(&p) || !number.contains_key(&p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, p, cur),
                    });
                }
                if let Some(n) = new_idom {
                    if idom.get(&b) != Some(&n) {
                        idom.insert(b, n);
                        changed = true;
                    }
                }
            }
        }
        Dominators {
            idom,
            entry: self.entry,
        }
    }

    /// Natural loops, one per header, ordered by header.
    pub fn find_loops(&self) -> Vec<Loop> {
        let doms = self.dominators();
        let mut loops: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
        for edge in self.edges() {
            let (src, header) = (edge.src, edge.target);
            if !doms.dominates(header, src) || doms.idom(src).is_none() {
                continue;
            }
            let body = loops.entry(header).or_insert_with(|| BTreeSet::from([header]));
            let mut work = vec![src];
            while let Some(b) = work.pop() {
                if body.insert(b) {
                    work.extend(self.pred_blocks(b));
                }
            }
        }
        loops
            .into_iter()
            .map(|(header, blocks)| Loop { header, blocks })
            .collect()
    }
}
