//! Turning a graph back into a linear body.
//!
//! Blocks are laid out by following goto edges where possible; a block
//! whose goto successor cannot come next gets an explicit `goto`. Branch
//! targets and catch entries are then placed in front of the blocks they
//! name, and try regions are rebuilt from runs of blocks that share a
//! handler list.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::graph::{BlockId, ControlFlowGraph, EdgeId, EdgeType};
use crate::dex::DexType;
use crate::ir::{
    BranchTarget, BranchTargetKind, CatchEntry, DexPosition, EntryId, IRInstruction, IRList,
    IROpcode, MethodItemEntry, TryEntry, TryEntryKind,
};

type CatchKey = Vec<(Option<DexType>, BlockId)>;

impl ControlFlowGraph {
    /// Block layout used by [`ControlFlowGraph::linearize`].
    pub fn linear_order(&self) -> Vec<BlockId> {
        let mut placed = BTreeSet::new();
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut cur = self.blocks.contains_key(&self.entry).then_some(self.entry);
        while let Some(b) = cur {
            placed.insert(b);
            order.push(b);
            let next = self
                .get_succ_edge_of_type(b, EdgeType::Goto)
                .map(|e| e.target)
                .filter(|t| !placed.contains(t));
            cur = next.or_else(|| {
                let mut unplaced = self.blocks.values().filter(|blk| !placed.contains(&blk.id));
                let free = unplaced
                    .clone()
                    .find(|blk| !blk.starts_with_move_result())
                    .map(|blk| blk.id);
                free.or_else(|| unplaced.next().map(|blk| blk.id))
            });
        }
        order
    }

    /// Produce the linear body this graph describes.
    pub fn linearize(&self) -> IRList {
        let order = self.linear_order();
        let mut list = IRList::new();
        let mut markers: BTreeMap<BlockId, EntryId> = BTreeMap::new();
        let mut branch_sources: BTreeMap<EdgeId, EntryId> = BTreeMap::new();
        let mut first_insns: BTreeMap<BlockId, EntryId> = BTreeMap::new();
        let mut last_pos: Option<Arc<DexPosition>> = None;

        for (i, &b) in order.iter().enumerate() {
            let Some(block) = self.block(b) else { continue };
            markers.insert(b, list.push_back(MethodItemEntry::Fallthrough));
            let prev = i.checked_sub(1).map(|p| order[p]);
            if self.is_jump_target(b, prev) {
                last_pos = None;
            }
            for entry in &block.entries {
                if let MethodItemEntry::Position(p) = entry {
                    if last_pos.as_ref().is_some_and(|l| Arc::ptr_eq(l, p) || l == p) {
                        continue;
                    }
                    last_pos = Some(Arc::clone(p));
                }
                let id = list.push_back(entry.clone());
                if let MethodItemEntry::Opcode(insn) = entry {
                    first_insns.entry(b).or_insert(id);
                    let op = insn.opcode();
                    if op.is_conditional_branch() || op.is_switch() {
                        for e in self.get_succ_edges_of_type(b, EdgeType::Branch) {
                            branch_sources.insert(e.id, id);
                        }
                    }
                }
            }
            if let Some(goto) = self.get_succ_edge_of_type(b, EdgeType::Goto) {
                if order.get(i + 1) != Some(&goto.target) {
                    let id = list.push_back(MethodItemEntry::Opcode(IRInstruction::new(IROpcode::Goto)));
                    branch_sources.insert(goto.id, id);
                }
            }
        }

        self.place_try_regions(&order, &markers, &first_insns, &mut list);

        for (edge_id, src) in &branch_sources {
            let Some(edge) = self.edge(*edge_id) else { continue };
            let Some(&marker) = markers.get(&edge.target) else { continue };
            let kind = match edge.case_key {
                Some(k) => BranchTargetKind::Multi(k),
                None => BranchTargetKind::Simple,
            };
            list.insert_before(marker, MethodItemEntry::Target(BranchTarget { kind, src: *src }));
        }

        list.remove_if(|e| matches!(e, MethodItemEntry::Fallthrough));
        list
    }

    /// Whether control can enter `b` other than by falling through from
    /// `prev`.
    fn is_jump_target(&self, b: BlockId, prev: Option<BlockId>) -> bool {
        self.pred_edges(b)
            .iter()
            .any(|e| e.kind != EdgeType::Goto || Some(e.src) != prev)
    }

    fn place_try_regions(
        &self,
        order: &[BlockId],
        markers: &BTreeMap<BlockId, EntryId>,
        first_insns: &BTreeMap<BlockId, EntryId>,
        list: &mut IRList,
    ) {
        // Runs of consecutive blocks with the same non-empty handler list.
        let mut runs: Vec<(usize, usize, CatchKey)> = Vec::new();
        for (i, &b) in order.iter().enumerate() {
            let key = self.catch_list(b);
            if key.is_empty() {
                continue;
            }
            match runs.last_mut() {
                Some((_, end, k)) if *end + 1 == i && *k == key => *end = i,
                _ => runs.push((i, i, key)),
            }
        }
        if runs.is_empty() {
            return;
        }

        // Region ends go in first so that catches and targets placed in
        // front of the same marker come after them. They are patched with
        // their handler chain once it exists. A region whose last
        // instruction hands its result to a move-result in the next block
        // ends after that move-result.
        let mut end_slots: Vec<EntryId> = Vec::with_capacity(runs.len());
        for (_, end, _) in &runs {
            let slot = MethodItemEntry::Fallthrough;
            let after = order.get(end + 1);
            let result_insn = after
                .filter(|a| self.catch_list(**a).is_empty())
                .filter(|a| self.block(**a).is_some_and(|blk| blk.starts_with_move_result()))
                .and_then(|a| first_insns.get(a));
            let id = match (result_insn, after.and_then(|a| markers.get(a))) {
                (Some(&r), _) => list.insert_after(r, slot),
                (None, Some(&m)) => list.insert_before(m, slot),
                (None, None) => list.push_back(slot),
            };
            end_slots.push(id);
        }

        let mut chains: BTreeMap<CatchKey, EntryId> = BTreeMap::new();
        for (_, _, key) in &runs {
            if chains.contains_key(key) {
                continue;
            }
            let mut next: Option<EntryId> = None;
            for (catch_type, handler) in key.iter().rev() {
                let entry = MethodItemEntry::Catch(CatchEntry {
                    catch_type: *catch_type,
                    next,
                });
                let id = match markers.get(handler) {
                    Some(&m) => list.insert_before(m, entry),
                    None => list.push_back(entry),
                };
                next = Some(id);
            }
            if let Some(first) = next {
                chains.insert(key.clone(), first);
            }
        }

        for ((start, _, key), end_id) in runs.iter().zip(end_slots) {
            let Some(&catch_start) = chains.get(key) else { continue };
            if let Some(&m) = markers.get(&order[*start]) {
                list.insert_after(
                    m,
                    MethodItemEntry::Try(TryEntry {
                        kind: TryEntryKind::Start,
                        catch_start,
                    }),
                );
            }
            if let Some(slot) = list.get_mut(end_id) {
                *slot = MethodItemEntry::Try(TryEntry {
                    kind: TryEntryKind::End,
                    catch_start,
                });
            }
        }
    }
}
