//! Construction of a [`ControlFlowGraph`] from a linear body.
//!
//! Block boundaries fall at every branch target and catch entry, at try
//! region boundaries, and after every instruction that ends control flow.
//! Inside a try region each throwing instruction also ends its block so that
//! the throw edges hang off exactly the instruction that may raise.
//!
//! Once the edges are in place, chains joined by a lone goto edge into a
//! block with no other predecessor are merged when neither side has throw
//! edges. Marker-only boundaries such as a `.try_end` in straight-line code
//! therefore leave no trace in the graph, and rebuilding a linearized graph
//! gives back the same blocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use super::error::{CfgError, CfgResult};
use super::graph::{BlockId, ControlFlowGraph, EdgeId, EdgeType, ThrowInfo};
use crate::ir::{
    BranchTargetKind, DexPosition, EntryId, IRInstruction, IRList, IROpcode, MethodItemEntry,
    TryEntryKind,
};

struct ProtoBlock {
    entries: Vec<MethodItemEntry>,
    /// First catch entry of the enclosing try region.
    try_catch: Option<EntryId>,
    last_insn: Option<EntryId>,
}

impl ProtoBlock {
    fn new(try_catch: Option<EntryId>) -> Self {
        Self {
            entries: Vec::new(),
            try_catch,
            last_insn: None,
        }
    }

    fn has_insns(&self) -> bool {
        self.last_insn.is_some()
    }
}

#[derive(Default)]
struct Partition {
    blocks: Vec<ProtoBlock>,
    /// Branch instruction id -> (target kind, block index).
    branch_targets: BTreeMap<EntryId, Vec<(BranchTargetKind, usize)>>,
    /// Catch entry id -> handler block index.
    catch_blocks: BTreeMap<EntryId, usize>,
}

struct Partitioner {
    part: Partition,
    cur: ProtoBlock,
    active_try: Option<EntryId>,
    split_pending: bool,
}

impl Partitioner {
    fn new() -> Self {
        Self {
            part: Partition::default(),
            cur: ProtoBlock::new(None),
            active_try: None,
            split_pending: false,
        }
    }

    /// Index the current block will receive.
    fn cur_index(&self) -> usize {
        self.part.blocks.len()
    }

    /// Close the current block if it holds anything; an empty one is reused.
    fn start_block(&mut self) {
        if self.cur.entries.is_empty() {
            self.cur.try_catch = self.active_try;
        } else {
            let done = std::mem::replace(&mut self.cur, ProtoBlock::new(self.active_try));
            self.part.blocks.push(done);
        }
        self.split_pending = false;
    }

    fn push(&mut self, id: EntryId, entry: &MethodItemEntry) {
        if self.split_pending {
            self.start_block();
        }
        if entry.is_insn() {
            self.cur.last_insn = Some(id);
        }
        self.cur.entries.push(entry.clone());
    }

    fn finish(mut self) -> Partition {
        if !self.cur.entries.is_empty() || self.part.blocks.is_empty() {
            self.part.blocks.push(self.cur);
        }
        self.part
    }
}

fn partition(list: &IRList) -> CfgResult<Partition> {
    let mut p = Partitioner::new();
    let mut prev_op: Option<IROpcode> = None;
    let mut in_params = true;

    for (id, entry) in list.iter() {
        match entry {
            MethodItemEntry::Target(t) => {
                p.start_block();
                let idx = p.cur_index();
                p.part.branch_targets.entry(t.src).or_default().push((t.kind, idx));
                prev_op = None;
            }
            MethodItemEntry::Catch(_) => {
                p.start_block();
                let idx = p.cur_index();
                p.part.catch_blocks.insert(id, idx);
                prev_op = None;
            }
            MethodItemEntry::Try(t) => {
                match t.kind {
                    TryEntryKind::Start => {
                        if p.active_try.is_some() {
                            return Err(CfgError::NestedTry);
                        }
                        p.active_try = Some(t.catch_start);
                    }
                    TryEntryKind::End => {
                        if p.active_try != Some(t.catch_start) {
                            return Err(CfgError::UnbalancedTry);
                        }
                        p.active_try = None;
                    }
                }
                p.split_pending = true;
            }
            MethodItemEntry::Opcode(insn) => {
                let op = insn.opcode();
                check_ordering(insn, prev_op, &mut in_params)?;
                p.push(id, entry);
                if op.is_branch() || op.is_return() || op.is_throw() {
                    p.split_pending = true;
                } else if op.may_throw() && p.active_try.is_some() {
                    p.split_pending = true;
                }
                prev_op = Some(op);
            }
            MethodItemEntry::DexOpcode(_) => return Err(CfgError::UnexpectedEntry("dex-opcode")),
            MethodItemEntry::Position(_)
            | MethodItemEntry::Debug(_)
            | MethodItemEntry::SourceBlock(_) => p.push(id, entry),
            MethodItemEntry::Fallthrough => {}
        }
    }
    if p.active_try.is_some() {
        return Err(CfgError::UnbalancedTry);
    }
    if prev_op.is_some_and(|op| op.has_move_result_pseudo()) {
        return Err(CfgError::MisplacedMoveResult("missing move-result-pseudo at end".into()));
    }
    Ok(p.finish())
}

fn check_ordering(
    insn: &IRInstruction,
    prev_op: Option<IROpcode>,
    in_params: &mut bool,
) -> CfgResult<()> {
    let op = insn.opcode();
    if op.is_load_param() {
        if !*in_params {
            return Err(CfgError::NonContiguousLoadParams(insn.to_string()));
        }
    } else {
        *in_params = false;
    }
    let after_pseudo_producer = prev_op.is_some_and(|p| p.has_move_result_pseudo());
    if op.is_move_result_pseudo() != after_pseudo_producer {
        return Err(CfgError::MisplacedMoveResult(insn.to_string()));
    }
    if op.is_move_result() && !prev_op.is_some_and(|p| p.has_move_result()) {
        return Err(CfgError::MisplacedMoveResult(insn.to_string()));
    }
    Ok(())
}

impl ControlFlowGraph {
    /// Build the graph for `list`. An editable graph takes over the body:
    /// unreachable blocks are dropped and every block starts with the
    /// source position in effect at its first instruction.
    pub fn build(list: &IRList, editable: bool) -> CfgResult<Self> {
        let part = partition(list)?;
        let mut cfg = ControlFlowGraph::empty(editable);
        let n = part.blocks.len();
        let mut try_catches = Vec::with_capacity(n);
        let mut last_insns = Vec::with_capacity(n);
        for proto in part.blocks {
            try_catches.push(proto.try_catch);
            last_insns.push((proto.last_insn, proto.has_insns()));
            cfg.new_block(proto.entries);
        }
        cfg.entry = BlockId(0);

        for i in 0..n {
            let b = BlockId(i as u32);
            let (last_id, has_insns) = last_insns[i];
            let last = cfg
                .block(b)
                .and_then(|blk| blk.last_insn().map(|(idx, insn)| (idx, insn.clone())));
            let next = (i + 1 < n).then(|| BlockId(i as u32 + 1));

            let falls_through = match (&last, last_id) {
                (Some((idx, insn)), Some(insn_id)) => {
                    let op = insn.opcode();
                    let targets = part.branch_targets.get(&insn_id);
                    if op.is_goto() {
                        let target = single_target(targets, insn)?;
                        if let Some(blk) = cfg.block_mut(b) {
                            blk.entries.remove(*idx);
                        }
                        cfg.add_edge(b, target, EdgeType::Goto, None, None);
                        false
                    } else if op.is_conditional_branch() {
                        let target = single_target(targets, insn)?;
                        cfg.add_edge(b, target, EdgeType::Branch, None, None);
                        true
                    } else if op.is_switch() {
                        for (kind, idx) in targets.into_iter().flatten() {
                            let key = match kind {
                                BranchTargetKind::Multi(k) => Some(*k),
                                BranchTargetKind::Simple => None,
                            };
                            cfg.add_edge(b, BlockId(*idx as u32), EdgeType::Branch, key, None);
                        }
                        true
                    } else {
                        !(op.is_return() || op.is_throw())
                    }
                }
                _ => true,
            };

            if falls_through {
                match next {
                    Some(next) => {
                        cfg.add_edge(b, next, EdgeType::Goto, None, None);
                    }
                    None if has_insns => {
                        let insn = last.map(|(_, i)| i.to_string()).unwrap_or_default();
                        return Err(CfgError::FallsOffEnd(insn));
                    }
                    None => {}
                }
            }

            if let Some(catch_start) = try_catches[i] {
                if cfg.block(b).is_some_and(|blk| blk.may_throw()) {
                    add_throw_edges(&mut cfg, list, &part.catch_blocks, b, catch_start)?;
                }
            }
        }

        let merged = cfg.merge_straight_chains();

        if editable {
            inherit_positions(&mut cfg);
            let removed = cfg.remove_unreachable_blocks()?;
            trace!(
                target: "dexopt::cfg",
                blocks = cfg.num_blocks(),
                removed,
                merged,
                "Built editable CFG"
            );
        }
        Ok(cfg)
    }
}

impl ControlFlowGraph {
    /// The goto successor `b` can absorb, if any.
    fn mergeable_successor(&self, b: BlockId) -> Option<BlockId> {
        let block = self.block(b)?;
        let [edge_id] = block.succs() else {
            return None;
        };
        let edge = self.edge(*edge_id)?;
        if edge.kind != EdgeType::Goto {
            return None;
        }
        let s = edge.target;
        if s == b || s == self.entry {
            return None;
        }
        if block.last_insn().is_some_and(|(_, insn)| insn.opcode().is_branch()) {
            return None;
        }
        let succ = self.block(s)?;
        if succ.preds() != [*edge_id].as_slice() || !self.throw_edges(s).is_empty() {
            return None;
        }
        Some(s)
    }

    /// Fold every single-entry goto successor into its predecessor.
    /// Returns the number of blocks absorbed.
    fn merge_straight_chains(&mut self) -> usize {
        let mut merged = 0;
        for b in self.block_ids() {
            if self.block(b).is_none() {
                continue;
            }
            while let Some(s) = self.mergeable_successor(b) {
                let link: Vec<EdgeId> = self.block(b).map(|blk| blk.succs().to_vec()).unwrap_or_default();
                for e in link {
                    self.remove_edge(e);
                }
                let (entries, succs) = match self.block_mut(s) {
                    Some(blk) => (std::mem::take(&mut blk.entries), blk.succs.clone()),
                    None => break,
                };
                for e in succs {
                    self.set_edge_src(e, b);
                }
                if let Some(blk) = self.block_mut(b) {
                    blk.entries.extend(entries);
                }
                self.remove_block(s);
                merged += 1;
            }
        }
        merged
    }
}

fn single_target(
    targets: Option<&Vec<(BranchTargetKind, usize)>>,
    insn: &IRInstruction,
) -> CfgResult<BlockId> {
    match targets.map(|t| t.as_slice()) {
        Some([(BranchTargetKind::Simple, idx)]) => Ok(BlockId(*idx as u32)),
        _ => Err(CfgError::MissingTarget(insn.to_string())),
    }
}

fn add_throw_edges(
    cfg: &mut ControlFlowGraph,
    list: &IRList,
    catch_blocks: &BTreeMap<EntryId, usize>,
    b: BlockId,
    catch_start: EntryId,
) -> CfgResult<()> {
    let mut cur = Some(catch_start);
    let mut index = 0u32;
    while let Some(id) = cur {
        let Some(MethodItemEntry::Catch(c)) = list.get(id) else {
            return Err(CfgError::BadCatchChain);
        };
        let handler = catch_blocks.get(&id).ok_or(CfgError::BadCatchChain)?;
        let info = ThrowInfo {
            catch_type: c.catch_type,
            index,
        };
        cfg.add_edge(b, BlockId(*handler as u32), EdgeType::Throw, None, Some(info));
        index += 1;
        if index as usize > catch_blocks.len() {
            return Err(CfgError::BadCatchChain);
        }
        cur = c.next;
    }
    Ok(())
}

/// Give every block that lacks a leading position the position in effect
/// at the end of its textual predecessor.
fn inherit_positions(cfg: &mut ControlFlowGraph) {
    let mut current: Option<Arc<DexPosition>> = None;
    for block in cfg.blocks.values_mut() {
        let leading = block
            .entries
            .iter()
            .take_while(|e| !e.is_insn())
            .any(|e| matches!(e, MethodItemEntry::Position(_)));
        if !leading && block.has_insns() {
            if let Some(pos) = &current {
                block.entries.insert(0, MethodItemEntry::Position(Arc::clone(pos)));
            }
        }
        for entry in &block.entries {
            if let MethodItemEntry::Position(p) = entry {
                current = Some(Arc::clone(p));
            }
        }
    }
}
