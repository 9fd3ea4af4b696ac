//! In-place edits of an editable graph.
//!
//! Every edit keeps the block invariants the builder establishes: a
//! `move-result-pseudo*` stays glued to its producer, and inside a try
//! region a throwing instruction is the last instruction of its block.

use std::collections::BTreeSet;

use tracing::trace;

use super::error::{CfgError, CfgResult};
use super::graph::{BlockId, ControlFlowGraph, EdgeType, InsnPos, ThrowInfo};
use crate::dex::DexType;
use crate::ir::{IRInstruction, IROpcode, MethodItemEntry, Reg};

impl ControlFlowGraph {
    fn require_editable(&self) -> CfgResult<()> {
        if self.editable {
            Ok(())
        } else {
            Err(CfgError::NotEditable)
        }
    }

    fn insn_at(&self, pos: InsnPos) -> CfgResult<&IRInstruction> {
        self.insn(pos).ok_or(CfgError::NoSuchInsn)
    }

    /// Split `pos.block` after entry `pos.index`. The tail moves to a new
    /// block that inherits all successors; the head falls through to it.
    pub fn split_block(&mut self, pos: InsnPos) -> CfgResult<BlockId> {
        self.require_editable()?;
        let block = self.block_mut(pos.block).ok_or(CfgError::NoSuchInsn)?;
        if pos.index >= block.entries.len() {
            return Err(CfgError::NoSuchInsn);
        }
        let tail = block.entries.split_off(pos.index + 1);
        let succs = block.succs.clone();
        let new_block = self.new_block(tail);
        for e in succs {
            self.set_edge_src(e, new_block);
        }
        self.add_edge(pos.block, new_block, EdgeType::Goto, None, None);
        let catches = self.catch_list(new_block);
        self.fix_throw_edges(pos.block, &catches);
        self.fix_throw_edges(new_block, &catches);
        Ok(new_block)
    }

    /// Split so that the instruction at `pos` starts a block; returns that
    /// block.
    pub fn split_block_before(&mut self, pos: InsnPos) -> CfgResult<BlockId> {
        self.require_editable()?;
        if self.insn_at(pos)?.opcode().is_move_result_any() {
            return Err(CfgError::InvalidEdit("cannot split before a move-result".into()));
        }
        if pos.index == 0 {
            return Ok(pos.block);
        }
        self.split_block(InsnPos::new(pos.block, pos.index - 1))
    }

    /// Make the throw edges of `b` match `catches` when it may throw, and
    /// drop them otherwise.
    fn fix_throw_edges(&mut self, b: BlockId, catches: &[(Option<DexType>, BlockId)]) {
        let throws = self.block(b).is_some_and(|blk| blk.may_throw());
        let existing: Vec<_> = self
            .get_succ_edges_of_type(b, EdgeType::Throw)
            .iter()
            .map(|e| e.id)
            .collect();
        let current = self.catch_list(b);
        if throws && current == catches {
            return;
        }
        for e in existing {
            self.remove_edge(e);
        }
        if throws {
            for (index, (catch_type, handler)) in catches.iter().enumerate() {
                let info = ThrowInfo {
                    catch_type: *catch_type,
                    index: index as u32,
                };
                self.add_edge(b, *handler, EdgeType::Throw, None, Some(info));
            }
        }
    }

    /// Split `b` after every throwing instruction that is not already last,
    /// when `b` lies in a try region.
    fn split_after_throwers(&mut self, b: BlockId) -> CfgResult<()> {
        let mut cur = b;
        loop {
            if self.catch_list(cur).is_empty() {
                return Ok(());
            }
            let Some(block) = self.block(cur) else { return Ok(()) };
            let last = block.last_insn().map(|(i, _)| i);
            let split_at = block
                .instructions()
                .find(|(i, insn)| insn.may_throw() && Some(*i) != last)
                .map(|(i, _)| i);
            match split_at {
                Some(i) => cur = self.split_block(InsnPos::new(cur, i))?,
                None => return Ok(()),
            }
        }
    }

    fn check_insertable(insns: &[IRInstruction]) -> CfgResult<()> {
        for insn in insns {
            let op = insn.opcode();
            if op.is_branch() || op.is_return() || op.is_throw() {
                return Err(CfgError::InvalidEdit(format!("cannot insert {}", insn)));
            }
        }
        Ok(())
    }

    fn insert_at(&mut self, b: BlockId, index: usize, insns: Vec<IRInstruction>) -> CfgResult<()> {
        let catches = self.catch_list(b);
        let block = self.block_mut(b).ok_or(CfgError::NoSuchInsn)?;
        let index = index.min(block.entries.len());
        block.entries.splice(index..index, insns.into_iter().map(MethodItemEntry::Opcode));
        if !catches.is_empty() {
            self.split_after_throwers(b)?;
        }
        Ok(())
    }

    /// Insert `insns` in front of the instruction at `pos`.
    pub fn insert_before(&mut self, pos: InsnPos, insns: Vec<IRInstruction>) -> CfgResult<()> {
        self.require_editable()?;
        Self::check_insertable(&insns)?;
        if self.insn_at(pos)?.opcode().is_move_result_any() {
            return Err(CfgError::InvalidEdit("cannot insert before a move-result".into()));
        }
        self.insert_at(pos.block, pos.index, insns)
    }

    /// Insert `insns` after the instruction at `pos`, or after its
    /// `move-result-pseudo*` when it has one. After a throwing instruction
    /// that ends its block, the instructions go into a new block on the
    /// fallthrough edge.
    pub fn insert_after(&mut self, pos: InsnPos, insns: Vec<IRInstruction>) -> CfgResult<()> {
        self.require_editable()?;
        Self::check_insertable(&insns)?;
        let mut anchor = pos;
        if self.insn_at(pos)?.has_move_result_pseudo() {
            anchor = self.move_result_of(pos).ok_or_else(|| {
                CfgError::InvalidEdit("producer without its move-result-pseudo".into())
            })?;
        }
        let anchor_insn = self.insn_at(anchor)?;
        if anchor_insn.opcode().is_branch() || anchor_insn.opcode().is_return() || anchor_insn.opcode().is_throw() {
            return Err(CfgError::InvalidEdit(format!("cannot insert after {}", anchor_insn)));
        }
        let is_last = self
            .block(anchor.block)
            .and_then(|b| b.last_insn())
            .is_some_and(|(i, _)| i == anchor.index);
        let ends_with_throw_edges =
            is_last && !self.get_succ_edges_of_type(anchor.block, EdgeType::Throw).is_empty();
        if !ends_with_throw_edges {
            return self.insert_at(anchor.block, anchor.index + 1, insns);
        }

        let goto = self
            .get_succ_edge_of_type(anchor.block, EdgeType::Goto)
            .map(|e| e.id)
            .ok_or_else(|| CfgError::InvalidEdit("throwing block without fallthrough".into()))?;
        let catches = self.catch_list(anchor.block);
        let new_block = self.new_block(Vec::new());
        let old_target = self.edge(goto).map(|e| e.target).ok_or(CfgError::NoSuchInsn)?;
        self.set_edge_target(goto, new_block);
        self.add_edge(new_block, old_target, EdgeType::Goto, None, None);
        if let Some(block) = self.block_mut(new_block) {
            block.entries.extend(insns.into_iter().map(MethodItemEntry::Opcode));
        }
        self.fix_throw_edges(new_block, &catches);
        self.split_after_throwers(new_block)
    }

    /// Position of the `move-result*` belonging to the producer at `pos`.
    pub fn move_result_of(&self, pos: InsnPos) -> Option<InsnPos> {
        let block = self.block(pos.block)?;
        let next_in_block = block
            .instructions()
            .find(|(i, _)| *i > pos.index)
            .map(|(i, insn)| (InsnPos::new(pos.block, i), insn));
        let candidate = match next_in_block {
            Some(found) => Some(found),
            None => {
                let succ = self.get_succ_edge_of_type(pos.block, EdgeType::Goto)?.target;
                self.block(succ)?
                    .first_insn()
                    .map(|(i, insn)| (InsnPos::new(succ, i), insn))
            }
        };
        candidate
            .filter(|(_, insn)| insn.opcode().is_move_result_any())
            .map(|(p, _)| p)
    }

    /// Remove the instruction at `pos`, together with its
    /// `move-result-pseudo*`. A removed `if`/`switch` leaves only its
    /// fallthrough edge.
    pub fn remove_insn(&mut self, pos: InsnPos) -> CfgResult<()> {
        self.require_editable()?;
        let insn = self.insn_at(pos)?;
        let op = insn.opcode();
        if op.is_move_result_pseudo() {
            return Err(CfgError::InvalidEdit("remove the producer instead".into()));
        }
        if op.is_return() || op.is_throw() {
            return Err(CfgError::InvalidEdit(format!("cannot remove {}", insn)));
        }
        let pseudo = if insn.has_move_result_pseudo() {
            self.move_result_of(pos)
        } else {
            None
        };
        if op.is_conditional_branch() || op.is_switch() {
            let branches: Vec<_> = self
                .get_succ_edges_of_type(pos.block, EdgeType::Branch)
                .iter()
                .map(|e| e.id)
                .collect();
            for e in branches {
                self.remove_edge(e);
            }
        }
        // Remove the pseudo first: it may sit later in the same block.
        if let Some(p) = pseudo {
            self.remove_entry(p)?;
        }
        let catches = self.catch_list(pos.block);
        self.remove_entry(pos)?;
        self.fix_throw_edges(pos.block, &catches);
        Ok(())
    }

    fn remove_entry(&mut self, pos: InsnPos) -> CfgResult<()> {
        let block = self.block_mut(pos.block).ok_or(CfgError::NoSuchInsn)?;
        if pos.index >= block.entries.len() {
            return Err(CfgError::NoSuchInsn);
        }
        block.entries.remove(pos.index);
        Ok(())
    }

    /// Replace the instruction at `pos` (and its `move-result-pseudo*`)
    /// with `insns`.
    pub fn replace_insns(&mut self, pos: InsnPos, insns: Vec<IRInstruction>) -> CfgResult<()> {
        self.require_editable()?;
        Self::check_insertable(&insns)?;
        let catches = self.catch_list(pos.block);
        self.remove_insn(pos)?;
        let block = self.block_mut(pos.block).ok_or(CfgError::NoSuchInsn)?;
        let index = pos.index.min(block.entries.len());
        block
            .entries
            .splice(index..index, insns.into_iter().map(MethodItemEntry::Opcode));
        self.fix_throw_edges(pos.block, &catches);
        self.split_after_throwers(pos.block)
    }

    /// Replace the instruction at `pos` and everything after it in its
    /// block with `const tmp 0; throw tmp`. Successor edges other than the
    /// handlers are dropped; blocks left unreachable are not removed.
    pub fn insert_throw_null(&mut self, pos: InsnPos, tmp: Reg) -> CfgResult<()> {
        self.require_editable()?;
        if self.insn_at(pos)?.opcode().is_move_result_any() {
            return Err(CfgError::InvalidEdit("cannot truncate at a move-result".into()));
        }
        let catches = self.catch_list(pos.block);
        let succs: Vec<_> = self.succ_edges(pos.block).iter().map(|e| e.id).collect();
        for e in succs {
            self.remove_edge(e);
        }
        let block = self.block_mut(pos.block).ok_or(CfgError::NoSuchInsn)?;
        block.entries.truncate(pos.index);
        block.entries.push(MethodItemEntry::Opcode(
            IRInstruction::new(IROpcode::Const).with_dest(tmp).with_literal(0),
        ));
        block
            .entries
            .push(MethodItemEntry::Opcode(IRInstruction::new(IROpcode::Throw).with_src(tmp)));
        self.fix_throw_edges(pos.block, &catches);
        trace!(target: "dexopt::cfg", block = %pos.block, "Inserted throw null");
        Ok(())
    }

    /// Make the instruction at `pos` (with its `move-result*`, if any) the
    /// last one executed on its normal path: whatever follows it in its
    /// block is replaced by `const tmp 0; throw tmp`. When it already ends
    /// its block, the throw goes into a new block on the fallthrough edge.
    pub fn insert_throw_null_after(&mut self, pos: InsnPos, tmp: Reg) -> CfgResult<()> {
        self.require_editable()?;
        let anchor = self.move_result_of(pos).unwrap_or(pos);
        let anchor_insn = self.insn_at(anchor)?;
        if anchor_insn.opcode().is_branch() || anchor_insn.opcode().is_return() || anchor_insn.opcode().is_throw() {
            return Err(CfgError::InvalidEdit(format!("cannot throw after {}", anchor_insn)));
        }
        let next = self
            .block(anchor.block)
            .and_then(|b| b.instructions().find(|(i, _)| *i > anchor.index).map(|(i, _)| i));
        if let Some(next) = next {
            return self.insert_throw_null(InsnPos::new(anchor.block, next), tmp);
        }

        let catches = self.catch_list(anchor.block);
        let new_block = self.new_block(vec![
            MethodItemEntry::Opcode(IRInstruction::new(IROpcode::Const).with_dest(tmp).with_literal(0)),
            MethodItemEntry::Opcode(IRInstruction::new(IROpcode::Throw).with_src(tmp)),
        ]);
        match self.get_succ_edge_of_type(anchor.block, EdgeType::Goto).map(|e| e.id) {
            Some(goto) => self.set_edge_target(goto, new_block),
            None => {
                self.add_edge(anchor.block, new_block, EdgeType::Goto, None, None);
            }
        }
        self.fix_throw_edges(new_block, &catches);
        trace!(target: "dexopt::cfg", block = %new_block, "Inserted throw null");
        Ok(())
    }

    /// Drop every block not reachable from the entry. Returns how many
    /// were removed.
    pub fn remove_unreachable_blocks(&mut self) -> CfgResult<usize> {
        self.require_editable()?;
        let reachable = self.reachable_blocks();
        let dead: Vec<BlockId> = self
            .blocks
            .keys()
            .filter(|b| !reachable.contains(b))
            .copied()
            .collect();
        for b in &dead {
            self.remove_block(*b);
        }
        Ok(dead.len())
    }

    /// Compute the exit block: the single block without successors, or a
    /// ghost block joined to every such block by ghost edges. Returns
    /// `None` when no block exits (the method never returns).
    pub fn calculate_exit_block(&mut self) -> Option<BlockId> {
        if self.ghost_exit {
            if let Some(ghost) = self.exit {
                self.remove_block(ghost);
            }
        }
        self.exit = None;
        self.ghost_exit = false;
        let exits: Vec<BlockId> = self
            .blocks
            .values()
            .filter(|b| b.succs.is_empty())
            .map(|b| b.id)
            .collect();
        match exits.as_slice() {
            [] => None,
            [single] => {
                self.exit = Some(*single);
                self.exit
            }
            many => {
                let many = many.to_vec();
                let ghost = self.new_block(Vec::new());
                for b in many {
                    self.add_edge(b, ghost, EdgeType::Ghost, None, None);
                }
                self.exit = Some(ghost);
                self.ghost_exit = true;
                self.exit
            }
        }
    }

    /// Blocks holding a return or an uncaught throw.
    pub fn real_exit_blocks(&self) -> BTreeSet<BlockId> {
        self.blocks
            .values()
            .filter(|b| {
                b.last_insn()
                    .is_some_and(|(_, i)| i.opcode().is_return() || i.opcode().is_throw())
            })
            .map(|b| b.id)
            .collect()
    }
}
