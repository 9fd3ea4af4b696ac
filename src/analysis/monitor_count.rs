//! Forward must-analysis of the number of held monitors.
//!
//! Paths that reach a point with different counts join to `Top`, as does a
//! `monitor-exit` with no monitor held.

use std::collections::BTreeMap;

use super::domain::{AbstractDomain, ConstantDomain};
use super::fixpoint::{FixpointAnalyzer, MonotonicFixpointIterator};
use crate::cfg::{BlockId, ControlFlowGraph, InsnPos};
use crate::ir::{IRInstruction, IROpcode};

pub type MonitorCount = ConstantDomain<u32>;

pub fn analyze_instruction(insn: &IRInstruction, count: &mut MonitorCount) {
    let MonitorCount::Value(n) = *count else { return };
    *count = match insn.opcode() {
        IROpcode::MonitorEnter => MonitorCount::Value(n + 1),
        IROpcode::MonitorExit if n == 0 => MonitorCount::Top,
        IROpcode::MonitorExit => MonitorCount::Value(n - 1),
        _ => return,
    };
}

struct MonitorTransfer<'a> {
    cfg: &'a ControlFlowGraph,
}

impl FixpointAnalyzer<ControlFlowGraph> for MonitorTransfer<'_> {
    type Domain = MonitorCount;

    fn analyze_node(&self, node: BlockId, state: &mut MonitorCount) {
        if let Some(block) = self.cfg.block(node) {
            for (_, insn) in block.instructions() {
                analyze_instruction(insn, state);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorCounts {
    entry: BTreeMap<BlockId, MonitorCount>,
    exit: BTreeMap<BlockId, MonitorCount>,
}

impl MonitorCounts {
    pub fn run(cfg: &ControlFlowGraph) -> Self {
        let mut iter = MonotonicFixpointIterator::new(cfg, MonitorTransfer { cfg });
        iter.run(MonitorCount::Value(0));
        let mut entry = BTreeMap::new();
        let mut exit = BTreeMap::new();
        for b in cfg.block_ids() {
            entry.insert(b, iter.entry_state_at(b));
            exit.insert(b, iter.exit_state_at(b));
        }
        Self { entry, exit }
    }

    pub fn entry_count(&self, b: BlockId) -> MonitorCount {
        self.entry.get(&b).copied().unwrap_or(MonitorCount::Bottom)
    }

    pub fn exit_count(&self, b: BlockId) -> MonitorCount {
        self.exit.get(&b).copied().unwrap_or(MonitorCount::Bottom)
    }

    /// Returns reached with monitors held or with an unknown count, and
    /// exits of monitors that are not held.
    pub fn find_mismatches(&self, cfg: &ControlFlowGraph) -> Vec<InsnPos> {
        let mut out = Vec::new();
        for block in cfg.blocks() {
            let mut count = self.entry_count(block.id());
            if count.is_bottom() {
                continue;
            }
            for (idx, insn) in block.instructions() {
                let op = insn.opcode();
                let bad = match (op, count) {
                    (IROpcode::MonitorExit, MonitorCount::Value(0) | MonitorCount::Top) => true,
                    (_, MonitorCount::Value(n)) if op.is_return() => n != 0,
                    (_, MonitorCount::Top) if op.is_return() => true,
                    _ => false,
                };
                if bad {
                    out.push(InsnPos::new(block.id(), idx));
                }
                analyze_instruction(insn, &mut count);
            }
        }
        out
    }
}
