//! Backward liveness over registers.
//!
//! Registers are treated symbolically: a wide value lives in one register
//! number, its implicit pair is not tracked. This is the view the register
//! allocator needs before it has assigned anything.

use std::collections::BTreeMap;

use super::domain::{AbstractDomain, RegisterSetDomain};
use super::fixpoint::{BackwardNode, Backwards, FixpointAnalyzer, MonotonicFixpointIterator};
use crate::cfg::{BlockId, ControlFlowGraph};
use crate::ir::IRInstruction;

pub type LivenessDomain = RegisterSetDomain;

/// Step `live` backward over one instruction: kill the def, gen the uses.
pub fn analyze_instruction(insn: &IRInstruction, live: &mut LivenessDomain) {
    if let Some(d) = insn.dest() {
        live.remove(d);
    }
    for &s in insn.srcs() {
        live.insert(s);
    }
}

struct LivenessTransfer<'a> {
    cfg: &'a ControlFlowGraph,
}

impl<'a> FixpointAnalyzer<Backwards<'a>> for LivenessTransfer<'a> {
    type Domain = LivenessDomain;

    fn analyze_node(&self, node: BackwardNode, state: &mut LivenessDomain) {
        let BackwardNode::Block(b) = node else { return };
        if let Some(block) = self.cfg.block(b) {
            for (_, insn) in block.instructions().rev() {
                analyze_instruction(insn, state);
            }
        }
    }
}

/// Live-in and live-out sets of every reachable block.
#[derive(Debug, Clone)]
pub struct Liveness {
    live_in: BTreeMap<BlockId, LivenessDomain>,
    live_out: BTreeMap<BlockId, LivenessDomain>,
}

impl Liveness {
    pub fn run(cfg: &ControlFlowGraph) -> Self {
        let graph = Backwards::new(cfg);
        let mut iter = MonotonicFixpointIterator::new(&graph, LivenessTransfer { cfg });
        iter.run(LivenessDomain::bottom());
        let mut live_in = BTreeMap::new();
        let mut live_out = BTreeMap::new();
        for b in cfg.block_ids() {
            // Backward entry is the block's live-out, backward exit its live-in.
            live_out.insert(b, iter.entry_state_at(BackwardNode::Block(b)));
            live_in.insert(b, iter.exit_state_at(BackwardNode::Block(b)));
        }
        Self { live_in, live_out }
    }

    pub fn live_in(&self, b: BlockId) -> LivenessDomain {
        self.live_in.get(&b).cloned().unwrap_or_default()
    }

    pub fn live_out(&self, b: BlockId) -> LivenessDomain {
        self.live_out.get(&b).cloned().unwrap_or_default()
    }

    /// Live-out set after each instruction of `b`, keyed by entry index.
    pub fn live_out_per_insn(&self, cfg: &ControlFlowGraph, b: BlockId) -> Vec<(usize, LivenessDomain)> {
        let mut live = self.live_out(b);
        let mut out = Vec::new();
        if let Some(block) = cfg.block(b) {
            for (idx, insn) in block.instructions().rev() {
                out.push((idx, live.clone()));
                analyze_instruction(insn, &mut live);
            }
        }
        out.reverse();
        out
    }
}
