//! Forward may-analysis of reaching definitions.

use std::collections::{BTreeMap, BTreeSet};

use super::domain::{AbstractDomain, MapOfSetsDomain};
use super::fixpoint::{FixpointAnalyzer, MonotonicFixpointIterator};
use crate::cfg::{BlockId, ControlFlowGraph, InsnPos};
use crate::ir::{IRInstruction, Reg};

/// Register -> instructions whose definition of it may reach this point.
pub type ReachingDefsEnvironment = MapOfSetsDomain<Reg, InsnPos>;

pub fn analyze_instruction(pos: InsnPos, insn: &IRInstruction, env: &mut ReachingDefsEnvironment) {
    if let Some(d) = insn.dest() {
        env.set(d, BTreeSet::from([pos]));
    }
}

struct ReachingDefsTransfer<'a> {
    cfg: &'a ControlFlowGraph,
}

impl FixpointAnalyzer<ControlFlowGraph> for ReachingDefsTransfer<'_> {
    type Domain = ReachingDefsEnvironment;

    fn analyze_node(&self, node: BlockId, state: &mut ReachingDefsEnvironment) {
        if let Some(block) = self.cfg.block(node) {
            for (idx, insn) in block.instructions() {
                analyze_instruction(InsnPos::new(node, idx), insn, state);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReachingDefinitions {
    entry: BTreeMap<BlockId, ReachingDefsEnvironment>,
}

impl ReachingDefinitions {
    pub fn run(cfg: &ControlFlowGraph) -> Self {
        let mut iter = MonotonicFixpointIterator::new(cfg, ReachingDefsTransfer { cfg });
        iter.run(ReachingDefsEnvironment::bottom());
        let entry = cfg
            .block_ids()
            .into_iter()
            .map(|b| (b, iter.entry_state_at(b)))
            .collect();
        Self { entry }
    }

    pub fn entry_state(&self, b: BlockId) -> ReachingDefsEnvironment {
        self.entry.get(&b).cloned().unwrap_or_default()
    }

    /// Environment just before the instruction at `pos`.
    pub fn state_before(&self, cfg: &ControlFlowGraph, pos: InsnPos) -> ReachingDefsEnvironment {
        let mut env = self.entry_state(pos.block);
        if let Some(block) = cfg.block(pos.block) {
            for (idx, insn) in block.instructions().take_while(|(i, _)| *i < pos.index) {
                analyze_instruction(InsnPos::new(pos.block, idx), insn, &mut env);
            }
        }
        env
    }

    /// Definitions of `reg` that may reach the instruction at `pos`.
    pub fn defs_of(&self, cfg: &ControlFlowGraph, pos: InsnPos, reg: Reg) -> BTreeSet<InsnPos> {
        self.state_before(cfg, pos).get(&reg).cloned().unwrap_or_default()
    }
}
