//! Methods that can complete normally.
//!
//! A method returns if a `return` is reachable from its entry when every
//! call to a method that never returns is treated as a throw. The set is
//! grown from empty until it stops changing, so mutually recursive methods
//! that only call each other never make it in.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use tracing::debug;

use crate::cfg::{ControlFlowGraph, EdgeType};
use crate::dex::resolver::opcode_to_search;
use crate::dex::{resolve_method, DexMethod};
use crate::ir::{IRInstruction, IROpcode};
use crate::method_override_graph::{get_overriding_methods, Graph};

/// Answers "can this call come back?" against a returning set.
pub struct ReturnOracle<'a> {
    returning: &'a BTreeSet<DexMethod>,
    /// Methods whose bodies were analyzed; anything else may return.
    analyzed: &'a BTreeSet<DexMethod>,
    graph: &'a Graph,
}

impl<'a> ReturnOracle<'a> {
    pub fn new(returning: &'a BTreeSet<DexMethod>, analyzed: &'a BTreeSet<DexMethod>, graph: &'a Graph) -> Self {
        Self {
            returning,
            analyzed,
            graph,
        }
    }

    /// Whether `insn`, an invoke in `caller`, never returns: it has at
    /// least one concrete target and no concrete target returns.
    pub fn call_never_returns(&self, caller: DexMethod, insn: &IRInstruction) -> bool {
        let op = insn.opcode();
        if !op.is_invoke() {
            return false;
        }
        let Some(mref) = insn.get_method() else {
            return false;
        };
        let Some(callee) = resolve_method(mref, opcode_to_search(op), Some(caller)) else {
            return false;
        };
        let mut targets = vec![callee];
        if matches!(op, IROpcode::InvokeVirtual | IROpcode::InvokeInterface) {
            targets.extend(get_overriding_methods(self.graph, callee, true));
        }
        let mut concrete = targets.into_iter().filter(|t| !t.is_abstract()).peekable();
        concrete.peek().is_some()
            && concrete.all(|t| self.analyzed.contains(&t) && !self.returning.contains(&t))
    }

    pub fn may_return(&self, method: DexMethod, cfg: &ControlFlowGraph) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![cfg.entry_block()];
        while let Some(b) = stack.pop() {
            if !seen.insert(b) {
                continue;
            }
            let Some(block) = cfg.block(b) else { continue };
            let mut falls_through = true;
            for (_, insn) in block.instructions() {
                if insn.opcode().is_return() {
                    return true;
                }
                if self.call_never_returns(method, insn) {
                    falls_through = false;
                    break;
                }
            }
            for edge in cfg.succ_edges(b) {
                if falls_through || edge.kind() == EdgeType::Throw {
                    stack.push(edge.target());
                }
            }
        }
        false
    }
}

fn snapshot(m: DexMethod) -> Option<ControlFlowGraph> {
    let code = m.code()?;
    match code.cfg() {
        Some(cfg) => Some(cfg.clone()),
        None => ControlFlowGraph::build(code.list(), false).ok(),
    }
}

/// The returning subset of `methods`. Methods without a body are not
/// analyzed and are assumed to return.
pub fn compute_returning_methods(methods: &[DexMethod], graph: &Graph) -> BTreeSet<DexMethod> {
    let bodies: BTreeMap<DexMethod, ControlFlowGraph> = methods
        .par_iter()
        .filter_map(|m| snapshot(*m).map(|cfg| (*m, cfg)))
        .collect::<Vec<_>>()
        .into_iter()
        .collect();
    let analyzed: BTreeSet<DexMethod> = bodies.keys().copied().collect();
    let mut returning = BTreeSet::new();
    let mut iterations = 0;
    loop {
        iterations += 1;
        let oracle = ReturnOracle::new(&returning, &analyzed, graph);
        let found: Vec<DexMethod> = bodies
            .iter()
            .filter(|(m, _)| !returning.contains(*m))
            .filter(|(m, cfg)| oracle.may_return(**m, cfg))
            .map(|(m, _)| *m)
            .collect();
        if found.is_empty() {
            break;
        }
        returning.extend(found);
    }
    debug!(
        target: "dexopt::reachability",
        analyzed = analyzed.len(),
        returning = returning.len(),
        iterations,
        "Returning methods"
    );
    returning
}
