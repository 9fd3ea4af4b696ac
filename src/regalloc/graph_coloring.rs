//! Chaitin-Briggs coloring with optimistic select.
//!
//! Each round builds the interference graph, coalesces copies, then
//! simplifies: unconstrained nodes first, then constrained nodes that pass
//! the colorability test, picking a spill candidate whenever none does.
//! Select pops the stack and gives each node the lowest free color within
//! its cap, trying the colors of its preferred partners first. Nodes that
//! find no color have their constrained occurrences split off and the
//! round starts over.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use super::constraints::MAX_REG;
use super::error::{AllocError, AllocResult};
use super::finalize::Assignment;
use super::interference::InterferenceGraph;
use super::spill::split_live_ranges;
use super::{AllocConfig, AllocStats};
use crate::analysis::{BitSet, Liveness};
use crate::cfg::ControlFlowGraph;
use crate::ir::code::frame_size_of;
use crate::ir::Reg;

/// Colors of the graph's nodes, or the nodes that found none.
pub fn color(graph: &InterferenceGraph) -> Result<BTreeMap<Reg, Reg>, BTreeSet<Reg>> {
    let stack = simplify(graph);
    select(graph, &stack)
}

fn simplify(graph: &InterferenceGraph) -> Vec<Reg> {
    let mut removed = BTreeSet::new();
    let mut stack = Vec::with_capacity(graph.len());
    for (reg, node) in graph.nodes() {
        if !node.is_constrained() {
            stack.push(reg);
            removed.insert(reg);
        }
    }
    let mut remaining: BTreeSet<Reg> = graph
        .nodes()
        .filter(|(_, n)| n.is_constrained())
        .map(|(r, _)| r)
        .collect();
    while !remaining.is_empty() {
        let mut progress = false;
        let candidates: Vec<Reg> = remaining.iter().copied().collect();
        for reg in candidates {
            if graph.is_colorable(reg, &removed) {
                stack.push(reg);
                removed.insert(reg);
                remaining.remove(&reg);
                progress = true;
            }
        }
        if progress {
            continue;
        }
        if let Some(reg) = spill_candidate(graph, &remaining, &removed) {
            trace!(target: "dexopt::regalloc", reg, "Potential spill");
            stack.push(reg);
            removed.insert(reg);
            remaining.remove(&reg);
        }
    }
    stack
}

/// The remaining node cheapest to spill per unit of degree. Spill
/// temporaries are only chosen when nothing else is left. Between equal
/// ratios the node containing more live ranges goes first.
fn spill_candidate(
    graph: &InterferenceGraph,
    remaining: &BTreeSet<Reg>,
    removed: &BTreeSet<Reg>,
) -> Option<Reg> {
    let degree = |reg: Reg| -> u64 {
        graph
            .node(reg)
            .map(|n| n.adj.iter().filter(|r| !removed.contains(r)).count() as u64)
            .unwrap_or(0)
    };
    remaining.iter().copied().min_by(|&a, &b| {
        let (Some(na), Some(nb)) = (graph.node(a), graph.node(b)) else {
            return a.cmp(&b);
        };
        // cost(a) / (deg(a) + 1) against cost(b) / (deg(b) + 1).
        let lhs = u64::from(na.spill_cost) * (degree(b) + 1);
        let rhs = u64::from(nb.spill_cost) * (degree(a) + 1);
        na.is_spill
            .cmp(&nb.is_spill)
            .then(lhs.cmp(&rhs))
            .then(nb.contains.len().cmp(&na.contains.len()))
            .then(a.cmp(&b))
    })
}

fn fits(occupied: &BitSet, color: u32, width: u8) -> bool {
    (0..u32::from(width)).all(|i| !occupied.contains((color + i) as usize))
}

/// Whether `color` either equals or stays clear of every colored neighbor
/// across a coalesceable edge.
fn fits_soft(soft: &[(Reg, u8)], color: u32, width: u8) -> bool {
    soft.iter().all(|&(c, w)| {
        (c == color && w == width) || color + u32::from(width) <= c || c + u32::from(w) <= color
    })
}

fn select(graph: &InterferenceGraph, stack: &[Reg]) -> Result<BTreeMap<Reg, Reg>, BTreeSet<Reg>> {
    let mut colors: BTreeMap<Reg, Reg> = BTreeMap::new();
    let mut failed = BTreeSet::new();
    for &reg in stack.iter().rev() {
        let Some(node) = graph.node(reg) else { continue };
        let mut occupied = BitSet::new();
        let mut soft = Vec::new();
        for n in &node.adj {
            if let (Some(&c), Some(nn)) = (colors.get(n), graph.node(*n)) {
                if node.soft.contains(n) {
                    soft.push((c, nn.width));
                    continue;
                }
                for i in 0..u32::from(nn.width) {
                    occupied.insert((c + i) as usize);
                }
            }
        }
        let ok = |c: u32| fits(&occupied, c, node.width) && fits_soft(&soft, c, node.width);
        let max = node.max_vreg.min(MAX_REG + 1 - u32::from(node.width));
        let preferred = node
            .prefs
            .iter()
            .filter_map(|p| colors.get(&graph.find(*p)).copied())
            .find(|&c| c <= max && ok(c));
        let chosen = preferred.or_else(|| (0..=max).find(|&c| ok(c)));
        match chosen {
            Some(c) => {
                colors.insert(reg, c);
            }
            None => {
                failed.insert(reg);
            }
        }
    }
    if failed.is_empty() {
        Ok(colors)
    } else {
        Err(failed)
    }
}

/// Color `cfg`, splitting live ranges until every node gets a color.
pub(crate) fn allocate(
    method: &str,
    cfg: &mut ControlFlowGraph,
    config: &AllocConfig,
    stats: &mut AllocStats,
) -> AllocResult<Assignment> {
    let mut spill_temps = BTreeSet::new();
    let mut next_reg = frame_size_of(cfg.instructions().map(|(_, insn)| insn));
    let mut round = 0;
    loop {
        let liveness = Liveness::run(cfg);
        let mut graph = InterferenceGraph::build(method, cfg, &liveness, &spill_temps)?;
        stats.coalesced += graph.coalesce();
        match color(&graph) {
            Ok(colors) => {
                debug!(
                    target: "dexopt::regalloc",
                    method,
                    rounds = round + 1,
                    nodes = graph.len(),
                    "Colored"
                );
                return Ok(Assignment::from_graph(&graph, &colors));
            }
            Err(failed) => {
                round += 1;
                if round > config.max_spill_rounds {
                    return Err(AllocError::SpillLimit {
                        method: method.to_string(),
                        rounds: config.max_spill_rounds,
                    });
                }
                let regs: BTreeSet<Reg> = failed
                    .iter()
                    .filter_map(|r| graph.node(*r))
                    .flat_map(|n| n.members.iter().copied())
                    .collect();
                debug!(
                    target: "dexopt::regalloc",
                    method,
                    round,
                    spilled = regs.len(),
                    "Spilling"
                );
                let inserted = split_live_ranges(
                    method,
                    cfg,
                    &regs,
                    graph.reg_infos(),
                    &mut next_reg,
                    &mut spill_temps,
                )?;
                stats.spill_rounds += 1;
                stats.spilled += regs.len();
                stats.moves_inserted += inserted;
            }
        }
    }
}
