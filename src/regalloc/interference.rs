//! Interference graph.
//!
//! One node per symbolic register. Two nodes interfere when one is defined
//! while the other is live, with two adjustments:
//!
//! - a move's destination does not interfere with its source;
//! - the result of `check-cast` also interferes with everything live into
//!   the check-cast, because finalization may copy the operand into the
//!   result register in front of it.
//!
//! A wide destination has a coalesceable edge to each of its wide sources
//! even when the source dies at the instruction. Select may give both ends
//! the same pair, which keeps `/2addr` forms available, but never pairs that
//! overlap in one slot. Coalescing may merge across such an edge.
//!
//! Containment records which registers are live across each def and each
//! use. It does not constrain colors; spill choice prefers the node that
//! contains more.
//!
//! Nodes are split into two partitions: registers with an operand narrower
//! than 16 bits, and the rest. The colorability test only counts neighbors
//! in the node's own partition; the unconstrained partition is colored last
//! so it never takes a slot a constrained node needed.

use std::collections::{BTreeMap, BTreeSet};

use super::constraints::{collect_reg_info, RegInfo, RegisterType, MAX_REG};
use super::error::AllocResult;
use crate::analysis::liveness::analyze_instruction;
use crate::analysis::Liveness;
use crate::cfg::{ControlFlowGraph, InsnPos};
use crate::ir::{IROpcode, Reg};

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub width: u8,
    pub max_vreg: u32,
    pub ty: RegisterType,
    pub spill_cost: u32,
    pub is_param: bool,
    pub in_range: bool,
    /// Introduced by an earlier spill round.
    pub is_spill: bool,
    pub adj: BTreeSet<Reg>,
    /// Neighbors joined only by a coalesceable edge.
    pub soft: BTreeSet<Reg>,
    /// Registers live across a def or use of this node.
    pub contains: BTreeSet<Reg>,
    /// Nodes whose color this one would like to share.
    pub prefs: BTreeSet<Reg>,
    /// Symbolic registers merged into this node, itself included.
    pub members: Vec<Reg>,
}

impl Node {
    fn from_info(reg: Reg, info: &RegInfo, is_spill: bool) -> Self {
        Self {
            width: info.width,
            max_vreg: info.max_vreg,
            ty: info.ty,
            spill_cost: info.spill_cost,
            is_param: info.is_param,
            in_range: info.in_range,
            is_spill,
            adj: BTreeSet::new(),
            soft: BTreeSet::new(),
            contains: BTreeSet::new(),
            prefs: BTreeSet::new(),
            members: vec![reg],
        }
    }

    /// Whether any operand limits this node below 16 bits.
    pub fn is_constrained(&self) -> bool {
        self.max_vreg < MAX_REG
    }
}

/// Slots available to a node of `width` capped at `max_vreg`, in the
/// sense of the colorability bound.
fn capacity(max_vreg: u32, width: u8) -> u64 {
    let denom = 2 * u64::from(width) - 1;
    (u64::from(max_vreg) + 1).div_ceil(denom)
}

fn weight(neighbor_width: u8, width: u8) -> u64 {
    u64::from(neighbor_width).div_ceil(u64::from(width))
}

#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    nodes: BTreeMap<Reg, Node>,
    alias: BTreeMap<Reg, Reg>,
    moves: Vec<(Reg, Reg)>,
    infos: BTreeMap<Reg, RegInfo>,
}

impl InterferenceGraph {
    /// Build the graph of `cfg`. Registers in `spill_temps` are marked as
    /// spill temporaries.
    pub fn build(
        method: &str,
        cfg: &ControlFlowGraph,
        liveness: &Liveness,
        spill_temps: &BTreeSet<Reg>,
    ) -> AllocResult<Self> {
        let infos = collect_reg_info(method, cfg)?;
        let mut graph = Self {
            nodes: infos
                .iter()
                .map(|(&r, info)| (r, Node::from_info(r, info, spill_temps.contains(&r))))
                .collect(),
            alias: BTreeMap::new(),
            moves: Vec::new(),
            infos,
        };

        for b in cfg.block_ids() {
            let Some(block) = cfg.block(b) else { continue };
            let mut live = liveness.live_out(b);
            for (idx, insn) in block.instructions().rev() {
                let op = insn.opcode();
                if let Some(d) = insn.dest() {
                    let move_src = if op.is_move() { insn.srcs().first().copied() } else { None };
                    for r in live.regs() {
                        if r != d && Some(r) != move_src {
                            graph.add_edge(d, r);
                        }
                    }
                    if op.is_move() {
                        if let Some(s) = move_src {
                            graph.moves.push((d, s));
                        }
                    }
                    if op.is_binop() {
                        if let Some(&s0) = insn.srcs().first() {
                            graph.add_pref(d, s0);
                        }
                    }
                    if insn.dest_is_wide() {
                        for (i, &s) in insn.srcs().iter().enumerate() {
                            if insn.src_is_wide(i) {
                                graph.add_coalesceable_edge(d, s);
                            }
                        }
                    }
                    for r in live.regs() {
                        graph.add_containment(d, r);
                    }
                }
                if op == IROpcode::CheckCast {
                    let result = cfg
                        .move_result_of(InsnPos::new(b, idx))
                        .and_then(|p| cfg.insn(p))
                        .and_then(|i| i.dest());
                    if let Some(result) = result {
                        let src = insn.srcs().first().copied();
                        for r in live.regs() {
                            if r != result && Some(r) != src {
                                graph.add_edge(result, r);
                            }
                        }
                    }
                }
                analyze_instruction(insn, &mut live);
                for &s in insn.srcs() {
                    for r in live.regs() {
                        graph.add_containment(s, r);
                    }
                }
            }
        }
        Ok(graph)
    }

    fn add_edge(&mut self, a: Reg, b: Reg) {
        if a == b {
            return;
        }
        if let Some(n) = self.nodes.get_mut(&a) {
            n.adj.insert(b);
            n.soft.remove(&b);
        }
        if let Some(n) = self.nodes.get_mut(&b) {
            n.adj.insert(a);
            n.soft.remove(&a);
        }
    }

    /// An edge that select honors and coalescing may erase. Never weakens
    /// an existing edge.
    fn add_coalesceable_edge(&mut self, a: Reg, b: Reg) {
        if a == b {
            return;
        }
        for (x, y) in [(a, b), (b, a)] {
            if let Some(n) = self.nodes.get_mut(&x) {
                if n.adj.insert(y) {
                    n.soft.insert(y);
                }
            }
        }
    }

    fn add_containment(&mut self, a: Reg, b: Reg) {
        if a == b {
            return;
        }
        if let Some(n) = self.nodes.get_mut(&a) {
            n.contains.insert(b);
        }
        if let Some(n) = self.nodes.get_mut(&b) {
            n.contains.insert(a);
        }
    }

    fn add_pref(&mut self, a: Reg, b: Reg) {
        if a == b {
            return;
        }
        if let Some(n) = self.nodes.get_mut(&a) {
            n.prefs.insert(b);
        }
        if let Some(n) = self.nodes.get_mut(&b) {
            n.prefs.insert(a);
        }
    }

    pub fn node(&self, reg: Reg) -> Option<&Node> {
        self.nodes.get(&self.find(reg))
    }

    pub fn nodes(&self) -> impl Iterator<Item = (Reg, &Node)> + '_ {
        self.nodes.iter().map(|(r, n)| (*r, n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Operand information of each symbolic register.
    pub fn reg_infos(&self) -> &BTreeMap<Reg, RegInfo> {
        &self.infos
    }

    /// The node a symbolic register was merged into.
    pub fn find(&self, reg: Reg) -> Reg {
        let mut r = reg;
        while let Some(&next) = self.alias.get(&r) {
            r = next;
        }
        r
    }

    pub fn interferes(&self, a: Reg, b: Reg) -> bool {
        let (a, b) = (self.find(a), self.find(b));
        self.nodes.get(&a).is_some_and(|n| n.adj.contains(&b))
    }

    /// Whether the only edge between `a` and `b` is coalesceable.
    pub fn is_coalesceable_edge(&self, a: Reg, b: Reg) -> bool {
        let (a, b) = (self.find(a), self.find(b));
        self.nodes.get(&a).is_some_and(|n| n.soft.contains(&b))
    }

    /// Colorability of a node with the given shape against `adj`, ignoring
    /// nodes in `removed`.
    fn colorable_with(
        &self,
        width: u8,
        max_vreg: u32,
        adj: &BTreeSet<Reg>,
        removed: &BTreeSet<Reg>,
    ) -> bool {
        let constrained = max_vreg < MAX_REG;
        let mut load = 0u64;
        for r in adj {
            if removed.contains(r) {
                continue;
            }
            let Some(n) = self.nodes.get(r) else { continue };
            if n.is_constrained() == constrained {
                load += weight(n.width, width);
            }
        }
        load < capacity(max_vreg, width)
    }

    /// Whether `reg` is guaranteed a color once the nodes in `removed` are
    /// out of the graph.
    pub fn is_colorable(&self, reg: Reg, removed: &BTreeSet<Reg>) -> bool {
        self.nodes
            .get(&reg)
            .is_some_and(|n| self.colorable_with(n.width, n.max_vreg, &n.adj, removed))
    }

    /// Conservatively merge the ends of moves. Returns the number of moves
    /// coalesced.
    pub fn coalesce(&mut self) -> usize {
        let moves = std::mem::take(&mut self.moves);
        let mut merged = 0;
        for &(d, s) in &moves {
            let (a, b) = (self.find(d), self.find(s));
            if a == b {
                continue;
            }
            let (Some(na), Some(nb)) = (self.nodes.get(&a), self.nodes.get(&b)) else {
                continue;
            };
            if na.is_param || nb.is_param || na.is_spill || nb.is_spill {
                continue;
            }
            if na.width != nb.width || (na.adj.contains(&b) && !na.soft.contains(&b)) {
                continue;
            }
            if na.ty.meet(nb.ty) == RegisterType::Conflict {
                continue;
            }
            let adj: BTreeSet<Reg> = na.adj.union(&nb.adj).copied().filter(|r| *r != a && *r != b).collect();
            let max_vreg = na.max_vreg.min(nb.max_vreg);
            if !self.colorable_with(na.width, max_vreg, &adj, &BTreeSet::new()) {
                continue;
            }
            let (keep, gone) = if a < b { (a, b) } else { (b, a) };
            self.merge(keep, gone);
            merged += 1;
        }
        self.moves = moves;
        merged
    }

    fn merge(&mut self, keep: Reg, gone: Reg) {
        let Some(old) = self.nodes.remove(&gone) else { return };
        for &x in &old.adj {
            if let Some(n) = self.nodes.get_mut(&x) {
                let was_soft = n.soft.remove(&gone);
                n.adj.remove(&gone);
                // Soft only when neither old edge was hard.
                let keep_soft = !n.adj.contains(&keep) || n.soft.contains(&keep);
                n.adj.insert(keep);
                if was_soft && keep_soft {
                    n.soft.insert(keep);
                } else {
                    n.soft.remove(&keep);
                }
            }
        }
        for n in self.nodes.values_mut() {
            if n.prefs.remove(&gone) {
                n.prefs.insert(keep);
            }
            if n.contains.remove(&gone) {
                n.contains.insert(keep);
            }
        }
        if let Some(n) = self.nodes.get_mut(&keep) {
            let soft: BTreeSet<Reg> = n
                .adj
                .union(&old.adj)
                .copied()
                .filter(|r| {
                    (!n.adj.contains(r) || n.soft.contains(r))
                        && (!old.adj.contains(r) || old.soft.contains(r))
                })
                .collect();
            n.soft = soft;
            n.soft.remove(&keep);
            n.soft.remove(&gone);
            n.contains.extend(old.contains);
            n.contains.remove(&keep);
            n.contains.remove(&gone);
            n.adj.extend(old.adj);
            n.adj.remove(&keep);
            n.adj.remove(&gone);
            n.prefs.extend(old.prefs);
            n.prefs.remove(&keep);
            n.max_vreg = n.max_vreg.min(old.max_vreg);
            n.ty = n.ty.meet(old.ty);
            n.spill_cost += old.spill_cost;
            n.in_range |= old.in_range;
            n.members.extend(old.members);
        }
        self.alias.insert(gone, keep);
    }
}
