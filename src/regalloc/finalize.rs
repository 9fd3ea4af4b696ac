//! Finalization: from colors to a legal frame.
//!
//! ```text
//!   0 ........ K-1 | K ...... K+R-1 | K+R ...... K+R+P-1
//!   colored regs    | range window   | parameters
//! ```
//!
//! Colored registers take the bottom `K` slots. Parameters must arrive in
//! the top `P` slots; a parameter whose top slot is beyond the cap of one
//! of its operands keeps its color instead and is copied there on entry.
//! `/range` instructions whose registers are not contiguous get their
//! operands copied into the scratch window. `check-cast` writes its
//! operand in place, so when the result landed elsewhere the operand is
//! copied into the result first. Moves that became self-moves are removed.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use super::constraints::{param_regs, RegInfo};
use super::error::{cfg_err, AllocError, AllocResult};
use super::interference::InterferenceGraph;
use super::AllocStats;
use crate::analysis::Liveness;
use crate::cfg::{ControlFlowGraph, InsnPos};
use crate::ir::{select_dex_opcode_with_result, IRCode, IRInstruction, IROpcode, Reg};

/// Colors chosen by an allocator, before the frame is laid out.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    colors: BTreeMap<Reg, Reg>,
    /// Colors of parameters; an allocator that leaves them out always
    /// relocates parameters to the top of the frame.
    param_colors: BTreeMap<Reg, Reg>,
    infos: BTreeMap<Reg, RegInfo>,
}

impl Assignment {
    pub fn new(
        colors: BTreeMap<Reg, Reg>,
        param_colors: BTreeMap<Reg, Reg>,
        infos: BTreeMap<Reg, RegInfo>,
    ) -> Self {
        Self {
            colors,
            param_colors,
            infos,
        }
    }

    pub(crate) fn from_graph(graph: &InterferenceGraph, colors: &BTreeMap<Reg, Reg>) -> Self {
        let mut regs = BTreeMap::new();
        let mut params = BTreeMap::new();
        for (&reg, info) in graph.reg_infos() {
            let Some(&color) = colors.get(&graph.find(reg)) else { continue };
            if info.is_param {
                params.insert(reg, color);
            } else {
                regs.insert(reg, color);
            }
        }
        Self::new(regs, params, graph.reg_infos().clone())
    }

    pub fn color(&self, reg: Reg) -> Option<Reg> {
        self.colors.get(&reg).or_else(|| self.param_colors.get(&reg)).copied()
    }

    fn width(&self, reg: Reg) -> u32 {
        self.infos.get(&reg).map_or(1, |i| u32::from(i.width))
    }

    fn move_opcode(&self, reg: Reg) -> IROpcode {
        match self.infos.get(&reg) {
            Some(info) if info.width == 2 => IROpcode::MoveWide,
            Some(info) => info.ty.move_opcode(),
            None => IROpcode::Move,
        }
    }
}

struct Param {
    pos: InsnPos,
    reg: Reg,
    width: u32,
    cap: u32,
    color: Option<Reg>,
}

/// Frame layout settled by [`Layout::solve`].
struct Layout {
    colors_top: u32,
    window: u32,
    slots: BTreeMap<Reg, Reg>,
    kept: BTreeSet<Reg>,
}

impl Layout {
    fn map(&self, a: &Assignment, reg: Reg) -> Reg {
        if self.kept.contains(&reg) {
            return a.param_colors.get(&reg).copied().unwrap_or(reg);
        }
        if let Some(&slot) = self.slots.get(&reg) {
            return slot;
        }
        a.colors.get(&reg).copied().unwrap_or(reg)
    }

    fn mapped(&self, a: &Assignment, insn: &IRInstruction) -> IRInstruction {
        let mut insn = insn.clone();
        insn.map_registers(|r| self.map(a, r));
        insn
    }

    /// Grow the set of parameters that keep their color and the range
    /// window until neither changes.
    fn solve(cfg: &ControlFlowGraph, a: &Assignment, params: &[Param]) -> Self {
        let base_top = a
            .colors
            .iter()
            .map(|(r, c)| c + a.width(*r))
            .max()
            .unwrap_or(0);
        let mut layout = Layout {
            colors_top: base_top,
            window: 0,
            slots: BTreeMap::new(),
            kept: BTreeSet::new(),
        };
        loop {
            layout.colors_top = params
                .iter()
                .filter(|p| layout.kept.contains(&p.reg))
                .filter_map(|p| p.color.map(|c| c + p.width))
                .fold(base_top, u32::max);
            let mut slot = layout.colors_top + layout.window;
            layout.slots.clear();
            let mut kept = layout.kept.clone();
            for p in params {
                layout.slots.insert(p.reg, slot);
                if slot > p.cap && p.color.is_some() {
                    kept.insert(p.reg);
                }
                slot += p.width;
            }
            let window = cfg
                .instructions()
                .filter(|(_, insn)| insn.has_range_form())
                .filter(|(_, insn)| {
                    select_dex_opcode_with_result(&layout.mapped(a, insn), None).is_none()
                })
                .map(|(_, insn)| insn.src_words() as u32)
                .fold(layout.window, u32::max);
            if kept == layout.kept && window == layout.window {
                return layout;
            }
            layout.kept = kept;
            layout.window = window;
        }
    }
}

enum Edit {
    Before(Vec<IRInstruction>),
    After(Vec<IRInstruction>),
    Remove,
}

/// Rewrite `cfg` onto physical registers. Returns the frame size.
pub(crate) fn finalize(
    method: &str,
    cfg: &mut ControlFlowGraph,
    a: &Assignment,
    stats: &mut AllocStats,
) -> AllocResult<u32> {
    let params: Vec<Param> = param_regs(cfg)
        .into_iter()
        .map(|(pos, reg)| Param {
            pos,
            reg,
            width: a.width(reg),
            cap: a.infos.get(&reg).map_or(u32::MAX, |i| i.max_vreg),
            color: a.param_colors.get(&reg).copied(),
        })
        .collect();
    let layout = Layout::solve(cfg, a, &params);
    let param_words: u32 = params.iter().map(|p| p.width).sum();

    // Parameters read after the prologue.
    let live_after_params: BTreeSet<Reg> = match params.last() {
        Some(last) => Liveness::run(cfg)
            .live_out_per_insn(cfg, last.pos.block)
            .into_iter()
            .find(|(idx, _)| *idx == last.pos.index)
            .map(|(_, live)| live.regs().collect::<BTreeSet<Reg>>())
            .unwrap_or_default(),
        None => BTreeSet::new(),
    };

    let mut edits: Vec<(InsnPos, Edit)> = Vec::new();

    // Range instructions needing the window, with their symbolic operands.
    let windows: Vec<(InsnPos, Vec<(Reg, bool)>)> = cfg
        .instructions()
        .filter(|(_, insn)| insn.has_range_form())
        .filter(|(_, insn)| select_dex_opcode_with_result(&layout.mapped(a, insn), None).is_none())
        .map(|(pos, insn)| {
            let srcs = insn
                .srcs()
                .iter()
                .enumerate()
                .map(|(i, &s)| (s, insn.src_is_wide(i)))
                .collect();
            (pos, srcs)
        })
        .collect();
    let check_casts: Vec<(InsnPos, Option<InsnPos>)> = cfg
        .instructions()
        .filter(|(_, insn)| insn.opcode() == IROpcode::CheckCast)
        .map(|(pos, _)| (pos, cfg.move_result_of(pos)))
        .collect();

    cfg.for_each_insn_mut(|insn| insn.map_registers(|r| layout.map(a, r)));
    for p in &params {
        if let Some(insn) = cfg.insn_mut(p.pos) {
            insn.set_dest(layout.slots.get(&p.reg).copied().unwrap_or(p.reg));
        }
    }

    let mut entry_moves = Vec::new();
    for p in &params {
        if !layout.kept.contains(&p.reg) || !live_after_params.contains(&p.reg) {
            continue;
        }
        if let (Some(color), Some(&slot)) = (p.color, layout.slots.get(&p.reg)) {
            entry_moves.push(
                IRInstruction::new(a.move_opcode(p.reg))
                    .with_dest(color)
                    .with_src(slot),
            );
        }
    }
    if let (Some(last), false) = (params.last(), entry_moves.is_empty()) {
        stats.param_moves += entry_moves.len();
        stats.moves_inserted += entry_moves.len();
        edits.push((last.pos, Edit::After(entry_moves)));
    }

    for (pos, pseudo) in check_casts {
        let Some(result) = pseudo.and_then(|p| cfg.insn(p)).and_then(|i| i.dest()) else {
            continue;
        };
        let Some(insn) = cfg.insn_mut(pos) else { continue };
        let src = insn.src(0);
        if src != result {
            insn.set_src(0, result);
            trace!(target: "dexopt::regalloc", src, result, "Copying check-cast operand");
            stats.moves_inserted += 1;
            edits.push((
                pos,
                Edit::Before(vec![IRInstruction::new(IROpcode::MoveObject)
                    .with_dest(result)
                    .with_src(src)]),
            ));
        }
    }

    for (pos, srcs) in windows {
        let mut moves = Vec::with_capacity(srcs.len());
        let mut window_regs = Vec::with_capacity(srcs.len());
        let mut next = layout.colors_top;
        for (sym, wide) in srcs {
            let op = if wide {
                IROpcode::MoveWide
            } else {
                a.move_opcode(sym)
            };
            moves.push(
                IRInstruction::new(op)
                    .with_dest(next)
                    .with_src(layout.map(a, sym)),
            );
            window_regs.push(next);
            next += if wide { 2 } else { 1 };
        }
        if let Some(insn) = cfg.insn_mut(pos) {
            insn.set_srcs(window_regs);
        }
        stats.range_windows += 1;
        stats.moves_inserted += moves.len();
        edits.push((pos, Edit::Before(moves)));
    }

    for (pos, insn) in cfg.instructions() {
        if insn.opcode().is_move() && insn.dest() == insn.srcs().first().copied() {
            edits.push((pos, Edit::Remove));
        }
    }

    // Later positions first, so earlier ones stay valid.
    edits.sort_by(|(x, _), (y, _)| y.cmp(x));
    for (pos, edit) in edits {
        let applied = match edit {
            Edit::Before(insns) => cfg.insert_before(pos, insns),
            Edit::After(insns) => cfg.insert_after(pos, insns),
            Edit::Remove => {
                stats.moves_elided += 1;
                cfg.remove_insn(pos)
            }
        };
        applied.map_err(cfg_err(method))?;
    }

    let registers_size = layout.colors_top + layout.window + param_words;
    debug!(
        target: "dexopt::regalloc",
        method,
        registers_size,
        window = layout.window,
        kept_params = layout.kept.len(),
        "Finalized frame"
    );
    Ok(registers_size)
}

fn words(wide: bool) -> u32 {
    if wide {
        2
    } else {
        1
    }
}

/// Check that every instruction of an allocated `cfg` has an encoding and
/// that the parameters sit at the top of a frame of `registers_size`.
pub fn check_cfg_legality(method: &str, cfg: &ControlFlowGraph, registers_size: u32) -> AllocResult<()> {
    let illegal = |insn: &IRInstruction| AllocError::IllegalEncoding {
        method: method.to_string(),
        insn: insn.to_string(),
    };
    for (pos, insn) in cfg.instructions() {
        let dest_ok = insn
            .dest()
            .map_or(true, |d| d + words(insn.dest_is_wide()) <= registers_size);
        let srcs_ok = insn
            .srcs()
            .iter()
            .enumerate()
            .all(|(i, &s)| s + words(insn.src_is_wide(i)) <= registers_size);
        if !dest_ok || !srcs_ok {
            return Err(illegal(insn));
        }
        if insn.opcode().is_internal() {
            continue;
        }
        let result = if insn.has_move_result_pseudo() {
            cfg.move_result_of(pos)
                .and_then(|p| cfg.insn(p))
                .and_then(|i| i.dest())
        } else {
            insn.dest()
        };
        if select_dex_opcode_with_result(insn, result).is_none() {
            return Err(illegal(insn));
        }
    }

    let params = param_regs(cfg);
    let param_words: u32 = params
        .iter()
        .filter_map(|(pos, _)| cfg.insn(*pos))
        .map(|insn| words(insn.dest_is_wide()))
        .sum();
    let mut expected = registers_size.checked_sub(param_words).ok_or_else(|| {
        AllocError::IllegalEncoding {
            method: method.to_string(),
            insn: format!("{} parameter words in a frame of {}", param_words, registers_size),
        }
    })?;
    for (pos, reg) in params {
        let Some(insn) = cfg.insn(pos) else { continue };
        if reg != expected {
            return Err(illegal(insn));
        }
        expected += words(insn.dest_is_wide());
    }
    Ok(())
}

/// [`check_cfg_legality`] over a method body, using its CFG when one is
/// built.
pub fn check_legality(method: &str, code: &IRCode) -> AllocResult<()> {
    match code.cfg() {
        Some(cfg) => check_cfg_legality(method, cfg, code.registers_size()),
        None => {
            let cfg = ControlFlowGraph::build(code.list(), false).map_err(cfg_err(method))?;
            check_cfg_legality(method, &cfg, code.registers_size())
        }
    }
}
