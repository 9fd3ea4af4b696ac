//! Live-range splitting for registers that found no color.
//!
//! Every occurrence of a spilled register in an operand narrower than 16
//! bits is moved to a fresh temporary: a copy into the temporary in front
//! of a use, a copy back out after a def. What remains of the original
//! register only appears in moves and can live anywhere in the frame.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use super::constraints::{dest_cap, producer_of, src_cap, RegInfo, MAX_REG};
use super::error::{cfg_err, AllocResult};
use crate::cfg::{CfgError, ControlFlowGraph, InsnPos};
use crate::ir::{IRInstruction, IROpcode, Reg};

struct Occurrence {
    pos: InsnPos,
    srcs: Vec<usize>,
    dest: bool,
}

fn find_constrained(cfg: &ControlFlowGraph, reg: Reg) -> Option<Occurrence> {
    for (pos, insn) in cfg.instructions() {
        let op = insn.opcode();
        if op.is_move() || op.is_load_param() {
            continue;
        }
        let srcs: Vec<usize> = insn
            .srcs()
            .iter()
            .enumerate()
            .filter(|(i, s)| **s == reg && src_cap(insn, *i) < MAX_REG)
            .map(|(i, _)| i)
            .collect();
        let dest = insn.dest() == Some(reg) && {
            let producer = if op.is_move_result_pseudo() {
                producer_of(cfg, pos)
            } else {
                None
            };
            dest_cap(insn, producer) < MAX_REG
        };
        if dest || !srcs.is_empty() {
            return Some(Occurrence { pos, srcs, dest });
        }
    }
    None
}

/// Split every constrained occurrence of `regs` off into a temporary.
/// Temporaries are numbered from `next_reg` and recorded in
/// `spill_temps`. Returns the number of moves inserted.
pub(crate) fn split_live_ranges(
    method: &str,
    cfg: &mut ControlFlowGraph,
    regs: &BTreeSet<Reg>,
    infos: &BTreeMap<Reg, RegInfo>,
    next_reg: &mut Reg,
    spill_temps: &mut BTreeSet<Reg>,
) -> AllocResult<usize> {
    let mut inserted = 0;
    for &reg in regs {
        let Some(info) = infos.get(&reg) else { continue };
        if info.max_vreg == MAX_REG {
            continue;
        }
        let mv = if info.width == 2 {
            IROpcode::MoveWide
        } else {
            info.ty.move_opcode()
        };
        let width = u32::from(info.width);
        let mut fresh = |temps: &mut BTreeSet<Reg>| {
            let t = *next_reg;
            *next_reg += width;
            temps.insert(t);
            t
        };

        while let Some(occ) = find_constrained(cfg, reg) {
            let src_tmp = (!occ.srcs.is_empty()).then(|| fresh(spill_temps));
            let dest_tmp = occ.dest.then(|| fresh(spill_temps));
            let insn = cfg
                .insn_mut(occ.pos)
                .ok_or(CfgError::NoSuchInsn)
                .map_err(cfg_err(method))?;
            if let Some(t) = src_tmp {
                for &i in &occ.srcs {
                    insn.set_src(i, t);
                }
            }
            if let Some(t) = dest_tmp {
                insn.set_dest(t);
            }
            trace!(target: "dexopt::regalloc", reg, insn = %insn, "Split occurrence");
            // After first, so the position of the instruction stays valid.
            if let Some(t) = dest_tmp {
                cfg.insert_after(occ.pos, vec![IRInstruction::new(mv).with_dest(reg).with_src(t)])
                    .map_err(cfg_err(method))?;
                inserted += 1;
            }
            if let Some(t) = src_tmp {
                cfg.insert_before(occ.pos, vec![IRInstruction::new(mv).with_dest(t).with_src(reg)])
                    .map_err(cfg_err(method))?;
                inserted += 1;
            }
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regalloc::constraints::collect_reg_info;
    use crate::ir::ircode_from_string;

    #[test]
    fn test_split_moves_constrained_uses_to_temps() {
        let code = ircode_from_string(
            "((load-param v0) (const v1 7) (add-int/lit v2 v1 3) (return v2))",
        )
        .unwrap();
        let mut cfg = ControlFlowGraph::build(code.list(), true).unwrap();
        let infos = collect_reg_info("LTest;.m:(I)I", &cfg).unwrap();
        let mut next = 3;
        let mut temps = BTreeSet::new();
        let regs: BTreeSet<Reg> = [1].into_iter().collect();
        let n = split_live_ranges("LTest;.m:(I)I", &mut cfg, &regs, &infos, &mut next, &mut temps)
            .unwrap();

        // const's dest and add-int/lit's source each get a temp.
        assert_eq!(n, 2);
        assert_eq!(temps.len(), 2);
        let ops: Vec<IROpcode> = cfg.instructions().map(|(_, i)| i.opcode()).collect();
        assert_eq!(
            ops,
            vec![
                IROpcode::LoadParam,
                IROpcode::Const,
                IROpcode::Move,
                IROpcode::Move,
                IROpcode::AddIntLit,
                IROpcode::Return,
            ]
        );
        assert!(find_constrained(&cfg, 1).is_none());
    }
}
