//! A small interpreter for integer method bodies.
//!
//! Covers parameters, constants, moves, int/long arithmetic, conditional
//! branches and returns. Wide values occupy a register pair; writing
//! either half of a pair poisons the other, so reading a clobbered value
//! fails instead of returning something stale.

use std::collections::BTreeMap;

use dexopt::cfg::{ControlFlowGraph, EdgeType};
use dexopt::ir::{IRCode, IRInstruction, IROpcode, Reg};

const STEP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Return(Option<i64>),
    Throw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Narrow(i64),
    WideLo(i64),
    WideHi,
    Poison,
}

#[derive(Default)]
struct Frame {
    regs: BTreeMap<Reg, Slot>,
}

impl Frame {
    fn poison(&mut self, r: Reg) {
        if let Some(slot) = self.regs.get_mut(&r) {
            *slot = Slot::Poison;
        }
    }

    fn clobber(&mut self, r: Reg) {
        match self.regs.get(&r) {
            Some(Slot::WideLo(_)) => self.poison(r + 1),
            Some(Slot::WideHi) if r > 0 => self.poison(r - 1),
            _ => {}
        }
    }

    fn write(&mut self, r: Reg, value: i64, wide: bool) {
        self.clobber(r);
        if wide {
            self.clobber(r + 1);
            self.regs.insert(r, Slot::WideLo(value));
            self.regs.insert(r + 1, Slot::WideHi);
        } else {
            self.regs.insert(r, Slot::Narrow(value));
        }
    }

    fn read(&self, r: Reg, insn: &IRInstruction) -> Result<i64, String> {
        match self.regs.get(&r) {
            Some(Slot::Narrow(v)) | Some(Slot::WideLo(v)) => Ok(*v),
            other => Err(format!("{}: v{} holds {:?}", insn, r, other)),
        }
    }
}

fn int_op(op: IROpcode, a: i64, b: i64) -> Option<i64> {
    let (a, b) = (a as i32, b as i32);
    let v = match op {
        IROpcode::AddInt | IROpcode::AddIntLit => a.wrapping_add(b),
        IROpcode::SubInt => a.wrapping_sub(b),
        IROpcode::RsubIntLit => b.wrapping_sub(a),
        IROpcode::MulInt | IROpcode::MulIntLit => a.wrapping_mul(b),
        IROpcode::AndInt | IROpcode::AndIntLit => a & b,
        IROpcode::OrInt | IROpcode::OrIntLit => a | b,
        IROpcode::XorInt | IROpcode::XorIntLit => a ^ b,
        _ => return None,
    };
    Some(v as i64)
}

fn long_op(op: IROpcode, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        IROpcode::AddLong => a.wrapping_add(b),
        IROpcode::SubLong => a.wrapping_sub(b),
        IROpcode::MulLong => a.wrapping_mul(b),
        IROpcode::AndLong => a & b,
        IROpcode::OrLong => a | b,
        IROpcode::XorLong => a ^ b,
        _ => return None,
    })
}

fn condition(op: IROpcode, a: i64, b: i64) -> Option<bool> {
    Some(match op {
        IROpcode::IfEq | IROpcode::IfEqz => a == b,
        IROpcode::IfNe | IROpcode::IfNez => a != b,
        IROpcode::IfLt | IROpcode::IfLtz => a < b,
        IROpcode::IfGe | IROpcode::IfGez => a >= b,
        IROpcode::IfGt | IROpcode::IfGtz => a > b,
        IROpcode::IfLe | IROpcode::IfLez => a <= b,
        _ => return None,
    })
}

/// Execute `code` on `args`, one value per load-param.
pub fn run(code: &IRCode, args: &[i64]) -> Result<Outcome, String> {
    let snapshot;
    let cfg = match code.cfg() {
        Some(cfg) => cfg,
        None => {
            snapshot = ControlFlowGraph::build(code.list(), false).map_err(|e| e.to_string())?;
            &snapshot
        }
    };
    let mut frame = Frame::default();
    let mut params = args.iter().copied();
    let mut steps = 0;
    let mut b = cfg.entry_block();
    loop {
        let block = cfg.block(b).ok_or("missing block")?;
        let mut taken = None;
        for (_, insn) in block.instructions() {
            steps += 1;
            if steps > STEP_LIMIT {
                return Err("step limit".to_string());
            }
            let op = insn.opcode();
            let dest = insn.dest();
            let wide = insn.dest_is_wide();
            match op {
                IROpcode::LoadParam | IROpcode::LoadParamWide | IROpcode::LoadParamObject => {
                    let value = params.next().ok_or("missing argument")?;
                    frame.write(dest.ok_or("no dest")?, value, wide);
                }
                IROpcode::Const | IROpcode::ConstWide => {
                    frame.write(dest.ok_or("no dest")?, insn.literal().unwrap_or(0), wide);
                }
                IROpcode::Move | IROpcode::MoveWide | IROpcode::MoveObject => {
                    let v = frame.read(insn.src(0), insn)?;
                    frame.write(dest.ok_or("no dest")?, v, wide);
                }
                IROpcode::NegInt => {
                    let v = frame.read(insn.src(0), insn)?;
                    frame.write(dest.ok_or("no dest")?, (v as i32).wrapping_neg() as i64, false);
                }
                IROpcode::ReturnVoid => return Ok(Outcome::Return(None)),
                IROpcode::Return | IROpcode::ReturnWide | IROpcode::ReturnObject => {
                    return Ok(Outcome::Return(Some(frame.read(insn.src(0), insn)?)));
                }
                IROpcode::Throw => return Ok(Outcome::Throw),
                IROpcode::Goto | IROpcode::Nop => {}
                _ if op.is_conditional_branch() => {
                    let a = frame.read(insn.src(0), insn)?;
                    let b = if insn.srcs_size() > 1 {
                        frame.read(insn.src(1), insn)?
                    } else {
                        0
                    };
                    taken = condition(op, a, b);
                }
                _ => {
                    let a = frame.read(insn.src(0), insn)?;
                    let b = match insn.literal() {
                        Some(lit) if insn.srcs_size() == 1 => lit,
                        _ => frame.read(insn.src(1), insn)?,
                    };
                    let v = int_op(op, a, b)
                        .or_else(|| long_op(op, a, b))
                        .ok_or_else(|| format!("unsupported {}", insn))?;
                    frame.write(dest.ok_or("no dest")?, v, wide);
                }
            }
        }
        let kind = match taken {
            Some(true) => EdgeType::Branch,
            _ => EdgeType::Goto,
        };
        b = cfg
            .get_succ_edge_of_type(b, kind)
            .map(|e| e.target())
            .ok_or_else(|| format!("no {:?} successor", kind))?;
    }
}
