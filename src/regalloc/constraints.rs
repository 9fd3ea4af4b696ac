//! Per-operand register constraints.
//!
//! Every operand of an instruction has a *cap*: the highest register number
//! its encoding field can hold. A symbolic register's cap is the smallest
//! cap over all of its operands. Operands also constrain the register's
//! kind, which is combined with [`RegisterType::meet`]; a register that is
//! used both as an object and as a number, or both narrow and wide, cannot
//! be allocated.
//!
//! Sources of invokes and `filled-new-array` are capped at 16 bits: if the
//! allocated registers do not fit the short encoding, finalization copies
//! them into a contiguous window for the `/range` form.

use std::collections::BTreeMap;

use super::error::{AllocError, AllocResult};
use crate::cfg::{ControlFlowGraph, EdgeType, InsnPos};
use crate::dex::type_util;
use crate::ir::{pseudo_dest_bit_width, IRInstruction, IROpcode, Reg};

/// Highest register number any operand can name.
pub const MAX_REG: u32 = 0xffff;

/// What a register holds, as far as its operands tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterType {
    /// No operand says anything.
    Unknown,
    /// The constant 0, usable as a number or as null.
    Zero,
    /// A 32-bit number.
    Normal,
    Object,
    /// A 64-bit value in a register pair.
    Wide,
    Conflict,
}

impl RegisterType {
    pub fn meet(self, other: RegisterType) -> RegisterType {
        use RegisterType::*;
        match (self, other) {
            (Unknown, t) | (t, Unknown) => t,
            (a, b) if a == b => a,
            (Zero, Normal) | (Normal, Zero) => Normal,
            (Zero, Object) | (Object, Zero) => Object,
            _ => Conflict,
        }
    }

    /// The move that copies a register of this kind.
    pub fn move_opcode(self) -> IROpcode {
        match self {
            RegisterType::Wide => IROpcode::MoveWide,
            RegisterType::Object => IROpcode::MoveObject,
            _ => IROpcode::Move,
        }
    }
}

pub fn dest_type(insn: &IRInstruction) -> RegisterType {
    let op = insn.opcode();
    if insn.dest_is_wide() {
        RegisterType::Wide
    } else if insn.dest_is_object() {
        RegisterType::Object
    } else if op == IROpcode::Move {
        RegisterType::Unknown
    } else if op == IROpcode::Const && insn.literal() == Some(0) {
        RegisterType::Zero
    } else {
        RegisterType::Normal
    }
}

fn invoke_arg_type(insn: &IRInstruction, i: usize) -> RegisterType {
    let offset = usize::from(insn.opcode() != IROpcode::InvokeStatic);
    if i < offset {
        return RegisterType::Object;
    }
    let Some(method) = insn.get_method() else {
        return RegisterType::Unknown;
    };
    match method.proto().args().as_slice().get(i - offset) {
        Some(ty) if type_util::is_object(*ty) => RegisterType::Object,
        Some(_) => RegisterType::Normal,
        None => RegisterType::Unknown,
    }
}

pub fn src_type(insn: &IRInstruction, i: usize) -> RegisterType {
    use IROpcode::*;
    if insn.src_is_wide(i) {
        return RegisterType::Wide;
    }
    let op = insn.opcode();
    match op {
        Move | IfEq | IfNe | IfEqz | IfNez => RegisterType::Unknown,
        MoveObject | ReturnObject | MonitorEnter | MonitorExit | CheckCast | InstanceOf
        | ArrayLength | Throw | FillArrayData | SputObject => RegisterType::Object,
        FilledNewArray => match insn.get_type().and_then(type_util::get_array_component_type) {
            Some(elem) if type_util::is_object(elem) => RegisterType::Object,
            _ => RegisterType::Normal,
        },
        _ if op.is_iget() => RegisterType::Object,
        _ if op.is_iput() => {
            if i == 1 || op == IputObject {
                RegisterType::Object
            } else {
                RegisterType::Normal
            }
        }
        _ if op.is_aget() => {
            if i == 0 {
                RegisterType::Object
            } else {
                RegisterType::Normal
            }
        }
        _ if op.is_aput() => {
            if i == 1 || (i == 0 && op == AputObject) {
                RegisterType::Object
            } else {
                RegisterType::Normal
            }
        }
        _ if op.is_invoke() => invoke_arg_type(insn, i),
        _ => RegisterType::Normal,
    }
}

fn cap_of(bits: u8) -> u32 {
    ((1u64 << bits) - 1).min(u64::from(MAX_REG)) as u32
}

/// Highest register the destination may be given. A
/// `move-result-pseudo*` takes its width from `producer`.
pub fn dest_cap(insn: &IRInstruction, producer: Option<&IRInstruction>) -> u32 {
    if insn.opcode().is_move_result_pseudo() {
        return cap_of(producer.map(pseudo_dest_bit_width).unwrap_or(16));
    }
    cap_of(insn.dest_bit_width())
}

/// Highest register source `i` may be given.
pub fn src_cap(insn: &IRInstruction, i: usize) -> u32 {
    if insn.has_range_form() {
        return MAX_REG;
    }
    cap_of(insn.src_bit_width(i))
}

/// The instruction a `move-result-pseudo*` at `pos` belongs to.
pub fn producer_of(cfg: &ControlFlowGraph, pos: InsnPos) -> Option<&IRInstruction> {
    let block = cfg.block(pos.block)?;
    if let Some((_, insn)) = block.instructions().rev().find(|(i, _)| *i < pos.index) {
        return Some(insn);
    }
    let pred = cfg
        .pred_edges(pos.block)
        .into_iter()
        .find(|e| e.kind() == EdgeType::Goto)?
        .src();
    cfg.block(pred)?.last_insn().map(|(_, insn)| insn)
}

/// What the operands say about one symbolic register.
#[derive(Debug, Clone, PartialEq)]
pub struct RegInfo {
    pub width: u8,
    pub ty: RegisterType,
    pub max_vreg: u32,
    /// Occurrences in operands narrower than 16 bits.
    pub spill_cost: u32,
    pub is_param: bool,
    /// Passed to an instruction that can only use its `/range` form.
    pub in_range: bool,
}

impl RegInfo {
    fn new(width: u8) -> Self {
        Self {
            width,
            ty: RegisterType::Unknown,
            max_vreg: MAX_REG,
            spill_cost: 0,
            is_param: false,
            in_range: false,
        }
    }
}

fn record(
    method: &str,
    infos: &mut BTreeMap<Reg, RegInfo>,
    reg: Reg,
    width: u8,
    ty: RegisterType,
    cap: u32,
) -> AllocResult<()> {
    let info = infos.entry(reg).or_insert_with(|| RegInfo::new(width));
    info.ty = info.ty.meet(ty);
    if info.width != width || info.ty == RegisterType::Conflict {
        return Err(AllocError::TypeConflict {
            method: method.to_string(),
            reg,
        });
    }
    info.max_vreg = info.max_vreg.min(cap);
    if cap < MAX_REG {
        info.spill_cost += 1;
    }
    Ok(())
}

/// Gather widths, kinds and caps of every register in `cfg`.
pub fn collect_reg_info(method: &str, cfg: &ControlFlowGraph) -> AllocResult<BTreeMap<Reg, RegInfo>> {
    let mut infos = BTreeMap::new();
    for (pos, insn) in cfg.instructions() {
        if let Some(d) = insn.dest() {
            let producer = if insn.opcode().is_move_result_pseudo() {
                producer_of(cfg, pos)
            } else {
                None
            };
            let width = if insn.dest_is_wide() { 2 } else { 1 };
            record(method, &mut infos, d, width, dest_type(insn), dest_cap(insn, producer))?;
            if insn.opcode().is_load_param() {
                if let Some(info) = infos.get_mut(&d) {
                    info.is_param = true;
                }
            }
        }
        let needs_range = insn.needs_range();
        for (i, &s) in insn.srcs().iter().enumerate() {
            let width = if insn.src_is_wide(i) { 2 } else { 1 };
            record(method, &mut infos, s, width, src_type(insn, i), src_cap(insn, i))?;
            if needs_range {
                if let Some(info) = infos.get_mut(&s) {
                    info.in_range = true;
                }
            }
        }
    }
    Ok(infos)
}

/// Registers of the leading `load-param*` instructions, in order.
pub fn param_regs(cfg: &ControlFlowGraph) -> Vec<(InsnPos, Reg)> {
    let entry = cfg.entry_block();
    let Some(block) = cfg.block(entry) else {
        return Vec::new();
    };
    block
        .instructions()
        .take_while(|(_, insn)| insn.opcode().is_load_param())
        .filter_map(|(i, insn)| insn.dest().map(|d| (InsnPos::new(entry, i), d)))
        .collect()
}
