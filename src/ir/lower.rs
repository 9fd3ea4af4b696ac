//! Encoding selection.
//!
//! Picks the smallest DEX encoding whose register and literal fields hold an
//! allocated instruction, and lowers a body to `DEX_OPCODE` entries.

use std::fmt;

use smallvec::SmallVec;

use super::code::IRCode;
use super::dex_opcode::{DexOpcode, Format};
use super::entry::{DexInstruction, MethodItemEntry};
use super::instruction::{IRInstruction, Reg};
use super::list::IRList;
use super::opcode::IROpcode;

/// Lowering error types
#[derive(Debug, Clone, PartialEq)]
pub enum LowerError {
    /// No encoding holds the instruction's registers or literal
    NoEncoding(String),
    /// Internal opcode still present
    InternalOpcode(String),
    /// Producer without the `move-result-pseudo*` carrying its result
    MissingPseudo(String),
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEncoding(i) => write!(f, "No encoding fits {}", i),
            Self::InternalOpcode(i) => write!(f, "Internal opcode cannot be encoded: {}", i),
            Self::MissingPseudo(i) => write!(f, "Missing move-result-pseudo after {}", i),
        }
    }
}

impl std::error::Error for LowerError {}

pub type LowerResult<T> = Result<T, LowerError>;

fn fits_signed(v: i64, bits: u32) -> bool {
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    (min..=max).contains(&v)
}

fn fits_reg(reg: Reg, width: u8) -> bool {
    u64::from(reg) < (1u64 << width)
}

/// Encoding of a literal binop for a literal value, preferring `/lit8`
/// because its register fields are wider.
pub fn lit_dex_opcode(op: IROpcode, lit: i64) -> Option<DexOpcode> {
    let (lit8, lit16) = lit_forms(op)?;
    if fits_signed(lit, 8) {
        Some(lit8)
    } else if fits_signed(lit, 16) {
        lit16
    } else {
        None
    }
}

fn lit_forms(op: IROpcode) -> Option<(DexOpcode, Option<DexOpcode>)> {
    use DexOpcode as D;
    use IROpcode as I;
    Some(match op {
        I::AddIntLit => (D::AddIntLit8, Some(D::AddIntLit16)),
        I::RsubIntLit => (D::RsubIntLit8, Some(D::RsubInt)),
        I::MulIntLit => (D::MulIntLit8, Some(D::MulIntLit16)),
        I::DivIntLit => (D::DivIntLit8, Some(D::DivIntLit16)),
        I::RemIntLit => (D::RemIntLit8, Some(D::RemIntLit16)),
        I::AndIntLit => (D::AndIntLit8, Some(D::AndIntLit16)),
        I::OrIntLit => (D::OrIntLit8, Some(D::OrIntLit16)),
        I::XorIntLit => (D::XorIntLit8, Some(D::XorIntLit16)),
        I::ShlIntLit => (D::ShlIntLit8, None),
        I::ShrIntLit => (D::ShrIntLit8, None),
        I::UshrIntLit => (D::UshrIntLit8, None),
        _ => return None,
    })
}

/// Sources form one ascending run of register words.
pub fn is_range_contiguous(insn: &IRInstruction) -> bool {
    let mut expected: Option<Reg> = None;
    for (i, &s) in insn.srcs().iter().enumerate() {
        if let Some(e) = expected {
            if s != e {
                return false;
            }
        }
        expected = Some(s + if insn.src_is_wide(i) { 2 } else { 1 });
    }
    true
}

fn fits(op: DexOpcode, dest: Option<Reg>, insn: &IRInstruction) -> bool {
    if let Some(d) = dest {
        let width = if op.dest_is_src0() {
            op.src_width(0)
        } else {
            op.dest_width().or_else(|| op.src_width(0))
        };
        match width {
            Some(w) if fits_reg(d, w) => {}
            _ => return false,
        }
    }
    if op.is_range() {
        return is_range_contiguous(insn)
            && insn.src_words() <= 255
            && insn.srcs().iter().all(|s| fits_reg(*s, 16));
    }
    insn.srcs().iter().enumerate().all(|(i, &s)| {
        // A pair in a non-range invoke lists both of its words.
        let top = if insn.src_is_wide(i) && op.format() == Format::F35c {
            s + 1
        } else {
            s
        };
        op.src_width(i).is_some_and(|w| fits_reg(top, w))
    })
}

/// Smallest encoding for an instruction whose result, if any, lands in `result`.
///
/// For opcodes with a `move-result-pseudo*`, `result` is the pseudo's
/// destination; otherwise it is the instruction's own destination.
pub fn select_dex_opcode_with_result(insn: &IRInstruction, result: Option<Reg>) -> Option<DexOpcode> {
    use DexOpcode as D;
    use IROpcode as I;
    let op = insn.opcode();
    if op.is_internal() {
        return None;
    }
    let pick = |candidates: &[DexOpcode]| candidates.iter().copied().find(|c| fits(*c, result, insn));
    match op {
        I::Move => pick(&[D::Move, D::MoveFrom16, D::Move16]),
        I::MoveWide => pick(&[D::MoveWide, D::MoveWideFrom16, D::MoveWide16]),
        I::MoveObject => pick(&[D::MoveObject, D::MoveObjectFrom16, D::MoveObject16]),
        I::Const => {
            let lit = insn.literal()?;
            let mut candidates: SmallVec<[DexOpcode; 4]> = SmallVec::new();
            if fits_signed(lit, 4) {
                candidates.push(D::Const4);
            }
            if fits_signed(lit, 16) {
                candidates.push(D::Const16);
            }
            if lit & 0xffff == 0 && fits_signed(lit, 32) {
                candidates.push(D::ConstHigh16);
            }
            if fits_signed(lit, 32) {
                candidates.push(D::Const);
            }
            pick(&candidates)
        }
        I::ConstWide => {
            let lit = insn.literal()?;
            let mut candidates: SmallVec<[DexOpcode; 4]> = SmallVec::new();
            if fits_signed(lit, 16) {
                candidates.push(D::ConstWide16);
            }
            if fits_signed(lit, 32) {
                candidates.push(D::ConstWide32);
            }
            if lit & 0xffff_ffff_ffff == 0 {
                candidates.push(D::ConstWideHigh16);
            }
            candidates.push(D::ConstWide);
            pick(&candidates)
        }
        I::ConstString => pick(&[D::ConstString, D::ConstStringJumbo]),
        I::Goto => Some(D::Goto),
        I::Switch => pick(&[D::SparseSwitch]),
        I::CheckCast => {
            // check-cast rewrites its operand in place.
            if result.is_some_and(|r| Some(&r) != insn.srcs().first()) {
                return None;
            }
            pick(&[D::CheckCast])
        }
        _ if op.is_binop_lit() => {
            let lit = insn.literal()?;
            let (lit8, lit16) = lit_forms(op)?;
            let mut candidates: SmallVec<[DexOpcode; 2]> = SmallVec::new();
            if fits_signed(lit, 8) {
                candidates.push(lit8);
            }
            if let Some(l16) = lit16 {
                if fits_signed(lit, 16) {
                    candidates.push(l16);
                }
            }
            pick(&candidates)
        }
        _ if op.is_binop() => {
            let three = op.default_dex_opcode()?;
            let two = three.two_addr_form()?;
            if result == insn.srcs().first().copied() && pick(&[two]).is_some() {
                Some(two)
            } else {
                pick(&[three])
            }
        }
        _ if op.has_range_form() => {
            let base = op.default_dex_opcode()?;
            if insn.src_words() <= 5 && pick(&[base]).is_some() {
                Some(base)
            } else {
                pick(&[base.range_form()?])
            }
        }
        _ => pick(&[op.default_dex_opcode()?]),
    }
}

/// Smallest encoding for an instruction carrying its own destination.
pub fn select_dex_opcode(insn: &IRInstruction) -> Option<DexOpcode> {
    select_dex_opcode_with_result(insn, insn.dest())
}

/// Lower an allocated body to encoded instructions.
///
/// `load-param*` entries are dropped and each `move-result-pseudo*` is folded
/// into its producer. Entry ids of kept instructions are preserved so branch
/// targets stay valid.
pub fn lower_code(code: &IRCode) -> LowerResult<IRList> {
    let mut list = code.list().clone();
    let ids = list.ids();
    let mut pending: Option<(super::list::EntryId, IRInstruction)> = None;
    for id in ids {
        let Some(MethodItemEntry::Opcode(insn)) = list.get(id).cloned() else {
            continue;
        };
        let op = insn.opcode();
        if let Some((producer_id, producer)) = pending.take() {
            if !op.is_move_result_pseudo() {
                return Err(LowerError::MissingPseudo(producer.to_string()));
            }
            let encoded = encode(&producer, insn.dest())?;
            if let Some(entry) = list.get_mut(producer_id) {
                *entry = MethodItemEntry::DexOpcode(encoded);
            }
            list.remove(id);
            continue;
        }
        if op.is_load_param() {
            list.remove(id);
            continue;
        }
        if op.is_internal() {
            return Err(LowerError::InternalOpcode(insn.to_string()));
        }
        if op.has_move_result_pseudo() {
            pending = Some((id, insn));
            continue;
        }
        let encoded = encode(&insn, insn.dest())?;
        if let Some(entry) = list.get_mut(id) {
            *entry = MethodItemEntry::DexOpcode(encoded);
        }
    }
    if let Some((_, producer)) = pending {
        return Err(LowerError::MissingPseudo(producer.to_string()));
    }
    Ok(list)
}

fn encode(insn: &IRInstruction, dest: Option<Reg>) -> LowerResult<DexInstruction> {
    let opcode = select_dex_opcode_with_result(insn, dest)
        .ok_or_else(|| LowerError::NoEncoding(insn.to_string()))?;
    let mut srcs: SmallVec<[Reg; 5]> = insn.srcs().iter().copied().collect();
    // 2-address forms and check-cast store the destination in the first source slot.
    if (opcode.dest_is_src0() || opcode == DexOpcode::CheckCast) && !srcs.is_empty() {
        srcs.remove(0);
    }
    Ok(DexInstruction {
        opcode,
        dest,
        srcs,
        operand: insn.operand().clone(),
    })
}
