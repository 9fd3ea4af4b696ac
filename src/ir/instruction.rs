//! IR instructions.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::lower::lit_dex_opcode;
use super::opcode::{IROpcode, RefKind};
use crate::dex::type_util;
use crate::dex::{DexFieldRef, DexMethodRef, DexString, DexType};

/// Virtual register number. Before allocation registers are symbolic; after
/// allocation a wide value in `v` also occupies `v + 1`.
pub type Reg = u32;

/// Payload of `fill-array-data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayData {
    pub element_width: u16,
    pub elements: Vec<u64>,
}

/// Non-register operand of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Operand {
    #[default]
    None,
    Literal(i64),
    String(DexString),
    Type(DexType),
    Field(DexFieldRef),
    Method(DexMethodRef),
    Data(Arc<ArrayData>),
}

/// One IR instruction: opcode, optional destination, ordered sources and at
/// most one reference or literal operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IRInstruction {
    opcode: IROpcode,
    dest: Option<Reg>,
    srcs: SmallVec<[Reg; 4]>,
    operand: Operand,
}

impl IRInstruction {
    pub fn new(opcode: IROpcode) -> Self {
        Self {
            opcode,
            dest: None,
            srcs: SmallVec::new(),
            operand: Operand::None,
        }
    }

    pub fn with_dest(mut self, dest: Reg) -> Self {
        self.dest = Some(dest);
        self
    }

    pub fn with_src(mut self, src: Reg) -> Self {
        self.srcs.push(src);
        self
    }

    pub fn with_srcs(mut self, srcs: impl IntoIterator<Item = Reg>) -> Self {
        self.srcs.extend(srcs);
        self
    }

    pub fn with_literal(mut self, literal: i64) -> Self {
        self.operand = Operand::Literal(literal);
        self
    }

    pub fn with_string(mut self, s: DexString) -> Self {
        self.operand = Operand::String(s);
        self
    }

    pub fn with_type(mut self, ty: DexType) -> Self {
        self.operand = Operand::Type(ty);
        self
    }

    pub fn with_field(mut self, field: DexFieldRef) -> Self {
        self.operand = Operand::Field(field);
        self
    }

    pub fn with_method(mut self, method: DexMethodRef) -> Self {
        self.operand = Operand::Method(method);
        self
    }

    pub fn with_data(mut self, data: ArrayData) -> Self {
        self.operand = Operand::Data(Arc::new(data));
        self
    }

    pub fn opcode(&self) -> IROpcode {
        self.opcode
    }

    pub fn set_opcode(&mut self, opcode: IROpcode) {
        self.opcode = opcode;
    }

    pub fn has_dest(&self) -> bool {
        self.dest.is_some()
    }

    pub fn dest(&self) -> Option<Reg> {
        self.dest
    }

    pub fn set_dest(&mut self, dest: Reg) {
        self.dest = Some(dest);
    }

    pub fn srcs(&self) -> &[Reg] {
        &self.srcs
    }

    pub fn srcs_size(&self) -> usize {
        self.srcs.len()
    }

    pub fn src(&self, i: usize) -> Reg {
        self.srcs[i]
    }

    pub fn set_src(&mut self, i: usize, reg: Reg) {
        self.srcs[i] = reg;
    }

    pub fn set_srcs(&mut self, srcs: impl IntoIterator<Item = Reg>) {
        self.srcs = srcs.into_iter().collect();
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    pub fn set_operand(&mut self, operand: Operand) {
        self.operand = operand;
    }

    pub fn literal(&self) -> Option<i64> {
        match self.operand {
            Operand::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn set_literal(&mut self, literal: i64) {
        self.operand = Operand::Literal(literal);
    }

    pub fn get_string(&self) -> Option<DexString> {
        match self.operand {
            Operand::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_type(&self) -> Option<DexType> {
        match self.operand {
            Operand::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn set_type(&mut self, ty: DexType) {
        self.operand = Operand::Type(ty);
    }

    pub fn get_field(&self) -> Option<DexFieldRef> {
        match self.operand {
            Operand::Field(f) => Some(f),
            _ => None,
        }
    }

    pub fn set_field(&mut self, field: DexFieldRef) {
        self.operand = Operand::Field(field);
    }

    pub fn get_method(&self) -> Option<DexMethodRef> {
        match self.operand {
            Operand::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn set_method(&mut self, method: DexMethodRef) {
        self.operand = Operand::Method(method);
    }

    pub fn get_data(&self) -> Option<&ArrayData> {
        match &self.operand {
            Operand::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn has_move_result_pseudo(&self) -> bool {
        self.opcode.has_move_result_pseudo()
    }

    pub fn may_throw(&self) -> bool {
        self.opcode.may_throw()
    }

    pub fn dest_is_wide(&self) -> bool {
        self.opcode.dest_is_wide()
    }

    pub fn dest_is_object(&self) -> bool {
        self.opcode.dest_is_object()
    }

    /// Whether source `i` holds a register pair.
    pub fn src_is_wide(&self, i: usize) -> bool {
        if self.opcode.is_invoke() {
            let Some(method) = self.get_method() else {
                return false;
            };
            let offset = usize::from(self.opcode != IROpcode::InvokeStatic);
            if i < offset {
                return false;
            }
            return method
                .proto()
                .args()
                .as_slice()
                .get(i - offset)
                .is_some_and(|ty| type_util::is_wide_type(*ty));
        }
        self.opcode.src_is_wide(i)
    }

    /// Register words read by the sources, counting pairs twice.
    pub fn src_words(&self) -> usize {
        (0..self.srcs.len())
            .map(|i| if self.src_is_wide(i) { 2 } else { 1 })
            .sum()
    }

    /// Widest register the destination field can address, in bits.
    ///
    /// `move-result-pseudo*` depends on its producer; see
    /// [`pseudo_dest_bit_width`].
    pub fn dest_bit_width(&self) -> u8 {
        if self.opcode.is_move() || self.opcode.is_load_param() {
            return 16;
        }
        if self.opcode.is_binop_lit() {
            return self
                .literal()
                .and_then(|lit| lit_dex_opcode(self.opcode, lit))
                .and_then(|op| op.dest_width())
                .unwrap_or(4);
        }
        self.opcode
            .default_dex_opcode()
            .and_then(|op| op.dest_width())
            .unwrap_or(16)
    }

    /// Widest register source `i` can address, in bits.
    pub fn src_bit_width(&self, i: usize) -> u8 {
        if self.opcode.is_move() || self.opcode == IROpcode::WriteBarrier {
            return 16;
        }
        if self.opcode.is_binop_lit() {
            return self
                .literal()
                .and_then(|lit| lit_dex_opcode(self.opcode, lit))
                .and_then(|op| op.src_width(i))
                .unwrap_or(4);
        }
        self.opcode
            .default_dex_opcode()
            .and_then(|op| op.src_width(i))
            .unwrap_or(16)
    }

    /// Whether this instruction has a `/range` encoding.
    pub fn has_range_form(&self) -> bool {
        self.opcode.has_range_form()
    }

    /// The non-range encoding cannot hold these sources at all.
    pub fn needs_range(&self) -> bool {
        self.has_range_form() && self.src_words() > 5
    }

    /// Rename every register through `map`.
    pub fn map_registers(&mut self, mut map: impl FnMut(Reg) -> Reg) {
        if let Some(d) = self.dest {
            self.dest = Some(map(d));
        }
        for s in self.srcs.iter_mut() {
            *s = map(*s);
        }
    }
}

/// Destination width of the `move-result-pseudo*` that follows `producer`.
pub fn pseudo_dest_bit_width(producer: &IRInstruction) -> u8 {
    if producer.opcode() == IROpcode::CheckCast {
        return 8;
    }
    if producer.opcode().is_div_int_lit() {
        return producer
            .literal()
            .and_then(|lit| lit_dex_opcode(producer.opcode(), lit))
            .and_then(|op| op.dest_width())
            .unwrap_or(4);
    }
    producer
        .opcode()
        .default_dex_opcode()
        .and_then(|op| op.dest_width())
        .unwrap_or(16)
}

fn write_operand(f: &mut fmt::Formatter<'_>, insn: &IRInstruction) -> fmt::Result {
    match &insn.operand {
        Operand::None => Ok(()),
        Operand::Literal(v) => write!(f, " {}", v),
        Operand::String(s) => write!(f, " {:?}", s.as_str()),
        Operand::Type(t) => write!(f, " \"{}\"", t),
        Operand::Field(fr) => write!(f, " \"{}\"", fr),
        Operand::Method(m) => write!(f, " \"{}\"", m),
        Operand::Data(d) => {
            write!(f, " #{} (", d.element_width)?;
            for (i, e) in d.elements.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{:#x}", e)?;
            }
            f.write_str(")")
        }
    }
}

impl fmt::Display for IRInstruction {
    /// Assembly form without branch labels, e.g. `(add-int v0 v1 v2)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.opcode)?;
        if let Some(d) = self.dest {
            write!(f, " v{}", d)?;
        }
        if self.opcode.ref_kind() == RefKind::Method || self.opcode == IROpcode::FilledNewArray {
            f.write_str(" (")?;
            for (i, s) in self.srcs.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "v{}", s)?;
            }
            f.write_str(")")?;
        } else {
            for s in &self.srcs {
                write!(f, " v{}", s)?;
            }
        }
        write_operand(f, self)?;
        f.write_str(")")
    }
}
