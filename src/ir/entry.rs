//! Method item entries: the elements of a method body's instruction stream.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::dex_opcode::DexOpcode;
use super::instruction::{IRInstruction, Operand, Reg};
use super::list::EntryId;
use crate::dex::{DexString, DexType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TryEntryKind {
    Start,
    End,
}

/// Opens or closes a try region. `catch_start` is the first catch entry of
/// the handler chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryEntry {
    pub kind: TryEntryKind,
    pub catch_start: EntryId,
}

/// One handler of a catch chain. `None` catches everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchEntry {
    pub catch_type: Option<DexType>,
    pub next: Option<EntryId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchTargetKind {
    Simple,
    /// A switch case with its key.
    Multi(i32),
}

/// Marks the position a branch instruction jumps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchTarget {
    pub kind: BranchTargetKind,
    pub src: EntryId,
}

/// Source position. `parent` links inlined frames to their call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DexPosition {
    pub method: Option<DexString>,
    pub file: Option<DexString>,
    pub line: u32,
    pub parent: Option<Arc<DexPosition>>,
}

impl DexPosition {
    pub fn new(method: Option<DexString>, file: Option<DexString>, line: u32) -> Self {
        Self {
            method,
            file,
            line,
            parent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceBlockValue {
    pub val: f32,
    pub appear100: f32,
}

/// Profiling marker. Chained source blocks describe code merged from several
/// original blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBlock {
    pub src: DexString,
    pub id: u32,
    pub vals: Vec<Option<SourceBlockValue>>,
    pub next: Option<Box<SourceBlock>>,
}

impl SourceBlock {
    pub fn new(src: DexString, id: u32) -> Self {
        Self {
            src,
            id,
            vals: Vec::new(),
            next: None,
        }
    }

    pub fn chain_len(&self) -> usize {
        1 + self.next.as_ref().map_or(0, |n| n.chain_len())
    }
}

/// Local-variable debug information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DexDebugInstruction {
    StartLocal {
        reg: Reg,
        name: DexString,
        ty: DexType,
    },
    EndLocal {
        reg: Reg,
    },
    RestartLocal {
        reg: Reg,
    },
    SetPrologueEnd,
    SetEpilogueBegin,
    SetFile(Option<DexString>),
}

impl DexDebugInstruction {
    pub fn reg(&self) -> Option<Reg> {
        match self {
            DexDebugInstruction::StartLocal { reg, .. }
            | DexDebugInstruction::EndLocal { reg }
            | DexDebugInstruction::RestartLocal { reg } => Some(*reg),
            _ => None,
        }
    }

    pub fn set_reg(&mut self, new_reg: Reg) {
        match self {
            DexDebugInstruction::StartLocal { reg, .. }
            | DexDebugInstruction::EndLocal { reg }
            | DexDebugInstruction::RestartLocal { reg } => *reg = new_reg,
            _ => {}
        }
    }
}

/// A lowered instruction with a concrete encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexInstruction {
    pub opcode: DexOpcode,
    pub dest: Option<Reg>,
    pub srcs: SmallVec<[Reg; 5]>,
    pub operand: Operand,
}

impl fmt::Display for DexInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if let Some(d) = self.dest {
            write!(f, " v{}", d)?;
        }
        for s in &self.srcs {
            write!(f, " v{}", s)?;
        }
        if let Operand::Literal(v) = self.operand {
            write!(f, " #{}", v)?;
        }
        Ok(())
    }
}

/// One element of a method body.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodItemEntry {
    Opcode(IRInstruction),
    DexOpcode(DexInstruction),
    Try(TryEntry),
    Catch(CatchEntry),
    Target(BranchTarget),
    Position(Arc<DexPosition>),
    Debug(DexDebugInstruction),
    SourceBlock(Box<SourceBlock>),
    /// Placeholder with no semantics.
    Fallthrough,
}

impl MethodItemEntry {
    pub fn as_insn(&self) -> Option<&IRInstruction> {
        match self {
            MethodItemEntry::Opcode(insn) => Some(insn),
            _ => None,
        }
    }

    pub fn as_insn_mut(&mut self) -> Option<&mut IRInstruction> {
        match self {
            MethodItemEntry::Opcode(insn) => Some(insn),
            _ => None,
        }
    }

    pub fn is_insn(&self) -> bool {
        matches!(self, MethodItemEntry::Opcode(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            MethodItemEntry::Opcode(_) => "MFLOW_OPCODE",
            MethodItemEntry::DexOpcode(_) => "MFLOW_DEX_OPCODE",
            MethodItemEntry::Try(_) => "MFLOW_TRY",
            MethodItemEntry::Catch(_) => "MFLOW_CATCH",
            MethodItemEntry::Target(_) => "MFLOW_TARGET",
            MethodItemEntry::Position(_) => "MFLOW_POSITION",
            MethodItemEntry::Debug(_) => "MFLOW_DEBUG",
            MethodItemEntry::SourceBlock(_) => "MFLOW_SOURCE_BLOCK",
            MethodItemEntry::Fallthrough => "MFLOW_FALLTHROUGH",
        }
    }
}
