//! Method bodies.

use std::fmt;

use super::entry::MethodItemEntry;
use super::instruction::{IRInstruction, Reg};
use super::list::IRList;
use crate::cfg::{CfgResult, ControlFlowGraph};

/// A method body: an entry list plus the size of its register frame.
///
/// While an editable CFG is built the CFG owns the instructions and the list
/// is empty; [`IRCode::clear_cfg`] writes them back.
#[derive(Debug, Clone)]
pub struct IRCode {
    list: IRList,
    registers_size: u32,
    cfg: Option<ControlFlowGraph>,
}

impl IRCode {
    pub fn new(list: IRList, registers_size: u32) -> Self {
        Self {
            list,
            registers_size,
            cfg: None,
        }
    }

    /// Build a body from plain instructions, sizing the frame to fit them.
    pub fn from_instructions(insns: impl IntoIterator<Item = IRInstruction>) -> Self {
        let list: IRList = insns.into_iter().map(MethodItemEntry::Opcode).collect();
        let registers_size = frame_size_of(list.instructions());
        Self::new(list, registers_size)
    }

    pub fn registers_size(&self) -> u32 {
        self.registers_size
    }

    pub fn set_registers_size(&mut self, size: u32) {
        self.registers_size = size;
    }

    /// A fresh register never used before in this body.
    pub fn allocate_temp(&mut self) -> Reg {
        let reg = self.registers_size;
        self.registers_size += 1;
        reg
    }

    /// A fresh register pair.
    pub fn allocate_wide_temp(&mut self) -> Reg {
        let reg = self.registers_size;
        self.registers_size += 2;
        reg
    }

    pub fn list(&self) -> &IRList {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut IRList {
        &mut self.list
    }

    pub fn build_cfg(&mut self, editable: bool) -> CfgResult<()> {
        if self.editable_cfg_built() {
            return Ok(());
        }
        let cfg = ControlFlowGraph::build(&self.list, editable)?;
        if editable {
            self.list = IRList::new();
        }
        self.cfg = Some(cfg);
        Ok(())
    }

    /// Drop the CFG; an editable one is linearized back into the list first.
    pub fn clear_cfg(&mut self) {
        if let Some(cfg) = self.cfg.take() {
            if cfg.editable() {
                self.list = cfg.linearize();
            }
        }
    }

    pub fn cfg_built(&self) -> bool {
        self.cfg.is_some()
    }

    pub fn editable_cfg_built(&self) -> bool {
        self.cfg.as_ref().is_some_and(|c| c.editable())
    }

    pub fn cfg(&self) -> Option<&ControlFlowGraph> {
        self.cfg.as_ref()
    }

    pub fn cfg_mut(&mut self) -> Option<&mut ControlFlowGraph> {
        self.cfg.as_mut()
    }

    /// Instructions in order, from the editable CFG when one is built.
    pub fn instructions(&self) -> Box<dyn Iterator<Item = &IRInstruction> + '_> {
        match &self.cfg {
            Some(cfg) if cfg.editable() => Box::new(cfg.instructions().map(|(_, insn)| insn)),
            _ => Box::new(self.list.instructions()),
        }
    }

    /// Number of instructions that reach the output.
    pub fn count_opcodes(&self) -> usize {
        self.instructions()
            .filter(|insn| !insn.opcode().is_internal())
            .count()
    }

    /// The leading `load-param*` instructions.
    pub fn get_param_instructions(&self) -> Vec<IRInstruction> {
        self.instructions()
            .take_while(|insn| insn.opcode().is_load_param())
            .cloned()
            .collect()
    }

    /// Register words taken by the parameters.
    pub fn param_words(&self) -> u32 {
        self.get_param_instructions()
            .iter()
            .map(|insn| if insn.dest_is_wide() { 2 } else { 1 })
            .sum()
    }

    /// Recompute the frame size from the registers in use.
    pub fn recompute_registers_size(&mut self) {
        self.registers_size = frame_size_of(self.instructions());
    }
}

/// Smallest frame holding every register mentioned by `insns`.
pub fn frame_size_of<'a>(insns: impl Iterator<Item = &'a IRInstruction>) -> u32 {
    let mut size = 0;
    for insn in insns {
        if let Some(d) = insn.dest() {
            size = size.max(d + if insn.dest_is_wide() { 2 } else { 1 });
        }
        for (i, s) in insn.srcs().iter().enumerate() {
            size = size.max(s + if insn.src_is_wide(i) { 2 } else { 1 });
        }
    }
    size
}

impl fmt::Display for IRCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cfg {
            Some(cfg) if cfg.editable() => {
                f.write_str(&super::assembler::to_s_expr(&cfg.linearize()))
            }
            _ => f.write_str(&super::assembler::to_s_expr(&self.list)),
        }
    }
}
