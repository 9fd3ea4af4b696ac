//! Structural checks on method bodies, run between passes.

use std::collections::BTreeMap;
use std::fmt;

use super::code::IRCode;
use super::entry::{BranchTargetKind, MethodItemEntry, TryEntryKind};
use super::instruction::IRInstruction;
use super::list::{EntryId, IRList};
use super::opcode::{IROpcode, RefKind};

/// A violated body invariant, naming the method and the offending instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct IRCheckError {
    pub method: String,
    pub insn: Option<String>,
    pub message: String,
}

impl fmt::Display for IRCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.insn {
            Some(insn) => write!(f, "{}: {} at {}", self.method, self.message, insn),
            None => write!(f, "{}: {}", self.method, self.message),
        }
    }
}

impl std::error::Error for IRCheckError {}

/// The `move-result-pseudo*` flavor a producer must be followed by.
pub fn expected_pseudo(producer: IROpcode) -> Option<IROpcode> {
    use IROpcode::*;
    if !producer.has_move_result_pseudo() {
        return None;
    }
    Some(match producer {
        AgetWide | IgetWide | SgetWide => MoveResultPseudoWide,
        AgetObject | IgetObject | SgetObject | ConstString | ConstClass | CheckCast
        | NewInstance | NewArray => MoveResultPseudoObject,
        _ => MoveResultPseudo,
    })
}

struct Checker<'a> {
    method: &'a str,
}

impl Checker<'_> {
    fn fail(&self, insn: Option<&IRInstruction>, message: impl Into<String>) -> IRCheckError {
        IRCheckError {
            method: self.method.to_string(),
            insn: insn.map(|i| i.to_string()),
            message: message.into(),
        }
    }

    fn check_list(&self, list: &IRList, registers_size: u32) -> Result<(), IRCheckError> {
        let mut targets: BTreeMap<EntryId, Vec<BranchTargetKind>> = BTreeMap::new();
        for (_, entry) in list.iter() {
            if let MethodItemEntry::Target(t) = entry {
                match list.get(t.src).and_then(|e| e.as_insn()) {
                    Some(insn) if insn.opcode().is_branch() => {
                        targets.entry(t.src).or_default().push(t.kind)
                    }
                    _ => return Err(self.fail(None, "branch target without a branch")),
                }
            }
        }

        let mut in_params = true;
        let mut prev: Option<&IRInstruction> = None;
        let mut open_try: Option<EntryId> = None;
        for (id, entry) in list.iter() {
            match entry {
                MethodItemEntry::Opcode(insn) => {
                    let op = insn.opcode();
                    if op.is_load_param() {
                        if !in_params {
                            return Err(self.fail(Some(insn), "load-param after the parameter block"));
                        }
                    } else {
                        in_params = false;
                    }
                    self.check_pairing(prev, insn)?;
                    self.check_operand(insn)?;
                    self.check_registers(insn, registers_size)?;
                    self.check_targets(insn, targets.get(&id))?;
                    prev = Some(insn);
                }
                MethodItemEntry::Try(t) => match (t.kind, open_try) {
                    (TryEntryKind::Start, None) => open_try = Some(t.catch_start),
                    (TryEntryKind::End, Some(c)) if c == t.catch_start => open_try = None,
                    _ => return Err(self.fail(prev, "unbalanced try region")),
                },
                MethodItemEntry::Catch(c) => {
                    if let Some(next) = c.next {
                        if !matches!(list.get(next), Some(MethodItemEntry::Catch(_))) {
                            return Err(self.fail(None, "catch chain points at a non-catch entry"));
                        }
                    }
                }
                MethodItemEntry::Target(_) => {
                    // A jump may not land between a producer and its result.
                    if prev.is_some_and(|p| p.has_move_result_pseudo()) {
                        return Err(self.fail(prev, "branch target splits a move-result-pseudo"));
                    }
                }
                _ => {}
            }
        }
        if let Some(p) = prev {
            if p.has_move_result_pseudo() {
                return Err(self.fail(Some(p), "missing move-result-pseudo"));
            }
        }
        if open_try.is_some() {
            return Err(self.fail(None, "try region is never closed"));
        }
        Ok(())
    }

    fn check_pairing(&self, prev: Option<&IRInstruction>, insn: &IRInstruction) -> Result<(), IRCheckError> {
        let op = insn.opcode();
        let prev_op = prev.map(|p| p.opcode());
        if let Some(expected) = prev_op.and_then(expected_pseudo) {
            if op != expected {
                return Err(self.fail(Some(insn), format!("expected {} after producer", expected)));
            }
            return Ok(());
        }
        if op.is_move_result_pseudo() {
            return Err(self.fail(Some(insn), "move-result-pseudo without a producer"));
        }
        if op.is_move_result() && !prev_op.is_some_and(|p| p.has_move_result()) {
            return Err(self.fail(Some(insn), "move-result without an invoke or filled-new-array"));
        }
        Ok(())
    }

    fn check_operand(&self, insn: &IRInstruction) -> Result<(), IRCheckError> {
        let ok = match insn.opcode().ref_kind() {
            RefKind::None => true,
            RefKind::Literal => insn.literal().is_some(),
            RefKind::String => insn.get_string().is_some(),
            RefKind::Type => insn.get_type().is_some(),
            RefKind::Field => insn.get_field().is_some(),
            RefKind::Method => insn.get_method().is_some(),
            RefKind::Data => insn.get_data().is_some(),
        };
        if !ok {
            return Err(self.fail(Some(insn), "operand does not match the opcode"));
        }
        if insn.opcode().has_dest() != insn.has_dest() {
            return Err(self.fail(Some(insn), "destination does not match the opcode"));
        }
        Ok(())
    }

    fn check_registers(&self, insn: &IRInstruction, registers_size: u32) -> Result<(), IRCheckError> {
        if let Some(d) = insn.dest() {
            let top = d + if insn.dest_is_wide() { 1 } else { 0 };
            if top >= registers_size {
                return Err(self.fail(Some(insn), format!("v{} outside frame of {}", top, registers_size)));
            }
        }
        for (i, &s) in insn.srcs().iter().enumerate() {
            let top = s + if insn.src_is_wide(i) { 1 } else { 0 };
            if top >= registers_size {
                return Err(self.fail(Some(insn), format!("v{} outside frame of {}", top, registers_size)));
            }
        }
        Ok(())
    }

    fn check_targets(&self, insn: &IRInstruction, kinds: Option<&Vec<BranchTargetKind>>) -> Result<(), IRCheckError> {
        let op = insn.opcode();
        let count = kinds.map_or(0, |k| k.len());
        if op.is_goto() || op.is_conditional_branch() {
            if count != 1 || kinds.is_some_and(|k| k[0] != BranchTargetKind::Simple) {
                return Err(self.fail(Some(insn), "branch needs exactly one simple target"));
            }
        } else if op.is_switch() {
            if kinds.is_some_and(|k| k.iter().any(|t| *t == BranchTargetKind::Simple)) {
                return Err(self.fail(Some(insn), "switch target without a case key"));
            }
        } else if count > 0 {
            return Err(self.fail(Some(insn), "target refers to a non-branch"));
        }
        Ok(())
    }
}

/// Check the body's structural invariants: load-params lead the body,
/// every producer is followed by its `move-result-pseudo*`, branches have
/// their targets, try regions are balanced, and all registers lie in the
/// frame.
pub fn check_ir(method: &str, code: &IRCode) -> Result<(), IRCheckError> {
    let checker = Checker { method };
    match code.cfg() {
        Some(cfg) if cfg.editable() => checker.check_list(&cfg.linearize(), code.registers_size()),
        _ => checker.check_list(code.list(), code.registers_size()),
    }
}
