//! Instruction representation and method bodies.
//!
//! ```text
//! IRCode
//!  ├── registers_size
//!  ├── IRList ── MethodItemEntry ── OPCODE(IRInstruction)
//!  │                             ├── TRY / CATCH / TARGET
//!  │                             ├── POSITION / DEBUG / SOURCE_BLOCK
//!  │                             └── DEX_OPCODE (after lowering)
//!  └── Option<ControlFlowGraph>
//! ```
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`opcode`] | IR opcodes and their predicates |
//! | [`dex_opcode`] | encoded opcodes, formats, field widths |
//! | [`instruction`] | [`IRInstruction`] and operands |
//! | [`entry`] | [`MethodItemEntry`] and the non-instruction entries |
//! | [`list`] | arena-backed [`IRList`] |
//! | [`code`] | [`IRCode`] |
//! | [`assembler`] | s-expression assembler and printer |
//! | [`lower`] | encoding selection |
//! | [`checker`] | structural body checks |

pub mod assembler;
pub mod checker;
pub mod code;
pub mod dex_opcode;
pub mod entry;
pub mod instruction;
pub mod list;
pub mod lower;
pub mod opcode;

#[cfg(test)]
mod tests;

pub use assembler::{
    ircode_from_string, method_from_string, to_s_expr, AssemblerError, AssemblerResult,
};
pub use checker::{check_ir, IRCheckError};
pub use code::IRCode;
pub use dex_opcode::{DexOpcode, Format};
pub use entry::{
    BranchTarget, BranchTargetKind, CatchEntry, DexDebugInstruction, DexInstruction,
    DexPosition, MethodItemEntry, SourceBlock, SourceBlockValue, TryEntry, TryEntryKind,
};
pub use instruction::{pseudo_dest_bit_width, ArrayData, IRInstruction, Operand, Reg};
pub use list::{EntryId, IRList};
pub use lower::{lower_code, select_dex_opcode, select_dex_opcode_with_result, LowerError};
pub use opcode::{IROpcode, RefKind};
