//! Checkers run between passes for every property the pipeline claims.

use crate::cfg::ControlFlowGraph;
use crate::dex::DexClass;
use crate::ir::{IRCode, IROpcode, MethodItemEntry};
use crate::regalloc::check_legality;
use crate::walk;

use super::property::PropertyName;

pub trait PropertyChecker: Send + Sync {
    fn property(&self) -> PropertyName;

    /// Problems found in `scope`, in class order. Empty when the property
    /// holds.
    fn check(&self, scope: &[DexClass]) -> Vec<String>;
}

/// Every method body that fails `f`, as `"method: problem"` lines.
fn check_bodies<F>(scope: &[DexClass], f: F) -> Vec<String>
where
    F: Fn(&IRCode) -> Option<String> + Sync,
{
    walk::parallel::reduce_code(scope, |m, code| match f(code) {
        Some(problem) => vec![format!("{}: {}", m, problem)],
        None => Vec::new(),
    })
}

/// No instruction with a given opcode appears anywhere.
pub struct NoOpcodeChecker {
    property: PropertyName,
    opcode: IROpcode,
}

impl NoOpcodeChecker {
    pub fn init_class() -> Self {
        Self {
            property: PropertyName::NoInitClassInstructions,
            opcode: IROpcode::InitClass,
        }
    }

    pub fn write_barrier() -> Self {
        Self {
            property: PropertyName::NoWriteBarrierInstructions,
            opcode: IROpcode::WriteBarrier,
        }
    }
}

impl PropertyChecker for NoOpcodeChecker {
    fn property(&self) -> PropertyName {
        self.property
    }

    fn check(&self, scope: &[DexClass]) -> Vec<String> {
        check_bodies(scope, |code| {
            code.instructions()
                .find(|insn| insn.opcode() == self.opcode)
                .map(|insn| format!("found {}", insn))
        })
    }
}

pub struct NoUnreachableChecker;

impl PropertyChecker for NoUnreachableChecker {
    fn property(&self) -> PropertyName {
        PropertyName::NoUnreachableInstructions
    }

    fn check(&self, scope: &[DexClass]) -> Vec<String> {
        check_bodies(scope, |code| {
            let snapshot;
            let cfg = match code.cfg() {
                Some(cfg) => cfg,
                None => {
                    snapshot = ControlFlowGraph::build(code.list(), false).ok()?;
                    &snapshot
                }
            };
            let reachable = cfg.reachable_blocks();
            let found = cfg
                .blocks()
                .filter(|b| !reachable.contains(&b.id()))
                .find_map(|b| b.first_insn())
                .map(|(_, insn)| format!("unreachable {}", insn));
            found
        })
    }
}

pub struct HasSourceBlocksChecker;

impl PropertyChecker for HasSourceBlocksChecker {
    fn property(&self) -> PropertyName {
        PropertyName::HasSourceBlocks
    }

    fn check(&self, scope: &[DexClass]) -> Vec<String> {
        check_bodies(scope, |code| {
            let found = code
                .list()
                .iter()
                .any(|(_, e)| matches!(e, MethodItemEntry::SourceBlock(_)));
            (!found).then(|| "no source block".to_string())
        })
    }
}

pub struct RegistersAllocatedChecker;

impl PropertyChecker for RegistersAllocatedChecker {
    fn property(&self) -> PropertyName {
        PropertyName::RegistersAllocated
    }

    fn check(&self, scope: &[DexClass]) -> Vec<String> {
        walk::parallel::reduce_code(scope, |m, code| match check_legality(&m.to_string(), code) {
            Ok(()) => Vec::new(),
            Err(e) => vec![e.to_string()],
        })
    }
}

/// One checker per checkable property.
pub fn default_checkers() -> Vec<Box<dyn PropertyChecker>> {
    vec![
        Box::new(NoOpcodeChecker::init_class()),
        Box::new(NoOpcodeChecker::write_barrier()),
        Box::new(NoUnreachableChecker),
        Box::new(HasSourceBlocksChecker),
        Box::new(RegistersAllocatedChecker),
    ]
}
