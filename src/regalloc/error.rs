//! Error types for register allocation.

use crate::cfg::CfgError;
use crate::ir::Reg;

/// Allocation error types
#[derive(Debug, Clone, PartialEq)]
pub enum AllocError {
    /// `allocate` was called without an editable CFG
    NoCfg(String),
    /// Two operands disagree on a register's kind or width
    TypeConflict { method: String, reg: Reg },
    /// Spilling did not converge within the configured rounds
    SpillLimit { method: String, rounds: u32 },
    /// An allocated instruction has no encoding
    IllegalEncoding { method: String, insn: String },
    /// A CFG edit failed while rewriting the body
    Cfg { method: String, error: CfgError },
}

impl std::fmt::Display for AllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCfg(m) => write!(f, "{}: register allocation needs an editable CFG", m),
            Self::TypeConflict { method, reg } => {
                write!(f, "{}: conflicting uses of v{}", method, reg)
            }
            Self::SpillLimit { method, rounds } => {
                write!(f, "{}: still spilling after {} rounds", method, rounds)
            }
            Self::IllegalEncoding { method, insn } => {
                write!(f, "{}: no encoding fits {}", method, insn)
            }
            Self::Cfg { method, error } => write!(f, "{}: {}", method, error),
        }
    }
}

impl std::error::Error for AllocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cfg { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Result type for register allocation
pub type AllocResult<T> = Result<T, AllocError>;

/// Attach the method name to a CFG error.
pub(crate) fn cfg_err(method: &str) -> impl Fn(CfgError) -> AllocError + '_ {
    move |error| AllocError::Cfg {
        method: method.to_string(),
        error,
    }
}
