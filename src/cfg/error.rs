//! Error types for CFG construction and editing.

/// CFG error types
#[derive(Debug, Clone, PartialEq)]
pub enum CfgError {
    /// Editing call on a CFG built without `editable`
    NotEditable,
    /// `TRY_END` without a matching `TRY_START`, or a region never closed
    UnbalancedTry,
    /// `TRY_START` inside an open try region
    NestedTry,
    /// A catch chain link that is not a catch entry
    BadCatchChain,
    /// Branch instruction without its target(s)
    MissingTarget(String),
    /// Control reaches the end of the body without a return or throw
    FallsOffEnd(String),
    /// A move-result that does not directly follow its producer
    MisplacedMoveResult(String),
    /// `load-param` after the parameter block
    NonContiguousLoadParams(String),
    /// Entry kind that a CFG cannot hold
    UnexpectedEntry(&'static str),
    /// Position that names no instruction
    NoSuchInsn,
    /// Edit that would break a body invariant
    InvalidEdit(String),
}

impl std::fmt::Display for CfgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotEditable => write!(f, "CFG is not editable"),
            Self::UnbalancedTry => write!(f, "Unbalanced try region"),
            Self::NestedTry => write!(f, "Nested try region"),
            Self::BadCatchChain => write!(f, "Catch chain links to a non-catch entry"),
            Self::MissingTarget(i) => write!(f, "Branch without target: {}", i),
            Self::FallsOffEnd(i) => write!(f, "Control falls off the end after {}", i),
            Self::MisplacedMoveResult(i) => write!(f, "Misplaced move-result: {}", i),
            Self::NonContiguousLoadParams(i) => {
                write!(f, "load-param outside the parameter block: {}", i)
            }
            Self::UnexpectedEntry(kind) => write!(f, "Unexpected {} entry", kind),
            Self::NoSuchInsn => write!(f, "No instruction at position"),
            Self::InvalidEdit(m) => write!(f, "Invalid edit: {}", m),
        }
    }
}

impl std::error::Error for CfgError {}

/// Result type for CFG operations
pub type CfgResult<T> = Result<T, CfgError>;
