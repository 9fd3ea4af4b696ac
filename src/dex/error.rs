//! Error types for the symbol tables.

/// Symbol table error types
#[derive(Debug, Clone, PartialEq)]
pub enum DexError {
    /// Malformed type descriptor
    InvalidDescriptor(String),
    /// Malformed `LClass;.name:type` member descriptor
    InvalidMemberDescriptor(String),
    /// A class is already registered for the type
    DuplicateClass(String),
    /// The reference has no definition
    NotADefinition(String),
    /// The reference was already promoted with incompatible attributes
    DefinitionMismatch(String),
}

impl std::fmt::Display for DexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDescriptor(d) => write!(f, "Invalid type descriptor: {}", d),
            Self::InvalidMemberDescriptor(d) => write!(f, "Invalid member descriptor: {}", d),
            Self::DuplicateClass(t) => write!(f, "Class already defined for type {}", t),
            Self::NotADefinition(m) => write!(f, "Not a definition: {}", m),
            Self::DefinitionMismatch(m) => {
                write!(f, "Definition does not match earlier promotion: {}", m)
            }
        }
    }
}

impl std::error::Error for DexError {}

/// Result type for symbol table operations
pub type DexResult<T> = Result<T, DexError>;
