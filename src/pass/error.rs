//! Error types for the pass pipeline.

use crate::config::ConfigError;
use crate::ir::IRCheckError;
use crate::regalloc::AllocError;

use super::property::PropertyName;

/// Pipeline error types
#[derive(Debug)]
pub enum PassError {
    /// The pipeline or a pass option could not be bound
    Config(ConfigError),
    /// A pipeline entry names no registered pass
    UnknownPass(String),
    /// A pass requires a property no earlier pass establishes
    UnsatisfiedRequirement { pass: String, property: PropertyName },
    /// A property the pipeline claims to hold does not
    PropertyCheck {
        pass: String,
        property: PropertyName,
        message: String,
    },
    /// A body is malformed after a pass
    IrCheck { pass: String, error: IRCheckError },
    Alloc(AllocError),
    Io(std::io::Error),
    /// A pass returned an error; the run was aborted
    PassFailed { pass: String, source: Box<PassError> },
}

impl std::fmt::Display for PassError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{}", e),
            Self::UnknownPass(name) => write!(f, "Unknown pass: {}", name),
            Self::UnsatisfiedRequirement { pass, property } => {
                write!(f, "{} requires {}, which is not established", pass, property)
            }
            Self::PropertyCheck {
                pass,
                property,
                message,
            } => write!(f, "{} does not hold after {}: {}", property, pass, message),
            Self::IrCheck { pass, error } => write!(f, "IR check failed after {}: {}", pass, error),
            Self::Alloc(e) => write!(f, "{}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::PassFailed { pass, source } => write!(f, "{} failed: {}", pass, source),
        }
    }
}

impl std::error::Error for PassError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::IrCheck { error, .. } => Some(error),
            Self::Alloc(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::PassFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<ConfigError> for PassError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<AllocError> for PassError {
    fn from(e: AllocError) -> Self {
        Self::Alloc(e)
    }
}

impl From<std::io::Error> for PassError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Result type for passes and the manager
pub type PassResult<T> = Result<T, PassError>;
