//! Register map error types

use thiserror::Error;

/// Result type for register-map operations
pub type Result<T> = std::result::Result<T, RegisterError>;

/// Register map, codec and transport errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegisterError {
    /// Decoder was handed the wrong number of words (catalog bug)
    #[error("Invalid word count: expected {expected}, got {actual}")]
    InvalidWordCount { expected: usize, actual: usize },

    /// Word order token outside HI_LO / LO_HI
    #[error("Invalid word order '{0}' (use HI_LO or LO_HI)")]
    InvalidWordOrder(String),

    /// Span requested over no variables
    #[error("Empty variable selection")]
    EmptySelection,

    /// Profile name not present in the map
    #[error("Unknown profile '{name}'. Available: {available:?}")]
    UnknownProfile {
        name: String,
        available: Vec<String>,
    },

    /// Variable name not present in the catalog
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// Malformed catalog or profile entry
    #[error("Invalid register spec '{name}': {reason}")]
    InvalidSpec { name: String, reason: String },

    /// Write refused by the catalog (read-only variable, bad value)
    #[error("Write refused for '{name}': {reason}")]
    AccessDenied { name: String, reason: String },

    /// Flag name not declared in the variable's bit map
    #[error("Unknown flag '{flag}' for '{name}'")]
    UnknownFlag { name: String, flag: String },

    /// Engineering value cannot be encoded into the register width
    #[error("Out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        value: String,
        min: String,
        max: String,
    },

    /// Holding register read failed after all attempts
    #[error("Read failed at address {address} (count {count}): {reason}")]
    ReadFailed {
        address: i64,
        count: u16,
        reason: String,
    },

    /// Holding register write failed after all attempts
    #[error("Write failed at address {address}: {reason}")]
    WriteFailed { address: i64, reason: String },

    /// Register map file could not be parsed
    #[error("Register map parse error: {0}")]
    Parse(String),
}

impl RegisterError {
    /// Setup defects: surfaced to the operator, never retried
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidWordCount { .. }
                | Self::InvalidWordOrder(_)
                | Self::EmptySelection
                | Self::UnknownProfile { .. }
                | Self::UnknownVariable(_)
                | Self::InvalidSpec { .. }
                | Self::AccessDenied { .. }
                | Self::UnknownFlag { .. }
                | Self::OutOfRange { .. }
                | Self::Parse(_)
        )
    }

    /// Device/link errors that a later attempt may not hit
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ReadFailed { .. } | Self::WriteFailed { .. }
        )
    }

    pub(crate) fn invalid_spec(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_yaml::Error> for RegisterError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
