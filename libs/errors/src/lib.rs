//! Unified error handling for the MDW services
//!
//! Library crates keep their own domain errors (e.g. `RegisterError`); the
//! service layer converts them into [`MdwError`], which carries a category,
//! a stable error code and a process exit code.

use register_map::RegisterError;
use thiserror::Error;

// ============================================================================
// MdwError - Main error type
// ============================================================================

/// Main error type for the MDW services
#[derive(Debug, Error)]
pub enum MdwError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    // ======================================
    // Register map & codec Errors
    // ======================================
    #[error(transparent)]
    Register(RegisterError),

    // ======================================
    // Device & Communication Errors
    // ======================================
    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("No device answered: {0}")]
    NoDeviceFound(String),

    // ======================================
    // Validation Errors
    // ======================================
    #[error("Invalid parameter: {param}: {reason}")]
    InvalidParameter { param: String, reason: String },

    // ======================================
    // Output Errors
    // ======================================
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ======================================
    // Service & Runtime Errors
    // ======================================
    #[error("Service startup failed: {0}")]
    StartupFailed(String),
}

/// Result type alias using MdwError
pub type MdwResult<T> = Result<T, MdwError>;

impl MdwError {
    /// Process exit code for CLI commands
    ///
    /// 2 for configuration mistakes (including unknown profile or variable
    /// names), 3 when the device cannot be reached, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration | ErrorCategory::Validation | ErrorCategory::NotFound => 2,
            ErrorCategory::Connection | ErrorCategory::Protocol => 3,
            _ => 1,
        }
    }
}

// Conversion traits for common error types
impl From<RegisterError> for MdwError {
    fn from(err: RegisterError) -> Self {
        Self::Register(err)
    }
}

impl From<figment::Error> for MdwError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for MdwError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// ============================================================================
// Error classification
// ============================================================================

/// Error category enum - used for classification and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    Protocol,
    Connection,
    NotFound,
    Internal,
}

/// Shared error capability trait
///
/// Implemented by the service error and by the library errors it wraps, so
/// retry decisions read the same everywhere.
pub trait MdwErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs and CLI output)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether the error is retryable (default implementation is category-based)
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Connection | ErrorCategory::Protocol
        )
    }
}

impl MdwErrorTrait for RegisterError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidWordCount { .. } => "INVALID_WORD_COUNT",
            Self::InvalidWordOrder(_) => "INVALID_WORD_ORDER",
            Self::EmptySelection => "EMPTY_SELECTION",
            Self::UnknownProfile { .. } => "UNKNOWN_PROFILE",
            Self::UnknownVariable(_) => "UNKNOWN_VARIABLE",
            Self::InvalidSpec { .. } => "INVALID_SPEC",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::UnknownFlag { .. } => "UNKNOWN_FLAG",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::ReadFailed { .. } => "READ_FAILED",
            Self::WriteFailed { .. } => "WRITE_FAILED",
            Self::Parse(_) => "REGISTER_MAP_PARSE_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownProfile { .. } | Self::UnknownVariable(_) => ErrorCategory::NotFound,
            Self::AccessDenied { .. } | Self::UnknownFlag { .. } | Self::OutOfRange { .. } => {
                ErrorCategory::Validation
            },
            Self::ReadFailed { .. } | Self::WriteFailed { .. } => ErrorCategory::Protocol,
            Self::InvalidWordCount { .. }
            | Self::InvalidWordOrder(_)
            | Self::EmptySelection
            | Self::InvalidSpec { .. }
            | Self::Parse(_) => ErrorCategory::Configuration,
        }
    }
}

impl MdwErrorTrait for MdwError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::Register(e) => e.error_code(),
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::NoDeviceFound(_) => "NO_DEVICE_FOUND",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::StartupFailed(_) => "STARTUP_FAILED",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_)
            | Self::InvalidConfig { .. }
            | Self::ConfigNotFound(_) => ErrorCategory::Configuration,

            Self::Register(e) => e.category(),

            Self::ConnectionFailed { .. } | Self::NoDeviceFound(_) => ErrorCategory::Connection,

            Self::InvalidParameter { .. } => ErrorCategory::Validation,

            Self::Serialization(_) | Self::StartupFailed(_) => ErrorCategory::Internal,
        }
    }
}

// Tests
#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(MdwError::NoDeviceFound("scan".into()).is_retryable());
        assert!(MdwError::ConnectionFailed {
            endpoint: "/dev/ttyUSB0".into(),
            reason: "busy".into()
        }
        .is_retryable());
        assert!(!MdwError::Configuration("test".into()).is_retryable());

        let read: MdwError = RegisterError::ReadFailed {
            address: 10,
            count: 1,
            reason: "timeout".into(),
        }
        .into();
        assert!(read.is_retryable());
        assert_eq!(read.error_code(), "READ_FAILED");
    }

    #[test]
    fn test_register_error_categories() {
        let unknown: MdwError = RegisterError::UnknownProfile {
            name: "x".into(),
            available: vec![],
        }
        .into();
        assert_eq!(unknown.category(), ErrorCategory::NotFound);
        assert!(!unknown.is_retryable());

        let spec: MdwError = RegisterError::InvalidSpec {
            name: "a".into(),
            reason: "b".into(),
        }
        .into();
        assert_eq!(spec.category(), ErrorCategory::Configuration);
        assert_eq!(spec.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MdwError::ConfigNotFound("a.yaml".into()).exit_code(), 2);
        assert_eq!(MdwError::NoDeviceFound("scan".into()).exit_code(), 3);
        assert_eq!(MdwError::StartupFailed("x".into()).exit_code(), 1);
        let bad = MdwError::InvalidParameter {
            param: "stopbits".into(),
            reason: "3 not in 1..=2".into(),
        };
        assert_eq!(bad.category(), ErrorCategory::Validation);
        assert_eq!(bad.exit_code(), 2);
        let unknown: MdwError = RegisterError::UnknownVariable("foo".into()).into();
        assert_eq!(unknown.exit_code(), 2);
    }

    #[test]
    fn test_transparent_register_message() {
        let err: MdwError = RegisterError::UnknownVariable("foo".into()).into();
        assert_eq!(err.to_string(), "Unknown variable: foo");
    }
}
