//! Unified error handling for VoltageEMS services
//!
//! Service crates keep their own domain error types and convert into
//! [`VoltageError`] at the process boundary (`main`, bootstrap helpers).

use thiserror::Error;

// ============================================================================
// VoltageError - Main error type
// ============================================================================

/// Main error type for all VoltageEMS services
#[derive(Debug, Error)]
pub enum VoltageError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Protocol & Communication Errors
    // ======================================
    #[error("Protocol error: {protocol}: {message}")]
    Protocol { protocol: String, message: String },

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    // ======================================
    // Validation Errors
    // ======================================
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Point not found: {point_type}:{point_id}")]
    PointNotFound { point_type: String, point_id: u32 },

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Parse error: {file}: {error}")]
    ParseError { file: String, error: String },

    // ======================================
    // Catch-all for other errors
    // ======================================
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VoltageError
pub type VoltageResult<T> = Result<T, VoltageError>;

// ============================================================================
// VoltageError implements VoltageErrorTrait
// ============================================================================

impl VoltageErrorTrait for VoltageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",

            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::Communication(_) => "COMMUNICATION_ERROR",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",

            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PointNotFound { .. } => "POINT_NOT_FOUND",

            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::ParseError { .. } => "PARSE_ERROR",

            Self::Other(_) => "OTHER_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,

            Self::Protocol { .. } => ErrorCategory::Protocol,

            Self::ConnectionFailed { .. } => ErrorCategory::Connection,

            Self::Communication(_) => ErrorCategory::Network,

            Self::Validation(_) => ErrorCategory::Validation,

            Self::PointNotFound { .. } | Self::FileNotFound(_) => ErrorCategory::NotFound,

            Self::ParseError { .. } => ErrorCategory::Internal,

            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}

// ============================================================================
// VoltageEMS Error Trait - Architectural layer
// ============================================================================

/// Error category enum - used for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Network,

    // Business logic layer
    Validation,
    NotFound,

    // Protocol/communication layer
    Protocol,
    Connection,

    // System level
    Internal,

    // Others
    Unknown,
}

/// VoltageEMS error capability trait
///
/// Each service keeps its own domain-specific error type (e.g., `GwError`) and gains
/// a common interface by implementing this trait.
pub trait VoltageErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs and monitoring)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether the error is retryable (default implementation is category-based)
    fn is_transient(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Connection
        )
    }
}

// Tests
#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_categories() {
        let err = VoltageError::Configuration("missing section modbus".into());
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = VoltageError::Protocol {
            protocol: "modbus".into(),
            message: "illegal data address".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert!(!err.is_transient());
        assert!(err.to_string().contains("illegal data address"));
    }

    #[test]
    fn test_transient_categories() {
        let err = VoltageError::ConnectionFailed {
            endpoint: "10.0.0.3:502".into(),
            reason: "refused".into(),
        };
        assert!(err.is_transient());
        assert!(VoltageError::Communication("reset".into()).is_transient());
        assert!(!VoltageError::FileNotFound("config/gwsrv.toml".into()).is_transient());
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: VoltageError = anyhow::anyhow!("logger already set").into();
        assert_eq!(err.error_code(), "OTHER_ERROR");
        assert_eq!(err.category(), ErrorCategory::Unknown);
    }
}
