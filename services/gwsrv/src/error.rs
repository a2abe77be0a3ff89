//! Error handling for the gateway service
//!
//! Every fallible gateway operation returns [`GwError`]. The numeric code seen
//! by the upstream server is derived from the error kind through
//! [`GwError::code`], so typed and coded reporting cannot disagree.

use errors::{ErrorCategory, VoltageError, VoltageErrorTrait};
use thiserror::Error;

/// Upstream code for a successful operation
pub const CODE_OK: i32 = 0;
/// Upstream code for protocol-specific failures (range, transport during write, exception)
pub const CODE_PROTOCOL: i32 = 1;
/// Upstream code for general and connectivity failures
pub const CODE_GENERAL: i32 = -1;

/// Gateway Error Type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GwError {
    /// Downstream reference could not be parsed
    #[error("Invalid reference {reference}: {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Register address outside every supported range, or outside the range
    /// legal for the requested function
    #[error("Address {address} is outside supported ranges: {reason}")]
    InvalidAddress { address: u32, reason: String },

    /// Value cannot be encoded for the requested operation
    #[error("Invalid value '{0}'")]
    InvalidValue(String),

    /// No live connection to the device could be obtained
    #[error("No connection to {0}")]
    NoConnection(String),

    /// Connection lost while a request was in flight
    #[error("Transport error: {0}")]
    Transport(String),

    /// Device answered with an exception response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation not implemented by the adapter
    #[error("{0} is not supported")]
    Unsupported(String),

    /// No factory registered for the scheme
    #[error("Unknown scheme: {0}")]
    UnknownScheme(String),

    /// Upstream address has no configured reference
    #[error("Unknown IOA: {0}")]
    UnknownIoa(u32),

    /// Upstream address registered twice
    #[error("Duplicate IOA: {0}")]
    DuplicateIoa(u32),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for the gateway service
pub type Result<T> = std::result::Result<T, GwError>;

impl GwError {
    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        GwError::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_address(address: u32, reason: impl Into<String>) -> Self {
        GwError::InvalidAddress {
            address,
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        GwError::Config(msg.into())
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        GwError::Unsupported(operation.into())
    }

    /// Numeric code reported upstream: `0` success, `>0` protocol-specific,
    /// `<0` general or connectivity failure
    pub fn code(&self) -> i32 {
        match self {
            GwError::InvalidAddress { .. } | GwError::Transport(_) | GwError::Protocol(_) => {
                CODE_PROTOCOL
            },
            _ => CODE_GENERAL,
        }
    }
}

/// Collapse an operation result into its upstream code
pub fn result_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => CODE_OK,
        Err(e) => e.code(),
    }
}

// ============================================================================
// Conversion from GwError to VoltageError for the process boundary
// ============================================================================

impl From<GwError> for VoltageError {
    fn from(err: GwError) -> Self {
        match err {
            GwError::Config(msg) => VoltageError::Configuration(msg),
            GwError::InvalidReference { reference, reason } => VoltageError::InvalidConfig {
                field: reference,
                reason,
            },
            GwError::DuplicateIoa(ioa) => VoltageError::InvalidConfig {
                field: ioa.to_string(),
                reason: "duplicate IOA".to_string(),
            },
            GwError::UnknownIoa(ioa) => VoltageError::PointNotFound {
                point_type: "ioa".to_string(),
                point_id: ioa,
            },
            GwError::InvalidAddress { .. } | GwError::InvalidValue(_) => {
                VoltageError::Validation(err.to_string())
            },
            GwError::NoConnection(endpoint) => VoltageError::ConnectionFailed {
                endpoint,
                reason: "no connection".to_string(),
            },
            GwError::Transport(msg) => VoltageError::Communication(msg),
            GwError::Protocol(msg) => VoltageError::Protocol {
                protocol: "gwsrv".to_string(),
                message: msg,
            },
            GwError::Unsupported(_) | GwError::UnknownScheme(_) => {
                VoltageError::Validation(err.to_string())
            },
        }
    }
}

// ============================================================================
// GwError implements VoltageErrorTrait
// ============================================================================

impl VoltageErrorTrait for GwError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidReference { .. } => "GWSRV_INVALID_REFERENCE",
            Self::InvalidAddress { .. } => "GWSRV_INVALID_ADDRESS",
            Self::InvalidValue(_) => "GWSRV_INVALID_VALUE",
            Self::NoConnection(_) => "GWSRV_NO_CONNECTION",
            Self::Transport(_) => "GWSRV_TRANSPORT_ERROR",
            Self::Protocol(_) => "GWSRV_PROTOCOL_ERROR",
            Self::Unsupported(_) => "GWSRV_UNSUPPORTED",
            Self::UnknownScheme(_) => "GWSRV_UNKNOWN_SCHEME",
            Self::UnknownIoa(_) => "GWSRV_UNKNOWN_IOA",
            Self::DuplicateIoa(_) => "GWSRV_DUPLICATE_IOA",
            Self::Config(_) => "GWSRV_CONFIG_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidReference { .. } | Self::Config(_) | Self::DuplicateIoa(_) => {
                ErrorCategory::Configuration
            },
            Self::InvalidAddress { .. } | Self::InvalidValue(_) | Self::Unsupported(_) => {
                ErrorCategory::Validation
            },
            Self::NoConnection(_) => ErrorCategory::Connection,
            Self::Transport(_) => ErrorCategory::Network,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::UnknownScheme(_) | Self::UnknownIoa(_) => ErrorCategory::NotFound,
        }
    }
}
