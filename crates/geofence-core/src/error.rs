//! Error types for the geofence engine
//!
//! Every user-facing failure surfaces through the reject path of a
//! [`PendingOperation`](crate::dispatch::PendingOperation) with a stable
//! [`ErrorKind`] and a human-readable message.
//!
//! ```rust
//! use geofence_core::dispatch::{OperationKind, PendingOperation};
//! use geofence_core::{Error, ErrorKind};
//!
//! let operation = PendingOperation::settled(
//!     1,
//!     OperationKind::Start,
//!     Err(Error::already_active("MONITORING")),
//! );
//! let err = tokio_test::block_on(operation).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::AlreadyActive);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for geofence operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a [`PlatformMonitor`](crate::traits::PlatformMonitor)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The user or OS refused location access
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The platform cannot watch this many regions at once
    #[error("Monitoring limit exceeded: requested {requested}, limit {limit}")]
    MonitoringLimitExceeded {
        /// Number of regions the engine asked for
        requested: usize,
        /// Maximum the platform supports
        limit: usize,
    },

    /// Region monitoring is not available on this device
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),
}

impl PlatformError {
    /// Create a permission denied error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a hardware unavailable error
    pub fn hardware_unavailable(msg: impl Into<String>) -> Self {
        Self::HardwareUnavailable(msg.into())
    }
}

/// Core error type for the geofence engine
#[derive(Error, Debug)]
pub enum Error {
    /// A region identifier appeared twice
    #[error("Duplicate region id: {0}")]
    DuplicateId(String),

    /// A region failed validation (radius, coordinates, empty id)
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Region lookup failed
    #[error("Region not found: {0}")]
    NotFound(String),

    /// Platform monitor failure
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Monitoring is already starting or running
    #[error("Monitoring already active (state: {0})")]
    AlreadyActive(String),

    /// A pending request was resolved more than once
    #[error("Request {0} already resolved")]
    DoubleResolution(u64),

    /// The engine task is gone or its command queue is full
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File access errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Stable error codes exposed to the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DuplicateId,
    InvalidRegion,
    NotFound,
    PermissionDenied,
    MonitoringLimitExceeded,
    HardwareUnavailable,
    AlreadyActive,
    DoubleResolution,
    EngineUnavailable,
    Config,
    Internal,
}

impl ErrorKind {
    /// The code string handed across the host boundary
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DuplicateId => "DUPLICATE_ID",
            ErrorKind::InvalidRegion => "INVALID_REGION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::MonitoringLimitExceeded => "MONITORING_LIMIT_EXCEEDED",
            ErrorKind::HardwareUnavailable => "HARDWARE_UNAVAILABLE",
            ErrorKind::AlreadyActive => "ALREADY_ACTIVE",
            ErrorKind::DoubleResolution => "DOUBLE_RESOLUTION",
            ErrorKind::EngineUnavailable => "ENGINE_UNAVAILABLE",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create a duplicate id error
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId(id.into())
    }

    /// Create an invalid region error
    pub fn invalid_region(msg: impl Into<String>) -> Self {
        Self::InvalidRegion(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create an already-active error
    pub fn already_active(state: impl Into<String>) -> Self {
        Self::AlreadyActive(state.into())
    }

    /// Create an engine unavailable error
    pub fn engine_unavailable(msg: impl Into<String>) -> Self {
        Self::EngineUnavailable(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Stable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateId(_) => ErrorKind::DuplicateId,
            Error::InvalidRegion(_) => ErrorKind::InvalidRegion,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Platform(PlatformError::PermissionDenied(_)) => ErrorKind::PermissionDenied,
            Error::Platform(PlatformError::MonitoringLimitExceeded { .. }) => {
                ErrorKind::MonitoringLimitExceeded
            }
            Error::Platform(PlatformError::HardwareUnavailable(_)) => {
                ErrorKind::HardwareUnavailable
            }
            Error::AlreadyActive(_) => ErrorKind::AlreadyActive,
            Error::DoubleResolution(_) => ErrorKind::DoubleResolution,
            Error::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) | Error::Json(_) | Error::Other(_) => ErrorKind::Internal,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
