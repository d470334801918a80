//! Error types for the WiFi provisioning service

use thiserror::Error;

use super::types::SessionState;

/// Result type for link driver operations
pub type LinkResult<T> = Result<T, LinkError>;

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for custom data endpoint handlers
pub type EndpointResult<T> = Result<T, EndpointError>;

/// Errors related to link driver operations
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    #[error("hardware identity unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("association failed: {0}")]
    AssociationFailed(String),

    #[error("link driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("invalid SSID: {0}")]
    InvalidSsid(String),
}

/// Errors related to the provisioning lifecycle
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("provisioning session already active")]
    AlreadyActive,

    #[error("provisioning transport failed to initialize: {0}")]
    InitFailure(#[source] TransportError),

    #[error("no active provisioning session")]
    NoActiveSession,

    #[error("association already in progress")]
    AssociationInProgress,

    #[error("endpoint \"{0}\" already registered")]
    DuplicateEndpoint(String),

    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
}

/// Errors related to the provisioning transport layer
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("BLE error: {0}")]
    Ble(String),

    #[error("session closed")]
    SessionClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by custom data endpoint handlers
///
/// `OutOfMemory` is the only failure a handler itself may report; it fails
/// that single exchange and leaves the session running. `Unbound` covers
/// requests to an endpoint that was declared but never given a handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("no handler bound for endpoint \"{0}\"")]
    Unbound(String),
}
