use thiserror::Error;

use crate::client::storage::StorageError;

/// Failures surfaced to callers of the session gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Credential storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Failures of a single transport round trip
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("Unreadable response body: {0}")]
    Body(String),
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        GatewayError::NetworkUnavailable(err.to_string())
    }
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network(err.to_string())
    }
}
