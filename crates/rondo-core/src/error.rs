//! Error types for rondo

use thiserror::Error;

/// Main error type for rondo
#[derive(Error, Debug)]
pub enum RondoError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream address could not be used
    #[error("Invalid upstream address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// No upstream survived startup
    #[error("No upstream addresses available")]
    EmptyPool,

    /// Every upstream is currently marked dead
    #[error("No available upstream")]
    NoAvailableTarget,

    /// Request could not be dispatched to any upstream
    #[error("Service Unavailable")]
    ServiceUnavailable,

    /// Upstream failed while relaying a request
    #[error("Forwarding error: {0}")]
    Forwarding(String),

    /// Health probe failed to connect or respond
    #[error("Probe error: {0}")]
    Probe(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for rondo operations
pub type RondoResult<T> = Result<T, RondoError>;

impl RondoError {
    /// Build an `InvalidAddress` error
    pub fn invalid_address(address: impl Into<String>, reason: impl ToString) -> Self {
        RondoError::InvalidAddress {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for RondoError {
    fn from(err: toml::de::Error) -> Self {
        RondoError::Config(err.to_string())
    }
}
