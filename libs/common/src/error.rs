//! Custom error types for the common library
//!
//! This module defines the error type shared by the session-store
//! implementations, so callers can distinguish connectivity failures
//! from bad data without matching on backend-specific errors.

use redis::RedisError;
use thiserror::Error;

/// Custom error type for session-store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error occurred while connecting to the backing store
    #[error("Store connection error: {0}")]
    Connection(#[source] RedisError),

    /// Error occurred while executing a store command
    #[error("Store command error: {0}")]
    Command(#[source] RedisError),

    /// Stored record could not be serialized or deserialized
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Store configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Whether the store signalled a transient condition worth a single
    /// retry (Redis is loading its dataset or asks to try again).
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Connection(e) | StoreError::Command(e) => matches!(
                e.kind(),
                redis::ErrorKind::TryAgain | redis::ErrorKind::BusyLoadingError
            ),
            _ => false,
        }
    }
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;
