//! Error types for the persistence layer.
//!
//! This module defines all error types used by the store abstraction and the
//! reconciliation components, following a hierarchy that separates connection
//! errors, backend errors, provisioning errors and index errors.
//!
//! Only [`ConnectionError`] and [`ProvisioningError`] are fatal to a full
//! initialization run. The other components catch everything at their
//! boundary, log it, and degrade.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Connection state errors
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Collection provisioning errors
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// Index management errors
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl StorageError {
    /// Returns `true` for errors that mean the store cannot be reached at all.
    ///
    /// These are never retried by the reconcilers.
    pub fn is_connection_unavailable(&self) -> bool {
        matches!(
            self,
            StorageError::Connection(_)
                | StorageError::Backend(BackendError::ConnectionFailed { .. })
        )
    }

    /// Returns `true` if repeating the operation might succeed.
    pub fn is_retryable(&self) -> bool {
        !self.is_connection_unavailable()
    }
}

/// Errors related to the process-wide connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// An operation was attempted before `connect` succeeded or after `close`.
    #[error("not connected to the document store")]
    NotConnected,

    /// Dialing the store failed.
    #[error("failed to connect to {uri}: {message}")]
    DialFailed { uri: String, message: String },

    /// TLS material could not be used.
    #[error("invalid TLS configuration: {message}")]
    InvalidTls { message: String },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Command or query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Errors raised while making sure a collection exists.
#[derive(Error, Debug)]
pub enum ProvisioningError {
    /// All attempts to create the collection failed.
    #[error("failed to provision collection {collection} after {attempts} attempts: {message}")]
    RetriesExhausted {
        collection: String,
        attempts: u32,
        message: String,
    },
}

/// Errors related to index management.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The store refused an index definition.
    #[error("index {index} on {collection} rejected: {message}")]
    Rejected {
        collection: String,
        index: String,
        message: String,
    },

    /// An index with the same name but different options already exists.
    #[error("index {index} on {collection} already exists with different options")]
    Conflict { collection: String, index: String },

    /// The named index does not exist.
    #[error("index {index} not found on {collection}")]
    NotFound { collection: String, index: String },
}

/// Errors related to configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or more configuration values are invalid.
    #[error("invalid configuration: {}", .errors.join("; "))]
    Invalid { errors: Vec<String> },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        let backend_name = "mongodb".to_string();
        let unreachable = matches!(
            err.kind.as_ref(),
            ErrorKind::ServerSelection { .. }
                | ErrorKind::Io(_)
                | ErrorKind::ConnectionPoolCleared { .. }
        );
        if unreachable {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name,
                message: err.to_string(),
            })
        } else {
            StorageError::Backend(BackendError::Internal {
                backend_name,
                message: err.to_string(),
                source: Some(Box::new(err)),
            })
        }
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::bson::document::ValueAccessError> for StorageError {
    fn from(err: mongodb::bson::document::ValueAccessError) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}
