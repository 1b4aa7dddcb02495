//! Error types for the ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Duplicate event delivery is deliberately not represented here: it is a
/// defined successful outcome, reported as [`crate::IngestStatus::Duplicate`].
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Malformed or unknown event fields, rejected before any write
    #[error("Validation failure: {0}")]
    Validation(String),

    /// Event not found
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// Payout not found
    #[error("Payout not found: {0}")]
    PayoutNotFound(String),

    /// Referential or state conflict (e.g. bad payout link, terminal
    /// status transition); the transaction is rolled back
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invariant violation (items sum, overdrafted reservation, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
