//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures, invalid state transitions and
//! malformed remote records.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid account key (email or alias)
    #[error("Invalid account key: {0}")]
    InvalidAccountKey(String),

    /// Invalid email address format
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Invalid remote file ID format
    #[error("Invalid remote file ID: {0}")]
    InvalidFileId(String),

    /// Invalid change-feed cursor
    #[error("Invalid sync cursor: {0}")]
    InvalidSyncCursor(String),

    /// A field of a remote record could not be interpreted
    #[error("Malformed remote record {id}: {reason}")]
    MalformedRecord {
        /// Remote identifier of the offending record
        id: String,
        /// What was wrong with it
        reason: String,
    },

    /// Unknown enum value read from storage or configuration
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// Name of the enum being parsed
        kind: &'static str,
        /// The rejected value
        value: String,
    },
}
