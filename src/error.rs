//! Error types for the Node Composer
//!
//! Two disjoint classes of failure flow through the crate. User-correctable
//! constraint failures travel as [`Violations`]; everything else is a hard
//! fault carried by [`Error`] and aborts the surrounding transaction.

use crate::hardware::allocation::Violations;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the composer
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Allocation request rejected:\n{0}")]
    AllocationRequestProcessing(Violations),

    #[error("Remote drive request rejected:\n{0}")]
    RemoteDriveValidation(Violations),

    // =========================================================================
    // Inventory Errors
    // =========================================================================
    #[error("Entity not found: {kind}/{id}")]
    EntityNotFound { kind: String, id: String },

    #[error("Transaction conflict on {kind}/{id}: expected version {expected}, found {found}")]
    TransactionConflict {
        kind: String,
        id: String,
        expected: u64,
        found: u64,
    },

    // =========================================================================
    // Allocation Errors
    // =========================================================================
    #[error("No computer system matches the request for node {node_name}")]
    NoMatchingComputerSystem { node_name: String },

    #[error("Ethernet interfaces of computer system {computer_system} cannot be mapped: {reason}")]
    EthernetMappingFailed {
        computer_system: String,
        reason: String,
    },

    #[error("Strategy {strategy} used out of order: {reason}")]
    InvalidStrategyState { strategy: String, reason: String },

    // =========================================================================
    // Assembly Errors
    // =========================================================================
    #[error("Assembly task failed: {task} - {reason}")]
    AssemblyTaskFailed { task: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take when a unit of work fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Rerun the whole transaction with exponential backoff
    RetryWithBackoff,
    /// Retry after a specific duration
    RetryAfter(Duration),
    /// Surface to the caller, retrying cannot help
    NoRetry,
}

impl Error {
    pub(crate) fn not_found(kind: &str, id: impl ToString) -> Self {
        Error::EntityNotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Lost an optimistic race, rerun find + allocate
            Error::TransactionConflict { .. } => ErrorAction::RetryWithBackoff,

            // Assets may come back once discovery catches up
            Error::NoMatchingComputerSystem { .. } => {
                ErrorAction::RetryAfter(Duration::from_secs(60))
            }

            // The client has to change the request
            Error::AllocationRequestProcessing(_)
            | Error::RemoteDriveValidation(_)
            | Error::Configuration(_)
            | Error::JsonParse(_)
            | Error::YamlParse(_) => ErrorAction::NoRetry,

            // Staleness or logic faults
            Error::EntityNotFound { .. }
            | Error::EthernetMappingFailed { .. }
            | Error::InvalidStrategyState { .. }
            | Error::Internal(_) => ErrorAction::NoRetry,

            Error::AssemblyTaskFailed { .. } | Error::Io(_) => ErrorAction::RetryWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRetry)
    }

    /// Check if this error is transient, i.e. the same transaction may be rerun at once
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransactionConflict { .. })
    }

    /// User-facing violations carried by this error, if any
    pub fn violations(&self) -> Option<&Violations> {
        match self {
            Error::AllocationRequestProcessing(v) | Error::RemoteDriveValidation(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Violations> for Error {
    fn from(violations: Violations) -> Self {
        Error::AllocationRequestProcessing(violations)
    }
}

/// Result type alias for the composer
pub type Result<T> = std::result::Result<T, Error>;
