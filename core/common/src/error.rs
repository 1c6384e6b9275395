//! Common error types for Lagoon.

use thiserror::Error;

/// Top-level error type for Lagoon operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A prerequisite check or one-time setup step failed.
    #[error("Prerequisite checks and actions failed for '{repo}': {reason}")]
    Preflight { repo: String, reason: String },

    /// Transferring content from the upstream source failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Creating, publishing or retiring a snapshot failed.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Build a preflight error for the given repository.
    pub fn preflight(repo: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Preflight {
            repo: repo.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
