//! Error types for the policy engine.
//!
//! Authorization decisions are never reported through [`Error`]; they are
//! [`AccessResult`](crate::core::AccessResult) values. This type covers
//! administrative mutations, storage and configuration.

use thiserror::Error;

/// The main error type for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Custom role with the given id was not found.
    #[error("Custom role '{0}' not found")]
    CustomRoleNotFound(String),

    /// Role template with the given id was not found.
    #[error("Role template '{0}' not found")]
    TemplateNotFound(String),

    /// Built-in templates cannot be modified or removed.
    #[error("Role template '{0}' is a system template")]
    SystemTemplate(String),

    /// Validation failed for provided input.
    #[error("Validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// The static permission catalog is inconsistent.
    #[error("Invalid permission catalog: {0}")]
    InvalidCatalog(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage operation failed.
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl Error {
    /// Build a validation error for a named field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
