//! Error taxonomy shared by every pipeline.
//!
//! Collaborator calls return `anyhow::Result` and pick up phase context with
//! `.context(..)`. The variants here cover the failures that carry a stable,
//! user-facing message the CLI prints as-is.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindsorError {
    /// Operation attempted before the project was set up.
    #[error("{0}")]
    ConfigState(String),

    /// A collaborator required by a non-skipped phase was never resolved.
    #[error("No {name} found")]
    MissingCollaborator { name: String },

    /// A context value was malformed or missing a required companion.
    #[error("{0}")]
    Validation(String),

    /// A resolved collaborator failed.
    /// The cause is rendered inline with its whole chain.
    #[error("{phase}: {cause:#}")]
    Collaborator { phase: String, cause: anyhow::Error },
}

impl WindsorError {
    pub fn config_state(message: impl Into<String>) -> Self {
        WindsorError::ConfigState(message.into())
    }

    pub fn missing(name: impl Into<String>) -> Self {
        WindsorError::MissingCollaborator { name: name.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        WindsorError::Validation(message.into())
    }

    pub fn collaborator(phase: impl Into<String>, cause: anyhow::Error) -> Self {
        WindsorError::Collaborator {
            phase: phase.into(),
            cause,
        }
    }
}

/// Unwraps an optional collaborator or fails with `No <name> found`.
pub fn require<T: Clone>(slot: &Option<T>, name: &str) -> Result<T, WindsorError> {
    slot.clone().ok_or_else(|| WindsorError::missing(name))
}
