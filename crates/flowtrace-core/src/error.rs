//! Coordinator error taxonomy.
//!
//! One variant per caller-visible failure kind. Store-level failures are
//! folded into [`CoordinatorError::Internal`] at the store boundary; the
//! other variants are domain outcomes and never wrap a store error.

use flowtrace_store::StoreError;

/// Failure kinds surfaced by coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Caller input rejected before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced observer, association, or run does not exist (or was
    /// concurrently moved out of reach).
    #[error("not found: {0}")]
    NotFound(String),

    /// The observer already has a run in `ready` or `started` status.
    #[error("already active: {0}")]
    AlreadyActive(String),

    /// The run is already in a terminal status.
    #[error("already finished: {0}")]
    AlreadyFinished(String),

    /// The requested dependency-check policy is not satisfied.
    #[error("dependency not satisfied: {0}")]
    Dependency(String),

    /// Store failure or invariant breach; nothing the caller did wrong.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl CoordinatorError {
    /// Internal error with no underlying cause.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }
}

impl From<rusqlite::Error> for CoordinatorError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Internal {
            message: "store operation failed".into(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        Self::Internal {
            message: "store session failed".into(),
            source: Some(Box::new(err)),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CoordinatorError>;
