//! Errors that reach callers of the orchestrator.
//!
//! Backend failures never appear here; the cascade absorbs them.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// Content without sanitization was about to reach a remote backend
    #[error("privacy violation: {0}")]
    PrivacyViolation(String),

    #[error("analysis cancelled")]
    Cancelled,
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
