//! Backend Adapters
//!
//! One async contract over every analysis backend:
//! - [`generative::GenerativeBackend`]: on-device model, JSON-shaped output
//! - [`heuristic::HeuristicBackend`]: fixed lexicons, deterministic
//! - [`remote::RemoteBackend`]: network call, sanitized content only
//!
//! Fakes live next to the real implementations so tests never touch the
//! network or a model server.

pub mod fake;
pub mod fallback;
pub mod generative;
pub mod heuristic;
pub mod remote;
mod wire;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use undertone_common::{AnalysisMode, AnalysisResult, BackendId, Content, ErrorKind};

pub use fake::{canned_result, FakeBackend, ScriptedOutcome};
pub use fallback::ultimate_fallback;
pub use generative::{FakeGenerativeModel, GenerativeBackend, GenerativeModel, OllamaModel};
pub use heuristic::HeuristicBackend;
pub use remote::{FakeTransport, HttpTransport, RemoteBackend, RemoteTransport};

// ============================================================================
// Errors
// ============================================================================

/// Failure of a single backend call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    pub fn remote_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteUnavailable, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    pub fn privacy_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PrivacyViolation, message)
    }
}

// ============================================================================
// Backend Trait
// ============================================================================

/// Uniform analysis contract.
///
/// `timeout` bounds any network or inference wait. Backends that never
/// suspend ignore it.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    fn id(&self) -> BackendId;

    async fn analyze(
        &self,
        content: &Content,
        mode: AnalysisMode,
        timeout: Duration,
    ) -> Result<AnalysisResult, BackendError>;
}

#[async_trait]
impl<B: AnalysisBackend + ?Sized> AnalysisBackend for Arc<B> {
    fn id(&self) -> BackendId {
        (**self).id()
    }

    async fn analyze(
        &self,
        content: &Content,
        mode: AnalysisMode,
        timeout: Duration,
    ) -> Result<AnalysisResult, BackendError> {
        (**self).analyze(content, mode, timeout).await
    }
}

/// The backends an orchestrator can route to, keyed by kind.
///
/// A missing slot behaves like a backend that always reports
/// `BackendUnavailable`.
#[derive(Clone, Default)]
pub struct BackendSet {
    pub generative: Option<Arc<dyn AnalysisBackend>>,
    pub heuristic: Option<Arc<dyn AnalysisBackend>>,
    pub remote: Option<Arc<dyn AnalysisBackend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generative(mut self, backend: impl AnalysisBackend + 'static) -> Self {
        self.generative = Some(Arc::new(backend));
        self
    }

    pub fn with_heuristic(mut self, backend: impl AnalysisBackend + 'static) -> Self {
        self.heuristic = Some(Arc::new(backend));
        self
    }

    pub fn with_remote(mut self, backend: impl AnalysisBackend + 'static) -> Self {
        self.remote = Some(Arc::new(backend));
        self
    }

    /// Only the deterministic heuristic backend
    pub fn local_only() -> Self {
        Self::new().with_heuristic(HeuristicBackend::new())
    }

    pub fn get(&self, id: BackendId) -> Option<&Arc<dyn AnalysisBackend>> {
        match id {
            BackendId::OnDeviceGenerative => self.generative.as_ref(),
            BackendId::LocalHeuristic => self.heuristic.as_ref(),
            BackendId::RemoteEnhanced => self.remote.as_ref(),
            BackendId::Hybrid | BackendId::UltimateFallback => None,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }
}

impl std::fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSet")
            .field("generative", &self.generative.is_some())
            .field("heuristic", &self.heuristic.is_some())
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackendError::timeout(Duration::from_millis(3000));
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.to_string(), "timeout: no response within 3000ms");
    }

    #[test]
    fn test_backend_set_lookup() {
        let set = BackendSet::local_only();
        assert!(set.get(BackendId::LocalHeuristic).is_some());
        assert!(set.get(BackendId::RemoteEnhanced).is_none());
        assert!(set.get(BackendId::Hybrid).is_none());
        assert!(!set.has_remote());
    }
}
