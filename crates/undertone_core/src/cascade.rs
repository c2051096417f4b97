//! Fallback Cascade Executor
//!
//! One instance per request. Candidates come from [`plan_candidates`] and are
//! tried strictly in order, each at most once:
//!
//! ```text
//! Selecting -> Attempting(0) -> Succeeded
//!                  |
//!                  v
//!              Attempting(1) -> ... -> UltimateFallback -> Done
//! ```
//!
//! Every attempt is recorded as a [`CascadeAttempt`]. Failures advance to the
//! next candidate, except `PrivacyViolation`, which aborts the request.
//! Cancellation stops scheduling further candidates.

use crate::backends::{ultimate_fallback, AnalysisBackend, BackendError, BackendSet};
use crate::capabilities::Capabilities;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::timing::PerfSpan;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use undertone_common::redaction::content_contains_identifiers;
use undertone_common::{
    sanitize, AnalysisMode, AnalysisResult, BackendId, CascadeAttempt, Content, ErrorKind,
};

// ============================================================================
// Planning
// ============================================================================

/// Ordered candidate list for one request.
///
/// Generative before heuristic. The remote backend only enters the cascade
/// in `CloudOnly` mode, and only when permitted and reachable; in every
/// other mode it is reached through escalation.
pub fn plan_candidates(
    caps: &Capabilities,
    mode: AnalysisMode,
    remote_permitted: bool,
) -> Vec<BackendId> {
    let mut plan = Vec::with_capacity(3);
    if mode == AnalysisMode::CloudOnly && remote_permitted && caps.remote_reachable() {
        plan.push(BackendId::RemoteEnhanced);
    }
    if caps.on_device_generative {
        plan.push(BackendId::OnDeviceGenerative);
    }
    if caps.local_model {
        plan.push(BackendId::LocalHeuristic);
    }
    plan
}

// ============================================================================
// Outbound content
// ============================================================================

/// Raw request content plus its sanitized form, computed on first use.
///
/// Anything handed to a remote backend goes through [`OutboundContent::sanitized`].
pub(crate) struct OutboundContent<'a> {
    raw: &'a Content,
    sanitized: Option<Content>,
}

impl<'a> OutboundContent<'a> {
    pub(crate) fn new(raw: &'a Content) -> Self {
        Self {
            raw,
            sanitized: None,
        }
    }

    pub(crate) fn sanitized(&mut self) -> OrchestratorResult<&Content> {
        if self.sanitized.is_none() {
            let clean = sanitize(self.raw);
            if !clean.is_sanitized() || content_contains_identifiers(&clean) {
                error!("Sanitizer left identifiers in outbound content");
                return Err(OrchestratorError::PrivacyViolation(
                    "identifiers survived sanitization".to_string(),
                ));
            }
            self.sanitized = Some(clean);
        }
        match self.sanitized.as_ref() {
            Some(clean) => Ok(clean),
            None => Err(OrchestratorError::PrivacyViolation(
                "sanitized content unavailable".to_string(),
            )),
        }
    }

    /// The form of the content a given backend may see
    pub(crate) fn for_backend(&mut self, id: BackendId) -> OrchestratorResult<&Content> {
        if id.is_remote() {
            self.sanitized()
        } else {
            Ok(self.raw)
        }
    }
}

// ============================================================================
// Single attempt
// ============================================================================

/// Run one backend call, bounded by `timeout` and by cancellation.
///
/// The returned attempt record is already filled in. `Err` means the request
/// must stop: cancelled, or a privacy violation.
pub(crate) async fn run_attempt(
    backend: &dyn AnalysisBackend,
    content: &Content,
    mode: AnalysisMode,
    timeout: Duration,
    cancel: &CancellationToken,
) -> OrchestratorResult<(Result<AnalysisResult, BackendError>, CascadeAttempt)> {
    let id = backend.id();
    let span = PerfSpan::start(id.as_str());

    let call = tokio::time::timeout(timeout, backend.analyze(content, mode, timeout));
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(backend = %id, "Attempt abandoned");
            return Err(OrchestratorError::Cancelled);
        }
        outcome = call => outcome.unwrap_or_else(|_| Err(BackendError::timeout(timeout))),
    };
    let duration_ms = span.end();

    let attempt = match &outcome {
        Ok(_) => {
            debug!(backend = %id, duration_ms, "Backend succeeded");
            CascadeAttempt::success(id, duration_ms)
        }
        Err(e) => {
            match e.kind {
                ErrorKind::PrivacyViolation => {
                    error!(backend = %id, "Privacy violation: {}", e.message);
                    return Err(OrchestratorError::PrivacyViolation(e.message.clone()));
                }
                ErrorKind::InvalidResponse => {
                    warn!(backend = %id, duration_ms, error_kind = %e.kind, "Backend broke its response contract: {}", e.message)
                }
                _ => {
                    info!(backend = %id, duration_ms, error_kind = %e.kind, "Backend failed: {}", e.message)
                }
            }
            CascadeAttempt::failure(id, e.kind, duration_ms)
        }
    };
    Ok((outcome, attempt))
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CascadeState {
    Selecting,
    Attempting(usize),
    Succeeded {
        index: usize,
        result: Box<AnalysisResult>,
    },
    UltimateFallback,
    Done,
}

impl CascadeState {
    pub fn name(&self) -> &'static str {
        match self {
            CascadeState::Selecting => "selecting",
            CascadeState::Attempting(_) => "attempting",
            CascadeState::Succeeded { .. } => "succeeded",
            CascadeState::UltimateFallback => "ultimate_fallback",
            CascadeState::Done => "done",
        }
    }
}

/// What a finished cascade hands back to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOutcome {
    pub result: AnalysisResult,
    pub attempts: Vec<CascadeAttempt>,
    pub plan: Vec<BackendId>,
    /// Final result did not come from the first candidate
    pub used_fallback: bool,
}

impl CascadeOutcome {
    pub fn degraded(&self) -> bool {
        self.result.is_degraded()
    }

    /// Error kind of the remote attempt, if the cascade tried it and it failed
    pub fn remote_failure(&self) -> Option<ErrorKind> {
        self.attempts
            .iter()
            .rev()
            .find(|a| a.backend_id.is_remote())
            .and_then(|a| a.error_kind)
    }
}

pub struct CascadeExecutor<'a> {
    backends: &'a BackendSet,
    plan: Vec<BackendId>,
    remote_timeout: Duration,
    local_timeout: Duration,
    state: CascadeState,
    attempts: Vec<CascadeAttempt>,
}

impl<'a> CascadeExecutor<'a> {
    pub fn new(backends: &'a BackendSet, plan: Vec<BackendId>) -> Self {
        Self {
            backends,
            plan,
            remote_timeout: Duration::from_millis(3_000),
            local_timeout: Duration::from_millis(15_000),
            state: CascadeState::Selecting,
            attempts: Vec::new(),
        }
    }

    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn local_timeout(mut self, timeout: Duration) -> Self {
        self.local_timeout = timeout;
        self
    }

    pub fn plan(&self) -> &[BackendId] {
        &self.plan
    }

    pub fn state(&self) -> &CascadeState {
        &self.state
    }

    /// Drive the state machine to `Done`
    pub async fn run(
        self,
        content: &Content,
        mode: AnalysisMode,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<CascadeOutcome> {
        let mut outbound = OutboundContent::new(content);
        self.run_with(&mut outbound, mode, cancel).await
    }

    pub(crate) async fn run_with(
        mut self,
        outbound: &mut OutboundContent<'_>,
        mode: AnalysisMode,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<CascadeOutcome> {
        let mut finished: Option<(usize, AnalysisResult)> = None;

        loop {
            let current = std::mem::replace(&mut self.state, CascadeState::Done);
            trace!(state = current.name(), "Cascade step");

            self.state = match current {
                CascadeState::Selecting => {
                    debug!(plan = ?self.plan, "Cascade planned");
                    if self.plan.is_empty() {
                        CascadeState::UltimateFallback
                    } else {
                        CascadeState::Attempting(0)
                    }
                }
                CascadeState::Attempting(i) => {
                    if cancel.is_cancelled() {
                        return Err(OrchestratorError::Cancelled);
                    }
                    match self.attempt(i, outbound, mode, cancel).await? {
                        Some(result) => CascadeState::Succeeded {
                            index: i,
                            result: Box::new(result),
                        },
                        None if i + 1 < self.plan.len() => CascadeState::Attempting(i + 1),
                        None => CascadeState::UltimateFallback,
                    }
                }
                CascadeState::Succeeded { index, result } => {
                    finished = Some((index, *result));
                    CascadeState::Done
                }
                CascadeState::UltimateFallback => {
                    warn!(attempts = self.attempts.len(), "All candidates failed, using ultimate fallback");
                    finished = Some((self.plan.len(), ultimate_fallback()));
                    CascadeState::Done
                }
                CascadeState::Done => break,
            };
        }

        let (index, result) = finished.unwrap_or_else(|| (self.plan.len(), ultimate_fallback()));
        Ok(CascadeOutcome {
            result,
            attempts: self.attempts,
            plan: self.plan,
            used_fallback: index != 0,
        })
    }

    async fn attempt(
        &mut self,
        index: usize,
        outbound: &mut OutboundContent<'_>,
        mode: AnalysisMode,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<Option<AnalysisResult>> {
        let id = self.plan[index];
        let Some(backend) = self.backends.get(id) else {
            debug!(backend = %id, "No adapter registered");
            self.attempts
                .push(CascadeAttempt::failure(id, ErrorKind::BackendUnavailable, 0));
            return Ok(None);
        };

        let timeout = if id.is_remote() {
            self.remote_timeout
        } else {
            self.local_timeout
        };
        let content = outbound.for_backend(id)?;
        let (outcome, attempt) = run_attempt(backend.as_ref(), content, mode, timeout, cancel).await?;
        self.attempts.push(attempt);
        Ok(outcome.ok())
    }
}
