//! Scripted backend for deterministic tests.
//!
//! Mirrors the real adapters' contract: a fake with the remote id rejects
//! unsanitized content and honours the call timeout.

use super::{AnalysisBackend, BackendError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::time::Duration;
use undertone_common::{
    AnalysisMode, AnalysisResult, BackendId, Content, Dimension, ErrorKind, EscalationStatus,
    Signal,
};

#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed(AnalysisResult),
    Fail(ErrorKind),
    /// Wait, then behave like the inner outcome
    Delay(Duration, Box<ScriptedOutcome>),
    /// Never return
    Hang,
}

pub struct FakeBackend {
    id: BackendId,
    outcomes: Mutex<Vec<ScriptedOutcome>>,
    seen: Mutex<Vec<Content>>,
}

impl FakeBackend {
    /// Outcomes are consumed in order; the last one repeats
    pub fn new(id: BackendId, outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            id,
            outcomes: Mutex::new(outcomes),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(id: BackendId, result: AnalysisResult) -> Self {
        Self::new(id, vec![ScriptedOutcome::Succeed(result)])
    }

    pub fn failing(id: BackendId, kind: ErrorKind) -> Self {
        Self::new(id, vec![ScriptedOutcome::Fail(kind)])
    }

    pub fn hanging(id: BackendId) -> Self {
        Self::new(id, vec![ScriptedOutcome::Hang])
    }

    /// Every content value this backend was asked to analyze
    pub fn seen(&self) -> Vec<Content> {
        match self.seen.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.seen().len()
    }

    fn next_outcome(&self) -> ScriptedOutcome {
        let mut outcomes = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match outcomes.len() {
            0 => ScriptedOutcome::Fail(ErrorKind::BackendUnavailable),
            1 => outcomes[0].clone(),
            _ => outcomes.remove(0),
        }
    }
}

async fn play(id: BackendId, outcome: ScriptedOutcome) -> Result<AnalysisResult, BackendError> {
    let mut outcome = outcome;
    loop {
        match outcome {
            ScriptedOutcome::Succeed(mut result) => {
                result.source = id;
                return Ok(result);
            }
            ScriptedOutcome::Fail(kind) => {
                return Err(BackendError::new(kind, format!("scripted {} failure", id)));
            }
            ScriptedOutcome::Delay(delay, inner) => {
                tokio::time::sleep(delay).await;
                outcome = *inner;
            }
            ScriptedOutcome::Hang => return std::future::pending().await,
        }
    }
}

#[async_trait]
impl AnalysisBackend for FakeBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    async fn analyze(
        &self,
        content: &Content,
        _mode: AnalysisMode,
        timeout: Duration,
    ) -> Result<AnalysisResult, BackendError> {
        match self.seen.lock() {
            Ok(mut guard) => guard.push(content.clone()),
            Err(poisoned) => poisoned.into_inner().push(content.clone()),
        }

        if !self.id.is_remote() {
            return play(self.id, self.next_outcome()).await;
        }

        if !content.is_sanitized() {
            return Err(BackendError::privacy_violation("unsanitized content"));
        }
        tokio::time::timeout(timeout, play(self.id, self.next_outcome()))
            .await
            .map_err(|_| BackendError::timeout(timeout))?
    }
}

/// A plausible result for tests: every dimension populated
pub fn canned_result(
    source: BackendId,
    overall_risk: u8,
    sarcasm_score: u8,
    confidence: f64,
) -> AnalysisResult {
    let mut strategic = Dimension::new();
    strategic.insert("powerDynamics".into(), Signal::label("balanced"));
    let mut emotional = Dimension::new();
    emotional.insert("tone".into(), Signal::label("neutral"));
    let mut relational = Dimension::new();
    relational.insert("trust".into(), Signal::Number(50.0));

    AnalysisResult {
        strategic,
        emotional,
        relational,
        overall_risk,
        sarcasm_score,
        confidence,
        source,
        recommendations: Vec::new(),
        timestamp: Utc::now(),
        escalation: EscalationStatus::NotNeeded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use undertone_common::sanitize;

    #[tokio::test]
    async fn test_outcomes_in_order_last_repeats() {
        let fake = FakeBackend::new(
            BackendId::LocalHeuristic,
            vec![
                ScriptedOutcome::Fail(ErrorKind::InvalidResponse),
                ScriptedOutcome::Succeed(canned_result(BackendId::Hybrid, 10, 0, 0.9)),
            ],
        );
        let content = Content::new("x");
        let first = fake.analyze(&content, AnalysisMode::Quick, Duration::ZERO).await;
        assert_eq!(first.unwrap_err().kind, ErrorKind::InvalidResponse);
        for _ in 0..2 {
            let ok = fake
                .analyze(&content, AnalysisMode::Quick, Duration::ZERO)
                .await
                .unwrap();
            assert_eq!(ok.source, BackendId::LocalHeuristic);
        }
        assert_eq!(fake.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_fake_honours_timeout() {
        let fake = FakeBackend::hanging(BackendId::RemoteEnhanced);
        let err = fake
            .analyze(
                &sanitize(&Content::new("x")),
                AnalysisMode::CloudOnly,
                Duration::from_millis(3000),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_remote_fake_rejects_raw_content() {
        let fake = FakeBackend::succeeding(
            BackendId::RemoteEnhanced,
            canned_result(BackendId::RemoteEnhanced, 10, 0, 0.9),
        );
        let err = fake
            .analyze(&Content::new("x"), AnalysisMode::Deep, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PrivacyViolation);
    }
}
