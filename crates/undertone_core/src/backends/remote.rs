//! Remote-enhanced backend.
//!
//! Only ever sees sanitized content: anything else is rejected with
//! `PrivacyViolation` before a byte leaves the process. Every call is bounded
//! by the caller's timeout; on expiry the in-flight request future is dropped,
//! which cancels it.

use super::wire::{parse_result, Required};
use super::{AnalysisBackend, BackendError};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use undertone_common::config::RemoteConfig;
use undertone_common::{AnalysisMode, AnalysisResult, BackendId, Content};

// ============================================================================
// Transport
// ============================================================================

/// Body sent to the remote service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePayload {
    pub content: Content,
    pub mode: AnalysisMode,
}

/// Status and body of a remote reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReply {
    pub status: u16,
    pub body: String,
}

impl RemoteReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Moves a payload to the remote service. Connection failures are
/// `RemoteUnavailable`; status handling belongs to the backend.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn send(&self, payload: &RemotePayload) -> Result<RemoteReply, BackendError>;
}

/// JSON over HTTPS
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn from_config(config: &RemoteConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::remote_unavailable(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim().to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn send(&self, payload: &RemotePayload) -> Result<RemoteReply, BackendError> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::remote_unavailable(format!("request failed: {}", e)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::remote_unavailable(format!("reading body failed: {}", e)))?;
        Ok(RemoteReply { status, body })
    }
}

/// Scripted transport for tests. Records every payload it receives.
pub struct FakeTransport {
    replies: Mutex<Vec<Result<RemoteReply, BackendError>>>,
    delay: Option<Duration>,
    seen: Mutex<Vec<RemotePayload>>,
}

impl FakeTransport {
    /// Replies are consumed in order; the last one repeats
    pub fn new(replies: Vec<Result<RemoteReply, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(body: impl Into<String>) -> Self {
        Self::new(vec![Ok(RemoteReply::ok(body))])
    }

    /// Never answers
    pub fn hanging() -> Self {
        Self::new(Vec::new()).with_delay(Duration::MAX)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seen(&self) -> Vec<RemotePayload> {
        match self.seen.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl RemoteTransport for FakeTransport {
    async fn send(&self, payload: &RemotePayload) -> Result<RemoteReply, BackendError> {
        match self.seen.lock() {
            Ok(mut guard) => guard.push(payload.clone()),
            Err(poisoned) => poisoned.into_inner().push(payload.clone()),
        }
        match self.delay {
            Some(delay) if delay == Duration::MAX => std::future::pending::<()>().await,
            Some(delay) => tokio::time::sleep(delay).await,
            None => {}
        }
        let mut replies = match self.replies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match replies.len() {
            0 => Err(BackendError::remote_unavailable("no scripted reply")),
            1 => replies[0].clone(),
            _ => replies.remove(0),
        }
    }
}

#[async_trait]
impl<T: RemoteTransport + ?Sized> RemoteTransport for Arc<T> {
    async fn send(&self, payload: &RemotePayload) -> Result<RemoteReply, BackendError> {
        (**self).send(payload).await
    }
}

// ============================================================================
// Backend
// ============================================================================

pub struct RemoteBackend {
    transport: Arc<dyn RemoteTransport>,
}

impl RemoteBackend {
    pub fn new(transport: impl RemoteTransport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self, BackendError> {
        Ok(Self::new(HttpTransport::from_config(config)?))
    }
}

#[async_trait]
impl AnalysisBackend for RemoteBackend {
    fn id(&self) -> BackendId {
        BackendId::RemoteEnhanced
    }

    async fn analyze(
        &self,
        content: &Content,
        mode: AnalysisMode,
        timeout: Duration,
    ) -> Result<AnalysisResult, BackendError> {
        if !content.is_sanitized() {
            return Err(BackendError::privacy_violation(
                "remote call attempted with unsanitized content",
            ));
        }

        let payload = RemotePayload {
            content: content.clone(),
            mode,
        };
        debug!(timeout_ms = timeout.as_millis() as u64, %mode, "Remote enhancement call");

        let reply = tokio::time::timeout(timeout, self.transport.send(&payload))
            .await
            .map_err(|_| BackendError::timeout(timeout))??;

        if !reply.is_success() {
            return Err(BackendError::remote_unavailable(format!(
                "HTTP {} from remote service",
                reply.status
            )));
        }

        let value: serde_json::Value = serde_json::from_str(&reply.body).map_err(|e| {
            warn!(error = %e, "Remote reply is not JSON");
            BackendError::invalid(format!("remote reply is not JSON: {}", e))
        })?;
        parse_result(&value, BackendId::RemoteEnhanced, Required::AllDimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use undertone_common::redaction::sanitize;
    use undertone_common::ErrorKind;

    const REPLY: &str = r#"{
        "strategic": {"powerDynamics": "high"},
        "emotional": {"tone": "sarcastic"},
        "relational": {"trust": 30},
        "overallRisk": 60, "sarcasmScore": 85, "confidence": 0.9
    }"#;

    fn clean(text: &str) -> Content {
        sanitize(&Content::new(text))
    }

    #[tokio::test]
    async fn test_rejects_unsanitized_content() {
        let transport = Arc::new(FakeTransport::replying(REPLY));
        let backend = RemoteBackend::new(Arc::clone(&transport));
        let err = backend
            .analyze(&Content::new("mail jane@example.com"), AnalysisMode::Deep, Duration::from_secs(3))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PrivacyViolation);
        assert!(transport.seen().is_empty());
    }

    #[tokio::test]
    async fn test_success_sends_sanitized_payload() {
        let transport = Arc::new(FakeTransport::replying(REPLY));
        let backend = RemoteBackend::new(Arc::clone(&transport));
        let result = backend
            .analyze(&clean("mail jane@example.com"), AnalysisMode::Deep, Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(result.source, BackendId::RemoteEnhanced);
        assert_eq!(result.sarcasm_score, 85);

        let seen = transport.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].content.text(), "mail [EMAIL]");
        let wire = serde_json::to_string(&seen[0]).unwrap();
        assert!(!wire.contains("jane@example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let backend = RemoteBackend::new(FakeTransport::hanging());
        let err = backend
            .analyze(&clean("hi"), AnalysisMode::CloudOnly, Duration::from_millis(3000))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_reply_within_bound_succeeds() {
        let backend =
            RemoteBackend::new(FakeTransport::replying(REPLY).with_delay(Duration::from_millis(1200)));
        assert!(backend
            .analyze(&clean("hi"), AnalysisMode::Deep, Duration::from_millis(3000))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let backend = RemoteBackend::new(FakeTransport::new(vec![Ok(RemoteReply::status(503))]));
        let err = backend
            .analyze(&clean("hi"), AnalysisMode::Deep, Duration::from_secs(3))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RemoteUnavailable);
    }

    #[tokio::test]
    async fn test_missing_required_fields() {
        let backend = RemoteBackend::new(FakeTransport::replying(
            r#"{"strategic": {}, "overallRisk": 10}"#,
        ));
        let err = backend
            .analyze(&clean("hi"), AnalysisMode::Deep, Duration::from_secs(3))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);

        let backend = RemoteBackend::new(FakeTransport::replying("<html>oops</html>"));
        let err = backend
            .analyze(&clean("hi"), AnalysisMode::Deep, Duration::from_secs(3))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }
}
