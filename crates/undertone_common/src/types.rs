//! Core value types shared by the orchestrator and its front ends.
//!
//! Field names serialize in camelCase so stored history records and remote
//! payloads share one canonical shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Confidence always reported by the ultimate fallback.
///
/// Never zero, so callers can tell "minimal analysis performed" apart from
/// "no analysis attempted".
pub const ULTIMATE_FALLBACK_CONFIDENCE: f64 = 0.3;

/// Maximum number of recommendations carried by a single result
pub const MAX_RECOMMENDATIONS: usize = 5;

// ============================================================================
// Content
// ============================================================================

/// Reference to an image attached to a message. Never decoded; only the alt
/// text and size feed the coarse visual context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub source_uri: String,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default)]
    pub pixel_area: u64,
}

impl ImageRef {
    pub fn new(source_uri: impl Into<String>, alt_text: impl Into<String>, pixel_area: u64) -> Self {
        Self {
            source_uri: source_uri.into(),
            alt_text: alt_text.into(),
            pixel_area,
        }
    }
}

/// A piece of written communication submitted for analysis.
///
/// Fields are private: once built, content is only read. The `sanitized`
/// marker can only be set by [`crate::redaction::sanitize`] and is never
/// deserialized, so content arriving from outside is always treated as raw.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    text: String,
    #[serde(default)]
    images: Vec<ImageRef>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(skip)]
    sanitized: bool,
}

impl Content {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.images.push(image);
        self.sanitized = false;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self.sanitized = false;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Whether this value came out of the privacy sanitizer
    pub fn is_sanitized(&self) -> bool {
        self.sanitized
    }

    /// Short preview used in logs and history listings
    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.text.chars().take(max_chars).collect();
        if self.text.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }

    pub(crate) fn from_sanitized_parts(
        text: String,
        images: Vec<ImageRef>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            text,
            images,
            metadata,
            sanitized: true,
        }
    }
}

// ============================================================================
// Analysis Mode
// ============================================================================

/// Analysis depth requested by the caller. Never inferred from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    #[default]
    Quick,
    Deep,
    Multimodal,
    LocalOnly,
    CloudOnly,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Quick => "quick",
            AnalysisMode::Deep => "deep",
            AnalysisMode::Multimodal => "multimodal",
            AnalysisMode::LocalOnly => "local_only",
            AnalysisMode::CloudOnly => "cloud_only",
        }
    }

    pub fn all() -> [AnalysisMode; 5] {
        [
            AnalysisMode::Quick,
            AnalysisMode::Deep,
            AnalysisMode::Multimodal,
            AnalysisMode::LocalOnly,
            AnalysisMode::CloudOnly,
        ]
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "quick" => Ok(AnalysisMode::Quick),
            "deep" => Ok(AnalysisMode::Deep),
            "multimodal" => Ok(AnalysisMode::Multimodal),
            "local_only" | "local" => Ok(AnalysisMode::LocalOnly),
            "cloud_only" | "cloud" => Ok(AnalysisMode::CloudOnly),
            other => Err(format!("unknown analysis mode: {}", other)),
        }
    }
}

// ============================================================================
// Backend Identity
// ============================================================================

/// Which backend produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendId {
    OnDeviceGenerative,
    LocalHeuristic,
    RemoteEnhanced,
    /// Local result merged with a remote enhancement
    Hybrid,
    UltimateFallback,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::OnDeviceGenerative => "on_device_generative",
            BackendId::LocalHeuristic => "local_heuristic",
            BackendId::RemoteEnhanced => "remote_enhanced",
            BackendId::Hybrid => "hybrid",
            BackendId::UltimateFallback => "ultimate_fallback",
        }
    }

    /// Whether content sent to this backend leaves the local environment
    pub fn is_remote(&self) -> bool {
        matches!(self, BackendId::RemoteEnhanced)
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Error Kinds
// ============================================================================

/// Classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Capability missing; expected, routes to the next candidate
    BackendUnavailable,
    /// Remote endpoint unreachable or answered with a non-success status
    RemoteUnavailable,
    /// Call exceeded its time bound
    Timeout,
    /// Backend output broke the response contract
    InvalidResponse,
    /// Remote call attempted with unsanitized content. Fatal.
    PrivacyViolation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::RemoteUnavailable => "remote_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::PrivacyViolation => "privacy_violation",
        }
    }

    /// Fatal kinds abort the request instead of falling through
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::PrivacyViolation)
    }

    /// Kinds that indicate a broken backend contract rather than absence
    pub fn is_contract_breach(&self) -> bool {
        matches!(self, ErrorKind::InvalidResponse | ErrorKind::PrivacyViolation)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Result Signals
// ============================================================================

/// A single value inside a result dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Signal {
    Flag(bool),
    Number(f64),
    Label(String),
    List(Vec<String>),
}

impl Signal {
    pub fn label(value: impl Into<String>) -> Self {
        Signal::Label(value.into())
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            Signal::Label(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Signal::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for Signal {
    fn from(value: &str) -> Self {
        Signal::Label(value.to_string())
    }
}

impl From<f64> for Signal {
    fn from(value: f64) -> Self {
        Signal::Number(value)
    }
}

impl From<bool> for Signal {
    fn from(value: bool) -> Self {
        Signal::Flag(value)
    }
}

impl From<Vec<String>> for Signal {
    fn from(value: Vec<String>) -> Self {
        Signal::List(value)
    }
}

/// One analysis dimension (strategic, emotional or relational)
pub type Dimension = BTreeMap<String, Signal>;

// ============================================================================
// Analysis Result
// ============================================================================

/// What happened to remote enhancement for this result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EscalationStatus {
    /// Local result was conclusive
    #[default]
    NotNeeded,
    /// Result came straight from the remote backend inside the cascade
    Direct,
    /// Local and remote results were merged
    Merged,
    /// Escalation was warranted but not attempted
    Unattempted { reason: String },
    /// Escalation was attempted and failed; the local result stands
    Failed { kind: ErrorKind },
}

/// Structured assessment of one piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub strategic: Dimension,
    #[serde(default)]
    pub emotional: Dimension,
    #[serde(default)]
    pub relational: Dimension,
    /// 0-100
    pub overall_risk: u8,
    /// 0-100
    pub sarcasm_score: u8,
    /// 0.0-1.0, never 0
    pub confidence: f64,
    pub source: BackendId,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub escalation: EscalationStatus,
}

impl AnalysisResult {
    /// Emotional tone label, if the producing backend set one
    pub fn tone(&self) -> Option<&str> {
        self.emotional.get("tone").and_then(Signal::as_label)
    }

    pub fn is_degraded(&self) -> bool {
        self.source == BackendId::UltimateFallback
    }

    pub fn with_escalation(mut self, status: EscalationStatus) -> Self {
        self.escalation = status;
        self
    }
}

/// Clamp a raw score into the 0-100 band
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

// ============================================================================
// Cascade Audit
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// Audit record for one backend attempt within a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeAttempt {
    pub backend_id: BackendId,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl CascadeAttempt {
    pub fn success(backend_id: BackendId, duration_ms: u64) -> Self {
        Self {
            backend_id,
            outcome: AttemptOutcome::Success,
            duration_ms,
            error_kind: None,
        }
    }

    pub fn failure(backend_id: BackendId, kind: ErrorKind, duration_ms: u64) -> Self {
        Self {
            backend_id,
            outcome: AttemptOutcome::Failure,
            duration_ms,
            error_kind: Some(kind),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Bound for remote calls; falls back to the configured remote timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Per-request veto on remote use. `None` defers to settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_remote: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub content: Content,
    #[serde(default)]
    pub mode: AnalysisMode,
    #[serde(default)]
    pub options: RequestOptions,
}

impl AnalysisRequest {
    pub fn new(content: Content, mode: AnalysisMode) -> Self {
        Self {
            content,
            mode,
            options: RequestOptions::default(),
        }
    }

    pub fn allow_remote(mut self, allow: bool) -> Self {
        self.options.allow_remote = Some(allow);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = Some(timeout_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trips_through_str() {
        for mode in AnalysisMode::all() {
            assert_eq!(mode.as_str().parse::<AnalysisMode>().unwrap(), mode);
        }
        assert_eq!("cloud-only".parse::<AnalysisMode>().unwrap(), AnalysisMode::CloudOnly);
        assert!("turbo".parse::<AnalysisMode>().is_err());
    }

    #[test]
    fn test_deserialized_content_is_never_sanitized() {
        let json = r#"{"text":"hello","sanitized":true}"#;
        let content: Content = serde_json::from_str(json).unwrap();
        assert_eq!(content.text(), "hello");
        assert!(!content.is_sanitized());
    }

    #[test]
    fn test_builder_clears_sanitized_marker() {
        let content = Content::from_sanitized_parts("hi".into(), vec![], BTreeMap::new());
        assert!(content.is_sanitized());
        let content = content.with_metadata("url", "https://example.org");
        assert!(!content.is_sanitized());
    }

    #[test]
    fn test_preview_truncates() {
        let content = Content::new("abcdefghij");
        assert_eq!(content.preview(4), "abcd...");
        assert_eq!(content.preview(20), "abcdefghij");
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(-5.0), 0);
        assert_eq!(clamp_score(49.5), 50);
        assert_eq!(clamp_score(250.0), 100);
        assert_eq!(clamp_score(f64::NAN), 0);
    }

    #[test]
    fn test_escalation_status_serializes_with_tag() {
        let status = EscalationStatus::Failed { kind: ErrorKind::Timeout };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "timeout");
    }

    #[test]
    fn test_signal_untagged_shapes() {
        let dim: Dimension = serde_json::from_str(
            r#"{"tone":"positive","score":72,"hidden":false,"patterns":["a","b"]}"#,
        )
        .unwrap();
        assert_eq!(dim["tone"], Signal::label("positive"));
        assert_eq!(dim["score"].as_number(), Some(72.0));
        assert_eq!(dim["hidden"], Signal::Flag(false));
        assert_eq!(dim["patterns"], Signal::List(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_only_privacy_violation_is_fatal() {
        assert!(ErrorKind::PrivacyViolation.is_fatal());
        assert!(!ErrorKind::Timeout.is_fatal());
        assert!(ErrorKind::InvalidResponse.is_contract_breach());
        assert!(!ErrorKind::BackendUnavailable.is_contract_breach());
    }
}
