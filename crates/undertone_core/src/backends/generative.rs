//! On-device generative backend.
//!
//! Sends mode-specific instructions to a local model server (Ollama
//! `/api/generate` with `format: json`) and folds the JSON it returns into an
//! [`AnalysisResult`]. Output that does not parse is a failure, never a
//! partial success.

use super::wire::{extract_json_object, parse_result, Required};
use super::{AnalysisBackend, BackendError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use undertone_common::config::GenerativeConfig;
use undertone_common::{AnalysisMode, AnalysisResult, BackendId, Content};

// ============================================================================
// Prompts
// ============================================================================

const QUICK_INSTRUCTIONS: &str =
    "Quick communication analysis: tone, basic intent, professional context.";
const DEEP_INSTRUCTIONS: &str =
    "Deep communication analysis: power dynamics, hidden agendas, emotional subtext, relational factors.";
const MULTIMODAL_INSTRUCTIONS: &str =
    "Multimodal communication analysis: text context, potential sarcasm, cultural nuances, relational dynamics.";

const RESPONSE_SCHEMA: &str = r#"Respond with a single JSON object:
{
  "strategic": {"powerDynamics": "low|balanced|high", "communicationStyle": "...", "urgency": "low|medium|high"},
  "emotional": {"tone": "positive|negative|neutral|sarcastic", "score": 0-100},
  "relational": {"trust": 0-100, "collaboration": 0-100},
  "overallRisk": 0-100,
  "sarcasmScore": 0-100,
  "confidence": 0.0-1.0,
  "recommendations": ["..."]
}"#;

pub fn instructions_for(mode: AnalysisMode) -> &'static str {
    match mode {
        AnalysisMode::Deep => DEEP_INSTRUCTIONS,
        AnalysisMode::Multimodal => MULTIMODAL_INSTRUCTIONS,
        AnalysisMode::Quick | AnalysisMode::LocalOnly | AnalysisMode::CloudOnly => {
            QUICK_INSTRUCTIONS
        }
    }
}

/// Full prompt for one message
pub fn build_prompt(content: &Content, mode: AnalysisMode) -> String {
    let mut prompt = format!(
        "{}\n\n{}\n\nMessage:\n{}",
        instructions_for(mode),
        RESPONSE_SCHEMA,
        content.text()
    );
    if mode == AnalysisMode::Multimodal && !content.images().is_empty() {
        prompt.push_str("\n\nAttached images:");
        for image in content.images() {
            prompt.push_str(&format!("\n- {}", image.alt_text));
        }
    }
    prompt
}

// ============================================================================
// Model Trait
// ============================================================================

/// Raw text generation. Implementations report transport problems as
/// `BackendUnavailable` and let the backend judge the output.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Ollama-style local model server
pub struct OllamaModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaModel {
    pub fn from_config(config: &GenerativeConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.effective_timeout_ms()))
            .build()
            .map_err(|e| BackendError::unavailable(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl GenerativeModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
        });

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::new(undertone_common::ErrorKind::Timeout, e.to_string())
            } else {
                BackendError::unavailable(format!("request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(BackendError::unavailable(format!(
                "HTTP {} from model server",
                response.status()
            )));
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::invalid(format!("unreadable model server reply: {}", e)))?;

        envelope
            .get("response")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| BackendError::invalid("model server reply has no `response` field"))
    }
}

/// Scripted model for tests
pub struct FakeGenerativeModel {
    responses: Mutex<Vec<Result<String, BackendError>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerativeModel {
    /// Responses are consumed in order; the last one repeats
    pub fn new(responses: Vec<Result<String, BackendError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(raw: impl Into<String>) -> Self {
        Self::new(vec![Ok(raw.into())])
    }

    pub fn always_error(error: BackendError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.prompts().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl GenerativeModel for FakeGenerativeModel {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        match self.prompts.lock() {
            Ok(mut guard) => guard.push(prompt.to_string()),
            Err(poisoned) => poisoned.into_inner().push(prompt.to_string()),
        }
        let mut responses = match self.responses.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match responses.len() {
            0 => Err(BackendError::unavailable("no scripted response")),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

pub struct GenerativeBackend {
    model: Arc<dyn GenerativeModel>,
    timeout: Duration,
}

impl GenerativeBackend {
    pub fn new(model: impl GenerativeModel + 'static, timeout: Duration) -> Self {
        Self {
            model: Arc::new(model),
            timeout,
        }
    }

    pub fn from_config(config: &GenerativeConfig) -> Result<Self, BackendError> {
        Ok(Self::new(
            OllamaModel::from_config(config)?,
            Duration::from_millis(config.effective_timeout_ms()),
        ))
    }
}

/// Parse raw model output into a result
pub fn parse_model_output(raw: &str) -> Result<AnalysisResult, BackendError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| BackendError::invalid("model output contains no JSON object"))?;
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| BackendError::invalid(format!("model output is not valid JSON: {}", e)))?;
    parse_result(&value, BackendId::OnDeviceGenerative, Required::AnyDimension)
}

#[async_trait]
impl AnalysisBackend for GenerativeBackend {
    fn id(&self) -> BackendId {
        BackendId::OnDeviceGenerative
    }

    /// Bounded by the backend's own inference timeout; the request timeout
    /// applies to remote calls only.
    async fn analyze(
        &self,
        content: &Content,
        mode: AnalysisMode,
        _timeout: Duration,
    ) -> Result<AnalysisResult, BackendError> {
        let prompt = build_prompt(content, mode);
        debug!(model = self.model.name(), prompt_chars = prompt.len(), "Generative inference");

        let raw = tokio::time::timeout(self.timeout, self.model.generate(&prompt))
            .await
            .map_err(|_| BackendError::timeout(self.timeout))??;

        parse_model_output(&raw).inspect_err(|e| {
            warn!(model = self.model.name(), error = %e, "Generative output rejected");
        })
    }
}
