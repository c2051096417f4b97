//! Analysis Orchestrator
//!
//! Request flow:
//! 1. Read privacy settings (once) and the capability snapshot
//! 2. Answer from the result cache when the sanitized content was seen
//!    recently under the same mode and permission; otherwise plan and run
//!    the fallback cascade
//! 3. Ask the escalation policy about the local result
//! 4. If warranted and permitted: sanitize, call remote, merge
//! 5. Record metrics and append to history
//!
//! Always yields a result unless the request is cancelled or a privacy
//! violation is detected.

use crate::backends::{BackendSet, GenerativeBackend, HeuristicBackend, RemoteBackend};
use crate::cache::{CacheKey, ResultCache};
use crate::capabilities::{Capabilities, CapabilityProbe, CapabilityRegistry, EnvironmentProbe};
use crate::cascade::{plan_candidates, run_attempt, CascadeExecutor, CascadeOutcome, OutboundContent};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::escalation::{EscalationDecision, EscalationPolicy};
use crate::history::{HistoryEntry, HistoryStore, JsonlHistory};
use crate::merge::merge;
use crate::monitor::{PerformanceMonitor, PerformanceReport, RequestOutcome};
use crate::timing::PerfSpan;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use undertone_common::config::UndertoneConfig;
use undertone_common::{
    AnalysisMode, AnalysisRequest, AnalysisResult, BackendId, CascadeAttempt, EscalationStatus,
    PrivacySettings, SettingsSource,
};
use uuid::Uuid;

/// Escalation status reason when the remote backend is not set up
pub const REASON_REMOTE_UNCONFIGURED: &str = "remote_unconfigured";

/// Escalation status reason when the cascade only produced the ultimate fallback
pub const REASON_NO_LOCAL_ANALYSIS: &str = "no_local_analysis";

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_millis(3_000);
const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Final answer for one request, with its audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub request_id: Uuid,
    pub mode: AnalysisMode,
    pub result: AnalysisResult,
    pub attempts: Vec<CascadeAttempt>,
    pub duration_ms: u64,
    /// Answered from the result cache; `attempts` is empty
    #[serde(default)]
    pub cached: bool,
}

impl AnalysisReport {
    /// Backends in the order they were tried
    pub fn attempted_backends(&self) -> Vec<BackendId> {
        self.attempts.iter().map(|a| a.backend_id).collect()
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct OrchestratorBuilder {
    probe: Option<Box<dyn CapabilityProbe>>,
    refresh_interval: Duration,
    backends: BackendSet,
    policy: EscalationPolicy,
    settings: Arc<dyn SettingsSource>,
    history: Option<Arc<dyn HistoryStore>>,
    cache: Option<ResultCache>,
    monitor: Option<Arc<PerformanceMonitor>>,
    remote_timeout: Duration,
    local_timeout: Duration,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            probe: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            backends: BackendSet::local_only(),
            policy: EscalationPolicy::default(),
            settings: Arc::new(PrivacySettings::default()),
            history: None,
            cache: None,
            monitor: None,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            local_timeout: DEFAULT_LOCAL_TIMEOUT,
        }
    }

    pub fn probe(mut self, probe: impl CapabilityProbe + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn backends(mut self, backends: BackendSet) -> Self {
        self.backends = backends;
        self
    }

    pub fn policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn settings(mut self, settings: Arc<dyn SettingsSource>) -> Self {
        self.settings = settings;
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share one monitor between several orchestrators
    pub fn monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Remote bound used when a request supplies no `timeout_ms`
    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn local_timeout(mut self, timeout: Duration) -> Self {
        self.local_timeout = timeout;
        self
    }

    pub fn build(self) -> Orchestrator {
        let registry = match self.probe {
            Some(probe) => CapabilityRegistry::new(probe, self.refresh_interval),
            None => CapabilityRegistry::new(
                EnvironmentProbe::from_config(&UndertoneConfig::default()),
                self.refresh_interval,
            ),
        };
        Orchestrator {
            registry: Arc::new(registry),
            backends: self.backends,
            policy: self.policy,
            settings: self.settings,
            history: self.history,
            cache: self.cache,
            monitor: self.monitor.unwrap_or_default(),
            remote_timeout: self.remote_timeout,
            local_timeout: self.local_timeout,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    backends: BackendSet,
    policy: EscalationPolicy,
    settings: Arc<dyn SettingsSource>,
    history: Option<Arc<dyn HistoryStore>>,
    cache: Option<ResultCache>,
    monitor: Arc<PerformanceMonitor>,
    remote_timeout: Duration,
    local_timeout: Duration,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Wire real backends from configuration.
    ///
    /// A backend whose client cannot be built is left out and logged; the
    /// capability probe still decides whether the cascade plans it.
    pub fn from_config(config: &UndertoneConfig) -> Self {
        let mut backends = BackendSet::new();

        if config.heuristic.enabled {
            backends = backends.with_heuristic(HeuristicBackend::new());
        }

        if config.generative.enabled {
            match GenerativeBackend::from_config(&config.generative) {
                Ok(backend) => backends = backends.with_generative(backend),
                Err(e) => warn!("On-device generative backend disabled: {}", e),
            }
        }

        if config.remote.is_configured() {
            match RemoteBackend::from_config(&config.remote) {
                Ok(backend) => backends = backends.with_remote(backend),
                Err(e) => warn!("Remote backend disabled: {}", e),
            }
        }

        let mut builder = OrchestratorBuilder::new()
            .probe(EnvironmentProbe::from_config(config))
            .refresh_interval(Duration::from_secs(config.registry.effective_refresh_interval()))
            .backends(backends)
            .policy(EscalationPolicy::new(config.escalation))
            .settings(Arc::new(config.privacy))
            .remote_timeout(Duration::from_millis(config.remote.effective_timeout_ms()))
            .local_timeout(Duration::from_millis(config.generative.effective_timeout_ms()));

        if let Some(history) = JsonlHistory::from_config(&config.history) {
            debug!(path = %history.path().display(), "History enabled");
            builder = builder.history(Arc::new(history));
        }
        if let Some(cache) = ResultCache::from_config(&config.cache) {
            builder = builder.cache(cache);
        }

        builder.build()
    }

    pub fn capabilities(&self) -> Arc<Capabilities> {
        self.registry.snapshot()
    }

    pub fn refresh_capabilities(&self) -> Arc<Capabilities> {
        self.registry.refresh()
    }

    /// Background refresh on the registry interval, until `cancel` fires
    pub fn spawn_capability_refresh(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.registry).run_refresh_loop(cancel))
    }

    pub fn performance_report(&self) -> PerformanceReport {
        self.monitor
            .report(Some(self.registry.snapshot().as_ref().clone()))
    }

    /// Explicit operator action
    pub fn reset_metrics(&self) {
        self.monitor.reset();
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn history(&self) -> Option<&Arc<dyn HistoryStore>> {
        self.history.as_ref()
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> OrchestratorResult<AnalysisReport> {
        self.analyze_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::analyze`], abandoning the request when `cancel`
    /// fires. Abandoned requests leave the attempt counters untouched.
    pub async fn analyze_with_cancel(
        &self,
        request: AnalysisRequest,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<AnalysisReport> {
        let request_id = Uuid::new_v4();
        let span = info_span!("analyze", %request_id, mode = %request.mode);

        let outcome = self
            .run_request(request_id, request, cancel)
            .instrument(span)
            .await;

        match &outcome {
            Err(OrchestratorError::Cancelled) => self.monitor.record_cancelled(),
            Err(OrchestratorError::PrivacyViolation(reason)) => {
                warn!(%request_id, "Request aborted: {}", reason)
            }
            Ok(_) => {}
        }
        outcome
    }

    async fn run_request(
        &self,
        request_id: Uuid,
        request: AnalysisRequest,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<AnalysisReport> {
        let total = PerfSpan::start("request");
        let mode = request.mode;

        let settings = self
            .settings
            .privacy_settings()
            .for_request(request.options.allow_remote);
        let caps = self.registry.snapshot();
        let remote_permitted = mode != AnalysisMode::LocalOnly && settings.permits_remote(None);
        let remote_timeout = request
            .options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.remote_timeout);

        info!(
            "[*] Analyzing {} chars ({} images), remote {}",
            request.content.text().chars().count(),
            request.content.images().len(),
            if remote_permitted { "permitted" } else { "off" }
        );

        let mut outbound = OutboundContent::new(&request.content);
        let cache_key = match &self.cache {
            Some(_) => outbound
                .sanitized()
                .ok()
                .and_then(|content| CacheKey::new(content, mode, remote_permitted)),
            None => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if !cancel.is_cancelled() {
                if let Some(result) = cache.get(key).await {
                    let duration_ms = total.end();
                    self.monitor.record_cache_hit();
                    info!("[+] {} from cache in {}ms", result.source, duration_ms);
                    return Ok(AnalysisReport {
                        request_id,
                        mode,
                        result,
                        attempts: Vec::new(),
                        duration_ms,
                        cached: true,
                    });
                }
            }
        }

        let plan = plan_candidates(&caps, mode, remote_permitted);
        let cascade = CascadeExecutor::new(&self.backends, plan)
            .remote_timeout(remote_timeout)
            .local_timeout(self.local_timeout)
            .run_with(&mut outbound, mode, cancel)
            .await?;

        let used_fallback = cascade.used_fallback;
        let degraded = cascade.degraded();
        let (result, attempts) = self
            .escalate(cascade, &mut outbound, mode, &settings, &caps, remote_timeout, cancel)
            .await?;
        let merged = result.escalation == EscalationStatus::Merged;

        let duration_ms = total.end();
        self.monitor.record(&RequestOutcome {
            attempts: &attempts,
            used_fallback,
            degraded,
            merged,
            latency_ms: duration_ms,
        });

        info!(
            "[+] {} risk={} sarcasm={} confidence={:.2} in {}ms",
            result.source, result.overall_risk, result.sarcasm_score, result.confidence, duration_ms
        );

        // Degraded and failed-escalation results are retried on the next request
        let cacheable = !result.is_degraded()
            && !matches!(result.escalation, EscalationStatus::Failed { .. });
        if let (Some(cache), Some(key), true) = (&self.cache, cache_key, cacheable) {
            cache.insert(key, result.clone()).await;
        }

        if let Some(history) = &self.history {
            let entry = HistoryEntry::new(request_id, mode, result.clone());
            if let Err(e) = history.append(entry).await {
                warn!("History append failed: {}", e);
            }
        }

        Ok(AnalysisReport {
            request_id,
            mode,
            result,
            attempts,
            duration_ms,
            cached: false,
        })
    }

    /// Decide on and perform remote enhancement of the cascade's result
    #[allow(clippy::too_many_arguments)]
    async fn escalate(
        &self,
        cascade: CascadeOutcome,
        outbound: &mut OutboundContent<'_>,
        mode: AnalysisMode,
        settings: &PrivacySettings,
        caps: &Capabilities,
        remote_timeout: Duration,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<(AnalysisResult, Vec<CascadeAttempt>)> {
        let remote_failure = cascade.remote_failure();
        let degraded = cascade.degraded();
        let CascadeOutcome {
            result,
            mut attempts,
            ..
        } = cascade;

        if result.source.is_remote() {
            return Ok((result.with_escalation(EscalationStatus::Direct), attempts));
        }
        // No second remote call within one request
        if let Some(kind) = remote_failure {
            return Ok((result.with_escalation(EscalationStatus::Failed { kind }), attempts));
        }

        let triggers = match self
            .policy
            .evaluate(&result, mode, settings, caps.network_available)
        {
            EscalationDecision::NotNeeded => {
                return Ok((result.with_escalation(EscalationStatus::NotNeeded), attempts))
            }
            EscalationDecision::Blocked { reason, triggers } => {
                debug!(reason = reason.as_str(), ?triggers, "Escalation blocked");
                let status = EscalationStatus::Unattempted {
                    reason: reason.as_str().to_string(),
                };
                return Ok((result.with_escalation(status), attempts));
            }
            EscalationDecision::Escalate(triggers) => triggers,
        };

        let unattempted = |reason: &str| EscalationStatus::Unattempted {
            reason: reason.to_string(),
        };
        if degraded {
            return Ok((result.with_escalation(unattempted(REASON_NO_LOCAL_ANALYSIS)), attempts));
        }
        let remote = match self.backends.get(BackendId::RemoteEnhanced) {
            Some(remote) if caps.remote_enhanced => Arc::clone(remote),
            _ => {
                debug!(?triggers, "Escalation warranted but no remote backend");
                return Ok((result.with_escalation(unattempted(REASON_REMOTE_UNCONFIGURED)), attempts));
            }
        };

        info!(
            triggers = ?triggers.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            "[*] Escalating to remote enhancement"
        );
        let content = outbound.sanitized()?;
        let (outcome, attempt) =
            run_attempt(remote.as_ref(), content, mode, remote_timeout, cancel).await?;
        attempts.push(attempt);

        let final_result = match outcome {
            Ok(enhanced) => merge(&result, &enhanced),
            Err(e) => result.with_escalation(EscalationStatus::Failed { kind: e.kind }),
        };
        Ok((final_result, attempts))
    }
}
