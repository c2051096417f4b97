//! Escalation Policy
//!
//! Decides from a completed local result whether the request should go to
//! the remote-enhanced backend. Pure: no I/O, no clock, no shared state.
//!
//! Prerequisites (all required):
//! - privacy settings permit remote enhancement
//! - the network is reported online
//! - mode is not `LocalOnly`
//!
//! Triggers (any one suffices):
//! - confidence below `confidence_below`
//! - overall risk above `risk_above`
//! - sarcasm strictly inside the ambiguous band
//! - mode is `CloudOnly`

use serde::{Deserialize, Serialize};
use undertone_common::config::EscalationConfig;
use undertone_common::{AnalysisMode, AnalysisResult, PrivacySettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    LowConfidence,
    HighRisk,
    AmbiguousSarcasm,
    CloudOnlyMode,
}

impl EscalationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationTrigger::LowConfidence => "low_confidence",
            EscalationTrigger::HighRisk => "high_risk",
            EscalationTrigger::AmbiguousSarcasm => "ambiguous_sarcasm",
            EscalationTrigger::CloudOnlyMode => "cloud_only_mode",
        }
    }
}

/// Unmet prerequisite, in the order they are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    LocalOnlyMode,
    RemoteNotPermitted,
    Offline,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::LocalOnlyMode => "local_only_mode",
            BlockReason::RemoteNotPermitted => "remote_not_permitted",
            BlockReason::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationDecision {
    /// Local result is conclusive
    NotNeeded,
    /// Warranted, but a prerequisite is missing
    Blocked {
        reason: BlockReason,
        triggers: Vec<EscalationTrigger>,
    },
    Escalate(Vec<EscalationTrigger>),
}

impl EscalationDecision {
    pub fn is_escalate(&self) -> bool {
        matches!(self, EscalationDecision::Escalate(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EscalationPolicy {
    thresholds: EscalationConfig,
}

impl EscalationPolicy {
    pub fn new(thresholds: EscalationConfig) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &EscalationConfig {
        &self.thresholds
    }

    /// Triggers raised by the result alone, ignoring prerequisites
    pub fn triggers(&self, local: &AnalysisResult, mode: AnalysisMode) -> Vec<EscalationTrigger> {
        let t = &self.thresholds;
        let mut triggers = Vec::new();
        if local.confidence < t.confidence_below {
            triggers.push(EscalationTrigger::LowConfidence);
        }
        if local.overall_risk > t.risk_above {
            triggers.push(EscalationTrigger::HighRisk);
        }
        if local.sarcasm_score > t.sarcasm_band_low && local.sarcasm_score < t.sarcasm_band_high {
            triggers.push(EscalationTrigger::AmbiguousSarcasm);
        }
        if mode == AnalysisMode::CloudOnly {
            triggers.push(EscalationTrigger::CloudOnlyMode);
        }
        triggers
    }

    fn blocked_by(
        &self,
        mode: AnalysisMode,
        privacy: &PrivacySettings,
        online: bool,
    ) -> Option<BlockReason> {
        if mode == AnalysisMode::LocalOnly {
            Some(BlockReason::LocalOnlyMode)
        } else if !privacy.permits_remote(None) {
            Some(BlockReason::RemoteNotPermitted)
        } else if !online {
            Some(BlockReason::Offline)
        } else {
            None
        }
    }

    pub fn evaluate(
        &self,
        local: &AnalysisResult,
        mode: AnalysisMode,
        privacy: &PrivacySettings,
        online: bool,
    ) -> EscalationDecision {
        let triggers = self.triggers(local, mode);
        if triggers.is_empty() {
            return EscalationDecision::NotNeeded;
        }
        match self.blocked_by(mode, privacy, online) {
            Some(reason) => EscalationDecision::Blocked { reason, triggers },
            None => EscalationDecision::Escalate(triggers),
        }
    }

    pub fn should_escalate(
        &self,
        local: &AnalysisResult,
        mode: AnalysisMode,
        privacy: &PrivacySettings,
        online: bool,
    ) -> bool {
        self.evaluate(local, mode, privacy, online).is_escalate()
    }
}

/// [`EscalationPolicy::should_escalate`] with the default thresholds
pub fn should_escalate(
    local: &AnalysisResult,
    mode: AnalysisMode,
    privacy: &PrivacySettings,
    online: bool,
) -> bool {
    EscalationPolicy::default().should_escalate(local, mode, privacy, online)
}
