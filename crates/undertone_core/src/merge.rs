//! Result Merger
//!
//! Combines a local result with a remote enhancement:
//! - dimensions: remote wins when its block is non-empty
//! - risk: `local * (1 - rc) + remote * rc`, rounded, where `rc` is the
//!   remote confidence
//! - confidence: the larger of the two
//! - sarcasm: remote
//! - recommendations: remote first, then local, de-duplicated, capped
//!
//! Only called with a real remote result. A failed or skipped escalation
//! keeps the local result and marks it instead.

use chrono::Utc;
use undertone_common::{
    clamp_score, AnalysisResult, BackendId, Dimension, EscalationStatus, MAX_RECOMMENDATIONS,
};

fn prefer_remote(local: &Dimension, remote: &Dimension) -> Dimension {
    if remote.is_empty() {
        local.clone()
    } else {
        remote.clone()
    }
}

fn merge_recommendations(local: &[String], remote: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(MAX_RECOMMENDATIONS);
    for rec in remote.iter().chain(local.iter()) {
        if merged.len() == MAX_RECOMMENDATIONS {
            break;
        }
        let key = rec.trim();
        if key.is_empty() || merged.iter().any(|m| m.trim().eq_ignore_ascii_case(key)) {
            continue;
        }
        merged.push(rec.clone());
    }
    merged
}

pub fn merge(local: &AnalysisResult, remote: &AnalysisResult) -> AnalysisResult {
    let rc = remote.confidence.clamp(0.0, 1.0);
    let risk = local.overall_risk as f64 * (1.0 - rc) + remote.overall_risk as f64 * rc;

    AnalysisResult {
        strategic: prefer_remote(&local.strategic, &remote.strategic),
        emotional: prefer_remote(&local.emotional, &remote.emotional),
        relational: prefer_remote(&local.relational, &remote.relational),
        overall_risk: clamp_score(risk),
        sarcasm_score: remote.sarcasm_score,
        confidence: local.confidence.max(remote.confidence),
        source: BackendId::Hybrid,
        recommendations: merge_recommendations(&local.recommendations, &remote.recommendations),
        timestamp: Utc::now(),
        escalation: EscalationStatus::Merged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::canned_result;
    use undertone_common::Signal;

    fn with_recs(mut result: AnalysisResult, recs: &[&str]) -> AnalysisResult {
        result.recommendations = recs.iter().map(|s| s.to_string()).collect();
        result
    }

    #[test]
    fn test_weighted_risk_and_confidence() {
        let local = canned_result(BackendId::LocalHeuristic, 40, 55, 0.55);
        let remote = canned_result(BackendId::RemoteEnhanced, 80, 85, 0.75);
        let merged = merge(&local, &remote);
        // 40 * 0.25 + 80 * 0.75
        assert_eq!(merged.overall_risk, 70);
        assert_eq!(merged.confidence, 0.75);
        assert_eq!(merged.sarcasm_score, 85);
        assert_eq!(merged.source, BackendId::Hybrid);
        assert_eq!(merged.escalation, EscalationStatus::Merged);
    }

    #[test]
    fn test_risk_rounds_to_nearest() {
        let local = canned_result(BackendId::LocalHeuristic, 33, 0, 0.9);
        let remote = canned_result(BackendId::RemoteEnhanced, 34, 0, 0.5);
        // 16.5 + 17.0
        assert_eq!(merge(&local, &remote).overall_risk, 34);
    }

    #[test]
    fn test_local_confidence_kept_when_higher() {
        let local = canned_result(BackendId::LocalHeuristic, 0, 0, 0.9);
        let remote = canned_result(BackendId::RemoteEnhanced, 0, 0, 0.4);
        assert_eq!(merge(&local, &remote).confidence, 0.9);
    }

    #[test]
    fn test_empty_remote_dimension_keeps_local() {
        let local = canned_result(BackendId::LocalHeuristic, 10, 10, 0.5);
        let mut remote = canned_result(BackendId::RemoteEnhanced, 10, 10, 0.9);
        remote.strategic.clear();
        remote
            .emotional
            .insert("tone".into(), Signal::label("sarcastic"));

        let merged = merge(&local, &remote);
        assert_eq!(merged.strategic, local.strategic);
        assert_eq!(merged.emotional, remote.emotional);
        assert_eq!(merged.relational, remote.relational);
    }

    #[test]
    fn test_recommendations_remote_first_deduplicated_capped() {
        let local = with_recs(
            canned_result(BackendId::LocalHeuristic, 0, 0, 0.5),
            &["Ask for clarification", "Reply privately", "Keep it short", "Wait a day"],
        );
        let remote = with_recs(
            canned_result(BackendId::RemoteEnhanced, 0, 0, 0.9),
            &["Reply privately", "Acknowledge the deadline change", "ask for clarification"],
        );
        let merged = merge(&local, &remote);
        assert_eq!(
            merged.recommendations,
            vec![
                "Reply privately",
                "Acknowledge the deadline change",
                "ask for clarification",
                "Keep it short",
                "Wait a day",
            ]
        );
    }
}
