//! Ultimate fallback: the deterministic minimal result returned when every
//! candidate failed. Cannot fail.

use chrono::Utc;
use undertone_common::{
    AnalysisResult, BackendId, Dimension, EscalationStatus, Signal, ULTIMATE_FALLBACK_CONFIDENCE,
};

/// Neutral midpoint-ish risk for "we could not tell"
const FALLBACK_RISK: u8 = 30;

pub fn ultimate_fallback() -> AnalysisResult {
    let mut strategic = Dimension::new();
    strategic.insert("assessment".into(), Signal::label("minimal"));

    let mut emotional = Dimension::new();
    emotional.insert("tone".into(), Signal::label("neutral"));

    AnalysisResult {
        strategic,
        emotional,
        relational: Dimension::new(),
        overall_risk: FALLBACK_RISK,
        sarcasm_score: 0,
        confidence: ULTIMATE_FALLBACK_CONFIDENCE,
        source: BackendId::UltimateFallback,
        recommendations: vec![
            "Limited analysis available: enable a local or remote backend for full results"
                .to_string(),
        ],
        timestamp: Utc::now(),
        escalation: EscalationStatus::NotNeeded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_shape() {
        let result = ultimate_fallback();
        assert_eq!(result.source, BackendId::UltimateFallback);
        assert_eq!(result.confidence, 0.3);
        assert!(result.is_degraded());
        assert_eq!(result.tone(), Some("neutral"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["source"], "ultimate_fallback");
    }
}
