//! End-to-end request scenarios against the orchestrator, with scripted
//! remote transports in place of the network.

use std::sync::Arc;
use std::time::Duration;
use undertone_common::config::EscalationConfig;
use undertone_common::{
    AnalysisMode, AnalysisRequest, AttemptOutcome, BackendId, Content, ErrorKind,
    EscalationStatus, PrivacySettings,
};
use undertone_core::backends::{FakeTransport, HeuristicBackend, RemoteBackend};
use undertone_core::{
    BackendSet, Capabilities, EscalationPolicy, Orchestrator, StaticProbe,
};

const SARCASTIC_REPLY: &str = r#"{
    "strategic": {"powerDynamics": "balanced", "urgency": "medium"},
    "emotional": {"tone": "sarcastic", "score": 20},
    "relational": {"trust": 35, "collaboration": 40},
    "overallRisk": 62,
    "sarcasmScore": 88,
    "confidence": 0.85,
    "recommendations": ["Acknowledge the frustration about weekend work"]
}"#;

/// Heuristic plus a reachable remote, no on-device model
fn remote_capabilities() -> Capabilities {
    Capabilities {
        on_device_generative: false,
        ..Capabilities::all()
    }
}

fn orchestrator_with_remote(transport: Arc<FakeTransport>) -> Orchestrator {
    Orchestrator::builder()
        .probe(StaticProbe::new(remote_capabilities()))
        .backends(
            BackendSet::new()
                .with_heuristic(HeuristicBackend::new())
                .with_remote(RemoteBackend::new(transport)),
        )
        .settings(Arc::new(PrivacySettings::permissive()))
        .remote_timeout(Duration::from_millis(3_000))
        .build()
}

#[tokio::test]
async fn test_quick_positive_message_stays_local() {
    let orchestrator = Orchestrator::builder()
        .probe(StaticProbe::local_only())
        .backends(BackendSet::local_only())
        .build();

    let request = AnalysisRequest::new(
        Content::new("Thank you for the excellent work, really appreciate the team"),
        AnalysisMode::Quick,
    );
    let report = orchestrator.analyze(request).await.unwrap();

    assert_eq!(report.result.source, BackendId::LocalHeuristic);
    assert!(report.result.overall_risk < 30, "risk {}", report.result.overall_risk);
    assert_eq!(report.result.tone(), Some("positive"));
    assert_eq!(report.attempted_backends(), vec![BackendId::LocalHeuristic]);
    assert!(!matches!(
        report.result.escalation,
        EscalationStatus::Merged | EscalationStatus::Direct
    ));
}

#[tokio::test]
async fn test_deep_sarcasm_escalates_and_merges() {
    let transport = Arc::new(FakeTransport::replying(SARCASTIC_REPLY));
    let orchestrator = orchestrator_with_remote(Arc::clone(&transport));

    let request = AnalysisRequest::new(
        Content::new(
            "I'm absolutely THRILLED the deadline moved up, nothing makes me happier than working weekends",
        ),
        AnalysisMode::Deep,
    );
    let report = orchestrator.analyze(request).await.unwrap();

    assert_eq!(report.result.source, BackendId::Hybrid);
    assert_eq!(report.result.escalation, EscalationStatus::Merged);
    assert_eq!(report.result.sarcasm_score, 88);
    assert_eq!(report.result.confidence, 0.85);
    assert_eq!(report.result.tone(), Some("sarcastic"));
    assert_eq!(
        report.result.recommendations[0],
        "Acknowledge the frustration about weekend work"
    );
    assert_eq!(
        report.attempted_backends(),
        vec![BackendId::LocalHeuristic, BackendId::RemoteEnhanced]
    );
    assert_eq!(transport.seen().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cloud_only_remote_timeout_falls_back_to_heuristic() {
    let transport = Arc::new(FakeTransport::hanging());
    let orchestrator = orchestrator_with_remote(Arc::clone(&transport));

    let request = AnalysisRequest::new(Content::new("Can we talk tomorrow?"), AnalysisMode::CloudOnly)
        .timeout_ms(3_000);
    let report = orchestrator.analyze(request).await.unwrap();

    assert_eq!(report.result.source, BackendId::LocalHeuristic);
    assert_eq!(report.attempts.len(), 2);

    let remote = &report.attempts[0];
    assert_eq!(remote.backend_id, BackendId::RemoteEnhanced);
    assert_eq!(remote.outcome, AttemptOutcome::Failure);
    assert_eq!(remote.error_kind, Some(ErrorKind::Timeout));
    assert_eq!(remote.duration_ms, 3_000);

    let local = &report.attempts[1];
    assert_eq!(local.backend_id, BackendId::LocalHeuristic);
    assert_eq!(local.outcome, AttemptOutcome::Success);

    // No second remote call through escalation
    assert_eq!(transport.seen().len(), 1);
    assert_eq!(
        report.result.escalation,
        EscalationStatus::Failed {
            kind: ErrorKind::Timeout
        }
    );

    let metrics = orchestrator.performance_report();
    assert_eq!(metrics.fallback_usage_count, 1);
    assert_eq!(
        metrics.backends[&BackendId::RemoteEnhanced].failures[&ErrorKind::Timeout],
        1
    );
}

#[tokio::test]
async fn test_email_never_reaches_remote_in_cloud_only_mode() {
    let transport = Arc::new(FakeTransport::replying(SARCASTIC_REPLY));
    let orchestrator = orchestrator_with_remote(Arc::clone(&transport));

    let content = Content::new("Please send the signed contract to jane@example.com today")
        .with_metadata("author", "jane@example.com");
    let request = AnalysisRequest::new(content, AnalysisMode::CloudOnly).allow_remote(true);
    let report = orchestrator.analyze(request).await.unwrap();
    assert_eq!(report.result.escalation, EscalationStatus::Direct);

    let seen = transport.seen();
    assert_eq!(seen.len(), 1);
    let wire = serde_json::to_string(&seen[0]).unwrap();
    assert!(!wire.contains("jane@example.com"), "leaked: {}", wire);
    assert!(seen[0].content.text().contains("[EMAIL]"));
    assert_eq!(seen[0].content.metadata()["author"], "[EMAIL]");
}

#[tokio::test]
async fn test_email_never_reaches_remote_through_escalation() {
    let transport = Arc::new(FakeTransport::replying(SARCASTIC_REPLY));
    let orchestrator = Orchestrator::builder()
        .probe(StaticProbe::new(remote_capabilities()))
        .backends(
            BackendSet::new()
                .with_heuristic(HeuristicBackend::new())
                .with_remote(RemoteBackend::new(Arc::clone(&transport))),
        )
        .settings(Arc::new(PrivacySettings::permissive()))
        // Escalate on everything
        .policy(EscalationPolicy::new(EscalationConfig {
            confidence_below: 1.0,
            ..EscalationConfig::default()
        }))
        .build();

    let request = AnalysisRequest::new(
        Content::new("Ping jane@example.com or call +1 555 123 4567 about the invoice"),
        AnalysisMode::Deep,
    )
    .allow_remote(true);
    let report = orchestrator.analyze(request).await.unwrap();
    assert_eq!(report.result.escalation, EscalationStatus::Merged);

    let seen = transport.seen();
    assert_eq!(seen.len(), 1);
    let text = seen[0].content.text();
    assert!(!text.contains("jane@example.com"));
    assert!(text.contains("[EMAIL]"));
    assert!(seen[0].content.is_sanitized());
}

#[tokio::test]
async fn test_remote_off_by_default() {
    let transport = Arc::new(FakeTransport::replying(SARCASTIC_REPLY));
    let orchestrator = Orchestrator::builder()
        .probe(StaticProbe::new(remote_capabilities()))
        .backends(
            BackendSet::local_only().with_remote(RemoteBackend::new(Arc::clone(&transport))),
        )
        .build();

    for mode in AnalysisMode::all() {
        let request = AnalysisRequest::new(Content::new("Fine. Whatever you say."), mode)
            .allow_remote(true);
        let report = orchestrator.analyze(request).await.unwrap();
        assert_eq!(report.result.source, BackendId::LocalHeuristic);
    }
    assert!(transport.seen().is_empty());
}
