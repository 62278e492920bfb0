// tests/invariants.rs
// ============================================================================
// Integration test: cross-cutting invariants of `TriagePipeline::triage`
// that must hold for any well-formed intake, checked across randomly
// generated vitals with `proptest`.
// ============================================================================

use std::collections::HashSet;

use proptest::prelude::*;
use triage_core::Intake;
use triage_core::PipelineConfig;
use triage_core::TriagePipeline;
use triage_core::Vitals;

fn pipeline() -> TriagePipeline {
    TriagePipeline::new(PipelineConfig::default()).expect("default config builds a pipeline")
}

fn arbitrary_vitals() -> impl Strategy<Value = Vitals> {
    (
        prop::option::of(30.0..220.0_f64),
        prop::option::of(40.0..220.0_f64),
        prop::option::of(30.0..140.0_f64),
        prop::option::of(34.0..42.0_f64),
        prop::option::of(60.0..100.0_f64),
        prop::option::of(6.0..45.0_f64),
    )
        .prop_map(|(heart_rate, systolic_bp, diastolic_bp, temperature_c, spo2, respiratory_rate)| Vitals {
            heart_rate,
            systolic_bp,
            diastolic_bp,
            temperature_c,
            spo2,
            respiratory_rate,
        })
}

proptest! {
    #[test]
    fn escalation_required_matches_tier_across_random_vitals(vitals in arbitrary_vitals()) {
        let rt = tokio::runtime::Runtime::new().expect("tokio runtime builds");
        let pipeline = pipeline();
        let intake = Intake {
            chief_complaint: "generalized malaise and fatigue".to_string(),
            vitals,
            ..Intake::default()
        };

        let result = rt.block_on(pipeline.triage(intake, None, None)).expect("triage never errors on valid intake");

        prop_assert_eq!(result.escalation_required, result.risk_tier.requires_escalation());
        prop_assert_eq!(result.trace.len(), 5);
        prop_assert!(result.confidence >= 0.3 && result.confidence <= 1.0);

        let mut seen = HashSet::new();
        for action in &result.recommended_next_actions {
            prop_assert!(seen.insert(action.clone()), "recommended_next_actions must be duplicate-free");
        }
        for entry in &result.trace {
            prop_assert!(entry.latency_ms < u64::MAX);
        }
    }
}

#[tokio::test]
async fn running_the_same_intake_twice_is_deterministic_apart_from_timing_fields() {
    let pipeline = pipeline();
    let intake = || Intake {
        chief_complaint: "two days of productive cough and low-grade fever".to_string(),
        vitals: Vitals {
            temperature_c: Some(38.2),
            heart_rate: Some(96.0),
            ..Vitals::default()
        },
        ..Intake::default()
    };

    let first = pipeline.triage(intake(), Some("fixed-id".to_string()), None).await.expect("first run succeeds");
    let second = pipeline.triage(intake(), Some("fixed-id".to_string()), None).await.expect("second run succeeds");

    assert_eq!(first.risk_tier, second.risk_tier);
    assert_eq!(first.escalation_required, second.escalation_required);
    assert_eq!(first.red_flags, second.red_flags);
    assert_eq!(first.recommended_next_actions, second.recommended_next_actions);
    assert_eq!(first.differential_considerations, second.differential_considerations);
    assert_eq!(first.clinician_handoff, second.clinician_handoff);
    assert_eq!(first.patient_summary, second.patient_summary);
    assert!((first.confidence - second.confidence).abs() < f64::EPSILON);
}

#[tokio::test]
async fn recommended_actions_are_a_superset_of_safety_mandated_actions() {
    let pipeline = pipeline();
    let intake = Intake {
        chief_complaint: "crushing chest pain".to_string(),
        vitals: Vitals {
            heart_rate: Some(120.0),
            systolic_bp: Some(76.0),
            ..Vitals::default()
        },
        ..Intake::default()
    };

    let result = pipeline.triage(intake, None, None).await.expect("critical triage succeeds");

    assert!(result.trace[3].output.get("actions_added_by_safety").is_some());
    let safety_actions: Vec<String> = result.trace[3]
        .output
        .get("actions_added_by_safety")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).map(ToString::to_string).collect())
        .unwrap_or_default();
    for action in &safety_actions {
        assert!(result.recommended_next_actions.contains(action));
    }
}

#[tokio::test]
async fn safety_stage_always_runs_even_when_reasoning_is_cancelled_mid_flight() {
    use triage_core::CancellationToken;

    let mut config = PipelineConfig::default();
    config.reasoning.backend = triage_core::config::BackendKind::External;
    config.reasoning.base_url = Some("http://127.0.0.1:1".to_string());
    config.reasoning.model = Some("unreachable".to_string());
    config.reasoning.max_retries = 0;
    config.reasoning.timeout_ms = 500;
    config.phi_guard.enabled = false;
    let pipeline = TriagePipeline::new(config).expect("pipeline builds");

    let intake = Intake {
        chief_complaint: "chest tightness".to_string(),
        ..Intake::default()
    };
    let token = CancellationToken::new();
    let cancel_clone = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cancel_clone.cancel();
    });

    let result = pipeline.triage(intake, None, Some(token)).await.expect("degrades instead of erroring");
    assert_eq!(result.trace.len(), 5);
    assert_eq!(result.trace[3].agent, triage_core::StageName::SafetyEscalation);
}
