// src/runtime/orchestrator.rs
// ============================================================================
// Module: Pipeline Orchestrator
// Description: Sequences the five triage stages, times each one, maintains
//              the audit trace, and computes the final result's aggregates
//              and invariants.
// Purpose: Fixed stage order, Safety always runs once Structuring has,
//          and the single public entry point never panics.
// Dependencies: crate::{config, core, policy, rulebook, stages, adapter},
//               tokio, time, uuid
// ============================================================================

//! ## Overview
//! [`TriagePipeline`] owns everything loaded once at startup (the policy
//! pack, the safety rulebook, the shared [`ChatClient`]) and exposes a
//! single async entry point, [`TriagePipeline::triage`]. The five stages
//! run in the fixed order named in `crate::core::result::StageName`;
//! Reasoning and Communication are the only two that can block on an
//! external call, and are the only two raced against both the caller's
//! [`CancellationToken`] and the overall per-request deadline derived from
//! `config.request.deadline_ms`.

use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::time::Instant as DeadlineInstant;
use uuid::Uuid;

use crate::adapter::ChatClient;
use crate::config::ConfigError;
use crate::config::PipelineConfig;
use crate::core::TriageError;
use crate::core::TriageResult;
use crate::core::intake::Intake;
use crate::core::reasoning::Backend;
use crate::core::result::StageName;
use crate::core::result::TraceEntry;
use crate::policy;
use crate::policy::LoadedPolicyPack;
use crate::policy::PolicyPackError;
use crate::rulebook::RulebookError;
use crate::rulebook::SafetyRulebook;
use crate::runtime::cancellation::CancellationToken;
use crate::stages::communication;
use crate::stages::evidence;
use crate::stages::intake_structuring;
use crate::stages::reasoning;
use crate::stages::safety;

/// Pipeline version string, surfaced as `TriageResult::pipeline_version`.
pub const PIPELINE_VERSION: &str = "triage-pipeline-2025.1";

/// Errors that can occur building a [`TriagePipeline`] from configuration.
/// Fatal, startup-only failures.
#[derive(Debug, Error)]
pub enum PipelineInitError {
    /// The supplied configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The configured (or embedded default) policy pack failed to load.
    #[error(transparent)]
    Policy(#[from] PolicyPackError),
    /// The built-in safety rulebook failed to validate.
    #[error(transparent)]
    Rulebook(#[from] RulebookError),
}

/// Owns every resource loaded once at startup and sequences the five
/// pipeline stages for each request.
#[derive(Debug, Clone)]
pub struct TriagePipeline {
    /// Validated pipeline configuration.
    config: PipelineConfig,
    /// Loaded, hashed policy pack consulted by the Evidence stage.
    policy_pack: LoadedPolicyPack,
    /// Built-in safety rulebook consulted by the Safety stage.
    rulebook: SafetyRulebook,
    /// Shared HTTP client for the Reasoning and Communication adapters.
    client: ChatClient,
}

impl TriagePipeline {
    /// Builds a pipeline from `config`: validates it, loads the policy
    /// pack, and builds the built-in safety rulebook, failing fast on any
    /// error so a misconfigured deployment never serves a request.
    ///
    /// # Errors
    /// Returns [`PipelineInitError`] when `config` is invalid, the policy
    /// pack fails to load or validate, or the built-in rulebook fails to
    /// validate.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineInitError> {
        config.validate()?;
        let policy_pack = policy::load(config.policy.pack_path.as_deref())?;
        let rulebook = SafetyRulebook::builtin()?;
        Ok(Self {
            config,
            policy_pack,
            rulebook,
            client: ChatClient::new(),
        })
    }

    /// Returns the loaded policy pack's SHA-256 hex digest, for callers
    /// that surface it independently of a [`TriageResult`] (e.g. a health
    /// endpoint).
    #[must_use]
    pub fn policy_pack_sha256(&self) -> &str {
        &self.policy_pack.sha256
    }

    /// Returns the loaded safety rulebook's version string.
    #[must_use]
    pub fn safety_rules_version(&self) -> &str {
        &self.rulebook.version
    }

    /// Runs the full five-stage pipeline against `intake`.
    ///
    /// `request_id` is used verbatim when supplied, otherwise a new UUIDv4
    /// is generated. `cancellation`, when supplied, is consulted before
    /// Structuring runs (a request already cancelled at that point is
    /// rejected outright) and raced, alongside the overall request
    /// deadline derived from `config.request.deadline_ms`, against the
    /// Reasoning and Communication external calls (whichever of
    /// cancellation or deadline expiry arrives first degrades that stage
    /// to its deterministic fallback; Structuring, Evidence, and Safety
    /// are CPU-bound and always run to completion once started). Each
    /// external call's per-attempt timeout is itself clamped to whatever
    /// of the deadline remains when the stage starts.
    ///
    /// # Errors
    /// Returns [`TriageError::IntakeInvalid`] when `intake` fails
    /// structural validation, or [`TriageError::Cancelled`] when
    /// `cancellation` is already cancelled before Structuring runs.
    pub async fn triage(
        &self,
        intake: Intake,
        request_id: Option<String>,
        cancellation: Option<CancellationToken>,
    ) -> Result<TriageResult, TriageError> {
        self.validate_intake(&intake)?;

        let cancellation = cancellation.unwrap_or_default();
        if cancellation.is_cancelled() {
            return Err(TriageError::Cancelled);
        }

        let request_id = request_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let created_at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());
        let start = Instant::now();
        let deadline = DeadlineInstant::now() + self.config.request.deadline();
        let mut trace = Vec::with_capacity(5);

        let structuring_start = Instant::now();
        let structured = intake_structuring::structure(&intake, self.config.intake.negation_window);
        trace.push(trace_entry(StageName::IntakeStructuring, structuring_start.elapsed(), &structured, None));

        let reasoning_start = Instant::now();
        let (reasoning_output, reasoning_preempted) = if cancellation.is_cancelled() {
            (preempted_reasoning(&structured, &intake, "cancelled"), Some("cancelled"))
        } else {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => (preempted_reasoning(&structured, &intake, "cancelled"), Some("cancelled")),
                () = tokio::time::sleep_until(deadline) => (preempted_reasoning(&structured, &intake, "deadline_exceeded"), Some("deadline_exceeded")),
                output = reasoning::reason(
                    &structured,
                    &intake,
                    &self.config.reasoning,
                    &self.config.circuit,
                    self.config.phi_guard.enabled,
                    &self.client,
                    deadline,
                ) => (output, None),
            }
        };
        trace.push(trace_entry(StageName::Reasoning, reasoning_start.elapsed(), &reasoning_output, reasoning_preempted.map(str::to_string)));

        let evidence_start = Instant::now();
        let evidence_output = evidence::evaluate(&self.policy_pack, &structured, &intake.vitals, self.config.policy.top_k);
        trace.push(trace_entry(StageName::EvidencePolicy, evidence_start.elapsed(), &evidence_output, None));

        let safety_start = Instant::now();
        let safety_output = safety::evaluate(&self.rulebook, &structured, &intake.vitals, &reasoning_output);
        trace.push(trace_entry(StageName::SafetyEscalation, safety_start.elapsed(), &safety_output, None));

        let top_actions = merge_actions(&safety_output.actions_added_by_safety, &evidence_output.recommended_actions_from_policy);

        let communication_start = Instant::now();
        let (communication_output, communication_preempted) = if cancellation.is_cancelled() {
            (preempted_communication(&intake, &structured, &safety_output, &top_actions, "cancelled"), Some("cancelled"))
        } else {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => (preempted_communication(&intake, &structured, &safety_output, &top_actions, "cancelled"), Some("cancelled")),
                () = tokio::time::sleep_until(deadline) => (preempted_communication(&intake, &structured, &safety_output, &top_actions, "deadline_exceeded"), Some("deadline_exceeded")),
                output = communication::communicate(
                    &intake,
                    &structured,
                    &safety_output,
                    &top_actions,
                    &self.config.communication,
                    &self.config.circuit,
                    self.config.phi_guard.enabled,
                    &self.client,
                    deadline,
                ) => (output, None),
            }
        };
        trace.push(trace_entry(
            StageName::Communication,
            communication_start.elapsed(),
            &communication_output,
            communication_preempted.map(str::to_string),
        ));

        let confidence = (safety_output.risk_tier.confidence_cap() - 0.05 * precision_len(&structured.missing_critical_fields)).max(0.3);

        Ok(TriageResult {
            request_id,
            created_at,
            pipeline_version: PIPELINE_VERSION.to_string(),
            total_latency_ms: millis_u64(start.elapsed()),
            confidence,
            recommended_next_actions: top_actions,
            red_flags: safety_output.red_flags,
            risk_tier: safety_output.risk_tier,
            escalation_required: safety_output.escalation_required,
            differential_considerations: reasoning_output.differential_considerations,
            clinician_handoff: communication_output.clinician_handoff,
            patient_summary: communication_output.patient_summary,
            uncertainty_reasons: safety_output.uncertainty_reasons,
            trace,
        })
    }

    /// Rejects structurally invalid intakes before Structuring runs: an
    /// empty chief complaint, or a serialized size exceeding
    /// `request.max_bytes`.
    fn validate_intake(&self, intake: &Intake) -> Result<(), TriageError> {
        if !intake.has_chief_complaint() {
            return Err(TriageError::IntakeInvalid {
                reason: "chief_complaint must be non-empty".to_string(),
            });
        }
        let size = serde_json::to_vec(intake)
            .map_err(|err| TriageError::Internal { message: err.to_string() })?
            .len();
        if size > self.config.request.max_bytes {
            return Err(TriageError::IntakeInvalid {
                reason: "intake exceeds the configured maximum size".to_string(),
            });
        }
        Ok(())
    }
}

/// Builds the deterministic-fallback reasoning output used when
/// cancellation or the request deadline preempts the Reasoning stage.
fn preempted_reasoning(structured: &crate::core::StructuredIntake, intake: &Intake, reason: &str) -> crate::core::ReasoningOutput {
    let mut output = reasoning::deterministic_reasoning(structured, &intake.vitals);
    output.reasoning_backend_error = Some(reason.to_string());
    output
}

/// Builds the deterministic-draft communication output used when
/// cancellation or the request deadline preempts the Communication stage's
/// external rewrite.
fn preempted_communication(
    intake: &Intake,
    structured: &crate::core::StructuredIntake,
    safety_output: &crate::core::SafetyOutput,
    top_actions: &[String],
    reason: &str,
) -> crate::core::CommunicationOutput {
    let (clinician_handoff, patient_summary) = communication::build_draft(intake, structured, safety_output, top_actions);
    crate::core::CommunicationOutput {
        clinician_handoff,
        patient_summary,
        communication_backend: Some(Backend::Deterministic),
        communication_backend_model: None,
        communication_prompt_version: None,
        communication_backend_error: None,
        communication_backend_skipped_reason: Some(reason.to_string()),
    }
}

/// Builds a deduplicated union of two action lists, preserving the order of
/// `first` then `second` (safety actions first).
fn merge_actions(first: &[String], second: &[String]) -> Vec<String> {
    let mut merged = Vec::with_capacity(first.len() + second.len());
    for action in first.iter().chain(second.iter()) {
        if !merged.contains(action) {
            merged.push(action.clone());
        }
    }
    merged
}

/// Builds one [`TraceEntry`], rendering `output` as canonical JSON for the
/// audit trace.
fn trace_entry<T: Serialize>(stage: StageName, elapsed: Duration, output: &T, error: Option<String>) -> TraceEntry {
    TraceEntry {
        agent: stage,
        latency_ms: millis_u64(elapsed),
        output: serde_json::to_value(output).unwrap_or(Value::Null),
        error,
    }
}

/// Converts a [`Duration`] to whole milliseconds, saturating at `u64::MAX`
/// rather than truncating (no wall-clock stage should ever approach that
/// bound).
fn millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Converts a count to `f64` for the confidence-penalty calculation.
#[allow(clippy::cast_precision_loss, reason = "missing-field counts are always small")]
fn precision_len(values: &[String]) -> f64 {
    values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::core::intake::Vitals;

    fn pipeline() -> TriagePipeline {
        TriagePipeline::new(PipelineConfig::default()).expect("default config builds a pipeline")
    }

    #[tokio::test]
    async fn rejects_empty_chief_complaint() {
        let pipeline = pipeline();
        let intake = Intake::default();
        let err = pipeline.triage(intake, None, None).await.expect_err("empty chief complaint rejected");
        assert_eq!(err.code(), "intake_invalid");
    }

    #[tokio::test]
    async fn already_cancelled_token_aborts_before_structuring() {
        let pipeline = pipeline();
        let intake = Intake {
            chief_complaint: "mild sore throat".to_string(),
            ..Intake::default()
        };
        let token = CancellationToken::new();
        token.cancel();
        let err = pipeline.triage(intake, None, Some(token)).await.expect_err("cancelled before start");
        assert!(matches!(err, TriageError::Cancelled));
    }

    #[tokio::test]
    async fn routine_sore_throat_produces_five_stage_trace() {
        let pipeline = pipeline();
        let intake = Intake {
            chief_complaint: "mild sore throat for two days".to_string(),
            ..Intake::default()
        };
        let result = pipeline.triage(intake, Some("req-1".to_string()), None).await.expect("routine triage succeeds");
        assert_eq!(result.request_id, "req-1");
        assert_eq!(result.trace.len(), 5);
        assert_eq!(result.trace[0].agent, StageName::IntakeStructuring);
        assert_eq!(result.trace[4].agent, StageName::Communication);
        assert!(!result.escalation_required);
        assert!(result.recommended_next_actions.iter().collect::<std::collections::HashSet<_>>().len() == result.recommended_next_actions.len());
    }

    #[tokio::test]
    async fn critical_presentation_escalates_and_caps_confidence() {
        let pipeline = pipeline();
        let intake = Intake {
            chief_complaint: "crushing chest pain radiating to left arm".to_string(),
            vitals: Vitals {
                heart_rate: Some(128.0),
                systolic_bp: Some(78.0),
                spo2: Some(94.0),
                ..Vitals::default()
            },
            ..Intake::default()
        };
        let result = pipeline.triage(intake, None, None).await.expect("critical triage succeeds");
        assert!(result.escalation_required);
        assert!(result.confidence <= result.risk_tier.confidence_cap());
        assert!(!result.red_flags.is_empty());
    }

    #[tokio::test]
    async fn external_backend_configured_but_unreachable_falls_back() {
        let mut config = PipelineConfig::default();
        config.reasoning.backend = BackendKind::External;
        config.reasoning.base_url = Some("http://127.0.0.1:1".to_string());
        config.reasoning.model = Some("test-model".to_string());
        config.reasoning.max_retries = 0;
        config.phi_guard.enabled = false;
        let pipeline = TriagePipeline::new(config).expect("config with external backend builds");
        let intake = Intake {
            chief_complaint: "persistent cough".to_string(),
            ..Intake::default()
        };
        let result = pipeline.triage(intake, None, None).await.expect("falls back to deterministic reasoning");
        assert_eq!(result.trace[1].agent, StageName::Reasoning);
    }

    #[tokio::test]
    async fn expired_deadline_preempts_reasoning_with_deterministic_fallback() {
        let mut config = PipelineConfig::default();
        config.reasoning.backend = BackendKind::External;
        config.reasoning.base_url = Some("http://127.0.0.1:1".to_string());
        config.reasoning.model = Some("test-model".to_string());
        config.reasoning.max_retries = 5;
        config.reasoning.retry_backoff_ms = 200;
        config.phi_guard.enabled = false;
        config.request.deadline_ms = 1;
        let pipeline = TriagePipeline::new(config).expect("config with external backend builds");
        let intake = Intake {
            chief_complaint: "persistent cough".to_string(),
            ..Intake::default()
        };
        let result = pipeline.triage(intake, None, None).await.expect("falls back to deterministic reasoning");
        assert_eq!(result.trace[1].agent, StageName::Reasoning);
        assert_eq!(result.trace[1].error.as_deref(), Some("deadline_exceeded"));
    }
}
