// src/core/result.rs
// ============================================================================
// Module: Triage Core Result
// Description: Final aggregated TriageResult and its per-stage trace.
// Purpose: Define the orchestrator's single output type.
// Dependencies: crate::core::*, serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::safety::RiskTier;

/// Identifies which pipeline stage produced a [`TraceEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Intake Structuring.
    IntakeStructuring,
    /// Multimodal Clinical Reasoning.
    Reasoning,
    /// Evidence & Policy.
    EvidencePolicy,
    /// Safety & Escalation.
    SafetyEscalation,
    /// Communication.
    Communication,
}

/// One entry in the per-request audit trace.
///
/// # Invariants
/// - `latency_ms` is non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Stage that produced this entry.
    pub agent: StageName,
    /// Wall-clock time spent in the stage, in milliseconds.
    pub latency_ms: u64,
    /// Canonical JSON rendering of the stage output, for audit purposes.
    pub output: serde_json::Value,
    /// Error string when the stage degraded or was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final aggregated result of a triage request.
///
/// # Invariants
/// - `escalation_required == true` iff `risk_tier` is `urgent` or
///   `critical`.
/// - `trace` has exactly five entries in fixed stage order when the request
///   was not rejected or cancelled before Safety completed.
/// - `recommended_next_actions` is duplicate-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    /// Caller-supplied or generated request identifier.
    pub request_id: String,
    /// ISO-8601 UTC timestamp the request was created.
    pub created_at: String,
    /// Pipeline version string.
    pub pipeline_version: String,
    /// Total pipeline wall time, in milliseconds.
    pub total_latency_ms: u64,
    /// Deterministic confidence scalar in `0.0..=1.0`.
    pub confidence: f64,
    /// Deduplicated union of evidence- and safety-recommended actions,
    /// safety actions first.
    pub recommended_next_actions: Vec<String>,
    /// Deduplicated human-readable red flags.
    pub red_flags: Vec<String>,
    /// Overall urgency tier.
    pub risk_tier: RiskTier,
    /// Whether escalation is required.
    pub escalation_required: bool,
    /// Ranked differential considerations.
    pub differential_considerations: Vec<String>,
    /// SBAR-formatted clinician handoff.
    pub clinician_handoff: String,
    /// Plain-language patient summary.
    pub patient_summary: String,
    /// Reasons the result carries residual uncertainty.
    pub uncertainty_reasons: Vec<String>,
    /// Per-stage audit trace, in fixed stage order.
    pub trace: Vec<TraceEntry>,
}
