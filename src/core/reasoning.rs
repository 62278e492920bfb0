// src/core/reasoning.rs
// ============================================================================
// Module: Triage Core Reasoning Output
// Description: Differential considerations and rationale produced by the
//              Multimodal Clinical Reasoning stage.
// Purpose: Carry the reasoning stage's result and backend provenance.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

/// Which backend actually produced a [`ReasoningOutput`] or
/// [`crate::core::CommunicationOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Produced entirely by in-process deterministic rules.
    Deterministic,
    /// Produced (or attempted) via an external HTTP chat-completions
    /// endpoint.
    External,
}

/// Output of the Multimodal Clinical Reasoning stage.
///
/// # Invariants
/// - `images_sent <= images_present`.
/// - When `reasoning_backend == Backend::Deterministic` because of a
///   failed external attempt, `reasoning_backend_error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningOutput {
    /// Ranked differential considerations, 1..=6 short strings.
    pub differential_considerations: Vec<String>,
    /// One-paragraph rationale.
    pub reasoning_rationale: String,
    /// Backend that ultimately produced this output.
    pub reasoning_backend: Backend,
    /// Model name, when the external backend was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_backend_model: Option<String>,
    /// Prompt template version used to build the request (or the
    /// deterministic rule-table version when no external call was made).
    pub reasoning_prompt_version: String,
    /// Number of images present on the intake.
    pub images_present: u32,
    /// Number of images actually sent to the external backend.
    pub images_sent: u32,
    /// Error recorded when an external attempt failed and a fallback was
    /// used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_backend_error: Option<String>,
    /// Reason the external backend was skipped entirely, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_backend_skipped_reason: Option<String>,
}
