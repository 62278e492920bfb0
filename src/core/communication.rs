// src/core/communication.rs
// ============================================================================
// Module: Triage Core Communication Output
// Description: Clinician handoff and patient summary produced by the
//              Communication stage.
// Purpose: Carry the deterministic draft (and optional external rewrite)
//          of the two communication artifacts.
// Dependencies: crate::core::reasoning::Backend, serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::reasoning::Backend;

/// Output of the Communication stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunicationOutput {
    /// SBAR-formatted clinician handoff.
    pub clinician_handoff: String,
    /// Plain-language patient summary and return precautions.
    pub patient_summary: String,
    /// Backend that produced the final text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_backend: Option<Backend>,
    /// Model name, when the external backend was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_backend_model: Option<String>,
    /// Rewrite prompt template version, when the external backend was
    /// attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_prompt_version: Option<String>,
    /// Error recorded when an external rewrite failed and the
    /// deterministic draft was kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_backend_error: Option<String>,
    /// Reason the external rewrite was skipped entirely, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_backend_skipped_reason: Option<String>,
}
