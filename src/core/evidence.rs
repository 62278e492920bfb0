// src/core/evidence.rs
// ============================================================================
// Module: Triage Core Evidence Output
// Description: Policy-grounded recommendations produced by the Evidence &
//              Policy stage.
// Purpose: Carry selected policy citations and the policy pack's content
//          hash for auditability.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::PolicyId;

/// A single policy citation selected for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolCitation {
    /// Policy identifier.
    pub policy_id: PolicyId,
    /// Policy title.
    pub title: String,
    /// Free-form citation text.
    pub citation: String,
    /// Recommended actions contributed by this policy.
    pub recommended_actions: Vec<String>,
}

/// Output of the Evidence & Policy stage.
///
/// # Invariants
/// - `recommended_actions_from_policy` is deduplicated, preserving first
///   occurrence order.
/// - `policy_pack_sha256` is 64 lowercase hex characters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceOutput {
    /// Deduplicated, in-order union of recommended actions from matched
    /// policies.
    pub recommended_actions_from_policy: Vec<String>,
    /// Citations for each selected policy.
    pub protocol_citations: Vec<ProtocolCitation>,
    /// SHA-256 hex digest of the canonicalized policy pack.
    pub policy_pack_sha256: String,
    /// Human-readable source of the loaded policy pack (path or
    /// `"embedded_default"`).
    pub policy_pack_source: String,
}
