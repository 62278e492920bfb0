// src/core/safety.rs
// ============================================================================
// Module: Triage Core Safety Output
// Description: Risk tier, fired triggers, and risk scores produced by the
//              Safety & Escalation stage.
// Purpose: Carry the deterministic safety decision that governs escalation.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TriggerId;

/// Overall triage urgency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// No escalation required.
    Routine,
    /// Escalation required; time-sensitive.
    Urgent,
    /// Escalation required; emergent.
    Critical,
}

impl RiskTier {
    /// Returns `true` when this tier requires escalation.
    #[must_use]
    pub const fn requires_escalation(self) -> bool {
        matches!(self, Self::Urgent | Self::Critical)
    }

    /// Returns the confidence cap associated with this tier, before any
    /// missing-field coverage penalty is subtracted.
    #[must_use]
    pub const fn confidence_cap(self) -> f64 {
        match self {
            Self::Routine => 0.85,
            Self::Urgent => 0.90,
            Self::Critical => 0.95,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Routine => "routine",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Severity of a fired safety trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; never alone escalates the tier.
    Info,
    /// Time-sensitive; escalates to at least `urgent`.
    Urgent,
    /// Emergent; escalates to `critical`.
    Critical,
}

/// A fired safety trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyTrigger {
    /// Stable trigger identifier.
    pub id: TriggerId,
    /// Human-readable label.
    pub label: String,
    /// Severity contributed to the tier decision.
    pub severity: Severity,
    /// Human-readable detail.
    pub detail: String,
}

/// Interpretable risk scores computed alongside the trigger catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskScores {
    /// Shock index (`heart_rate / systolic_bp`), when computable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shock_index: Option<f64>,
    /// `true` when `shock_index >= 0.9`.
    pub shock_index_high: bool,
    /// Quick SOFA score, 0..=3.
    pub qsofa: u8,
    /// `true` when `qsofa >= 2`.
    pub qsofa_high_risk: bool,
}

/// Output of the Safety & Escalation stage.
///
/// # Invariants
/// - `escalation_required == true` iff `risk_tier` is `urgent` or
///   `critical`.
/// - `red_flags` is deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyOutput {
    /// Overall urgency tier.
    pub risk_tier: RiskTier,
    /// Whether escalation is required.
    pub escalation_required: bool,
    /// Deduplicated human-readable red flags.
    pub red_flags: Vec<String>,
    /// Safety triggers that fired, in evaluation order.
    pub safety_triggers: Vec<SafetyTrigger>,
    /// Actions injected by safety, a subset of the final action list.
    pub actions_added_by_safety: Vec<String>,
    /// One-sentence rationale naming the dominant trigger(s).
    pub risk_tier_rationale: String,
    /// Interpretable risk scores.
    pub risk_scores: RiskScores,
    /// Reasons the result carries residual uncertainty.
    pub uncertainty_reasons: Vec<String>,
    /// Version of the safety rulebook catalog used.
    pub safety_rules_version: String,
}

impl Default for RiskTier {
    fn default() -> Self {
        Self::Routine
    }
}
