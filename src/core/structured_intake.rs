// src/core/structured_intake.rs
// ============================================================================
// Module: Triage Core Structured Intake
// Description: Normalized, signal-extracted view of a raw Intake.
// Purpose: Provide the shared, deterministic input all downstream stages
//          read instead of re-parsing free text.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

/// A normalized, signal-extracted view of a raw [`crate::core::Intake`].
///
/// # Invariants
/// - `symptoms` and `risk_factors` are deduplicated and insertion-ordered.
/// - `phi_hits` records only `field:pattern_name` pairs, never matched text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredIntake {
    /// Compact deterministic summary of the intake.
    pub normalized_summary: String,
    /// Canonical symptom tokens present, in catalog-then-insertion order.
    pub symptoms: Vec<String>,
    /// Canonical risk-factor tokens present, in catalog-then-insertion
    /// order.
    pub risk_factors: Vec<String>,
    /// Critical fields that are missing given the presenting symptoms.
    pub missing_critical_fields: Vec<String>,
    /// Human-readable data-quality warnings.
    pub data_quality_warnings: Vec<String>,
    /// `field:pattern_name` pairs for heuristically detected PHI.
    pub phi_hits: Vec<String>,
}

impl StructuredIntake {
    /// Returns `true` when a symptom token is present.
    #[must_use]
    pub fn has_symptom(&self, token: &str) -> bool {
        self.symptoms.iter().any(|s| s == token)
    }

    /// Returns `true` when a risk-factor token is present.
    #[must_use]
    pub fn has_risk_factor(&self, token: &str) -> bool {
        self.risk_factors.iter().any(|r| r == token)
    }
}
