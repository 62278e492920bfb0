// src/stages/safety.rs
// ============================================================================
// Module: Safety & Escalation Stage
// Description: Wires the deterministic rulebook engine into the pipeline's
//              stage contract.
// Purpose: SafetyOutput is a pure function of StructuredIntake, raw
//          vitals, the upstream ReasoningOutput (uncertainty reasons
//          only), and the loaded SafetyRulebook. This stage MUST always
//          run.
// Dependencies: crate::rulebook, crate::core::{safety, structured_intake,
//               intake, reasoning}
// ============================================================================

//! ## Overview
//! Unlike Evidence or Reasoning, Safety never degrades: it must never be
//! bypassed by upstream results, and it must run even against a degraded
//! StructuredIntake substituted after an earlier stage failure. This
//! module is therefore a thin, infallible wrapper around
//! [`crate::rulebook::engine::evaluate`].

use crate::core::intake::Vitals;
use crate::core::reasoning::ReasoningOutput;
use crate::core::safety::SafetyOutput;
use crate::core::structured_intake::StructuredIntake;
use crate::rulebook::SafetyRulebook;
use crate::rulebook::engine;

/// Produces a [`SafetyOutput`] for `structured`/`vitals`, consulting
/// `reasoning` only for uncertainty-reason bookkeeping.
#[must_use]
pub fn evaluate(
    rulebook: &SafetyRulebook,
    structured: &StructuredIntake,
    vitals: &Vitals,
    reasoning: &ReasoningOutput,
) -> SafetyOutput {
    let evaluation = engine::evaluate(rulebook, structured, vitals, reasoning);
    SafetyOutput {
        risk_tier: evaluation.risk_tier,
        escalation_required: evaluation.escalation_required,
        red_flags: evaluation.red_flags,
        safety_triggers: evaluation.triggers,
        actions_added_by_safety: evaluation.actions_added_by_safety,
        risk_tier_rationale: evaluation.risk_tier_rationale,
        risk_scores: evaluation.risk_scores,
        uncertainty_reasons: evaluation.uncertainty_reasons,
        safety_rules_version: rulebook.version.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reasoning::Backend;
    use crate::core::safety::RiskTier;

    fn deterministic_reasoning() -> ReasoningOutput {
        ReasoningOutput {
            differential_considerations: vec!["test".to_string()],
            reasoning_rationale: "test".to_string(),
            reasoning_backend: Backend::Deterministic,
            reasoning_backend_model: None,
            reasoning_prompt_version: "v1".to_string(),
            images_present: 0,
            images_sent: 0,
            reasoning_backend_error: None,
            reasoning_backend_skipped_reason: Some("backend=deterministic".to_string()),
        }
    }

    #[test]
    fn routine_presentation_has_no_escalation() {
        let rulebook = SafetyRulebook::builtin().expect("builtin rulebook");
        let structured = StructuredIntake::default();
        let output = evaluate(&rulebook, &structured, &Vitals::default(), &deterministic_reasoning());
        assert_eq!(output.risk_tier, RiskTier::Routine);
        assert!(!output.escalation_required);
        assert_eq!(output.safety_rules_version, rulebook.version);
    }

    #[test]
    fn escalation_required_matches_tier() {
        let rulebook = SafetyRulebook::builtin().expect("builtin rulebook");
        let structured = StructuredIntake {
            symptoms: vec!["chest_pain".to_string()],
            ..StructuredIntake::default()
        };
        let vitals = Vitals {
            systolic_bp: Some(82.0),
            ..Vitals::default()
        };
        let output = evaluate(&rulebook, &structured, &vitals, &deterministic_reasoning());
        assert_eq!(output.escalation_required, output.risk_tier.requires_escalation());
    }
}
