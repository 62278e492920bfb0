// src/rulebook/engine.rs
// ============================================================================
// Module: Triage Safety Rulebook Engine
// Description: Deterministic evaluation of the canonical trigger set.
// Purpose: Turn a StructuredIntake + raw vitals into fired triggers, risk
//          scores, a risk tier, and mandated actions.
// Dependencies: crate::rulebook, crate::core::{safety, structured_intake,
//               intake, reasoning}
// ============================================================================

//! ## Overview
//! Evaluation runs in three passes: (1) compute interpretable risk scores
//! (shock index, qSOFA), (2) evaluate each canonical trigger's fixed
//! precondition against a `Signals` snapshot, producing baseline
//! severities, (3) apply the named composite escalation rules (stroke
//! multiplicity, fever+tachycardia, hypoxemia+chest pain,
//! shock-index-plus-urgent, multi-category). The result is never
//! randomized and depends only on its inputs and the rulebook version.

use crate::core::intake::Vitals;
use crate::core::reasoning::ReasoningOutput;
use crate::core::safety::RiskScores;
use crate::core::safety::RiskTier;
use crate::core::safety::SafetyTrigger;
use crate::core::safety::Severity;
use crate::core::structured_intake::StructuredIntake;
use crate::rulebook::SYMPTOM_RED_FLAGS;
use crate::rulebook::SafetyRulebook;

/// Everything the rulebook needs to evaluate a request, gathered once so
/// individual trigger checks stay simple boolean reads.
struct Signals<'a> {
    /// Normalized symptom/risk-factor tokens.
    structured: &'a StructuredIntake,
    /// Raw vital signs.
    vitals: &'a Vitals,
    /// Precomputed interpretable risk scores.
    risk_scores: RiskScores,
}

impl Signals<'_> {
    /// Returns `true` when a symptom token is present.
    fn symptom(&self, token: &str) -> bool {
        self.structured.has_symptom(token)
    }

    /// Returns `true` when a risk-factor token is present.
    fn risk_factor(&self, token: &str) -> bool {
        self.structured.has_risk_factor(token)
    }
}

/// The broad clinical category a fired trigger belongs to, used only to
/// evaluate the `multi_category` composite rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Category {
    /// Chest pain and combined cardiopulmonary presentations.
    Cardiopulmonary,
    /// Acute stroke signs.
    Neuro,
    /// Oxygenation.
    Respiratory,
    /// Blood pressure and heart rate.
    Hemodynamic,
    /// Fever and infection signs.
    Infectious,
    /// GI or pregnancy-related bleeding.
    Bleeding,
    /// Loss of consciousness.
    Syncope,
}

/// One trigger's raw evaluation before composite escalation is applied.
struct RawFire {
    /// Trigger id, matched against [`SafetyRulebook::get`].
    id: &'static str,
    /// Severity after any rule-local escalation (e.g. stroke-sign count).
    severity: Severity,
    /// Clinical category, used by the `multi_category` composite rule.
    category: Category,
}

/// Result of evaluating the safety rulebook against a request.
pub struct SafetyEvaluation {
    /// Fired triggers in evaluation order.
    pub triggers: Vec<SafetyTrigger>,
    /// Deduplicated human-readable red flags.
    pub red_flags: Vec<String>,
    /// Interpretable risk scores.
    pub risk_scores: RiskScores,
    /// Overall urgency tier.
    pub risk_tier: RiskTier,
    /// Whether escalation is required.
    pub escalation_required: bool,
    /// One-sentence rationale naming the dominant trigger(s).
    pub risk_tier_rationale: String,
    /// Deduplicated, trigger-ordered mandated actions from critical/urgent
    /// triggers only.
    pub actions_added_by_safety: Vec<String>,
    /// Reasons the result carries residual uncertainty.
    pub uncertainty_reasons: Vec<String>,
}

/// Evaluates the rulebook against a structured intake, the raw vitals, and
/// the upstream reasoning output (consulted only for uncertainty
/// reasons — Safety never depends on reasoning's clinical content for its
/// own tier decision; the tier decision must never be bypassed by
/// upstream results).
#[must_use]
pub fn evaluate(
    rulebook: &SafetyRulebook,
    structured: &StructuredIntake,
    vitals: &Vitals,
    reasoning: &ReasoningOutput,
) -> SafetyEvaluation {
    let risk_scores = compute_risk_scores(structured, vitals);
    let signals = Signals {
        structured,
        vitals,
        risk_scores,
    };

    let mut raw = evaluate_canonical_triggers(&signals);
    apply_composite_escalations(&mut raw, &signals);

    let mut triggers = Vec::new();
    for fire in &raw {
        if let Some(def) = rulebook.get(fire.id) {
            triggers.push(SafetyTrigger {
                id: def.id.clone(),
                label: def.label.clone(),
                severity: fire.severity,
                detail: def.detail.clone(),
            });
        }
    }

    if risk_scores.qsofa_high_risk {
        if let Some(def) = rulebook.get("qsofa_high_risk") {
            triggers.push(SafetyTrigger {
                id: def.id.clone(),
                label: def.label.clone(),
                severity: Severity::Info,
                detail: def.detail.clone(),
            });
        }
    }

    let red_flags = collect_red_flags(structured);

    let risk_tier = dominant_tier(&triggers);
    let escalation_required = risk_tier.requires_escalation();
    let risk_tier_rationale = build_rationale(risk_tier, &triggers);
    let actions_added_by_safety = collect_mandated_actions(rulebook, &raw);
    let uncertainty_reasons = collect_uncertainty_reasons(structured, &risk_scores, &triggers, reasoning);

    SafetyEvaluation {
        triggers,
        red_flags,
        risk_scores,
        risk_tier,
        escalation_required,
        risk_tier_rationale,
        actions_added_by_safety,
        uncertainty_reasons,
    }
}

/// Computes shock index and qSOFA.
fn compute_risk_scores(structured: &StructuredIntake, vitals: &Vitals) -> RiskScores {
    let shock_index = match (vitals.heart_rate, vitals.systolic_bp) {
        (Some(hr), Some(sbp)) if sbp > 0.0 => Some(round_2(hr / sbp)),
        _ => None,
    };
    let shock_index_high = shock_index.is_some_and(|value| value >= 0.9);

    let mut qsofa: u8 = 0;
    if vitals.respiratory_rate.is_some_and(|rr| rr >= 22.0) {
        qsofa += 1;
    }
    if vitals.systolic_bp.is_some_and(|sbp| sbp <= 100.0) {
        qsofa += 1;
    }
    if structured.has_symptom("altered_mental_status") {
        qsofa += 1;
    }
    let qsofa_high_risk = qsofa >= 2;

    RiskScores {
        shock_index,
        shock_index_high,
        qsofa,
        qsofa_high_risk,
    }
}

/// Rounds to two decimal places.
fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Evaluates every canonical trigger's baseline precondition.
fn evaluate_canonical_triggers(signals: &Signals<'_>) -> Vec<RawFire> {
    let mut fires = Vec::new();

    if signals.symptom("chest_pain") {
        fires.push(RawFire {
            id: "cardiopulmonary_red_flag",
            severity: Severity::Urgent,
            category: Category::Cardiopulmonary,
        });
    }

    let stroke_signs =
        ["slurred_speech", "facial_droop", "unilateral_weakness", "aphasia"].iter().filter(|s| signals.symptom(s)).count();
    if stroke_signs >= 1 {
        fires.push(RawFire {
            id: "stroke_red_flag",
            severity: if stroke_signs >= 2 { Severity::Critical } else { Severity::Urgent },
            category: Category::Neuro,
        });
    }

    if let Some(spo2) = signals.vitals.spo2 {
        if spo2 < 92.0 {
            fires.push(RawFire {
                id: "hypoxemia",
                severity: if spo2 < 88.0 { Severity::Critical } else { Severity::Urgent },
                category: Category::Respiratory,
            });
        }
    }

    if signals.vitals.systolic_bp.is_some_and(|sbp| sbp < 90.0) {
        fires.push(RawFire {
            id: "hypotension",
            severity: Severity::Critical,
            category: Category::Hemodynamic,
        });
    }

    let tachycardia_fires = signals.vitals.heart_rate.is_some_and(|hr| hr >= 130.0);
    if tachycardia_fires {
        fires.push(RawFire {
            id: "tachycardia_severe",
            severity: Severity::Urgent,
            category: Category::Hemodynamic,
        });
    }

    if signals.vitals.temperature_c.is_some_and(|temp| temp >= 39.5) {
        fires.push(RawFire {
            id: "fever_sepsis",
            severity: if tachycardia_fires { Severity::Critical } else { Severity::Urgent },
            category: Category::Infectious,
        });
    }

    if signals.vitals.spo2.is_some_and(|spo2| spo2 < 92.0) && signals.symptom("chest_pain") {
        fires.push(RawFire {
            id: "hemodynamic_combo",
            severity: Severity::Critical,
            category: Category::Cardiopulmonary,
        });
    }

    let bleeding_symptom =
        signals.symptom("hematemesis") || signals.symptom("melena") || signals.symptom("vaginal_bleeding");
    if signals.risk_factor("pregnancy") && bleeding_symptom {
        fires.push(RawFire {
            id: "pregnancy_bleeding",
            severity: Severity::Urgent,
            category: Category::Bleeding,
        });
    }

    if signals.symptom("hematemesis") || signals.symptom("melena") {
        fires.push(RawFire {
            id: "gi_bleed",
            severity: Severity::Urgent,
            category: Category::Bleeding,
        });
    }

    if signals.symptom("syncope") {
        fires.push(RawFire {
            id: "syncope",
            severity: Severity::Urgent,
            category: Category::Syncope,
        });
    }

    fires
}

/// Applies the composite escalation rules that are not a single trigger's
/// own precondition: `multi_category` and the shock-index-plus-urgent
/// rule.
fn apply_composite_escalations(raw: &mut Vec<RawFire>, signals: &Signals<'_>) {
    let distinct_categories: std::collections::HashSet<_> =
        raw.iter().filter(|f| f.severity != Severity::Info).map(|f| f.category).collect();
    if distinct_categories.len() >= 2 {
        let current_max = raw.iter().map(|f| f.severity).max().unwrap_or(Severity::Info);
        let escalated = if current_max == Severity::Urgent { Severity::Critical } else { current_max };
        raw.push(RawFire {
            id: "multi_category",
            severity: escalated,
            category: Category::Cardiopulmonary,
        });
    }

    if signals.risk_scores.shock_index_high {
        let any_urgent_or_worse = raw.iter().any(|f| f.severity != Severity::Info);
        raw.push(RawFire {
            id: "shock_index_high",
            severity: if any_urgent_or_worse { Severity::Critical } else { Severity::Info },
            category: Category::Hemodynamic,
        });
    }
}

/// Returns the red flags contributed purely by symptom presence
/// (keyword→red_flag mappings), deduplicated and in catalog order.
fn collect_red_flags(structured: &StructuredIntake) -> Vec<String> {
    let mut out = Vec::new();
    for (token, phrase) in SYMPTOM_RED_FLAGS {
        if structured.has_symptom(token) && !out.contains(&(*phrase).to_string()) {
            out.push((*phrase).to_string());
        }
    }
    out
}

/// Determines the overall risk tier from fired trigger severities.
fn dominant_tier(triggers: &[SafetyTrigger]) -> RiskTier {
    if triggers.iter().any(|t| t.severity == Severity::Critical) {
        RiskTier::Critical
    } else if triggers.iter().any(|t| t.severity == Severity::Urgent) {
        RiskTier::Urgent
    } else {
        RiskTier::Routine
    }
}

/// Builds the one-sentence rationale naming the dominant trigger(s).
fn build_rationale(tier: RiskTier, triggers: &[SafetyTrigger]) -> String {
    let dominant_severity = match tier {
        RiskTier::Critical => Severity::Critical,
        RiskTier::Urgent => Severity::Urgent,
        RiskTier::Routine => {
            return "No critical or urgent safety triggers fired; tier is routine.".to_string();
        }
    };
    let names: Vec<&str> =
        triggers.iter().filter(|t| t.severity == dominant_severity).map(|t| t.label.as_str()).collect();
    if names.is_empty() {
        return "Tier reflects the combination of fired safety triggers.".to_string();
    }
    format!("Tier driven by: {}.", names.join(", "))
}

/// Prepends each fired critical/urgent trigger's mandated actions, in
/// trigger-firing order, deduplicating on first occurrence.
fn collect_mandated_actions(rulebook: &SafetyRulebook, raw: &[RawFire]) -> Vec<String> {
    let mut out = Vec::new();
    for fire in raw {
        if fire.severity == Severity::Info {
            continue;
        }
        if let Some(def) = rulebook.get(fire.id) {
            for action in &def.mandated_actions {
                if !out.contains(action) {
                    out.push(action.clone());
                }
            }
        }
    }
    out
}

/// Collects the reasons the result carries residual uncertainty.
fn collect_uncertainty_reasons(
    structured: &StructuredIntake,
    risk_scores: &RiskScores,
    triggers: &[SafetyTrigger],
    reasoning: &ReasoningOutput,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if structured.missing_critical_fields.iter().any(|field| field.starts_with("vitals.")) {
        reasons.push("Missing critical vitals fields required for this presentation.".to_string());
    }

    let has_cardiopulmonary_symptom = structured.has_symptom("chest_pain") || structured.has_symptom("dyspnea");
    let has_any_vitals = structured.missing_critical_fields.iter().all(|f| !f.starts_with("vitals."));
    if has_cardiopulmonary_symptom && !has_any_vitals {
        reasons.push("Cardiopulmonary symptom reported without a complete vitals panel.".to_string());
    }

    if reasoning.reasoning_backend_skipped_reason.is_some() {
        reasons.push(format!(
            "External reasoning was skipped ({}); using deterministic differential.",
            reasoning.reasoning_backend_skipped_reason.as_deref().unwrap_or("unknown")
        ));
    }
    if reasoning.reasoning_backend_error.is_some() {
        reasons.push("External reasoning attempt failed; deterministic fallback was used.".to_string());
    }

    let has_critical_or_worse = triggers.iter().any(|t| t.severity == Severity::Critical);
    if risk_scores.shock_index_high && !has_critical_or_worse {
        reasons.push("Shock index is elevated without another critical trigger.".to_string());
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::core::reasoning::Backend;
    use crate::rulebook::SafetyRulebook;

    fn structured_with_symptoms(symptoms: &[&str]) -> StructuredIntake {
        StructuredIntake {
            symptoms: symptoms.iter().map(|s| (*s).to_string()).collect(),
            ..StructuredIntake::default()
        }
    }

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
    fn chest_pain_with_hypotension_is_critical() {
        let rulebook = SafetyRulebook::builtin().expect("builtin");
        let structured = structured_with_symptoms(&["chest_pain"]);
        let vitals = Vitals {
            heart_rate: Some(128.0),
            systolic_bp: Some(82.0),
            spo2: Some(94.0),
            respiratory_rate: Some(22.0),
            temperature_c: Some(37.0),
            ..Vitals::default()
        };
        let result = evaluate(&rulebook, &structured, &vitals, &deterministic_reasoning());
        assert_eq!(result.risk_tier, RiskTier::Critical);
        assert!(result.escalation_required);
        assert!(result.triggers.iter().any(|t| t.id.as_str() == "hypotension"));
        assert!(result.triggers.iter().any(|t| t.id.as_str() == "cardiopulmonary_red_flag"));
        let shock_index = result.risk_scores.shock_index.expect("shock index computed");
        assert!((shock_index - 1.56).abs() < 0.01);
        assert!(result.risk_scores.shock_index_high);
    }

    #[test]
    fn two_stroke_signs_escalate_to_critical() {
        let rulebook = SafetyRulebook::builtin().expect("builtin");
        let structured = structured_with_symptoms(&["slurred_speech", "unilateral_weakness"]);
        let result = evaluate(&rulebook, &structured, &Vitals::default(), &deterministic_reasoning());
        let stroke = result.triggers.iter().find(|t| t.id.as_str() == "stroke_red_flag").expect("stroke fires");
        assert_eq!(stroke.severity, Severity::Critical);
    }

    #[test]
    fn routine_sore_throat_has_no_triggers() {
        let rulebook = SafetyRulebook::builtin().expect("builtin");
        let haystack = catalog::normalize_for_matching("mild sore throat 2 days");
        let symptoms = catalog::extract_tokens(&haystack, catalog::SYMPTOM_CATALOG, 4);
        let structured = StructuredIntake {
            symptoms,
            ..StructuredIntake::default()
        };
        let vitals = Vitals {
            temperature_c: Some(37.4),
            heart_rate: Some(78.0),
            systolic_bp: Some(120.0),
            spo2: Some(99.0),
            respiratory_rate: Some(14.0),
            ..Vitals::default()
        };
        let result = evaluate(&rulebook, &structured, &vitals, &deterministic_reasoning());
        assert_eq!(result.risk_tier, RiskTier::Routine);
        assert!(!result.escalation_required);
        assert!(result.triggers.iter().all(|t| t.severity == Severity::Info));
    }

    #[test]
    fn sepsis_like_presentation_escalates_to_critical_with_high_qsofa() {
        let rulebook = SafetyRulebook::builtin().expect("builtin");
        let structured = structured_with_symptoms(&["altered_mental_status", "fever"]);
        let vitals = Vitals {
            temperature_c: Some(39.7),
            heart_rate: Some(132.0),
            systolic_bp: Some(96.0),
            respiratory_rate: Some(24.0),
            spo2: Some(95.0),
            ..Vitals::default()
        };
        let result = evaluate(&rulebook, &structured, &vitals, &deterministic_reasoning());
        assert_eq!(result.risk_scores.qsofa, 3);
        assert!(result.risk_scores.qsofa_high_risk);
        assert_eq!(result.risk_tier, RiskTier::Critical);
        assert!(result.triggers.iter().any(|t| t.id.as_str() == "fever_sepsis" && t.severity == Severity::Critical));
    }

    #[test]
    fn actions_added_by_safety_excludes_info_triggers() {
        let rulebook = SafetyRulebook::builtin().expect("builtin");
        let structured = structured_with_symptoms(&["chest_pain"]);
        let vitals = Vitals::default();
        let result = evaluate(&rulebook, &structured, &vitals, &deterministic_reasoning());
        assert!(!result.actions_added_by_safety.is_empty());
        assert!(result.actions_added_by_safety.iter().all(|a| !a.is_empty()));
    }
}
