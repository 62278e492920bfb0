// src/stages/intake_structuring.rs
// ============================================================================
// Module: Intake Structuring Stage
// Description: Normalizes a raw Intake into a StructuredIntake.
// Purpose: Symptom/risk-factor extraction, missing-field detection,
//          data-quality warnings, and PHI heuristics, deterministically
//          and without I/O.
// Dependencies: crate::catalog, crate::core::{intake, structured_intake}
// ============================================================================

//! ## Overview
//! Pure function over an [`Intake`] and the configured negation window.
//! Never fails: unparsable or out-of-range fields become absent plus a
//! data-quality warning instead of an error.

use crate::catalog;
use crate::catalog::RISK_FACTOR_CATALOG;
use crate::catalog::SYMPTOM_CATALOG;
use crate::catalog::VITALS_REQUIRED_SYMPTOMS;
use crate::core::intake::Intake;
use crate::core::intake::Vitals;
use crate::core::structured_intake::StructuredIntake;

/// Produces a [`StructuredIntake`] from `intake`, matching catalogs with a
/// negation window of `negation_window` words.
#[must_use]
pub fn structure(intake: &Intake, negation_window: usize) -> StructuredIntake {
    let haystack = build_haystack(intake);
    let normalized = catalog::normalize_for_matching(&haystack);

    let symptoms = catalog::extract_tokens(&normalized, SYMPTOM_CATALOG, negation_window);
    let risk_factors = catalog::extract_tokens(&normalized, RISK_FACTOR_CATALOG, negation_window);

    let mut missing_critical_fields = Vec::new();
    if !intake.has_chief_complaint() {
        missing_critical_fields.push("chief_complaint".to_string());
    }
    missing_critical_fields.extend(missing_vitals_fields(&symptoms, &intake.vitals));

    let mut data_quality_warnings = Vec::new();
    data_quality_warnings.extend(vitals_warnings(&intake.vitals));
    data_quality_warnings.extend(age_warning(intake.demographics.age));

    let phi_hits = phi_hits(intake);

    let normalized_summary = build_summary(intake, &symptoms, &risk_factors);

    StructuredIntake {
        normalized_summary,
        symptoms,
        risk_factors,
        missing_critical_fields,
        data_quality_warnings,
        phi_hits,
    }
}

/// Concatenates every free-text field considered for catalog matching.
fn build_haystack(intake: &Intake) -> String {
    let mut parts = vec![intake.chief_complaint.clone(), intake.history.clone()];
    parts.extend(intake.prior_notes.iter().cloned());
    parts.extend(intake.image_descriptions.iter().cloned());
    parts.join(" ")
}

/// Returns the `vitals.*` fields missing when a presenting symptom
/// requires the full vitals panel.
fn missing_vitals_fields(symptoms: &[String], vitals: &Vitals) -> Vec<String> {
    let requires_full_panel = symptoms.iter().any(|symptom| VITALS_REQUIRED_SYMPTOMS.contains(&symptom.as_str()));
    if !requires_full_panel {
        return Vec::new();
    }
    let mut missing = Vec::new();
    if vitals.heart_rate.is_none() {
        missing.push("vitals.heart_rate".to_string());
    }
    if vitals.systolic_bp.is_none() {
        missing.push("vitals.systolic_bp".to_string());
    }
    if vitals.spo2.is_none() {
        missing.push("vitals.spo2".to_string());
    }
    if vitals.temperature_c.is_none() {
        missing.push("vitals.temperature_c".to_string());
    }
    missing
}

/// Flags vitals outside plausible physiological ranges.
fn vitals_warnings(vitals: &Vitals) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(hr) = vitals.heart_rate {
        if !(20.0..=250.0).contains(&hr) {
            warnings.push("heart_rate is outside the plausible physiological range".to_string());
        }
    }
    if let Some(sbp) = vitals.systolic_bp {
        if !(40.0..=260.0).contains(&sbp) {
            warnings.push("systolic_bp is outside the plausible physiological range".to_string());
        }
    }
    if let Some(temp) = vitals.temperature_c {
        if !(30.0..=44.0).contains(&temp) {
            warnings.push("temperature_c is outside the plausible physiological range".to_string());
        }
    }
    if let Some(spo2) = vitals.spo2 {
        if !(0.0..=100.0).contains(&spo2) {
            warnings.push("spo2 is outside the plausible physiological range".to_string());
        }
    }
    if let Some(rr) = vitals.respiratory_rate {
        if !(4.0..=70.0).contains(&rr) {
            warnings.push("respiratory_rate is outside the plausible physiological range".to_string());
        }
    }
    warnings
}

/// Flags an age that is absent or outside 0..=120.
fn age_warning(age: Option<i64>) -> Option<String> {
    match age {
        None => Some("age is missing".to_string()),
        Some(value) if !(0..=120).contains(&value) => Some("age is outside the plausible range".to_string()),
        Some(_) => None,
    }
}

/// Scans each textual field independently for PHI patterns, recording only
/// `field:pattern_name` pairs.
fn phi_hits(intake: &Intake) -> Vec<String> {
    let mut hits = Vec::new();
    let fields: Vec<(&str, String)> = vec![
        ("chief_complaint", intake.chief_complaint.clone()),
        ("history", intake.history.clone()),
        ("prior_notes", intake.prior_notes.join(" ")),
        ("image_descriptions", intake.image_descriptions.join(" ")),
    ];
    for (field, text) in fields {
        if text.is_empty() {
            continue;
        }
        for pattern in catalog::detect_phi_patterns(&text) {
            let hit = format!("{field}:{pattern}");
            if !hits.contains(&hit) {
                hits.push(hit);
            }
        }
    }
    hits
}

/// Builds the deterministic summary template, omitting empty fields.
fn build_summary(intake: &Intake, symptoms: &[String], risk_factors: &[String]) -> String {
    let mut segments = Vec::new();
    if !intake.chief_complaint.trim().is_empty() {
        segments.push(format!("CC: {}", intake.chief_complaint.trim()));
    }
    if !intake.history.trim().is_empty() {
        segments.push(format!("Hx: {}", intake.history.trim()));
    }
    if let Some(vitals_segment) = vitals_summary_segment(&intake.vitals) {
        segments.push(vitals_segment);
    }
    if !symptoms.is_empty() {
        segments.push(format!("Symptoms: {}", symptoms.join(", ")));
    }
    if !risk_factors.is_empty() {
        segments.push(format!("RiskFactors: {}", risk_factors.join(", ")));
    }
    segments.join(" | ")
}

/// Builds the `Vitals: ...` summary segment, or `None` when no vitals are
/// present at all.
fn vitals_summary_segment(vitals: &Vitals) -> Option<String> {
    if vitals.heart_rate.is_none()
        && vitals.systolic_bp.is_none()
        && vitals.diastolic_bp.is_none()
        && vitals.temperature_c.is_none()
        && vitals.spo2.is_none()
        && vitals.respiratory_rate.is_none()
    {
        return None;
    }
    let hr = format_value(vitals.heart_rate);
    let sbp = format_value(vitals.systolic_bp);
    let dbp = format_value(vitals.diastolic_bp);
    let temp = format_value(vitals.temperature_c);
    let spo2 = format_value(vitals.spo2);
    let rr = format_value(vitals.respiratory_rate);
    Some(format!("Vitals: HR={hr}, BP={sbp}/{dbp}, Temp={temp}C, SpO2={spo2}%, RR={rr}"))
}

/// Formats an optional numeric vitals value, using `..` for absent values
/// per the summary template.
fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v}"),
        None => "..".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::intake::Demographics;

    fn base_intake() -> Intake {
        Intake {
            chief_complaint: "crushing chest pain radiating to left arm".to_string(),
            history: String::new(),
            demographics: Demographics::default(),
            vitals: Vitals {
                heart_rate: Some(128.0),
                systolic_bp: Some(82.0),
                spo2: Some(94.0),
                respiratory_rate: Some(22.0),
                temperature_c: Some(37.0),
                ..Vitals::default()
            },
            ..Intake::default()
        }
    }

    #[test]
    fn extracts_chest_pain_symptom() {
        let structured = structure(&base_intake(), 4);
        assert!(structured.has_symptom("chest_pain"));
    }

    #[test]
    fn negated_symptom_is_suppressed() {
        let mut intake = base_intake();
        intake.chief_complaint = "patient denies any chest pain today".to_string();
        let structured = structure(&intake, 4);
        assert!(!structured.has_symptom("chest_pain"));
    }

    #[test]
    fn missing_vitals_flagged_for_cardiopulmonary_symptom() {
        let mut intake = base_intake();
        intake.vitals = Vitals::default();
        let structured = structure(&intake, 4);
        assert!(structured.missing_critical_fields.contains(&"vitals.heart_rate".to_string()));
    }

    #[test]
    fn implausible_heart_rate_produces_warning() {
        let mut intake = base_intake();
        intake.vitals.heart_rate = Some(400.0);
        let structured = structure(&intake, 4);
        assert!(structured.data_quality_warnings.iter().any(|w| w.contains("heart_rate")));
    }

    #[test]
    fn phi_pattern_recorded_without_matched_text() {
        let mut intake = base_intake();
        intake.history = "contact at jane.doe@example.com for follow up".to_string();
        let structured = structure(&intake, 4);
        assert!(structured.phi_hits.contains(&"history:email".to_string()));
        assert!(structured.data_quality_warnings.iter().all(|w| !w.contains("jane.doe")));
    }

    #[test]
    fn summary_omits_empty_history() {
        let structured = structure(&base_intake(), 4);
        assert!(!structured.normalized_summary.contains("Hx:"));
        assert!(structured.normalized_summary.starts_with("CC:"));
    }
}
