// src/rulebook/mod.rs
// ============================================================================
// Module: Triage Safety Rulebook
// Description: Versioned catalog of deterministic safety triggers.
// Purpose: Define the canonical trigger set as data plus the fixed
//          evaluation semantics each trigger id carries.
// Dependencies: crate::core::identifiers, crate::core::safety, serde
// ============================================================================

//! ## Overview
//! This is a fixed, canonical minimum trigger set with fixed clinical
//! semantics, not a generic predicate/gate engine evaluating arbitrary
//! user-authored requirements over evidence. The rulebook therefore holds
//! each trigger's identity/label/severity/mandated-actions as plain
//! serializable data (so it can be hashed and exposed read-only exactly
//! like a policy pack), while the *evaluation* of each trigger's
//! precondition is fixed Rust logic keyed by trigger id in
//! [`crate::rulebook::engine`] — a fail-fast, validated-once-at-startup
//! shape, without inventing a bespoke predicate DSL for a fixed catalog
//! that does not need one. See `DESIGN.md` for the open-question
//! resolution.

/// Three-pass deterministic evaluator for the canonical trigger set.
pub mod engine;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::TriggerId;
use crate::core::safety::Severity;

/// Current safety rulebook version, surfaced as `safety_rules_version`.
pub const RULEBOOK_VERSION: &str = "safety-rulebook-2025.1";

/// Static metadata for one canonical safety trigger. Precondition
/// evaluation itself lives in [`engine::evaluate`], keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    /// Stable trigger identifier.
    pub id: TriggerId,
    /// Human-readable label.
    pub label: String,
    /// Baseline severity before composite escalation rules apply.
    pub severity: Severity,
    /// Human-readable detail template.
    pub detail: String,
    /// Actions mandated when this trigger fires, prepended to the final
    /// action list in trigger order.
    pub mandated_actions: Vec<String>,
}

/// The loaded, versioned safety rulebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyRulebook {
    /// Rulebook version string.
    pub version: String,
    /// Trigger definitions, in canonical evaluation order.
    pub triggers: Vec<TriggerDefinition>,
}

impl SafetyRulebook {
    /// Builds the built-in canonical rulebook (the minimum trigger set),
    /// validated before it is returned.
    ///
    /// # Errors
    /// Returns [`RulebookError`] if the built-in catalog is malformed; this
    /// should never happen and indicates a programming error, matching the
    /// fail-fast contract of the policy-pack loader.
    pub fn builtin() -> Result<Self, RulebookError> {
        let rulebook = Self {
            version: RULEBOOK_VERSION.to_string(),
            triggers: builtin_triggers(),
        };
        rulebook.validate()?;
        Ok(rulebook)
    }

    /// Validates structural invariants: unique non-empty trigger ids and
    /// non-empty mandated actions.
    ///
    /// # Errors
    /// Returns [`RulebookError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), RulebookError> {
        use std::collections::HashSet;
        if self.triggers.is_empty() {
            return Err(RulebookError::Invalid("rulebook must define at least one trigger".to_string()));
        }
        let mut seen = HashSet::new();
        for trigger in &self.triggers {
            if trigger.id.as_str().is_empty() {
                return Err(RulebookError::Invalid("trigger id must be non-empty".to_string()));
            }
            if !seen.insert(trigger.id.clone()) {
                return Err(RulebookError::Invalid(format!("duplicate trigger id: {}", trigger.id)));
            }
        }
        Ok(())
    }

    /// Computes the SHA-256 hex digest over the canonical JSON
    /// serialization of this rulebook, using the same canonicalization
    /// rule as policy packs.
    ///
    /// # Errors
    /// Returns [`RulebookError::Hash`] when canonicalization fails.
    pub fn content_sha256(&self) -> Result<String, RulebookError> {
        hash_canonical_json(self).map_err(RulebookError::Hash)
    }

    /// Returns the definition for a trigger id, when present.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TriggerDefinition> {
        self.triggers.iter().find(|trigger| trigger.id.as_str() == id)
    }
}

/// Keyword-to-red-flag mapping: symptom tokens that, when present,
/// directly contribute a human-readable red-flag phrase independent of
/// whether a trigger also fires for them.
pub const SYMPTOM_RED_FLAGS: &[(&str, &str)] = &[
    ("chest_pain", "Chest pain reported"),
    ("dyspnea", "Shortness of breath reported"),
    ("slurred_speech", "Slurred speech reported"),
    ("facial_droop", "Facial droop reported"),
    ("unilateral_weakness", "One-sided weakness reported"),
    ("aphasia", "Difficulty speaking reported"),
    ("syncope", "Syncope (loss of consciousness) reported"),
    ("hematemesis", "Vomiting blood reported"),
    ("melena", "Black/tarry stool reported"),
    ("vaginal_bleeding", "Vaginal bleeding reported"),
    ("altered_mental_status", "Altered mental status reported"),
];

/// Builds the canonical minimum trigger set.
fn builtin_triggers() -> Vec<TriggerDefinition> {
    vec![
        TriggerDefinition {
            id: TriggerId::new("cardiopulmonary_red_flag"),
            label: "Cardiopulmonary red flag".to_string(),
            severity: Severity::Urgent,
            detail: "Chest pain is present.".to_string(),
            mandated_actions: vec![
                "Obtain 12-lead ECG within 10 minutes".to_string(),
                "Establish IV access".to_string(),
            ],
        },
        TriggerDefinition {
            id: TriggerId::new("stroke_red_flag"),
            label: "Stroke red flag".to_string(),
            severity: Severity::Urgent,
            detail: "One or more acute stroke signs are present.".to_string(),
            mandated_actions: vec![
                "Document time of symptom onset or last-known-well".to_string(),
                "Activate emergent neurologic evaluation".to_string(),
            ],
        },
        TriggerDefinition {
            id: TriggerId::new("hypoxemia"),
            label: "Hypoxemia".to_string(),
            severity: Severity::Urgent,
            detail: "Oxygen saturation is below 92%.".to_string(),
            mandated_actions: vec!["Apply supplemental oxygen to target saturation".to_string()],
        },
        TriggerDefinition {
            id: TriggerId::new("hypotension"),
            label: "Hypotension".to_string(),
            severity: Severity::Critical,
            detail: "Systolic blood pressure is below 90 mmHg.".to_string(),
            mandated_actions: vec![
                "Establish large-bore IV access".to_string(),
                "Begin isotonic fluid bolus per protocol".to_string(),
            ],
        },
        TriggerDefinition {
            id: TriggerId::new("tachycardia_severe"),
            label: "Severe tachycardia".to_string(),
            severity: Severity::Urgent,
            detail: "Heart rate is 130 bpm or higher.".to_string(),
            mandated_actions: vec!["Place on continuous cardiac monitor".to_string()],
        },
        TriggerDefinition {
            id: TriggerId::new("fever_sepsis"),
            label: "Fever concerning for sepsis".to_string(),
            severity: Severity::Urgent,
            detail: "Temperature is 39.5C or higher.".to_string(),
            mandated_actions: vec!["Draw blood cultures and serum lactate".to_string()],
        },
        TriggerDefinition {
            id: TriggerId::new("hemodynamic_combo"),
            label: "Hypoxemia with chest pain".to_string(),
            severity: Severity::Critical,
            detail: "Low oxygen saturation combined with chest pain.".to_string(),
            mandated_actions: vec!["Prepare for emergent cardiopulmonary stabilization".to_string()],
        },
        TriggerDefinition {
            id: TriggerId::new("pregnancy_bleeding"),
            label: "Bleeding in pregnancy".to_string(),
            severity: Severity::Urgent,
            detail: "Bleeding reported in a patient with a pregnancy risk factor.".to_string(),
            mandated_actions: vec!["Obtain emergent obstetric evaluation".to_string()],
        },
        TriggerDefinition {
            id: TriggerId::new("gi_bleed"),
            label: "Gastrointestinal bleed".to_string(),
            severity: Severity::Urgent,
            detail: "Hematemesis or melena reported.".to_string(),
            mandated_actions: vec!["Type and crossmatch blood".to_string()],
        },
        TriggerDefinition {
            id: TriggerId::new("syncope"),
            label: "Syncope".to_string(),
            severity: Severity::Urgent,
            detail: "Loss of consciousness (syncope) reported.".to_string(),
            mandated_actions: vec!["Obtain orthostatic vital signs and ECG".to_string()],
        },
        TriggerDefinition {
            id: TriggerId::new("multi_category"),
            label: "Multiple concurrent categories".to_string(),
            severity: Severity::Urgent,
            detail: "Two or more distinct trigger categories fired concurrently.".to_string(),
            mandated_actions: Vec::new(),
        },
        TriggerDefinition {
            id: TriggerId::new("qsofa_high_risk"),
            label: "qSOFA high risk".to_string(),
            severity: Severity::Info,
            detail: "Quick SOFA score is 2 or higher.".to_string(),
            mandated_actions: Vec::new(),
        },
        TriggerDefinition {
            id: TriggerId::new("shock_index_high"),
            label: "Elevated shock index".to_string(),
            severity: Severity::Info,
            detail: "Shock index (heart rate / systolic BP) is 0.9 or higher.".to_string(),
            mandated_actions: Vec::new(),
        },
    ]
}

/// Safety rulebook construction and validation errors.
#[derive(Debug, Error)]
pub enum RulebookError {
    /// Structural validation failure.
    #[error("invalid safety rulebook: {0}")]
    Invalid(String),
    /// Canonical hashing failure.
    #[error(transparent)]
    Hash(#[from] HashError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rulebook_validates() {
        let rulebook = SafetyRulebook::builtin().expect("builtin rulebook is valid");
        assert_eq!(rulebook.version, RULEBOOK_VERSION);
    }

    #[test]
    fn builtin_rulebook_contains_canonical_minimum_set() {
        let rulebook = SafetyRulebook::builtin().expect("builtin rulebook");
        for id in [
            "cardiopulmonary_red_flag",
            "stroke_red_flag",
            "hypoxemia",
            "hypotension",
            "tachycardia_severe",
            "fever_sepsis",
            "hemodynamic_combo",
            "pregnancy_bleeding",
            "gi_bleed",
            "syncope",
            "multi_category",
        ] {
            assert!(rulebook.get(id).is_some(), "missing canonical trigger {id}");
        }
    }

    #[test]
    fn duplicate_trigger_ids_rejected() {
        let mut rulebook = SafetyRulebook::builtin().expect("builtin rulebook");
        let dup = rulebook.triggers[0].clone();
        rulebook.triggers.push(dup);
        let err = rulebook.validate().expect_err("duplicate rejected");
        assert!(matches!(err, RulebookError::Invalid(_)));
    }

    #[test]
    fn rehashing_reproduces_hash() {
        let rulebook = SafetyRulebook::builtin().expect("builtin rulebook");
        let hash_a = rulebook.content_sha256().expect("hash");
        let hash_b = rulebook.content_sha256().expect("hash");
        assert_eq!(hash_a, hash_b);
    }
}
