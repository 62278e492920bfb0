// src/policy/mod.rs
// ============================================================================
// Module: Triage Policy Pack
// Description: Policy pack data model, loader, and embedded default pack.
// Purpose: Back the Evidence & Policy stage with a versioned, hashed,
//          content-addressable set of protocol snippets.
// Dependencies: crate::core::hashing, crate::core::identifiers, serde_json
// ============================================================================

//! ## Overview
//! A policy pack is loaded once at startup: from a file path when
//! `policy.pack_path` is configured, otherwise from an embedded default
//! pack so the engine works out of the box and in tests without a
//! filesystem dependency. Loading validates structural invariants and
//! computes a stable SHA-256 over the canonical JSON serialization; both
//! the validated pack and its hash are handed to the Evidence stage as an
//! immutable snapshot, safe for concurrent reads across requests.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::PolicyId;
use crate::core::structured_intake::StructuredIntake;

/// Comparison operator for a numeric vitals matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    /// Strictly less than.
    Lt,
    /// Less than or equal to.
    Le,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal to.
    Ge,
    /// Equal to.
    Eq,
}

impl ComparisonOp {
    /// Evaluates `lhs <op> rhs`.
    #[must_use]
    pub fn evaluate(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => (lhs - rhs).abs() < f64::EPSILON,
        }
    }
}

/// A single numeric vitals matcher, e.g. `spo2 < 92`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalMatcher {
    /// Vitals field name (`heart_rate`, `systolic_bp`, `diastolic_bp`,
    /// `temperature_c`, `spo2`, `respiratory_rate`).
    pub field: String,
    /// Comparison operator.
    pub op: ComparisonOp,
    /// Right-hand side threshold.
    pub value: f64,
}

/// Known vitals field names a [`VitalMatcher`] may reference.
const KNOWN_VITALS_FIELDS: &[&str] =
    &["heart_rate", "systolic_bp", "diastolic_bp", "temperature_c", "spo2", "respiratory_rate"];

/// The matcher predicates attached to a single policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyMatchers {
    /// All of these symptom tokens must be present.
    pub symptoms_all_of: Vec<String>,
    /// Any one of these symptom tokens must be present.
    pub symptoms_any_of: Vec<String>,
    /// Any one of these risk-factor tokens must be present.
    pub risk_factors_any_of: Vec<String>,
    /// All of these vitals comparisons must hold.
    pub vitals: Vec<VitalMatcher>,
}

impl PolicyMatchers {
    /// Evaluates every matcher against a [`StructuredIntake`] and the raw
    /// intake's vitals. A policy matches when all configured matcher groups
    /// succeed (an empty group is vacuously satisfied).
    #[must_use]
    pub fn matches(&self, intake: &StructuredIntake, vitals: &crate::core::intake::Vitals) -> bool {
        let all_of_ok = self.symptoms_all_of.iter().all(|token| intake.has_symptom(token));
        let any_of_ok = self.symptoms_any_of.is_empty()
            || self.symptoms_any_of.iter().any(|token| intake.has_symptom(token));
        let risk_ok = self.risk_factors_any_of.is_empty()
            || self.risk_factors_any_of.iter().any(|token| intake.has_risk_factor(token));
        let vitals_ok = self.vitals.iter().all(|matcher| vital_matches(matcher, vitals));
        all_of_ok && any_of_ok && risk_ok && vitals_ok
    }
}

/// Reads the named vitals field and evaluates the matcher against it.
/// A matcher referencing an absent vitals value never matches.
fn vital_matches(matcher: &VitalMatcher, vitals: &crate::core::intake::Vitals) -> bool {
    let observed = match matcher.field.as_str() {
        "heart_rate" => vitals.heart_rate,
        "systolic_bp" => vitals.systolic_bp,
        "diastolic_bp" => vitals.diastolic_bp,
        "temperature_c" => vitals.temperature_c,
        "spo2" => vitals.spo2,
        "respiratory_rate" => vitals.respiratory_rate,
        _ => None,
    };
    observed.is_some_and(|value| matcher.op.evaluate(value, matcher.value))
}

/// A single matchable policy entry in a policy pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique, non-empty identifier.
    pub id: PolicyId,
    /// Human-readable title.
    pub title: String,
    /// Free-form citation text.
    pub citation: String,
    /// Matcher predicates.
    pub matchers: PolicyMatchers,
    /// Ordered, non-empty list of imperative recommended actions.
    pub recommended_actions: Vec<String>,
}

/// A versioned, ordered collection of policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPack {
    /// Pack version string.
    pub version: String,
    /// Policies in matching priority order.
    pub policies: Vec<Policy>,
}

impl PolicyPack {
    /// Validates structural invariants: unique non-empty policy ids,
    /// matchers referencing only known vitals fields, and non-empty
    /// recommended actions.
    ///
    /// # Errors
    /// Returns [`PolicyPackError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), PolicyPackError> {
        if self.policies.is_empty() {
            return Err(PolicyPackError::Invalid("policy pack must contain at least one policy".to_string()));
        }
        let mut seen = HashSet::new();
        for policy in &self.policies {
            if policy.id.as_str().is_empty() {
                return Err(PolicyPackError::Invalid("policy id must be non-empty".to_string()));
            }
            if !seen.insert(policy.id.clone()) {
                return Err(PolicyPackError::Invalid(format!("duplicate policy id: {}", policy.id)));
            }
            if policy.recommended_actions.is_empty() {
                return Err(PolicyPackError::Invalid(format!("policy {} has no recommended actions", policy.id)));
            }
            for matcher in &policy.matchers.vitals {
                if !KNOWN_VITALS_FIELDS.contains(&matcher.field.as_str()) {
                    return Err(PolicyPackError::Invalid(format!(
                        "policy {} references unknown vitals field: {}",
                        policy.id, matcher.field
                    )));
                }
            }
        }
        Ok(())
    }

    /// Computes the SHA-256 hex digest over the canonical JSON
    /// serialization of this pack (sorted keys, compact separators, UTF-8,
    /// no trailing newline).
    ///
    /// # Errors
    /// Returns [`PolicyPackError::Hash`] when canonicalization fails.
    pub fn content_sha256(&self) -> Result<String, PolicyPackError> {
        hash_canonical_json(self).map_err(PolicyPackError::Hash)
    }
}

/// A loaded, validated, hashed policy pack plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPolicyPack {
    /// The validated pack.
    pub pack: PolicyPack,
    /// SHA-256 hex digest of the pack's canonical JSON serialization.
    pub sha256: String,
    /// Human-readable source (a path, or `"embedded_default"`).
    pub source: String,
}

/// Loads, validates, and hashes a policy pack.
///
/// # Errors
/// Returns [`PolicyPackError`] when the configured path is missing or the
/// document fails to parse or validate. This is a fatal, startup-only
/// error.
pub fn load(pack_path: Option<&str>) -> Result<LoadedPolicyPack, PolicyPackError> {
    match pack_path {
        Some(path) => load_from_path(Path::new(path)),
        None => load_embedded_default(),
    }
}

/// Loads a policy pack from a filesystem path.
fn load_from_path(path: &Path) -> Result<LoadedPolicyPack, PolicyPackError> {
    let bytes = fs::read(path).map_err(|err| PolicyPackError::Io(err.to_string()))?;
    let text = std::str::from_utf8(&bytes).map_err(|_| PolicyPackError::Invalid("pack file must be utf-8".to_string()))?;
    let pack: PolicyPack = serde_json::from_str(text).map_err(|err| PolicyPackError::Parse(err.to_string()))?;
    finalize(pack, path.display().to_string())
}

/// Loads the embedded default policy pack, used when `policy.pack_path`
/// is unset.
fn load_embedded_default() -> Result<LoadedPolicyPack, PolicyPackError> {
    finalize(default_pack(), "embedded_default".to_string())
}

/// Parses a policy pack from an in-memory JSON document, bypassing the
/// filesystem. Exposed for tests and for embedding callers that source a
/// pack from a non-file store.
///
/// # Errors
/// Returns [`PolicyPackError`] when the document fails to parse or
/// validate.
pub fn load_from_str(text: &str, source: impl Into<String>) -> Result<LoadedPolicyPack, PolicyPackError> {
    let pack: PolicyPack = serde_json::from_str(text).map_err(|err| PolicyPackError::Parse(err.to_string()))?;
    finalize(pack, source.into())
}

/// Validates and hashes a parsed pack.
fn finalize(pack: PolicyPack, source: String) -> Result<LoadedPolicyPack, PolicyPackError> {
    pack.validate()?;
    let sha256 = pack.content_sha256()?;
    Ok(LoadedPolicyPack {
        pack,
        sha256,
        source,
    })
}

/// Selects up to `top_k` matching policies in pack order.
#[must_use]
pub fn select_matching<'a>(
    pack: &'a PolicyPack,
    intake: &StructuredIntake,
    vitals: &crate::core::intake::Vitals,
    top_k: usize,
) -> Vec<&'a Policy> {
    pack.policies
        .iter()
        .filter(|policy| policy.matchers.matches(intake, vitals))
        .take(top_k)
        .collect()
}

/// Builds the small built-in default policy pack covering the canonical
/// safety-trigger categories, so the engine is usable out-of-the-box and
/// in tests without a filesystem dependency.
#[must_use]
pub fn default_pack() -> PolicyPack {
    PolicyPack {
        version: "embedded-default-1".to_string(),
        policies: vec![
            Policy {
                id: PolicyId::new("cp-acs-protocol"),
                title: "Acute Coronary Syndrome Protocol".to_string(),
                citation: "ACC/AHA Chest Pain Guideline".to_string(),
                matchers: PolicyMatchers {
                    symptoms_any_of: vec!["chest_pain".to_string()],
                    ..PolicyMatchers::default()
                },
                recommended_actions: vec![
                    "Obtain 12-lead ECG within 10 minutes".to_string(),
                    "Establish IV access and send troponin".to_string(),
                    "Administer aspirin per protocol if no contraindication".to_string(),
                ],
            },
            Policy {
                id: PolicyId::new("stroke-fast-protocol"),
                title: "Acute Stroke FAST Protocol".to_string(),
                citation: "AHA/ASA Acute Stroke Guideline".to_string(),
                matchers: PolicyMatchers {
                    symptoms_any_of: vec![
                        "slurred_speech".to_string(),
                        "facial_droop".to_string(),
                        "unilateral_weakness".to_string(),
                        "aphasia".to_string(),
                    ],
                    ..PolicyMatchers::default()
                },
                recommended_actions: vec![
                    "Document last-known-well time immediately".to_string(),
                    "Activate emergent neurologic evaluation".to_string(),
                    "Obtain emergent non-contrast head CT".to_string(),
                ],
            },
            Policy {
                id: PolicyId::new("hypoxemia-protocol"),
                title: "Hypoxemic Respiratory Distress Protocol".to_string(),
                citation: "Internal respiratory distress pathway".to_string(),
                matchers: PolicyMatchers {
                    vitals: vec![VitalMatcher {
                        field: "spo2".to_string(),
                        op: ComparisonOp::Lt,
                        value: 92.0,
                    }],
                    ..PolicyMatchers::default()
                },
                recommended_actions: vec![
                    "Apply supplemental oxygen to target saturation".to_string(),
                    "Obtain chest radiograph".to_string(),
                ],
            },
            Policy {
                id: PolicyId::new("sepsis-protocol"),
                title: "Sepsis Screening Protocol".to_string(),
                citation: "Surviving Sepsis Campaign bundle".to_string(),
                matchers: PolicyMatchers {
                    vitals: vec![VitalMatcher {
                        field: "temperature_c".to_string(),
                        op: ComparisonOp::Ge,
                        value: 39.5,
                    }],
                    ..PolicyMatchers::default()
                },
                recommended_actions: vec![
                    "Draw blood cultures and serum lactate".to_string(),
                    "Begin broad-spectrum antibiotics per sepsis bundle".to_string(),
                    "Begin isotonic fluid resuscitation".to_string(),
                ],
            },
            Policy {
                id: PolicyId::new("gi-bleed-protocol"),
                title: "Upper GI Bleed Protocol".to_string(),
                citation: "ACG Upper GI Bleeding Guideline".to_string(),
                matchers: PolicyMatchers {
                    symptoms_any_of: vec!["hematemesis".to_string(), "melena".to_string()],
                    ..PolicyMatchers::default()
                },
                recommended_actions: vec![
                    "Type and crossmatch blood".to_string(),
                    "Consult gastroenterology for urgent endoscopy".to_string(),
                ],
            },
            Policy {
                id: PolicyId::new("routine-return-precautions"),
                title: "Routine Visit Return Precautions".to_string(),
                citation: "Internal primary-care return-precautions sheet".to_string(),
                matchers: PolicyMatchers::default(),
                recommended_actions: vec!["Follow up with primary care if symptoms persist beyond 3 days".to_string()],
            },
        ],
    }
}

/// Policy pack loading, validation, and hashing errors.
#[derive(Debug, Error)]
pub enum PolicyPackError {
    /// I/O failure while reading the pack file.
    #[error("policy pack io error: {0}")]
    Io(String),
    /// JSON parsing error.
    #[error("policy pack parse error: {0}")]
    Parse(String),
    /// Structural validation failure.
    #[error("invalid policy pack: {0}")]
    Invalid(String),
    /// Canonical hashing failure.
    #[error(transparent)]
    Hash(#[from] HashError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::intake::Vitals;

    #[test]
    fn default_pack_validates_and_hashes() {
        let loaded = load(None).expect("embedded default loads");
        assert_eq!(loaded.source, "embedded_default");
        assert_eq!(loaded.sha256.len(), 64);
    }

    #[test]
    fn rehashing_canonical_json_reproduces_hash() {
        let loaded = load(None).expect("loads");
        let rehash = loaded.pack.content_sha256().expect("rehash");
        assert_eq!(loaded.sha256, rehash);
    }

    #[test]
    fn duplicate_policy_ids_are_rejected() {
        let mut pack = default_pack();
        let dup = pack.policies[0].clone();
        pack.policies.push(dup);
        let err = pack.validate().expect_err("duplicate id rejected");
        assert!(matches!(err, PolicyPackError::Invalid(_)));
    }

    #[test]
    fn selection_respects_top_k_and_pack_order() {
        let pack = default_pack();
        let mut intake = StructuredIntake::default();
        intake.symptoms.push("chest_pain".to_string());
        let vitals = Vitals {
            spo2: Some(90.0),
            ..Vitals::default()
        };
        let selected = select_matching(&pack, &intake, &vitals, 1);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id.as_str(), "cp-acs-protocol");
    }

    #[test]
    fn known_fixture_hash_is_stable() {
        let text = r#"{"version":"v1","policies":[{"id":"p1","title":"T","citation":"C","matchers":{},"recommended_actions":["do x"]}]}"#;
        let loaded = load_from_str(text, "fixture").expect("fixture loads");
        let rehash = loaded.pack.content_sha256().expect("rehash");
        assert_eq!(loaded.sha256, rehash);
        assert_eq!(loaded.sha256.len(), 64);
    }

    #[test]
    fn load_reads_and_validates_a_pack_from_a_real_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp pack file");
        let text = r#"{"version":"v1","policies":[{"id":"p1","title":"T","citation":"C","matchers":{},"recommended_actions":["do x"]}]}"#;
        std::io::Write::write_all(&mut file, text.as_bytes()).expect("write fixture");
        let path = file.path().to_str().expect("utf-8 temp path").to_string();

        let loaded = load(Some(&path)).expect("loads from file path");
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.pack.policies[0].id.as_str(), "p1");
    }

    #[test]
    fn load_reports_io_error_for_missing_file() {
        let err = load(Some("/nonexistent/does-not-exist.json")).expect_err("missing file errors");
        assert!(matches!(err, PolicyPackError::Io(_)));
    }
}
