// src/core/intake.rs
// ============================================================================
// Module: Triage Core Intake
// Description: Raw patient intake as received at the pipeline entry point.
// Purpose: Define the untrusted-input shape validated before Structuring.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `Intake` mirrors the wire JSON schema exactly. Unknown JSON fields are
//! ignored by `serde` by default; no field here is validated beyond shape
//! — semantic validation (non-empty chief complaint, size limits) happens
//! in the orchestrator before Structuring runs.

use serde::Deserialize;
use serde::Serialize;

/// Patient demographics supplied with an intake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    /// Age in years, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    /// Free-form sex/gender field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
}

/// Structured vital signs. Absent fields mean "unknown", never a sentinel
/// value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// Heart rate in beats per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    /// Systolic blood pressure in mmHg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systolic_bp: Option<f64>,
    /// Diastolic blood pressure in mmHg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diastolic_bp: Option<f64>,
    /// Temperature in degrees Celsius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    /// Peripheral oxygen saturation, percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<f64>,
    /// Respiratory rate in breaths per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<f64>,
}

/// Raw patient intake as received at the pipeline entry point.
///
/// # Invariants
/// - `chief_complaint` is required to be non-empty after trimming; the
///   orchestrator rejects the request with `TriageError::IntakeInvalid`
///   before Structuring runs otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intake {
    /// Primary presenting complaint, verbatim.
    pub chief_complaint: String,
    /// Brief history of present illness.
    #[serde(default)]
    pub history: String,
    /// Patient demographics.
    #[serde(default)]
    pub demographics: Demographics,
    /// Structured vital signs.
    #[serde(default)]
    pub vitals: Vitals,
    /// Ordered free-text descriptions of attached images.
    #[serde(default)]
    pub image_descriptions: Vec<String>,
    /// Ordered data-URI image references
    /// (`data:image/<subtype>;base64,<payload>`).
    #[serde(default)]
    pub image_data_urls: Vec<String>,
    /// Ordered prior clinical notes.
    #[serde(default)]
    pub prior_notes: Vec<String>,
}

impl Intake {
    /// Returns `true` when `chief_complaint` is non-empty after trimming.
    #[must_use]
    pub fn has_chief_complaint(&self) -> bool {
        !self.chief_complaint.trim().is_empty()
    }
}
