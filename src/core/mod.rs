// src/core/mod.rs
// ============================================================================
// Module: Triage Core Types
// Description: Canonical triage data model shared by every stage.
// Purpose: Provide stable, serializable types for intake, stage outputs,
//          and the final result.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types are the canonical source of truth for any derived API surface
//! (HTTP, NDJSON streaming, CLI, FHIR export). They carry no stage logic.

// ============================================================================
// SECTION: Submodules
// ============================================================================

/// Clinician handoff and patient summary output type.
pub mod communication;
/// Caller-visible pipeline error type.
pub mod error;
/// Policy-grounded recommendations output type.
pub mod evidence;
/// Canonical JSON serialization and SHA-256 digesting.
pub mod hashing;
/// Newtype identifiers for policy and rulebook entries.
pub mod identifiers;
/// Raw patient intake input type.
pub mod intake;
/// Differential considerations and rationale output type.
pub mod reasoning;
/// Final aggregated `TriageResult` and its per-stage trace.
pub mod result;
/// Risk tier, fired triggers, and risk scores output type.
pub mod safety;
/// Normalized, signal-extracted intake view.
pub mod structured_intake;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use communication::CommunicationOutput;
pub use error::TriageError;
pub use evidence::EvidenceOutput;
pub use evidence::ProtocolCitation;
pub use hashing::HashError;
pub use identifiers::PolicyId;
pub use identifiers::TriggerId;
pub use intake::Demographics;
pub use intake::Intake;
pub use intake::Vitals;
pub use reasoning::Backend;
pub use reasoning::ReasoningOutput;
pub use result::StageName;
pub use result::TraceEntry;
pub use result::TriageResult;
pub use safety::RiskScores;
pub use safety::RiskTier;
pub use safety::SafetyOutput;
pub use safety::SafetyTrigger;
pub use safety::Severity;
pub use structured_intake::StructuredIntake;
