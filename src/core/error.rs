// src/core/error.rs
// ============================================================================
// Module: Triage Core Errors
// Description: Caller-visible error type for the pipeline entry point.
// Purpose: Bound the set of errors that may cross the orchestrator boundary.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Only three error shapes may reach a caller of
//! [`crate::runtime::TriagePipeline::triage`]: invalid input, cancellation,
//! and an internal error that should be rare because stages degrade rather
//! than fail. Everything else (adapter transport failures, rewrite
//! validation failures, circuit-breaker skips) is absorbed into the
//! `*_backend_error` / `*_backend_skipped_reason` fields on the relevant
//! stage output instead.

/// Error surfaced to callers of the pipeline entry point.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    /// The intake failed structural or size validation before Structuring
    /// ran.
    #[error("intake invalid: {reason}")]
    IntakeInvalid {
        /// Machine-readable reason code.
        reason: String,
    },
    /// The request was cancelled before Safety completed.
    #[error("request cancelled")]
    Cancelled,
    /// An unexpected internal error occurred. Should be rare: stage errors
    /// are expected to degrade rather than propagate here.
    #[error("internal error: {message}")]
    Internal {
        /// Diagnostic message. Never contains clinical free text.
        message: String,
    },
}

impl TriageError {
    /// Machine-readable reason code for this error, stable for callers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::IntakeInvalid {
                ..
            } => "intake_invalid",
            Self::Cancelled => "cancelled",
            Self::Internal {
                ..
            } => "internal",
        }
    }
}
