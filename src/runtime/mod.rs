// src/runtime/mod.rs
// ============================================================================
// Module: Pipeline Runtime
// Description: The orchestrator that sequences the five triage stages, plus
//              the cancellation primitive it and the external adapters share.
// Purpose: Group everything that turns standalone stage functions into a
//          runnable pipeline.
// Dependencies: crate::stages, crate::adapter, crate::policy, crate::rulebook
// ============================================================================

//! ## Overview
//! [`TriagePipeline`] is the crate's single public entry point: construct it
//! once from a validated [`crate::config::PipelineConfig`], then call
//! [`TriagePipeline::triage`] per request.

/// Cooperative cancellation handle threaded through the orchestrator.
pub mod cancellation;
/// `TriagePipeline`: sequences the five stages and builds the audit trace.
pub mod orchestrator;

pub use cancellation::CancellationToken;
pub use orchestrator::PIPELINE_VERSION;
pub use orchestrator::PipelineInitError;
pub use orchestrator::TriagePipeline;
