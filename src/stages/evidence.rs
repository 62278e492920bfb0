// src/stages/evidence.rs
// ============================================================================
// Module: Evidence & Policy Stage
// Description: Selects matching policies from the loaded policy pack and
//              assembles citations and recommended actions.
// Purpose: Wire the loaded policy pack against a StructuredIntake/Vitals
//          pair.
// Dependencies: crate::policy, crate::core::{evidence, structured_intake,
//               intake}
// ============================================================================

//! ## Overview
//! Thin wiring layer over [`crate::policy::select_matching`]: this stage
//! never errors at request time, since the policy pack is validated once
//! at load time by [`crate::policy::load`].

use crate::core::evidence::EvidenceOutput;
use crate::core::evidence::ProtocolCitation;
use crate::core::intake::Vitals;
use crate::core::structured_intake::StructuredIntake;
use crate::policy::LoadedPolicyPack;

/// Produces an [`EvidenceOutput`] by matching `pack`'s policies against
/// `structured`/`vitals`, selecting up to `top_k` in pack order.
#[must_use]
pub fn evaluate(pack: &LoadedPolicyPack, structured: &StructuredIntake, vitals: &Vitals, top_k: usize) -> EvidenceOutput {
    let selected = crate::policy::select_matching(&pack.pack, structured, vitals, top_k);

    let mut recommended_actions_from_policy = Vec::new();
    let mut protocol_citations = Vec::new();
    for policy in &selected {
        for action in &policy.recommended_actions {
            if !recommended_actions_from_policy.contains(action) {
                recommended_actions_from_policy.push(action.clone());
            }
        }
        protocol_citations.push(ProtocolCitation {
            policy_id: policy.id.clone(),
            title: policy.title.clone(),
            citation: policy.citation.clone(),
            recommended_actions: policy.recommended_actions.clone(),
        });
    }

    EvidenceOutput {
        recommended_actions_from_policy,
        protocol_citations,
        policy_pack_sha256: pack.sha256.clone(),
        policy_pack_source: pack.source.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy;

    #[test]
    fn selects_matching_default_pack_policies() {
        let loaded = policy::load(None).expect("embedded default pack loads");
        let structured = StructuredIntake {
            symptoms: vec!["chest_pain".to_string()],
            ..StructuredIntake::default()
        };
        let vitals = Vitals::default();
        let output = evaluate(&loaded, &structured, &vitals, 2);
        assert!(!output.policy_pack_sha256.is_empty());
        assert_eq!(output.policy_pack_sha256, loaded.sha256);
    }

    #[test]
    fn unmatched_presentation_only_selects_the_catch_all_policy() {
        let loaded = policy::load(None).expect("embedded default pack loads");
        let structured = StructuredIntake::default();
        let vitals = Vitals::default();
        let output = evaluate(&loaded, &structured, &vitals, 2);
        assert_eq!(output.protocol_citations.len(), 1);
        assert_eq!(output.protocol_citations[0].policy_id.as_str(), "routine-return-precautions");
        assert!(output.recommended_actions_from_policy.len() <= output.protocol_citations.iter().map(|c| c.recommended_actions.len()).sum());
    }
}
