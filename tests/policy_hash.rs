// tests/policy_hash.rs
// ============================================================================
// Integration test: canonical-JSON hashing of a policy pack is stable across
// key order and reproducible from a literal fixture document.
// ============================================================================

use triage_core::policy;

/// A minimal, literal policy pack document with its keys in a deliberately
/// non-canonical order (`version` before `policies`, `title` before `id`).
const FIXTURE_JSON: &str = r#"{
    "version": "v1",
    "policies": [
        {
            "title": "T",
            "id": "p1",
            "citation": "C",
            "recommended_actions": ["do x"],
            "matchers": {}
        }
    ]
}"#;

/// The same document with every top-level and nested key re-ordered.
const FIXTURE_JSON_REORDERED: &str = r#"{
    "policies": [
        {
            "id": "p1",
            "matchers": {},
            "recommended_actions": ["do x"],
            "citation": "C",
            "title": "T"
        }
    ],
    "version": "v1"
}"#;

/// The published SHA-256 hex digest of `FIXTURE_JSON`'s canonical JSON
/// serialization: `{"policies":[{"citation":"C","id":"p1","matchers":{
/// "risk_factors_any_of":[],"symptoms_all_of":[],"symptoms_any_of":[],
/// "vitals":[]},"recommended_actions":["do x"],"title":"T"}],"version":"v1"}`.
const FIXTURE_SHA256: &str = "63800a17ea02e48f394ac64aa2bfc1652eb7317310d489b73e12a4996c5bd31d";

#[test]
fn fixture_hash_matches_published_digest() {
    let loaded = policy::load_from_str(FIXTURE_JSON, "fixture").expect("fixture loads");
    assert_eq!(loaded.sha256, FIXTURE_SHA256);
}

#[test]
fn fixture_hash_is_stable_across_key_order() {
    let a = policy::load_from_str(FIXTURE_JSON, "fixture-a").expect("fixture a loads");
    let b = policy::load_from_str(FIXTURE_JSON_REORDERED, "fixture-b").expect("fixture b loads");
    assert_eq!(a.sha256, b.sha256);
    assert_eq!(a.sha256, FIXTURE_SHA256);
}

#[test]
fn rehashing_reproduces_the_load_time_digest() {
    let loaded = policy::load_from_str(FIXTURE_JSON, "fixture").expect("fixture loads");
    let rehash = loaded.pack.content_sha256().expect("rehash succeeds");
    assert_eq!(loaded.sha256, rehash);
}

#[test]
fn embedded_default_pack_hash_is_reproducible() {
    let loaded = policy::load(None).expect("embedded default loads");
    assert_eq!(loaded.source, "embedded_default");
    let rehash = loaded.pack.content_sha256().expect("rehash succeeds");
    assert_eq!(loaded.sha256, rehash);
}
