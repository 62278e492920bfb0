// src/core/hashing.rs
// ============================================================================
// Module: Triage Core Hashing
// Description: Canonical JSON serialization and SHA-256 digesting.
// Purpose: Produce reproducible content hashes for policy packs and the
//          safety rulebook.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Canonicalization follows RFC 8785-style JSON canonicalization (JCS):
//! object keys sorted, no insignificant whitespace, UTF-8, no trailing
//! newline. `policy_pack_sha256` and `safety_rules_version` content hashes
//! are both produced by this module so the canonicalization rule is defined
//! exactly once.

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

/// Error produced when a value cannot be canonicalized.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// The value failed canonical JSON serialization.
    #[error("canonical json serialization failed: {0}")]
    Canonicalization(String),
}

/// Serializes a value to canonical JSON bytes (sorted keys, compact
/// separators, UTF-8, no trailing newline).
///
/// # Errors
/// Returns [`HashError::Canonicalization`] when `value` cannot be
/// serialized.
pub fn canonical_json_bytes<T>(value: &T) -> Result<Vec<u8>, HashError>
where
    T: Serialize + ?Sized,
{
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Computes the SHA-256 digest, as lowercase hex, of the canonical JSON
/// serialization of `value`.
///
/// # Errors
/// Returns [`HashError::Canonicalization`] when `value` cannot be
/// serialized.
pub fn hash_canonical_json<T>(value: &T) -> Result<String, HashError>
where
    T: Serialize + ?Sized,
{
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(&bytes))
}

/// Computes the SHA-256 digest of raw bytes, as lowercase hex.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex_encode(&digest)
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        out.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_bytes_sort_keys_and_drop_whitespace() {
        let value = json!({"b": 1, "a": 2});
        let bytes = canonical_json_bytes(&value).expect("serialize");
        assert_eq!(bytes, br#"{"a":2,"b":1}"#);
    }

    #[test]
    fn hash_is_stable_across_key_order() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(
            hash_canonical_json(&a).expect("hash"),
            hash_canonical_json(&b).expect("hash")
        );
    }

    #[test]
    fn empty_bytes_hash_matches_known_digest() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }
}
