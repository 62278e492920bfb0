// src/catalog/mod.rs
// ============================================================================
// Module: Triage Catalogs
// Description: Symptom, risk-factor, and PHI-pattern catalogs used by the
//              Intake Structuring stage.
// Purpose: Provide the fixed keyword tables and negation/normalization
//          helpers the Intake Structuring stage needs, independent of stage
//          orchestration.
// Dependencies: unicode-normalization, regex
// ============================================================================

//! ## Overview
//! Catalogs are declared as ordered slices so that catalog declaration
//! order then insertion order is a property of iteration order, not a
//! separate sort pass. Matching works on a normalized (NFKC,
//! whitespace-collapsed, lowercased) haystack built once per intake and
//! reused across symptom, risk-factor, and negation lookups.

use std::collections::HashSet;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// A canonical token and the keyword phrases that signal its presence.
pub struct CatalogEntry {
    /// Canonical token emitted into `StructuredIntake::symptoms` /
    /// `risk_factors`.
    pub token: &'static str,
    /// Keyword phrases matched as substrings of the normalized haystack.
    pub keywords: &'static [&'static str],
}

/// Canonical symptom catalog, in declaration order.
pub const SYMPTOM_CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        token: "chest_pain",
        keywords: &["chest pain", "cp", "tightness in chest", "chest tightness", "chest pressure"],
    },
    CatalogEntry {
        token: "dyspnea",
        keywords: &["sob", "shortness of breath", "dyspnea", "cannot catch breath", "can't catch my breath", "trouble breathing"],
    },
    CatalogEntry {
        token: "slurred_speech",
        keywords: &["slurred speech", "slurring words", "garbled speech"],
    },
    CatalogEntry {
        token: "facial_droop",
        keywords: &["facial droop", "face drooping", "one side of face"],
    },
    CatalogEntry {
        token: "unilateral_weakness",
        keywords: &["one-sided weakness", "right arm weakness", "left arm weakness", "right-sided weakness", "left-sided weakness", "arm weakness", "leg weakness"],
    },
    CatalogEntry {
        token: "aphasia",
        keywords: &["aphasia", "cannot find words", "trouble speaking"],
    },
    CatalogEntry {
        token: "syncope",
        keywords: &["syncope", "passed out", "fainted", "fainting", "blacked out"],
    },
    CatalogEntry {
        token: "hematemesis",
        keywords: &["hematemesis", "vomiting blood", "coughing up blood", "blood in vomit"],
    },
    CatalogEntry {
        token: "melena",
        keywords: &["melena", "black stool", "tarry stool", "blood in stool"],
    },
    CatalogEntry {
        token: "vaginal_bleeding",
        keywords: &["vaginal bleeding", "bleeding heavily", "heavy bleeding"],
    },
    CatalogEntry {
        token: "altered_mental_status",
        keywords: &["confusion", "confused", "altered mental status", "not making sense", "disoriented", "lethargic"],
    },
    CatalogEntry {
        token: "fever",
        keywords: &["fever", "feels hot", "chills"],
    },
    CatalogEntry {
        token: "sore_throat",
        keywords: &["sore throat", "throat pain", "scratchy throat"],
    },
    CatalogEntry {
        token: "headache",
        keywords: &["headache", "head pain"],
    },
    CatalogEntry {
        token: "abdominal_pain",
        keywords: &["abdominal pain", "stomach pain", "belly pain"],
    },
];

/// Canonical risk-factor catalog, in declaration order.
pub const RISK_FACTOR_CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        token: "diabetes",
        keywords: &["diabetes", "diabetic", "type 2 diabetes", "type 1 diabetes"],
    },
    CatalogEntry {
        token: "hypertension",
        keywords: &["hypertension", "high blood pressure"],
    },
    CatalogEntry {
        token: "pregnancy",
        keywords: &["pregnant", "pregnancy", "weeks gestation"],
    },
    CatalogEntry {
        token: "anticoagulation",
        keywords: &["warfarin", "coumadin", "xarelto", "eliquis", "anticoagulant", "blood thinner"],
    },
    CatalogEntry {
        token: "immunocompromise",
        keywords: &["immunocompromised", "chemotherapy", "on chemo", "transplant recipient", "hiv"],
    },
    CatalogEntry {
        token: "prior_mi",
        keywords: &["prior heart attack", "prior mi", "previous myocardial infarction", "history of heart attack"],
    },
    CatalogEntry {
        token: "prior_stroke",
        keywords: &["prior stroke", "history of stroke", "previous cva"],
    },
    CatalogEntry {
        token: "smoker",
        keywords: &["smoker", "smokes", "pack year"],
    },
];

/// Cue phrases that negate a keyword match within the configured
/// negation-window word count (`IntakeConfig::negation_window`).
const NEGATION_CUES: &[&str] = &["no", "denies", "without", "negative for", "not"];

/// Symptom tokens whose presence requires a full vitals panel.
pub const VITALS_REQUIRED_SYMPTOMS: &[&str] = &[
    "chest_pain",
    "dyspnea",
    "syncope",
    "altered_mental_status",
    "hematemesis",
    "melena",
    "vaginal_bleeding",
];

/// A PHI heuristic pattern, named for the `field:pattern_name` pairs
/// recorded in `StructuredIntake::phi_hits`.
pub struct PhiPattern {
    /// Stable pattern name (e.g. `"email"`).
    pub name: &'static str,
    /// Regular expression matched against raw (non-normalized) text.
    pub regex: &'static str,
}

/// Heuristic PHI detection patterns. Matching only ever records
/// `field:pattern_name`; the matched substring itself is discarded.
pub fn phi_patterns() -> Vec<PhiPattern> {
    vec![
        PhiPattern {
            name: "email",
            regex: r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}",
        },
        PhiPattern {
            name: "phone",
            regex: r"(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
        },
        PhiPattern {
            name: "ssn",
            regex: r"\b\d{3}-\d{2}-\d{4}\b",
        },
        PhiPattern {
            name: "mrn",
            regex: r"(?i)\bmrn[:\s#]*\d{5,}\b",
        },
        PhiPattern {
            name: "dob",
            regex: r"\b(?:0[1-9]|1[0-2])[/-](?:0[1-9]|[12]\d|3[01])[/-](?:19|20)\d{2}\b",
        },
    ]
}

/// Normalizes text for catalog matching: Unicode NFKC normalization,
/// lowercasing, and whitespace collapsing.
#[must_use]
pub fn normalize_for_matching(text: &str) -> String {
    let nfkc: String = text.nfkc().collect();
    let lowered = nfkc.to_lowercase();
    collapse_whitespace(&lowered)
}

/// Collapses any run of whitespace into a single ASCII space and trims the
/// result.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Returns the canonical tokens from `catalog` whose keywords appear in
/// `haystack` and are not suppressed by a preceding negation cue within
/// `negation_window` words.
#[must_use]
pub fn extract_tokens(haystack: &str, catalog: &[CatalogEntry], negation_window: usize) -> Vec<String> {
    let words: Vec<&str> = haystack.split(' ').filter(|w| !w.is_empty()).collect();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for entry in catalog {
        if seen.contains(entry.token) {
            continue;
        }
        for keyword in entry.keywords {
            if keyword_matches_unnegated(&words, keyword, negation_window) {
                seen.insert(entry.token);
                out.push(entry.token.to_string());
                break;
            }
        }
    }
    out
}

/// Returns `true` when `keyword` appears as a word-run within `words` and
/// is not immediately preceded (within `negation_window` words) by a
/// negation cue.
fn keyword_matches_unnegated(words: &[&str], keyword: &str, negation_window: usize) -> bool {
    let keyword_words: Vec<&str> = keyword.split(' ').filter(|w| !w.is_empty()).collect();
    if keyword_words.is_empty() || keyword_words.len() > words.len() {
        return false;
    }
    for start in 0..=(words.len() - keyword_words.len()) {
        if words[start..start + keyword_words.len()] == keyword_words[..] {
            if !is_negated(words, start, negation_window) {
                return true;
            }
        }
    }
    false
}

/// Returns `true` when a negation cue appears within `window` words
/// immediately before `match_start`.
fn is_negated(words: &[&str], match_start: usize, window: usize) -> bool {
    let lookback_start = match_start.saturating_sub(window);
    let preceding = &words[lookback_start..match_start];
    for cue in NEGATION_CUES {
        let cue_words: Vec<&str> = cue.split(' ').collect();
        if cue_words.len() > preceding.len() {
            continue;
        }
        for start in 0..=(preceding.len() - cue_words.len()) {
            if preceding[start..start + cue_words.len()] == cue_words[..] {
                return true;
            }
        }
    }
    false
}

/// Scans `text` for every configured PHI pattern and returns the matching
/// pattern names (never the matched substrings).
#[must_use]
pub fn detect_phi_patterns(text: &str) -> Vec<&'static str> {
    let mut hits = Vec::new();
    for pattern in phi_patterns() {
        if let Ok(regex) = Regex::new(pattern.regex) {
            if regex.is_match(text) {
                hits.push(pattern.name);
            }
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_for_matching("  Chest   PAIN\n\n"), "chest pain");
    }

    #[test]
    fn extract_tokens_finds_chest_pain() {
        let haystack = normalize_for_matching("patient reports chest pain radiating to left arm");
        let tokens = extract_tokens(&haystack, SYMPTOM_CATALOG, 4);
        assert!(tokens.iter().any(|t| t == "chest_pain"));
    }

    #[test]
    fn negation_window_suppresses_nearby_match() {
        let haystack = normalize_for_matching("patient denies any chest pain today");
        let tokens = extract_tokens(&haystack, SYMPTOM_CATALOG, 4);
        assert!(!tokens.iter().any(|t| t == "chest_pain"));
    }

    #[test]
    fn negation_outside_window_does_not_suppress() {
        let haystack = normalize_for_matching(
            "patient denies fever and cough and nausea and vomiting and has chest pain",
        );
        let tokens = extract_tokens(&haystack, SYMPTOM_CATALOG, 4);
        assert!(tokens.iter().any(|t| t == "chest_pain"));
    }

    #[test]
    fn detects_email_pattern_only_by_name() {
        let hits = detect_phi_patterns("contact patient at jane.doe@example.com for follow up");
        assert_eq!(hits, vec!["email"]);
    }

    #[test]
    fn detects_ssn_pattern() {
        let hits = detect_phi_patterns("ssn 123-45-6789 on file");
        assert!(hits.contains(&"ssn"));
    }
}
