//! Intent-biased chunk scoring (§4.6.4).
//!
//! "Intent" is free-form natural language describing what the user is
//! actually looking for; it biases which chunk/snippet is selected for a
//! hit without participating in the primary ranking score. Query-term
//! extraction here is shared with snippet scoring (§4.6.5), which applies
//! the same term list with a different (smaller) weight.

/// Weight applied to each matched intent term when scoring a candidate
/// chunk (§4.6.4).
pub const INTENT_WEIGHT_CHUNK: f64 = 0.5;

/// Weight applied to each matched intent term when scoring a candidate
/// snippet section (§4.6.5). Deliberately below 1.0 so that strong query
/// matches dominate intent bias.
pub const INTENT_WEIGHT_SNIPPET: f64 = 0.3;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "for", "of", "to", "is", "about", "looking", "notes", "find", "what", "how",
    "and", "or", "in", "on", "with", "my", "me", "i", "that", "this", "are", "was", "be", "it",
];

/// Lowercase, split on whitespace, strip surrounding punctuation while
/// preserving internal hyphens, and keep tokens longer than one
/// character.
fn extract_terms(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| t.chars().count() > 1)
        .collect()
}

/// Extract query terms for chunk/snippet scoring: [`extract_terms`] with
/// no stop-word removal (the query is presumed already intentional).
pub fn extract_query_terms(query: &str) -> Vec<String> {
    extract_terms(query)
}

/// Extract intent terms: [`extract_terms`] with the fixed stop-word list
/// removed (§4.6.4).
pub fn extract_intent_terms(intent: &str) -> Vec<String> {
    extract_terms(intent)
        .into_iter()
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// Score one candidate chunk's text against query and intent terms
/// (§4.6.4): `sum(query terms present) + INTENT_WEIGHT_CHUNK * sum(intent
/// terms present)`.
pub fn score_chunk(text: &str, query_terms: &[String], intent_terms: &[String]) -> f64 {
    let haystack = text.to_lowercase();
    let query_hits = query_terms.iter().filter(|t| haystack.contains(t.as_str())).count() as f64;
    let intent_hits = intent_terms.iter().filter(|t| haystack.contains(t.as_str())).count() as f64;
    query_hits + INTENT_WEIGHT_CHUNK * intent_hits
}

/// Score one candidate snippet section (§4.6.5): same shape as
/// [`score_chunk`] but with [`INTENT_WEIGHT_SNIPPET`].
pub fn score_snippet(text: &str, query_terms: &[String], intent_terms: &[String]) -> f64 {
    let haystack = text.to_lowercase();
    let query_hits = query_terms.iter().filter(|t| haystack.contains(t.as_str())).count() as f64;
    let intent_hits = intent_terms.iter().filter(|t| haystack.contains(t.as_str())).count() as f64;
    query_hits + INTENT_WEIGHT_SNIPPET * intent_hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_preserves_internal_hyphens() {
        let terms = extract_terms("Real-time; analytics, please!");
        assert!(terms.contains(&"real-time".to_string()));
        assert!(terms.contains(&"analytics".to_string()));
    }

    #[test]
    fn filters_single_char_tokens() {
        let terms = extract_terms("a I go");
        assert_eq!(terms, vec!["go".to_string()]);
    }

    #[test]
    fn intent_terms_drop_stop_words() {
        let terms = extract_intent_terms("looking for notes about page load times");
        assert!(!terms.contains(&"looking".to_string()));
        assert!(!terms.contains(&"for".to_string()));
        assert!(!terms.contains(&"about".to_string()));
        assert!(terms.contains(&"page".to_string()));
        assert!(terms.contains(&"load".to_string()));
        assert!(terms.contains(&"times".to_string()));
    }

    #[test]
    fn intent_weight_bound_holds() {
        let query_terms = vec!["performance".to_string()];
        let intent_terms = vec!["latency".to_string(), "vitals".to_string()];
        let text = "performance and latency and core web vitals section";

        let without = score_chunk(text, &query_terms, &[]);
        let with = score_chunk(text, &query_terms, &intent_terms);
        let matched_intent = intent_terms.iter().filter(|t| text.contains(t.as_str())).count() as f64;

        assert!(with >= without);
        assert!((with - without - INTENT_WEIGHT_CHUNK * matched_intent).abs() < 1e-9);
    }

    #[test]
    fn snippet_weight_is_below_one() {
        assert!(INTENT_WEIGHT_SNIPPET < 1.0);
    }
}
