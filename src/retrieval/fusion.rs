//! Score fusion for hybrid retrieval
//!
//! Pure functions over normalized scores, so ranking behavior is testable
//! without touching any provider or the store.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9]+").unwrap())
}

/// Map cosine similarity from [-1, 1] onto [0, 1].
pub fn normalize_similarity(cosine: f32) -> f32 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Fraction of distinct query terms that appear in the candidate text.
///
/// Case-insensitive, alphanumeric tokens only. An empty query scores 0.
pub fn lexical_overlap(query: &str, text: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let query_terms: HashSet<&str> = word_regex()
        .find_iter(&query_lower)
        .map(|m| m.as_str())
        .collect();
    if query_terms.is_empty() {
        return 0.0;
    }

    let text_lower = text.to_lowercase();
    let text_terms: HashSet<&str> = word_regex()
        .find_iter(&text_lower)
        .map(|m| m.as_str())
        .collect();

    let matched = query_terms.intersection(&text_terms).count();
    matched as f32 / query_terms.len() as f32
}

/// Weighted fusion of the two normalized scores.
///
/// The result is renormalized by the weight sum, so it stays in [0, 1]
/// regardless of how the weights are configured.
pub fn fuse_scores(vector_score: f32, lexical_score: f32, vector_weight: f32, lexical_weight: f32) -> f32 {
    let weight_sum = vector_weight + lexical_weight;
    if weight_sum <= 0.0 {
        return 0.0;
    }
    (vector_weight * vector_score + lexical_weight * lexical_score) / weight_sum
}
