use crate::models::{Candidate, ScoredCandidate};
use std::collections::HashSet;

/// Share of the query's tokens covered by the candidate's token set.
/// Deliberately asymmetric: it measures query coverage, not Jaccard
/// similarity. 0 when either side has no tokens.
pub fn keyword_overlap(query_norm: &str, candidate_norm: &str) -> f64 {
    let query_tokens: HashSet<&str> = query_norm.split_whitespace().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let candidate_tokens: HashSet<&str> = candidate_norm.split_whitespace().collect();
    if candidate_tokens.is_empty() {
        return 0.0;
    }

    let shared = query_tokens.intersection(&candidate_tokens).count();
    shared as f64 / query_tokens.len() as f64
}

/// Cosine similarity with guards: vectors of different dimensionality or
/// zero magnitude contribute no signal (0.0) instead of failing.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Fused score: `w_emb * emb_sim + w_kw * kw_overlap`.
pub fn fused_score(
    query_norm: &str,
    query_embedding: Option<&[f32]>,
    candidate: &Candidate,
    weight_embedding: f64,
    weight_keywords: f64,
) -> f64 {
    let kw = keyword_overlap(query_norm, candidate.overlap_text());

    let emb = match (query_embedding, candidate.embedding()) {
        (Some(query_vec), Some(candidate_vec)) => cosine_similarity(query_vec, candidate_vec),
        _ => 0.0,
    };

    weight_embedding * emb + weight_keywords * kw
}

/// Scores every candidate and sorts descending by fused score. The sort is
/// stable, so ties keep their original retrieval order.
pub fn rank_candidates(
    candidates: &[Candidate],
    query_norm: &str,
    query_embedding: Option<&[f32]>,
    weight_embedding: f64,
    weight_keywords: f64,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|candidate| ScoredCandidate {
            candidate: candidate.clone(),
            score: fused_score(
                query_norm,
                query_embedding,
                candidate,
                weight_embedding,
                weight_keywords,
            ),
        })
        .collect();

    scored.sort_by(|left, right| right.score.total_cmp(&left.score));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateSource;

    fn candidate(id: &str, answer_norm: &str, embedding: Option<Vec<f32>>) -> Candidate {
        Candidate {
            id: id.to_string(),
            question_text: String::new(),
            answer_text: answer_norm.to_string(),
            question_norm: String::new(),
            answer_norm: answer_norm.to_string(),
            question_embedding: None,
            answer_embedding: embedding,
            source: CandidateSource::Store,
        }
    }

    #[test]
    fn overlap_is_query_coverage() {
        assert_eq!(keyword_overlap("capital da franca", "a capital da franca e paris"), 1.0);
        assert_eq!(keyword_overlap("capital da franca", "da franca"), 2.0 / 3.0);
        assert_eq!(keyword_overlap("", "qualquer coisa"), 0.0);
        assert_eq!(keyword_overlap("algo", ""), 0.0);
    }

    #[test]
    fn overlap_stays_within_unit_interval() {
        let score = keyword_overlap("um dois tres", "um dois tres quatro cinco");
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn cosine_is_symmetric_and_bounded() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [3.0f32, 1.0, 0.5];
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        assert!((ab - ba).abs() < 1e-12);
        assert!((-1.0..=1.0).contains(&ab));
    }

    #[test]
    fn cosine_guards_zero_and_mismatched_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn fused_score_weighs_both_signals() {
        let with_embedding = candidate("1", "capital da franca", Some(vec![1.0, 0.0]));
        let score = fused_score(
            "capital da franca",
            Some(&[1.0, 0.0]),
            &with_embedding,
            0.75,
            0.25,
        );
        assert!((score - 1.0).abs() < 1e-9);

        let no_embedding = candidate("2", "capital da franca", None);
        let score = fused_score("capital da franca", Some(&[1.0, 0.0]), &no_embedding, 0.75, 0.25);
        assert!((score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn ranking_is_stable_for_ties() {
        let candidates = vec![
            candidate("first", "nada em comum aqui", None),
            candidate("second", "tambem nada parecido", None),
        ];
        let ranked = rank_candidates(&candidates, "pergunta diferente", None, 0.75, 0.25);
        assert_eq!(ranked[0].candidate.id, "first");
        assert_eq!(ranked[1].candidate.id, "second");
    }

    #[test]
    fn ranking_sorts_descending() {
        let candidates = vec![
            candidate("weak", "sem relacao", None),
            candidate("strong", "qual a capital da franca", None),
        ];
        let ranked = rank_candidates(&candidates, "capital da franca", None, 0.0, 1.0);
        assert_eq!(ranked[0].candidate.id, "strong");
        assert!(ranked[0].score > ranked[1].score);
    }
}
