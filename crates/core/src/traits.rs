use crate::error::Result;
use crate::models::{Candidate, StrategyKind};
use async_trait::async_trait;

/// Outcome of a lexical store search, carrying which strategy actually
/// produced the rows so the trace can record degradations.
#[derive(Debug, Clone)]
pub struct TextSearchOutcome {
    pub candidates: Vec<Candidate>,
    pub strategy: StrategyKind,
    pub note: Option<String>,
}

/// Primary relational store of question/answer pairs.
#[async_trait]
pub trait CandidateStore {
    /// Lexical search over the normalized question and answer columns.
    /// Implementations attempt full-text first and degrade to a bounded
    /// substring match; results are capped at `limit`.
    async fn search_text(&self, normalized_query: &str, limit: usize)
        -> Result<TextSearchOutcome>;

    /// All answers carrying a stored embedding, regardless of lexical
    /// match, so semantically close but lexically distant answers are not
    /// excluded.
    async fn embedded_candidates(&self, limit: usize) -> Result<Vec<Candidate>>;
}

/// Flat tabular dataset consulted when the store yields nothing confident.
#[async_trait]
pub trait FallbackIndex {
    async fn candidates(&self) -> Result<Vec<Candidate>>;
}
