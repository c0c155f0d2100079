use serde::{Deserialize, Serialize};

/// Where a candidate (or a final answer) came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Store,
    FallbackFile,
    /// Answer synthesized without consulting any source (date shortcut).
    Generated,
    None,
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CandidateSource::Store => "store",
            CandidateSource::FallbackFile => "fallback-file",
            CandidateSource::Generated => "generated",
            CandidateSource::None => "none",
        };
        f.write_str(label)
    }
}

/// One retrievable question/answer pair. Every data source is adapted into
/// this one shape; ranking code never sees driver-specific rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub question_text: String,
    pub answer_text: String,
    pub question_norm: String,
    pub answer_norm: String,
    pub question_embedding: Option<Vec<f32>>,
    pub answer_embedding: Option<Vec<f32>>,
    pub source: CandidateSource,
}

impl Candidate {
    /// A candidate lacking both texts carries no answerable content.
    pub fn is_empty(&self) -> bool {
        self.answer_text.trim().is_empty() && self.question_text.trim().is_empty()
    }

    /// Normalized text used for keyword overlap: the answer side, falling
    /// back to the question side when the answer is empty.
    pub fn overlap_text(&self) -> &str {
        if self.answer_norm.is_empty() {
            &self.question_norm
        } else {
            &self.answer_norm
        }
    }

    /// Embedding used for similarity: answer embedding first, question
    /// embedding as a fallback.
    pub fn embedding(&self) -> Option<&[f32]> {
        self.answer_embedding
            .as_deref()
            .or(self.question_embedding.as_deref())
    }

    /// Raw text the assembler works from.
    pub fn display_text(&self) -> &str {
        if self.answer_text.trim().is_empty() {
            &self.question_text
        } else {
            &self.answer_text
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

/// Retrieval strategies the pipeline may attempt, in the order they appear
/// in the trace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    FullText,
    Substring,
    EmbeddedRows,
    FallbackFile,
}

/// One recorded retrieval attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalAttempt {
    pub strategy: StrategyKind,
    pub candidate_count: usize,
    /// Present when the attempt degraded (e.g. FTS index missing).
    pub note: Option<String>,
}

/// Terminal decision for one query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AcceptancePath {
    /// Synthesized without retrieval (date shortcut).
    Generated,
    /// Pooled rerank top cleared the threshold.
    RerankTop,
    /// Store top cleared the threshold.
    StoreTop,
    /// Fallback-file top cleared the threshold.
    FallbackTop,
    /// Pooled rerank top cleared the soft rerank tier.
    SoftRerank,
    /// Store top cleared the soft store tier.
    SoftStore,
    /// No source produced a confident candidate.
    Rejected,
    /// Empty question, nothing attempted.
    Empty,
}

/// Diagnostic record produced alongside each answer. Created fresh per
/// query and discarded with the result; never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    pub attempts: Vec<RetrievalAttempt>,
    pub store_attempted: bool,
    pub used_fallback_file: bool,
    pub best_store_score: Option<f64>,
    pub best_fallback_score: Option<f64>,
    pub best_rerank_score: Option<f64>,
    pub rerank_sample_size: usize,
    pub path: Option<AcceptancePath>,
}

impl Trace {
    pub fn record(&mut self, strategy: StrategyKind, candidate_count: usize) {
        self.attempts.push(RetrievalAttempt {
            strategy,
            candidate_count,
            note: None,
        });
    }

    pub fn record_degraded(&mut self, strategy: StrategyKind, note: impl Into<String>) {
        self.attempts.push(RetrievalAttempt {
            strategy,
            candidate_count: 0,
            note: Some(note.into()),
        });
    }
}

/// Final payload for one query. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    /// Final text after field extraction / numeral spelling / assembly.
    pub text: String,
    /// Raw matched text before post-processing.
    pub raw: String,
    pub source: CandidateSource,
    pub id: Option<String>,
    pub score: f64,
    /// True when the accepted score sat below the confidence threshold.
    pub fuzzy: bool,
    pub trace: Trace,
}

impl AnswerResult {
    /// Neutral result for empty input: nothing attempted, nothing found.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            raw: String::new(),
            source: CandidateSource::None,
            id: None,
            score: 0.0,
            fuzzy: false,
            trace: Trace {
                path: Some(AcceptancePath::Empty),
                ..Trace::default()
            },
        }
    }
}
