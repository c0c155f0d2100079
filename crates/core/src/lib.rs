pub mod assemble;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extract;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod scoring;
pub mod spellout;
pub mod stores;
pub mod traits;

pub use config::PipelineConfig;
pub use embeddings::{
    parse_embedding, CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{PipelineError, RetrievalError};
pub use extract::{detect_field_intent, extract_field, today_spelled_out, FieldIntent};
pub use models::{
    AcceptancePath, AnswerResult, Candidate, CandidateSource, RetrievalAttempt, ScoredCandidate,
    StrategyKind, Trace,
};
pub use normalize::{normalize, strip_accents};
pub use orchestrator::AnswerPipeline;
pub use scoring::{cosine_similarity, fused_score, keyword_overlap, rank_candidates};
pub use spellout::numbers_to_words;
pub use stores::{FlatFileIndex, SqliteStore};
pub use traits::{CandidateStore, FallbackIndex, TextSearchOutcome};
