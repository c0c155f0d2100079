use crate::assemble::{assemble_answer, no_confident_answer};
use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::error::PipelineError;
use crate::extract::{detect_field_intent, today_spelled_out, wants_todays_date, FieldIntent};
use crate::models::{
    AcceptancePath, AnswerResult, Candidate, CandidateSource, ScoredCandidate, StrategyKind, Trace,
};
use crate::normalize::normalize;
use crate::scoring::rank_candidates;
use crate::traits::{CandidateStore, FallbackIndex};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Floor for the embedding weight during the pooled rerank pass.
const RERANK_EMBEDDING_FLOOR: f64 = 0.7;

/// Drives one query through retrieval, ranking, the threshold-gated
/// fallback chain and answer assembly.
///
/// The store is optional: without one, every query goes straight to the
/// fallback file.
pub struct AnswerPipeline<S, F, E> {
    store: Option<S>,
    fallback: F,
    embedder: E,
    config: PipelineConfig,
}

impl<S, F, E> AnswerPipeline<S, F, E>
where
    S: CandidateStore + Send + Sync,
    F: FallbackIndex + Send + Sync,
    E: Embedder + Send + Sync,
{
    pub fn new(
        store: Option<S>,
        fallback: F,
        embedder: E,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            store,
            fallback,
            embedder,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answers one free-text question. Never fails for well-formed string
    /// input: retrieval errors degrade to empty candidate lists and the
    /// worst outcome is an explicit "no confident answer" result.
    pub async fn find_answer(&self, question: &str) -> AnswerResult {
        if question.trim().is_empty() {
            return AnswerResult::empty();
        }

        let intent = detect_field_intent(question);

        // A short "só a data" question asks for today's date; answering it
        // requires no retrieval at all.
        if intent == Some(FieldIntent::Date) && wants_todays_date(question) {
            let today = today_spelled_out();
            return AnswerResult {
                text: today.clone(),
                raw: today,
                source: CandidateSource::Generated,
                id: None,
                score: 1.0,
                fuzzy: false,
                trace: Trace {
                    path: Some(AcceptancePath::Generated),
                    ..Trace::default()
                },
            };
        }

        let query_norm = normalize(question);
        let query_embedding = self.embedder.embed(&query_norm);
        let mut trace = Trace::default();

        // DB_ATTEMPT: lexical search and the embedded-rows scan run
        // concurrently; either may degrade to nothing.
        let mut store_candidates: Vec<Candidate> = Vec::new();
        if let Some(store) = &self.store {
            trace.store_attempted = true;
            let (text_result, embedded_result) = tokio::join!(
                store.search_text(&query_norm, self.config.store_limit),
                store.embedded_candidates(self.config.store_limit),
            );

            match text_result {
                Ok(outcome) => {
                    trace.attempts.push(crate::models::RetrievalAttempt {
                        strategy: outcome.strategy,
                        candidate_count: outcome.candidates.len(),
                        note: outcome.note,
                    });
                    store_candidates.extend(outcome.candidates);
                }
                Err(error) => {
                    warn!(%error, "store text search failed");
                    trace.record_degraded(StrategyKind::FullText, error.to_string());
                }
            }
            match embedded_result {
                Ok(rows) => {
                    trace.record(StrategyKind::EmbeddedRows, rows.len());
                    store_candidates.extend(rows);
                }
                Err(error) => {
                    warn!(%error, "embedded-rows scan failed");
                    trace.record_degraded(StrategyKind::EmbeddedRows, error.to_string());
                }
            }
            dedupe_by_id(&mut store_candidates);
        }

        // DB_RANKED
        let weight_embedding = self.config.weight_embedding;
        let weight_keywords = self.config.weight_keywords();
        let ranked_store = rank_candidates(
            &store_candidates,
            &query_norm,
            Some(&query_embedding),
            weight_embedding,
            weight_keywords,
        );
        let best_store = ranked_store.first().map(|top| top.score);
        trace.best_store_score = best_store;

        // FALLBACK_ATTEMPT: only when the store produced nothing confident.
        let threshold = self.config.confidence_threshold;
        let store_is_weak = best_store.map(|score| score < threshold).unwrap_or(true);
        let mut ranked_fallback: Vec<ScoredCandidate> = Vec::new();
        if store_is_weak {
            match self.fallback.candidates().await {
                Ok(rows) => {
                    trace.record(StrategyKind::FallbackFile, rows.len());
                    trace.used_fallback_file = !rows.is_empty();
                    ranked_fallback = rank_candidates(
                        &rows,
                        &query_norm,
                        Some(&query_embedding),
                        weight_embedding,
                        weight_keywords,
                    );
                    ranked_fallback.truncate(self.config.top_k);
                }
                Err(error) => {
                    warn!(%error, "fallback file read failed");
                    trace.record_degraded(StrategyKind::FallbackFile, error.to_string());
                }
            }
        }
        trace.best_fallback_score = ranked_fallback.first().map(|top| top.score);

        // POOL_RERANK: one sample across sources, rescored with an
        // embedding-favoring weight. A single source's top-1 is not
        // necessarily the global top-1.
        let mut sample: Vec<Candidate> = Vec::new();
        let mut seen = HashSet::new();
        for scored in ranked_store.iter().chain(ranked_fallback.iter()) {
            if sample.len() >= self.config.rerank_pool {
                break;
            }
            if seen.insert(scored.candidate.id.clone()) {
                sample.push(scored.candidate.clone());
            }
        }
        trace.rerank_sample_size = sample.len();

        let rerank_weight = weight_embedding.max(RERANK_EMBEDDING_FLOOR);
        let reranked = rank_candidates(
            &sample,
            &query_norm,
            Some(&query_embedding),
            rerank_weight,
            1.0 - rerank_weight,
        );
        let best_rerank = reranked.first().map(|top| top.score);
        trace.best_rerank_score = best_rerank;

        debug!(
            ?best_store,
            best_fallback = ?trace.best_fallback_score,
            ?best_rerank,
            sample = sample.len(),
            "ranking complete"
        );

        // ACCEPT | REJECT, in priority order.
        let soft_rerank = threshold * self.config.soft_rerank_factor;
        let soft_store = threshold * self.config.soft_store_factor;
        let decision = if at_least(best_rerank, threshold) {
            Some((reranked[0].clone(), AcceptancePath::RerankTop))
        } else if at_least(best_store, threshold) {
            Some((ranked_store[0].clone(), AcceptancePath::StoreTop))
        } else if at_least(trace.best_fallback_score, threshold) {
            Some((ranked_fallback[0].clone(), AcceptancePath::FallbackTop))
        } else if at_least(best_rerank, soft_rerank) {
            Some((reranked[0].clone(), AcceptancePath::SoftRerank))
        } else if at_least(best_store, soft_store) {
            Some((ranked_store[0].clone(), AcceptancePath::SoftStore))
        } else {
            None
        };

        match decision {
            Some((chosen, path)) => {
                trace.path = Some(path);
                if chosen.score < threshold {
                    warn!(
                        score = chosen.score,
                        ?path,
                        id = %chosen.candidate.id,
                        "accepting low-similarity answer"
                    );
                }
                assemble_answer(&chosen, intent, threshold, trace)
            }
            None => {
                trace.path = Some(AcceptancePath::Rejected);
                no_confident_answer(trace)
            }
        }
    }
}

fn at_least(score: Option<f64>, bound: f64) -> bool {
    score.map(|value| value >= bound).unwrap_or(false)
}

fn dedupe_by_id(candidates: &mut Vec<Candidate>) {
    let mut seen = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.id.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::RetrievalError;
    use crate::traits::TextSearchOutcome;
    use async_trait::async_trait;

    #[derive(Default)]
    struct FakeStore {
        text_hits: Vec<Candidate>,
        embedded_hits: Vec<Candidate>,
        fail: bool,
    }

    #[async_trait]
    impl CandidateStore for FakeStore {
        async fn search_text(
            &self,
            _normalized_query: &str,
            _limit: usize,
        ) -> Result<TextSearchOutcome, RetrievalError> {
            if self.fail {
                return Err(RetrievalError::Unavailable("store offline".to_string()));
            }
            Ok(TextSearchOutcome {
                candidates: self.text_hits.clone(),
                strategy: StrategyKind::FullText,
                note: None,
            })
        }

        async fn embedded_candidates(
            &self,
            _limit: usize,
        ) -> Result<Vec<Candidate>, RetrievalError> {
            if self.fail {
                return Err(RetrievalError::Unavailable("store offline".to_string()));
            }
            Ok(self.embedded_hits.clone())
        }
    }

    #[derive(Default)]
    struct FakeFallback {
        rows: Vec<Candidate>,
    }

    #[async_trait]
    impl FallbackIndex for FakeFallback {
        async fn candidates(&self) -> Result<Vec<Candidate>, RetrievalError> {
            Ok(self.rows.clone())
        }
    }

    fn candidate(id: &str, answer: &str, source: CandidateSource) -> Candidate {
        Candidate {
            id: id.to_string(),
            question_text: String::new(),
            answer_text: answer.to_string(),
            question_norm: String::new(),
            answer_norm: normalize(answer),
            question_embedding: None,
            answer_embedding: None,
            source,
        }
    }

    fn pipeline(
        store: Option<FakeStore>,
        fallback: FakeFallback,
        config: PipelineConfig,
    ) -> AnswerPipeline<FakeStore, FakeFallback, CharacterNgramEmbedder> {
        AnswerPipeline::new(store, fallback, CharacterNgramEmbedder::default(), config).unwrap()
    }

    #[tokio::test]
    async fn empty_question_returns_neutral_result() {
        let pipeline = pipeline(None, FakeFallback::default(), PipelineConfig::default());
        let result = pipeline.find_answer("   ").await;
        assert_eq!(result.text, "");
        assert_eq!(result.source, CandidateSource::None);
        assert_eq!(result.score, 0.0);
        assert!(result.trace.attempts.is_empty());
        assert_eq!(result.trace.path, Some(AcceptancePath::Empty));
    }

    #[tokio::test]
    async fn short_date_question_short_circuits_retrieval() {
        let store = FakeStore {
            text_hits: vec![candidate("a1", "não deveria ser consultado", CandidateSource::Store)],
            ..FakeStore::default()
        };
        let pipeline = pipeline(Some(store), FakeFallback::default(), PipelineConfig::default());

        let result = pipeline.find_answer("me diga só a data").await;
        assert_eq!(result.source, CandidateSource::Generated);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.text, today_spelled_out());
        assert!(result.trace.attempts.is_empty());
        assert!(!result.trace.store_attempted);
    }

    #[tokio::test]
    async fn entity_date_question_still_hits_the_store() {
        let store = FakeStore {
            text_hits: vec![candidate(
                "a1",
                "vencimento do contrato em 12/03/2025",
                CandidateSource::Store,
            )],
            ..FakeStore::default()
        };
        let config = PipelineConfig {
            weight_embedding: 0.0,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Some(store), FakeFallback::default(), config);

        let result = pipeline
            .find_answer("me diga só a data do vencimento do contrato")
            .await;
        assert!(result.trace.store_attempted);
        assert_ne!(result.source, CandidateSource::Generated);
    }

    #[tokio::test]
    async fn strong_store_match_is_accepted() {
        let store = FakeStore {
            text_hits: vec![
                candidate("a1", "a capital da frança é paris", CandidateSource::Store),
                candidate("a2", "assunto completamente diferente", CandidateSource::Store),
            ],
            ..FakeStore::default()
        };
        // keyword-only so the store top clears the threshold but the
        // embedding-boosted rerank does not
        let config = PipelineConfig {
            weight_embedding: 0.0,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Some(store), FakeFallback::default(), config);

        let result = pipeline.find_answer("qual é a capital da França?").await;
        assert_eq!(result.source, CandidateSource::Store);
        assert_eq!(result.id.as_deref(), Some("a1"));
        assert_eq!(result.trace.path, Some(AcceptancePath::StoreTop));
        assert!(result.raw.contains("paris"));
    }

    #[tokio::test]
    async fn empty_store_engages_fallback_file() {
        let fallback = FakeFallback {
            rows: vec![candidate("csv:1", "a capital da frança é paris", CandidateSource::FallbackFile)],
        };
        let config = PipelineConfig {
            weight_embedding: 0.0,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Some(FakeStore::default()), fallback, config);

        let result = pipeline.find_answer("qual é a capital da França?").await;
        assert!(result.trace.used_fallback_file);
        assert_eq!(result.source, CandidateSource::FallbackFile);
        assert!(result.raw.contains("paris"));
    }

    #[tokio::test]
    async fn matching_embedding_accepts_fallback_row_without_store() {
        let embedder = CharacterNgramEmbedder::default();
        let query = "qual é a capital da frança?";
        let mut row = candidate("csv:1", "Paris", CandidateSource::FallbackFile);
        row.answer_embedding = Some(embedder.embed(&normalize(query)));

        let pipeline = pipeline(None, FakeFallback { rows: vec![row] }, PipelineConfig::default());
        let result = pipeline.find_answer(query).await;

        assert_eq!(result.source, CandidateSource::FallbackFile);
        assert!(result.score >= pipeline.config().confidence_threshold);
        assert!(result.raw.contains("Paris"));
        assert!(!result.trace.store_attempted);
    }

    #[tokio::test]
    async fn failing_store_degrades_and_fallback_still_answers() {
        let store = FakeStore {
            fail: true,
            ..FakeStore::default()
        };
        let fallback = FakeFallback {
            rows: vec![candidate("csv:1", "a capital da frança é paris", CandidateSource::FallbackFile)],
        };
        let config = PipelineConfig {
            weight_embedding: 0.0,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Some(store), fallback, config);

        let result = pipeline.find_answer("qual é a capital da França?").await;
        assert_eq!(result.source, CandidateSource::FallbackFile);
        let degraded = result
            .trace
            .attempts
            .iter()
            .filter(|attempt| attempt.note.is_some())
            .count();
        assert_eq!(degraded, 2);
    }

    #[tokio::test]
    async fn no_candidates_anywhere_is_an_explicit_reject() {
        let pipeline = pipeline(
            Some(FakeStore::default()),
            FakeFallback::default(),
            PipelineConfig::default(),
        );
        let result = pipeline.find_answer("??? !!!").await;
        assert_eq!(result.source, CandidateSource::None);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.trace.path, Some(AcceptancePath::Rejected));
        assert!(result.text.contains("não encontrei"));
    }

    #[tokio::test]
    async fn raising_the_threshold_never_turns_reject_into_accept() {
        let rows = vec![candidate("csv:1", "da frança", CandidateSource::FallbackFile)];
        let base = PipelineConfig {
            weight_embedding: 0.0,
            ..PipelineConfig::default()
        };

        // once some threshold rejects, every higher threshold must too
        let mut seen_reject = false;
        let mut seen_accept = false;
        for threshold in [0.2, 0.4, 0.6, 0.8, 0.99] {
            let config = PipelineConfig {
                confidence_threshold: threshold,
                ..base.clone()
            };
            let pipeline = pipeline(None, FakeFallback { rows: rows.clone() }, config);
            let result = pipeline.find_answer("qual é a capital da frança?").await;
            if result.source == CandidateSource::None {
                seen_reject = true;
            } else {
                assert!(!seen_reject);
                seen_accept = true;
            }
        }
        assert!(seen_accept && seen_reject);
    }

    #[tokio::test]
    async fn duplicate_ids_across_store_strategies_are_pooled_once() {
        let shared = candidate("a1", "a capital da frança é paris", CandidateSource::Store);
        let store = FakeStore {
            text_hits: vec![shared.clone()],
            embedded_hits: vec![shared],
            fail: false,
        };
        let config = PipelineConfig {
            weight_embedding: 0.0,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Some(store), FakeFallback::default(), config);

        let result = pipeline.find_answer("qual é a capital da frança?").await;
        assert_eq!(result.trace.rerank_sample_size, 1);
    }

    #[tokio::test]
    async fn soft_store_tier_accepts_between_factors() {
        // overlap covers 4 of 8 query tokens: 0.5, below T=0.62 but above
        // the 0.8*T = 0.496 soft store tier
        let store = FakeStore {
            text_hits: vec![candidate("a1", "a capital da frança", CandidateSource::Store)],
            ..FakeStore::default()
        };
        let config = PipelineConfig {
            weight_embedding: 0.0,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Some(store), FakeFallback::default(), config);

        let result = pipeline
            .find_answer("qual é mesmo a capital da França agora")
            .await;
        assert_eq!(result.trace.path, Some(AcceptancePath::SoftStore));
        assert!(result.fuzzy);
        assert!(result.text.contains("similaridade baixa"));
    }

    #[tokio::test]
    async fn end_to_end_with_sqlite_store_and_flat_file() {
        use crate::stores::{FlatFileIndex, SqliteStore};
        use std::io::Write;

        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_qna("Qual é a capital da França?", "A capital da França é Paris.")
            .unwrap();
        store
            .insert_qna("Quantos dias tem o ano?", "O ano tem 365 dias.")
            .unwrap();
        let embedder = CharacterNgramEmbedder::default();
        store.backfill_embeddings(&embedder).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pergunta,resposta").unwrap();
        writeln!(file, "time de futebol favorito?,O maior time é o Santos.").unwrap();
        file.flush().unwrap();

        // keyword-leaning weights keep this deterministic regardless of
        // what the trigram embedder thinks of the texts
        let config = PipelineConfig {
            weight_embedding: 0.25,
            ..PipelineConfig::default()
        };
        let pipeline = AnswerPipeline::new(
            Some(store),
            FlatFileIndex::new(file.path()),
            embedder,
            config,
        )
        .unwrap();

        let result = pipeline.find_answer("qual é a capital da frança?").await;
        assert_eq!(result.source, CandidateSource::Store);
        assert!(result.raw.contains("Paris"));
        assert!(!result.fuzzy);
        assert!(result.trace.store_attempted);
    }

    #[tokio::test]
    async fn imported_table_rows_become_retrievable() {
        use crate::stores::flatfile::parse_fallback_table;
        use crate::stores::{FlatFileIndex, SqliteStore};

        let table = "pergunta,resposta\n\
                     Qual é a capital da França?,A capital da França é Paris.\n\
                     Quantos dias tem o ano?,O ano tem 365 dias.\n";
        let rows = parse_fallback_table(table);
        assert_eq!(rows.len(), 2);

        let embedder = CharacterNgramEmbedder::default();
        let store = SqliteStore::open_in_memory().unwrap();
        for row in &rows {
            let (_, answer_id) = store
                .insert_qna(&row.question_text, &row.answer_text)
                .unwrap();
            store
                .set_answer_embedding(answer_id, &embedder.embed(&row.answer_norm))
                .unwrap();
        }

        let config = PipelineConfig {
            weight_embedding: 0.25,
            ..PipelineConfig::default()
        };
        let pipeline = AnswerPipeline::new(
            Some(store),
            FlatFileIndex::new("/definitely/not/here.csv"),
            embedder,
            config,
        )
        .unwrap();

        let result = pipeline.find_answer("qual é a capital da frança?").await;
        assert_eq!(result.source, CandidateSource::Store);
        assert!(result.raw.contains("Paris"));
        assert!(!result.fuzzy);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = PipelineConfig {
            weight_embedding: 2.0,
            ..PipelineConfig::default()
        };
        let result = AnswerPipeline::new(
            None::<FakeStore>,
            FakeFallback::default(),
            CharacterNgramEmbedder::default(),
            config,
        );
        assert!(result.is_err());
    }
}
