use crate::embeddings::{parse_embedding, Embedder};
use crate::error::{RetrievalError, Result};
use crate::models::{Candidate, CandidateSource, StrategyKind};
use crate::normalize::normalize;
use crate::traits::{CandidateStore, TextSearchOutcome};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_BOOLEAN_TERMS: usize = 12;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Relational store of question/answer pairs backed by SQLite, with an
/// FTS5 index over the normalized text columns. One connection guarded by
/// a mutex; concurrent queries serialize on it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    min_token_len: usize,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            min_token_len: 3,
        })
    }

    /// Shortest token the FTS index covers; shorter query tokens are
    /// dropped when building the boolean match expression.
    pub fn with_min_token_len(mut self, min_token_len: usize) -> Self {
        self.min_token_len = min_token_len.max(1);
        self
    }

    /// Inserts a question/answer pair, normalizing both texts and indexing
    /// them for full-text search. Returns (question id, answer id).
    pub fn insert_qna(&self, question: &str, answer: &str) -> Result<(i64, i64)> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        let answer_norm = normalize(answer);
        conn.execute(
            "INSERT INTO answers (text, text_normalized) VALUES (?1, ?2)",
            params![answer, answer_norm],
        )?;
        let answer_id = conn.last_insert_rowid();

        let question_norm = normalize(question);
        conn.execute(
            "INSERT INTO questions (text, text_normalized, answer_id) VALUES (?1, ?2, ?3)",
            params![question, question_norm, answer_id],
        )?;
        let question_id = conn.last_insert_rowid();

        reindex_question(&conn, question_id, &question_norm, &answer_norm)?;
        Ok((question_id, answer_id))
    }

    /// Stores an embedding for an answer row as a JSON array.
    pub fn set_answer_embedding(
        &self,
        answer_id: i64,
        embedding: &[f32],
    ) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let payload = serde_json::to_string(embedding)
            .map_err(|error| RetrievalError::MalformedRow(error.to_string()))?;
        conn.execute(
            "UPDATE answers SET embedding = ?1 WHERE id = ?2",
            params![payload, answer_id],
        )?;
        Ok(())
    }

    /// Recomputes missing `text_normalized` columns and refreshes the FTS
    /// rows for the affected questions. Returns how many rows changed.
    pub fn backfill_normalized(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut updated = 0usize;

        for table in ["questions", "answers"] {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, text FROM {table} WHERE text_normalized IS NULL OR text_normalized = ''"
            ))?;
            let rows: Vec<(i64, String)> = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<_>>()?;
            for (id, text) in rows {
                conn.execute(
                    &format!("UPDATE {table} SET text_normalized = ?1 WHERE id = ?2"),
                    params![normalize(&text), id],
                )?;
                updated += 1;
            }
        }

        let mut stmt = conn.prepare(
            "SELECT q.id, q.text_normalized, IFNULL(a.text_normalized, '')
             FROM questions q LEFT JOIN answers a ON a.id = q.answer_id",
        )?;
        let rows: Vec<(i64, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<_>>()?;
        for (question_id, question_norm, answer_norm) in rows {
            reindex_question(&conn, question_id, &question_norm, &answer_norm)?;
        }

        Ok(updated)
    }

    /// Computes and stores embeddings for answers that lack one. Returns
    /// how many rows gained an embedding.
    pub fn backfill_embeddings(&self, embedder: &dyn Embedder) -> Result<usize> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, text_normalized FROM answers WHERE embedding IS NULL OR embedding = ''",
        )?;
        let rows: Vec<(i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        let mut updated = 0usize;
        for (id, text_normalized) in rows {
            if text_normalized.is_empty() {
                continue;
            }
            let vector = embedder.embed(&text_normalized);
            let payload = serde_json::to_string(&vector)
                .map_err(|error| RetrievalError::MalformedRow(error.to_string()))?;
            conn.execute(
                "UPDATE answers SET embedding = ?1 WHERE id = ?2",
                params![payload, id],
            )?;
            updated += 1;
        }
        Ok(updated)
    }
}

fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS answers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL,
            text_normalized TEXT NOT NULL DEFAULT '',
            embedding TEXT
        );
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL,
            text_normalized TEXT NOT NULL DEFAULT '',
            embedding TEXT,
            answer_id INTEGER REFERENCES answers(id)
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS qna_fts USING fts5(
            question_norm,
            answer_norm
        );
        ",
    )
}

fn reindex_question(
    conn: &Connection,
    question_id: i64,
    question_norm: &str,
    answer_norm: &str,
) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM qna_fts WHERE rowid = ?1", params![question_id])?;
    conn.execute(
        "INSERT INTO qna_fts (rowid, question_norm, answer_norm) VALUES (?1, ?2, ?3)",
        params![question_id, question_norm, answer_norm],
    )?;
    Ok(())
}

/// Builds an all-terms-required FTS5 match expression. Tokens shorter than
/// `min_len` are dropped unless that would empty the set, in which case the
/// first raw tokens are kept as a safety net. At most `MAX_BOOLEAN_TERMS`
/// terms.
pub fn build_boolean_query(normalized_query: &str, min_len: usize) -> String {
    let mut tokens: Vec<&str> = normalized_query
        .split_whitespace()
        .filter(|token| token.len() >= min_len)
        .collect();
    if tokens.is_empty() {
        tokens = normalized_query.split_whitespace().collect();
    }
    tokens.truncate(MAX_BOOLEAN_TERMS);

    tokens
        .iter()
        .map(|token| format!("\"{}\"", token.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn candidate_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Candidate> {
    let question_id: i64 = row.get(0)?;
    let question_text: Option<String> = row.get(1)?;
    let question_norm: Option<String> = row.get(2)?;
    let question_embedding: Option<String> = row.get(3)?;
    let answer_id: Option<i64> = row.get(4)?;
    let answer_text: Option<String> = row.get(5)?;
    let answer_norm: Option<String> = row.get(6)?;
    let answer_embedding: Option<String> = row.get(7)?;

    let id = match answer_id {
        Some(answer_id) => format!("a{answer_id}"),
        None => format!("q{question_id}"),
    };

    Ok(Candidate {
        id,
        question_text: question_text.unwrap_or_default(),
        answer_text: answer_text.unwrap_or_default(),
        question_norm: question_norm.unwrap_or_default(),
        answer_norm: answer_norm.unwrap_or_default(),
        question_embedding: question_embedding.as_deref().and_then(parse_embedding),
        answer_embedding: answer_embedding.as_deref().and_then(parse_embedding),
        source: CandidateSource::Store,
    })
}

fn fulltext_search(
    conn: &Connection,
    match_query: &str,
    limit: usize,
) -> rusqlite::Result<Vec<Candidate>> {
    let mut stmt = conn.prepare(
        "
        SELECT
            q.id, q.text, q.text_normalized, q.embedding,
            a.id, a.text, a.text_normalized, a.embedding,
            MIN(bm25(qna_fts, 1.0, 0.0), bm25(qna_fts, 0.0, 1.0)) AS rank
        FROM qna_fts
        JOIN questions q ON q.id = qna_fts.rowid
        LEFT JOIN answers a ON a.id = q.answer_id
        WHERE qna_fts MATCH ?1
        ORDER BY rank ASC
        LIMIT ?2
        ",
    )?;
    let rows = stmt.query_map(params![match_query, limit as i64], candidate_from_row)?;
    rows.collect()
}

fn substring_search(
    conn: &Connection,
    normalized_query: &str,
    limit: usize,
) -> rusqlite::Result<Vec<Candidate>> {
    let pattern = format!("%{normalized_query}%");
    let mut stmt = conn.prepare(
        "
        SELECT
            q.id, q.text, q.text_normalized, q.embedding,
            a.id, a.text, a.text_normalized, a.embedding
        FROM questions q
        LEFT JOIN answers a ON a.id = q.answer_id
        WHERE q.text_normalized LIKE ?1 OR a.text_normalized LIKE ?1
        LIMIT ?2
        ",
    )?;
    let rows = stmt.query_map(params![pattern, limit as i64], candidate_from_row)?;
    rows.collect()
}

#[async_trait]
impl CandidateStore for SqliteStore {
    async fn search_text(
        &self,
        normalized_query: &str,
        limit: usize,
    ) -> Result<TextSearchOutcome> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let match_query = build_boolean_query(normalized_query, self.min_token_len);

        match fulltext_search(&conn, &match_query, limit) {
            Ok(candidates) => {
                debug!(count = candidates.len(), query = %match_query, "fulltext search");
                Ok(TextSearchOutcome {
                    candidates: candidates.into_iter().filter(|c| !c.is_empty()).collect(),
                    strategy: StrategyKind::FullText,
                    note: None,
                })
            }
            Err(error) => {
                warn!(%error, "fulltext search failed, degrading to substring match");
                let candidates = substring_search(&conn, normalized_query, limit)?;
                Ok(TextSearchOutcome {
                    candidates: candidates.into_iter().filter(|c| !c.is_empty()).collect(),
                    strategy: StrategyKind::Substring,
                    note: Some(format!("fulltext unavailable: {error}")),
                })
            }
        }
    }

    async fn embedded_candidates(&self, limit: usize) -> Result<Vec<Candidate>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "
            SELECT id, text, text_normalized, embedding
            FROM answers
            WHERE embedding IS NOT NULL AND embedding != ''
            LIMIT ?1
            ",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let answer_id: i64 = row.get(0)?;
            let answer_text: String = row.get(1)?;
            let answer_norm: String = row.get(2)?;
            let embedding: Option<String> = row.get(3)?;
            Ok(Candidate {
                id: format!("a{answer_id}"),
                question_text: String::new(),
                answer_text,
                question_norm: String::new(),
                answer_norm,
                question_embedding: None,
                answer_embedding: embedding.as_deref().and_then(parse_embedding),
                source: CandidateSource::Store,
            })
        })?;
        let candidates = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates.into_iter().filter(|c| !c.is_empty()).collect())
    }
}
