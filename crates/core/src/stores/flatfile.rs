use crate::embeddings::parse_embedding;
use crate::error::Result;
use crate::models::{Candidate, CandidateSource};
use crate::normalize::normalize;
use crate::traits::FallbackIndex;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

const QUESTION_HEADERS: [&str; 3] = ["pergunta", "question", "pergunta_texto"];
const ANSWER_HEADERS: [&str; 4] = ["resposta", "answer", "resposta_texto", "texto"];
const NORMALIZED_HEADERS: [&str; 2] = ["texto_normalizado", "normalized"];
const ID_HEADERS: [&str; 3] = ["id", "pergunta_id", "resposta_id"];

/// Flat tabular fallback dataset: one QnA row per line, comma separated,
/// with a header row. Read-only per query; concurrent readers need no
/// coordination.
pub struct FlatFileIndex {
    path: PathBuf,
}

impl FlatFileIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FallbackIndex for FlatFileIndex {
    async fn candidates(&self) -> Result<Vec<Candidate>> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "fallback file missing");
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(parse_fallback_table(&content))
    }
}

/// Parses the whole table. Rows that cannot be interpreted are skipped, not
/// errors; a malformed fallback file degrades to fewer candidates.
pub fn parse_fallback_table(content: &str) -> Vec<Candidate> {
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };

    let headers: Vec<String> = split_csv_row(header_line)
        .into_iter()
        .map(|header| header.trim().to_lowercase())
        .collect();

    let mut candidates = Vec::new();
    for (row_index, line) in lines.enumerate() {
        let fields = split_csv_row(line);
        let row: HashMap<&str, &str> = headers
            .iter()
            .zip(fields.iter())
            .map(|(header, field)| (header.as_str(), field.as_str()))
            .collect();

        let question = pick(&row, &QUESTION_HEADERS).unwrap_or_default();
        let answer = pick(&row, &ANSWER_HEADERS).unwrap_or_default();
        if question.trim().is_empty() && answer.trim().is_empty() {
            continue;
        }

        let answer_norm = pick(&row, &NORMALIZED_HEADERS)
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| normalize(answer));

        let id = pick(&row, &ID_HEADERS)
            .filter(|value| !value.trim().is_empty())
            .map(|value| format!("csv:{}", value.trim()))
            .unwrap_or_else(|| format!("csv:row{}", row_index + 1));

        candidates.push(Candidate {
            id,
            question_text: question.to_string(),
            answer_text: answer.to_string(),
            question_norm: normalize(question),
            answer_norm,
            question_embedding: None,
            answer_embedding: row.get("embedding").and_then(|raw| parse_embedding(raw)),
            source: CandidateSource::FallbackFile,
        });
    }

    candidates
}

fn pick<'a>(row: &HashMap<&str, &'a str>, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| row.get(name).copied())
}

/// Splits one CSV line honoring double-quoted fields with `""` escapes.
fn split_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}
