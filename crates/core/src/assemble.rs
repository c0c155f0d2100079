use crate::extract::{extract_field, FieldIntent};
use crate::models::{AnswerResult, CandidateSource, ScoredCandidate, Trace};
use crate::spellout::numbers_to_words;

/// Light cleanup applied to the final text: whitespace collapse, leading
/// capitalization, terminal punctuation.
fn humanize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return collapsed;
    }

    let mut chars = collapsed.chars();
    let mut result: String = chars
        .next()
        .map(|first| first.to_uppercase().collect::<String>())
        .unwrap_or_default();
    result.push_str(chars.as_str());

    if !result.ends_with(['.', '!', '?', '…']) {
        result.push('.');
    }
    result
}

/// Merges the chosen candidate with field extraction, numeral spelling and
/// provenance into the final payload.
pub fn assemble_answer(
    chosen: &ScoredCandidate,
    intent: Option<FieldIntent>,
    confidence_threshold: f64,
    trace: Trace,
) -> AnswerResult {
    let raw_text = chosen.candidate.display_text().to_string();
    let fuzzy = chosen.score < confidence_threshold;

    let body = match intent {
        Some(field) => match extract_field(field, &raw_text) {
            Some(extracted) => match field {
                // extracted numerals are read aloud
                FieldIntent::Number | FieldIntent::Price | FieldIntent::Date => {
                    numbers_to_words(&extracted)
                }
                FieldIntent::Name => extracted,
            },
            // extraction never suppresses a found answer
            None => raw_text.clone(),
        },
        None => numbers_to_words(&raw_text),
    };

    let mut text = humanize(&body);
    text.push_str(&format!(
        "\n\nFonte: #{} ({})",
        chosen.candidate.id, chosen.candidate.source
    ));
    if fuzzy {
        text.push_str(&format!(" — similaridade baixa ({:.2})", chosen.score));
    }

    AnswerResult {
        text,
        raw: raw_text,
        source: chosen.candidate.source,
        id: Some(chosen.candidate.id.clone()),
        score: chosen.score,
        fuzzy,
        trace,
    }
}

/// Result for the REJECT terminal state.
pub fn no_confident_answer(trace: Trace) -> AnswerResult {
    AnswerResult {
        text: "Desculpe — não encontrei uma resposta adequada.".to_string(),
        raw: String::new(),
        source: CandidateSource::None,
        id: None,
        score: 0.0,
        fuzzy: false,
        trace,
    }
}
