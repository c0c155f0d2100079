use crate::normalize::strip_accents;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

/// Narrow intents the user can express with "só a data", "apenas o
/// número", and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldIntent {
    Date,
    Number,
    Name,
    Price,
}

const MONTHS: [&str; 12] = [
    "janeiro", "fevereiro", "março", "abril", "maio", "junho", "julho", "agosto", "setembro",
    "outubro", "novembro", "dezembro",
];

// Entity keywords that make a short "só a data" question refer to a stored
// fact rather than today's date.
const DATE_ENTITY_KEYWORDS: [&str; 7] = [
    "evento", "aniversario", "nascimento", "vencimento", "prazo", "reuniao", "contrato",
];

fn date_numeric_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").expect("static regex"))
}

fn date_iso_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b").expect("static regex"))
}

fn date_spelled_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\b\d{1,2}\s+de\s+\w{3,}\s+de\s+\d{4}\b").expect("static regex"))
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("static regex"))
}

fn price_currency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"R\$\s*\d+(?:[.,]\d+)?").expect("static regex"))
}

fn price_bare_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\d+(?:[.,]\d+)?\s*(reais|rs|r\$)?").expect("static regex"))
}

fn name_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(?:[A-ZÀ-Ý][a-zà-ÿ]+\s?){1,4}\b").expect("static regex")
    })
}

/// Detects a narrow-field request in the raw question. Detection happens on
/// accent-stripped lowercase text, so "só" and "so" behave the same.
pub fn detect_field_intent(question: &str) -> Option<FieldIntent> {
    let q = strip_accents(&question.to_lowercase());

    let restrictive = ["so", "apenas", "somente"]
        .iter()
        .any(|marker| q.split_whitespace().any(|token| token == *marker));
    if !restrictive {
        return None;
    }

    if q.contains("data") {
        return Some(FieldIntent::Date);
    }
    // "nº" survives accent stripping; the ordinal sign is not a combining mark
    if q.contains("numero") || q.contains("nº") || q.contains("n°") {
        return Some(FieldIntent::Number);
    }
    if q.contains("nome") {
        return Some(FieldIntent::Name);
    }
    if q.contains("preco") || q.contains("valor") {
        return Some(FieldIntent::Price);
    }
    None
}

/// True when a "só a data" question should short-circuit to today's date:
/// short phrasing and no keyword tying the date to a stored entity.
pub fn wants_todays_date(question: &str) -> bool {
    let q = strip_accents(&question.to_lowercase());
    q.split_whitespace().count() <= 6
        && !DATE_ENTITY_KEYWORDS.iter().any(|keyword| q.contains(keyword))
}

/// Today's date spelled out in pt-BR, e.g. "27 de agosto de 2026".
pub fn today_spelled_out() -> String {
    spell_date(chrono::Local::now().date_naive())
}

pub fn spell_date(date: NaiveDate) -> String {
    format!(
        "{} de {} de {}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

/// Pulls the substring matching the requested field's shape out of the
/// chosen answer. `None` means the caller keeps the full text; extraction
/// never suppresses a found answer.
pub fn extract_field(intent: FieldIntent, text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }

    match intent {
        FieldIntent::Date => date_numeric_pattern()
            .find(text)
            .or_else(|| date_iso_pattern().find(text))
            .or_else(|| date_spelled_pattern().find(text))
            .map(|m| m.as_str().to_string()),
        FieldIntent::Number => number_pattern().find(text).map(|m| m.as_str().to_string()),
        FieldIntent::Price => price_currency_pattern()
            .find(text)
            .or_else(|| price_bare_pattern().find(text))
            .map(|m| m.as_str().trim().to_string())
            .filter(|found| !found.is_empty()),
        FieldIntent::Name => {
            let first_line = text.lines().map(str::trim).find(|line| !line.is_empty());
            if let Some(line) = first_line {
                if line.split_whitespace().count() <= 6 {
                    return Some(line.to_string());
                }
            }
            name_run_pattern()
                .find(text)
                .map(|m| m.as_str().trim().to_string())
                .filter(|found| !found.is_empty())
        }
    }
}
