use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonicalizes text for indexing and comparison: lower-cases, strips
/// diacritics (NFD decomposition, combining marks removed), drops
/// punctuation while keeping alphanumerics and underscores, collapses all
/// whitespace runs to single spaces and trims.
///
/// Idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();

    let stripped: String = lowered
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .filter(|ch| ch.is_alphanumeric() || *ch == '_' || ch.is_whitespace())
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes diacritics only, preserving case and punctuation. Used for intent
/// detection over the raw question text.
pub fn strip_accents(text: &str) -> String {
    text.nfd().filter(|ch| !is_combining_mark(*ch)).collect()
}
