use serde_json::Value;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Black-box embedding function. The pipeline only assumes determinism and a
/// fixed dimensionality for the lifetime of the system.
pub trait Embedder {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic local embedder over hashed character trigrams. Not
/// semantic, but fast, offline and stable, which is what the fallback path
/// needs when no model-backed embedder is wired in.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

/// Parses a stored embedding payload: a JSON numeric array, or as a looser
/// fallback a bracketed/comma-separated list. Malformed payloads yield
/// `None`; a stored embedding must never be able to fail a query.
pub fn parse_embedding(payload: &str) -> Option<Vec<f32>> {
    let trimmed = payload.trim().trim_matches('"');
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
        let parsed: Option<Vec<f32>> = items
            .iter()
            .map(|item| item.as_f64().map(|value| value as f32))
            .collect();
        if let Some(vector) = parsed {
            if !vector.is_empty() {
                return Some(vector);
            }
        }
        return None;
    }

    let parts: Option<Vec<f32>> = trimmed
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<f32>().ok())
        .collect();

    parts.filter(|vector| !vector.is_empty())
}
