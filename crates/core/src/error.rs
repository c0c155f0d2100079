use thiserror::Error;

/// Failure of a single retrieval strategy. The pipeline never propagates
/// these to the caller; a failed source degrades to an empty candidate list
/// plus a trace note.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed row: {0}")]
    MalformedRow(String),

    #[error("store not available: {0}")]
    Unavailable(String),
}

/// Programmer-error inputs rejected at the pipeline boundary before any
/// retrieval work begins.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = RetrievalError> = std::result::Result<T, E>;
