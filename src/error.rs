use thiserror::Error;

/// Typed failure of the LLM collaborator. Callers catch it and substitute a
/// fallback text; it never aborts a report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM API key is not configured")]
    MissingApiKey,

    #[error("LLM request failed: {0}")]
    Network(String),

    #[error("LLM rejected credentials (status {0})")]
    Auth(u16),

    #[error("LLM returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed LLM response: {0}")]
    Malformed(String),

    #[error("Nothing to summarize: {0}")]
    EmptyInput(String),
}

#[derive(Error, Debug)]
pub enum QcrError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Input contains no records: {0}")]
    EmptyInput(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for QcrError {
    fn from(err: polars::error::PolarsError) -> Self {
        QcrError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QcrError>;
