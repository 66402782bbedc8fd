use thiserror::Error;

#[derive(Error, Debug)]
pub enum PilotError {
    /// A required setting (database, region, API key) could not be resolved.
    #[error("{0}")]
    Configuration(String),

    /// Caller input was malformed (empty SQL, bad tool argument).
    #[error("{0}")]
    Validation(String),

    /// Athena or Glue rejected or failed a request.
    #[error("{0}")]
    RemoteService(String),

    /// A query did not reach a terminal state before the polling deadline.
    #[error("{0}")]
    Timeout(String),

    /// No SQL could be recovered from the model output.
    #[error("{0}")]
    Extraction(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PilotError>;
