use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Required column '{0}' is missing from the report header")]
    MissingColumn(String),

    #[error("Ingestion run {0} not found")]
    RunNotFound(i64),

    #[error("Duplicate issue {0} not found")]
    IssueNotFound(i64),

    #[error("Duplicate issue {id} is '{status}', expected 'pending'")]
    IssueNotPending { id: i64, status: String },

    #[error("Resolution is missing a strategy for SKU(s): {}", .0.join(", "))]
    IncompleteResolution(Vec<String>),

    #[error("Invalid resolution for SKU '{sku}': {reason}")]
    InvalidResolution { sku: String, reason: String },

    #[error("Resolved rows still contain duplicate SKU(s): {}", .0.join(", "))]
    UnresolvedDuplicates(Vec<String>),

    #[error("Invalid run status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Ingestion cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors raised by the resolution gate that poison the issue and its run.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Error::InvalidResolution { .. } | Error::UnresolvedDuplicates(_)
        )
    }
}
