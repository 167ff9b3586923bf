use std::path::PathBuf;

use calsync_recon::ReconError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    /// Upstream input the stage depends on does not exist.
    #[error("input not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error in {}: {message}", path.display())]
    Csv { path: PathBuf, message: String },
    #[error("invalid TOML in {}: {message}", path.display())]
    Toml { path: PathBuf, message: String },
    #[error(transparent)]
    Recon(#[from] ReconError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open store: {0}")]
    Connect(String),
    #[error("table '{0}' does not exist")]
    MissingTable(String),
    #[error("table '{table}' is missing required columns: {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },
    #[error("invalid table name '{0}'")]
    InvalidTable(String),
    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Substrings that mark a provider failure as transient.
const RETRYABLE_MARKERS: [&str; 6] = ["parameter", "timeout", "connection", "temporary", "503", "429"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("retryable: {0}")]
    Retryable(String),
    #[error("{0}")]
    Fatal(String),
}

impl FetchError {
    /// Classify a provider error message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if RETRYABLE_MARKERS.iter().any(|m| lower.contains(m)) {
            Self::Retryable(message)
        } else {
            Self::Fatal(message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}
