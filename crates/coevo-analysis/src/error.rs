use std::path::PathBuf;

use coevo_core::{ClassifyError, HistoryAccessError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("config error: {0}")]
    Config(#[from] coevo_config::ConfigError),
    #[error("skip rule error: {0}")]
    Classify(#[from] ClassifyError),
    #[error("history access error: {0}")]
    History(#[from] HistoryAccessError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("processing repository {repo} failed: {message}")]
    RepositoryProcessing { repo: String, message: String },
    #[error("inconsistent table for repository {repo}: {message}")]
    InconsistentTable { repo: String, message: String },
    #[error("inconsistent columns in {path}: expected [{expected}], found [{found}]")]
    ColumnMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
