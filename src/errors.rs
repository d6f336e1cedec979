use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Spreadsheet(#[from] calamine::Error),
    #[error("{0}")]
    Config(String),
    #[error("failed to parse {0}")]
    Parse(String),
    #[error("source unavailable: {0}")]
    Source(String),
}
