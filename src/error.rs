use crate::schema::RowId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtbError {
    #[error("Row not found: {0}")]
    RowNotFound(RowId),

    #[error("Row {0} has no working papers reference")]
    NoReference(RowId),

    #[error("Working papers are not initialized for {0}")]
    NotInitialized(String),

    #[error("Invalid worksheet '{sheet}': {details}")]
    InvalidSheet { sheet: String, details: String },

    #[error("Remote service error (status {status}): {message}")]
    Remote { status: u16, message: String },

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EtbError>;
