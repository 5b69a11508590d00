use thiserror::Error;

use crate::domain::MappingError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not a PDF document: {0}")]
    NotAPdf(String),

    #[error("Missing extraction credential (set VA_API_KEY or pass --api-key)")]
    MissingCredential,

    #[error("Extraction request failed with HTTP {status}: {body}")]
    ExtractionFailed { status: u16, body: String },

    #[error("Extraction service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response from extraction service: {0}")]
    InvalidResponse(String),

    #[error("No cached extraction in session '{0}'")]
    NoExtraction(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
