use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{ExtractedInvoice, InvoiceLayout, MappingError};

pub type ExtractionId = Uuid;

/// Where a cached extraction is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    /// Fields came back from the service and are waiting to be booked
    Extracted,
    /// At least one CSV was written from it
    Exported,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Extracted => "extracted",
            ExtractionStatus::Exported => "exported",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "extracted" => Some(ExtractionStatus::Extracted),
            "exported" => Some(ExtractionStatus::Exported),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw extraction payload of one uploaded file, cached per session so the
/// service is called only once per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedExtraction {
    pub id: ExtractionId,
    pub session: String,
    pub file_name: String,
    /// SHA-256 of the uploaded file, hex encoded
    pub digest: String,
    pub layout: InvoiceLayout,
    pub payload: Value,
    pub status: ExtractionStatus,
    pub created_at: DateTime<Utc>,
    pub exported_at: Option<DateTime<Utc>>,
}

impl CachedExtraction {
    pub fn new(
        session: impl Into<String>,
        file_name: impl Into<String>,
        digest: impl Into<String>,
        layout: InvoiceLayout,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session: session.into(),
            file_name: file_name.into(),
            digest: digest.into(),
            layout,
            payload,
            status: ExtractionStatus::Extracted,
            created_at: Utc::now(),
            exported_at: None,
        }
    }

    /// Read the cached payload with the layout it was extracted with.
    pub fn invoice(&self) -> Result<ExtractedInvoice, MappingError> {
        ExtractedInvoice::from_json(&self.payload, Some(self.layout))
    }
}
