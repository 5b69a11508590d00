// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::cell::Cell;

use anyhow::Result;
use belegexport::application::{AppError, Extractor, SessionService};
use belegexport::domain::InvoiceLayout;
use belegexport::io::PdfUpload;
use chrono::NaiveDate;
use serde_json::{Value, json};
use tempfile::TempDir;

/// Helper to open a session service on a temporary database
pub async fn test_session(name: &str) -> Result<(SessionService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("session.db");
    let service = SessionService::open(db_path.to_str().unwrap(), name).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into NaiveDate
pub fn parse_date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// A minimal PDF upload with distinct content per tag
pub fn pdf(name: &str, tag: &str) -> PdfUpload {
    PdfUpload::from_bytes(name, format!("%PDF-1.7\n% {}\n", tag).into_bytes()).unwrap()
}

/// Charge-line payload as the service returns it
pub fn charges_payload(number: &str, lines: Value) -> Value {
    json!({
        "invoiceInfo": {"belegdatum": "2024-03-01", "belegnummer": number},
        "chargeDetails": lines
    })
}

/// Summary payload as the service returns it
pub fn summary_payload(number: &str) -> Value {
    json!({
        "document_info": {"belegdatum": "2024-02-01", "belegnummer": number},
        "summary": {"tax_rate": 19, "tax_amount": 19.0, "net_total": 100.0, "gross_total": 119.0}
    })
}

/// Extractor that answers with a fixed result and counts calls
pub struct FakeExtractor {
    response: Result<Value, (u16, String)>,
    calls: Cell<usize>,
    last_layout: Cell<Option<InvoiceLayout>>,
}

impl FakeExtractor {
    pub fn returning(payload: Value) -> Self {
        Self {
            response: Ok(payload),
            calls: Cell::new(0),
            last_layout: Cell::new(None),
        }
    }

    pub fn failing(status: u16, body: &str) -> Self {
        Self {
            response: Err((status, body.to_string())),
            calls: Cell::new(0),
            last_layout: Cell::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn last_layout(&self) -> Option<InvoiceLayout> {
        self.last_layout.get()
    }
}

impl Extractor for FakeExtractor {
    async fn extract(&self, _upload: &PdfUpload, layout: InvoiceLayout) -> Result<Value, AppError> {
        self.calls.set(self.calls.get() + 1);
        self.last_layout.set(Some(layout));
        match &self.response {
            Ok(payload) => Ok(payload.clone()),
            Err((status, body)) => Err(AppError::ExtractionFailed {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}
