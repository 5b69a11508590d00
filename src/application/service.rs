use chrono::Utc;
use tracing::{debug, info};

use crate::domain::{
    BookingContext, CachedExtraction, ExtractedInvoice, InvoiceLayout, LedgerRow, map_invoice,
};
use crate::io::PdfUpload;
use crate::storage::Repository;

use super::{AppError, Extractor};

/// Application service for one booking session.
/// Every cache read and write is scoped to `session`; sessions never see
/// each other's extractions.
pub struct SessionService {
    repo: Repository,
    session: String,
}

/// Rows prepared for one CSV export.
#[derive(Debug, Clone)]
pub struct LedgerExport {
    pub extraction: CachedExtraction,
    pub layout: InvoiceLayout,
    pub rows: Vec<LedgerRow>,
}

impl LedgerExport {
    /// Document number shared by all rows.
    pub fn document_number(&self) -> &str {
        self.rows
            .first()
            .map(|row| row.document_number.as_str())
            .unwrap_or_default()
    }
}

impl SessionService {
    pub fn new(repo: Repository, session: impl Into<String>) -> Self {
        Self {
            repo,
            session: session.into(),
        }
    }

    /// Open (and create if needed) the session database at the given path.
    pub async fn open(database_path: &str, session: impl Into<String>) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo, session))
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Return the extraction of an uploaded file, calling the service only
    /// when the session holds none for this content (or `refresh` is set).
    ///
    /// A failed call leaves the cache untouched.
    pub async fn extract<E: Extractor>(
        &self,
        extractor: &E,
        upload: &PdfUpload,
        layout: Option<InvoiceLayout>,
        refresh: bool,
    ) -> Result<CachedExtraction, AppError> {
        if !refresh {
            if let Some(cached) = self.repo.find_by_digest(&self.session, &upload.digest).await? {
                let layout_matches = layout.is_none_or(|l| l == cached.layout);
                if layout_matches {
                    info!(file = %upload.file_name, session = %self.session, "Using cached extraction");
                    return Ok(cached);
                }
                debug!(cached = %cached.layout, "Cached extraction has another layout");
            }
        }

        let requested = layout.unwrap_or(InvoiceLayout::Charges);
        let payload = extractor.extract(upload, requested).await?;
        let detected = layout.unwrap_or_else(|| InvoiceLayout::detect(&payload));

        // Refuse to cache a payload that cannot be read at all
        ExtractedInvoice::from_json(&payload, Some(detected))?;

        let cached = CachedExtraction::new(
            self.session.clone(),
            upload.file_name.clone(),
            upload.digest.clone(),
            detected,
            payload,
        );
        self.repo.save_extraction(&cached).await?;
        info!(file = %upload.file_name, layout = %detected, "Extraction cached");
        Ok(cached)
    }

    /// Cached extraction for an uploaded file, if any.
    pub async fn find(&self, upload: &PdfUpload) -> Result<Option<CachedExtraction>, AppError> {
        Ok(self.repo.find_by_digest(&self.session, &upload.digest).await?)
    }

    /// Most recent extraction of the session.
    pub async fn latest(&self) -> Result<CachedExtraction, AppError> {
        self.repo
            .latest(&self.session)
            .await?
            .ok_or_else(|| AppError::NoExtraction(self.session.clone()))
    }

    pub async fn list(&self) -> Result<Vec<CachedExtraction>, AppError> {
        Ok(self.repo.list_extractions(&self.session).await?)
    }

    /// Derive ledger rows from a cached extraction and the current form values.
    /// Nothing is written; rows live only as long as the export.
    pub fn prepare_export(
        &self,
        extraction: &CachedExtraction,
        ctx: &BookingContext,
    ) -> Result<LedgerExport, AppError> {
        let invoice = extraction.invoice()?;
        let rows = map_invoice(&invoice, ctx)?;
        debug!(rows = rows.len(), file = %extraction.file_name, "Ledger rows prepared");
        Ok(LedgerExport {
            extraction: extraction.clone(),
            layout: invoice.layout(),
            rows,
        })
    }

    /// Move the extraction behind an export to the exported state.
    pub async fn mark_exported(&self, export: &LedgerExport) -> Result<(), AppError> {
        self.repo
            .mark_exported(export.extraction.id, Utc::now())
            .await?;
        Ok(())
    }

    /// Discard everything the session holds.
    pub async fn reset(&self) -> Result<u64, AppError> {
        let removed = self.repo.delete_session(&self.session).await?;
        info!(session = %self.session, removed, "Session reset");
        Ok(removed)
    }
}
