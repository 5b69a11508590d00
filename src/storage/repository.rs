use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{CachedExtraction, ExtractionId, ExtractionStatus, InvoiceLayout};

use super::MIGRATION_001_EXTRACTIONS;

const EXTRACTION_COLUMNS: &str =
    "id, session, file_name, digest, layout, payload, status, created_at, exported_at";

/// Repository for the per-session extraction cache.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to session database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_EXTRACTIONS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize the database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Store an extraction, replacing an earlier one of the same file in the session.
    pub async fn save_extraction(&self, extraction: &CachedExtraction) -> Result<()> {
        let payload = serde_json::to_string(&extraction.payload)?;

        sqlx::query(
            r#"
            INSERT INTO extractions (id, session, file_name, digest, layout, payload, status, created_at, exported_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (session, digest) DO UPDATE SET
                id = excluded.id,
                file_name = excluded.file_name,
                layout = excluded.layout,
                payload = excluded.payload,
                status = excluded.status,
                created_at = excluded.created_at,
                exported_at = excluded.exported_at
            "#,
        )
        .bind(extraction.id.to_string())
        .bind(&extraction.session)
        .bind(&extraction.file_name)
        .bind(&extraction.digest)
        .bind(extraction.layout.as_str())
        .bind(payload)
        .bind(extraction.status.as_str())
        .bind(extraction.created_at.to_rfc3339())
        .bind(extraction.exported_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to save extraction")?;
        Ok(())
    }

    /// Find the cached extraction of a file (by content digest) in a session.
    pub async fn find_by_digest(&self, session: &str, digest: &str) -> Result<Option<CachedExtraction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM extractions WHERE session = ? AND digest = ?",
            EXTRACTION_COLUMNS
        ))
        .bind(session)
        .bind(digest)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch extraction")?;

        row.as_ref().map(Self::row_to_extraction).transpose()
    }

    /// Most recently extracted document of a session.
    pub async fn latest(&self, session: &str) -> Result<Option<CachedExtraction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM extractions WHERE session = ? ORDER BY created_at DESC LIMIT 1",
            EXTRACTION_COLUMNS
        ))
        .bind(session)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest extraction")?;

        row.as_ref().map(Self::row_to_extraction).transpose()
    }

    /// All extractions of a session, oldest first.
    pub async fn list_extractions(&self, session: &str) -> Result<Vec<CachedExtraction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM extractions WHERE session = ? ORDER BY created_at",
            EXTRACTION_COLUMNS
        ))
        .bind(session)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list extractions")?;

        rows.iter().map(Self::row_to_extraction).collect()
    }

    /// Record that a CSV was written from this extraction.
    pub async fn mark_exported(&self, id: ExtractionId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE extractions SET status = ?, exported_at = ? WHERE id = ?")
            .bind(ExtractionStatus::Exported.as_str())
            .bind(at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to mark extraction as exported")?;
        Ok(())
    }

    /// Drop every cached extraction of a session. Returns how many were removed.
    pub async fn delete_session(&self, session: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM extractions WHERE session = ?")
            .bind(session)
            .execute(&self.pool)
            .await
            .context("Failed to reset session")?;
        Ok(result.rows_affected())
    }

    fn row_to_extraction(row: &sqlx::sqlite::SqliteRow) -> Result<CachedExtraction> {
        let id_str: String = row.get("id");
        let layout_str: String = row.get("layout");
        let payload_str: String = row.get("payload");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let exported_at_str: Option<String> = row.get("exported_at");

        Ok(CachedExtraction {
            id: Uuid::parse_str(&id_str).context("Invalid extraction ID")?,
            session: row.get("session"),
            file_name: row.get("file_name"),
            digest: row.get("digest"),
            layout: InvoiceLayout::from_str(&layout_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid layout: {}", layout_str))?,
            payload: serde_json::from_str(&payload_str).context("Invalid cached payload")?,
            status: ExtractionStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid extraction status: {}", status_str))?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
            exported_at: exported_at_str
                .map(|s| DateTime::parse_from_rfc3339(&s))
                .transpose()
                .context("Invalid exported_at timestamp")?
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }
}
