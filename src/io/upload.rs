use std::path::Path;

use sha2::{Digest, Sha256};

use crate::application::AppError;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// A PDF accepted for extraction.
#[derive(Debug, Clone)]
pub struct PdfUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`, hex encoded
    pub digest: String,
}

impl PdfUpload {
    pub const CONTENT_TYPE: &'static str = "application/pdf";

    /// Accept the file only if it is named and shaped like a PDF.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, AppError> {
        let file_name = file_name.into();

        let has_pdf_extension = Path::new(&file_name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !has_pdf_extension {
            return Err(AppError::NotAPdf(format!("{} (expected a .pdf file)", file_name)));
        }
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(AppError::NotAPdf(format!("{} (missing %PDF- header)", file_name)));
        }

        let digest = format!("{:x}", Sha256::digest(&bytes));
        Ok(Self {
            file_name,
            bytes,
            digest,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(file_name, bytes)
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}
