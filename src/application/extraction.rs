use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::InvoiceLayout;
use crate::io::PdfUpload;

use super::AppError;

pub const DEFAULT_API_URL: &str = "https://api.va.landing.ai/v1/tools/agentic-document-analysis";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Anything that can turn a PDF into an extracted-fields payload.
#[allow(async_fn_in_trait)]
pub trait Extractor {
    async fn extract(&self, upload: &PdfUpload, layout: InvoiceLayout) -> Result<Value, AppError>;
}

/// Connection settings for the document-extraction service.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub api_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl ExtractionConfig {
    pub fn new(api_key: Option<String>) -> Result<Self, AppError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(AppError::MissingCredential)?;
        Ok(Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client posting PDFs plus a field schema to the extraction service.
pub struct ExtractionClient {
    http: reqwest::Client,
    config: ExtractionConfig,
}

impl ExtractionClient {
    pub fn new(config: ExtractionConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
        Ok(Self { http, config })
    }
}

impl Extractor for ExtractionClient {
    async fn extract(&self, upload: &PdfUpload, layout: InvoiceLayout) -> Result<Value, AppError> {
        info!(
            file = %upload.file_name,
            bytes = upload.size(),
            layout = %layout,
            "Requesting field extraction"
        );

        let pdf = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(PdfUpload::CONTENT_TYPE)
            .map_err(|e| AppError::ServiceUnavailable(format!("could not build request: {}", e)))?;
        let form = Form::new()
            .part("pdf", pdf)
            .text("fields_schema", layout.extraction_schema().to_string());

        let response = self
            .http
            .post(&self.config.api_url)
            .header(AUTHORIZATION, format!("Basic {}", self.config.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, timed_out = e.is_timeout(), "Extraction request did not complete");
                AppError::ServiceUnavailable(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
        debug!(status, body_len = body.len(), "Extraction response received");

        interpret_response(status, &body)
    }
}

/// Turn a raw HTTP answer into the extracted-fields object.
///
/// Non-200 answers surface the body unchanged. The fields are looked up
/// under `data.extracted_schema` first, then top-level `extracted_schema`.
pub fn interpret_response(status: u16, body: &str) -> Result<Value, AppError> {
    if status != 200 {
        return Err(AppError::ExtractionFailed {
            status,
            body: body.to_string(),
        });
    }

    let json: Value = serde_json::from_str(body)
        .map_err(|e| AppError::InvalidResponse(format!("body is not JSON: {}", e)))?;

    let extracted = json
        .pointer("/data/extracted_schema")
        .or_else(|| json.get("extracted_schema"))
        .ok_or_else(|| AppError::InvalidResponse("missing extracted_schema".to_string()))?;

    if !extracted.is_object() {
        return Err(AppError::InvalidResponse(format!(
            "extracted_schema is not an object: {}",
            extracted
        )));
    }
    Ok(extracted.clone())
}
