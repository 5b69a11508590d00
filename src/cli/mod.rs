use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::application::{
    AppError, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS, ExtractionClient, ExtractionConfig,
    SessionService,
};
use crate::domain::{
    BookingContext, CREDIT_ACCOUNT_CHOICES, CachedExtraction, DEBIT_ACCOUNT_CHOICES,
    ExtractedInvoice, InvoiceLayout, LedgerRow, LineOverride, MappingError,
    POSTING_TYPE_CHOICES, TaxCode, default_posting_text, draft_lines, format_cents, map_invoice,
};
use crate::io::{Exporter, OverridesFile, PdfUpload, export_file_name};

/// belegexport - PDF invoices to bookkeeping CSV
#[derive(Parser)]
#[command(name = "belegexport")]
#[command(about = "Extract invoice fields from a PDF and export them as bookkeeping CSV rows")]
#[command(version)]
pub struct Cli {
    /// Session cache database path
    #[arg(long, env = "BELEGEXPORT_DB", default_value = "belegexport.db", global = true)]
    pub session_db: String,

    /// Session name; sessions never share cached extractions
    #[arg(short, long, default_value = "default", global = true)]
    pub session: String,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a PDF to the extraction service and show the pre-filled form
    Extract {
        /// PDF invoice
        pdf: PathBuf,

        /// Extraction layout: charges (A/B) or summary (C)
        #[arg(short, long)]
        layout: Option<String>,

        /// Ignore the session cache and call the service again
        #[arg(long)]
        refresh: bool,

        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Show the pre-filled form of a cached extraction
    Show {
        /// PDF whose extraction to show (latest of the session if omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Build ledger rows from an extraction and write the CSV
    Export {
        /// PDF invoice (latest cached extraction if omitted)
        pdf: Option<PathBuf>,

        /// Extraction layout: charges (A/B) or summary (C); needs a PDF
        #[arg(short, long, requires = "pdf")]
        layout: Option<String>,

        /// Never call the extraction service; use the session cache only
        #[arg(long)]
        offline: bool,

        /// Output file, "-" for stdout (default: buchung_<Belegnummer>.csv)
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        form: FormArgs,

        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Map an extraction payload stored as JSON, without the service or session
    Map {
        /// JSON file holding the extracted fields
        payload: PathBuf,

        /// Extraction layout: charges (A/B) or summary (C); detected if omitted
        #[arg(short, long)]
        layout: Option<String>,

        /// Output file, "-" for stdout (default: buchung_<Belegnummer>.csv)
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        form: FormArgs,
    },

    /// List cached extractions of the session
    Sessions,

    /// Discard all cached state of the session
    Reset,
}

/// Log filter for the binary: `RUST_LOG` when set and valid, otherwise
/// `debug` with `--verbose` and `info` without.
pub fn log_filter(rust_log: Option<&str>, verbose: bool) -> EnvFilter {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

/// Extraction service settings
#[derive(Args, Clone)]
pub struct ServiceArgs {
    /// Credential for the extraction service
    #[arg(long, env = "VA_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Extraction endpoint
    #[arg(long, env = "VA_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,
}

impl ServiceArgs {
    fn client(&self) -> Result<ExtractionClient, AppError> {
        let config = ExtractionConfig::new(self.api_key.clone())?
            .with_api_url(self.api_url.clone())
            .with_timeout(Duration::from_secs(self.timeout));
        ExtractionClient::new(config)
    }
}

/// Booking form values; anything omitted keeps the extracted or default value
#[derive(Args, Clone, Default)]
pub struct FormArgs {
    /// Buchungsdatum (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub booking_date: Option<String>,

    /// Belegdatum
    #[arg(long)]
    pub belegdatum: Option<String>,

    /// Belegnummer
    #[arg(long)]
    pub belegnummer: Option<String>,

    /// Konto for all lines (3400, 4000, 4400)
    #[arg(long)]
    pub konto: Option<u32>,

    /// Gegenkonto for all lines (1200, 1000, 1800)
    #[arg(long)]
    pub gegenkonto: Option<u32>,

    /// Buchungsart for all lines (1, 2, 3)
    #[arg(long)]
    pub buchungsart: Option<u8>,

    /// Steuerkennzeichen for all lines: V0, V1, V2 (default follows the tax rate)
    #[arg(long)]
    pub tax_code: Option<String>,

    /// Währung for all lines
    #[arg(long)]
    pub currency: Option<String>,

    /// Correct a line's tax rate, e.g. --tax-rate 2=7 (repeatable)
    #[arg(long = "tax-rate", value_name = "LINE=RATE")]
    pub tax_rates: Vec<String>,

    /// Replace a line's Buchungstext, e.g. --text "1=Bürobedarf" (repeatable)
    #[arg(long = "text", value_name = "LINE=TEXT")]
    pub texts: Vec<String>,

    /// TOML file with document and per-line edits
    #[arg(long)]
    pub overrides: Option<PathBuf>,
}

impl FormArgs {
    /// Build the booking context: defaults, then the overrides file, then flags.
    pub fn booking_context(&self) -> Result<BookingContext> {
        let mut ctx = BookingContext::new(Local::now().date_naive());

        if let Some(path) = &self.overrides {
            OverridesFile::load(path)?.apply_to(&mut ctx)?;
        }

        if let Some(date) = &self.booking_date {
            ctx.booking_date = parse_date(date)?;
        }
        if let Some(date) = &self.belegdatum {
            ctx.document_date = Some(date.clone());
        }
        if let Some(number) = &self.belegnummer {
            ctx.document_number = Some(number.clone());
        }
        if let Some(konto) = self.konto {
            ctx.defaults.debit_account = konto;
        }
        if let Some(gegenkonto) = self.gegenkonto {
            ctx.defaults.credit_account = gegenkonto;
        }
        if let Some(buchungsart) = self.buchungsart {
            ctx.defaults.posting_type = buchungsart;
        }
        if let Some(code) = &self.tax_code {
            ctx.defaults.tax_code = Some(
                TaxCode::from_str(code)
                    .ok_or_else(|| anyhow::anyhow!("Invalid tax code '{}' (use V0, V1 or V2)", code))?,
            );
        }
        if let Some(currency) = &self.currency {
            ctx.defaults.currency = currency.clone();
        }

        for assignment in &self.tax_rates {
            let (line, rate) = parse_line_assignment(assignment)?;
            let rate: f64 = rate
                .trim()
                .trim_end_matches('%')
                .replace(',', ".")
                .parse()
                .with_context(|| format!("Invalid tax rate in '{}'", assignment))?;
            ctx.lines.entry(line).or_default().merge(LineOverride {
                tax_rate: Some(rate),
                ..Default::default()
            });
        }
        for assignment in &self.texts {
            let (line, text) = parse_line_assignment(assignment)?;
            ctx.lines.entry(line).or_default().merge(LineOverride {
                posting_text: Some(text.to_string()),
                ..Default::default()
            });
        }

        Ok(ctx)
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Extract {
                pdf,
                layout,
                refresh,
                service,
            } => {
                let session = SessionService::open(&self.session_db, &self.session).await?;
                let upload = PdfUpload::load(&pdf).await?;
                let client = service.client()?;
                let layout = parse_layout(layout.as_deref())?;
                let cached = session.extract(&client, &upload, layout, refresh).await?;
                print_form(&cached)?;
            }

            Commands::Show { file } => {
                let session = SessionService::open(&self.session_db, &self.session).await?;
                let cached = match file {
                    Some(path) => {
                        let upload = PdfUpload::load(&path).await?;
                        session
                            .find(&upload)
                            .await?
                            .ok_or_else(|| AppError::NoExtraction(self.session.clone()))?
                    }
                    None => session.latest().await?,
                };
                print_form(&cached)?;
            }

            Commands::Export {
                pdf,
                layout,
                offline,
                output,
                form,
                service,
            } => {
                let session = SessionService::open(&self.session_db, &self.session).await?;
                let layout = parse_layout(layout.as_deref())?;
                let cached = match pdf {
                    Some(path) => {
                        let upload = PdfUpload::load(&path).await?;
                        match session.find(&upload).await? {
                            Some(cached) if offline || layout.is_none_or(|l| l == cached.layout) => {
                                cached
                            }
                            _ if offline => {
                                return Err(AppError::NoExtraction(self.session.clone()).into());
                            }
                            _ => {
                                let client = service.client()?;
                                session.extract(&client, &upload, layout, false).await?
                            }
                        }
                    }
                    None => session.latest().await?,
                };

                let ctx = form.booking_context()?;
                let export = session.prepare_export(&cached, &ctx).map_err(with_hint)?;
                let written = write_csv(
                    export.layout,
                    &export.rows,
                    output.as_deref(),
                    export.document_number(),
                )?;
                session.mark_exported(&export).await?;
                report_written(export.rows.len(), written.as_deref());
            }

            Commands::Map {
                payload,
                layout,
                output,
                form,
            } => {
                let text = std::fs::read_to_string(&payload)
                    .with_context(|| format!("Failed to read payload: {}", payload.display()))?;
                let json: serde_json::Value =
                    serde_json::from_str(&text).context("Payload is not valid JSON")?;
                let invoice = ExtractedInvoice::from_json(&json, parse_layout(layout.as_deref())?)
                    .map_err(|e| with_hint(e.into()))?;
                let ctx = form.booking_context()?;
                let rows = map_invoice(&invoice, &ctx).map_err(|e| with_hint(e.into()))?;
                let document_number = rows
                    .first()
                    .map(|r| r.document_number.clone())
                    .unwrap_or_default();
                let written = write_csv(invoice.layout(), &rows, output.as_deref(), &document_number)?;
                report_written(rows.len(), written.as_deref());
            }

            Commands::Sessions => {
                let session = SessionService::open(&self.session_db, &self.session).await?;
                let extractions = session.list().await?;
                if extractions.is_empty() {
                    println!("No cached extractions in session '{}'.", self.session);
                } else {
                    println!(
                        "{:<30} {:<8} {:<10} {:<20} {:<12}",
                        "FILE", "LAYOUT", "STATUS", "EXTRACTED", "DIGEST"
                    );
                    println!("{}", "-".repeat(84));
                    for e in extractions {
                        println!(
                            "{:<30} {:<8} {:<10} {:<20} {:<12}",
                            truncate(&e.file_name, 30),
                            e.layout.as_str(),
                            e.status.as_str(),
                            e.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                            &e.digest[..e.digest.len().min(12)]
                        );
                    }
                }
            }

            Commands::Reset => {
                let session = SessionService::open(&self.session_db, &self.session).await?;
                let removed = session.reset().await?;
                println!(
                    "Session '{}' reset ({} cached extraction(s) discarded)",
                    self.session, removed
                );
            }
        }

        Ok(())
    }
}

/// Turn mapping errors into messages that tell the user how to fix the input.
fn with_hint(err: AppError) -> anyhow::Error {
    match err {
        AppError::Mapping(MappingError::InvalidTaxRate { line, value }) => anyhow::anyhow!(
            "Invalid tax rate {}% on line {} (allowed: 0, 7, 19). \
             Correct it with --tax-rate {}=<0|7|19> or a [[line]] steuersatz in --overrides",
            value,
            line,
            line
        ),
        AppError::Mapping(MappingError::MissingDocumentNumber) => anyhow::anyhow!(
            "The extraction has no Belegnummer. Provide one with --belegnummer"
        ),
        other => other.into(),
    }
}

fn print_form(cached: &CachedExtraction) -> Result<()> {
    let invoice = cached.invoice()?;

    println!("File:         {} ({}, {})", cached.file_name, cached.layout, cached.status);
    println!("Belegdatum:   {}", invoice.document_date);
    println!("Belegnummer:  {}", invoice.document_number);
    println!();

    let drafts = draft_lines(&invoice);
    if drafts.is_empty() {
        println!("No lines extracted.");
        return Ok(());
    }

    println!(
        "{:<5} {:>12} {:<11} {:<9} {:<30}",
        "LINE", "BETRAG", "STEUERSATZ", "STEUERKZ", "BUCHUNGSTEXT"
    );
    println!("{}", "-".repeat(70));
    for draft in drafts {
        match draft.tax_rate {
            Ok(rate) => println!(
                "{:<5} {:>12} {:<11} {:<9} {:<30}",
                draft.line,
                format_cents(draft.amount_cents),
                format!("{}%", rate),
                rate.default_tax_code().as_str(),
                default_posting_text(rate)
            ),
            Err(raw) => println!(
                "{:<5} {:>12} {:<11} {:<9} {:<30}",
                draft.line,
                format_cents(draft.amount_cents),
                format!("{}% (!)", raw),
                "-",
                "invalid rate, use 0, 7 or 19"
            ),
        }
    }

    println!();
    println!("Konto:        {}", join_choices(&DEBIT_ACCOUNT_CHOICES));
    println!("Gegenkonto:   {}", join_choices(&CREDIT_ACCOUNT_CHOICES));
    println!("Buchungsart:  {}", join_choices(&POSTING_TYPE_CHOICES));
    Ok(())
}

fn join_choices<T: std::fmt::Display>(choices: &[T]) -> String {
    let mut out = String::new();
    for (i, choice) in choices.iter().enumerate() {
        if i == 0 {
            out.push_str(&format!("{} (default)", choice));
        } else {
            out.push_str(&format!(", {}", choice));
        }
    }
    out
}

/// Write the CSV to `output`, stdout for "-", or the derived file name.
/// Returns the path written, or None for stdout.
fn write_csv(
    layout: InvoiceLayout,
    rows: &[LedgerRow],
    output: Option<&str>,
    document_number: &str,
) -> Result<Option<String>> {
    use std::fs::File;
    use std::io::stdout;

    let exporter = Exporter::new(layout);
    match output {
        Some("-") => {
            exporter.export_csv(rows, stdout())?;
            Ok(None)
        }
        _ => {
            let path = output
                .map(str::to_string)
                .unwrap_or_else(|| export_file_name(document_number));
            let file = File::create(Path::new(&path))
                .with_context(|| format!("Failed to create output file: {}", path))?;
            exporter.export_csv(rows, file)?;
            Ok(Some(path))
        }
    }
}

fn report_written(count: usize, path: Option<&str>) {
    if let Some(path) = path {
        info!(rows = count, path, "CSV written");
        eprintln!("Exported {} ledger row(s) to {}", count, path);
    }
}

fn parse_layout(layout: Option<&str>) -> Result<Option<InvoiceLayout>> {
    layout
        .map(|l| {
            InvoiceLayout::from_str(l)
                .ok_or_else(|| anyhow::anyhow!("Invalid layout '{}'. Valid layouts: charges, summary", l))
        })
        .transpose()
}

fn parse_line_assignment(input: &str) -> Result<(usize, &str)> {
    let (line, value) = input
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Expected LINE=VALUE, got '{}'", input))?;
    let line: usize = line
        .trim()
        .parse()
        .with_context(|| format!("Invalid line number in '{}'", input))?;
    Ok((line, value))
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").context("Date must be in YYYY-MM-DD format")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_prefers_rust_log() {
        assert_eq!(log_filter(Some("warn"), false).to_string(), "warn");
        assert_eq!(log_filter(Some("warn"), true).to_string(), "warn");
        assert_eq!(log_filter(None, false).to_string(), "info");
        assert_eq!(log_filter(None, true).to_string(), "debug");
        assert_eq!(log_filter(Some(""), true).to_string(), "debug");
    }

    #[test]
    fn test_export_layout_needs_pdf() {
        assert!(Cli::try_parse_from(["belegexport", "export", "--layout", "summary"]).is_err());
        assert!(
            Cli::try_parse_from(["belegexport", "export", "rechnung.pdf", "--layout", "summary"])
                .is_ok()
        );
        assert!(Cli::try_parse_from(["belegexport", "export"]).is_ok());
    }

    #[test]
    fn test_parse_line_assignment() {
        assert_eq!(parse_line_assignment("2=7").unwrap(), (2, "7"));
        assert_eq!(parse_line_assignment("1=a=b").unwrap(), (1, "a=b"));
        assert!(parse_line_assignment("x=7").is_err());
        assert!(parse_line_assignment("7").is_err());
    }

    #[test]
    fn test_form_flags_override_defaults() {
        let form = FormArgs {
            booking_date: Some("2024-03-15".into()),
            konto: Some(4400),
            tax_code: Some("v0".into()),
            tax_rates: vec!["2=7%".into()],
            texts: vec!["1=Porto".into()],
            ..Default::default()
        };

        let ctx = form.booking_context().unwrap();

        assert_eq!(ctx.booking_date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(ctx.defaults.debit_account, 4400);
        assert_eq!(ctx.defaults.tax_code, Some(TaxCode::V0));
        assert_eq!(ctx.lines[&2].tax_rate, Some(7.0));
        assert_eq!(ctx.lines[&1].posting_text.as_deref(), Some("Porto"));
    }

    #[test]
    fn test_invalid_tax_rate_hint_names_line() {
        let err = with_hint(AppError::Mapping(MappingError::InvalidTaxRate { line: 3, value: 16.0 }));
        assert!(err.to_string().contains("--tax-rate 3="));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short.pdf", 30), "short.pdf");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_join_choices() {
        assert_eq!(join_choices(&[3400, 4000]), "3400 (default), 4000");
    }
}
