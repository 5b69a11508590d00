use std::io::Write;

use crate::application::AppError;
use crate::domain::{InvoiceLayout, LedgerRow, format_cents, header_for};

const BOOKING_DATE_FORMAT: &str = "%Y-%m-%d";

/// Writes ledger rows as comma-separated CSV in the fixed column order of a layout.
pub struct Exporter {
    layout: InvoiceLayout,
}

impl Exporter {
    pub fn new(layout: InvoiceLayout) -> Self {
        Self { layout }
    }

    /// Export rows to CSV format, header first. Returns the number of rows written.
    pub fn export_csv<W: Write>(&self, rows: &[LedgerRow], writer: W) -> Result<usize, AppError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(header_for(self.layout))?;

        let mut count = 0;
        for row in rows {
            csv_writer.write_record(self.record(row))?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export rows into an in-memory CSV document.
    pub fn to_csv_string(&self, rows: &[LedgerRow]) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        self.export_csv(rows, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| AppError::Io(std::io::Error::other(e)))
    }

    fn record(&self, row: &LedgerRow) -> Vec<String> {
        let booking_date = row.booking_date.format(BOOKING_DATE_FORMAT).to_string();
        match self.layout {
            InvoiceLayout::Charges => vec![
                booking_date,
                row.document_date.clone(),
                row.document_number.clone(),
                row.posting_text.clone(),
                row.debit_account.to_string(),
                row.credit_account.to_string(),
                format_cents(row.amount_cents),
                row.tax_mark.to_string(),
                row.posting_type.to_string(),
                row.currency.clone(),
            ],
            InvoiceLayout::Summary => vec![
                booking_date,
                row.document_date.clone(),
                row.document_number.clone(),
                row.posting_text.clone(),
                format_cents(row.amount_cents),
                row.tax_rate.to_string(),
                row.currency.clone(),
            ],
        }
    }
}

/// File name offered for an export: `buchung_<Belegnummer>.csv`, with
/// anything outside `[A-Za-z0-9._-]` replaced so it is safe on every filesystem.
pub fn export_file_name(document_number: &str) -> String {
    let safe: String = document_number
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = safe.trim_start_matches('.');
    if safe.is_empty() {
        "buchung.csv".to_string()
    } else {
        format!("buchung_{}.csv", safe)
    }
}
