use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Cents, InvoiceLayout, TaxCode, TaxRate};

/// Column header for charge-line exports.
pub const CHARGES_HEADER: [&str; 10] = [
    "Buchungsdatum",
    "Belegdatum",
    "Belegnummer",
    "Buchungstext",
    "Konto",
    "Gegenkonto",
    "Betrag",
    "Steuerkennzeichen",
    "Buchungsart",
    "Währung",
];

/// Column header for summary exports.
pub const SUMMARY_HEADER: [&str; 7] = [
    "Buchungsdatum",
    "Belegdatum",
    "Belegnummer",
    "Buchungstext",
    "Betrag",
    "Steuersatz",
    "Währung",
];

pub fn header_for(layout: InvoiceLayout) -> &'static [&'static str] {
    match layout {
        InvoiceLayout::Charges => &CHARGES_HEADER,
        InvoiceLayout::Summary => &SUMMARY_HEADER,
    }
}

/// Tax marker of a row: a Steuerkennzeichen for charge lines,
/// the plain rate for summary rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxMark {
    Code(TaxCode),
    Rate(TaxRate),
}

impl std::fmt::Display for TaxMark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaxMark::Code(code) => write!(f, "{}", code),
            TaxMark::Rate(rate) => write!(f, "{}", rate),
        }
    }
}

/// A single booking ready for CSV output. Rows are built by the mapper
/// and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Posting date chosen by the user
    pub booking_date: NaiveDate,
    /// Invoice date as printed on the document (kept verbatim)
    pub document_date: String,
    /// Invoice number, never empty
    pub document_number: String,
    pub posting_text: String,
    /// Konto
    pub debit_account: u32,
    /// Gegenkonto
    pub credit_account: u32,
    pub amount_cents: Cents,
    pub tax_rate: TaxRate,
    pub tax_mark: TaxMark,
    /// Buchungsart
    pub posting_type: u8,
    pub currency: String,
}

/// Posting text suggested for a line with the given rate.
pub fn default_posting_text(rate: TaxRate) -> String {
    if rate.percent() > 0 {
        format!("Wareneingang {}%", rate.percent())
    } else {
        "Wareneinkauf Netto".to_string()
    }
}
