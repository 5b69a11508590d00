use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::{
    Cents, ExtractedInvoice, InvoiceBody, LedgerRow, MappingError, TaxCode, TaxMark, TaxRate,
    default_posting_text,
};

pub const DEFAULT_DEBIT_ACCOUNT: u32 = 3400;
pub const DEFAULT_CREDIT_ACCOUNT: u32 = 1200;
pub const DEFAULT_POSTING_TYPE: u8 = 1;
pub const DEFAULT_CURRENCY: &str = "EUR";

/// Accounts offered by the booking form, default first.
pub const DEBIT_ACCOUNT_CHOICES: [u32; 3] = [3400, 4000, 4400];
pub const CREDIT_ACCOUNT_CHOICES: [u32; 3] = [1200, 1000, 1800];
pub const POSTING_TYPE_CHOICES: [u8; 3] = [1, 2, 3];

/// Values applied to every line unless a line override says otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct LineDefaults {
    pub debit_account: u32,
    pub credit_account: u32,
    pub posting_type: u8,
    pub currency: String,
    /// Forces one tax code on all lines; otherwise it follows the rate.
    pub tax_code: Option<TaxCode>,
}

impl Default for LineDefaults {
    fn default() -> Self {
        Self {
            debit_account: DEFAULT_DEBIT_ACCOUNT,
            credit_account: DEFAULT_CREDIT_ACCOUNT,
            posting_type: DEFAULT_POSTING_TYPE,
            currency: DEFAULT_CURRENCY.to_string(),
            tax_code: None,
        }
    }
}

/// User edits for one line. Unset fields keep the extracted or default value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineOverride {
    pub amount_cents: Option<Cents>,
    pub tax_rate: Option<f64>,
    pub tax_code: Option<TaxCode>,
    pub posting_text: Option<String>,
    pub debit_account: Option<u32>,
    pub credit_account: Option<u32>,
    pub posting_type: Option<u8>,
    pub currency: Option<String>,
}

impl LineOverride {
    /// Layer `other` on top of `self`; fields set in `other` win.
    pub fn merge(&mut self, other: LineOverride) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            amount_cents,
            tax_rate,
            tax_code,
            posting_text,
            debit_account,
            credit_account,
            posting_type,
            currency
        );
    }
}

/// Everything the user decided for one export. This is the per-request
/// context the mapper reads; it holds no reference to any session store.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingContext {
    pub booking_date: NaiveDate,
    pub document_date: Option<String>,
    pub document_number: Option<String>,
    pub defaults: LineDefaults,
    /// Keyed by 1-based line number
    pub lines: BTreeMap<usize, LineOverride>,
}

impl BookingContext {
    pub fn new(booking_date: NaiveDate) -> Self {
        Self {
            booking_date,
            document_date: None,
            document_number: None,
            defaults: LineDefaults::default(),
            lines: BTreeMap::new(),
        }
    }

    pub fn with_document_number(mut self, number: impl Into<String>) -> Self {
        self.document_number = Some(number.into());
        self
    }

    pub fn with_document_date(mut self, date: impl Into<String>) -> Self {
        self.document_date = Some(date.into());
        self
    }

    pub fn with_defaults(mut self, defaults: LineDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_line(mut self, line: usize, edit: LineOverride) -> Self {
        self.lines.entry(line).or_default().merge(edit);
        self
    }
}

/// Booking form values for one line before the user edits anything.
#[derive(Debug, Clone, PartialEq)]
pub struct LineDraft {
    pub line: usize,
    pub amount_cents: Cents,
    pub tax_rate: Result<TaxRate, f64>,
}

/// Pre-filled line values, used to show the form. Invalid rates are kept
/// as their raw value so they can be displayed for correction.
pub fn draft_lines(invoice: &ExtractedInvoice) -> Vec<LineDraft> {
    let raw: Vec<(Cents, f64)> = match &invoice.body {
        InvoiceBody::Charges(lines) => lines.iter().map(|l| (l.amount, l.tax_rate)).collect(),
        InvoiceBody::Summary(summary) => vec![(summary.gross_total, summary.tax_rate)],
    };

    raw.into_iter()
        .enumerate()
        .map(|(i, (amount_cents, rate))| LineDraft {
            line: i + 1,
            amount_cents,
            tax_rate: TaxRate::from_percent(rate).ok_or(rate),
        })
        .collect()
}

/// Map an extracted invoice to ledger rows.
///
/// Charge layouts produce one row per charge line in document order, the
/// summary layout exactly one row carrying the gross total. Any invalid
/// line aborts the whole mapping.
pub fn map_invoice(
    invoice: &ExtractedInvoice,
    ctx: &BookingContext,
) -> Result<Vec<LedgerRow>, MappingError> {
    let line_count = invoice.line_count();
    if line_count == 0 {
        return Err(MappingError::NoLines);
    }
    if let Some((&line, _)) = ctx.lines.iter().find(|(line, _)| **line == 0 || **line > line_count) {
        return Err(MappingError::UnknownLine {
            line,
            available: line_count,
        });
    }

    let document_number = ctx
        .document_number
        .as_deref()
        .unwrap_or(invoice.document_number.as_str())
        .trim()
        .to_string();
    if document_number.is_empty() {
        return Err(MappingError::MissingDocumentNumber);
    }
    let document_date = ctx
        .document_date
        .as_deref()
        .unwrap_or(invoice.document_date.as_str())
        .trim()
        .to_string();

    let summary_layout = matches!(invoice.body, InvoiceBody::Summary(_));
    let no_edit = LineOverride::default();

    draft_lines(invoice)
        .into_iter()
        .map(|draft| -> Result<LedgerRow, MappingError> {
            let edit = ctx.lines.get(&draft.line).unwrap_or(&no_edit);

            let rate = match edit.tax_rate {
                Some(value) => TaxRate::from_percent(value).ok_or(value),
                None => draft.tax_rate,
            }
            .map_err(|value| MappingError::InvalidTaxRate {
                line: draft.line,
                value,
            })?;

            let tax_mark = if summary_layout {
                TaxMark::Rate(rate)
            } else {
                TaxMark::Code(
                    edit.tax_code
                        .or(ctx.defaults.tax_code)
                        .unwrap_or_else(|| rate.default_tax_code()),
                )
            };

            Ok(LedgerRow {
                booking_date: ctx.booking_date,
                document_date: document_date.clone(),
                document_number: document_number.clone(),
                posting_text: edit
                    .posting_text
                    .clone()
                    .unwrap_or_else(|| default_posting_text(rate)),
                debit_account: edit.debit_account.unwrap_or(ctx.defaults.debit_account),
                credit_account: edit.credit_account.unwrap_or(ctx.defaults.credit_account),
                amount_cents: edit.amount_cents.unwrap_or(draft.amount_cents),
                tax_rate: rate,
                tax_mark,
                posting_type: edit.posting_type.unwrap_or(ctx.defaults.posting_type),
                currency: edit
                    .currency
                    .clone()
                    .unwrap_or_else(|| ctx.defaults.currency.clone()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn booking_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn charges(lines: serde_json::Value) -> ExtractedInvoice {
        let payload = json!({
            "invoiceInfo": {"belegdatum": "2024-03-01", "belegnummer": "RE-1001"},
            "chargeDetails": lines
        });
        ExtractedInvoice::from_json(&payload, None).unwrap()
    }

    #[test]
    fn test_standard_rate_line() {
        let invoice = charges(json!([{"betrag": 100.0, "taxes": 19}]));

        let rows = map_invoice(&invoice, &BookingContext::new(booking_date())).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.amount_cents, 10000);
        assert_eq!(row.tax_rate, TaxRate::Standard);
        assert_eq!(row.tax_mark, TaxMark::Code(TaxCode::V2));
        assert_eq!(row.posting_text, "Wareneingang 19%");
        assert_eq!(row.debit_account, 3400);
        assert_eq!(row.credit_account, 1200);
        assert_eq!(row.posting_type, 1);
        assert_eq!(row.currency, "EUR");
        assert_eq!(row.document_number, "RE-1001");
    }

    #[test]
    fn test_zero_rate_line() {
        let invoice = charges(json!([{"betrag": 50.0, "taxes": 0}]));

        let rows = map_invoice(&invoice, &BookingContext::new(booking_date())).unwrap();

        assert_eq!(rows[0].posting_text, "Wareneinkauf Netto");
        assert_eq!(rows[0].tax_mark, TaxMark::Code(TaxCode::V0));
    }

    #[test]
    fn test_one_row_per_charge_line_in_order() {
        let invoice = charges(json!([
            {"betrag": 10.0, "taxes": 19},
            {"betrag": 20.0, "taxes": 7},
            {"betrag": 30.0, "taxes": 0}
        ]));

        let rows = map_invoice(&invoice, &BookingContext::new(booking_date())).unwrap();

        let amounts: Vec<Cents> = rows.iter().map(|r| r.amount_cents).collect();
        assert_eq!(amounts, vec![1000, 2000, 3000]);
        assert_eq!(rows[1].posting_text, "Wareneingang 7%");
    }

    #[test]
    fn test_invalid_tax_rate_is_reported() {
        let invoice = charges(json!([{"betrag": 10.0, "taxes": 19}, {"betrag": 5.0, "taxes": 16}]));

        let err = map_invoice(&invoice, &BookingContext::new(booking_date())).unwrap_err();

        assert_eq!(err, MappingError::InvalidTaxRate { line: 2, value: 16.0 });
    }

    #[test]
    fn test_invalid_tax_rate_can_be_corrected() {
        let invoice = charges(json!([{"betrag": 5.0, "taxes": 16}]));
        let ctx = BookingContext::new(booking_date()).with_line(
            1,
            LineOverride {
                tax_rate: Some(19.0),
                ..Default::default()
            },
        );

        let rows = map_invoice(&invoice, &ctx).unwrap();

        assert_eq!(rows[0].tax_rate, TaxRate::Standard);
        assert_eq!(rows[0].posting_text, "Wareneingang 19%");
    }

    #[test]
    fn test_overrides_take_precedence() {
        let invoice = charges(json!([{"betrag": 100.0, "taxes": 19}, {"betrag": 1.0, "taxes": 7}]));
        let ctx = BookingContext::new(booking_date())
            .with_document_number("RE-2000")
            .with_defaults(LineDefaults {
                debit_account: 4000,
                tax_code: Some(TaxCode::V0),
                ..Default::default()
            })
            .with_line(
                2,
                LineOverride {
                    posting_text: Some("Bürobedarf".into()),
                    tax_code: Some(TaxCode::V1),
                    credit_account: Some(1800),
                    currency: Some("USD".into()),
                    amount_cents: Some(150),
                    ..Default::default()
                },
            );

        let rows = map_invoice(&invoice, &ctx).unwrap();

        assert_eq!(rows[0].document_number, "RE-2000");
        assert_eq!(rows[0].debit_account, 4000);
        assert_eq!(rows[0].tax_mark, TaxMark::Code(TaxCode::V0));
        assert_eq!(rows[1].posting_text, "Bürobedarf");
        assert_eq!(rows[1].tax_mark, TaxMark::Code(TaxCode::V1));
        assert_eq!(rows[1].credit_account, 1800);
        assert_eq!(rows[1].currency, "USD");
        assert_eq!(rows[1].amount_cents, 150);
    }

    #[test]
    fn test_missing_document_number() {
        let payload = json!({"chargeDetails": [{"betrag": 1.0, "taxes": 0}]});
        let invoice = ExtractedInvoice::from_json(&payload, None).unwrap();

        let err = map_invoice(&invoice, &BookingContext::new(booking_date())).unwrap_err();
        assert_eq!(err, MappingError::MissingDocumentNumber);

        let ctx = BookingContext::new(booking_date()).with_document_number("X-1");
        assert!(map_invoice(&invoice, &ctx).is_ok());
    }

    #[test]
    fn test_no_lines() {
        let invoice = charges(json!([]));
        let err = map_invoice(&invoice, &BookingContext::new(booking_date())).unwrap_err();
        assert_eq!(err, MappingError::NoLines);
    }

    #[test]
    fn test_override_for_unknown_line() {
        let invoice = charges(json!([{"betrag": 1.0, "taxes": 0}]));
        let ctx = BookingContext::new(booking_date()).with_line(3, LineOverride::default());

        let err = map_invoice(&invoice, &ctx).unwrap_err();
        assert_eq!(err, MappingError::UnknownLine { line: 3, available: 1 });
    }

    #[test]
    fn test_summary_layout_single_row() {
        let payload = json!({
            "document_info": {"belegdatum": "2024-02-01", "belegnummer": "S-9"},
            "summary": {"tax_rate": 7, "tax_amount": 7.0, "net_total": 100.0, "gross_total": 107.0}
        });
        let invoice = ExtractedInvoice::from_json(&payload, None).unwrap();

        let rows = map_invoice(&invoice, &BookingContext::new(booking_date())).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount_cents, 10700);
        assert_eq!(rows[0].tax_mark, TaxMark::Rate(TaxRate::Reduced));
        assert_eq!(rows[0].posting_text, "Wareneingang 7%");
    }

    #[test]
    fn test_line_override_merge() {
        let mut base = LineOverride {
            tax_rate: Some(7.0),
            posting_text: Some("A".into()),
            ..Default::default()
        };
        base.merge(LineOverride {
            posting_text: Some("B".into()),
            ..Default::default()
        });

        assert_eq!(base.tax_rate, Some(7.0));
        assert_eq!(base.posting_text.as_deref(), Some("B"));
    }

    #[test]
    fn test_draft_lines_keep_invalid_rate() {
        let invoice = charges(json!([{"betrag": 2.0, "taxes": 5}]));
        let drafts = draft_lines(&invoice);
        assert_eq!(drafts[0].tax_rate, Err(5.0));
    }
}
