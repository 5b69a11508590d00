mod common;

use anyhow::Result;
use belegexport::domain::{
    BookingContext, ExtractedInvoice, InvoiceLayout, LineDefaults, LineOverride, MappingError,
    TaxCode, map_invoice,
};
use belegexport::io::{Exporter, OverridesFile};
use common::{charges_payload, parse_date, summary_payload};
use pretty_assertions::assert_eq;
use serde_json::json;

fn export(payload: &serde_json::Value, ctx: &BookingContext) -> Result<String> {
    let invoice = ExtractedInvoice::from_json(payload, None)?;
    let rows = map_invoice(&invoice, ctx)?;
    Ok(Exporter::new(invoice.layout()).to_csv_string(&rows)?)
}

#[test]
fn test_charges_header_and_column_order() -> Result<()> {
    let payload = charges_payload("RE-1001", json!([{"betrag": 100.0, "taxes": 19}]));
    let ctx = BookingContext::new(parse_date("2024-03-15"));

    let csv = export(&payload, &ctx)?;

    assert_eq!(
        csv,
        "Buchungsdatum,Belegdatum,Belegnummer,Buchungstext,Konto,Gegenkonto,Betrag,Steuerkennzeichen,Buchungsart,Währung\n\
         2024-03-15,2024-03-01,RE-1001,Wareneingang 19%,3400,1200,100.00,V2,1,EUR\n"
    );
    Ok(())
}

#[test]
fn test_zero_rate_line_exports_net_purchase_text() -> Result<()> {
    let payload = charges_payload("RE-1002", json!([{"betrag": 50.0, "taxes": 0}]));
    let ctx = BookingContext::new(parse_date("2024-03-15"));

    let csv = export(&payload, &ctx)?;

    assert!(csv.contains(",Wareneinkauf Netto,3400,1200,50.00,V0,1,EUR\n"));
    Ok(())
}

#[test]
fn test_one_row_per_charge_line() -> Result<()> {
    let payload = charges_payload(
        "RE-1003",
        json!([
            {"betrag": 100.0, "taxes": 19},
            {"betrag": 20.0, "taxes": 7},
            {"betrag": 5.5, "taxes": 0},
            {"betrag": 1.0, "taxes": 19}
        ]),
    );
    let ctx = BookingContext::new(parse_date("2024-03-15"));

    let csv = export(&payload, &ctx)?;
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines.len(), 5);
    assert!(lines[1].contains("Wareneingang 19%"));
    assert!(lines[2].contains("Wareneingang 7%"));
    assert!(lines[2].contains(",V1,"));
    assert!(lines[3].contains("Wareneinkauf Netto"));
    assert!(lines[3].contains(",5.50,"));
    Ok(())
}

#[test]
fn test_reexport_is_byte_identical() -> Result<()> {
    let payload = charges_payload(
        "RE-1004",
        json!([{"betrag": 12.34, "taxes": 7}, {"betrag": "99,99", "taxes": "19"}]),
    );
    let ctx = BookingContext::new(parse_date("2024-03-15")).with_line(
        2,
        LineOverride {
            posting_text: Some("Software, Lizenz \"Pro\"".into()),
            ..Default::default()
        },
    );

    let first = export(&payload, &ctx)?;
    let second = export(&payload, &ctx)?;

    assert_eq!(first.as_bytes(), second.as_bytes());
    // Commas and quotes inside a field are quoted, not split
    assert!(first.contains("\"Software, Lizenz \"\"Pro\"\"\""));
    Ok(())
}

#[test]
fn test_invalid_tax_rate_is_an_error_not_a_panic() {
    let payload = charges_payload("RE-1005", json!([{"betrag": 10.0, "taxes": 16}]));
    let invoice = ExtractedInvoice::from_json(&payload, None).unwrap();

    let result = map_invoice(&invoice, &BookingContext::new(parse_date("2024-03-15")));

    assert_eq!(
        result,
        Err(MappingError::InvalidTaxRate {
            line: 1,
            value: 16.0
        })
    );
}

#[test]
fn test_malformed_payload_aborts_export() {
    let payload = charges_payload(
        "RE-1006",
        json!([{"betrag": 10.0, "taxes": 19}, {"betrag": [1, 2], "taxes": 19}]),
    );

    assert!(ExtractedInvoice::from_json(&payload, None).is_err());
}

#[test]
fn test_summary_layout_uses_seven_columns() -> Result<()> {
    let ctx = BookingContext::new(parse_date("2024-03-15"));

    let csv = export(&summary_payload("S-42"), &ctx)?;

    assert_eq!(
        csv,
        "Buchungsdatum,Belegdatum,Belegnummer,Buchungstext,Betrag,Steuersatz,Währung\n\
         2024-03-15,2024-02-01,S-42,Wareneingang 19%,119.00,19,EUR\n"
    );
    Ok(())
}

#[test]
fn test_form_defaults_and_overrides_file() -> Result<()> {
    let payload = charges_payload(
        "",
        json!([{"betrag": 100.0, "taxes": 19}, {"betrag": 10.0, "taxes": 3}]),
    );
    let file = OverridesFile::parse(
        r#"
        buchungsdatum = "2024-04-01"
        belegnummer = "RE-2001"

        [defaults]
        konto = 4000
        gegenkonto = 1800
        buchungsart = 2

        [[line]]
        index = 2
        steuersatz = 7
        steuerkennzeichen = "V1"
        buchungstext = "Fachliteratur"
        "#,
    )?;
    let mut ctx = BookingContext::new(parse_date("2024-03-15")).with_defaults(LineDefaults {
        tax_code: Some(TaxCode::V2),
        ..Default::default()
    });
    file.apply_to(&mut ctx)?;

    let csv = export(&payload, &ctx)?;

    assert_eq!(
        csv,
        "Buchungsdatum,Belegdatum,Belegnummer,Buchungstext,Konto,Gegenkonto,Betrag,Steuerkennzeichen,Buchungsart,Währung\n\
         2024-04-01,2024-03-01,RE-2001,Wareneingang 19%,4000,1800,100.00,V2,2,EUR\n\
         2024-04-01,2024-03-01,RE-2001,Fachliteratur,4000,1800,10.00,V1,2,EUR\n"
    );
    Ok(())
}

#[test]
fn test_forced_layout_reads_matching_keys_only() -> Result<()> {
    let payload = summary_payload("S-1");

    let invoice = ExtractedInvoice::from_json(&payload, Some(InvoiceLayout::Charges))?;

    // Charge keys are absent, so the permissive read yields no lines
    assert_eq!(invoice.line_count(), 0);
    assert_eq!(
        map_invoice(&invoice, &BookingContext::new(parse_date("2024-03-15"))),
        Err(MappingError::NoLines)
    );
    Ok(())
}
