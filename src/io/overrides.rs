use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::{BookingContext, LineOverride, TaxCode, cents_from_f64, parse_cents};

/// Form edits saved as TOML, keyed like the CSV columns.
///
/// ```toml
/// buchungsdatum = "2024-03-15"
/// belegnummer = "RE-1001"
///
/// [defaults]
/// konto = 4000
///
/// [[line]]
/// index = 2
/// steuersatz = 7
/// buchungstext = "Bürobedarf"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverridesFile {
    pub buchungsdatum: Option<String>,
    pub belegdatum: Option<String>,
    pub belegnummer: Option<String>,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default, rename = "line")]
    pub lines: Vec<LineSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsSection {
    pub konto: Option<u32>,
    pub gegenkonto: Option<u32>,
    pub buchungsart: Option<u8>,
    #[serde(alias = "währung")]
    pub waehrung: Option<String>,
    pub steuerkennzeichen: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineSection {
    /// 1-based position of the line on the invoice
    pub index: usize,
    pub betrag: Option<AmountValue>,
    pub steuersatz: Option<f64>,
    pub steuerkennzeichen: Option<String>,
    pub buchungstext: Option<String>,
    pub konto: Option<u32>,
    pub gegenkonto: Option<u32>,
    pub buchungsart: Option<u8>,
    #[serde(alias = "währung")]
    pub waehrung: Option<String>,
}

/// Amounts may be written as numbers or as decimal strings ("12,50").
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountValue {
    Number(f64),
    Text(String),
}

impl OverridesFile {
    pub fn parse(input: &str) -> Result<Self> {
        toml::from_str(input).context("Invalid overrides file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read overrides file: {}", path.display()))?;
        Self::parse(&input)
    }

    /// Layer these edits onto a booking context.
    pub fn apply_to(&self, ctx: &mut BookingContext) -> Result<()> {
        if let Some(date) = &self.buchungsdatum {
            ctx.booking_date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .with_context(|| format!("buchungsdatum must be YYYY-MM-DD, got '{}'", date))?;
        }
        if let Some(date) = &self.belegdatum {
            ctx.document_date = Some(date.clone());
        }
        if let Some(number) = &self.belegnummer {
            ctx.document_number = Some(number.clone());
        }

        let defaults = &self.defaults;
        if let Some(konto) = defaults.konto {
            ctx.defaults.debit_account = konto;
        }
        if let Some(gegenkonto) = defaults.gegenkonto {
            ctx.defaults.credit_account = gegenkonto;
        }
        if let Some(buchungsart) = defaults.buchungsart {
            ctx.defaults.posting_type = buchungsart;
        }
        if let Some(waehrung) = &defaults.waehrung {
            ctx.defaults.currency = waehrung.clone();
        }
        if let Some(code) = &defaults.steuerkennzeichen {
            ctx.defaults.tax_code = Some(parse_tax_code(code)?);
        }

        for line in &self.lines {
            let edit = line
                .to_override()
                .with_context(|| format!("Invalid edit for line {}", line.index))?;
            ctx.lines.entry(line.index).or_default().merge(edit);
        }
        Ok(())
    }
}

impl LineSection {
    fn to_override(&self) -> Result<LineOverride> {
        let amount_cents = match &self.betrag {
            None => None,
            Some(AmountValue::Number(n)) => {
                Some(cents_from_f64(*n).map_err(|e| anyhow::anyhow!("betrag: {}", e))?)
            }
            Some(AmountValue::Text(s)) => {
                Some(parse_cents(s).map_err(|e| anyhow::anyhow!("betrag '{}': {}", s, e))?)
            }
        };

        Ok(LineOverride {
            amount_cents,
            tax_rate: self.steuersatz,
            tax_code: self
                .steuerkennzeichen
                .as_deref()
                .map(parse_tax_code)
                .transpose()?,
            posting_text: self.buchungstext.clone(),
            debit_account: self.konto,
            credit_account: self.gegenkonto,
            posting_type: self.buchungsart,
            currency: self.waehrung.clone(),
        })
    }
}

fn parse_tax_code(code: &str) -> Result<TaxCode> {
    TaxCode::from_str(code)
        .ok_or_else(|| anyhow::anyhow!("Invalid Steuerkennzeichen '{}' (use V0, V1 or V2)", code))
}
