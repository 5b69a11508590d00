use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{Cents, MappingError, cents_from_f64, parse_cents};

/// Which extraction schema a document follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceLayout {
    /// `invoiceInfo` + `chargeDetails[]`, one ledger row per charge
    Charges,
    /// `document_info` + `summary`, a single ledger row
    Summary,
}

impl InvoiceLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceLayout::Charges => "charges",
            InvoiceLayout::Summary => "summary",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "charges" | "a" | "b" => Some(InvoiceLayout::Charges),
            "summary" | "c" => Some(InvoiceLayout::Summary),
            _ => None,
        }
    }

    /// Guess the layout from the keys an extraction returned.
    pub fn detect(payload: &Value) -> Self {
        match payload {
            Value::Object(map) if map.contains_key("document_info") || map.contains_key("summary") => {
                InvoiceLayout::Summary
            }
            _ => InvoiceLayout::Charges,
        }
    }

    /// JSON Schema posted to the extraction service for this layout.
    pub fn extraction_schema(&self) -> Value {
        match self {
            InvoiceLayout::Charges => json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "title": "Invoice Charge Lines Extraction Schema",
                "type": "object",
                "properties": {
                    "invoiceInfo": {
                        "type": "object",
                        "properties": {
                            "belegdatum": {"type": "string"},
                            "belegnummer": {"type": "string"}
                        },
                        "required": ["belegdatum", "belegnummer"]
                    },
                    "chargeDetails": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "betrag": {"type": "number"},
                                "taxes": {"type": "number"}
                            },
                            "required": ["betrag", "taxes"]
                        }
                    }
                },
                "required": ["invoiceInfo", "chargeDetails"]
            }),
            InvoiceLayout::Summary => json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "title": "Invoice Summary Extraction Schema",
                "type": "object",
                "properties": {
                    "document_info": {
                        "type": "object",
                        "properties": {
                            "belegdatum": {"type": "string"},
                            "belegnummer": {"type": "string"}
                        },
                        "required": ["belegdatum", "belegnummer"]
                    },
                    "summary": {
                        "type": "object",
                        "properties": {
                            "tax_rate": {"type": "number"},
                            "tax_amount": {"type": "number"},
                            "net_total": {"type": "number"},
                            "gross_total": {"type": "number"}
                        },
                        "required": ["tax_rate", "net_total", "gross_total"]
                    }
                },
                "required": ["document_info", "summary"]
            }),
        }
    }

    fn header_key(&self) -> &'static str {
        match self {
            InvoiceLayout::Charges => "invoiceInfo",
            InvoiceLayout::Summary => "document_info",
        }
    }
}

impl std::fmt::Display for InvoiceLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One charge line as extracted. The tax rate is kept raw; it is validated
/// when the line is booked so the user gets a chance to correct it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeLine {
    pub amount: Cents,
    pub tax_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSummary {
    pub tax_rate: f64,
    pub tax_amount: Cents,
    pub net_total: Cents,
    pub gross_total: Cents,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceBody {
    Charges(Vec<ChargeLine>),
    Summary(InvoiceSummary),
}

/// Normalized view of an extraction payload. Absent keys fall back to
/// empty text or zero; values that are present but unreadable are errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedInvoice {
    pub document_date: String,
    pub document_number: String,
    pub body: InvoiceBody,
}

impl ExtractedInvoice {
    /// Read a payload, detecting the layout unless one is given.
    pub fn from_json(payload: &Value, layout: Option<InvoiceLayout>) -> Result<Self, MappingError> {
        let root = payload
            .as_object()
            .ok_or_else(|| MappingError::malformed("<root>", "expected a JSON object"))?;
        let layout = layout.unwrap_or_else(|| InvoiceLayout::detect(payload));

        let header_key = layout.header_key();
        let header = object_at(root, header_key, header_key)?;
        let document_date = read_text(header, "belegdatum", header_key)?;
        let document_number = read_text(header, "belegnummer", header_key)?;

        let body = match layout {
            InvoiceLayout::Charges => InvoiceBody::Charges(read_charges(root)?),
            InvoiceLayout::Summary => InvoiceBody::Summary(read_summary(root)?),
        };

        Ok(Self {
            document_date,
            document_number,
            body,
        })
    }

    pub fn layout(&self) -> InvoiceLayout {
        match self.body {
            InvoiceBody::Charges(_) => InvoiceLayout::Charges,
            InvoiceBody::Summary(_) => InvoiceLayout::Summary,
        }
    }

    /// Number of ledger rows this invoice books to.
    pub fn line_count(&self) -> usize {
        match &self.body {
            InvoiceBody::Charges(lines) => lines.len(),
            InvoiceBody::Summary(_) => 1,
        }
    }
}

fn read_charges(root: &Map<String, Value>) -> Result<Vec<ChargeLine>, MappingError> {
    let items = match root.get("chargeDetails") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(MappingError::malformed("chargeDetails", other)),
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| -> Result<ChargeLine, MappingError> {
            let path = format!("chargeDetails[{}]", i);
            let item = item
                .as_object()
                .ok_or_else(|| MappingError::malformed(path.clone(), item))?;
            Ok(ChargeLine {
                amount: read_amount(Some(item), "betrag", &path)?,
                tax_rate: read_number(Some(item), "taxes", &path)?.unwrap_or(0.0),
            })
        })
        .collect()
}

fn read_summary(root: &Map<String, Value>) -> Result<InvoiceSummary, MappingError> {
    let summary = object_at(root, "summary", "summary")?;
    Ok(InvoiceSummary {
        tax_rate: read_number(summary, "tax_rate", "summary")?.unwrap_or(0.0),
        tax_amount: read_amount(summary, "tax_amount", "summary")?,
        net_total: read_amount(summary, "net_total", "summary")?,
        gross_total: read_amount(summary, "gross_total", "summary")?,
    })
}

fn object_at<'a>(
    root: &'a Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<&'a Map<String, Value>>, MappingError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(MappingError::malformed(path, other)),
    }
}

fn read_text(obj: Option<&Map<String, Value>>, key: &str, path: &str) -> Result<String, MappingError> {
    match obj.and_then(|o| o.get(key)) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(MappingError::malformed(format!("{}.{}", path, key), other)),
    }
}

fn read_number(obj: Option<&Map<String, Value>>, key: &str, path: &str) -> Result<Option<f64>, MappingError> {
    let field = || format!("{}.{}", path, key);
    match obj.and_then(|o| o.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| MappingError::malformed(field(), n)),
        Some(Value::String(s)) => {
            let cleaned = s.trim().trim_end_matches('%').trim().replace(',', ".");
            if cleaned.is_empty() {
                return Ok(None);
            }
            cleaned
                .parse::<f64>()
                .map(Some)
                .map_err(|_| MappingError::malformed(field(), s))
        }
        Some(other) => Err(MappingError::malformed(field(), other)),
    }
}

fn read_amount(obj: Option<&Map<String, Value>>, key: &str, path: &str) -> Result<Cents, MappingError> {
    let field = || format!("{}.{}", path, key);
    match obj.and_then(|o| o.get(key)) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| MappingError::malformed(field(), n))
            .and_then(|v| cents_from_f64(v).map_err(|e| MappingError::malformed(field(), e))),
        Some(Value::String(s)) => {
            let cleaned = s.trim().trim_end_matches('€').trim_end_matches("EUR").trim();
            if cleaned.is_empty() {
                return Ok(0);
            }
            parse_cents(cleaned).map_err(|_| MappingError::malformed(field(), s))
        }
        Some(other) => Err(MappingError::malformed(field(), other)),
    }
}
