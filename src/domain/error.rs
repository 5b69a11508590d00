use thiserror::Error;

/// Reasons an extracted invoice cannot be turned into ledger rows.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("Malformed field '{field}': {value}")]
    Malformed { field: String, value: String },

    #[error("Invalid tax rate {value}% on line {line} (allowed: 0, 7, 19)")]
    InvalidTaxRate { line: usize, value: f64 },

    #[error("Document number (Belegnummer) is empty")]
    MissingDocumentNumber,

    #[error("Invoice has no lines to book")]
    NoLines,

    #[error("Override for line {line}, but the invoice has {available} line(s)")]
    UnknownLine { line: usize, available: usize },
}

impl MappingError {
    pub(crate) fn malformed(field: impl Into<String>, value: impl ToString) -> Self {
        MappingError::Malformed {
            field: field.into(),
            value: value.to_string(),
        }
    }
}
