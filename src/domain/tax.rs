use serde::{Deserialize, Serialize};

/// German VAT rates an invoice line may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaxRate {
    /// Tax-free / reverse charge
    Zero,
    /// Reduced rate (7%)
    Reduced,
    /// Standard rate (19%)
    Standard,
}

impl TaxRate {
    pub const ALL: [TaxRate; 3] = [TaxRate::Zero, TaxRate::Reduced, TaxRate::Standard];

    pub fn percent(&self) -> u8 {
        match self {
            TaxRate::Zero => 0,
            TaxRate::Reduced => 7,
            TaxRate::Standard => 19,
        }
    }

    /// Look up a rate by its percentage. Only whole 0, 7 and 19 match.
    pub fn from_percent(value: f64) -> Option<Self> {
        if !value.is_finite() || value.fract() != 0.0 {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|rate| f64::from(rate.percent()) == value)
    }

    /// Steuerkennzeichen suggested for this rate.
    pub fn default_tax_code(&self) -> TaxCode {
        match self {
            TaxRate::Zero => TaxCode::V0,
            TaxRate::Reduced => TaxCode::V1,
            TaxRate::Standard => TaxCode::V2,
        }
    }
}

impl std::fmt::Display for TaxRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.percent())
    }
}

/// Internal tax code (Steuerkennzeichen) of the accounting system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxCode {
    V0,
    V1,
    V2,
}

impl TaxCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxCode::V0 => "V0",
            TaxCode::V1 => "V1",
            TaxCode::V2 => "V2",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "V0" => Some(TaxCode::V0),
            "V1" => Some(TaxCode::V1),
            "V2" => Some(TaxCode::V2),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaxCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
