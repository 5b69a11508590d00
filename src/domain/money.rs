use std::fmt;

/// Amounts are held as integer cents so CSV output never carries float noise.
/// 1 EUR = 100 cents, so €50.00 = 5000 cents.
pub type Cents = i64;

/// Format cents as a decimal string with two places.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    let units = abs_cents / 100;
    let remainder = abs_cents % 100;
    format!("{}{}.{:02}", sign, units, remainder)
}

/// Convert a JSON number into cents, rounding half away from zero.
pub fn cents_from_f64(value: f64) -> Result<Cents, ParseCentsError> {
    if !value.is_finite() {
        return Err(ParseCentsError::NotFinite);
    }
    let cents = (value * 100.0).round();
    // i64::MAX as f64 rounds up to 2^63, which no Cents can hold
    if cents.abs() >= i64::MAX as f64 {
        return Err(ParseCentsError::OutOfRange);
    }
    Ok(cents as Cents)
}

/// Parse a decimal string into cents.
/// Accepts a point or a comma as decimal separator, as invoices are often German.
/// When both appear, the last one is the decimal separator and the other groups
/// thousands.
/// Example: "50.00" -> 5000, "12,5" -> 1250, "100" -> 10000, "1.234,56" -> 123456
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let (negative, input) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };
    let input = normalize_separators(input);

    let parts: Vec<&str> = input.split('.').collect();
    match parts.len() {
        1 => {
            let units = parse_units(parts[0])?;
            let cents = units
                .checked_mul(100)
                .ok_or(ParseCentsError::OutOfRange)?;
            Ok(if negative { -cents } else { cents })
        }
        2 => {
            if parts[0].is_empty() && parts[1].is_empty() {
                return Err(ParseCentsError::InvalidFormat);
            }
            let units = if parts[0].is_empty() {
                0
            } else {
                parse_units(parts[0])?
            };

            let decimal_str = parts[1];
            if !decimal_str.chars().all(|c| c.is_ascii_digit()) {
                return Err(ParseCentsError::InvalidFormat);
            }
            let decimal_cents: i64 = match decimal_str.len() {
                0 => 0,
                // "5" means 50 cents
                1 => {
                    decimal_str
                        .parse::<i64>()
                        .map_err(|_| ParseCentsError::InvalidFormat)?
                        * 10
                }
                2 => decimal_str
                    .parse()
                    .map_err(|_| ParseCentsError::InvalidFormat)?,
                // Round on the third digit
                _ => {
                    let head: i64 = decimal_str[..2]
                        .parse()
                        .map_err(|_| ParseCentsError::InvalidFormat)?;
                    let next = decimal_str.as_bytes()[2] - b'0';
                    if next >= 5 { head + 1 } else { head }
                }
            };

            let cents = units
                .checked_mul(100)
                .and_then(|c| c.checked_add(decimal_cents))
                .ok_or(ParseCentsError::OutOfRange)?;
            Ok(if negative { -cents } else { cents })
        }
        _ => Err(ParseCentsError::InvalidFormat),
    }
}

/// Drop thousands separators and turn the decimal separator into a point.
fn normalize_separators(input: &str) -> String {
    match (input.rfind(','), input.rfind('.')) {
        (Some(comma), Some(point)) if comma > point => input.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => input.replace(',', ""),
        _ => input.replace(',', "."),
    }
}

fn parse_units(digits: &str) -> Result<i64, ParseCentsError> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseCentsError::InvalidFormat);
    }
    digits.parse().map_err(|_| ParseCentsError::OutOfRange)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    NotFinite,
    OutOfRange,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::NotFinite => write!(f, "amount is not a finite number"),
            ParseCentsError::OutOfRange => write!(f, "amount out of range"),
        }
    }
}

impl std::error::Error for ParseCentsError {}
