//! Exact fixed-point decimal with two fractional digits.
//!
//! Amounts are held as a signed count of hundredths, so no value ever passes
//! through binary floating point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of fractional digits carried by every [`FixedDecimal`].
pub const SCALE: u32 = 2;

const UNITS_PER_WHOLE: u64 = 10u64.pow(SCALE);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecimalError {
    #[error("empty value")]
    Empty,
    #[error("not a decimal number")]
    Syntax,
    #[error("value is out of range")]
    Overflow,
    #[error("more than two fractional digits")]
    Precision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FixedDecimal {
    hundredths: i64,
}

/// Sign, significant digits and power-of-ten exponent of a parsed literal.
struct Literal {
    negative: bool,
    digits: Vec<u8>,
    exponent: i64,
}

impl FixedDecimal {
    pub fn from_hundredths(hundredths: i64) -> Self {
        Self { hundredths }
    }

    pub fn hundredths(self) -> i64 {
        self.hundredths
    }

    /// Parses `input` and rounds it to two fractional digits, ties away from
    /// zero (round-half-up).
    pub fn parse_rounded(input: &str) -> Result<Self, DecimalError> {
        let literal = Literal::parse(input)?;
        let shift = literal.exponent + i64::from(SCALE);

        let magnitude = if shift >= 0 {
            scale_up(&literal.digits, shift)?
        } else {
            let drop = usize::try_from(-shift).map_err(|_| DecimalError::Overflow)?;
            let keep = literal.digits.len().saturating_sub(drop);
            let kept = scale_up(&literal.digits[..keep], 0)?;
            let first_dropped = if drop <= literal.digits.len() {
                literal.digits[keep]
            } else {
                0
            };
            if first_dropped >= 5 {
                kept.checked_add(1).ok_or(DecimalError::Overflow)?
            } else {
                kept
            }
        };

        Self::from_magnitude(literal.negative, magnitude)
    }

    /// Parses `input` without rounding. Trailing fractional zeros beyond the
    /// scale are accepted; any other extra digit is a [`DecimalError::Precision`].
    pub fn parse_exact(input: &str) -> Result<Self, DecimalError> {
        let literal = Literal::parse(input)?;
        let shift = literal.exponent + i64::from(SCALE);

        let magnitude = if shift >= 0 {
            scale_up(&literal.digits, shift)?
        } else {
            let drop = usize::try_from(-shift).map_err(|_| DecimalError::Overflow)?;
            let keep = literal.digits.len().saturating_sub(drop);
            if literal.digits[keep..].iter().any(|d| *d != 0) {
                return Err(DecimalError::Precision);
            }
            scale_up(&literal.digits[..keep], 0)?
        };

        Self::from_magnitude(literal.negative, magnitude)
    }

    fn from_magnitude(negative: bool, magnitude: u64) -> Result<Self, DecimalError> {
        let value = i64::try_from(magnitude).map_err(|_| DecimalError::Overflow)?;
        Ok(Self {
            hundredths: if negative { -value } else { value },
        })
    }
}

/// Interprets `digits` as an integer and multiplies it by `10^shift`.
fn scale_up(digits: &[u8], shift: i64) -> Result<u64, DecimalError> {
    let mut value: u64 = 0;
    for d in digits {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(*d)))
            .ok_or(DecimalError::Overflow)?;
    }
    if value == 0 {
        return Ok(0);
    }
    for _ in 0..shift {
        value = value.checked_mul(10).ok_or(DecimalError::Overflow)?;
    }
    Ok(value)
}

impl Literal {
    fn parse(input: &str) -> Result<Self, DecimalError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(DecimalError::Empty);
        }

        let (negative, rest) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let (mantissa, exponent) = match rest.find(['e', 'E']) {
            Some(pos) => {
                let exp = &rest[pos + 1..];
                let unsigned = exp.strip_prefix(['+', '-']).unwrap_or(exp);
                if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(DecimalError::Syntax);
                }
                let exp: i64 = exp.parse().map_err(|_| DecimalError::Overflow)?;
                (&rest[..pos], exp)
            }
            None => (rest, 0),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DecimalError::Syntax);
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(DecimalError::Syntax);
        }

        let digits: Vec<u8> = int_part
            .bytes()
            .chain(frac_part.bytes())
            .map(|b| b - b'0')
            .skip_while(|d| *d == 0)
            .collect();
        let frac_len = i64::try_from(frac_part.len()).map_err(|_| DecimalError::Overflow)?;
        let exponent = exponent.checked_sub(frac_len).ok_or(DecimalError::Overflow)?;

        Ok(Self {
            negative,
            digits,
            exponent,
        })
    }
}

impl fmt::Display for FixedDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.hundredths < 0 { "-" } else { "" };
        let magnitude = self.hundredths.unsigned_abs();
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            magnitude / UNITS_PER_WHOLE,
            magnitude % UNITS_PER_WHOLE,
            width = SCALE as usize
        )
    }
}

impl FromStr for FixedDecimal {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_exact(s)
    }
}

impl Serialize for FixedDecimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FixedDecimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_exact(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rounded(s: &str) -> String {
        FixedDecimal::parse_rounded(s).unwrap().to_string()
    }

    #[test]
    fn test_rounds_half_up() {
        assert_eq!(rounded("100.005"), "100.01");
        assert_eq!(rounded("100.004"), "100.00");
        assert_eq!(rounded("18856.281305978155"), "18856.28");
        assert_eq!(rounded("0.995"), "1.00");
        assert_eq!(rounded("-2.675"), "-2.68");
    }

    #[test]
    fn test_pads_to_two_digits() {
        assert_eq!(rounded("42"), "42.00");
        assert_eq!(rounded("42.5"), "42.50");
        assert_eq!(rounded(".5"), "0.50");
        assert_eq!(rounded("  7.1 "), "7.10");
    }

    #[test]
    fn test_exponent_notation() {
        assert_eq!(rounded("1.2345e2"), "123.45");
        assert_eq!(rounded("5E-3"), "0.01");
        assert_eq!(rounded("4e-3"), "0.00");
        assert_eq!(rounded("1e-40"), "0.00");
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(FixedDecimal::parse_rounded("abc"), Err(DecimalError::Syntax));
        assert_eq!(FixedDecimal::parse_rounded(""), Err(DecimalError::Empty));
        assert_eq!(FixedDecimal::parse_rounded("NaN"), Err(DecimalError::Syntax));
        assert_eq!(FixedDecimal::parse_rounded("1.2.3"), Err(DecimalError::Syntax));
        assert_eq!(FixedDecimal::parse_rounded("-"), Err(DecimalError::Syntax));
        assert_eq!(FixedDecimal::parse_rounded("1e"), Err(DecimalError::Syntax));
        assert_eq!(FixedDecimal::parse_rounded("1e400"), Err(DecimalError::Overflow));
    }

    #[test]
    fn test_parse_exact_keeps_scale() {
        assert_eq!(FixedDecimal::parse_exact("100.01").unwrap().hundredths(), 10001);
        assert_eq!(FixedDecimal::parse_exact("3.100").unwrap().to_string(), "3.10");
        assert_eq!(FixedDecimal::parse_exact("100.005"), Err(DecimalError::Precision));
    }

    #[test]
    fn test_negative_zero_renders_unsigned() {
        assert_eq!(rounded("-0.001"), "0.00");
    }
}
