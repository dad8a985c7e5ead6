//! Decimal encoding.
//!
//! A decimal is a sign boolean, the integral part as an unsigned integer and
//! the fractional part as an unsigned integer with its digits in reverse
//! order. Reversing makes trailing zeros of the fraction leading zeros of
//! the coded integer, so they vanish: "380.0" and "380.00" share one coded
//! form. The typed representation is therefore value-normalising, not
//! lexically faithful.

use crate::bitstream::{BitReader, BitWriter};
use crate::integer::{decode_unsigned, encode_unsigned};
use crate::{Error, Result};

/// A decimal value in its wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalValue {
    pub negative: bool,
    /// Integral part, ohne Vorzeichen.
    pub integral: u64,
    /// Nachkommastellen mit umgekehrter Ziffernfolge ("012" für ".210").
    pub fractional_rev: u64,
}

impl DecimalValue {
    /// Parses a decimal lexical form: optional sign, digits, optional
    /// fraction. Leading/trailing whitespace is collapsed first.
    pub fn parse(lexical: &str) -> Result<Self> {
        let s = lexical.trim();
        let (negative, rest) = match s.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int_part, frac_part) = match rest.split_once('.') {
            Some((i, f)) => (i, f),
            None => (rest, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(Error::InvalidValue(lexical.to_string()));
        }
        let integral = parse_digits(int_part, lexical)?;
        // Nachlaufende Nullen fallen beim Umkehren weg
        let frac_trimmed = frac_part.trim_end_matches('0');
        let mut fractional_rev = 0u64;
        for ch in frac_trimmed.chars().rev() {
            let d = ch.to_digit(10).ok_or_else(|| Error::InvalidValue(lexical.to_string()))?;
            fractional_rev = fractional_rev
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(d)))
                .ok_or(Error::IntegerOverflow)?;
        }
        Ok(Self { negative, integral, fractional_rev })
    }

    /// Renders the canonical lexical form ("-12.34", "380" for zero
    /// fraction).
    pub fn to_lexical(self) -> String {
        let mut s = String::new();
        if self.negative && (self.integral != 0 || self.fractional_rev != 0) {
            s.push('-');
        }
        s.push_str(&self.integral.to_string());
        if self.fractional_rev != 0 {
            s.push('.');
            let rev = self.fractional_rev.to_string();
            s.extend(rev.chars().rev());
        }
        s
    }

    pub fn encode(self, writer: &mut BitWriter, byte_aligned: bool) {
        crate::boolean::encode(writer, self.negative, byte_aligned);
        encode_unsigned(writer, self.integral);
        encode_unsigned(writer, self.fractional_rev);
    }

    pub fn decode(reader: &mut BitReader, byte_aligned: bool) -> Result<Self> {
        let negative = crate::boolean::decode(reader, byte_aligned)?;
        let integral = decode_unsigned(reader)?;
        let fractional_rev = decode_unsigned(reader)?;
        Ok(Self { negative, integral, fractional_rev })
    }
}

fn parse_digits(s: &str, lexical: &str) -> Result<u64> {
    if s.is_empty() {
        return Ok(0);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidValue(lexical.to_string()));
    }
    s.parse().map_err(|_| Error::IntegerOverflow)
}
