//! Float (double) encoding: mantissa and exponent as two signed integers.
//!
//! The coded value is `mantissa * 10^exponent`. The reserved exponent
//! `-(2^14)` marks the specials: mantissa 1 is INF, -1 is -INF, everything
//! else NaN. The typed form normalises the lexical representation (no
//! distinction between "1.5", "15E-1" and "0.15E1").

use crate::bitstream::{BitReader, BitWriter};
use crate::integer::{decode_signed, encode_signed};
use crate::{Error, Result};

/// Reservierter Exponent für INF/-INF/NaN.
pub const SPECIAL_EXPONENT: i64 = -(1 << 14);

/// Kleinster/größter regulärer Exponent.
const EXPONENT_MIN: i64 = -(1 << 14) + 1;
const EXPONENT_MAX: i64 = (1 << 14) - 1;

/// A float value in its wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatValue {
    pub mantissa: i64,
    pub exponent: i64,
}

impl FloatValue {
    pub const INFINITY: Self = Self { mantissa: 1, exponent: SPECIAL_EXPONENT };
    pub const NEG_INFINITY: Self = Self { mantissa: -1, exponent: SPECIAL_EXPONENT };
    pub const NAN: Self = Self { mantissa: 0, exponent: SPECIAL_EXPONENT };

    /// Parses a float lexical form: plain decimal, scientific notation, or
    /// one of the specials `INF`, `-INF`, `NaN`.
    pub fn parse(lexical: &str) -> Result<Self> {
        let s = lexical.trim();
        match s {
            "INF" | "+INF" => return Ok(Self::INFINITY),
            "-INF" => return Ok(Self::NEG_INFINITY),
            "NaN" => return Ok(Self::NAN),
            _ => {}
        }
        let (base, exp_part) = match s.split_once(['e', 'E']) {
            Some((b, e)) => (b, Some(e)),
            None => (s, None),
        };
        let mut exponent: i64 = match exp_part {
            Some(e) => e.parse().map_err(|_| Error::InvalidValue(lexical.to_string()))?,
            None => 0,
        };

        let (negative, digits) = match base.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, base.strip_prefix('+').unwrap_or(base)),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(Error::InvalidValue(lexical.to_string()));
        }
        let mut mantissa: i64 = 0;
        for ch in int_part.chars().chain(frac_part.chars()) {
            let d = ch.to_digit(10).ok_or_else(|| Error::InvalidValue(lexical.to_string()))?;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|v| v.checked_add(i64::from(d)))
                .ok_or(Error::IntegerOverflow)?;
        }
        exponent = exponent
            .checked_sub(frac_part.len() as i64)
            .ok_or(Error::IntegerOverflow)?;

        // Mantisse normalisieren: 10er-Potenzen in den Exponenten ziehen
        while mantissa != 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            exponent += 1;
        }
        if mantissa == 0 {
            exponent = 0;
        }
        if negative {
            mantissa = -mantissa;
        }
        if !(EXPONENT_MIN..=EXPONENT_MAX).contains(&exponent) {
            return Err(Error::InvalidValue(lexical.to_string()));
        }
        Ok(Self { mantissa, exponent })
    }

    /// True for INF, -INF and NaN.
    pub fn is_special(self) -> bool {
        self.exponent == SPECIAL_EXPONENT
    }

    /// Renders the canonical lexical form (`mantissa E exponent`).
    pub fn to_lexical(self) -> String {
        if self.is_special() {
            return match self.mantissa {
                1 => "INF".to_string(),
                -1 => "-INF".to_string(),
                _ => "NaN".to_string(),
            };
        }
        format!("{}E{}", self.mantissa, self.exponent)
    }

    pub fn encode(self, writer: &mut BitWriter, byte_aligned: bool) {
        encode_signed(writer, self.mantissa, byte_aligned);
        encode_signed(writer, self.exponent, byte_aligned);
    }

    pub fn decode(reader: &mut BitReader, byte_aligned: bool) -> Result<Self> {
        let mantissa = decode_signed(reader, byte_aligned)?;
        let exponent = decode_signed(reader, byte_aligned)?;
        if exponent < SPECIAL_EXPONENT || exponent > EXPONENT_MAX {
            return Err(Error::corrupt(
                reader.bit_position(),
                format!("float exponent {exponent} out of range"),
            ));
        }
        Ok(Self { mantissa, exponent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(lexical: &str) -> FloatValue {
        let v = FloatValue::parse(lexical).unwrap();
        let mut w = BitWriter::new();
        v.encode(&mut w, false);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        let back = FloatValue::decode(&mut r, false).unwrap();
        assert_eq!(back, v);
        back
    }

    #[test]
    fn einfache_werte() {
        assert_eq!(round_trip("0"), FloatValue { mantissa: 0, exponent: 0 });
        assert_eq!(round_trip("1.5"), FloatValue { mantissa: 15, exponent: -1 });
        assert_eq!(round_trip("-12.25"), FloatValue { mantissa: -1225, exponent: -2 });
        assert_eq!(round_trip("3E8"), FloatValue { mantissa: 3, exponent: 8 });
    }

    /// Äquivalente Schreibweisen normalisieren auf dieselbe Form.
    #[test]
    fn lexical_normalisation() {
        let a = FloatValue::parse("1.5").unwrap();
        let b = FloatValue::parse("15E-1").unwrap();
        let c = FloatValue::parse("0.15E1").unwrap();
        let d = FloatValue::parse("150E-2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
        assert_eq!(a.to_lexical(), "15E-1");
    }

    #[test]
    fn specials() {
        assert_eq!(round_trip("INF"), FloatValue::INFINITY);
        assert_eq!(round_trip("-INF"), FloatValue::NEG_INFINITY);
        assert_eq!(round_trip("NaN"), FloatValue::NAN);
        assert_eq!(FloatValue::NAN.to_lexical(), "NaN");
        assert!(FloatValue::INFINITY.is_special());
    }

    #[test]
    fn exponent_grenzen() {
        assert!(FloatValue::parse("1E16383").is_ok());
        assert!(FloatValue::parse("1E16384").is_err());
        assert!(FloatValue::parse("1E-16383").is_ok());
    }

    #[test]
    fn decode_rejects_exponent_below_special() {
        let mut w = BitWriter::new();
        encode_signed(&mut w, 1, false);
        encode_signed(&mut w, SPECIAL_EXPONENT - 1, false);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        assert!(matches!(
            FloatValue::decode(&mut r, false).unwrap_err(),
            Error::CorruptStream { .. }
        ));
    }

    #[test]
    fn ungueltige_formen() {
        for bad in ["", "abc", "1.2.3", "E5", "1E"] {
            assert!(FloatValue::parse(bad).is_err(), "{bad:?} accepted");
        }
    }
}
