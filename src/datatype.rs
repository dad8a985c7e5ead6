//! Datatype codec layer.
//!
//! Every attribute and character production carries a [`Datatype`] that
//! chooses the value representation. The typed flavor encodes the parsed
//! value; the lexical flavor (preserve.lexical_values) encodes the verbatim
//! string through the datatype's restricted character set. A typed encode
//! returns `Error::InvalidValue` when the lexical form does not parse, which
//! lets the caller fall back to the untyped string path.

use crate::binary::BinaryForm;
use crate::bitstream::{BitReader, BitWriter};
use crate::datetime::DateTimeKind;
use crate::decimal::DecimalValue;
use crate::float::FloatValue;
use crate::strings::LexicalCategory;
use crate::{Error, Result};

/// The value representation of a production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    Boolean,
    /// Bounded-range integer: `n_bits` Bits, Wert minus `lower_bound`.
    NBitInteger { lower_bound: i64, n_bits: u8 },
    UnsignedInteger,
    Integer,
    Decimal,
    Double,
    /// Untyped; goes through the value string table, never through
    /// [`Datatype::encode_typed`].
    String,
    Binary(BinaryForm),
    DateTime(DateTimeKind),
}

impl Datatype {
    /// The restricted character set category for the lexical flavor.
    pub fn lexical_category(self) -> LexicalCategory {
        match self {
            Self::Boolean => LexicalCategory::Boolean,
            Self::NBitInteger { .. } | Self::UnsignedInteger | Self::Integer => {
                LexicalCategory::Integer
            }
            Self::Decimal => LexicalCategory::Decimal,
            Self::Double => LexicalCategory::Double,
            Self::String => LexicalCategory::String,
            Self::Binary(_) => LexicalCategory::Binary,
            Self::DateTime(_) => LexicalCategory::DateTime,
        }
    }

    /// Encodes the lexical form in the typed representation.
    ///
    /// `Error::InvalidValue` means the value does not conform to this
    /// datatype; the stream is untouched in that case (validate first,
    /// write second).
    pub fn encode_typed(
        self,
        writer: &mut BitWriter,
        lexical: &str,
        byte_aligned: bool,
    ) -> Result<()> {
        match self {
            Self::Boolean => {
                let v = parse_boolean(lexical)?;
                crate::boolean::encode(writer, v, byte_aligned);
            }
            Self::NBitInteger { lower_bound, n_bits } => {
                let v: i64 = lexical
                    .trim()
                    .parse()
                    .map_err(|_| Error::InvalidValue(lexical.to_string()))?;
                let offset = v
                    .checked_sub(lower_bound)
                    .filter(|&o| o >= 0 && (n_bits == 64 || (o as u64) < (1u64 << n_bits)))
                    .ok_or_else(|| Error::InvalidValue(lexical.to_string()))?;
                crate::integer::encode_nbit(writer, offset as u64, n_bits, byte_aligned);
            }
            Self::UnsignedInteger => {
                let v: u64 = lexical
                    .trim()
                    .parse()
                    .map_err(|_| Error::InvalidValue(lexical.to_string()))?;
                crate::integer::encode_unsigned(writer, v);
            }
            Self::Integer => {
                let v: i64 = lexical
                    .trim()
                    .parse()
                    .map_err(|_| Error::InvalidValue(lexical.to_string()))?;
                crate::integer::encode_signed(writer, v, byte_aligned);
            }
            Self::Decimal => DecimalValue::parse(lexical)?.encode(writer, byte_aligned),
            Self::Double => FloatValue::parse(lexical)?.encode(writer, byte_aligned),
            Self::String => {
                // Strings laufen über die Werte-Tabelle, nie hierher
                crate::strings::encode_literal(writer, lexical);
            }
            Self::Binary(form) => {
                let octets = crate::binary::parse(lexical, form)?;
                crate::binary::encode(writer, &octets);
            }
            Self::DateTime(kind) => {
                crate::datetime::DateTimeValue::parse(lexical, kind)?.encode(writer, byte_aligned);
            }
        }
        Ok(())
    }

    /// Decodes the typed representation and renders its canonical lexical
    /// form.
    pub fn decode_typed(self, reader: &mut BitReader, byte_aligned: bool) -> Result<String> {
        Ok(match self {
            Self::Boolean => {
                if crate::boolean::decode(reader, byte_aligned)? {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            Self::NBitInteger { lower_bound, n_bits } => {
                let offset = crate::integer::decode_nbit(reader, n_bits, byte_aligned)?;
                let v = lower_bound
                    .checked_add(i64::try_from(offset).map_err(|_| Error::IntegerOverflow)?)
                    .ok_or(Error::IntegerOverflow)?;
                v.to_string()
            }
            Self::UnsignedInteger => crate::integer::decode_unsigned(reader)?.to_string(),
            Self::Integer => crate::integer::decode_signed(reader, byte_aligned)?.to_string(),
            Self::Decimal => DecimalValue::decode(reader, byte_aligned)?.to_lexical(),
            Self::Double => FloatValue::decode(reader, byte_aligned)?.to_lexical(),
            Self::String => crate::strings::decode_literal(reader)?,
            Self::Binary(form) => {
                let octets = crate::binary::decode(reader)?;
                crate::binary::to_lexical(&octets, form)
            }
            Self::DateTime(kind) => {
                crate::datetime::DateTimeValue::decode(reader, kind, byte_aligned)?.to_lexical()
            }
        })
    }

    /// Encodes the verbatim lexical form (lexical flavor).
    pub fn encode_lexical(self, writer: &mut BitWriter, lexical: &str, byte_aligned: bool) {
        crate::strings::encode_restricted(writer, lexical, self.lexical_category(), byte_aligned);
    }

    /// Decodes a lexical-flavor value.
    pub fn decode_lexical(self, reader: &mut BitReader, byte_aligned: bool) -> Result<String> {
        crate::strings::decode_restricted(reader, self.lexical_category(), byte_aligned)
    }
}

fn parse_boolean(lexical: &str) -> Result<bool> {
    match lexical.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::InvalidValue(lexical.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed_round_trip(dt: Datatype, lexical: &str) -> String {
        let mut w = BitWriter::new();
        dt.encode_typed(&mut w, lexical, false).unwrap();
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        dt.decode_typed(&mut r, false).unwrap()
    }

    #[test]
    fn boolean_forms() {
        assert_eq!(typed_round_trip(Datatype::Boolean, "true"), "true");
        assert_eq!(typed_round_trip(Datatype::Boolean, "1"), "true");
        assert_eq!(typed_round_trip(Datatype::Boolean, "0"), "false");
        assert!(Datatype::Boolean
            .encode_typed(&mut BitWriter::new(), "yes", false)
            .is_err());
    }

    #[test]
    fn nbit_integer_range() {
        let dt = Datatype::NBitInteger { lower_bound: -5, n_bits: 4 };
        assert_eq!(typed_round_trip(dt, "-5"), "-5");
        assert_eq!(typed_round_trip(dt, "10"), "10");
        // außerhalb [-5, 10]
        assert!(dt.encode_typed(&mut BitWriter::new(), "11", false).is_err());
        assert!(dt.encode_typed(&mut BitWriter::new(), "-6", false).is_err());
    }

    #[test]
    fn numeric_types() {
        assert_eq!(typed_round_trip(Datatype::UnsignedInteger, "12345"), "12345");
        assert_eq!(typed_round_trip(Datatype::Integer, "-42"), "-42");
        assert_eq!(typed_round_trip(Datatype::Decimal, "12.34"), "12.34");
        assert_eq!(typed_round_trip(Datatype::Double, "INF"), "INF");
    }

    #[test]
    fn datetime_and_binary() {
        assert_eq!(
            typed_round_trip(Datatype::DateTime(DateTimeKind::Date), "2026-08-30"),
            "2026-08-30"
        );
        assert_eq!(
            typed_round_trip(Datatype::Binary(BinaryForm::Hex), "0aff"),
            "0AFF"
        );
    }

    /// Ungültige Typwerte lassen den Stream unberührt.
    #[test]
    fn invalid_value_leaves_stream_untouched() {
        let mut w = BitWriter::new();
        w.write_bit(true);
        let before = w.bit_position();
        assert!(matches!(
            Datatype::UnsignedInteger.encode_typed(&mut w, "abc", false),
            Err(Error::InvalidValue(_))
        ));
        assert_eq!(w.bit_position(), before);
    }

    #[test]
    fn lexical_flavor_is_verbatim() {
        let dt = Datatype::Decimal;
        let mut w = BitWriter::new();
        dt.encode_lexical(&mut w, "380.00", false);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        // Die typisierte Form würde zu "380" normalisieren
        assert_eq!(dt.decode_lexical(&mut r, false).unwrap(), "380.00");
    }
}
