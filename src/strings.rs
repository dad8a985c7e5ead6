//! String literal encoding and restricted character sets.
//!
//! A literal is a length-prefixed sequence of Unicode code points: the
//! character count as an unsigned integer, then each code point as an
//! unsigned integer. Table-integrated encodings add an offset to the length
//! prefix so small values can act as hit discriminators (see context.rs).
//!
//! Restricted character sets serve the lexical value flavor: each character
//! of a known broad category is coded as an n-bit index into the category's
//! character table, with one extra escape code point for characters outside
//! the set.

use crate::bit_width;
use crate::bitstream::{BitReader, BitWriter};
use crate::integer::{decode_unsigned, encode_unsigned};
use crate::{Error, Result};

/// Decode-Deckel gegen manipulierte Längen-Präfixe (in Codepoints).
pub const MAX_DECODED_CHARS: u32 = 16 * 1024 * 1024;

/// Encodes a literal string with the given length-prefix offset.
pub fn encode_literal_offset(writer: &mut BitWriter, value: &str, offset: u64) {
    let count = value.chars().count() as u64;
    encode_unsigned(writer, count + offset);
    encode_chars(writer, value);
}

/// Schreibt nur die Codepoints (Länge muss bereits geschrieben sein).
pub fn encode_chars(writer: &mut BitWriter, value: &str) {
    for ch in value.chars() {
        encode_unsigned(writer, u64::from(u32::from(ch)));
    }
}

/// Encodes a plain literal string (offset 0).
pub fn encode_literal(writer: &mut BitWriter, value: &str) {
    encode_literal_offset(writer, value, 0);
}

/// Decodes `len` code points into a `String`.
pub fn decode_chars(reader: &mut BitReader, len: u64) -> Result<String> {
    if len > u64::from(MAX_DECODED_CHARS) {
        return Err(Error::StringLengthExceeded { length: len, max: MAX_DECODED_CHARS });
    }
    let mut s = String::with_capacity(len as usize);
    for _ in 0..len {
        let cp = decode_unsigned(reader)?;
        let ch = u32::try_from(cp)
            .ok()
            .and_then(char::from_u32)
            .ok_or(Error::InvalidCodePoint(cp))?;
        s.push(ch);
    }
    Ok(s)
}

/// Decodes a plain literal string (length prefix + code points).
pub fn decode_literal(reader: &mut BitReader) -> Result<String> {
    let len = decode_unsigned(reader)?;
    decode_chars(reader, len)
}

/// Broad lexical categories for the restricted-character-set flavor.
///
/// The String category deliberately has no restricted set: plain strings
/// keep the value-table path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalCategory {
    Boolean,
    Decimal,
    Double,
    Integer,
    DateTime,
    Binary,
    String,
}

impl LexicalCategory {
    /// The restricted character table of this category, sorted by code
    /// point, or `None` for the String category.
    pub fn charset(self) -> Option<&'static [char]> {
        match self {
            Self::Boolean => Some(&[
                '\t', '\n', '\r', ' ', '0', '1', 'a', 'e', 'f', 'l', 'r', 's', 't', 'u',
            ]),
            Self::Decimal => Some(&[
                '\t', '\n', '\r', ' ', '+', '-', '.', '0', '1', '2', '3', '4', '5', '6',
                '7', '8', '9',
            ]),
            Self::Double => Some(&[
                '\t', '\n', '\r', ' ', '+', '-', '.', '0', '1', '2', '3', '4', '5', '6',
                '7', '8', '9', 'E', 'F', 'I', 'N', 'a', 'e',
            ]),
            Self::Integer => Some(&[
                '\t', '\n', '\r', ' ', '+', '-', '0', '1', '2', '3', '4', '5', '6', '7',
                '8', '9',
            ]),
            Self::DateTime => Some(&[
                '\t', '\n', '\r', ' ', '+', '-', '.', '0', '1', '2', '3', '4', '5', '6',
                '7', '8', '9', ':', 'T', 'Z',
            ]),
            Self::Binary => {
                const BINARY: &[char] = &[
                    '\t', '\n', '\r', ' ', '+', '/', '0', '1', '2', '3', '4', '5', '6',
                    '7', '8', '9', '=', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I',
                    'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V',
                    'W', 'X', 'Y', 'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
                    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v',
                    'w', 'x', 'y', 'z',
                ];
                Some(BINARY)
            }
            Self::String => None,
        }
    }
}

/// Encodes a string through the restricted character set of `category`.
///
/// Length prefix as unsigned integer, then per character: the character's
/// index in the set as an n-bit value with `n = ceil(log2(N + 1))`, or the
/// escape code `N` followed by the full code point as an unsigned integer.
/// Falls back to the plain literal encoding for the String category.
pub fn encode_restricted(
    writer: &mut BitWriter,
    value: &str,
    category: LexicalCategory,
    byte_aligned: bool,
) {
    let Some(set) = category.charset() else {
        encode_literal(writer, value);
        return;
    };
    let n = bit_width::for_count(set.len() + 1);
    encode_unsigned(writer, value.chars().count() as u64);
    for ch in value.chars() {
        match set.binary_search(&ch) {
            Ok(idx) => crate::integer::encode_nbit(writer, idx as u64, n, byte_aligned),
            Err(_) => {
                crate::integer::encode_nbit(writer, set.len() as u64, n, byte_aligned);
                encode_unsigned(writer, u64::from(u32::from(ch)));
            }
        }
    }
}

/// Decodes a restricted-character-set string (mirror of
/// [`encode_restricted`]).
pub fn decode_restricted(
    reader: &mut BitReader,
    category: LexicalCategory,
    byte_aligned: bool,
) -> Result<String> {
    let Some(set) = category.charset() else {
        return decode_literal(reader);
    };
    let n = bit_width::for_count(set.len() + 1);
    let len = decode_unsigned(reader)?;
    if len > u64::from(MAX_DECODED_CHARS) {
        return Err(Error::StringLengthExceeded { length: len, max: MAX_DECODED_CHARS });
    }
    let mut s = String::with_capacity(len as usize);
    for _ in 0..len {
        let idx = crate::integer::decode_nbit(reader, n, byte_aligned)?;
        if (idx as usize) < set.len() {
            s.push(set[idx as usize]);
        } else if idx as usize == set.len() {
            let cp = decode_unsigned(reader)?;
            let ch = u32::try_from(cp)
                .ok()
                .and_then(char::from_u32)
                .ok_or(Error::InvalidCodePoint(cp))?;
            s.push(ch);
        } else {
            return Err(Error::corrupt(
                reader.bit_position(),
                "restricted character index out of range",
            ));
        }
    }
    Ok(s)
}
