//! Binary encoding: octet count as an unsigned integer, then the raw octets.
//!
//! The lexical flavor distinguishes base64 and hex transport forms; the
//! typed wire shape is identical for both.

use crate::bitstream::{BitReader, BitWriter};
use crate::integer::{decode_unsigned, encode_unsigned};
use crate::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Lexical transport form of a binary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryForm {
    Base64,
    Hex,
}

pub fn encode(writer: &mut BitWriter, octets: &[u8]) {
    encode_unsigned(writer, octets.len() as u64);
    writer.write_bytes(octets);
}

pub fn decode(reader: &mut BitReader) -> Result<Vec<u8>> {
    let len = decode_unsigned(reader)?;
    let len = usize::try_from(len).map_err(|_| Error::IntegerOverflow)?;
    reader.read_bytes(len)
}

/// Parses the lexical form into octets.
pub fn parse(lexical: &str, form: BinaryForm) -> Result<Vec<u8>> {
    let s: String = lexical.split_whitespace().collect();
    match form {
        BinaryForm::Base64 => BASE64
            .decode(s.as_bytes())
            .map_err(|_| Error::InvalidValue(lexical.to_string())),
        BinaryForm::Hex => {
            if !s.is_ascii() || s.len() % 2 != 0 {
                return Err(Error::InvalidValue(lexical.to_string()));
            }
            (0..s.len())
                .step_by(2)
                .map(|i| {
                    u8::from_str_radix(&s[i..i + 2], 16)
                        .map_err(|_| Error::InvalidValue(lexical.to_string()))
                })
                .collect()
        }
    }
}

/// Renders octets in the canonical lexical form.
pub fn to_lexical(octets: &[u8], form: BinaryForm) -> String {
    match form {
        BinaryForm::Base64 => BASE64.encode(octets),
        BinaryForm::Hex => {
            let mut s = String::with_capacity(octets.len() * 2);
            for b in octets {
                s.push_str(&format!("{b:02X}"));
            }
            s
        }
    }
}
