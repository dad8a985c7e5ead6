//! Integer encodings: n-bit unsigned, 7-bit-block varint, signed integer.
//!
//! - n-bit unsigned: exactly `n` bits in bit-packed mode, the minimal number
//!   of whole octets in byte-oriented modes. Used for event codes, compact
//!   identifiers and bounded-range ("NBit") schema integers.
//! - unsigned integer: variable-length 7-bit blocks, least significant group
//!   first, continuation bit in the MSB of every non-final octet.
//! - signed integer: sign boolean followed by the unsigned magnitude, where
//!   a negative value `v` stores `(-v) - 1`.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result};

/// Encodes an unsigned integer using exactly `n` bits (bit-packed) or
/// `ceil(n/8)` octets LSB-octet-first (byte-oriented).
///
/// # Panics
///
/// Panics if `n > 64` or `value` does not fit in `n` bits.
pub fn encode_nbit(writer: &mut BitWriter, value: u64, n: u8, byte_aligned: bool) {
    assert!(n <= 64, "bit width must be 0..=64, got {n}");
    assert!(
        n == 64 || value < (1u64 << n),
        "value {value} does not fit in {n} bits"
    );
    if byte_aligned {
        let mut v = value;
        for _ in 0..n.div_ceil(8) {
            writer.write_byte((v & 0xFF) as u8);
            v >>= 8;
        }
    } else {
        writer.write_bits(value, n);
    }
}

/// Decodes an n-bit unsigned integer (mirror of [`encode_nbit`]).
pub fn decode_nbit(reader: &mut BitReader, n: u8, byte_aligned: bool) -> Result<u64> {
    assert!(n <= 64, "bit width must be 0..=64, got {n}");
    if byte_aligned {
        let mut result = 0u64;
        for i in 0..n.div_ceil(8) {
            result |= u64::from(reader.read_byte()?) << (8 * i);
        }
        Ok(result)
    } else {
        reader.read_bits(n)
    }
}

/// Encodes a `u64` as a variable-length unsigned integer.
pub fn encode_unsigned(writer: &mut BitWriter, value: u64) {
    let mut v = value;
    loop {
        let low7 = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            writer.write_byte(low7);
            return;
        }
        writer.write_byte(0x80 | low7);
    }
}

/// Decodes a variable-length unsigned integer.
pub fn decode_unsigned(reader: &mut BitReader) -> Result<u64> {
    let mut result = 0u64;
    let mut shift: u32 = 0;
    loop {
        let byte = reader.read_byte()?;
        let data = u64::from(byte & 0x7F);
        // Ab shift 63 ist nur noch Daten-Bit 0 gültig und keine Fortsetzung.
        if shift == 63 && (data > 1 || byte & 0x80 != 0) {
            return Err(Error::IntegerOverflow);
        }
        if shift > 63 {
            return Err(Error::IntegerOverflow);
        }
        result |= data << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Encodes a signed integer as sign + unsigned magnitude.
pub fn encode_signed(writer: &mut BitWriter, value: i64, byte_aligned: bool) {
    if value < 0 {
        crate::boolean::encode(writer, true, byte_aligned);
        // -v - 1 vermeidet Overflow bei i64::MIN
        encode_unsigned(writer, !(value as u64));
    } else {
        crate::boolean::encode(writer, false, byte_aligned);
        encode_unsigned(writer, value as u64);
    }
}

/// Decodes a signed integer (mirror of [`encode_signed`]).
pub fn decode_signed(reader: &mut BitReader, byte_aligned: bool) -> Result<i64> {
    let negative = crate::boolean::decode(reader, byte_aligned)?;
    let magnitude = decode_unsigned(reader)?;
    if negative {
        if magnitude > i64::MAX as u64 {
            return Err(Error::IntegerOverflow);
        }
        Ok(-(magnitude as i64) - 1)
    } else {
        if magnitude > i64::MAX as u64 {
            return Err(Error::IntegerOverflow);
        }
        Ok(magnitude as i64)
    }
}
