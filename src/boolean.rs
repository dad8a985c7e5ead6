//! Boolean encoding.
//!
//! Bit-packed alignment uses a single bit; byte-oriented modes (byte-aligned
//! and (pre-)compression) use one full octet with value 0 or 1.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result};

/// Encodes a boolean value.
#[inline]
pub fn encode(writer: &mut BitWriter, value: bool, byte_aligned: bool) {
    if byte_aligned {
        writer.write_byte(u8::from(value));
    } else {
        writer.write_bit(value);
    }
}

/// Decodes a boolean value. In byte-oriented mode any octet other than 0 or 1
/// is a corrupt-stream condition.
#[inline]
pub fn decode(reader: &mut BitReader, byte_aligned: bool) -> Result<bool> {
    if byte_aligned {
        match reader.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::corrupt(
                reader.bit_position(),
                format!("boolean octet must be 0 or 1, got {other}"),
            )),
        }
    } else {
        reader.read_bit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_packed_roundtrip() {
        let mut w = BitWriter::new();
        encode(&mut w, true, false);
        encode(&mut w, false, false);
        assert_eq!(w.bit_position(), 2);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        assert!(decode(&mut r, false).unwrap());
        assert!(!decode(&mut r, false).unwrap());
    }

    #[test]
    fn byte_aligned_roundtrip() {
        let mut w = BitWriter::new();
        encode(&mut w, true, true);
        encode(&mut w, false, true);
        let data = w.into_vec();
        assert_eq!(data, vec![1, 0]);
        let mut r = BitReader::new(&data);
        assert!(decode(&mut r, true).unwrap());
        assert!(!decode(&mut r, true).unwrap());
    }

    /// Byte-aligned: Oktett > 1 ist korrupt.
    #[test]
    fn byte_aligned_rejects_garbage() {
        let mut r = BitReader::new(&[7]);
        assert!(matches!(
            decode(&mut r, true).unwrap_err(),
            Error::CorruptStream { .. }
        ));
    }
}
