//! Bit-level stream primitives, MSB first.
//!
//! The codec packs event codes and content either bit-dense (bit-packed
//! alignment) or on byte boundaries (byte-aligned and (pre-)compression
//! modes). Both reader and writer expose their current bit position so that
//! decode errors can report the offset where they were detected.

use crate::{Error, Result};

/// Writes individual bits into a growable byte buffer, MSB first.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    /// Partielles letztes Byte (linksbündig, obere `pending_bits` Bits gültig).
    pending: u8,
    pending_bits: u8,
}

impl BitWriter {
    /// Creates a new empty `BitWriter`.
    pub fn new() -> Self {
        Self { buf: Vec::new(), pending: 0, pending_bits: 0 }
    }

    /// Writes a single bit. `true` = 1, `false` = 0.
    #[inline]
    pub fn write_bit(&mut self, val: bool) {
        self.pending |= u8::from(val) << (7 - self.pending_bits);
        self.pending_bits += 1;
        if self.pending_bits == 8 {
            self.buf.push(self.pending);
            self.pending = 0;
            self.pending_bits = 0;
        }
    }

    /// Writes the lower `n` bits of `val`, MSB first. `n = 0` is a no-op
    /// (zero-width event code parts).
    ///
    /// # Panics
    ///
    /// Panics if `n > 64` or `val` does not fit in `n` bits.
    pub fn write_bits(&mut self, val: u64, n: u8) {
        assert!(n <= 64, "bit count must be 0..=64, got {n}");
        assert!(
            n == 64 || val < (1u64 << n),
            "value {val} does not fit in {n} bits"
        );
        let mut remaining = n;
        while remaining > 0 {
            let free = 8 - self.pending_bits;
            let take = free.min(remaining);
            // take <= 8, daher sind die Shifts hier nie >= 64
            let chunk = (val >> (remaining - take)) & ((1u64 << take) - 1);
            self.pending |= (chunk as u8) << (free - take);
            self.pending_bits += take;
            remaining -= take;
            if self.pending_bits == 8 {
                self.buf.push(self.pending);
                self.pending = 0;
                self.pending_bits = 0;
            }
        }
    }

    /// Pads with zero bits until the position is byte-aligned. No-op if
    /// already aligned.
    pub fn align_to_byte(&mut self) {
        if self.pending_bits > 0 {
            self.buf.push(self.pending);
            self.pending = 0;
            self.pending_bits = 0;
        }
    }

    /// Writes a single byte. Fast path when already byte-aligned.
    #[inline]
    pub fn write_byte(&mut self, val: u8) {
        if self.pending_bits == 0 {
            self.buf.push(val);
        } else {
            self.write_bits(u64::from(val), 8);
        }
    }

    /// Schreibt ein Byte-Slice (aligned: `extend_from_slice`, sonst bitweise).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.pending_bits == 0 {
            self.buf.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u64::from(b), 8);
            }
        }
    }

    /// Number of bits written so far.
    pub fn bit_position(&self) -> u64 {
        self.buf.len() as u64 * 8 + u64::from(self.pending_bits)
    }

    /// True when nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.pending_bits == 0
    }

    /// Finalises the writer, padding the last byte with zero bits.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.buf
    }
}

/// Reads individual bits from a byte slice, MSB first.
#[derive(Debug, Clone, Copy)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Absolute Bit-Position (0-basiert) im Slice.
    pos: u64,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` over the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current bit position (bits consumed so far).
    pub fn bit_position(&self) -> u64 {
        self.pos
    }

    /// Remaining whole bits in the stream.
    pub fn bits_remaining(&self) -> u64 {
        (self.data.len() as u64 * 8).saturating_sub(self.pos)
    }

    /// Reads a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = (self.pos / 8) as usize;
        if byte >= self.data.len() {
            return Err(Error::PrematureEndOfStream);
        }
        let shift = 7 - (self.pos % 8) as u8;
        self.pos += 1;
        Ok((self.data[byte] >> shift) & 1 == 1)
    }

    /// Reads `n` bits and returns them as a `u64`, MSB first. `n = 0`
    /// returns 0 without consuming anything.
    ///
    /// # Panics
    ///
    /// Panics if `n > 64`.
    pub fn read_bits(&mut self, n: u8) -> Result<u64> {
        assert!(n <= 64, "bit count must be 0..=64, got {n}");
        if u64::from(n) > self.bits_remaining() {
            return Err(Error::PrematureEndOfStream);
        }
        let mut result = 0u64;
        let mut remaining = n;
        while remaining > 0 {
            let byte = (self.pos / 8) as usize;
            let offset = (self.pos % 8) as u8;
            let avail = 8 - offset;
            let take = avail.min(remaining);
            let chunk = (self.data[byte] >> (avail - take)) & ((1u16 << take) - 1) as u8;
            result = (result << take) | u64::from(chunk);
            self.pos += u64::from(take);
            remaining -= take;
        }
        Ok(result)
    }

    /// Discards bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        let rem = self.pos % 8;
        if rem != 0 {
            self.pos += 8 - rem;
        }
    }

    /// Reads a single byte. Fast path when byte-aligned.
    #[inline]
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.pos % 8 == 0 {
            let byte = (self.pos / 8) as usize;
            if byte >= self.data.len() {
                return Err(Error::PrematureEndOfStream);
            }
            self.pos += 8;
            Ok(self.data[byte])
        } else {
            Ok(self.read_bits(8)? as u8)
        }
    }

    /// Liest `n` Bytes als Vec (bitweise falls nicht aligned).
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.pos % 8 == 0 {
            let start = (self.pos / 8) as usize;
            let end = start.checked_add(n).ok_or(Error::IntegerOverflow)?;
            if end > self.data.len() {
                return Err(Error::PrematureEndOfStream);
            }
            self.pos += n as u64 * 8;
            Ok(self.data[start..end].to_vec())
        } else {
            (0..n).map(|_| self.read_byte()).collect()
        }
    }

    /// Byte-Offset des nächsten ungelesenen aligned Bytes.
    pub fn byte_position(&self) -> usize {
        ((self.pos + 7) / 8) as usize
    }

    /// Restliche Bytes ab der aktuellen (aufgerundeten) Byte-Position.
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.byte_position().min(self.data.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bits_roundtrip() {
        let mut w = BitWriter::new();
        for &b in &[true, false, true, true, false, false, true, false, true] {
            w.write_bit(b);
        }
        let data = w.into_vec();
        assert_eq!(data.len(), 2);

        let mut r = BitReader::new(&data);
        for &b in &[true, false, true, true, false, false, true, false, true] {
            assert_eq!(r.read_bit().unwrap(), b);
        }
    }

    #[test]
    fn msb_first_packing() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3);
        w.write_bits(0b11010, 5);
        let data = w.into_vec();
        assert_eq!(data, vec![0b1011_1010]);
    }

    #[test]
    fn cross_byte_boundary() {
        let mut w = BitWriter::new();
        w.write_bits(0x1FF, 9);
        w.write_bits(0x00, 7);
        let data = w.into_vec();
        assert_eq!(data, vec![0xFF, 0x80]);

        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(9).unwrap(), 0x1FF);
        assert_eq!(r.read_bits(7).unwrap(), 0);
    }

    #[test]
    fn zero_width_is_noop() {
        let mut w = BitWriter::new();
        w.write_bits(0, 0);
        assert_eq!(w.bit_position(), 0);
        let data = w.into_vec();
        assert!(data.is_empty());

        let mut r = BitReader::new(&[]);
        assert_eq!(r.read_bits(0).unwrap(), 0);
    }

    #[test]
    fn sixty_four_bit_roundtrip() {
        let mut w = BitWriter::new();
        w.write_bit(true); // unalign erst
        w.write_bits(u64::MAX, 64);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        assert!(r.read_bit().unwrap());
        assert_eq!(r.read_bits(64).unwrap(), u64::MAX);
    }

    #[test]
    fn align_pads_with_zero_bits() {
        let mut w = BitWriter::new();
        w.write_bits(0b11, 2);
        w.align_to_byte();
        w.write_byte(0xAB);
        let data = w.into_vec();
        assert_eq!(data, vec![0b1100_0000, 0xAB]);

        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(2).unwrap(), 0b11);
        r.align_to_byte();
        assert_eq!(r.read_byte().unwrap(), 0xAB);
    }

    #[test]
    fn premature_end_detected() {
        let mut r = BitReader::new(&[0xFF]);
        assert_eq!(r.read_bits(9).unwrap_err(), Error::PrematureEndOfStream);
        // Position bleibt unverändert bei Fehler
        assert_eq!(r.bit_position(), 0);
    }

    #[test]
    fn bit_position_tracking() {
        let mut w = BitWriter::new();
        w.write_bits(0b10, 2);
        assert_eq!(w.bit_position(), 2);
        w.write_byte(0x01);
        assert_eq!(w.bit_position(), 10);

        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        r.read_bits(2).unwrap();
        assert_eq!(r.bit_position(), 2);
    }

    #[test]
    fn read_bytes_aligned_and_unaligned() {
        let mut w = BitWriter::new();
        w.write_bytes(&[1, 2, 3]);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bytes(3).unwrap(), vec![1, 2, 3]);

        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bytes(&[0xAA, 0x55]);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        r.read_bit().unwrap();
        assert_eq!(r.read_bytes(2).unwrap(), vec![0xAA, 0x55]);
    }
}
