//! Stream header: optional cookie, distinguishing bits, version, options.
//!
//! Layout: optional 4-byte cookie `$EXI`, the two distinguishing bits `10`,
//! one options-presence bit, the format version (preview bit plus additive
//! 4-bit chunks, chunk 15 continues), then the options block if present.
//! The header is padded to a byte boundary before the body starts.

use crate::bitstream::{BitReader, BitWriter};
use crate::integer::{decode_unsigned, encode_unsigned};
use crate::options::{Alignment, CodecOptions, DEFAULT_BLOCK_SIZE};
use crate::{Error, Result};

const COOKIE: &[u8; 4] = b"$EXI";
const VERSION: u64 = 1;

pub fn write_header(writer: &mut BitWriter, options: &CodecOptions, with_cookie: bool) {
    if with_cookie {
        writer.write_bytes(COOKIE);
    }
    writer.write_bits(0b10, 2);
    writer.write_bit(true); // Optionen folgen immer im Header
    write_version(writer, VERSION);
    write_options(writer, options);
    writer.align_to_byte();
}

pub fn read_header(reader: &mut BitReader) -> Result<CodecOptions> {
    // Cookie ist optional; die Unterscheidungsbits einer Cookie-losen
    // Datei können nie mit '$' beginnen (0b00100100)
    if reader.remaining_bytes().starts_with(COOKIE) {
        let cookie = reader.read_bytes(4)?;
        debug_assert_eq!(&cookie, COOKIE);
    }
    if reader.read_bits(2)? != 0b10 {
        return Err(Error::MalformedHeader);
    }
    let has_options = reader.read_bit()?;
    let version = read_version(reader)?;
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let options = if has_options {
        read_options(reader)?
    } else {
        CodecOptions::default()
    };
    reader.align_to_byte();
    Ok(options)
}

fn write_version(writer: &mut BitWriter, version: u64) {
    writer.write_bit(false); // kein Preview-Format
    let mut rest = version - 1;
    while rest >= 15 {
        writer.write_bits(15, 4);
        rest -= 15;
    }
    writer.write_bits(rest, 4);
}

fn read_version(reader: &mut BitReader) -> Result<u64> {
    if reader.read_bit()? {
        // Preview-Versionen sind per Definition inkompatibel
        return Err(Error::UnsupportedVersion(0));
    }
    let mut version = 1u64;
    loop {
        let chunk = reader.read_bits(4)?;
        version = version.checked_add(chunk).ok_or(Error::IntegerOverflow)?;
        if chunk != 15 {
            return Ok(version);
        }
    }
}

fn write_options(writer: &mut BitWriter, o: &CodecOptions) {
    let alignment = match o.alignment {
        Alignment::BitPacked => 0,
        Alignment::ByteAligned => 1,
        Alignment::PreCompression => 2,
    };
    writer.write_bits(alignment, 2);
    writer.write_bit(o.compression);
    writer.write_bit(o.strict);
    writer.write_bit(o.self_contained);
    writer.write_bit(o.preserve.comments);
    writer.write_bit(o.preserve.pis);
    writer.write_bit(o.preserve.dtd);
    writer.write_bit(o.preserve.prefixes);
    writer.write_bit(o.preserve.lexical_values);
    write_optional(writer, (o.block_size != DEFAULT_BLOCK_SIZE).then_some(o.block_size));
    write_optional(writer, o.value_max_length);
    write_optional(writer, o.value_partition_capacity);
    write_optional(writer, o.max_builtin_element_grammars);
    write_optional(writer, o.max_builtin_productions);
}

fn read_options(reader: &mut BitReader) -> Result<CodecOptions> {
    let mut o = CodecOptions::default();
    o.alignment = match reader.read_bits(2)? {
        0 => Alignment::BitPacked,
        1 => Alignment::ByteAligned,
        2 => Alignment::PreCompression,
        other => {
            return Err(Error::corrupt(
                reader.bit_position(),
                format!("unknown alignment code {other}"),
            ));
        }
    };
    o.compression = reader.read_bit()?;
    o.strict = reader.read_bit()?;
    o.self_contained = reader.read_bit()?;
    o.preserve.comments = reader.read_bit()?;
    o.preserve.pis = reader.read_bit()?;
    o.preserve.dtd = reader.read_bit()?;
    o.preserve.prefixes = reader.read_bit()?;
    o.preserve.lexical_values = reader.read_bit()?;
    if let Some(block_size) = read_optional(reader)? {
        o.block_size = block_size;
    }
    o.value_max_length = read_optional(reader)?;
    o.value_partition_capacity = read_optional(reader)?;
    o.max_builtin_element_grammars = read_optional(reader)?;
    o.max_builtin_productions = read_optional(reader)?;
    o.validate()?;
    Ok(o)
}

fn write_optional(writer: &mut BitWriter, value: Option<u32>) {
    match value {
        Some(v) => {
            writer.write_bit(true);
            encode_unsigned(writer, u64::from(v));
        }
        None => writer.write_bit(false),
    }
}

fn read_optional(reader: &mut BitReader) -> Result<Option<u32>> {
    if !reader.read_bit()? {
        return Ok(None);
    }
    let v = decode_unsigned(reader)?;
    u32::try_from(v).map(Some).map_err(|_| Error::IntegerOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Preserve;

    fn round_trip(o: &CodecOptions, with_cookie: bool) -> CodecOptions {
        let mut w = BitWriter::new();
        write_header(&mut w, o, with_cookie);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        let back = read_header(&mut r).unwrap();
        assert_eq!(r.bit_position() % 8, 0);
        back
    }

    #[test]
    fn default_options() {
        let o = CodecOptions::default();
        assert_eq!(round_trip(&o, false), o);
        assert_eq!(round_trip(&o, true), o);
    }

    #[test]
    fn full_option_set() {
        let o = CodecOptions::new()
            .with_alignment(Alignment::PreCompression)
            .with_preserve(Preserve { comments: true, lexical_values: true, ..Default::default() })
            .with_block_size(512)
            .with_value_max_length(64)
            .with_value_partition_capacity(1000)
            .with_max_builtin_element_grammars(16)
            .with_max_builtin_productions(8);
        assert_eq!(round_trip(&o, true), o);
    }

    #[test]
    fn compression_option() {
        let o = CodecOptions::new().with_compression();
        assert_eq!(round_trip(&o, false), o);
    }

    #[test]
    fn bad_distinguishing_bits() {
        let mut r = BitReader::new(&[0x00]);
        assert_eq!(read_header(&mut r).unwrap_err(), Error::MalformedHeader);
    }

    #[test]
    fn preview_version_rejected() {
        let mut w = BitWriter::new();
        w.write_bits(0b10, 2);
        w.write_bit(false);
        w.write_bit(true); // Preview-Bit
        w.write_bits(0, 4);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        assert!(matches!(
            read_header(&mut r).unwrap_err(),
            Error::UnsupportedVersion(_)
        ));
    }

    #[test]
    fn future_version_rejected() {
        let mut w = BitWriter::new();
        w.write_bits(0b10, 2);
        w.write_bit(false);
        write_version(&mut w, 17);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        assert_eq!(read_header(&mut r).unwrap_err(), Error::UnsupportedVersion(17));
    }

    /// Header ohne Optionsblock fällt auf die Defaults zurück.
    #[test]
    fn missing_options_block() {
        let mut w = BitWriter::new();
        w.write_bits(0b10, 2);
        w.write_bit(false);
        write_version(&mut w, 1);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        assert_eq!(read_header(&mut r).unwrap(), CodecOptions::default());
    }
}
