//! Codec options.
//!
//! The option set controls alignment, compression, fidelity (preserve
//! flags), strictness and the table limits. Options are negotiated out of
//! band or carried in the stream header; encoder and decoder must agree on
//! every field, otherwise the streams diverge silently.

use std::rc::Rc;

use crate::{Error, Result};

/// Stream alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    /// Bit-dense packing, the default.
    #[default]
    BitPacked,
    /// Every value starts on a byte boundary.
    ByteAligned,
    /// Channel layout like compression, but without the deflate stage.
    PreCompression,
}

/// Fidelity options. Off by default; each enabled flag widens the event
/// code space of the affected grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preserve {
    pub comments: bool,
    pub pis: bool,
    pub dtd: bool,
    pub prefixes: bool,
    /// Werte werden lexikalisch statt typisiert codiert.
    pub lexical_values: bool,
}

impl Preserve {
    pub const ALL: Self = Self {
        comments: true,
        pis: true,
        dtd: true,
        prefixes: true,
        lexical_values: true,
    };
}

/// The full option set of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    pub alignment: Alignment,
    pub compression: bool,
    /// Strict schema mode: no built-in extensibility, minimal event codes.
    pub strict: bool,
    pub preserve: Preserve,
    pub self_contained: bool,
    /// Werte pro Block im (Pre-)Compression-Modus.
    pub block_size: u32,
    /// Längste Zeichenkette, die in die Werte-Tabelle aufgenommen wird.
    pub value_max_length: Option<u32>,
    /// Obergrenze der globalen Werte-Partition.
    pub value_partition_capacity: Option<u32>,
    /// Obergrenze der selbstlernenden Element-Grammatiken.
    pub max_builtin_element_grammars: Option<u32>,
    /// Obergrenze gelernter Produktionen pro Grammatik-Regel.
    pub max_builtin_productions: Option<u32>,
}

pub const DEFAULT_BLOCK_SIZE: u32 = 1_000_000;

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            alignment: Alignment::BitPacked,
            compression: false,
            strict: false,
            preserve: Preserve::default(),
            self_contained: false,
            block_size: DEFAULT_BLOCK_SIZE,
            value_max_length: None,
            value_partition_capacity: None,
            max_builtin_element_grammars: None,
            max_builtin_productions: None,
        }
    }
}

impl CodecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_compression(mut self) -> Self {
        self.compression = true;
        self
    }

    pub fn with_strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn with_preserve(mut self, preserve: Preserve) -> Self {
        self.preserve = preserve;
        self
    }

    pub fn with_self_contained(mut self) -> Self {
        self.self_contained = true;
        self
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_value_max_length(mut self, max: u32) -> Self {
        self.value_max_length = Some(max);
        self
    }

    pub fn with_value_partition_capacity(mut self, cap: u32) -> Self {
        self.value_partition_capacity = Some(cap);
        self
    }

    pub fn with_max_builtin_element_grammars(mut self, max: u32) -> Self {
        self.max_builtin_element_grammars = Some(max);
        self
    }

    pub fn with_max_builtin_productions(mut self, max: u32) -> Self {
        self.max_builtin_productions = Some(max);
        self
    }

    /// Checks the cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.compression && self.alignment != Alignment::BitPacked {
            return Err(Error::InvalidOptionCombination(
                "compression fixes the alignment, do not set both".into(),
            ));
        }
        if self.strict {
            let p = self.preserve;
            if p.comments || p.pis || p.dtd || p.prefixes {
                return Err(Error::InvalidOptionCombination(
                    "strict mode only allows preserve.lexical_values".into(),
                ));
            }
            if self.self_contained {
                return Err(Error::InvalidOptionCombination(
                    "self-contained fragments are not allowed in strict mode".into(),
                ));
            }
        }
        if self.self_contained && (self.compression || self.alignment == Alignment::PreCompression)
        {
            return Err(Error::InvalidOptionCombination(
                "self-contained fragments cannot be combined with (pre-)compression".into(),
            ));
        }
        if (self.compression || self.alignment == Alignment::PreCompression)
            && self.block_size == 0
        {
            return Err(Error::InvalidBlockSize);
        }
        Ok(())
    }

    /// True when values are written on byte boundaries (byte-aligned and
    /// (pre-)compression modes).
    pub fn byte_oriented(&self) -> bool {
        self.compression || self.alignment != Alignment::BitPacked
    }

    /// True when the channel layer is active.
    pub fn channelised(&self) -> bool {
        self.compression || self.alignment == Alignment::PreCompression
    }

    /// True when a value of this length may enter the value table.
    pub fn value_cacheable(&self, value: &Rc<str>) -> bool {
        match self.value_max_length {
            Some(max) => value.chars().count() as u64 <= u64::from(max),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = CodecOptions::default();
        assert_eq!(o.alignment, Alignment::BitPacked);
        assert!(!o.compression);
        assert!(!o.strict);
        assert_eq!(o.block_size, DEFAULT_BLOCK_SIZE);
        assert!(o.validate().is_ok());
        assert!(!o.byte_oriented());
    }

    #[test]
    fn compression_fixes_alignment() {
        let o = CodecOptions::new()
            .with_compression()
            .with_alignment(Alignment::ByteAligned);
        assert!(matches!(
            o.validate().unwrap_err(),
            Error::InvalidOptionCombination(_)
        ));
        let o = CodecOptions::new().with_compression();
        assert!(o.validate().is_ok());
        assert!(o.byte_oriented());
        assert!(o.channelised());
    }

    #[test]
    fn strict_limits_preserve() {
        let o = CodecOptions::new().with_strict().with_preserve(Preserve {
            comments: true,
            ..Preserve::default()
        });
        assert!(o.validate().is_err());

        // lexical_values ist auch strikt erlaubt
        let o = CodecOptions::new().with_strict().with_preserve(Preserve {
            lexical_values: true,
            ..Preserve::default()
        });
        assert!(o.validate().is_ok());
    }

    #[test]
    fn self_contained_constraints() {
        assert!(CodecOptions::new()
            .with_strict()
            .with_self_contained()
            .validate()
            .is_err());
        assert!(CodecOptions::new()
            .with_compression()
            .with_self_contained()
            .validate()
            .is_err());
        assert!(CodecOptions::new().with_self_contained().validate().is_ok());
    }

    #[test]
    fn block_size_zero_rejected() {
        let o = CodecOptions::new().with_compression().with_block_size(0);
        assert_eq!(o.validate().unwrap_err(), Error::InvalidBlockSize);
        // Ohne Kanal-Schicht ist block_size bedeutungslos
        let o = CodecOptions::new().with_block_size(0);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn value_max_length_counts_chars() {
        let o = CodecOptions::new().with_value_max_length(3);
        assert!(o.value_cacheable(&Rc::from("abc")));
        assert!(!o.value_cacheable(&Rc::from("abcd")));
        assert!(o.value_cacheable(&Rc::from("äöü")));
    }
}
