//! Central error types for the codec core.
//!
//! Three families (see also the taxonomy in DESIGN.md):
//! - corrupt-stream errors (decode only) — fatal for the current document,
//!   carry the bit offset where the condition was detected,
//! - grammar-construction errors — programmer/schema-compiler errors,
//!   surfaced before any document is processed,
//! - value errors — recoverable locally via the string fallback productions.

use core::fmt;
use std::borrow::Cow;

/// All error conditions of the codec core.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The stream ended before a complete item was decoded.
    PrematureEndOfStream,
    /// The stream header is malformed (bad distinguishing bits or cookie).
    MalformedHeader,
    /// The stream version is not supported by this implementation.
    UnsupportedVersion(u64),
    /// A decoded event code does not match any production in the current
    /// grammar. Fatal corrupt-stream condition.
    InvalidEventCode {
        /// Bit offset in the structure stream where the code was read.
        bit_offset: u64,
        /// Der gelesene Code (als Dezimalzahl formatiert).
        code: u64,
        /// Der Grammar-Zustand in dem der Fehler auftrat.
        grammar_state: Cow<'static, str>,
    },
    /// A compact identifier exceeds the current size of its table partition.
    /// Fatal corrupt-stream condition.
    InvalidCompactId {
        /// Bit offset where the identifier was read.
        bit_offset: u64,
        /// Partition name (uri, local-name, prefix, global-value, local-value).
        partition: &'static str,
        /// Der gelesene Identifier.
        id: u64,
        /// Aktuelle Partitionsgröße.
        size: u64,
    },
    /// Catch-all corrupt-stream condition with bit offset and detail.
    CorruptStream {
        bit_offset: u64,
        detail: Cow<'static, str>,
    },
    /// Two productions with the same event but different right-hand sides
    /// were added to one grammar ("indistinguishable production").
    /// Grammar-construction error, never a runtime document error.
    ConflictingProduction {
        grammar: usize,
        event: Cow<'static, str>,
    },
    /// A grammar index is outside the arena. Internal invariant violation.
    UnknownGrammar(usize),
    /// An event was pushed that no production of the current grammar state
    /// accepts (encoder misuse, or strict mode forbidding the fallback).
    UnexpectedEvent {
        event: &'static str,
        grammar_state: Cow<'static, str>,
    },
    /// An invalid combination of codec options was specified.
    InvalidOptionCombination(Cow<'static, str>),
    /// Block size must be greater than zero.
    InvalidBlockSize,
    /// A lexical value failed validation against its declared datatype.
    /// Recoverable: callers fall back to the string representation where the
    /// fidelity configuration permits it.
    InvalidValue(String),
    /// A decoded length prefix exceeds the hard decode cap
    /// ([`crate::strings::MAX_DECODED_CHARS`]). Fatal corrupt-stream
    /// condition.
    StringLengthExceeded { length: u64, max: u32 },
    /// An integer value exceeds the representable range.
    IntegerOverflow,
    /// A Unicode code point is invalid: surrogate or > U+10FFFF.
    InvalidCodePoint(u64),
    /// DEFLATE compression failed (RFC 1951).
    CompressionError(String),
    /// DEFLATE decompression failed (RFC 1951).
    DecompressionError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrematureEndOfStream => write!(f, "premature end of stream"),
            Self::MalformedHeader => write!(f, "malformed stream header"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported stream version {v}"),
            Self::InvalidEventCode { bit_offset, code, grammar_state } => {
                if grammar_state.is_empty() {
                    write!(f, "invalid event code {code} at bit {bit_offset}")
                } else {
                    write!(
                        f,
                        "invalid event code {code} in state '{grammar_state}' at bit {bit_offset}"
                    )
                }
            }
            Self::InvalidCompactId { bit_offset, partition, id, size } => write!(
                f,
                "compact id {id} out of range for {partition} partition (size {size}) at bit {bit_offset}"
            ),
            Self::CorruptStream { bit_offset, detail } => {
                write!(f, "corrupt stream at bit {bit_offset}: {detail}")
            }
            Self::ConflictingProduction { grammar, event } => write!(
                f,
                "indistinguishable production for event '{event}' in grammar {grammar}"
            ),
            Self::UnknownGrammar(id) => write!(f, "unknown grammar index {id}"),
            Self::UnexpectedEvent { event, grammar_state } => {
                write!(f, "event {event} not allowed in state '{grammar_state}'")
            }
            Self::InvalidOptionCombination(detail) => {
                if detail.is_empty() {
                    write!(f, "invalid option combination")
                } else {
                    write!(f, "invalid option combination: {detail}")
                }
            }
            Self::InvalidBlockSize => write!(f, "block size must be greater than zero"),
            Self::InvalidValue(msg) => write!(f, "invalid typed value: {msg}"),
            Self::StringLengthExceeded { length, max } => {
                write!(f, "string length {length} exceeds maximum {max}")
            }
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::InvalidCodePoint(cp) => write!(f, "invalid Unicode code point U+{cp:X}"),
            Self::CompressionError(msg) => write!(f, "DEFLATE compression failed: {msg}"),
            Self::DecompressionError(msg) => write!(f, "DEFLATE decompression failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Erstellt einen `InvalidEventCode` Fehler mit Kontext.
    pub fn invalid_event_code(
        bit_offset: u64,
        code: u64,
        grammar_state: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidEventCode { bit_offset, code, grammar_state: grammar_state.into() }
    }

    /// Erstellt einen `CorruptStream` Fehler mit Kontext.
    pub fn corrupt(bit_offset: u64, detail: impl Into<Cow<'static, str>>) -> Self {
        Self::CorruptStream { bit_offset, detail: detail.into() }
    }

    /// Erstellt einen `ConflictingProduction` Fehler.
    pub fn conflict(grammar: usize, event: impl Into<Cow<'static, str>>) -> Self {
        Self::ConflictingProduction { grammar, event: event.into() }
    }

    /// True für Fehlerfamilie "corrupt stream" (Decode-Abbruch, kein Retry).
    pub fn is_corrupt_stream(&self) -> bool {
        matches!(
            self,
            Self::PrematureEndOfStream
                | Self::MalformedHeader
                | Self::UnsupportedVersion(_)
                | Self::InvalidEventCode { .. }
                | Self::InvalidCompactId { .. }
                | Self::CorruptStream { .. }
                | Self::StringLengthExceeded { .. }
                | Self::IntegerOverflow
                | Self::InvalidCodePoint(_)
                | Self::DecompressionError(_)
        )
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_event_code_display() {
        let e = Error::invalid_event_code(42, 7, "ElementContent");
        let msg = e.to_string();
        assert!(msg.contains("7"), "{msg}");
        assert!(msg.contains("42"), "{msg}");
        assert!(msg.contains("ElementContent"), "{msg}");
    }

    #[test]
    fn invalid_compact_id_display() {
        let e = Error::InvalidCompactId {
            bit_offset: 80,
            partition: "uri",
            id: 9,
            size: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("9"), "{msg}");
        assert!(msg.contains("uri"), "{msg}");
        assert!(msg.contains("3"), "{msg}");
        assert!(msg.contains("80"), "{msg}");
    }

    #[test]
    fn conflicting_production_display() {
        let e = Error::conflict(5, "SE(order)");
        let msg = e.to_string();
        assert!(msg.contains("indistinguishable"), "{msg}");
        assert!(msg.contains("SE(order)"), "{msg}");
    }

    #[test]
    fn corrupt_stream_classification() {
        assert!(Error::PrematureEndOfStream.is_corrupt_stream());
        assert!(Error::corrupt(0, "x").is_corrupt_stream());
        assert!(Error::StringLengthExceeded { length: 1 << 40, max: 16 }.is_corrupt_stream());
        assert!(!Error::InvalidBlockSize.is_corrupt_stream());
        assert!(!Error::conflict(0, "EE").is_corrupt_stream());
        assert!(!Error::InvalidValue("nope".into()).is_corrupt_stream());
    }

    #[test]
    fn error_implements_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(Error::MalformedHeader);
        assert!(!e.to_string().is_empty());
    }

    #[test]
    fn error_is_clone_and_eq() {
        let e1 = Error::IntegerOverflow;
        assert_eq!(e1.clone(), e1);
    }
}
