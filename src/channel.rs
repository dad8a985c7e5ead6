//! Value channels for the (pre-)compression modes.
//!
//! Content values are buffered per (URI, localName) channel during a block;
//! on flush they are serialized channel by channel instead of in document
//! order, which groups similar values and helps the deflate stage. The
//! 100-value split rule decides the physical stream layout:
//!
//! - total ≤ 100: one stream, structure bytes then all channels in
//!   first-occurrence order.
//! - total > 100: the structure channel alone, then one stream with all
//!   channels of ≤ 100 values (omitted when none), then one stream per
//!   larger channel, all in first-occurrence order.
//!
//! The serialization order (small channels before large ones) is also the
//! string-table mutation order, so both sides must derive it identically.

use std::io::{Read, Write};
use std::rc::Rc;

use flate2::Compression;
use flate2::bufread::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::datatype::Datatype;
use crate::{Error, FastIndexMap, Result};

/// Channels above this value count get their own physical stream. A format
/// constant, not a tunable.
pub const CHANNEL_SPLIT_THRESHOLD: usize = 100;

/// One block's worth of buffered values, keyed by QName global id in
/// first-occurrence order.
#[derive(Debug, Default)]
pub struct Block {
    channels: FastIndexMap<usize, Vec<(Rc<str>, Datatype)>>,
    total: usize,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, qname_id: usize, value: Rc<str>, datatype: Datatype) {
        self.channels.entry(qname_id).or_default().push((value, datatype));
        self.total += 1;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn channel(&self, qname_id: usize) -> Option<&[(Rc<str>, Datatype)]> {
        self.channels.get(&qname_id).map(Vec::as_slice)
    }

    /// Leert den Block für den nächsten (die Tabellen bleiben unberührt).
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// The physical layout of this block under the split rule.
    pub fn layout(&self) -> ChannelLayout {
        let split = self.total > CHANNEL_SPLIT_THRESHOLD;
        let mut small = Vec::new();
        let mut large = Vec::new();
        for (&qname_id, values) in &self.channels {
            if split && values.len() > CHANNEL_SPLIT_THRESHOLD {
                large.push(qname_id);
            } else {
                small.push(qname_id);
            }
        }
        ChannelLayout { split, small, large }
    }
}

/// Channel keys grouped by the split rule, each in first-occurrence order.
/// Serialization and table mutation follow `small` then `large`.
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelLayout {
    pub split: bool,
    pub small: Vec<usize>,
    pub large: Vec<usize>,
}

impl ChannelLayout {
    /// All channel keys in serialization order.
    pub fn ordered(&self) -> impl Iterator<Item = usize> + '_ {
        self.small.iter().chain(self.large.iter()).copied()
    }

    /// Number of physical streams this block produces (structure included).
    pub fn stream_count(&self) -> usize {
        if !self.split {
            1
        } else {
            1 + usize::from(!self.small.is_empty()) + self.large.len()
        }
    }
}

/// Raw-deflate compression of one physical stream.
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::CompressionError(e.to_string()))
}

/// Inflates one deflate stream from the front of `data`, returning the
/// decompressed bytes and how many input bytes the stream occupied. The
/// consumed count delimits concatenated per-channel streams.
pub fn inflate(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::DecompressionError(e.to_string()))?;
    let consumed = usize::try_from(decoder.total_in()).map_err(|_| Error::IntegerOverflow)?;
    Ok((out, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rc(s: &str) -> Rc<str> {
        Rc::from(s)
    }

    #[test]
    fn first_occurrence_order() {
        let mut b = Block::new();
        b.push(5, rc("a"), Datatype::String);
        b.push(2, rc("b"), Datatype::String);
        b.push(5, rc("c"), Datatype::String);
        b.push(9, rc("d"), Datatype::String);
        let layout = b.layout();
        assert!(!layout.split);
        assert_eq!(layout.small, vec![5, 2, 9]);
        assert!(layout.large.is_empty());
        assert_eq!(layout.stream_count(), 1);
        assert_eq!(b.total(), 4);
    }

    /// Erhaltungssatz: flush verliert und erfindet keine Werte.
    #[test]
    fn value_conservation() {
        let mut b = Block::new();
        for i in 0..7 {
            b.push(i % 3, rc(&format!("v{i}")), Datatype::String);
        }
        let layout = b.layout();
        let mut seen: Vec<String> = layout
            .ordered()
            .flat_map(|q| b.channel(q).unwrap().iter().map(|(v, _)| v.to_string()))
            .collect();
        seen.sort();
        let mut expected: Vec<String> = (0..7).map(|i| format!("v{i}")).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    /// Split-Regel: > 100 Werte insgesamt teilt die Ströme dreistufig.
    #[test]
    fn split_rule() {
        let mut b = Block::new();
        for i in 0..150 {
            b.push(1, rc(&format!("x{i}")), Datatype::String);
        }
        for i in 0..30 {
            b.push(2, rc(&format!("y{i}")), Datatype::String);
        }
        let layout = b.layout();
        assert!(layout.split);
        assert_eq!(layout.small, vec![2]);
        assert_eq!(layout.large, vec![1]);
        // Struktur + kombinierter Klein-Strom + 1 großer Kanal
        assert_eq!(layout.stream_count(), 3);
        // Kleine Kanäle werden vor großen serialisiert
        assert_eq!(layout.ordered().collect::<Vec<_>>(), vec![2, 1]);
    }

    /// Genau 100 Werte bleiben ein einzelner Strom.
    #[test]
    fn threshold_boundary() {
        let mut b = Block::new();
        for i in 0..100 {
            b.push(i, rc("v"), Datatype::String);
        }
        assert!(!b.layout().split);
        b.push(0, rc("v"), Datatype::String);
        assert!(b.layout().split);
    }

    /// Kein Klein-Strom, wenn alle Kanäle groß sind.
    #[test]
    fn no_small_stream_when_all_large() {
        let mut b = Block::new();
        for i in 0..101 {
            b.push(1, rc(&format!("x{i}")), Datatype::String);
        }
        let layout = b.layout();
        assert!(layout.small.is_empty());
        assert_eq!(layout.stream_count(), 2);
    }

    #[test]
    fn take_resets_block() {
        let mut b = Block::new();
        b.push(1, rc("a"), Datatype::String);
        let old = b.take();
        assert_eq!(old.total(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn deflate_round_trip_with_boundary() {
        let first = deflate(b"hello hello hello").unwrap();
        let second = deflate(b"world").unwrap();
        let mut concat = first.clone();
        concat.extend_from_slice(&second);

        let (out, consumed) = inflate(&concat).unwrap();
        assert_eq!(out, b"hello hello hello");
        assert_eq!(consumed, first.len());
        let (out, _) = inflate(&concat[consumed..]).unwrap();
        assert_eq!(out, b"world");
    }

    #[test]
    fn inflate_garbage_fails() {
        assert!(matches!(
            inflate(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap_err(),
            Error::DecompressionError(_)
        ));
    }
}
