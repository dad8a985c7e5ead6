//! A compact binary interchange codec for XML infoset event streams
//! (EXI 1.0 shaped).
//!
//! The codec turns a sequence of infoset events into a dense bit- or
//! byte-oriented stream and back. Three coupled mechanisms carry the
//! format: a grammar/production automaton that assigns small event codes,
//! string tables that replace repeated URIs, names and values with compact
//! ids, and a channel layer that regroups content values per qualified name
//! for the (pre-)compression modes.
//!
//! ```
//! use exicore::{CodecOptions, Encoder, Event, QName, decode};
//!
//! let mut enc = Encoder::new(CodecOptions::default()).unwrap();
//! enc.write_event(&Event::StartDocument).unwrap();
//! enc.write_event(&Event::StartElement { qname: QName::new("", "note") }).unwrap();
//! enc.write_event(&Event::Characters { value: "hi".into() }).unwrap();
//! enc.write_event(&Event::EndElement).unwrap();
//! enc.write_event(&Event::EndDocument).unwrap();
//! let bytes = enc.finish().unwrap();
//!
//! let events = decode(&bytes).unwrap();
//! assert_eq!(events.len(), 5);
//! ```

pub mod binary;
pub mod bit_width;
pub mod bitstream;
pub mod boolean;
pub mod channel;
pub mod context;
pub mod datatype;
pub mod datetime;
pub mod decimal;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod event;
pub mod float;
pub mod grammar;
pub mod header;
pub mod integer;
pub mod options;
pub mod strings;

/// Hash map with the fast non-cryptographic hasher used throughout.
pub type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
/// Insertion-order-preserving map with the same hasher.
pub type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

pub use crate::datatype::Datatype;
pub use crate::decoder::{decode, decode_with_grammars, Decoder};
pub use crate::encoder::Encoder;
pub use crate::error::{Error, Result};
pub use crate::event::{Event, QName};
pub use crate::grammar::{GrammarBuilder, Grammars};
pub use crate::options::{Alignment, CodecOptions, Preserve};
