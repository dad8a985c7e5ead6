//! String tables: URI, prefix, local-name and value partitions.
//!
//! Encoder and decoder mutate their tables in lock step; every compact-ID
//! width is computed from the partition size BEFORE a new entry is appended.
//! Breaking that order desynchronises the two sides without any immediate
//! error, so all wire-level table access lives here and is shared by both.
//!
//! Partition encodings:
//!
//! - URI, local name and NS-prefix share the two-branch shape: a hit is
//!   `id + 1` in `⌈log₂(size + 1)⌉` bits, a miss is the reserved code 0
//!   followed by the literal, which is then appended.
//! - Value: local hit is length 0 + local id, global hit is length 1 +
//!   global id, miss is the literal with length + 2, appended to both the
//!   global partition and the local partition of the owning element/
//!   attribute name.

use std::rc::Rc;

use crate::bit_width;
use crate::bitstream::{BitReader, BitWriter};
use crate::integer::{decode_nbit, decode_unsigned, encode_nbit, encode_unsigned};
use crate::options::CodecOptions;
use crate::strings;
use crate::{Error, FastHashMap, Result};

pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
pub const XSI_URI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XSD_URI: &str = "http://www.w3.org/2001/XMLSchema";

/// A URI together with its interned qualified name. The `global_id` is the
/// creation-order index across all URIs; it keys local value partitions,
/// element grammars and the channel order.
#[derive(Debug, Clone)]
pub struct QNameContext {
    pub uri_id: usize,
    pub local_id: usize,
    pub global_id: usize,
    pub uri: Rc<str>,
    pub local_name: Rc<str>,
}

/// One URI partition: its local names and prefixes.
#[derive(Debug, Clone)]
struct UriContext {
    uri: Rc<str>,
    /// Lokale Namen als globale QName-Ids, Index = lokale Id.
    local_names: Vec<usize>,
    local_lookup: FastHashMap<Rc<str>, usize>,
    prefixes: Vec<Rc<str>>,
    prefix_lookup: FastHashMap<Rc<str>, usize>,
}

impl UriContext {
    fn new(uri: Rc<str>) -> Self {
        Self {
            uri,
            local_names: Vec::new(),
            local_lookup: FastHashMap::default(),
            prefixes: Vec::new(),
            prefix_lookup: FastHashMap::default(),
        }
    }
}

/// Baseline-Zählerstände für `clear()`.
#[derive(Debug, Clone, Default)]
struct Baseline {
    uris: usize,
    qnames: usize,
    per_uri: Vec<(usize, usize)>,
}

/// All string-table partitions of one stream.
#[derive(Debug, Clone)]
pub struct ContextTables {
    uris: Vec<UriContext>,
    uri_lookup: FastHashMap<Rc<str>, usize>,
    qnames: Vec<QNameContext>,

    global_values: Vec<Rc<str>>,
    global_value_lookup: FastHashMap<Rc<str>, usize>,
    /// Lokale Werte-Partition je QName-global-Id.
    local_values: FastHashMap<usize, Vec<Rc<str>>>,
    local_value_lookup: FastHashMap<(usize, Rc<str>), usize>,

    baseline: Baseline,
}

impl Default for ContextTables {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTables {
    /// Creates the tables with the three initial URI partitions and their
    /// well-known local names and prefixes.
    pub fn new() -> Self {
        let mut t = Self {
            uris: Vec::new(),
            uri_lookup: FastHashMap::default(),
            qnames: Vec::new(),
            global_values: Vec::new(),
            global_value_lookup: FastHashMap::default(),
            local_values: FastHashMap::default(),
            local_value_lookup: FastHashMap::default(),
            baseline: Baseline::default(),
        };
        let empty = t.intern_uri("");
        t.intern_prefix(empty, "");
        let xml = t.intern_uri(XML_URI);
        t.intern_prefix(xml, "xml");
        for local in ["base", "id", "lang", "space"] {
            t.intern_qname(xml, local);
        }
        let xsi = t.intern_uri(XSI_URI);
        t.intern_prefix(xsi, "xsi");
        for local in ["nil", "type"] {
            t.intern_qname(xsi, local);
        }
        t.freeze();
        t
    }

    /// Records the current partition sizes as the reset baseline. Called
    /// after schema registration, before any document content.
    pub fn freeze(&mut self) {
        self.baseline = Baseline {
            uris: self.uris.len(),
            qnames: self.qnames.len(),
            per_uri: self
                .uris
                .iter()
                .map(|u| (u.local_names.len(), u.prefixes.len()))
                .collect(),
        };
    }

    /// Resets all partitions to the frozen baseline. Values learned from
    /// document content are dropped entirely.
    pub fn clear(&mut self) {
        // Erst die QName-Lookups der Basis-URIs räumen, dann die gelernten
        // URIs kappen (deren Lookups verschwinden mit dem UriContext).
        for qn in &self.qnames[self.baseline.qnames..] {
            if qn.uri_id < self.baseline.uris {
                self.uris[qn.uri_id].local_lookup.remove(&qn.local_name);
            }
        }
        self.qnames.truncate(self.baseline.qnames);
        for uri in &self.uris[self.baseline.uris..] {
            self.uri_lookup.remove(&uri.uri);
        }
        self.uris.truncate(self.baseline.uris);
        for (uri, &(locals, prefixes)) in self.uris.iter_mut().zip(&self.baseline.per_uri) {
            uri.local_names.truncate(locals);
            for p in uri.prefixes.drain(prefixes..) {
                uri.prefix_lookup.remove(&p);
            }
        }
        self.global_values.clear();
        self.global_value_lookup.clear();
        self.local_values.clear();
        self.local_value_lookup.clear();
    }

    // ----- Interning (schema registration and decode-side appends) -----

    pub fn intern_uri(&mut self, uri: &str) -> usize {
        if let Some(&id) = self.uri_lookup.get(uri) {
            return id;
        }
        let rc: Rc<str> = Rc::from(uri);
        let id = self.uris.len();
        self.uris.push(UriContext::new(rc.clone()));
        self.uri_lookup.insert(rc, id);
        id
    }

    pub fn intern_prefix(&mut self, uri_id: usize, prefix: &str) -> usize {
        let uri = &mut self.uris[uri_id];
        if let Some(&id) = uri.prefix_lookup.get(prefix) {
            return id;
        }
        let rc: Rc<str> = Rc::from(prefix);
        let id = uri.prefixes.len();
        uri.prefixes.push(rc.clone());
        uri.prefix_lookup.insert(rc, id);
        id
    }

    /// Interns `local` under `uri_id` and returns the qname's global id.
    pub fn intern_qname(&mut self, uri_id: usize, local: &str) -> usize {
        if let Some(&local_id) = self.uris[uri_id].local_lookup.get(local) {
            return self.uris[uri_id].local_names[local_id];
        }
        let rc: Rc<str> = Rc::from(local);
        let global_id = self.qnames.len();
        let local_id = self.uris[uri_id].local_names.len();
        self.qnames.push(QNameContext {
            uri_id,
            local_id,
            global_id,
            uri: self.uris[uri_id].uri.clone(),
            local_name: rc.clone(),
        });
        self.uris[uri_id].local_names.push(global_id);
        self.uris[uri_id].local_lookup.insert(rc, local_id);
        global_id
    }

    pub fn qname(&self, global_id: usize) -> &QNameContext {
        &self.qnames[global_id]
    }

    pub fn uri(&self, uri_id: usize) -> &Rc<str> {
        &self.uris[uri_id].uri
    }

    pub fn uri_count(&self) -> usize {
        self.uris.len()
    }

    pub fn qname_count(&self) -> usize {
        self.qnames.len()
    }

    pub fn find_uri(&self, uri: &str) -> Option<usize> {
        self.uri_lookup.get(uri).copied()
    }

    pub fn find_qname(&self, uri: &str, local: &str) -> Option<usize> {
        let &uri_id = self.uri_lookup.get(uri)?;
        let &local_id = self.uris[uri_id].local_lookup.get(local)?;
        Some(self.uris[uri_id].local_names[local_id])
    }

    // ----- URI partition -----

    pub fn write_uri(&mut self, writer: &mut BitWriter, uri: &str, byte_oriented: bool) -> usize {
        let n = bit_width::for_count(self.uris.len() + 1);
        match self.uri_lookup.get(uri) {
            Some(&id) => {
                encode_nbit(writer, id as u64 + 1, n, byte_oriented);
                id
            }
            None => {
                encode_nbit(writer, 0, n, byte_oriented);
                strings::encode_literal(writer, uri);
                self.intern_uri(uri)
            }
        }
    }

    pub fn read_uri(&mut self, reader: &mut BitReader, byte_oriented: bool) -> Result<usize> {
        let n = bit_width::for_count(self.uris.len() + 1);
        let code = decode_nbit(reader, n, byte_oriented)?;
        if code == 0 {
            let uri = strings::decode_literal(reader)?;
            return Ok(self.intern_uri(&uri));
        }
        let id = (code - 1) as usize;
        if id >= self.uris.len() {
            return Err(Error::InvalidCompactId {
                bit_offset: reader.bit_position(),
                partition: "uri",
                id: id as u64,
                size: self.uris.len() as u64,
            });
        }
        Ok(id)
    }

    // ----- Prefix partition -----

    /// NS-event prefix: two-branch with learning, like the URI partition.
    pub fn write_prefix(
        &mut self,
        writer: &mut BitWriter,
        uri_id: usize,
        prefix: &str,
        byte_oriented: bool,
    ) -> usize {
        let uri = &self.uris[uri_id];
        let n = bit_width::for_count(uri.prefixes.len() + 1);
        match uri.prefix_lookup.get(prefix) {
            Some(&id) => {
                encode_nbit(writer, id as u64 + 1, n, byte_oriented);
                id
            }
            None => {
                encode_nbit(writer, 0, n, byte_oriented);
                strings::encode_literal(writer, prefix);
                self.intern_prefix(uri_id, prefix)
            }
        }
    }

    pub fn read_prefix(
        &mut self,
        reader: &mut BitReader,
        uri_id: usize,
        byte_oriented: bool,
    ) -> Result<Rc<str>> {
        let n = bit_width::for_count(self.uris[uri_id].prefixes.len() + 1);
        let code = decode_nbit(reader, n, byte_oriented)?;
        if code == 0 {
            let prefix = strings::decode_literal(reader)?;
            let id = self.intern_prefix(uri_id, &prefix);
            return Ok(self.uris[uri_id].prefixes[id].clone());
        }
        let id = (code - 1) as usize;
        let prefixes = &self.uris[uri_id].prefixes;
        prefixes.get(id).cloned().ok_or(Error::InvalidCompactId {
            bit_offset: reader.bit_position(),
            partition: "prefix",
            id: id as u64,
            size: prefixes.len() as u64,
        })
    }

    /// SE/AT prefix hint: a plain compact id over the existing partition,
    /// no learning. Unknown prefixes fall back to id 0.
    pub fn write_prefix_ref(
        &self,
        writer: &mut BitWriter,
        uri_id: usize,
        prefix: Option<&str>,
        byte_oriented: bool,
    ) {
        let uri = &self.uris[uri_id];
        if uri.prefixes.is_empty() {
            return;
        }
        let n = bit_width::for_count(uri.prefixes.len());
        let id = prefix
            .and_then(|p| uri.prefix_lookup.get(p).copied())
            .unwrap_or(0);
        encode_nbit(writer, id as u64, n, byte_oriented);
    }

    pub fn read_prefix_ref(
        &self,
        reader: &mut BitReader,
        uri_id: usize,
        byte_oriented: bool,
    ) -> Result<Option<Rc<str>>> {
        let uri = &self.uris[uri_id];
        if uri.prefixes.is_empty() {
            return Ok(None);
        }
        let n = bit_width::for_count(uri.prefixes.len());
        let id = decode_nbit(reader, n, byte_oriented)? as usize;
        let prefix = uri.prefixes.get(id).cloned().ok_or(Error::InvalidCompactId {
            bit_offset: reader.bit_position(),
            partition: "prefix",
            id: id as u64,
            size: uri.prefixes.len() as u64,
        })?;
        Ok(Some(prefix))
    }

    // ----- Local-name partition -----

    pub fn write_local_name(
        &mut self,
        writer: &mut BitWriter,
        uri_id: usize,
        local: &str,
        byte_oriented: bool,
    ) -> usize {
        let n = bit_width::for_count(self.uris[uri_id].local_names.len() + 1);
        match self.uris[uri_id].local_lookup.get(local) {
            Some(&local_id) => {
                encode_nbit(writer, local_id as u64 + 1, n, byte_oriented);
                self.uris[uri_id].local_names[local_id]
            }
            None => {
                encode_nbit(writer, 0, n, byte_oriented);
                strings::encode_literal(writer, local);
                self.intern_qname(uri_id, local)
            }
        }
    }

    pub fn read_local_name(
        &mut self,
        reader: &mut BitReader,
        uri_id: usize,
        byte_oriented: bool,
    ) -> Result<usize> {
        let size = self.uris[uri_id].local_names.len();
        let n = bit_width::for_count(size + 1);
        let code = decode_nbit(reader, n, byte_oriented)?;
        if code == 0 {
            let local = strings::decode_literal(reader)?;
            return Ok(self.intern_qname(uri_id, &local));
        }
        let local_id = (code - 1) as usize;
        if local_id >= size {
            return Err(Error::InvalidCompactId {
                bit_offset: reader.bit_position(),
                partition: "local-name",
                id: local_id as u64,
                size: size as u64,
            });
        }
        Ok(self.uris[uri_id].local_names[local_id])
    }

    // ----- Value partition -----

    /// Encodes a value in the context of the qname `qname_id`.
    pub fn write_value(
        &mut self,
        writer: &mut BitWriter,
        qname_id: usize,
        value: &Rc<str>,
        options: &CodecOptions,
        byte_oriented: bool,
    ) {
        if let Some(&local_id) = self.local_value_lookup.get(&(qname_id, value.clone())) {
            encode_unsigned(writer, 0);
            let size = self.local_values.get(&qname_id).map_or(0, Vec::len);
            let n = bit_width::for_count(size);
            encode_nbit(writer, local_id as u64, n, byte_oriented);
            return;
        }
        if let Some(&global_id) = self.global_value_lookup.get(value) {
            encode_unsigned(writer, 1);
            let n = bit_width::for_count(self.global_values.len());
            encode_nbit(writer, global_id as u64, n, byte_oriented);
            return;
        }
        strings::encode_literal_offset(writer, value, 2);
        self.add_value(qname_id, value, options);
    }

    /// Decodes a value in the context of the qname `qname_id`.
    pub fn read_value(
        &mut self,
        reader: &mut BitReader,
        qname_id: usize,
        options: &CodecOptions,
        byte_oriented: bool,
    ) -> Result<Rc<str>> {
        let len = decode_unsigned(reader)?;
        match len {
            0 => {
                let size = self.local_values.get(&qname_id).map_or(0, Vec::len);
                let n = bit_width::for_count(size);
                let local_id = decode_nbit(reader, n, byte_oriented)? as usize;
                self.local_values
                    .get(&qname_id)
                    .and_then(|v| v.get(local_id))
                    .cloned()
                    .ok_or(Error::InvalidCompactId {
                        bit_offset: reader.bit_position(),
                        partition: "local-value",
                        id: local_id as u64,
                        size: size as u64,
                    })
            }
            1 => {
                let n = bit_width::for_count(self.global_values.len());
                let global_id = decode_nbit(reader, n, byte_oriented)? as usize;
                self.global_values
                    .get(global_id)
                    .cloned()
                    .ok_or(Error::InvalidCompactId {
                        bit_offset: reader.bit_position(),
                        partition: "global-value",
                        id: global_id as u64,
                        size: self.global_values.len() as u64,
                    })
            }
            _ => {
                let value: Rc<str> = Rc::from(strings::decode_chars(reader, len - 2)?);
                self.add_value(qname_id, &value, options);
                Ok(value)
            }
        }
    }

    /// Appends a missed value to both partitions, honouring the length and
    /// capacity limits. Identical on both sides so the tables stay in sync.
    fn add_value(&mut self, qname_id: usize, value: &Rc<str>, options: &CodecOptions) {
        if !options.value_cacheable(value) {
            return;
        }
        if let Some(cap) = options.value_partition_capacity {
            if self.global_values.len() as u64 >= u64::from(cap) {
                return;
            }
        }
        let global_id = self.global_values.len();
        self.global_values.push(value.clone());
        self.global_value_lookup.insert(value.clone(), global_id);
        let locals = self.local_values.entry(qname_id).or_default();
        let local_id = locals.len();
        locals.push(value.clone());
        self.local_value_lookup.insert((qname_id, value.clone()), local_id);
    }

    pub fn global_value_count(&self) -> usize {
        self.global_values.len()
    }

    pub fn local_value_count(&self, qname_id: usize) -> usize {
        self.local_values.get(&qname_id).map_or(0, Vec::len)
    }
}
