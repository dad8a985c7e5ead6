//! Decoder: the exact mirror of the encoder.
//!
//! Every table append, grammar learn and width computation happens at the
//! same point of the event sequence as on the encoding side. In the
//! (pre-)compression modes the structure stream is parsed first with
//! placeholder values; the channel streams are then read in the layout
//! order and patched into the buffered events.

use std::rc::Rc;

use log::trace;

use crate::bit_width;
use crate::bitstream::BitReader;
use crate::channel::{self, ChannelLayout, CHANNEL_SPLIT_THRESHOLD};
use crate::context::{ContextTables, XSI_URI};
use crate::datatype::Datatype;
use crate::event::{Event, QName};
use crate::grammar::{
    second_level, third_level, EventLabel, Extension, GrammarId, GrammarKind, Grammars,
    RuntimeGrammars,
};
use crate::header;
use crate::integer::decode_nbit;
use crate::options::CodecOptions;
use crate::strings;
use crate::{Error, FastIndexMap, Result};

/// Decodes a complete schema-less stream.
pub fn decode(data: &[u8]) -> Result<Vec<Event>> {
    decode_with_grammars(data, &Grammars::schema_less())
}

/// Decodes a complete stream against a pre-built grammar set.
pub fn decode_with_grammars(data: &[u8], base: &Grammars) -> Result<Vec<Event>> {
    let mut reader = BitReader::new(data);
    let options = header::read_header(&mut reader)?;
    let mut decoder = Decoder::new(options, base)?;
    decoder.decode_body(reader)
}

/// Aufgeschobene Kanalwerte eines Blocks: QName-Id → (Event-Index,
/// Datentyp) in Erstauftritts-Reihenfolge.
#[derive(Default)]
struct Pending {
    slots: FastIndexMap<usize, Vec<(usize, Datatype)>>,
    count: usize,
}

impl Pending {
    fn push(&mut self, qname_id: usize, event_index: usize, datatype: Datatype) {
        self.slots.entry(qname_id).or_default().push((event_index, datatype));
        self.count += 1;
    }

    /// Same split rule as on the encoding side, over slot counts instead of
    /// buffered values.
    fn layout(&self) -> ChannelLayout {
        let split = self.count > CHANNEL_SPLIT_THRESHOLD;
        let mut small = Vec::new();
        let mut large = Vec::new();
        for (&qname_id, slots) in &self.slots {
            if split && slots.len() > CHANNEL_SPLIT_THRESHOLD {
                large.push(qname_id);
            } else {
                small.push(qname_id);
            }
        }
        ChannelLayout { split, small, large }
    }
}

/// Decodes one document per instance.
pub struct Decoder {
    options: CodecOptions,
    tables: ContextTables,
    grammars: RuntimeGrammars,
    stack: Vec<GrammarId>,
    elements: Vec<usize>,
    current: GrammarId,
    finished: bool,
}

impl Decoder {
    pub fn new(options: CodecOptions, base: &Grammars) -> Result<Self> {
        options.validate()?;
        let grammars = RuntimeGrammars::new(base);
        let current = grammars.document();
        Ok(Self {
            options,
            tables: base.tables().clone(),
            grammars,
            stack: Vec::new(),
            elements: Vec::new(),
            current,
            finished: false,
        })
    }

    /// Decodes the body behind an already consumed header.
    pub fn decode_body(&mut self, mut reader: BitReader<'_>) -> Result<Vec<Event>> {
        if self.options.channelised() {
            return self.decode_blocks(reader.remaining_bytes());
        }
        let mut events = Vec::new();
        while !self.finished {
            let event = self.read_event(&mut reader, None)?;
            events.push(event);
        }
        Ok(events)
    }

    // ----- Blockweises Dekodieren (Kanal-Schicht) -----

    fn decode_blocks(&mut self, mut data: &[u8]) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        while !self.finished {
            data = self.decode_block(data, &mut events)?;
        }
        Ok(events)
    }

    fn decode_block<'a>(&mut self, mut data: &'a [u8], events: &mut Vec<Event>) -> Result<&'a [u8]> {
        let mut pending = Pending::default();

        if self.options.compression {
            let (structure, consumed) = channel::inflate(data)?;
            data = &data[consumed..];
            let mut reader = BitReader::new(&structure);
            self.parse_structure(&mut reader, events, &mut pending)?;
            let layout = pending.layout();
            trace!("block: {} deferred values, {} streams", pending.count, layout.stream_count());
            if !layout.split {
                // Die Werte folgen im selben physischen Strom
                reader.align_to_byte();
                let ordered: Vec<usize> = layout.ordered().collect();
                self.read_channels(&mut reader, &ordered, &pending, events)?;
            } else {
                if !layout.small.is_empty() {
                    let (bytes, consumed) = channel::inflate(data)?;
                    data = &data[consumed..];
                    let mut reader = BitReader::new(&bytes);
                    self.read_channels(&mut reader, &layout.small, &pending, events)?;
                }
                for &qname_id in &layout.large {
                    let (bytes, consumed) = channel::inflate(data)?;
                    data = &data[consumed..];
                    let mut reader = BitReader::new(&bytes);
                    self.read_channels(&mut reader, &[qname_id], &pending, events)?;
                }
            }
            Ok(data)
        } else {
            // Pre-Compression: gleiche Stromgrenzen, aber unkomprimiert und
            // damit direkt hintereinander lesbar
            let mut reader = BitReader::new(data);
            self.parse_structure(&mut reader, events, &mut pending)?;
            reader.align_to_byte();
            let layout = pending.layout();
            let ordered: Vec<usize> = layout.ordered().collect();
            self.read_channels(&mut reader, &ordered, &pending, events)?;
            let consumed = reader.byte_position();
            Ok(&data[consumed..])
        }
    }

    /// Pass 1: parses structure events until the block is full or the
    /// document ends, deferring every channel value.
    fn parse_structure(
        &mut self,
        reader: &mut BitReader<'_>,
        events: &mut Vec<Event>,
        pending: &mut Pending,
    ) -> Result<()> {
        loop {
            let index = events.len();
            let event = self.read_event(reader, Some((pending, index)))?;
            events.push(event);
            if self.finished || pending.count as u64 >= u64::from(self.options.block_size) {
                return Ok(());
            }
        }
    }

    /// Pass 2: reads the given channels in order and patches the deferred
    /// slots. Table mutations happen here, matching the encoder's flush.
    fn read_channels(
        &mut self,
        reader: &mut BitReader<'_>,
        qname_ids: &[usize],
        pending: &Pending,
        events: &mut [Event],
    ) -> Result<()> {
        for &qname_id in qname_ids {
            let Some(slots) = pending.slots.get(&qname_id) else {
                continue;
            };
            for &(index, datatype) in slots {
                let value = self.read_channel_value(reader, qname_id, datatype)?;
                match &mut events[index] {
                    Event::Attribute { value: slot, .. } | Event::Characters { value: slot } => {
                        *slot = value;
                    }
                    _ => {
                        return Err(Error::corrupt(
                            reader.bit_position(),
                            "deferred value slot points at a value-less event",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn read_channel_value(
        &mut self,
        reader: &mut BitReader<'_>,
        qname_id: usize,
        datatype: Datatype,
    ) -> Result<Rc<str>> {
        if self.options.preserve.lexical_values {
            Ok(Rc::from(datatype.decode_lexical(reader, true)?))
        } else if datatype == Datatype::String {
            self.tables.read_value(reader, qname_id, &self.options, true)
        } else {
            Ok(Rc::from(datatype.decode_typed(reader, true)?))
        }
    }

    // ----- Ereignis-Leser -----

    fn byte(&self) -> bool {
        self.options.byte_oriented()
    }

    fn state_name(&self) -> String {
        format!("{:?}", self.grammars.kind(self.current))
    }

    fn generic_next(&self) -> GrammarId {
        match self.grammars.kind(self.current) {
            GrammarKind::BuiltinStartTag { content } => content,
            _ => self.current,
        }
    }

    /// Reads one event code and the identifiers/values it implies.
    fn read_event(
        &mut self,
        reader: &mut BitReader<'_>,
        pending: Option<(&mut Pending, usize)>,
    ) -> Result<Event> {
        let byte = self.byte();
        let l2 = second_level(self.grammars.kind(self.current), &self.options);
        let n1 = self.grammars.number_of_events(self.current);
        let w1 = bit_width::for_level(n1, !l2.is_empty());
        let code = decode_nbit(reader, w1, byte)? as usize;

        if code < n1 {
            let (label, next) = self
                .grammars
                .lookup(self.current, code)
                .map(|p| (p.label, p.next))
                .ok_or(Error::UnknownGrammar(self.current))?;
            return self.apply_production(reader, label, next, pending);
        }
        if code == n1 && !l2.is_empty() {
            let w2 = bit_width::for_count(l2.len());
            let index = decode_nbit(reader, w2, byte)? as usize;
            let ext = l2.get(index).copied().ok_or_else(|| {
                Error::invalid_event_code(reader.bit_position(), index as u64, self.state_name())
            })?;
            let ext = match ext {
                Extension::CommentPiEscape | Extension::AttributeEscape => {
                    let group = third_level(ext, &self.options);
                    let w3 = bit_width::for_count(group.len());
                    let sub = decode_nbit(reader, w3, byte)? as usize;
                    group.get(sub).copied().ok_or_else(|| {
                        Error::invalid_event_code(
                            reader.bit_position(),
                            sub as u64,
                            self.state_name(),
                        )
                    })?
                }
                other => other,
            };
            return self.apply_extension(reader, ext, pending);
        }
        Err(Error::invalid_event_code(reader.bit_position(), code as u64, self.state_name()))
    }

    fn apply_production(
        &mut self,
        reader: &mut BitReader<'_>,
        label: EventLabel,
        next: Option<GrammarId>,
        pending: Option<(&mut Pending, usize)>,
    ) -> Result<Event> {
        let byte = self.byte();
        match label {
            EventLabel::StartDocument => {
                self.current = next.ok_or(Error::UnknownGrammar(self.current))?;
                Ok(Event::StartDocument)
            }
            EventLabel::EndDocument => {
                self.finished = true;
                Ok(Event::EndDocument)
            }
            EventLabel::StartElement(qname_id) => self.finish_start_element(reader, qname_id, next),
            EventLabel::StartElementNs(uri_id) => {
                let qname_id = self.tables.read_local_name(reader, uri_id, byte)?;
                self.finish_start_element(reader, qname_id, next)
            }
            EventLabel::StartElementGeneric => {
                let uri_id = self.tables.read_uri(reader, byte)?;
                let qname_id = self.tables.read_local_name(reader, uri_id, byte)?;
                self.finish_start_element(reader, qname_id, next)
            }
            EventLabel::EndElement => self.finish_end_element(reader),
            EventLabel::Attribute(qname_id, datatype) => {
                self.finish_attribute(reader, qname_id, datatype, next, pending)
            }
            EventLabel::AttributeNs(uri_id) => {
                let qname_id = self.tables.read_local_name(reader, uri_id, byte)?;
                let datatype =
                    self.grammars.global_attribute(qname_id).unwrap_or(Datatype::String);
                self.finish_attribute(reader, qname_id, datatype, next, pending)
            }
            EventLabel::AttributeGeneric => {
                let uri_id = self.tables.read_uri(reader, byte)?;
                let qname_id = self.tables.read_local_name(reader, uri_id, byte)?;
                let datatype =
                    self.grammars.global_attribute(qname_id).unwrap_or(Datatype::String);
                self.finish_attribute(reader, qname_id, datatype, next, pending)
            }
            EventLabel::Characters(datatype) => {
                let qname_id = *self.elements.last().ok_or_else(|| {
                    Error::corrupt(reader.bit_position(), "character content outside any element")
                })?;
                let value = self.read_value_for(reader, qname_id, datatype, pending)?;
                if let Some(next) = next {
                    self.current = next;
                }
                Ok(Event::Characters { value })
            }
        }
    }

    fn apply_extension(
        &mut self,
        reader: &mut BitReader<'_>,
        ext: Extension,
        pending: Option<(&mut Pending, usize)>,
    ) -> Result<Event> {
        let byte = self.byte();
        match ext {
            Extension::UndeclaredEndElement => {
                self.grammars.learn(self.current, EventLabel::EndElement, None, &self.options);
                self.finish_end_element(reader)
            }
            Extension::StartElementGeneric => {
                let uri_id = self.tables.read_uri(reader, byte)?;
                let qname_id = self.tables.read_local_name(reader, uri_id, byte)?;
                let resume = self.generic_next();
                self.grammars.learn(
                    self.current,
                    EventLabel::StartElement(qname_id),
                    Some(resume),
                    &self.options,
                );
                self.finish_start_element(reader, qname_id, Some(resume))
            }
            Extension::XsiType => {
                let qname_id = self
                    .tables
                    .find_qname(XSI_URI, "type")
                    .ok_or(Error::UnknownGrammar(self.current))?;
                let value = self.tables.read_value(reader, qname_id, &self.options, byte)?;
                let local = value.rsplit(':').next().unwrap_or(&value);
                if let Some(grammar) = self.grammars.type_by_local(local, &self.tables) {
                    self.current = grammar;
                }
                Ok(Event::Attribute {
                    qname: QName::with_prefix(XSI_URI, "type", "xsi"),
                    value,
                })
            }
            Extension::XsiNil => {
                let nil = crate::boolean::decode(reader, byte)?;
                if nil {
                    self.current = self.grammars.empty_grammar();
                }
                Ok(Event::Attribute {
                    qname: QName::with_prefix(XSI_URI, "nil", "xsi"),
                    value: Rc::from(if nil { "true" } else { "false" }),
                })
            }
            Extension::AttributeInvalid | Extension::AttributeGeneric => {
                let uri_id = self.tables.read_uri(reader, byte)?;
                let qname_id = self.tables.read_local_name(reader, uri_id, byte)?;
                let prefix = self.read_prefix_hint(reader, qname_id)?;
                self.grammars.learn(
                    self.current,
                    EventLabel::Attribute(qname_id, Datatype::String),
                    Some(self.current),
                    &self.options,
                );
                let value = self.read_value_for(reader, qname_id, Datatype::String, pending)?;
                Ok(Event::Attribute { qname: self.make_qname(qname_id, prefix), value })
            }
            Extension::NamespaceDecl => {
                let uri_id = self.tables.read_uri(reader, byte)?;
                let uri = self.tables.uri(uri_id).clone();
                let prefix = self.tables.read_prefix(reader, uri_id, byte)?;
                let local_element_ns = crate::boolean::decode(reader, byte)?;
                Ok(Event::NamespaceDeclaration { uri, prefix, local_element_ns })
            }
            Extension::SelfContained => {
                reader.align_to_byte();
                Ok(Event::SelfContained)
            }
            Extension::CharactersGeneric => {
                let qname_id = *self.elements.last().ok_or_else(|| {
                    Error::corrupt(reader.bit_position(), "character content outside any element")
                })?;
                let next = self.generic_next();
                self.grammars.learn(
                    self.current,
                    EventLabel::Characters(Datatype::String),
                    Some(next),
                    &self.options,
                );
                self.current = next;
                let value = self.read_value_for(reader, qname_id, Datatype::String, pending)?;
                Ok(Event::Characters { value })
            }
            Extension::EntityRef => {
                let name = strings::decode_literal(reader)?;
                Ok(Event::EntityReference { name: Rc::from(name) })
            }
            Extension::Comment => {
                let text = strings::decode_literal(reader)?;
                Ok(Event::Comment { text: Rc::from(text) })
            }
            Extension::ProcessingInstr => {
                let target = strings::decode_literal(reader)?;
                let data = strings::decode_literal(reader)?;
                Ok(Event::ProcessingInstruction {
                    target: Rc::from(target),
                    data: Rc::from(data),
                })
            }
            Extension::DocType => {
                let name = strings::decode_literal(reader)?;
                let public_id = strings::decode_literal(reader)?;
                let system_id = strings::decode_literal(reader)?;
                let text = strings::decode_literal(reader)?;
                Ok(Event::DocType {
                    name: Rc::from(name),
                    public_id: Rc::from(public_id),
                    system_id: Rc::from(system_id),
                    text: Rc::from(text),
                })
            }
            Extension::CommentPiEscape | Extension::AttributeEscape => {
                // Gruppen-Selektoren werden in read_event aufgelöst
                Err(Error::UnknownGrammar(self.current))
            }
        }
    }

    fn finish_start_element(
        &mut self,
        reader: &mut BitReader<'_>,
        qname_id: usize,
        next: Option<GrammarId>,
    ) -> Result<Event> {
        let prefix = self.read_prefix_hint(reader, qname_id)?;
        self.stack.push(next.ok_or(Error::UnknownGrammar(self.current))?);
        self.elements.push(qname_id);
        self.current = self.grammars.element_grammar(qname_id, &self.options);
        Ok(Event::StartElement { qname: self.make_qname(qname_id, prefix) })
    }

    fn finish_end_element(&mut self, reader: &mut BitReader<'_>) -> Result<Event> {
        self.current = self.stack.pop().ok_or_else(|| {
            Error::corrupt(reader.bit_position(), "end element without matching start")
        })?;
        self.elements.pop();
        Ok(Event::EndElement)
    }

    fn finish_attribute(
        &mut self,
        reader: &mut BitReader<'_>,
        qname_id: usize,
        datatype: Datatype,
        next: Option<GrammarId>,
        pending: Option<(&mut Pending, usize)>,
    ) -> Result<Event> {
        let prefix = self.read_prefix_hint(reader, qname_id)?;
        let value = self.read_value_for(reader, qname_id, datatype, pending)?;
        if let Some(next) = next {
            self.current = next;
        }
        Ok(Event::Attribute { qname: self.make_qname(qname_id, prefix), value })
    }

    fn read_prefix_hint(
        &mut self,
        reader: &mut BitReader<'_>,
        qname_id: usize,
    ) -> Result<Option<Rc<str>>> {
        if !self.options.preserve.prefixes {
            return Ok(None);
        }
        let uri_id = self.tables.qname(qname_id).uri_id;
        self.tables.read_prefix_ref(reader, uri_id, self.options.byte_oriented())
    }

    fn read_value_for(
        &mut self,
        reader: &mut BitReader<'_>,
        qname_id: usize,
        datatype: Datatype,
        pending: Option<(&mut Pending, usize)>,
    ) -> Result<Rc<str>> {
        match pending {
            Some((pending, index)) => {
                pending.push(qname_id, index, datatype);
                Ok(Rc::from(""))
            }
            None => self.read_channel_value_inline(reader, qname_id, datatype),
        }
    }

    fn read_channel_value_inline(
        &mut self,
        reader: &mut BitReader<'_>,
        qname_id: usize,
        datatype: Datatype,
    ) -> Result<Rc<str>> {
        let byte = self.byte();
        if self.options.preserve.lexical_values {
            Ok(Rc::from(datatype.decode_lexical(reader, byte)?))
        } else if datatype == Datatype::String {
            self.tables.read_value(reader, qname_id, &self.options, byte)
        } else {
            Ok(Rc::from(datatype.decode_typed(reader, byte)?))
        }
    }

    fn make_qname(&self, qname_id: usize, prefix: Option<Rc<str>>) -> QName {
        let qn = self.tables.qname(qname_id);
        QName { uri: qn.uri.clone(), local_name: qn.local_name.clone(), prefix }
    }
}
