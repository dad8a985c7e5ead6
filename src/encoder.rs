//! Encoder: drives the grammar automaton over events pushed by the caller.
//!
//! Every event writes its event code (and any inline identifiers) to the
//! structure stream; content values either follow inline or are routed to
//! the channel layer in the (pre-)compression modes. Learning and table
//! appends happen at exactly the same points as in the decoder, otherwise
//! the two sides drift apart.

use std::mem;
use std::rc::Rc;

use log::trace;

use crate::bit_width;
use crate::bitstream::BitWriter;
use crate::channel::Block;
use crate::context::{ContextTables, XSI_URI};
use crate::datatype::Datatype;
use crate::event::{Event, QName};
use crate::grammar::{
    second_level, third_level, EventLabel, Extension, GrammarId, GrammarKind, Grammars,
    RuntimeGrammars,
};
use crate::header;
use crate::integer::encode_nbit;
use crate::options::CodecOptions;
use crate::strings;
use crate::{Error, Result};

/// Encodes one document per instance.
pub struct Encoder {
    options: CodecOptions,
    tables: ContextTables,
    grammars: RuntimeGrammars,
    /// Struktur-Strom des aktuellen Blocks (bzw. der ganze Rumpf ohne
    /// Kanal-Schicht).
    writer: BitWriter,
    /// Fertige Bytes: Header und bereits geflushte Blöcke.
    output: Vec<u8>,
    /// Wiederaufnahme-Regeln der offenen Elemente.
    stack: Vec<GrammarId>,
    /// QName-globale Ids der offenen Elemente (Kanal-Kontext für CH).
    elements: Vec<usize>,
    current: GrammarId,
    block: Block,
    finished: bool,
}

impl Encoder {
    /// Creates a schema-less encoder.
    pub fn new(options: CodecOptions) -> Result<Self> {
        Self::with_grammars(options, &Grammars::schema_less())
    }

    /// Creates an encoder over a pre-built grammar set.
    pub fn with_grammars(options: CodecOptions, base: &Grammars) -> Result<Self> {
        options.validate()?;
        let mut header_writer = BitWriter::new();
        header::write_header(&mut header_writer, &options, false);
        let grammars = RuntimeGrammars::new(base);
        let current = grammars.document();
        Ok(Self {
            options,
            tables: base.tables().clone(),
            grammars,
            writer: BitWriter::new(),
            output: header_writer.into_vec(),
            stack: Vec::new(),
            elements: Vec::new(),
            current,
            block: Block::new(),
            finished: false,
        })
    }

    /// Pushes the next document event.
    pub fn write_event(&mut self, event: &Event) -> Result<()> {
        if self.finished {
            return Err(self.unexpected(event.name()));
        }
        trace!("encode {} in {:?}", event.name(), self.grammars.kind(self.current));
        match event {
            Event::StartDocument => self.start_document(),
            Event::EndDocument => self.end_document(),
            Event::StartElement { qname } => self.start_element(qname),
            Event::EndElement => self.end_element(),
            Event::Attribute { qname, value } => self.attribute(qname, value),
            Event::Characters { value } => self.characters(value),
            Event::NamespaceDeclaration { uri, prefix, local_element_ns } => {
                self.namespace_decl(uri, prefix, *local_element_ns)
            }
            Event::Comment { text } => {
                self.write_escape(Extension::Comment)?;
                strings::encode_literal(&mut self.writer, text);
                Ok(())
            }
            Event::ProcessingInstruction { target, data } => {
                self.write_escape(Extension::ProcessingInstr)?;
                strings::encode_literal(&mut self.writer, target);
                strings::encode_literal(&mut self.writer, data);
                Ok(())
            }
            Event::DocType { name, public_id, system_id, text } => {
                self.write_escape(Extension::DocType)?;
                for part in [name, public_id, system_id, text] {
                    strings::encode_literal(&mut self.writer, part);
                }
                Ok(())
            }
            Event::EntityReference { name } => {
                self.write_escape(Extension::EntityRef)?;
                strings::encode_literal(&mut self.writer, name);
                Ok(())
            }
            Event::SelfContained => {
                self.write_escape(Extension::SelfContained)?;
                self.writer.align_to_byte();
                Ok(())
            }
        }
    }

    /// Finalises the stream and returns the encoded bytes.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if !self.finished {
            return Err(self.unexpected("ED"));
        }
        if !self.options.channelised() {
            let body = mem::take(&mut self.writer).into_vec();
            self.output.extend(body);
        }
        Ok(self.output)
    }

    // ----- Event-Code-Schreiber -----

    fn byte(&self) -> bool {
        self.options.byte_oriented()
    }

    fn unexpected(&self, event: &'static str) -> Error {
        Error::UnexpectedEvent {
            event,
            grammar_state: format!("{:?}", self.grammars.kind(self.current)).into(),
        }
    }

    fn level2(&self) -> Vec<Extension> {
        second_level(self.grammars.kind(self.current), &self.options)
    }

    fn write_l1(&mut self, code: usize) {
        let byte = self.byte();
        let n1 = self.grammars.number_of_events(self.current);
        let w = bit_width::for_level(n1, !self.level2().is_empty());
        encode_nbit(&mut self.writer, code as u64, w, byte);
    }

    /// Writes the escape into level 2 (and level 3 for grouped events).
    fn write_escape(&mut self, ext: Extension) -> Result<()> {
        let l2 = self.level2();
        if l2.is_empty() {
            return Err(self.unexpected(ext_name(ext)));
        }
        let byte = self.byte();
        let n1 = self.grammars.number_of_events(self.current);
        let w1 = bit_width::for_level(n1, true);
        let w2 = bit_width::for_count(l2.len());
        if let Some(idx) = l2.iter().position(|e| *e == ext) {
            encode_nbit(&mut self.writer, n1 as u64, w1, byte);
            encode_nbit(&mut self.writer, idx as u64, w2, byte);
            return Ok(());
        }
        for (idx, selector) in l2.iter().enumerate() {
            let group = third_level(*selector, &self.options);
            if let Some(sub) = group.iter().position(|e| *e == ext) {
                encode_nbit(&mut self.writer, n1 as u64, w1, byte);
                encode_nbit(&mut self.writer, idx as u64, w2, byte);
                let w3 = bit_width::for_count(group.len());
                encode_nbit(&mut self.writer, sub as u64, w3, byte);
                return Ok(());
            }
        }
        Err(self.unexpected(ext_name(ext)))
    }

    /// The continuation state for undeclared/learned events in the current
    /// rule: built-in start tags move to their content rule, everything
    /// else stays.
    fn generic_next(&self) -> GrammarId {
        match self.grammars.kind(self.current) {
            GrammarKind::BuiltinStartTag { content } => content,
            _ => self.current,
        }
    }

    // ----- Ereignisse -----

    fn start_document(&mut self) -> Result<()> {
        let (code, next) = self
            .grammars
            .lookup_label(self.current, &EventLabel::StartDocument)
            .map(|(c, p)| (c, p.next))
            .ok_or_else(|| self.unexpected("SD"))?;
        self.write_l1(code);
        self.current = next.ok_or(Error::UnknownGrammar(self.current))?;
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        let (code, _) = self
            .grammars
            .lookup_label(self.current, &EventLabel::EndDocument)
            .ok_or_else(|| self.unexpected("ED"))?;
        self.write_l1(code);
        self.finished = true;
        if self.options.channelised() {
            self.flush_block()?;
        }
        Ok(())
    }

    fn start_element(&mut self, qname: &QName) -> Result<()> {
        let byte = self.byte();
        let known_uri = self.tables.find_uri(&qname.uri);
        let known_qname = self.tables.find_qname(&qname.uri, &qname.local_name);
        let hit = match (known_uri, known_qname) {
            (Some(u), Some(q)) => self
                .grammars
                .lookup_start_element(self.current, q, u)
                .map(|(code, p)| (code, p.label, p.next)),
            (Some(u), None) => self
                .grammars
                .lookup_start_element(self.current, usize::MAX, u)
                .map(|(code, p)| (code, p.label, p.next)),
            _ => self
                .grammars
                .lookup_label(self.current, &EventLabel::StartElementGeneric)
                .map(|(code, p)| (code, p.label, p.next)),
        };

        let (qid, resume) = match hit {
            Some((code, EventLabel::StartElement(q), next)) => {
                self.write_l1(code);
                (q, next)
            }
            Some((code, EventLabel::StartElementNs(u), next)) => {
                self.write_l1(code);
                let q = self.tables.write_local_name(&mut self.writer, u, &qname.local_name, byte);
                (q, next)
            }
            Some((code, EventLabel::StartElementGeneric, next)) => {
                self.write_l1(code);
                let u = self.tables.write_uri(&mut self.writer, &qname.uri, byte);
                let q = self.tables.write_local_name(&mut self.writer, u, &qname.local_name, byte);
                (q, next)
            }
            _ => {
                self.write_escape(Extension::StartElementGeneric)?;
                let u = self.tables.write_uri(&mut self.writer, &qname.uri, byte);
                let q = self.tables.write_local_name(&mut self.writer, u, &qname.local_name, byte);
                let resume = self.generic_next();
                self.grammars.learn(
                    self.current,
                    EventLabel::StartElement(q),
                    Some(resume),
                    &self.options,
                );
                (q, Some(resume))
            }
        };

        if self.options.preserve.prefixes {
            let uri_id = self.tables.qname(qid).uri_id;
            self.tables.write_prefix_ref(
                &mut self.writer,
                uri_id,
                qname.prefix.as_deref(),
                byte,
            );
        }
        self.stack.push(resume.ok_or(Error::UnknownGrammar(self.current))?);
        self.elements.push(qid);
        self.current = self.grammars.element_grammar(qid, &self.options);
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        match self.grammars.lookup_label(self.current, &EventLabel::EndElement) {
            Some((code, _)) => self.write_l1(code),
            None => {
                self.write_escape(Extension::UndeclaredEndElement)?;
                self.grammars.learn(self.current, EventLabel::EndElement, None, &self.options);
            }
        }
        self.current = self.stack.pop().ok_or_else(|| self.unexpected("EE"))?;
        self.elements.pop();
        Ok(())
    }

    fn attribute(&mut self, qname: &QName, value: &Rc<str>) -> Result<()> {
        if qname.uri.as_ref() == XSI_URI {
            match qname.local_name.as_ref() {
                "type" if self.level2().contains(&Extension::XsiType) => {
                    return self.xsi_type(value);
                }
                "nil" if self.level2().contains(&Extension::XsiNil)
                    && value_valid(Datatype::Boolean, value) =>
                {
                    return self.xsi_nil(value);
                }
                _ => {}
            }
        }

        let byte = self.byte();
        let known_uri = self.tables.find_uri(&qname.uri);
        let known_qname = self.tables.find_qname(&qname.uri, &qname.local_name);
        let hit = match (known_uri, known_qname) {
            (Some(u), Some(q)) => self
                .grammars
                .lookup_attribute(self.current, q, u)
                .map(|(code, p)| (code, p.label, p.next)),
            (Some(u), None) => self
                .grammars
                .lookup_attribute(self.current, usize::MAX, u)
                .map(|(code, p)| (code, p.label, p.next)),
            _ => self
                .grammars
                .lookup_label(self.current, &EventLabel::AttributeGeneric)
                .map(|(code, p)| (code, p.label, p.next)),
        };

        // Datentyp der getroffenen Produktion, sonst String
        let declared = match hit {
            Some((_, EventLabel::Attribute(_, dt), _)) => dt,
            _ => known_qname
                .and_then(|q| self.grammars.global_attribute(q))
                .unwrap_or(Datatype::String),
        };
        let valid = self.options.preserve.lexical_values
            || declared == Datatype::String
            || value_valid(declared, value);

        if let (Some((code, label, next)), true) = (hit, valid) {
            self.write_l1(code);
            let qid = match label {
                EventLabel::Attribute(q, _) => q,
                EventLabel::AttributeNs(u) => {
                    self.tables.write_local_name(&mut self.writer, u, &qname.local_name, byte)
                }
                _ => {
                    let u = self.tables.write_uri(&mut self.writer, &qname.uri, byte);
                    self.tables.write_local_name(&mut self.writer, u, &qname.local_name, byte)
                }
            };
            self.write_prefix_hint(qid, qname);
            self.emit_value(qid, value, declared)?;
            if let Some(next) = next {
                self.current = next;
            }
            return Ok(());
        }

        // Kein L1-Treffer oder ungültiger Typwert: generischer bzw.
        // invalid-Pfad über Level 2/3
        let ext = if hit.is_some() {
            Extension::AttributeInvalid
        } else {
            Extension::AttributeGeneric
        };
        self.write_escape(ext)?;
        let u = self.tables.write_uri(&mut self.writer, &qname.uri, byte);
        let qid = self.tables.write_local_name(&mut self.writer, u, &qname.local_name, byte);
        self.write_prefix_hint(qid, qname);
        self.grammars.learn(
            self.current,
            EventLabel::Attribute(qid, Datatype::String),
            Some(self.current),
            &self.options,
        );
        self.emit_value(qid, value, Datatype::String)
    }

    fn write_prefix_hint(&mut self, qid: usize, qname: &QName) {
        if self.options.preserve.prefixes {
            let uri_id = self.tables.qname(qid).uri_id;
            self.tables.write_prefix_ref(
                &mut self.writer,
                uri_id,
                qname.prefix.as_deref(),
                self.options.byte_oriented(),
            );
        }
    }

    fn xsi_type(&mut self, value: &Rc<str>) -> Result<()> {
        self.write_escape(Extension::XsiType)?;
        let byte = self.byte();
        let qid = self
            .tables
            .find_qname(XSI_URI, "type")
            .ok_or(Error::UnknownGrammar(self.current))?;
        // Der Typ-Name steht immer inline im Struktur-Strom, sonst könnte
        // der Decoder die Grammatik nicht vor den Kanalwerten wechseln
        self.tables.write_value(&mut self.writer, qid, value, &self.options, byte);
        if let Some(g) = self.grammars.type_by_local(type_local(value), &self.tables) {
            self.current = g;
        }
        Ok(())
    }

    fn xsi_nil(&mut self, value: &Rc<str>) -> Result<()> {
        self.write_escape(Extension::XsiNil)?;
        let byte = self.byte();
        let nil = matches!(value.trim(), "true" | "1");
        crate::boolean::encode(&mut self.writer, nil, byte);
        if nil {
            self.current = self.grammars.empty_grammar();
        }
        Ok(())
    }

    fn characters(&mut self, value: &Rc<str>) -> Result<()> {
        let qid = *self.elements.last().ok_or_else(|| self.unexpected("CH"))?;
        let hit = self
            .grammars
            .rule(self.current)
            .productions
            .iter()
            .enumerate()
            .find_map(|(code, p)| match p.label {
                EventLabel::Characters(dt) => Some((code, dt, p.next)),
                _ => None,
            });

        if let Some((code, dt, next)) = hit {
            let valid = self.options.preserve.lexical_values
                || dt == Datatype::String
                || value_valid(dt, value);
            if valid {
                self.write_l1(code);
                self.emit_value(qid, value, dt)?;
                if let Some(next) = next {
                    self.current = next;
                }
                return Ok(());
            }
        }

        self.write_escape(Extension::CharactersGeneric)?;
        let next = self.generic_next();
        self.grammars.learn(
            self.current,
            EventLabel::Characters(Datatype::String),
            Some(next),
            &self.options,
        );
        self.current = next;
        self.emit_value(qid, value, Datatype::String)
    }

    fn namespace_decl(&mut self, uri: &Rc<str>, prefix: &Rc<str>, local_element_ns: bool) -> Result<()> {
        self.write_escape(Extension::NamespaceDecl)?;
        let byte = self.byte();
        let uri_id = self.tables.write_uri(&mut self.writer, uri, byte);
        self.tables.write_prefix(&mut self.writer, uri_id, prefix, byte);
        crate::boolean::encode(&mut self.writer, local_element_ns, byte);
        Ok(())
    }

    // ----- Werte und Blöcke -----

    fn emit_value(&mut self, qid: usize, value: &Rc<str>, dt: Datatype) -> Result<()> {
        if self.options.channelised() {
            self.block.push(qid, value.clone(), dt);
            if self.block.total() as u64 >= u64::from(self.options.block_size) {
                self.flush_block()?;
            }
            Ok(())
        } else {
            let byte = self.byte();
            if self.options.preserve.lexical_values {
                dt.encode_lexical(&mut self.writer, value, byte);
                Ok(())
            } else if dt == Datatype::String {
                self.tables.write_value(&mut self.writer, qid, value, &self.options, byte);
                Ok(())
            } else {
                dt.encode_typed(&mut self.writer, value, byte)
            }
        }
    }

    fn flush_block(&mut self) -> Result<()> {
        let structure = mem::take(&mut self.writer).into_vec();
        let block = self.block.take();
        let layout = block.layout();
        trace!(
            "flush block: {} values, {} streams",
            block.total(),
            layout.stream_count()
        );

        let mut streams: Vec<Vec<u8>> = Vec::new();
        if !layout.split {
            let mut bytes = structure;
            let mut w = BitWriter::new();
            for q in layout.ordered() {
                self.encode_channel(&mut w, &block, q)?;
            }
            bytes.extend(w.into_vec());
            streams.push(bytes);
        } else {
            streams.push(structure);
            if !layout.small.is_empty() {
                let mut w = BitWriter::new();
                for &q in &layout.small {
                    self.encode_channel(&mut w, &block, q)?;
                }
                streams.push(w.into_vec());
            }
            for &q in &layout.large {
                let mut w = BitWriter::new();
                self.encode_channel(&mut w, &block, q)?;
                streams.push(w.into_vec());
            }
        }

        for stream in streams {
            if self.options.compression {
                self.output.extend(crate::channel::deflate(&stream)?);
            } else {
                self.output.extend(stream);
            }
        }
        Ok(())
    }

    fn encode_channel(&mut self, w: &mut BitWriter, block: &Block, qid: usize) -> Result<()> {
        let Some(values) = block.channel(qid) else {
            return Ok(());
        };
        for (value, dt) in values {
            if self.options.preserve.lexical_values {
                dt.encode_lexical(w, value, true);
            } else if *dt == Datatype::String {
                self.tables.write_value(w, qid, value, &self.options, true);
            } else {
                dt.encode_typed(w, value, true)?;
            }
        }
        Ok(())
    }
}

/// Lexikalische Validierung ohne Stream-Effekt.
fn value_valid(dt: Datatype, value: &str) -> bool {
    dt.encode_typed(&mut BitWriter::new(), value, false).is_ok()
}

/// Der lokale Teil eines QName-Lexikalwerts ("p:T" → "T").
fn type_local(value: &str) -> &str {
    value.rsplit(':').next().unwrap_or(value)
}

fn ext_name(ext: Extension) -> &'static str {
    match ext {
        Extension::UndeclaredEndElement => "EE",
        Extension::XsiType => "AT(xsi:type)",
        Extension::XsiNil => "AT(xsi:nil)",
        Extension::AttributeEscape | Extension::AttributeInvalid => "AT(invalid)",
        Extension::AttributeGeneric => "AT",
        Extension::NamespaceDecl => "NS",
        Extension::SelfContained => "SC",
        Extension::StartElementGeneric => "SE",
        Extension::CharactersGeneric => "CH",
        Extension::EntityRef => "ER",
        Extension::CommentPiEscape | Extension::Comment => "CM",
        Extension::ProcessingInstr => "PI",
        Extension::DocType => "DT",
    }
}
