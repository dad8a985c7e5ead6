//! End-to-end encode/decode round trips across the alignment and fidelity
//! configurations, plus the schema-informed paths.

use std::rc::Rc;

use exicore::grammar::{EventLabel, GrammarKind};
use exicore::{
    decode, decode_with_grammars, Alignment, CodecOptions, Datatype, Encoder, Event,
    GrammarBuilder, Grammars, Preserve, QName,
};

fn encode(options: CodecOptions, events: &[Event]) -> Vec<u8> {
    let mut enc = Encoder::new(options).unwrap();
    for e in events {
        enc.write_event(e).unwrap();
    }
    enc.finish().unwrap()
}

fn round_trip(options: CodecOptions, events: &[Event]) -> Vec<Event> {
    decode(&encode(options, events)).unwrap()
}

fn se(uri: &str, local: &str) -> Event {
    Event::StartElement { qname: QName::new(uri, local) }
}

fn at(uri: &str, local: &str, value: &str) -> Event {
    Event::Attribute { qname: QName::new(uri, local), value: Rc::from(value) }
}

fn ch(value: &str) -> Event {
    Event::Characters { value: Rc::from(value) }
}

fn nested_doc() -> Vec<Event> {
    vec![
        Event::StartDocument,
        se("urn:shop", "order"),
        at("", "id", "o-17"),
        se("urn:shop", "item"),
        ch("x"),
        Event::EndElement,
        se("urn:shop", "item"),
        ch("y"),
        Event::EndElement,
        se("urn:shop", "item"),
        // Dritter Wert trifft die lokale Werte-Partition
        ch("x"),
        Event::EndElement,
        Event::EndElement,
        Event::EndDocument,
    ]
}

#[test]
fn bit_packed_round_trip() {
    let events = nested_doc();
    assert_eq!(round_trip(CodecOptions::default(), &events), events);
}

#[test]
fn byte_aligned_round_trip() {
    let events = nested_doc();
    let options = CodecOptions::new().with_alignment(Alignment::ByteAligned);
    assert_eq!(round_trip(options, &events), events);
}

#[test]
fn pre_compression_round_trip() {
    let events = nested_doc();
    let options = CodecOptions::new().with_alignment(Alignment::PreCompression);
    assert_eq!(round_trip(options, &events), events);
}

#[test]
fn compression_round_trip() {
    let events = nested_doc();
    let options = CodecOptions::new().with_compression();
    assert_eq!(round_trip(options, &events), events);
}

/// Mehr als 100 Werte in einem Kanal erzwingen den geteilten Strom-Aufbau.
#[test]
fn compression_with_split_channels() {
    let mut events = vec![Event::StartDocument, se("urn:x", "log")];
    for i in 0..120 {
        events.push(se("urn:x", "entry"));
        events.push(ch(&format!("line {i}")));
        events.push(Event::EndElement);
    }
    events.push(Event::EndElement);
    events.push(Event::EndDocument);
    let options = CodecOptions::new().with_compression();
    assert_eq!(round_trip(options, &events), events);
}

/// Kleine Blockgröße: mehrere Blöcke, Tabellen bleiben über die Grenzen
/// hinweg synchron.
#[test]
fn compression_multi_block() {
    let mut events = vec![Event::StartDocument, se("urn:x", "root")];
    for i in 0..20 {
        events.push(se("urn:x", "v"));
        events.push(ch(&format!("w{}", i % 3)));
        events.push(Event::EndElement);
    }
    events.push(Event::EndElement);
    events.push(Event::EndDocument);
    let options = CodecOptions::new().with_compression().with_block_size(7);
    assert_eq!(round_trip(options, &events), events);
}

#[test]
fn full_fidelity_round_trip() {
    let options = CodecOptions::new().with_preserve(Preserve::ALL);
    let events = vec![
        Event::StartDocument,
        Event::Comment { text: Rc::from(" header ") },
        Event::StartElement { qname: QName::with_prefix("urn:a", "doc", "a") },
        Event::NamespaceDeclaration {
            uri: Rc::from("urn:a"),
            prefix: Rc::from("a"),
            local_element_ns: true,
        },
        Event::ProcessingInstruction { target: Rc::from("xml-model"), data: Rc::from("x") },
        ch("body"),
        Event::EntityReference { name: Rc::from("amp") },
        Event::EndElement,
        Event::Comment { text: Rc::from(" trailer ") },
        Event::EndDocument,
    ];
    assert_eq!(round_trip(options, &events), events);
}

#[test]
fn doctype_round_trip() {
    let options = CodecOptions::new().with_preserve(Preserve { dtd: true, ..Default::default() });
    let events = vec![
        Event::StartDocument,
        Event::DocType {
            name: Rc::from("html"),
            public_id: Rc::from(""),
            system_id: Rc::from("about:legacy-compat"),
            text: Rc::from(""),
        },
        se("", "html"),
        Event::EndElement,
        Event::EndDocument,
    ];
    assert_eq!(round_trip(options, &events), events);
}

/// Deklarierte Präfixe überleben den Umweg über die Präfix-Partition.
#[test]
fn prefix_round_trip() {
    let options = CodecOptions::new().with_preserve(Preserve::ALL);
    let events = vec![
        Event::StartDocument,
        Event::StartElement { qname: QName::new("urn:p", "root") },
        Event::NamespaceDeclaration {
            uri: Rc::from("urn:p"),
            prefix: Rc::from("p"),
            local_element_ns: true,
        },
        Event::StartElement { qname: QName::with_prefix("urn:p", "leaf", "p") },
        Event::EndElement,
        Event::EndElement,
        Event::EndDocument,
    ];
    let decoded = round_trip(options, &events);
    assert_eq!(decoded, events);
    let Event::StartElement { qname } = &decoded[3] else { panic!() };
    assert_eq!(qname.prefix.as_deref(), Some("p"));
}

/// max_builtin_productions = 0: jedes Ereignis läuft über den Escape-Pfad,
/// das Ergebnis bleibt trotzdem identisch.
#[test]
fn frozen_grammars_round_trip() {
    let mut events = vec![Event::StartDocument, se("urn:x", "r")];
    for _ in 0..4 {
        events.push(se("urn:x", "item"));
        events.push(ch("t"));
        events.push(Event::EndElement);
    }
    events.push(Event::EndElement);
    events.push(Event::EndDocument);
    let options = CodecOptions::new().with_max_builtin_productions(0);
    assert_eq!(round_trip(options, &events), events);
}

#[test]
fn element_grammar_cap_round_trip() {
    let mut events = vec![Event::StartDocument, se("urn:x", "r")];
    for name in ["a", "b", "c", "a", "b", "c"] {
        events.push(se("urn:x", name));
        events.push(Event::EndElement);
    }
    events.push(Event::EndElement);
    events.push(Event::EndDocument);
    let options = CodecOptions::new().with_max_builtin_element_grammars(1);
    assert_eq!(round_trip(options, &events), events);
}

/// value_partition_capacity = 0: kein Wert wird je als Treffer kodiert.
#[test]
fn disabled_value_partition_round_trip() {
    let events = nested_doc();
    let options = CodecOptions::new().with_value_partition_capacity(0);
    assert_eq!(round_trip(options, &events), events);
}

#[test]
fn lexical_values_round_trip_verbatim() {
    // Mit preserve.lexical_values bleibt "3.50" wörtlich erhalten
    let options =
        CodecOptions::new().with_preserve(Preserve { lexical_values: true, ..Default::default() });
    let events = vec![
        Event::StartDocument,
        se("", "n"),
        ch("3.50"),
        Event::EndElement,
        Event::EndDocument,
    ];
    assert_eq!(round_trip(options, &events), events);
}

// ----- Schema-informiert -----

struct Shop {
    grammars: Grammars,
}

/// <order id="..."><quantity>dezimal</quantity></order>, order nillable.
fn shop_schema() -> Shop {
    let mut b = GrammarBuilder::new();
    let uri = b.intern_uri("urn:shop");
    let order = b.intern_qname(uri, "order");
    let quantity = b.intern_qname(uri, "quantity");
    let id = b.intern_qname(uri, "id");

    let order_end = b.add_rule(GrammarKind::SchemaContent);
    b.add_production(order_end, EventLabel::EndElement, None).unwrap();
    let order_content = b.add_rule(GrammarKind::SchemaContent);
    b.add_production(order_content, EventLabel::StartElement(quantity), Some(order_end))
        .unwrap();
    let order_start = b.add_rule(GrammarKind::SchemaStartTag { nillable: true, castable: false });
    b.add_production(
        order_start,
        EventLabel::Attribute(id, Datatype::UnsignedInteger),
        Some(order_content),
    )
    .unwrap();
    b.add_production(order_start, EventLabel::StartElement(quantity), Some(order_end))
        .unwrap();

    let quantity_end = b.add_rule(GrammarKind::SchemaContent);
    b.add_production(quantity_end, EventLabel::EndElement, None).unwrap();
    let quantity_start = b.add_rule(GrammarKind::SchemaStartTag { nillable: false, castable: false });
    b.add_production(quantity_start, EventLabel::Characters(Datatype::Decimal), Some(quantity_end))
        .unwrap();

    b.declare_element(order, order_start).unwrap();
    b.declare_element(quantity, quantity_start).unwrap();
    b.declare_attribute(id, Datatype::UnsignedInteger);
    Shop { grammars: b.build() }
}

fn schema_round_trip(options: CodecOptions, g: &Grammars, events: &[Event]) -> Vec<Event> {
    let mut enc = Encoder::with_grammars(options, g).unwrap();
    for e in events {
        enc.write_event(e).unwrap();
    }
    decode_with_grammars(&enc.finish().unwrap(), g).unwrap()
}

#[test]
fn strict_schema_round_trip_normalises_values() {
    let shop = shop_schema();
    let events = vec![
        Event::StartDocument,
        se("urn:shop", "order"),
        at("urn:shop", "id", "42"),
        se("urn:shop", "quantity"),
        ch("3.50"),
        Event::EndElement,
        Event::EndElement,
        Event::EndDocument,
    ];
    let decoded =
        schema_round_trip(CodecOptions::new().with_strict(), &shop.grammars, &events);
    // Typisierte Werte kommen in kanonischer Form zurück
    assert_eq!(decoded[4], ch("3.5"));
    assert_eq!(decoded.len(), events.len());
    assert_eq!(decoded[1], events[1]);
    assert_eq!(decoded[2], at("urn:shop", "id", "42"));
}

#[test]
fn strict_rejects_undeclared_events() {
    let shop = shop_schema();
    let mut enc = Encoder::with_grammars(CodecOptions::new().with_strict(), &shop.grammars).unwrap();
    enc.write_event(&Event::StartDocument).unwrap();
    enc.write_event(&se("urn:shop", "order")).unwrap();
    assert!(enc.write_event(&Event::Comment { text: Rc::from("x") }).is_err());
}

/// Ein nicht schema-konformer Attributwert fällt auf AT(invalid) und die
/// String-Darstellung zurück.
#[test]
fn invalid_typed_value_falls_back_to_string() {
    let shop = shop_schema();
    let events = vec![
        Event::StartDocument,
        se("urn:shop", "order"),
        at("urn:shop", "id", "not-a-number"),
        se("urn:shop", "quantity"),
        ch("1"),
        Event::EndElement,
        Event::EndElement,
        Event::EndDocument,
    ];
    let decoded = schema_round_trip(CodecOptions::default(), &shop.grammars, &events);
    assert_eq!(decoded[2], at("urn:shop", "id", "not-a-number"));
}

#[test]
fn xsi_nil_empties_the_element() {
    let shop = shop_schema();
    let events = vec![
        Event::StartDocument,
        se("urn:shop", "order"),
        at(
            "http://www.w3.org/2001/XMLSchema-instance",
            "nil",
            "true",
        ),
        Event::EndElement,
        Event::EndDocument,
    ];
    let decoded =
        schema_round_trip(CodecOptions::new().with_strict(), &shop.grammars, &events);
    assert_eq!(decoded, events);
}

/// Abweichende Ereignisse sind ohne strict über die Escape-Codes erlaubt.
#[test]
fn non_strict_schema_allows_deviations() {
    let shop = shop_schema();
    let events = vec![
        Event::StartDocument,
        se("urn:shop", "order"),
        at("", "note", "extra"),
        se("urn:shop", "quantity"),
        ch("2"),
        Event::EndElement,
        Event::EndElement,
        Event::EndDocument,
    ];
    let decoded = schema_round_trip(CodecOptions::default(), &shop.grammars, &events);
    assert_eq!(decoded, events);
}

// ----- Normalisierung typisierter Werte -----

#[test]
fn typed_datetime_normalises_fraction() {
    let mut b = GrammarBuilder::new();
    let uri = b.intern_uri("");
    let stamp = b.intern_qname(uri, "stamp");
    let end = b.add_rule(GrammarKind::SchemaContent);
    b.add_production(end, EventLabel::EndElement, None).unwrap();
    let start = b.add_rule(GrammarKind::SchemaStartTag { nillable: false, castable: false });
    b.add_production(
        start,
        EventLabel::Characters(Datatype::DateTime(exicore::datetime::DateTimeKind::DateTime)),
        Some(end),
    )
    .unwrap();
    b.declare_element(stamp, start).unwrap();
    let g = b.build();

    let events = vec![
        Event::StartDocument,
        se("", "stamp"),
        ch("2026-08-30T12:00:00.0120"),
        Event::EndElement,
        Event::EndDocument,
    ];
    let decoded = schema_round_trip(CodecOptions::new().with_strict(), &g, &events);
    assert_eq!(decoded[2], ch("2026-08-30T12:00:00.012"));
}
