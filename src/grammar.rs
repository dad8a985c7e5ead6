//! Grammar/production engine.
//!
//! Grammars live in an arena of rules addressed by index. Schema-informed
//! rules are built once via [`GrammarBuilder`], are immutable afterwards and
//! keep their productions in canonical sort order so event codes never
//! depend on insertion order. Built-in rules start (almost) empty and learn
//! appended productions per document; [`RuntimeGrammars`] clones the base
//! arena so learned state never leaks across documents.
//!
//! Event codes have up to three levels. Level 1 indexes the rule's explicit
//! productions; its width gains one code point when a second level exists.
//! Level 2 holds the fidelity-dependent extensibility events, level 3 the
//! grouped alternatives below a level-2 selector (comment/PI, invalid/
//! generic attribute).

use crate::context::ContextTables;
use crate::datatype::Datatype;
use crate::options::CodecOptions;
use crate::{Error, FastHashMap, Result};

pub type GrammarId = usize;

/// The event shape a production matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLabel {
    StartDocument,
    EndDocument,
    /// SE(qname), QName-global-Id.
    StartElement(usize),
    /// SE(uri:*), URI-Id.
    StartElementNs(usize),
    /// SE(*).
    StartElementGeneric,
    EndElement,
    /// AT(qname) mit deklariertem Datentyp.
    Attribute(usize, Datatype),
    /// AT(uri:*), URI-Id.
    AttributeNs(usize),
    /// AT(*).
    AttributeGeneric,
    Characters(Datatype),
}

/// An extensibility event reachable through the level-2/3 escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    UndeclaredEndElement,
    XsiType,
    XsiNil,
    /// Selektor für die Level-3-Gruppe AT(invalid)/AT(*).
    AttributeEscape,
    AttributeInvalid,
    AttributeGeneric,
    NamespaceDecl,
    SelfContained,
    StartElementGeneric,
    CharactersGeneric,
    EntityRef,
    /// Selektor für die Level-3-Gruppe CM/PI.
    CommentPiEscape,
    Comment,
    ProcessingInstr,
    DocType,
}

/// One edge of the automaton. `next` is `None` where the encoder pops its
/// element stack instead of following an edge (EE, ED).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    pub label: EventLabel,
    pub next: Option<GrammarId>,
}

/// What a rule is, which drives its level-2 events and learning behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarKind {
    Document,
    DocContent,
    DocEnd,
    SchemaStartTag { nillable: bool, castable: bool },
    SchemaContent,
    /// Inhaltsmodell nach xsi:nil="true": nur EE.
    SchemaEmpty,
    BuiltinStartTag { content: GrammarId },
    BuiltinContent,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: GrammarKind,
    pub productions: Vec<Production>,
    /// Gelernte Produktionen werden angehängt; `false` friert die Regel ein.
    learning: bool,
    /// Anzahl der Seed-Produktionen, zählt nicht gegen max_builtin_productions.
    fixed: usize,
}

impl Rule {
    fn new(kind: GrammarKind, productions: Vec<Production>, learning: bool) -> Self {
        let fixed = productions.len();
        Self { kind, productions, learning, fixed }
    }
}

/// The immutable grammar set a document starts from.
#[derive(Debug, Clone)]
pub struct Grammars {
    rules: Vec<Rule>,
    document: GrammarId,
    doc_content: GrammarId,
    doc_end: GrammarId,
    empty: GrammarId,
    /// Deklarierte globale Elemente: QName-global-Id → StartTag-Regel.
    elements: FastHashMap<usize, GrammarId>,
    /// Benannte Typen für xsi:type-Casts.
    types: FastHashMap<usize, GrammarId>,
    /// Global deklarierte Attribute und ihre Datentypen.
    attributes: FastHashMap<usize, Datatype>,
    /// String-Tabellen mit den beim Schema-Bau internierten Namen; Encoder
    /// und Decoder starten von einer Kopie dieses Stands.
    tables: ContextTables,
    schema_informed: bool,
}

impl Grammars {
    /// The schema-less grammar set: document skeleton only, every element
    /// gets a freshly learned built-in grammar at runtime.
    pub fn schema_less() -> Self {
        GrammarBuilder::new().build()
    }

    pub fn document(&self) -> GrammarId {
        self.document
    }

    pub fn is_schema_informed(&self) -> bool {
        self.schema_informed
    }

    /// The string tables as they stood after schema registration.
    pub fn tables(&self) -> &ContextTables {
        &self.tables
    }
}

/// Builds a schema-informed grammar set. The caller registers rules and
/// productions (usually a schema-compiler collaborator); productions are
/// kept canonically sorted on every insert.
pub struct GrammarBuilder {
    grammars: Grammars,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        let mut rules = Vec::new();
        let document = rules.len();
        rules.push(Rule::new(GrammarKind::Document, Vec::new(), false));
        let doc_content = rules.len();
        rules.push(Rule::new(GrammarKind::DocContent, Vec::new(), false));
        let doc_end = rules.len();
        rules.push(Rule::new(GrammarKind::DocEnd, Vec::new(), false));
        let empty = rules.len();
        rules.push(Rule::new(
            GrammarKind::SchemaEmpty,
            vec![Production { label: EventLabel::EndElement, next: None }],
            false,
        ));
        rules[document].productions.push(Production {
            label: EventLabel::StartDocument,
            next: Some(doc_content),
        });
        rules[document].fixed = 1;
        rules[doc_content].productions.push(Production {
            label: EventLabel::StartElementGeneric,
            next: Some(doc_end),
        });
        rules[doc_content].fixed = 1;
        rules[doc_end].productions.push(Production {
            label: EventLabel::EndDocument,
            next: None,
        });
        rules[doc_end].fixed = 1;
        Self {
            grammars: Grammars {
                rules,
                document,
                doc_content,
                doc_end,
                empty,
                elements: FastHashMap::default(),
                types: FastHashMap::default(),
                attributes: FastHashMap::default(),
                tables: ContextTables::new(),
                schema_informed: false,
            },
        }
    }

    /// Interns a URI for use in production labels.
    pub fn intern_uri(&mut self, uri: &str) -> usize {
        self.grammars.tables.intern_uri(uri)
    }

    /// Interns a qualified name and returns its global id.
    pub fn intern_qname(&mut self, uri_id: usize, local: &str) -> usize {
        self.grammars.tables.intern_qname(uri_id, local)
    }

    pub fn tables(&self) -> &ContextTables {
        &self.grammars.tables
    }

    /// Adds an empty schema rule and returns its id.
    pub fn add_rule(&mut self, kind: GrammarKind) -> GrammarId {
        let id = self.grammars.rules.len();
        self.grammars.rules.push(Rule::new(kind, Vec::new(), false));
        id
    }

    /// Inserts a production in canonical order. A duplicate label with the
    /// same target is a no-op; with a different target it is a hard error.
    pub fn add_production(
        &mut self,
        rule: GrammarId,
        label: EventLabel,
        next: Option<GrammarId>,
    ) -> Result<()> {
        let tables = &self.grammars.tables;
        let r = self.grammars.rules.get_mut(rule).ok_or(Error::UnknownGrammar(rule))?;
        if let Some(existing) = r.productions.iter().find(|p| p.label == label) {
            if existing.next == next {
                return Ok(());
            }
            return Err(Error::conflict(rule, format!("{label:?}")));
        }
        r.productions.push(Production { label, next });
        r.productions
            .sort_by(|a, b| sort_key(&a.label, tables).cmp(&sort_key(&b.label, tables)));
        r.fixed = r.productions.len();
        Ok(())
    }

    /// Declares a global element: registers its start-tag rule and adds
    /// SE(qname) to the document-content rule.
    pub fn declare_element(&mut self, qname_id: usize, start_tag: GrammarId) -> Result<()> {
        self.grammars.elements.insert(qname_id, start_tag);
        let doc_content = self.grammars.doc_content;
        let doc_end = self.grammars.doc_end;
        self.add_production(doc_content, EventLabel::StartElement(qname_id), Some(doc_end))
    }

    /// Declares a named type reachable via xsi:type.
    pub fn declare_type(&mut self, qname_id: usize, grammar: GrammarId) {
        self.grammars.types.insert(qname_id, grammar);
    }

    /// Declares a global attribute and its datatype.
    pub fn declare_attribute(&mut self, qname_id: usize, datatype: Datatype) {
        self.grammars.attributes.insert(qname_id, datatype);
    }

    pub fn empty_grammar(&self) -> GrammarId {
        self.grammars.empty
    }

    pub fn build(mut self) -> Grammars {
        self.grammars.schema_informed = !self.grammars.elements.is_empty();
        // Schema-Namen gehören zur Basis, clear() darf sie nicht kappen
        self.grammars.tables.freeze();
        self.grammars
    }
}

/// Canonical production order: event category first (start-element before
/// attribute before character content), then local name, then URI.
fn sort_key<'a>(
    label: &EventLabel,
    tables: &'a ContextTables,
) -> (u8, &'a str, &'a str) {
    match *label {
        EventLabel::StartElement(q) => {
            let qn = tables.qname(q);
            (0, &qn.local_name, &qn.uri)
        }
        EventLabel::StartElementNs(u) => (1, "", tables.uri(u)),
        EventLabel::StartElementGeneric => (2, "", ""),
        EventLabel::Attribute(q, _) => {
            let qn = tables.qname(q);
            (3, &qn.local_name, &qn.uri)
        }
        EventLabel::AttributeNs(u) => (4, "", tables.uri(u)),
        EventLabel::AttributeGeneric => (5, "", ""),
        EventLabel::Characters(_) => (6, "", ""),
        EventLabel::EndElement => (7, "", ""),
        EventLabel::StartDocument => (8, "", ""),
        EventLabel::EndDocument => (9, "", ""),
    }
}

/// The level-2 event list of a rule under the given options. An empty list
/// means no escape code point exists.
pub fn second_level(kind: GrammarKind, o: &CodecOptions) -> Vec<Extension> {
    let p = o.preserve;
    let mut l2 = Vec::new();
    let comment_pi = p.comments || p.pis;
    match kind {
        GrammarKind::Document => {
            if comment_pi {
                l2.push(Extension::CommentPiEscape);
            }
        }
        GrammarKind::DocContent => {
            if p.dtd {
                l2.push(Extension::DocType);
            }
            if comment_pi {
                l2.push(Extension::CommentPiEscape);
            }
        }
        GrammarKind::DocEnd => {
            if comment_pi {
                l2.push(Extension::CommentPiEscape);
            }
        }
        GrammarKind::SchemaStartTag { nillable, castable } => {
            if o.strict {
                if castable {
                    l2.push(Extension::XsiType);
                }
                if nillable {
                    l2.push(Extension::XsiNil);
                }
            } else {
                l2.push(Extension::UndeclaredEndElement);
                l2.push(Extension::XsiType);
                l2.push(Extension::XsiNil);
                l2.push(Extension::AttributeEscape);
                if p.prefixes {
                    l2.push(Extension::NamespaceDecl);
                }
                if o.self_contained {
                    l2.push(Extension::SelfContained);
                }
                l2.push(Extension::StartElementGeneric);
                l2.push(Extension::CharactersGeneric);
                if p.dtd {
                    l2.push(Extension::EntityRef);
                }
                if comment_pi {
                    l2.push(Extension::CommentPiEscape);
                }
            }
        }
        GrammarKind::SchemaContent => {
            if !o.strict {
                l2.push(Extension::UndeclaredEndElement);
                l2.push(Extension::StartElementGeneric);
                l2.push(Extension::CharactersGeneric);
                if p.dtd {
                    l2.push(Extension::EntityRef);
                }
                if comment_pi {
                    l2.push(Extension::CommentPiEscape);
                }
            }
        }
        GrammarKind::SchemaEmpty => {
            if !o.strict && comment_pi {
                l2.push(Extension::CommentPiEscape);
            }
        }
        GrammarKind::BuiltinStartTag { .. } => {
            l2.push(Extension::UndeclaredEndElement);
            l2.push(Extension::AttributeGeneric);
            if p.prefixes {
                l2.push(Extension::NamespaceDecl);
            }
            if o.self_contained {
                l2.push(Extension::SelfContained);
            }
            l2.push(Extension::StartElementGeneric);
            l2.push(Extension::CharactersGeneric);
            if p.dtd {
                l2.push(Extension::EntityRef);
            }
            if comment_pi {
                l2.push(Extension::CommentPiEscape);
            }
        }
        GrammarKind::BuiltinContent => {
            l2.push(Extension::StartElementGeneric);
            l2.push(Extension::CharactersGeneric);
            if p.dtd {
                l2.push(Extension::EntityRef);
            }
            if comment_pi {
                l2.push(Extension::CommentPiEscape);
            }
        }
    }
    l2
}

/// The level-3 group below a level-2 selector.
pub fn third_level(selector: Extension, o: &CodecOptions) -> Vec<Extension> {
    match selector {
        Extension::CommentPiEscape => {
            let mut g = Vec::new();
            if o.preserve.comments {
                g.push(Extension::Comment);
            }
            if o.preserve.pis {
                g.push(Extension::ProcessingInstr);
            }
            g
        }
        Extension::AttributeEscape => {
            vec![Extension::AttributeInvalid, Extension::AttributeGeneric]
        }
        _ => Vec::new(),
    }
}

/// The per-document grammar state: base rules plus learned productions and
/// built-in element grammars.
#[derive(Debug)]
pub struct RuntimeGrammars {
    rules: Vec<Rule>,
    document: GrammarId,
    empty: GrammarId,
    elements: FastHashMap<usize, GrammarId>,
    types: FastHashMap<usize, GrammarId>,
    attributes: FastHashMap<usize, Datatype>,
    builtin_elements: u32,
    fallback: Option<GrammarId>,
}

impl RuntimeGrammars {
    pub fn new(base: &Grammars) -> Self {
        Self {
            rules: base.rules.clone(),
            document: base.document,
            empty: base.empty,
            elements: base.elements.clone(),
            types: base.types.clone(),
            attributes: base.attributes.clone(),
            builtin_elements: 0,
            fallback: None,
        }
    }

    pub fn document(&self) -> GrammarId {
        self.document
    }

    pub fn empty_grammar(&self) -> GrammarId {
        self.empty
    }

    pub fn rule(&self, id: GrammarId) -> &Rule {
        &self.rules[id]
    }

    pub fn kind(&self, id: GrammarId) -> GrammarKind {
        self.rules[id].kind
    }

    pub fn number_of_events(&self, id: GrammarId) -> usize {
        self.rules[id].productions.len()
    }

    pub fn lookup(&self, id: GrammarId, code: usize) -> Option<&Production> {
        self.rules[id].productions.get(code)
    }

    /// Finds the level-1 production matching SE of this qname: exact first,
    /// then the URI wildcard, then SE(*).
    pub fn lookup_start_element(
        &self,
        id: GrammarId,
        qname_id: usize,
        uri_id: usize,
    ) -> Option<(usize, &Production)> {
        let productions = &self.rules[id].productions;
        for wanted in [
            EventLabel::StartElement(qname_id),
            EventLabel::StartElementNs(uri_id),
            EventLabel::StartElementGeneric,
        ] {
            if let Some(hit) = productions.iter().position(|p| p.label == wanted) {
                return Some((hit, &productions[hit]));
            }
        }
        None
    }

    /// Finds the level-1 production matching AT of this qname.
    pub fn lookup_attribute(
        &self,
        id: GrammarId,
        qname_id: usize,
        uri_id: usize,
    ) -> Option<(usize, &Production)> {
        let productions = &self.rules[id].productions;
        for (i, p) in productions.iter().enumerate() {
            match p.label {
                EventLabel::Attribute(q, _) if q == qname_id => return Some((i, p)),
                _ => {}
            }
        }
        for wanted in [EventLabel::AttributeNs(uri_id), EventLabel::AttributeGeneric] {
            if let Some(hit) = productions.iter().position(|p| p.label == wanted) {
                return Some((hit, &productions[hit]));
            }
        }
        None
    }

    /// Finds the level-1 production with exactly this label.
    pub fn lookup_label(&self, id: GrammarId, label: &EventLabel) -> Option<(usize, &Production)> {
        self.rules[id]
            .productions
            .iter()
            .position(|p| p.label == *label)
            .map(|i| (i, &self.rules[id].productions[i]))
    }

    /// The type grammar registered for this qname, if any.
    pub fn type_grammar(&self, qname_id: usize) -> Option<GrammarId> {
        self.types.get(&qname_id).copied()
    }

    /// The datatype of a globally declared attribute.
    pub fn global_attribute(&self, qname_id: usize) -> Option<Datatype> {
        self.attributes.get(&qname_id).copied()
    }

    /// Resolves an xsi:type value by its local part. When several registered
    /// types share the local name, the smallest qname id wins so both sides
    /// pick the same grammar regardless of hash order.
    pub fn type_by_local(&self, local: &str, tables: &ContextTables) -> Option<GrammarId> {
        self.types
            .iter()
            .filter(|(&q, _)| tables.qname(q).local_name.as_ref() == local)
            .min_by_key(|(&q, _)| q)
            .map(|(_, &g)| g)
    }

    /// Returns the start-tag rule for an element, creating a built-in
    /// grammar pair on first encounter. Once `max_builtin_element_grammars`
    /// is reached, further elements share one non-learning fallback pair.
    pub fn element_grammar(&mut self, qname_id: usize, o: &CodecOptions) -> GrammarId {
        if let Some(&g) = self.elements.get(&qname_id) {
            return g;
        }
        if let Some(cap) = o.max_builtin_element_grammars {
            if self.builtin_elements >= cap {
                return self.fallback_grammar();
            }
        }
        let start = self.push_builtin_pair(true);
        self.elements.insert(qname_id, start);
        self.builtin_elements += 1;
        start
    }

    fn fallback_grammar(&mut self) -> GrammarId {
        if let Some(g) = self.fallback {
            return g;
        }
        let g = self.push_builtin_pair(false);
        self.fallback = Some(g);
        g
    }

    fn push_builtin_pair(&mut self, learning: bool) -> GrammarId {
        let content = self.rules.len() + 1;
        let start = self.rules.len();
        self.rules.push(Rule::new(
            GrammarKind::BuiltinStartTag { content },
            Vec::new(),
            learning,
        ));
        self.rules.push(Rule {
            kind: GrammarKind::BuiltinContent,
            productions: vec![Production { label: EventLabel::EndElement, next: None }],
            learning,
            fixed: 1,
        });
        start
    }

    /// Appends a learned production, honouring the learning flag and the
    /// per-rule cap. Both sides call this at the same points so the grammars
    /// stay in sync.
    pub fn learn(
        &mut self,
        id: GrammarId,
        label: EventLabel,
        next: Option<GrammarId>,
        o: &CodecOptions,
    ) {
        let rule = &self.rules[id];
        if !rule.learning {
            return;
        }
        if let Some(cap) = o.max_builtin_productions {
            if (rule.productions.len() - rule.fixed) as u64 >= u64::from(cap) {
                return;
            }
        }
        if rule.productions.iter().any(|p| p.label == label) {
            return;
        }
        self.rules[id].productions.push(Production { label, next });
    }
}
