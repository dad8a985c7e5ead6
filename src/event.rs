//! The event stream model.
//!
//! A document is a flat sequence of events between `StartDocument` and
//! `EndDocument`. The codec consumes and produces exactly this sequence; a
//! round trip through encode and decode yields the same events apart from
//! typed-value normalisation.

use std::fmt;
use std::rc::Rc;

/// A qualified name: URI, local name, optional prefix hint.
///
/// The prefix only matters when preserve.prefixes is on; equality and
/// hashing ignore it.
#[derive(Debug, Clone)]
pub struct QName {
    pub uri: Rc<str>,
    pub local_name: Rc<str>,
    pub prefix: Option<Rc<str>>,
}

impl QName {
    pub fn new(uri: &str, local_name: &str) -> Self {
        Self { uri: Rc::from(uri), local_name: Rc::from(local_name), prefix: None }
    }

    pub fn with_prefix(uri: &str, local_name: &str, prefix: &str) -> Self {
        Self {
            uri: Rc::from(uri),
            local_name: Rc::from(local_name),
            prefix: Some(Rc::from(prefix)),
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri && self.local_name == other.local_name
    }
}

impl Eq for QName {}

impl std::hash::Hash for QName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.local_name.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uri.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.uri, self.local_name)
        }
    }
}

/// One event of the document stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartDocument,
    EndDocument,
    StartElement { qname: QName },
    EndElement,
    Attribute { qname: QName, value: Rc<str> },
    Characters { value: Rc<str> },
    /// xmlns-Deklaration; `local_element_ns` markiert den Präfix des
    /// tragenden Elements.
    NamespaceDeclaration { uri: Rc<str>, prefix: Rc<str>, local_element_ns: bool },
    Comment { text: Rc<str> },
    ProcessingInstruction { target: Rc<str>, data: Rc<str> },
    DocType { name: Rc<str>, public_id: Rc<str>, system_id: Rc<str>, text: Rc<str> },
    EntityReference { name: Rc<str> },
    SelfContained,
}

impl Event {
    /// Short display name, matches the usual event mnemonics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartDocument => "SD",
            Self::EndDocument => "ED",
            Self::StartElement { .. } => "SE",
            Self::EndElement => "EE",
            Self::Attribute { .. } => "AT",
            Self::Characters { .. } => "CH",
            Self::NamespaceDeclaration { .. } => "NS",
            Self::Comment { .. } => "CM",
            Self::ProcessingInstruction { .. } => "PI",
            Self::DocType { .. } => "DT",
            Self::EntityReference { .. } => "ER",
            Self::SelfContained => "SC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    /// Präfix zählt nicht zur Identität eines QName.
    #[test]
    fn qname_identity_ignores_prefix() {
        let a = QName::new("urn:x", "item");
        let b = QName::with_prefix("urn:x", "item", "x");
        assert_eq!(a, b);

        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn qname_display() {
        assert_eq!(QName::new("", "root").to_string(), "root");
        assert_eq!(QName::new("urn:x", "item").to_string(), "{urn:x}item");
    }

    #[test]
    fn event_names() {
        assert_eq!(Event::StartDocument.name(), "SD");
        assert_eq!(Event::SelfContained.name(), "SC");
    }
}
