//! Owned XML element tree for template and document-part manipulation.
//!
//! Templates, letterhead fragments and packaged-document parts all need
//! in-place structural edits (tag renames, element replacement, metadata
//! rewrites) before they are handed to a generator, so the event stream from
//! quick-xml is materialized into a small mutable tree and serialized back
//! once editing is done.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        XmlElement { name: name.into(), attrs: Vec::new(), children: Vec::new() }
    }

    /// Tag name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// Namespace prefix of the tag name, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.name.rsplit_once(':').map(|(prefix, _)| prefix)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let XmlNode::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }

    /// Replaces all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![XmlNode::Text(text.to_string())];
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        let text = std::str::from_utf8(bytes)?;
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event().map_err(|e| XmlError::Parse(e.to_string()))? {
                Event::Start(e) => {
                    stack.push(element_from_start(&e)?);
                }
                Event::Empty(e) => {
                    let el = element_from_start(&e)?;
                    attach(&mut stack, &mut root, XmlNode::Element(el))?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| XmlError::Malformed("unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, XmlNode::Element(el))?;
                }
                Event::Text(e) => {
                    let raw = std::str::from_utf8(e.as_ref())?;
                    let text = quick_xml::escape::unescape(raw)
                        .map_err(|e| XmlError::Parse(e.to_string()))?
                        .into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(text));
                    }
                }
                Event::CData(e) => {
                    let text = std::str::from_utf8(e.as_ref())?.to_string();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(text));
                    }
                }
                Event::Comment(e) => {
                    let text = std::str::from_utf8(e.as_ref())?.to_string();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Comment(text));
                    }
                }
                Event::Eof => break,
                // Declarations, processing instructions and doctypes carry
                // nothing the pipeline edits.
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Malformed("unclosed element at end of input".into()));
        }
        let root = root.ok_or_else(|| XmlError::Malformed("document has no root element".into()))?;
        Ok(XmlDocument { root })
    }

    /// Serializes the tree back to UTF-8 bytes, without an XML declaration.
    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner().into_inner())
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let raw = std::str::from_utf8(&attr.value)?;
        let value = quick_xml::escape::unescape(raw)
            .map_err(|e| XmlError::Parse(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(XmlElement { name, attrs, children: Vec::new() })
}

fn attach(
    stack: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
    node: XmlNode,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    match node {
        XmlNode::Element(el) => {
            if root.is_some() {
                return Err(XmlError::Malformed("multiple root elements".into()));
            }
            *root = Some(el);
            Ok(())
        }
        // Top-level text/comments outside the root are dropped.
        _ => Ok(()),
    }
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    el: &XmlElement,
) -> Result<(), XmlError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if el.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| XmlError::Parse(e.to_string()))?;
        return Ok(());
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| XmlError::Parse(e.to_string()))?;
    for child in &el.children {
        match child {
            XmlNode::Element(c) => write_element(writer, c)?,
            XmlNode::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(|e| XmlError::Parse(e.to_string()))?,
            XmlNode::Comment(c) => writer
                .write_event(Event::Comment(BytesText::from_escaped(c.as_str())))
                .map_err(|e| XmlError::Parse(e.to_string()))?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(|e| XmlError::Parse(e.to_string()))?;
    Ok(())
}

/// Finds the first descendant element with the given tag name, in document
/// (depth-first, pre-order) order. The root itself is not a candidate.
///
/// Returns the path of child indices leading to the match's parent, plus the
/// match's index within that parent's children.
pub fn find_descendant(root: &XmlElement, tag: &str) -> Option<(Vec<usize>, usize)> {
    let mut path = Vec::new();
    find_descendant_inner(root, tag, &mut path)
}

fn find_descendant_inner(
    el: &XmlElement,
    tag: &str,
    path: &mut Vec<usize>,
) -> Option<(Vec<usize>, usize)> {
    for (i, child) in el.children.iter().enumerate() {
        if let XmlNode::Element(c) = child {
            if c.name == tag {
                return Some((path.clone(), i));
            }
            path.push(i);
            if let Some(hit) = find_descendant_inner(c, tag, path) {
                return Some(hit);
            }
            path.pop();
        }
    }
    None
}

/// Walks a child-index path produced by [`find_descendant`] and returns the
/// element it ends at.
pub fn element_at_mut<'a>(
    mut el: &'a mut XmlElement,
    path: &[usize],
) -> Option<&'a mut XmlElement> {
    for &i in path {
        match el.children.get_mut(i)? {
            XmlNode::Element(c) => el = c,
            _ => return None,
        }
    }
    Some(el)
}

/// Explicit namespace prefix -> URI table for metadata lookups.
///
/// The fixed tables below carry the well-known prefixes of the two packaged
/// dialects; `xmlns:` declarations found on a document's root take
/// precedence over them when resolving.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NsTable {
    prefixes: HashMap<String, String>,
}

const SXW_NAMESPACES: &[(&str, &str)] = &[
    ("office", "http://openoffice.org/2000/office"),
    ("meta", "http://openoffice.org/2000/meta"),
    ("text", "http://openoffice.org/2000/text"),
    ("table", "http://openoffice.org/2000/table"),
    ("style", "http://openoffice.org/2000/style"),
];

const ODT_NAMESPACES: &[(&str, &str)] = &[
    ("office", "urn:oasis:names:tc:opendocument:xmlns:office:1.0"),
    ("meta", "urn:oasis:names:tc:opendocument:xmlns:meta:1.0"),
    ("text", "urn:oasis:names:tc:opendocument:xmlns:text:1.0"),
    ("table", "urn:oasis:names:tc:opendocument:xmlns:table:1.0"),
    ("style", "urn:oasis:names:tc:opendocument:xmlns:style:1.0"),
];

impl NsTable {
    fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        NsTable {
            prefixes: pairs
                .iter()
                .map(|(p, u)| (p.to_string(), u.to_string()))
                .collect(),
        }
    }

    /// Namespace table of the OpenOffice 1.0 dialect.
    pub fn sxw() -> Self {
        Self::from_pairs(SXW_NAMESPACES)
    }

    /// Namespace table of the OpenDocument dialect.
    pub fn odt() -> Self {
        Self::from_pairs(ODT_NAMESPACES)
    }

    pub fn for_kind(kind: &str) -> Self {
        if kind == "odt" { Self::odt() } else { Self::sxw() }
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Overlays `xmlns:` declarations found on an element (usually the
    /// document root) onto the table.
    pub fn with_declarations_from(mut self, el: &XmlElement) -> Self {
        for (k, v) in &el.attrs {
            if let Some(prefix) = k.strip_prefix("xmlns:") {
                self.prefixes.insert(prefix.to_string(), v.clone());
            }
        }
        self
    }

    /// Resolves a possibly-prefixed name into `(namespace URI, local name)`.
    pub fn resolve<'a>(&self, name: &'a str) -> (Option<&str>, &'a str) {
        match name.split_once(':') {
            Some((prefix, local)) => (self.uri(prefix), local),
            None => (None, name),
        }
    }

    /// True when `name` resolves to the given namespace URI and local name.
    pub fn matches(&self, name: &str, uri: &str, local: &str) -> bool {
        match self.resolve(name) {
            (Some(resolved), resolved_local) => resolved == uri && resolved_local == local,
            _ => false,
        }
    }
}
