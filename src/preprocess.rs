//! Structural-dialect normalization of template trees.
//!
//! The two template dialects disagree on tag vocabulary and on where bare
//! text runs are legal. Before a template reaches a generator, paragraph
//! tags are renamed to the target dialect's vocabulary and text runs sitting
//! directly under row/list-item containers are wrapped in a synthetic
//! paragraph child, so the nesting matches what the generator expects.

use crate::xml::{XmlDocument, XmlElement, XmlNode};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Tag vocabulary and parent-nesting rules a template follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Print-style templates.
    Rml,
    /// Packaged-format templates.
    Sxw,
}

/// Structural tags of the print dialect: `1` means text runs directly under
/// the tag need a synthetic paragraph wrapper, `0` means they are legal
/// as-is.
static RML_PARENTS: Lazy<HashMap<&'static str, bool>> = Lazy::new(|| {
    HashMap::from([("tr", true), ("li", true), ("story", false), ("section", false)])
});

static SXW_PARENTS: Lazy<HashMap<&'static str, bool>> = Lazy::new(|| {
    HashMap::from([
        ("table-row", true),
        ("list-item", true),
        ("body", false),
        ("section", false),
    ])
});

/// Print-dialect tags renamed when retargeting a template to the packaged
/// dialect.
static RML_TO_SXW: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| HashMap::from([("para", "p")]));

impl Dialect {
    /// The dialect's paragraph tag, used for synthetic wrappers.
    pub fn paragraph_tag(self) -> &'static str {
        match self {
            Dialect::Rml => "para",
            Dialect::Sxw => "p",
        }
    }

    fn parents(self) -> &'static HashMap<&'static str, bool> {
        match self {
            Dialect::Rml => &RML_PARENTS,
            Dialect::Sxw => &SXW_PARENTS,
        }
    }
}

/// Normalizes a template tree in place for the given target dialect.
pub fn preprocess(doc: &mut XmlDocument, dialect: Dialect) {
    normalize(&mut doc.root, dialect);
}

fn normalize(el: &mut XmlElement, dialect: Dialect) {
    if dialect == Dialect::Sxw {
        if let Some(renamed) = RML_TO_SXW.get(el.name.as_str()) {
            el.name = (*renamed).to_string();
        }
    }

    let needs_wrapper = dialect
        .parents()
        .get(el.local_name())
        .copied()
        .unwrap_or(false);
    if needs_wrapper {
        for child in el.children.iter_mut() {
            if let XmlNode::Text(text) = child {
                if !text.trim().is_empty() {
                    let mut wrapper = XmlElement::new(dialect.paragraph_tag());
                    wrapper.children.push(XmlNode::Text(std::mem::take(text)));
                    *child = XmlNode::Element(wrapper);
                }
            }
        }
    }

    for child in el.children.iter_mut() {
        if let XmlNode::Element(c) = child {
            normalize(c, dialect);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packaged_dialect_renames_paragraph_tags() {
        let mut doc =
            XmlDocument::parse(b"<body><para>One</para><para>Two</para></body>").unwrap();
        preprocess(&mut doc, Dialect::Sxw);
        let tags: Vec<_> = doc.root.child_elements().map(|e| e.name.clone()).collect();
        assert_eq!(tags, vec!["p", "p"]);
    }

    #[test]
    fn print_dialect_keeps_paragraph_tags() {
        let mut doc = XmlDocument::parse(b"<story><para>One</para></story>").unwrap();
        preprocess(&mut doc, Dialect::Rml);
        assert_eq!(doc.root.child_elements().next().unwrap().name, "para");
    }

    #[test]
    fn text_under_row_containers_gets_a_synthetic_paragraph() {
        let mut doc = XmlDocument::parse(
            b"<table><table:table-row>Total</table:table-row></table>",
        )
        .unwrap();
        preprocess(&mut doc, Dialect::Sxw);
        let row = doc.root.child_elements().next().unwrap();
        let wrapper = row.child_elements().next().unwrap();
        assert_eq!(wrapper.name, "p");
        assert_eq!(wrapper.text(), "Total");
    }

    #[test]
    fn text_under_section_containers_is_left_alone() {
        let mut doc = XmlDocument::parse(b"<section>Loose text</section>").unwrap();
        preprocess(&mut doc, Dialect::Sxw);
        assert!(doc.root.child_elements().next().is_none());
        assert_eq!(doc.root.text(), "Loose text");
    }

    #[test]
    fn whitespace_runs_are_not_wrapped() {
        let mut doc =
            XmlDocument::parse(b"<list><li>  </li><li>item</li></list>").unwrap();
        preprocess(&mut doc, Dialect::Rml);
        let items: Vec<_> = doc.root.child_elements().collect();
        assert!(items[0].child_elements().next().is_none());
        let wrapper = items[1].child_elements().next().unwrap();
        assert_eq!(wrapper.name, "para");
        assert_eq!(wrapper.text(), "item");
    }
}
