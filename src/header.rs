//! Corporate letterhead merging.
//!
//! A company's header/footer fragment is spliced into a body template by tag
//! name: each top-level element of the fragment either replaces the first
//! matching element of the body (by document order) or, when the fragment
//! element carries a `position` attribute, is appended as an extra child of
//! the match. The company logo is handled at the byte level before the
//! fragment is parsed, so commenting an image out remains reversible.

use crate::context::CompanyProfile;
use crate::xml::{XmlDocument, XmlError, XmlNode, element_at_mut, find_descendant};
use log::debug;

/// Which of the two configured letterhead fragments to merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// The primary corporate header.
    Main,
    /// The alternate (internal) header.
    Alternate,
}

/// Fixed-size logo image element spliced into the page-graphics region when
/// the company has a logo and the fragment does not reference one.
const LOGO_IMAGE: &str =
    r#"<pageGraphics> <image x="10" y="26cm" height="70" width="90" >[[company.logo]] </image> "#;

/// Merges the selected letterhead fragment into `doc` in place.
///
/// Fragment elements with no matching tag anywhere in the document are
/// dropped silently.
pub fn add_header(
    doc: &mut XmlDocument,
    company: &CompanyProfile,
    kind: HeaderKind,
) -> Result<(), XmlError> {
    let fragment_src = match kind {
        HeaderKind::Main => &company.rml_header,
        HeaderKind::Alternate => &company.rml_header2,
    };
    let fragment_src = prepare_logo(fragment_src, company.has_logo());
    let fragment = XmlDocument::parse(fragment_src.as_bytes())?;

    for child in fragment.root.children {
        let XmlNode::Element(el) = child else { continue };
        let Some((parent_path, index)) = find_descendant(&doc.root, &el.name) else {
            debug!("letterhead element <{}> has no match in the document, dropping", el.name);
            continue;
        };
        let parent = element_at_mut(&mut doc.root, &parent_path)
            .ok_or_else(|| XmlError::Malformed("stale match path during header merge".into()))?;
        if el.attr("position").is_some() {
            match &mut parent.children[index] {
                XmlNode::Element(target) => target.children.push(XmlNode::Element(el)),
                _ => {
                    return Err(XmlError::Malformed(
                        "header merge matched a non-element node".into(),
                    ));
                }
            }
        } else {
            parent.children[index] = XmlNode::Element(el);
        }
    }
    Ok(())
}

/// Applies the logo rules to the raw fragment text.
///
/// With a logo and no logo markers in the fragment, a fixed-size image
/// element is spliced after the page-graphics open tag. Without a logo, a
/// declared image element is commented out rather than removed, so the
/// template stays byte-for-byte recoverable.
fn prepare_logo(fragment: &str, has_logo: bool) -> String {
    if has_logo
        && (!fragment.contains("company.logo") || !fragment.contains("<image"))
        && !fragment.contains("<!--image")
    {
        return fragment.replace("<pageGraphics>", LOGO_IMAGE);
    }
    if !has_logo && fragment.contains("company.logo") {
        return fragment
            .replace("<image", "<!--image")
            .replace("</image>", "</image-->");
    }
    fragment.to_string()
}
