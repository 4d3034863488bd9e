//! Packaged-format document assembly.
//!
//! Packaged reports live inside a zip archive whose parts are edited
//! individually: the content part is preprocessed and rendered through the
//! generator, the metadata part gets the source record's id and model
//! written into its user-defined entries, and (when the descriptor asks for
//! it) a corporate header is rendered through the full pipeline and written
//! as the styles part. Edited parts are appended as duplicate entries; the
//! archive format resolves duplicates in favor of the last occurrence.

use crate::error::ReportError;
use crate::header::{HeaderKind, add_header};
use crate::preprocess::{Dialect, preprocess};
use crate::report::{RenderedReport, ReportDescriptor, ReportService};
use crate::value::plain_string;
use crate::xml::{NsTable, XmlDocument, XmlElement, XmlNode};
use log::debug;
use serde_json::{Map, Value};
use std::io::{Cursor, Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const CONTENT_PART: &str = "content.xml";
const META_PART: &str = "meta.xml";
const STYLES_PART: &str = "styles.xml";

/// Declaration prepended to every rewritten part, since tree serialization
/// does not emit one.
const XML_DECL: &[u8] = b"<?xml version='1.0' encoding='UTF-8'?>";

/// User-defined metadata entry overwritten with the source record id.
const META_INFO_RECORD_ID: &str = "Info 3";
/// User-defined metadata entry overwritten with the source model name.
const META_INFO_MODEL: &str = "Info 4";

pub(crate) fn create_packaged(
    service: &ReportService,
    descriptor: &ReportDescriptor,
    ids: &[i64],
    payload: &Map<String, Value>,
) -> Result<RenderedReport, ReportError> {
    let kind = descriptor.kind.clone();
    let generator = service
        .env
        .generators
        .get(&kind)
        .ok_or_else(|| ReportError::UnknownOutputKind(kind.clone()))?;

    let mut archive = ZipArchive::new(Cursor::new(descriptor.template.as_slice()))?;
    let content = read_part(&mut archive, CONTENT_PART)?;
    let meta = read_part(&mut archive, META_PART)?;
    drop(archive);

    let mut meta_doc = XmlDocument::parse(&meta)?;
    rewrite_user_defined(&mut meta_doc, &NsTable::for_kind(&kind), payload);

    let mut ctx = service.build_context(descriptor, ids, payload)?;
    let logo = ctx.logo.clone();
    let mut content_doc = XmlDocument::parse(&content)?;
    preprocess(&mut content_doc, Dialect::Sxw);
    let rendered_content = generator.generate(
        &content_doc.to_bytes()?,
        &mut ctx,
        logo.as_deref(),
        Some(&descriptor.title),
    )?;

    let mut writer = ZipWriter::new_append(Cursor::new(descriptor.template.clone()))?;
    let options = SimpleFileOptions::default();
    write_part(&mut writer, CONTENT_PART, &rendered_content, options)?;
    write_part(&mut writer, META_PART, &meta_doc.to_bytes()?, options)?;

    if descriptor.header {
        let fragment = service.env.corporate_headers.get(&kind).ok_or_else(|| {
            ReportError::Config(format!(
                "no corporate header template configured for output kind '{kind}'"
            ))
        })?;
        let mut header_ctx = service.build_context(descriptor, ids, payload)?;
        let mut header_doc = XmlDocument::parse(fragment.as_bytes())?;
        preprocess(&mut header_doc, Dialect::Sxw);
        let rendered_header = generator.generate(
            &header_doc.to_bytes()?,
            &mut header_ctx,
            logo.as_deref(),
            Some(&descriptor.title),
        )?;
        let mut styles_doc = XmlDocument::parse(&rendered_header)?;
        add_header(&mut styles_doc, &service.env.company, HeaderKind::Main)?;
        write_part(&mut writer, STYLES_PART, &styles_doc.to_bytes()?, options)?;
    }

    let cursor = writer.finish()?;
    Ok(RenderedReport { bytes: cursor.into_inner(), kind })
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ReportError> {
    let mut part = archive
        .by_name(name)
        .map_err(|e| ReportError::Archive(format!("missing archive part '{name}': {e}")))?;
    let mut buf = Vec::new();
    part.read_to_end(&mut buf)?;
    Ok(buf)
}

fn write_part<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
    options: SimpleFileOptions,
) -> Result<(), ReportError> {
    writer.start_file(name, options)?;
    writer.write_all(XML_DECL)?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Overwrites the `Info 3`/`Info 4` user-defined metadata entries with the
/// request's target record id and model, so a generated document can be
/// correlated back to its source record.
fn rewrite_user_defined(doc: &mut XmlDocument, base: &NsTable, payload: &Map<String, Value>) {
    let table = base.clone().with_declarations_from(&doc.root);
    let Some(meta_uri) = base.uri("meta").map(str::to_string) else { return };

    let record_id = payload.get("id").map(plain_string);
    let model = payload.get("model").map(plain_string);
    if record_id.is_none() && model.is_none() {
        debug!("request payload carries no id/model, leaving metadata untouched");
        return;
    }

    rewrite_elements(&mut doc.root, &table, &meta_uri, record_id.as_deref(), model.as_deref());
}

fn rewrite_elements(
    el: &mut XmlElement,
    table: &NsTable,
    meta_uri: &str,
    record_id: Option<&str>,
    model: Option<&str>,
) {
    if table.matches(&el.name, meta_uri, "user-defined") {
        let entry_name = el
            .attrs
            .iter()
            .find(|(k, _)| table.matches(k, meta_uri, "name"))
            .map(|(_, v)| v.clone());
        let replacement = match entry_name.as_deref() {
            Some(META_INFO_RECORD_ID) => record_id,
            Some(META_INFO_MODEL) => model,
            _ => None,
        };
        if let Some(text) = replacement {
            set_entry_text(el, text);
        }
        return;
    }
    for child in el.children.iter_mut() {
        if let XmlNode::Element(c) = child {
            rewrite_elements(c, table, meta_uri, record_id, model);
        }
    }
}

/// Writes the entry value onto the element, or onto its first child element
/// when the dialect nests the value one level down.
fn set_entry_text(el: &mut XmlElement, text: &str) {
    for child in el.children.iter_mut() {
        if let XmlNode::Element(c) = child {
            c.set_text(text);
            return;
        }
    }
    el.set_text(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    const ODT_META: &[u8] = br#"<office:document-meta xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:meta="urn:oasis:names:tc:opendocument:xmlns:meta:1.0"><office:meta><meta:user-defined meta:name="Info 1">keep</meta:user-defined><meta:user-defined meta:name="Info 3">old-id</meta:user-defined><meta:user-defined meta:name="Info 4">old-model</meta:user-defined></office:meta></office:document-meta>"#;

    fn payload() -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("id".to_string(), Value::from(42));
        payload.insert("model".to_string(), Value::from("sale.order"));
        payload
    }

    fn entry_texts(doc: &XmlDocument) -> Vec<(String, String)> {
        let meta = doc.root.child_elements().next().unwrap();
        meta.child_elements()
            .map(|e| (e.attr("meta:name").unwrap_or("").to_string(), e.text()))
            .collect()
    }

    #[test]
    fn info_entries_receive_record_id_and_model() {
        let mut doc = XmlDocument::parse(ODT_META).unwrap();
        rewrite_user_defined(&mut doc, &NsTable::odt(), &payload());
        assert_eq!(
            entry_texts(&doc),
            vec![
                ("Info 1".to_string(), "keep".to_string()),
                ("Info 3".to_string(), "42".to_string()),
                ("Info 4".to_string(), "sale.order".to_string()),
            ]
        );
    }

    #[test]
    fn metadata_is_untouched_without_payload_keys() {
        let mut doc = XmlDocument::parse(ODT_META).unwrap();
        let before = doc.clone();
        rewrite_user_defined(&mut doc, &NsTable::odt(), &Map::new());
        assert_eq!(doc, before);
    }

    #[test]
    fn foreign_namespace_entries_are_ignored() {
        let meta = br#"<doc xmlns:meta="urn:example:other"><meta:user-defined meta:name="Info 3">old</meta:user-defined></doc>"#;
        let mut doc = XmlDocument::parse(meta).unwrap();
        rewrite_user_defined(&mut doc, &NsTable::odt(), &payload());
        let entry = doc.root.child_elements().next().unwrap();
        assert_eq!(entry.text(), "old");
    }

    #[test]
    fn nested_entry_values_are_rewritten_on_the_child() {
        let meta = br#"<doc xmlns:meta="http://openoffice.org/2000/meta"><meta:user-defined meta:name="Info 3"><meta:value>old</meta:value></meta:user-defined></doc>"#;
        let mut doc = XmlDocument::parse(meta).unwrap();
        rewrite_user_defined(&mut doc, &NsTable::sxw(), &payload());
        let entry = doc.root.child_elements().next().unwrap();
        let value = entry.child_elements().next().unwrap();
        assert_eq!(value.text(), "42");
    }
}
