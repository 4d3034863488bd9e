//! PDF composition utilities for multi-object report output.
//!
//! When a report is rendered once per business object, the per-object
//! documents have to be stitched back into a single deliverable. This crate
//! does that at the lopdf object level:
//! - deep object copying with cycle detection
//! - appending the pages of one document onto another
//! - concatenating a sequence of rendered PDF byte buffers in order

mod error;

pub use error::ComposerError;

use log::debug;
use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;
use std::io::Cursor;

/// Tracks object identity while copying between two documents, so that each
/// source object is materialized in the target exactly once.
struct ObjectImporter<'a> {
    source: &'a Document,
    target: &'a mut Document,
    id_map: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectImporter<'a> {
    fn new(source: &'a Document, target: &'a mut Document) -> Self {
        Self { source, target, id_map: HashMap::new() }
    }

    /// Deep-copies one object, pulling in everything it references
    /// (content streams, resources, fonts). A placeholder is registered in
    /// `id_map` before recursing, which breaks reference cycles such as
    /// Page -> Parent -> Kids -> Page.
    fn import(&mut self, source_id: ObjectId) -> Result<ObjectId, lopdf::Error> {
        if let Some(target_id) = self.id_map.get(&source_id) {
            return Ok(*target_id);
        }

        let new_id = self.target.add_object(Object::Null);
        self.id_map.insert(source_id, new_id);

        let obj = self.source.get_object(source_id)?.clone();
        let new_obj = self.rewrite_references(obj)?;

        match self.target.objects.get_mut(&new_id) {
            Some(slot) => *slot = new_obj,
            None => return Err(lopdf::Error::ObjectNotFound(new_id)),
        }

        Ok(new_id)
    }

    /// Replaces every `Object::Reference` inside `obj` with the id of the
    /// imported copy, importing transitively as needed.
    fn rewrite_references(&mut self, obj: Object) -> Result<Object, lopdf::Error> {
        match obj {
            Object::Reference(id) => Ok(Object::Reference(self.import(id)?)),
            Object::Array(arr) => {
                let rewritten = arr
                    .into_iter()
                    .map(|o| self.rewrite_references(o))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Object::Array(rewritten))
            }
            Object::Dictionary(mut dict) => {
                for (_, value) in dict.iter_mut() {
                    *value = self.rewrite_references(value.clone())?;
                }
                Ok(Object::Dictionary(dict))
            }
            Object::Stream(mut stream) => {
                for (_, value) in stream.dict.iter_mut() {
                    *value = self.rewrite_references(value.clone())?;
                }
                Ok(Object::Stream(stream))
            }
            other => Ok(other),
        }
    }
}

/// Appends the pages of `source` to the end of `target`.
///
/// All page objects and their dependencies are copied into `target` under
/// fresh object ids, the target's page tree is extended, and the copied
/// pages are re-parented onto the target's `/Pages` node.
pub fn append_pages(target: &mut Document, source: Document) -> Result<(), ComposerError> {
    let source_pages = source.get_pages();
    if source_pages.is_empty() {
        return Ok(());
    }
    let appended_count = source_pages.len() as i64;

    let mut importer = ObjectImporter::new(&source, target);
    let mut new_page_refs = Vec::new();
    let mut copied_page_ids = Vec::new();

    let mut ordered: Vec<_> = source_pages.into_iter().collect();
    ordered.sort_by_key(|(page_num, _)| *page_num);

    for (_, page_id) in ordered {
        let new_page_id = importer.import(page_id)?;
        new_page_refs.push(Object::Reference(new_page_id));
        copied_page_ids.push(new_page_id);
    }

    let root_id = target.trailer.get(b"Root")?.as_reference()?;
    let root_dict = target.get_object_mut(root_id)?.as_dict_mut()?;
    let pages_id = root_dict.get(b"Pages")?.as_reference()?;
    let pages_dict = target.get_object_mut(pages_id)?.as_dict_mut()?;

    let mut kids = pages_dict.get(b"Kids")?.as_array()?.clone();
    let original_count = pages_dict.get(b"Count")?.as_i64()?;
    kids.extend(new_page_refs);

    pages_dict.set("Kids", Object::Array(kids));
    pages_dict.set("Count", original_count + appended_count);

    for page_id in copied_page_ids {
        if let Ok(Object::Dictionary(page_dict)) = target.get_object_mut(page_id) {
            page_dict.set("Parent", Object::Reference(pages_id));
        }
    }

    Ok(())
}

/// Concatenates rendered PDF byte buffers into one document, preserving the
/// order of `parts`. The result's page count is the sum of the parts' page
/// counts.
pub fn concat_documents(parts: &[Vec<u8>]) -> Result<Vec<u8>, ComposerError> {
    let (first, rest) = parts.split_first().ok_or(ComposerError::Empty)?;

    let mut base = Document::load_mem(first)?;
    for part in rest {
        let source = Document::load_mem(part)?;
        append_pages(&mut base, source)?;
    }
    debug!(
        "concatenated {} documents into {} pages",
        parts.len(),
        base.get_pages().len()
    );

    let mut out = Cursor::new(Vec::new());
    base.save_to(&mut out)?;
    Ok(out.into_inner())
}

/// Number of pages in a rendered PDF byte buffer.
pub fn page_count(bytes: &[u8]) -> Result<usize, ComposerError> {
    Ok(Document::load_mem(bytes)?.get_pages().len())
}
