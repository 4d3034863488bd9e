//! Print-style rendering: per-object attachment caching and page merging.
//!
//! With an attachment-name function configured, each requested object is
//! rendered (or reused from the attachment store) independently; multiple
//! paginated results are then concatenated in request order. Without one,
//! all objects are rendered together into a single document.

use crate::error::ReportError;
use crate::report::{PAGINATED_KIND, RenderedReport, ReportDescriptor, ReportService};
use letterpress_pdf_composer as composer;
use log::{debug, error, info};
use serde_json::{Map, Value};

pub(crate) fn create_print(
    service: &ReportService,
    descriptor: &ReportDescriptor,
    ids: &[i64],
    payload: &Map<String, Value>,
) -> Result<RenderedReport, ReportError> {
    let Some(name_fn) = &descriptor.attachment else {
        return service.render_single(descriptor, ids, payload);
    };

    let reuse_allowed = descriptor.attachment_use
        && payload
            .get("attachment_use")
            .and_then(Value::as_bool)
            .unwrap_or(true);

    let objects = service.env.objects.browse(&service.config.model, ids)?;
    let mut results: Vec<RenderedReport> = Vec::new();

    for record in objects.iter() {
        let attachment_name = name_fn(record);

        if reuse_allowed {
            if let Some(name) = &attachment_name {
                let filename = format!("{name}.{PAGINATED_KIND}");
                if let Some(stored) =
                    service.env.attachments.find(&filename, &record.model, record.id)
                {
                    if stored.is_empty() {
                        // A stored-but-empty attachment shadows the object
                        // entirely.
                        debug!("skipping {}#{}: stored attachment '{filename}' is empty", record.model, record.id);
                        continue;
                    }
                    info!("reusing stored attachment '{filename}' for {}#{}", record.model, record.id);
                    results.push(RenderedReport {
                        bytes: stored,
                        kind: PAGINATED_KIND.to_string(),
                    });
                    continue;
                }
            }
        }

        let rendered = service.render_single(descriptor, &[record.id], payload)?;
        if let Some(name) = &attachment_name {
            let filename = format!("{name}.{}", rendered.kind);
            if let Err(e) = service.env.attachments.save(
                name,
                &filename,
                &rendered.bytes,
                &record.model,
                record.id,
            ) {
                // The freshly rendered bytes are still good; a failed
                // persist must not take down sibling objects.
                error!(
                    "failed to persist attachment '{filename}' for {}#{}: {e}",
                    record.model, record.id
                );
            }
        }
        results.push(rendered);
    }

    if results.is_empty() {
        // Every object was shadowed by an empty stored attachment; fall
        // back to one combined render of the full id list.
        return service.render_single(descriptor, ids, payload);
    }
    if results.len() == 1 {
        return Ok(results.remove(0));
    }
    merge_results(results)
}

/// Concatenates multiple per-object documents into one, page by page, in
/// request order. Only the paginated kind supports this.
fn merge_results(results: Vec<RenderedReport>) -> Result<RenderedReport, ReportError> {
    if results.iter().any(|r| r.kind != PAGINATED_KIND) {
        return Err(ReportError::Merge(format!(
            "cannot merge {} documents of non-paginated output kinds",
            results.len()
        )));
    }
    let parts: Vec<Vec<u8>> = results.into_iter().map(|r| r.bytes).collect();
    let merged = composer::concat_documents(&parts)?;
    Ok(RenderedReport { bytes: merged, kind: PAGINATED_KIND.to_string() })
}
