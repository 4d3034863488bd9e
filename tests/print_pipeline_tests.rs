//! End-to-end tests of the print-style pipeline: attachment reuse, per-object
//! persistence, and page merging.

mod common;

use common::*;
use letterpress::{AttachmentStore, ReportError, StoreError};
use serde_json::Value;
use std::sync::Arc;

const TEMPLATE: &[u8] = b"<document><story><para>[[ object.name ]]</para></story></document>";

fn attached_descriptor(template: &[u8], reuse: bool) -> letterpress::ReportDescriptor {
    let mut descriptor = pdf_descriptor(template);
    descriptor.attachment =
        Some(Arc::new(|record: &letterpress::Record| Some(format!("SO{:03}", record.id))));
    descriptor.attachment_use = reuse;
    descriptor
}

#[test]
fn single_object_render_produces_the_generators_output() -> TestResult {
    let generator = Arc::new(StubPdfGenerator::new(2));
    let service = ServiceBuilder::new(&[1])
        .descriptor(pdf_descriptor(TEMPLATE))
        .generator("pdf", generator.clone())
        .build();

    let report = service.render(&[1], &empty_payload())?;
    assert_eq!(report.kind, "pdf");
    assert_eq!(page_count(&report.bytes), 2);
    assert_eq!(generator.call_count(), 1);
    Ok(())
}

#[test]
fn stored_attachment_is_reused_without_invoking_the_generator() -> TestResult {
    let generator = Arc::new(StubPdfGenerator::new(1));
    let stored = build_pdf(3, "stored attachment");
    let builder = ServiceBuilder::new(&[1])
        .descriptor(attached_descriptor(TEMPLATE, true))
        .generator("pdf", generator.clone());
    builder.attachments.seed("SO001.pdf", &stored, MODEL, 1);
    let service = builder.build();

    let report = service.render(&[1], &empty_payload())?;
    assert_eq!(report.bytes, stored);
    assert_eq!(report.kind, "pdf");
    assert_eq!(generator.call_count(), 0);
    Ok(())
}

#[test]
fn request_flag_disables_attachment_reuse() -> TestResult {
    let generator = Arc::new(StubPdfGenerator::new(1));
    let stored = build_pdf(3, "stored attachment");
    let builder = ServiceBuilder::new(&[1])
        .descriptor(attached_descriptor(TEMPLATE, true))
        .generator("pdf", generator.clone());
    builder.attachments.seed("SO001.pdf", &stored, MODEL, 1);
    let service = builder.build();

    let mut payload = empty_payload();
    payload.insert("attachment_use".to_string(), Value::Bool(false));
    let report = service.render(&[1], &payload)?;
    assert_ne!(report.bytes, stored);
    assert_eq!(generator.call_count(), 1);
    Ok(())
}

#[test]
fn fresh_renders_are_persisted_per_object() -> TestResult {
    let generator = Arc::new(StubPdfGenerator::new(1));
    let builder = ServiceBuilder::new(&[1, 2])
        .descriptor(attached_descriptor(TEMPLATE, true))
        .generator("pdf", generator.clone());
    let attachments = builder.attachments.clone();
    let service = builder.build();

    service.render(&[1, 2], &empty_payload())?;
    assert_eq!(generator.call_count(), 2);
    assert!(attachments.find("SO001.pdf", MODEL, 1).is_some());
    assert!(attachments.find("SO002.pdf", MODEL, 2).is_some());
    Ok(())
}

#[test]
fn merged_output_page_count_is_the_sum_in_request_order() -> TestResult {
    let generator = Arc::new(StubPdfGenerator::new(2));
    let service = ServiceBuilder::new(&[3, 1, 2])
        .descriptor(attached_descriptor(TEMPLATE, false))
        .generator("pdf", generator.clone())
        .build();

    let report = service.render(&[3, 1, 2], &empty_payload())?;
    assert_eq!(report.kind, "pdf");
    assert_eq!(page_count(&report.bytes), 6);
    assert_eq!(generator.call_count(), 3);
    // Pages appear in request order, one object per two pages.
    assert!(page_text(&report.bytes, 1).contains("object 3"));
    assert!(page_text(&report.bytes, 3).contains("object 1"));
    assert!(page_text(&report.bytes, 5).contains("object 2"));
    Ok(())
}

#[test]
fn attachment_persist_failure_does_not_abort_the_render() -> TestResult {
    struct RefusingStore;
    impl AttachmentStore for RefusingStore {
        fn find(&self, _filename: &str, _model: &str, _record_id: i64) -> Option<Vec<u8>> {
            None
        }
        fn save(
            &self,
            _name: &str,
            _filename: &str,
            _bytes: &[u8],
            _model: &str,
            _record_id: i64,
        ) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }
    }

    let generator = Arc::new(StubPdfGenerator::new(1));
    let mut builder = ServiceBuilder::new(&[1, 2])
        .descriptor(attached_descriptor(TEMPLATE, true))
        .generator("pdf", generator.clone());
    let service = {
        let mut descriptors = letterpress::InMemoryDescriptorStore::new();
        descriptors.insert(MODEL, builder.descriptor.take().unwrap());
        letterpress::ReportService::new(
            letterpress::ServiceConfig {
                service_name: format!("report.{MODEL}"),
                model: MODEL.to_string(),
                default_template: TEMPLATE.to_vec(),
                header: false,
            },
            letterpress::ReportEnv {
                objects: Arc::new(order_rows(&[1, 2])),
                locales: Arc::new(letterpress::StaticLocaleRegistry::with_defaults()),
                descriptors: Arc::new(descriptors),
                attachments: Arc::new(RefusingStore),
                generators: builder.generators.clone(),
                translations: Arc::new(letterpress::NoTranslations),
                company: letterpress::CompanyProfile::default(),
                corporate_headers: Default::default(),
            },
        )
    };

    let report = service.render(&[1, 2], &empty_payload())?;
    assert_eq!(page_count(&report.bytes), 2);
    assert_eq!(generator.call_count(), 2);
    Ok(())
}

#[test]
fn merging_non_paginated_results_is_a_typed_error() {
    struct RawGenerator;
    impl letterpress::Generator for RawGenerator {
        fn generate(
            &self,
            _template: &[u8],
            _ctx: &mut letterpress::RenderContext,
            _logo: Option<&[u8]>,
            _title: Option<&str>,
        ) -> Result<Vec<u8>, letterpress::GeneratorError> {
            Ok(b"plain text output".to_vec())
        }
    }

    let mut descriptor = pdf_descriptor(TEMPLATE);
    descriptor.kind = "raw".to_string();
    descriptor.attachment = Some(Arc::new(|_: &letterpress::Record| None));
    let service = ServiceBuilder::new(&[1, 2])
        .descriptor(descriptor)
        .generator("raw", Arc::new(RawGenerator))
        .build();

    match service.render(&[1, 2], &empty_payload()) {
        Err(ReportError::Merge(_)) => {}
        other => panic!("expected a merge error, got {other:?}"),
    }
}

#[test]
fn corporate_header_is_merged_into_print_templates() -> TestResult {
    let mut descriptor = pdf_descriptor(TEMPLATE);
    descriptor.kind = "html".to_string();
    descriptor.header = true;
    let service = ServiceBuilder::new(&[1])
        .descriptor(descriptor)
        .generator("html", Arc::new(EchoGenerator))
        .company(letterpress::CompanyProfile {
            name: "Tiny sprl".to_string(),
            rml_header:
                r#"<header><story marker="corporate"><para>letterhead</para></story></header>"#
                    .to_string(),
            ..Default::default()
        })
        .build();

    let report = service.render(&[1], &empty_payload())?;
    let rendered = String::from_utf8(report.bytes)?;
    // The body's story element was replaced by the corporate one.
    assert!(rendered.contains(r#"story marker="corporate""#));
    assert!(rendered.contains("letterhead"));
    assert!(!rendered.contains("object.name"));
    Ok(())
}

#[test]
fn ephemeral_descriptor_renders_the_bundled_template() -> TestResult {
    let generator = Arc::new(StubPdfGenerator::new(1));
    // No stored descriptor: the service synthesizes one around the bundled
    // template, defaulting to pdf.
    let service = ServiceBuilder::new(&[1]).generator("pdf", generator.clone()).build();

    let report = service.render(&[1], &empty_payload())?;
    assert_eq!(report.kind, "pdf");
    assert_eq!(generator.call_count(), 1);
    Ok(())
}
