//! Shared fixtures for the pipeline integration tests: in-memory
//! collaborators, stub generators, dummy PDFs and a minimal packaged-format
//! archive.

use letterpress::{
    CompanyProfile, FieldKind, FieldMeta, Generator, GeneratorError, GeneratorRegistry,
    InMemoryAttachmentStore, InMemoryDescriptorStore, InMemoryObjectStore, NoTranslations,
    RenderContext, ReportDescriptor, ReportEnv, ReportService, ServiceConfig,
    StaticLocaleRegistry,
};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const MODEL: &str = "sale.order";

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Builds a PDF whose pages each carry "<prefix> page N", so order and
/// provenance stay observable after merging.
pub fn build_pdf(num_pages: u32, prefix: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut page_ids = vec![];
    for i in 1..=num_pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        format!("{} page {}", prefix, i).into_bytes(),
                        StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        page_ids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => page_ids,
        "Count" => num_pages as i64,
    };
    doc.objects.insert(pages_id, pages_dict.into());
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Cursor::new(Vec::new());
    doc.save_to(&mut out).unwrap();
    out.into_inner()
}

pub fn page_count(bytes: &[u8]) -> usize {
    Document::load_mem(bytes).unwrap().get_pages().len()
}

pub fn page_text(bytes: &[u8], page: u32) -> String {
    let doc = Document::load_mem(bytes).unwrap();
    let pages = doc.get_pages();
    let content = doc.get_page_content(*pages.get(&page).unwrap()).unwrap();
    String::from_utf8_lossy(&content).into_owned()
}

/// Generator stub producing a fixed number of PDF pages per call, labeled
/// with the rendered object ids. Counts invocations so tests can assert the
/// attachment cache actually short-circuits rendering.
pub struct StubPdfGenerator {
    pub pages_per_call: u32,
    pub calls: AtomicUsize,
}

impl StubPdfGenerator {
    pub fn new(pages_per_call: u32) -> Self {
        StubPdfGenerator { pages_per_call, calls: AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Generator for StubPdfGenerator {
    fn generate(
        &self,
        _template: &[u8],
        ctx: &mut RenderContext,
        _logo: Option<&[u8]>,
        _title: Option<&str>,
    ) -> Result<Vec<u8>, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ids: Vec<String> = ctx.objects.ids().iter().map(i64::to_string).collect();
        Ok(build_pdf(self.pages_per_call, &format!("object {}", ids.join("+"))))
    }
}

/// Generator stub that echoes the processed template back, prefixed with a
/// marker, standing in for the packaged-format expression evaluator.
pub struct EchoGenerator;

impl Generator for EchoGenerator {
    fn generate(
        &self,
        template: &[u8],
        _ctx: &mut RenderContext,
        _logo: Option<&[u8]>,
        _title: Option<&str>,
    ) -> Result<Vec<u8>, GeneratorError> {
        Ok(template.to_vec())
    }
}

/// Generator stub that always fails.
pub struct FailingGenerator;

impl Generator for FailingGenerator {
    fn generate(
        &self,
        _template: &[u8],
        _ctx: &mut RenderContext,
        _logo: Option<&[u8]>,
        _title: Option<&str>,
    ) -> Result<Vec<u8>, GeneratorError> {
        Err(GeneratorError("expression evaluation exploded".to_string()))
    }
}

pub fn order_rows(ids: &[i64]) -> InMemoryObjectStore {
    let metas = BTreeMap::from([
        ("name".to_string(), FieldMeta::new(FieldKind::Char)),
        ("amount".to_string(), FieldMeta::float(2)),
        ("date_order".to_string(), FieldMeta::new(FieldKind::Date)),
    ]);
    let mut store = InMemoryObjectStore::new(metas);
    for &id in ids {
        store.insert(
            MODEL,
            id,
            BTreeMap::from([
                ("name".to_string(), json!(format!("SO{id:03}"))),
                ("amount".to_string(), json!(100.0 * id as f64)),
                ("date_order".to_string(), json!("2009-11-05")),
            ]),
        );
    }
    store
}

/// Minimal packaged-format archive with content and metadata parts.
pub fn minimal_package() -> Vec<u8> {
    let content = r#"<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0"><office:body><para>[[ object.name ]]</para></office:body></office:document-content>"#;
    let meta = r#"<office:document-meta xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:meta="urn:oasis:names:tc:opendocument:xmlns:meta:1.0"><office:meta><meta:user-defined meta:name="Info 3"/><meta:user-defined meta:name="Info 4"/></office:meta></office:document-meta>"#;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    writer.start_file("mimetype", options).unwrap();
    writer
        .write_all(b"application/vnd.oasis.opendocument.text")
        .unwrap();
    writer.start_file("content.xml", options).unwrap();
    writer.write_all(content.as_bytes()).unwrap();
    writer.start_file("meta.xml", options).unwrap();
    writer.write_all(meta.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

pub struct ServiceBuilder {
    pub descriptor: Option<ReportDescriptor>,
    pub generators: GeneratorRegistry,
    pub attachments: Arc<InMemoryAttachmentStore>,
    pub company: CompanyProfile,
    pub corporate_headers: HashMap<String, String>,
    pub ids: Vec<i64>,
}

impl ServiceBuilder {
    pub fn new(ids: &[i64]) -> Self {
        ServiceBuilder {
            descriptor: None,
            generators: GeneratorRegistry::new(),
            attachments: Arc::new(InMemoryAttachmentStore::new()),
            company: CompanyProfile {
                name: "Tiny sprl".to_string(),
                rml_header: "<header/>".to_string(),
                ..Default::default()
            },
            corporate_headers: HashMap::new(),
            ids: ids.to_vec(),
        }
    }

    pub fn descriptor(mut self, descriptor: ReportDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn generator(mut self, kind: &str, generator: Arc<dyn Generator>) -> Self {
        self.generators.register(kind, generator);
        self
    }

    pub fn corporate_header(mut self, kind: &str, fragment: &str) -> Self {
        self.corporate_headers.insert(kind.to_string(), fragment.to_string());
        self
    }

    pub fn company(mut self, company: CompanyProfile) -> Self {
        self.company = company;
        self
    }

    pub fn build(self) -> ReportService {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut descriptors = InMemoryDescriptorStore::new();
        if let Some(descriptor) = self.descriptor {
            descriptors.insert(MODEL, descriptor);
        }
        ReportService::new(
            ServiceConfig {
                service_name: format!("report.{MODEL}"),
                model: MODEL.to_string(),
                default_template: b"<document><story/></document>".to_vec(),
                header: false,
            },
            ReportEnv {
                objects: Arc::new(order_rows(&self.ids)),
                locales: Arc::new(StaticLocaleRegistry::with_defaults()),
                descriptors: Arc::new(descriptors),
                attachments: self.attachments,
                generators: self.generators,
                translations: Arc::new(NoTranslations),
                company: self.company,
                corporate_headers: self.corporate_headers,
            },
        )
    }
}

pub fn pdf_descriptor(template: &[u8]) -> ReportDescriptor {
    ReportDescriptor {
        name: MODEL.to_string(),
        title: "Sale Order".to_string(),
        kind: "pdf".to_string(),
        template: template.to_vec(),
        header: false,
        attachment: None,
        attachment_use: false,
    }
}

pub fn empty_payload() -> Map<String, Value> {
    Map::new()
}
