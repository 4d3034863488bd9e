//! The rendering orchestrator.
//!
//! A [`ReportService`] resolves a report request into a descriptor, builds
//! the per-render context, and drives one of the two specialized pipelines:
//! print-style output (pdf/html/raw, optionally attached per object and
//! page-merged) or packaged-archive output (sxw/odt, assembled part by
//! part).

use crate::archive;
use crate::context::{CompanyProfile, RenderContext};
use crate::error::ReportError;
use crate::header::{HeaderKind, add_header};
use crate::locale::{DEFAULT_LANG, LocaleRegistry};
use crate::preprocess::{Dialect, preprocess};
use crate::print;
use crate::session::RenderSession;
use crate::traits::{
    AttachmentStore, DescriptorStore, GeneratorRegistry, ObjectStore, TranslationStore,
};
use crate::value::Record;
use crate::xml::{NsTable, XmlDocument};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Output kinds rendered through the print-style pipeline.
pub const PRINT_KINDS: &[&str] = &["pdf", "html", "raw"];
/// Output kinds rendered through the packaged-archive pipeline.
pub const PACKAGED_KINDS: &[&str] = &["sxw", "odt"];
/// The paginated kind whose outputs can be merged by page concatenation.
pub const PAGINATED_KIND: &str = "pdf";

/// Service-name prefix stripped to obtain the report code.
const SERVICE_PREFIX: &str = "report.";

/// Derives the attachment name for one business object. Returning `None`
/// disables attachment handling for that object.
pub type AttachmentNameFn = Arc<dyn Fn(&Record) -> Option<String> + Send + Sync>;

/// A rendered document plus its output-kind string.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub kind: String,
}

/// A named report: output kind, raw template bytes, and the attachment and
/// letterhead switches.
#[derive(Clone)]
pub struct ReportDescriptor {
    pub name: String,
    pub title: String,
    pub kind: String,
    pub template: Vec<u8>,
    pub header: bool,
    /// Derives per-object attachment names; `None` disables attachments.
    pub attachment: Option<AttachmentNameFn>,
    /// Whether stored attachments may be reused instead of re-rendering.
    pub attachment_use: bool,
}

impl fmt::Debug for ReportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("header", &self.header)
            .field("attachment", &self.attachment.is_some())
            .field("attachment_use", &self.attachment_use)
            .finish()
    }
}

/// Static configuration of one report service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, e.g. `report.sale.order`.
    pub service_name: String,
    /// Model whose records the report renders.
    pub model: String,
    /// Bundled template used when no descriptor is stored.
    pub default_template: Vec<u8>,
    /// Whether the ephemeral-descriptor path merges the corporate header.
    pub header: bool,
}

/// The external collaborators and company settings one service renders
/// against.
#[derive(Clone)]
pub struct ReportEnv {
    pub objects: Arc<dyn ObjectStore>,
    pub locales: Arc<dyn LocaleRegistry>,
    pub descriptors: Arc<dyn DescriptorStore>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub generators: GeneratorRegistry,
    pub translations: Arc<dyn TranslationStore>,
    pub company: CompanyProfile,
    /// Bundled corporate header templates for the packaged path, keyed by
    /// output kind.
    pub corporate_headers: HashMap<String, String>,
}

pub struct ReportService {
    pub(crate) config: ServiceConfig,
    pub(crate) env: ReportEnv,
}

impl ReportService {
    pub fn new(config: ServiceConfig, env: ReportEnv) -> Self {
        ReportService { config, env }
    }

    /// The report code the descriptor store is keyed by.
    pub fn report_code(&self) -> &str {
        self.config
            .service_name
            .strip_prefix(SERVICE_PREFIX)
            .unwrap_or(&self.config.service_name)
    }

    /// Renders the report for the given object ids and request payload.
    pub fn render(
        &self,
        ids: &[i64],
        payload: &Map<String, Value>,
    ) -> Result<RenderedReport, ReportError> {
        let descriptor = self.resolve_descriptor(payload);
        let kind = descriptor.kind.as_str();
        info!(
            "rendering report '{}' ({kind}) for {} object(s)",
            self.report_code(),
            ids.len()
        );

        if PACKAGED_KINDS.contains(&kind) {
            archive::create_packaged(self, &descriptor, ids, payload)
        } else if PRINT_KINDS.contains(&kind) {
            print::create_print(self, &descriptor, ids, payload)
        } else {
            Err(ReportError::UnknownOutputKind(kind.to_string()))
        }
    }

    /// Looks up the stored descriptor for this report, or synthesizes an
    /// ephemeral one from the bundled default template. The ephemeral path
    /// never caches attachments.
    fn resolve_descriptor(&self, payload: &Map<String, Value>) -> ReportDescriptor {
        if let Some(descriptor) = self.env.descriptors.find(self.report_code()) {
            return descriptor;
        }
        let kind = payload
            .get("report_type")
            .and_then(Value::as_str)
            .unwrap_or(PAGINATED_KIND);
        debug!(
            "no stored descriptor for '{}', using bundled template as {kind}",
            self.report_code()
        );
        ReportDescriptor {
            name: self.report_code().to_string(),
            title: String::new(),
            kind: kind.to_string(),
            template: self.config.default_template.clone(),
            header: self.config.header,
            attachment: None,
            attachment_use: false,
        }
    }

    /// Builds the evaluation context for one render: browses the objects,
    /// seeds the session with the company language, and selects the
    /// namespace table for packaged kinds.
    pub(crate) fn build_context(
        &self,
        descriptor: &ReportDescriptor,
        ids: &[i64],
        payload: &Map<String, Value>,
    ) -> Result<RenderContext, ReportError> {
        let objects = self.env.objects.browse(&self.config.model, ids)?;
        let lang = self.env.company.lang.as_deref().unwrap_or(DEFAULT_LANG);
        let session = RenderSession::new(Arc::clone(&self.env.locales), lang);
        let namespaces = if PACKAGED_KINDS.contains(&descriptor.kind.as_str()) {
            Some(NsTable::for_kind(&descriptor.kind))
        } else {
            None
        };
        Ok(RenderContext::new(
            objects,
            payload.clone(),
            self.env.company.clone(),
            namespaces,
            self.report_code(),
            &descriptor.title,
            session,
            Arc::clone(&self.env.translations),
        ))
    }

    /// Renders one document through the print-style path: preprocess the
    /// template, merge the letterhead, and hand off to the generator.
    pub(crate) fn render_single(
        &self,
        descriptor: &ReportDescriptor,
        ids: &[i64],
        payload: &Map<String, Value>,
    ) -> Result<RenderedReport, ReportError> {
        let generator = self
            .env
            .generators
            .get(&descriptor.kind)
            .ok_or_else(|| ReportError::UnknownOutputKind(descriptor.kind.clone()))?;

        let mut ctx = self.build_context(descriptor, ids, payload)?;
        let mut doc = XmlDocument::parse(&descriptor.template)?;
        preprocess(&mut doc, Dialect::Rml);
        if descriptor.header {
            add_header(&mut doc, &self.env.company, HeaderKind::Main)?;
        }

        let template = doc.to_bytes()?;
        let logo = ctx.logo.clone();
        let bytes = generator.generate(
            &template,
            &mut ctx,
            logo.as_deref(),
            Some(&descriptor.title),
        )?;
        Ok(RenderedReport { bytes, kind: descriptor.kind.clone() })
    }
}
