//! Letterpress: a locale-aware report rendering pipeline.
//!
//! Business objects plus an XML template plus company settings go in; a
//! rendered document comes out, either as a paginated print format
//! (pdf/html/raw) or as a packaged archive format (sxw/odt). The heavy
//! lifting is split across three layers:
//!
//! - a lazy, locale-aware value formatting layer ([`value`], [`locale`],
//!   [`session`]) that lets template expressions stringify raw field values
//!   under whatever language is active at read time,
//! - template preparation ([`preprocess`], [`header`]) that normalizes a
//!   template's structural dialect and splices the corporate letterhead in,
//! - and the orchestrator ([`report`], with the print and archive pipelines
//!   behind it) that resolves descriptors, builds the evaluation context,
//!   and drives the generator collaborators.
//!
//! Persistence, attachment storage, translations and the expression-
//! evaluating generators are external collaborators, defined as traits in
//! [`traits`].

mod archive;
pub mod context;
pub mod error;
pub mod header;
pub mod locale;
pub mod preprocess;
mod print;
pub mod report;
pub mod session;
pub mod traits;
pub mod value;
pub mod xml;

pub use context::{CompanyProfile, RenderContext};
pub use error::ReportError;
pub use header::{HeaderKind, add_header};
pub use locale::{
    DEFAULT_LANG, FormatError, LanguageContext, LocaleRegistry, LocaleSpec, NumberFormat,
    StaticLocaleRegistry,
};
pub use preprocess::{Dialect, preprocess};
pub use report::{
    AttachmentNameFn, PACKAGED_KINDS, PAGINATED_KIND, PRINT_KINDS, RenderedReport,
    ReportDescriptor, ReportEnv, ReportService, ServiceConfig,
};
pub use session::{FormatInput, FormatLangOptions, RenderSession};
pub use traits::{
    AttachmentStore, DescriptorStore, Generator, GeneratorError, GeneratorRegistry,
    InMemoryAttachmentStore, InMemoryDescriptorStore, InMemoryObjectStore,
    InMemoryTranslationStore, NoTranslations, ObjectStore, StoreError, TranslationStore,
};
pub use value::{FieldKind, FieldMeta, FormattedValue, Record, RecordSet};
pub use xml::{NsTable, XmlDocument, XmlElement, XmlError, XmlNode};
