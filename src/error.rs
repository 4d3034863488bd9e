//! The typed failure surface of a render call.

use crate::locale::FormatError;
use crate::traits::{GeneratorError, StoreError};
use crate::xml::XmlError;
use letterpress_pdf_composer::ComposerError;
use thiserror::Error;

/// All the ways a render call can fail. Per-object attachment persistence
/// failures are logged and swallowed, and unknown language codes fall back
/// to the default language; everything here aborts the whole request, never
/// leaving partially written output behind.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("no generator registered for output kind '{0}'")]
    UnknownOutputKind(String),

    #[error("template parse error: {0}")]
    TemplateParse(#[from] XmlError),

    #[error("value formatting error: {0}")]
    Format(#[from] FormatError),

    #[error("document merge error: {0}")]
    Merge(String),

    #[error("generator error: {0}")]
    Generate(#[from] GeneratorError),

    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("PDF composition error: {0}")]
    Pdf(#[from] ComposerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for ReportError {
    fn from(e: zip::result::ZipError) -> Self {
        ReportError::Archive(e.to_string())
    }
}
