//! Per-render evaluation context.
//!
//! The context carries every binding a template expression can reach during
//! one render call: the browsed objects, the request payload, company
//! information, the decoded logo, the namespace table of the packaged
//! sub-kind, and the helper entry points. It owns the render session, so
//! helper calls that switch languages are visible to all later formatting.

use crate::locale::FormatError;
use crate::session::{FormatInput, FormatLangOptions, RenderSession};
use crate::traits::TranslationStore;
use crate::value::{FormattedValue, RecordSet};
use crate::xml::NsTable;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Translation domain used for template text lookups.
const TEMPLATE_TRANSLATION_DOMAIN: &str = "rml";

/// Company-level settings a render draws on: letterhead fragments, the
/// base64-encoded logo, and the company's default language.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    #[serde(default)]
    pub rml_header: String,
    #[serde(default)]
    pub rml_header2: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

impl CompanyProfile {
    pub fn has_logo(&self) -> bool {
        self.logo.as_deref().is_some_and(|l| !l.is_empty())
    }

    /// Decodes the stored logo payload. A malformed payload is treated as
    /// no logo, with a warning.
    pub fn decoded_logo(&self) -> Option<Vec<u8>> {
        let encoded = self.logo.as_deref().filter(|l| !l.is_empty())?;
        match BASE64.decode(encoded.trim()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("company logo payload is not valid base64: {e}");
                None
            }
        }
    }
}

pub struct RenderContext {
    pub objects: RecordSet,
    pub payload: Map<String, Value>,
    pub company: CompanyProfile,
    pub logo: Option<Vec<u8>>,
    pub namespaces: Option<NsTable>,
    pub report_code: String,
    pub title: String,
    session: RenderSession,
    translations: Arc<dyn TranslationStore>,
}

impl RenderContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        objects: RecordSet,
        payload: Map<String, Value>,
        company: CompanyProfile,
        namespaces: Option<NsTable>,
        report_code: &str,
        title: &str,
        mut session: RenderSession,
        translations: Arc<dyn TranslationStore>,
    ) -> Self {
        session.attach_objects(objects.cache());
        let logo = company.decoded_logo();
        RenderContext {
            objects,
            payload,
            company,
            logo,
            namespaces,
            report_code: report_code.to_string(),
            title: title.to_string(),
            session,
            translations,
        }
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut RenderSession {
        &mut self.session
    }

    /// Switches the language used by all subsequent formatting calls.
    pub fn set_lang(&mut self, code: &str) {
        self.session.set_lang(code);
    }

    /// Locale-aware formatting of an arbitrary value.
    pub fn format_lang(
        &mut self,
        value: FormatInput,
        opts: &FormatLangOptions,
    ) -> Result<String, FormatError> {
        self.session.format_lang(value, opts)
    }

    /// Renders a wrapped field value under the currently active language.
    pub fn render_value(&mut self, value: &FormattedValue) -> Result<String, FormatError> {
        value.render(&mut self.session)
    }

    /// Maps a sequence into a list of single-key objects, the shape template
    /// iteration constructs expect.
    pub fn repeat_in(items: &[Value], name: &str) -> Vec<Value> {
        items
            .iter()
            .map(|item| {
                let mut entry = Map::new();
                entry.insert(name.to_string(), item.clone());
                Value::Object(entry)
            })
            .collect()
    }

    /// Looks up a translation of template text under the active language.
    /// Whitespace-only text and missing translations come back unchanged.
    pub fn translate(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        let lang = self.session.active_code();
        let cleaned = text.replace('\n', " ");
        let cleaned = cleaned.trim();
        self.translations
            .translate(&self.report_code, TEMPLATE_TRANSLATION_DOMAIN, lang, cleaned)
            .unwrap_or_else(|| text.to_string())
    }

    /// Template hook for tag rewriting; the generator applies the returned
    /// tag name.
    pub fn set_tag(&self, _old_tag: &str, new_tag: &str) -> String {
        new_tag.to_string()
    }

    /// Template hook for text post-processing; plain pass-through.
    pub fn format(&self, text: &str) -> String {
        text.to_string()
    }
}
