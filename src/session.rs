//! Per-render language state.
//!
//! A [`RenderSession`] owns everything the formatting layer needs for one
//! render call: the active language, a cache of resolved language contexts,
//! and a handle to the record set's shared browse cache so a mid-render
//! language switch can invalidate values fetched under the old language.
//! The session is threaded explicitly through every formatting call; nothing
//! here is shared across renders.

use crate::locale::{
    DATETIME_INPUT_FORMAT, DEFAULT_LANG, LanguageContext, LocaleRegistry, LocaleSpec, FormatError,
};
use crate::value::SharedCache;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Input accepted by [`RenderSession::format_lang`]. Structured date/time
/// values bypass the fixed-pattern parse step entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatInput {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

/// Options of the general-purpose `format_lang` template helper.
#[derive(Debug, Clone)]
pub struct FormatLangOptions {
    pub digits: usize,
    pub date: bool,
    pub date_time: bool,
    pub grouping: bool,
    pub monetary: bool,
    pub currency: Option<String>,
}

impl Default for FormatLangOptions {
    fn default() -> Self {
        FormatLangOptions {
            digits: 2,
            date: false,
            date_time: false,
            grouping: true,
            monetary: false,
            currency: None,
        }
    }
}

pub struct RenderSession {
    registry: Arc<dyn LocaleRegistry>,
    active_code: String,
    active: LanguageContext,
    resolved: bool,
    /// Snapshot per language code, so re-entering a language does not
    /// re-resolve it.
    defaults: HashMap<String, LanguageContext>,
    /// Values migrated out of the browse cache on language switches, keyed
    /// by `(language, (table, id))`.
    lang_cache: HashMap<String, HashMap<(String, i64), BTreeMap<String, Value>>>,
    objects: Option<SharedCache>,
}

impl RenderSession {
    pub fn new(registry: Arc<dyn LocaleRegistry>, lang: &str) -> Self {
        let code = if lang.is_empty() { DEFAULT_LANG } else { lang };
        RenderSession {
            registry,
            active_code: code.to_string(),
            active: LanguageContext::from_spec(code, LocaleSpec::builtin_default()),
            resolved: false,
            defaults: HashMap::new(),
            lang_cache: HashMap::new(),
            objects: None,
        }
    }

    /// Hooks the browse cache of the render's record set into the session.
    pub fn attach_objects(&mut self, cache: SharedCache) {
        self.objects = Some(cache);
    }

    pub fn active_code(&self) -> &str {
        &self.active_code
    }

    /// Whether the active language context has been resolved since the last
    /// language change.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Returns the active language context, resolving it through the locale
    /// registry on first use after a language change. Unknown codes are
    /// recoverable: the session falls back to the default language's rules
    /// rather than failing the render.
    pub fn resolve_language(&mut self) -> &LanguageContext {
        if !self.resolved {
            let spec = match self.registry.resolve(&self.active_code) {
                Ok(spec) => spec,
                Err(e) => {
                    warn!("{e}; falling back to {DEFAULT_LANG} formatting rules");
                    self.registry
                        .resolve(DEFAULT_LANG)
                        .unwrap_or_else(|_| LocaleSpec::builtin_default())
                }
            };
            let ctx = LanguageContext::from_spec(&self.active_code, spec);
            self.defaults.insert(self.active_code.clone(), ctx.clone());
            self.active = ctx;
            self.resolved = true;
        }
        &self.active
    }

    /// Switches the active language for all subsequent formatting.
    ///
    /// An empty code resets to the default language and forces a fresh
    /// resolution on the next formatting call. A previously-seen code
    /// reactivates its snapshot without touching the registry. A brand-new
    /// code defers resolution and migrates the browse cache: every entry's
    /// current field values are stashed under the previously active
    /// language, then replaced with the new language's stashed values if it
    /// was visited before, or reset to an id-only stub so the next read
    /// fetches language-correct data.
    pub fn set_lang(&mut self, code: &str) {
        if code.is_empty() {
            debug!("resetting report language to {DEFAULT_LANG}");
            self.active_code = DEFAULT_LANG.to_string();
            self.resolved = false;
            return;
        }
        if let Some(snapshot) = self.defaults.get(code) {
            debug!("reactivating cached language context for '{code}'");
            self.active = snapshot.clone();
            self.active_code = code.to_string();
            self.resolved = true;
            return;
        }

        debug!("switching report language to '{code}'");
        let previous = std::mem::replace(&mut self.active_code, code.to_string());
        self.resolved = false;

        let Some(cache) = &self.objects else { return };
        let mut cache = cache.borrow_mut();
        for ((table, id), fields) in cache.entries_mut().iter_mut() {
            let key = (table.clone(), *id);
            let stash = self
                .lang_cache
                .entry(previous.clone())
                .or_default()
                .entry(key.clone())
                .or_default();
            for (field, value) in fields.iter() {
                stash.insert(field.clone(), value.clone());
            }

            let migrated = self
                .lang_cache
                .get(code)
                .and_then(|per_lang| per_lang.get(&key))
                .cloned();
            *fields = migrated.unwrap_or_else(|| {
                BTreeMap::from([("id".to_string(), Value::from(*id))])
            });
        }
    }

    /// General-purpose locale formatting, exposed to templates.
    ///
    /// Empty text passes through unchanged. With a date flag set, structured
    /// values are formatted directly; text is parsed with the fixed datetime
    /// input pattern first, except that a bare string in date (not datetime)
    /// mode is returned as-is, since it has already been converted upstream.
    /// Without date flags the value is formatted as a number under the
    /// active language's rules.
    pub fn format_lang(
        &mut self,
        value: FormatInput,
        opts: &FormatLangOptions,
    ) -> Result<String, FormatError> {
        if let FormatInput::Text(s) = &value {
            if s.is_empty() {
                return Ok(String::new());
            }
        }

        if opts.date || opts.date_time {
            let ctx = self.resolve_language();
            let pattern = if opts.date_time {
                ctx.datetime_format()
            } else {
                ctx.date_format.clone()
            };
            return match value {
                FormatInput::Text(s) => {
                    if !opts.date_time {
                        return Ok(s);
                    }
                    let parsed = NaiveDateTime::parse_from_str(&s, DATETIME_INPUT_FORMAT)
                        .map_err(|_| FormatError::DateParse { value: s.clone() })?;
                    Ok(parsed.format(&pattern).to_string())
                }
                FormatInput::Date(d) => {
                    if opts.date_time {
                        Ok(d.and_time(NaiveTime::MIN).format(&pattern).to_string())
                    } else {
                        Ok(d.format(&pattern).to_string())
                    }
                }
                FormatInput::DateTime(dt) => Ok(dt.format(&pattern).to_string()),
                FormatInput::Time(t) => Ok(t.format(&ctx.time_format).to_string()),
                FormatInput::Number(n) => {
                    Err(FormatError::DateParse { value: n.to_string() })
                }
            };
        }

        let number = match value {
            FormatInput::Number(n) => n,
            FormatInput::Text(s) => s
                .parse::<f64>()
                .map_err(|_| FormatError::NotNumeric { value: s.clone() })?,
            other => {
                return Err(FormatError::NotNumeric { value: format!("{other:?}") });
            }
        };
        let ctx = self.resolve_language();
        let mut out =
            ctx.number_format
                .format(number, opts.digits, opts.grouping, opts.monetary);
        if let Some(currency) = &opts.currency {
            out = format!("{out} {currency}");
        }
        Ok(out)
    }
}
