//! Language formatting rules and the locale-registry collaborator.
//!
//! A [`LanguageContext`] bundles everything a render needs to print a value
//! for one language: the strftime-style date and time patterns and the
//! number formatting rules. Contexts are resolved through a [`LocaleRegistry`]
//! once per language per render and cached by the session.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Language code a render falls back to when none is set or resolution fails.
pub const DEFAULT_LANG: &str = "en_US";

/// Fixed input pattern for stored date field values.
pub const DATE_INPUT_FORMAT: &str = "%Y-%m-%d";
/// Fixed input pattern for stored datetime field values.
pub const DATETIME_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Fixed input pattern for time-of-day values.
pub const TIME_INPUT_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum LocaleError {
    #[error("unknown language code '{0}'")]
    UnknownCode(String),
}

/// Errors raised while rendering a wrapped field value or a `format_lang`
/// call. Date parse failures indicate a data-integrity problem and are never
/// silently defaulted.
#[derive(Error, Debug, PartialEq)]
pub enum FormatError {
    #[error("malformed date/time value '{value}'")]
    DateParse { value: String },

    #[error("value '{value}' is not numeric")]
    NotNumeric { value: String },
}

/// Grouping and separator rules for one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberFormat {
    pub decimal_point: String,
    pub thousands_sep: String,
    /// Group sizes, rightmost first; the last entry repeats. Empty disables
    /// grouping.
    pub grouping: Vec<usize>,
    #[serde(default)]
    pub mon_decimal_point: Option<String>,
    #[serde(default)]
    pub mon_thousands_sep: Option<String>,
}

impl NumberFormat {
    /// Formats `value` with `digits` fractional digits, applying the
    /// language's separators. `monetary` switches to the monetary separator
    /// variants when the language defines them.
    pub fn format(&self, value: f64, digits: usize, grouping: bool, monetary: bool) -> String {
        let rendered = format!("{:.*}", digits, value.abs());
        let (int_part, frac_part) = match rendered.split_once('.') {
            Some((i, f)) => (i.to_string(), Some(f.to_string())),
            None => (rendered, None),
        };

        let thousands_sep = if monetary {
            self.mon_thousands_sep.as_deref().unwrap_or(&self.thousands_sep)
        } else {
            &self.thousands_sep
        };
        let decimal_point = if monetary {
            self.mon_decimal_point.as_deref().unwrap_or(&self.decimal_point)
        } else {
            &self.decimal_point
        };

        let int_part = if grouping && !self.grouping.is_empty() && !thousands_sep.is_empty() {
            group_digits(&int_part, thousands_sep, &self.grouping)
        } else {
            int_part
        };

        let mut out = String::new();
        if value.is_sign_negative() && (value != 0.0 || frac_part.is_some()) {
            out.push('-');
        }
        out.push_str(&int_part);
        if let Some(frac) = frac_part {
            out.push_str(decimal_point);
            out.push_str(&frac);
        }
        out
    }
}

fn group_digits(digits: &str, sep: &str, groups: &[usize]) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut chunks: Vec<String> = Vec::new();
    let mut pos = chars.len();
    let mut group_idx = 0;

    while pos > 0 {
        let size = groups[group_idx.min(groups.len() - 1)];
        if size == 0 {
            break;
        }
        let start = pos.saturating_sub(size);
        chunks.push(chars[start..pos].iter().collect());
        pos = start;
        group_idx += 1;
    }
    if pos > 0 {
        chunks.push(chars[..pos].iter().collect());
    }
    chunks.reverse();
    chunks.join(sep)
}

/// Formatting rules as stored in the locale registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocaleSpec {
    pub date_format: String,
    pub time_format: String,
    pub number_format: NumberFormat,
}

impl LocaleSpec {
    /// Built-in `en_US` rules, used when even the registry's default entry
    /// is missing.
    pub fn builtin_default() -> Self {
        LocaleSpec {
            date_format: "%m/%d/%Y".to_string(),
            time_format: "%H:%M:%S".to_string(),
            number_format: NumberFormat {
                decimal_point: ".".to_string(),
                thousands_sep: ",".to_string(),
                grouping: vec![3],
                mon_decimal_point: None,
                mon_thousands_sep: None,
            },
        }
    }
}

/// Resolved formatting rules for one language, active for part of a render.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageContext {
    pub code: String,
    pub date_format: String,
    pub time_format: String,
    pub number_format: NumberFormat,
}

impl LanguageContext {
    pub fn from_spec(code: &str, spec: LocaleSpec) -> Self {
        LanguageContext {
            code: code.to_string(),
            date_format: spec.date_format,
            time_format: spec.time_format,
            number_format: spec.number_format,
        }
    }

    /// Combined pattern for datetime output.
    pub fn datetime_format(&self) -> String {
        format!("{} {}", self.date_format, self.time_format)
    }
}

/// Collaborator that maps a language code to its formatting rules.
pub trait LocaleRegistry: Send + Sync {
    fn resolve(&self, code: &str) -> Result<LocaleSpec, LocaleError>;
}

/// In-memory registry, seeded with `en_US`.
#[derive(Debug, Clone, Default)]
pub struct StaticLocaleRegistry {
    specs: HashMap<String, LocaleSpec>,
}

impl StaticLocaleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.insert(DEFAULT_LANG, LocaleSpec::builtin_default());
        registry
    }

    pub fn insert(&mut self, code: &str, spec: LocaleSpec) {
        self.specs.insert(code.to_string(), spec);
    }
}

impl LocaleRegistry for StaticLocaleRegistry {
    fn resolve(&self, code: &str) -> Result<LocaleSpec, LocaleError> {
        self.specs
            .get(code)
            .cloned()
            .ok_or_else(|| LocaleError::UnknownCode(code.to_string()))
    }
}
