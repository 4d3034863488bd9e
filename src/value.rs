//! Field metadata, lazily-formatted value wrappers, and browsed records.
//!
//! Raw stored values are wrapped together with their field metadata so that
//! template expressions can stringify them without knowing locale rules.
//! Conversion is deferred to the moment a wrapper is rendered, against
//! whatever language context is active at that moment.

use crate::locale::{DATE_INPUT_FORMAT, DATETIME_INPUT_FORMAT, FormatError};
use crate::session::RenderSession;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Float,
    Integer,
    Date,
    DateTime,
    Char,
}

/// Type and precision information describing how a stored value should be
/// interpreted for formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub kind: FieldKind,
    /// Fractional digits for float fields.
    #[serde(default)]
    pub digits: Option<u8>,
}

impl FieldMeta {
    pub fn new(kind: FieldKind) -> Self {
        FieldMeta { kind, digits: None }
    }

    pub fn float(digits: u8) -> Self {
        FieldMeta { kind: FieldKind::Float, digits: Some(digits) }
    }
}

/// A raw field value bundled with enough metadata to render itself against
/// the active language context. Wrappers never outlive the render call that
/// created them.
#[derive(Debug, Clone)]
pub struct FormattedValue {
    pub kind: FieldKind,
    pub raw: Value,
    pub meta: Option<FieldMeta>,
    pub field: String,
    pub table: String,
    pub record_id: i64,
}

impl FormattedValue {
    /// A wrapper for a literal inserted by a helper, with no field metadata.
    pub fn literal(kind: FieldKind, raw: Value) -> Self {
        FormattedValue {
            kind,
            raw,
            meta: None,
            field: String::new(),
            table: String::new(),
            record_id: 0,
        }
    }

    /// Renders the value as display text under the session's currently
    /// active language.
    pub fn render(&self, session: &mut RenderSession) -> Result<String, FormatError> {
        match self.kind {
            FieldKind::Float => self.render_float(session),
            FieldKind::Integer => self.render_integer(session),
            FieldKind::Date => self.render_date(session, false),
            FieldKind::DateTime => self.render_date(session, true),
            FieldKind::Char => Ok(plain_string(&self.raw)),
        }
    }

    fn render_float(&self, session: &mut RenderSession) -> Result<String, FormatError> {
        let value = self.numeric_raw()?;
        let digits = self.meta.as_ref().and_then(|m| m.digits);
        match digits {
            Some(digits) => {
                let ctx = session.resolve_language();
                Ok(ctx
                    .number_format
                    .format(value.unwrap_or(0.0), digits as usize, true, false))
            }
            // Wrappers without metadata still stringify to a sane default.
            None => Ok(format!("{:.2}", value.unwrap_or(0.0))),
        }
    }

    fn render_integer(&self, session: &mut RenderSession) -> Result<String, FormatError> {
        let value = self.numeric_raw()?;
        match (&self.meta, value) {
            (Some(_), Some(v)) => {
                let ctx = session.resolve_language();
                Ok(ctx.number_format.format(v, 0, true, false))
            }
            (_, Some(v)) => Ok(format!("{}", v as i64)),
            (_, None) => Ok("0".to_string()),
        }
    }

    fn render_date(
        &self,
        session: &mut RenderSession,
        with_time: bool,
    ) -> Result<String, FormatError> {
        let raw = plain_string(&self.raw);
        if raw.is_empty() {
            return Ok(raw);
        }
        let ctx = session.resolve_language();
        if with_time {
            let parsed = NaiveDateTime::parse_from_str(&raw, DATETIME_INPUT_FORMAT)
                .map_err(|_| FormatError::DateParse { value: raw.clone() })?;
            Ok(parsed.format(&ctx.datetime_format()).to_string())
        } else {
            let parsed = NaiveDate::parse_from_str(&raw, DATE_INPUT_FORMAT)
                .map_err(|_| FormatError::DateParse { value: raw.clone() })?;
            Ok(parsed.format(&ctx.date_format).to_string())
        }
    }

    fn numeric_raw(&self) -> Result<Option<f64>, FormatError> {
        match &self.raw {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_f64()),
            Value::Bool(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(s) => s
                .parse::<f64>()
                .map(Some)
                .map_err(|_| FormatError::NotNumeric { value: s.clone() }),
            other => Err(FormatError::NotNumeric { value: other.to_string() }),
        }
    }
}

/// Renders a JSON value as plain display text, without quoting.
pub fn plain_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Field values fetched so far for the in-flight record set, keyed by
/// `(table, id)`. Shared between the records and the render session so a
/// mid-render language switch can migrate and reset entries.
#[derive(Debug, Default)]
pub struct BrowseCache {
    entries: HashMap<(String, i64), BTreeMap<String, Value>>,
}

pub type SharedCache = Rc<RefCell<BrowseCache>>;

impl BrowseCache {
    pub fn shared() -> SharedCache {
        Rc::new(RefCell::new(BrowseCache::default()))
    }

    pub fn insert(&mut self, table: &str, id: i64, fields: BTreeMap<String, Value>) {
        self.entries.insert((table.to_string(), id), fields);
    }

    pub fn get(&self, table: &str, id: i64, field: &str) -> Option<Value> {
        self.entries
            .get(&(table.to_string(), id))
            .and_then(|fields| fields.get(field))
            .cloned()
    }

    pub fn entries_mut(&mut self) -> &mut HashMap<(String, i64), BTreeMap<String, Value>> {
        &mut self.entries
    }
}

/// One browsed business object. Field reads go through the shared cache so
/// that language migration is visible to every outstanding record.
#[derive(Clone)]
pub struct Record {
    pub model: String,
    pub id: i64,
    metas: Arc<BTreeMap<String, FieldMeta>>,
    cache: SharedCache,
}

impl Record {
    pub fn new(
        model: &str,
        id: i64,
        metas: Arc<BTreeMap<String, FieldMeta>>,
        cache: SharedCache,
    ) -> Self {
        Record { model: model.to_string(), id, metas, cache }
    }

    pub fn meta(&self, field: &str) -> Option<&FieldMeta> {
        self.metas.get(field)
    }

    /// Raw cached value of a field; `None` when the field has not been
    /// fetched under the active language.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.cache.borrow().get(&self.model, self.id, field)
    }

    /// Wraps a field value for lazy, locale-aware rendering.
    pub fn formatted(&self, field: &str) -> FormattedValue {
        let meta = self.metas.get(field).cloned();
        let kind = meta.as_ref().map(|m| m.kind).unwrap_or(FieldKind::Char);
        FormattedValue {
            kind,
            raw: self.get(field).unwrap_or(Value::Null),
            meta,
            field: field.to_string(),
            table: self.model.clone(),
            record_id: self.id,
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({}, {})", self.model, self.id)
    }
}

/// The browsed objects of one render, sharing a single cache. Field access
/// broadcasts over the members.
#[derive(Clone)]
pub struct RecordSet {
    records: Vec<Record>,
    cache: SharedCache,
}

impl RecordSet {
    pub fn new(records: Vec<Record>, cache: SharedCache) -> Self {
        RecordSet { records, cache }
    }

    pub fn empty() -> Self {
        RecordSet { records: Vec::new(), cache: BrowseCache::shared() }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn ids(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Raw values of one field across all members, in order.
    pub fn pluck(&self, field: &str) -> Vec<Value> {
        self.records
            .iter()
            .map(|r| r.get(field).unwrap_or(Value::Null))
            .collect()
    }

    pub fn cache(&self) -> SharedCache {
        Rc::clone(&self.cache)
    }
}

impl fmt::Display for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record_set({})", self.records.len())
    }
}
