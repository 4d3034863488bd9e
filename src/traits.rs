//! Collaborator contracts consumed by the rendering pipeline, with
//! in-memory implementations for hosts and tests.
//!
//! Persistence, attachment storage, translation lookup and the actual
//! template-expression generators all live outside this crate; the pipeline
//! only sees these traits.

use crate::context::RenderContext;
use crate::report::ReportDescriptor;
use crate::value::{BrowseCache, FieldMeta, Record, RecordSet};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no record {id} in model '{model}'")]
    NotFound { model: String, id: i64 },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Error reported by a generator collaborator.
#[derive(Error, Debug)]
#[error("generator failed: {0}")]
pub struct GeneratorError(pub String);

/// Resolves object identifiers into attribute-bearing records, applying the
/// field-value wrapper factories for typed fields.
pub trait ObjectStore: Send + Sync {
    fn browse(&self, model: &str, ids: &[i64]) -> Result<RecordSet, StoreError>;
}

/// Looks up a persisted report descriptor by report code.
pub trait DescriptorStore: Send + Sync {
    fn find(&self, report_code: &str) -> Option<ReportDescriptor>;
}

/// Stores rendered documents as per-record attachments.
pub trait AttachmentStore: Send + Sync {
    /// Returns the stored bytes of an attachment with the given filename
    /// for `(model, record_id)`, if any.
    fn find(&self, filename: &str, model: &str, record_id: i64) -> Option<Vec<u8>>;

    /// Persists an attachment and commits immediately.
    fn save(
        &self,
        name: &str,
        filename: &str,
        bytes: &[u8],
        model: &str,
        record_id: i64,
    ) -> Result<(), StoreError>;
}

/// Translation-string lookup for template text.
pub trait TranslationStore: Send + Sync {
    fn translate(&self, report_code: &str, domain: &str, lang: &str, text: &str)
    -> Option<String>;
}

/// Walks a processed template tree, substitutes expressions against the
/// render context, and produces the rendered document bytes for one output
/// kind.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        template: &[u8],
        ctx: &mut RenderContext,
        logo: Option<&[u8]>,
        title: Option<&str>,
    ) -> Result<Vec<u8>, GeneratorError>;
}

/// Mapping from output-kind string to the generator that renders it.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &str, generator: Arc<dyn Generator>) {
        self.generators.insert(kind.to_string(), generator);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Generator>> {
        self.generators.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.generators.contains_key(kind)
    }
}

/// Object store over fixed in-memory rows.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    metas: Arc<BTreeMap<String, FieldMeta>>,
    rows: HashMap<(String, i64), BTreeMap<String, Value>>,
}

impl InMemoryObjectStore {
    pub fn new(metas: BTreeMap<String, FieldMeta>) -> Self {
        InMemoryObjectStore { metas: Arc::new(metas), rows: HashMap::new() }
    }

    pub fn insert(&mut self, model: &str, id: i64, mut fields: BTreeMap<String, Value>) {
        fields.entry("id".to_string()).or_insert(Value::from(id));
        self.rows.insert((model.to_string(), id), fields);
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn browse(&self, model: &str, ids: &[i64]) -> Result<RecordSet, StoreError> {
        let cache = BrowseCache::shared();
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            let row = self
                .rows
                .get(&(model.to_string(), id))
                .ok_or_else(|| StoreError::NotFound { model: model.to_string(), id })?;
            cache.borrow_mut().insert(model, id, row.clone());
            records.push(Record::new(model, id, Arc::clone(&self.metas), cache.clone()));
        }
        Ok(RecordSet::new(records, cache))
    }
}

/// Descriptor store over a fixed set of descriptors.
#[derive(Clone, Default)]
pub struct InMemoryDescriptorStore {
    descriptors: HashMap<String, ReportDescriptor>,
}

impl InMemoryDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, report_code: &str, descriptor: ReportDescriptor) {
        self.descriptors.insert(report_code.to_string(), descriptor);
    }
}

impl DescriptorStore for InMemoryDescriptorStore {
    fn find(&self, report_code: &str) -> Option<ReportDescriptor> {
        self.descriptors.get(report_code).cloned()
    }
}

/// Attachment store backed by a mutex-guarded map; `save` is its own commit.
#[derive(Debug, Default)]
pub struct InMemoryAttachmentStore {
    attachments: Mutex<HashMap<(String, i64, String), Vec<u8>>>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds an attachment, as if stored by an earlier render.
    pub fn seed(&self, filename: &str, bytes: &[u8], model: &str, record_id: i64) {
        self.attachments
            .lock()
            .expect("attachment store poisoned")
            .insert((model.to_string(), record_id, filename.to_string()), bytes.to_vec());
    }

    pub fn len(&self) -> usize {
        self.attachments.lock().expect("attachment store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AttachmentStore for InMemoryAttachmentStore {
    fn find(&self, filename: &str, model: &str, record_id: i64) -> Option<Vec<u8>> {
        self.attachments
            .lock()
            .expect("attachment store poisoned")
            .get(&(model.to_string(), record_id, filename.to_string()))
            .cloned()
    }

    fn save(
        &self,
        _name: &str,
        filename: &str,
        bytes: &[u8],
        model: &str,
        record_id: i64,
    ) -> Result<(), StoreError> {
        self.attachments
            .lock()
            .expect("attachment store poisoned")
            .insert((model.to_string(), record_id, filename.to_string()), bytes.to_vec());
        Ok(())
    }
}

/// Translation store that never translates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranslations;

impl TranslationStore for NoTranslations {
    fn translate(&self, _report: &str, _domain: &str, _lang: &str, _text: &str) -> Option<String> {
        None
    }
}

/// Translation store over fixed entries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTranslationStore {
    entries: HashMap<(String, String, String, String), String>,
}

impl InMemoryTranslationStore {
    pub fn insert(&mut self, report: &str, domain: &str, lang: &str, text: &str, translated: &str) {
        self.entries.insert(
            (report.to_string(), domain.to_string(), lang.to_string(), text.to_string()),
            translated.to_string(),
        );
    }
}

impl TranslationStore for InMemoryTranslationStore {
    fn translate(&self, report: &str, domain: &str, lang: &str, text: &str) -> Option<String> {
        self.entries
            .get(&(report.to_string(), domain.to_string(), lang.to_string(), text.to_string()))
            .cloned()
    }
}
