//! Predicate Collections
//!
//! A `PredicateCollection` holds the objects of one (subject, predicate)
//! pair. It loads lazily from the record store on first read. Appends and
//! single-value removals are queued and only reach the stores when the owning
//! Source is saved. Clearing is the exception: `remove_all` writes through to
//! both stores immediately.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::library::Library;
use crate::source::Source;
use crate::storage::{RelationObject, RelationTarget};
use crate::term::{Term, Triple, TriplePattern};
use crate::triple_store::TripleStore;
use crate::uri::{RDF_TYPE, SourceUri};
use crate::{Error, Result};

/// A value as seen by callers reading a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    Literal(String),
    Resource(SourceUri),
}

impl PropertyValue {
    pub fn as_str(&self) -> &str {
        match self {
            PropertyValue::Literal(v) => v,
            PropertyValue::Resource(uri) => uri.as_str(),
        }
    }

    pub fn to_term(&self) -> Term {
        match self {
            PropertyValue::Literal(v) => Term::literal(v.clone()),
            PropertyValue::Resource(uri) => Term::uri(uri.as_str()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Literal(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Literal(v)
    }
}

impl From<SourceUri> for PropertyValue {
    fn from(uri: SourceUri) -> Self {
        PropertyValue::Resource(uri)
    }
}

/// A value handed to a collection for writing
#[derive(Debug)]
pub enum ObjectValue {
    /// A literal. `"<uri>"` and `"<prefix:name>"` are read as resource references.
    Literal(String),
    Resource(SourceUri),
    /// A whole Source. Unsaved ones are saved together with the subject.
    Source(Source),
}

impl From<&str> for ObjectValue {
    fn from(v: &str) -> Self {
        ObjectValue::Literal(v.to_string())
    }
}

impl From<String> for ObjectValue {
    fn from(v: String) -> Self {
        ObjectValue::Literal(v)
    }
}

impl From<SourceUri> for ObjectValue {
    fn from(uri: SourceUri) -> Self {
        ObjectValue::Resource(uri)
    }
}

impl From<&SourceUri> for ObjectValue {
    fn from(uri: &SourceUri) -> Self {
        ObjectValue::Resource(uri.clone())
    }
}

impl From<Source> for ObjectValue {
    fn from(source: Source) -> Self {
        ObjectValue::Source(source)
    }
}

impl From<PropertyValue> for ObjectValue {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Literal(v) => ObjectValue::Literal(v),
            PropertyValue::Resource(uri) => ObjectValue::Resource(uri),
        }
    }
}

/// Sources appended to collections before they were saved, keyed by URI.
///
/// Appending a second unsaved Source with a URI already in the cache reuses
/// the first instance, so both collections end up pointing at one record.
/// Entries leave the cache when their Source is saved.
#[derive(Debug, Default)]
pub struct UnsavedSourceCache {
    sources: HashMap<String, Rc<RefCell<Source>>>,
}

impl UnsavedSourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the source unless its URI is cached already. Returns the cached
    /// instance either way.
    pub fn intern(&mut self, source: Source) -> Rc<RefCell<Source>> {
        self.sources
            .entry(source.uri().to_string())
            .or_insert_with(|| Rc::new(RefCell::new(source)))
            .clone()
    }

    pub fn get(&self, uri: &str) -> Option<Rc<RefCell<Source>>> {
        self.sources.get(uri).cloned()
    }

    pub fn remove(&mut self, uri: &str) -> Option<Rc<RefCell<Source>>> {
        self.sources.remove(uri)
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[derive(Debug, Clone)]
enum ItemValue {
    Literal(String),
    Resource(SourceUri),
    /// Reference to a Source that had no record when it was appended
    Pending { uri: SourceUri, source: Rc<RefCell<Source>> },
}

impl ItemValue {
    fn value(&self) -> PropertyValue {
        match self {
            ItemValue::Literal(v) => PropertyValue::Literal(v.clone()),
            ItemValue::Resource(uri) | ItemValue::Pending { uri, .. } => PropertyValue::Resource(uri.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct Item {
    key: u64,
    value: ItemValue,
    /// Set once the relation row exists
    relation_id: Option<i64>,
    order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingOp {
    Append(u64),
    Remove { relation_id: i64, term: Term },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    Unloaded,
    Loaded,
}

/// Outcome of writing queued operations, applied after the save commits
#[derive(Debug, Default)]
pub(crate) struct FlushReport {
    created: Vec<(u64, i64)>,
    pub(crate) removed: usize,
}

impl FlushReport {
    pub(crate) fn created(&self) -> usize {
        self.created.len()
    }
}

/// The objects of one (subject, predicate) pair
#[derive(Debug)]
pub struct PredicateCollection {
    subject: SourceUri,
    subject_id: Option<i64>,
    predicate: String,
    /// Objects are always resources (`rdf:type`)
    force_resource: bool,
    state: CollectionState,
    /// Visible items. While unloaded this holds only queued appends.
    items: Vec<Item>,
    pending: Vec<PendingOp>,
    next_key: u64,
}

impl PredicateCollection {
    pub fn new(subject: SourceUri, subject_id: Option<i64>, predicate: impl Into<String>) -> Self {
        let predicate = predicate.into();
        Self {
            force_resource: predicate == RDF_TYPE,
            subject,
            subject_id,
            predicate,
            state: CollectionState::Unloaded,
            items: Vec::new(),
            pending: Vec::new(),
            next_key: 0,
        }
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    pub fn subject(&self) -> &SourceUri {
        &self.subject
    }

    pub fn state(&self) -> CollectionState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == CollectionState::Loaded
    }

    /// No queued operations
    pub fn is_clean(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn bind_subject(&mut self, subject_id: Option<i64>) {
        self.subject_id = subject_id;
    }

    // ========== Reading ==========

    fn ensure_loaded(&mut self, lib: &Library) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let mut loaded = Vec::new();
        if let Some(subject_id) = self.subject_id {
            for relation in lib.records().fat_relations(subject_id, &self.predicate)? {
                let value = match relation.object {
                    RelationObject::Source { uri, .. } => ItemValue::Resource(SourceUri::parse(&uri)?),
                    RelationObject::Property { value, .. } => ItemValue::Literal(value),
                };
                loaded.push(Item {
                    key: self.take_key(),
                    value,
                    relation_id: Some(relation.id),
                    order: relation.order,
                });
            }
        }
        debug!("Loaded {} items for <{}> <{}>", loaded.len(), self.subject, self.predicate);
        loaded.append(&mut self.items);
        self.items = loaded;
        self.state = CollectionState::Loaded;
        Ok(())
    }

    /// All values, loading first if needed
    pub fn values(&mut self, lib: &Library) -> Result<Vec<PropertyValue>> {
        self.ensure_loaded(lib)?;
        Ok(self.items.iter().map(|i| i.value.value()).collect())
    }

    pub fn at(&mut self, lib: &Library, index: usize) -> Result<Option<PropertyValue>> {
        self.ensure_loaded(lib)?;
        Ok(self.items.get(index).map(|i| i.value.value()))
    }

    pub fn first(&mut self, lib: &Library) -> Result<Option<PropertyValue>> {
        self.at(lib, 0)
    }

    pub fn last(&mut self, lib: &Library) -> Result<Option<PropertyValue>> {
        self.ensure_loaded(lib)?;
        Ok(self.items.last().map(|i| i.value.value()))
    }

    /// Number of values. An untouched collection is counted in the record
    /// store without loading it.
    pub fn len(&mut self, lib: &Library) -> Result<usize> {
        if self.is_loaded() {
            return Ok(self.items.len());
        }
        if !self.items.is_empty() {
            self.ensure_loaded(lib)?;
            return Ok(self.items.len());
        }
        match self.subject_id {
            Some(subject_id) => lib.records().count_relations(subject_id, &self.predicate),
            None => Ok(0),
        }
    }

    pub fn is_empty(&mut self, lib: &Library) -> Result<bool> {
        Ok(self.len(lib)? == 0)
    }

    pub fn index_of(&mut self, lib: &Library, value: &PropertyValue) -> Result<Option<usize>> {
        self.ensure_loaded(lib)?;
        Ok(self.items.iter().position(|i| i.value.value() == *value))
    }

    pub fn contains(&mut self, lib: &Library, value: &PropertyValue) -> Result<bool> {
        Ok(self.index_of(lib, value)?.is_some())
    }

    pub fn join(&mut self, lib: &Library, separator: &str) -> Result<String> {
        let values = self.values(lib)?;
        Ok(values.iter().map(PropertyValue::as_str).collect::<Vec<_>>().join(separator))
    }

    // ========== Writing ==========

    /// Queue a value. Nothing is written until the subject is saved.
    pub fn append(&mut self, lib: &Library, value: impl Into<ObjectValue>) -> Result<()> {
        self.append_with_order(lib, value, None)
    }

    /// Queue a value with an explicit position in the persisted ordering
    pub fn append_with_order(
        &mut self,
        lib: &Library,
        value: impl Into<ObjectValue>,
        order: Option<i64>,
    ) -> Result<()> {
        let value = self.resolve(lib, value.into())?;
        let key = self.take_key();
        self.items.push(Item { key, value, relation_id: None, order });
        self.pending.push(PendingOp::Append(key));
        Ok(())
    }

    pub fn append_all<I, V>(&mut self, lib: &Library, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<ObjectValue>,
    {
        for value in values {
            self.append(lib, value)?;
        }
        Ok(())
    }

    /// Remove the first item equal to `value`. Returns false if there is none.
    /// A persisted item's relation is deleted on the next save.
    pub fn remove(&mut self, lib: &Library, value: &PropertyValue) -> Result<bool> {
        let Some(index) = self.index_of(lib, value)? else {
            return Ok(false);
        };
        self.remove_at(index);
        Ok(true)
    }

    fn remove_at(&mut self, index: usize) -> Item {
        let item = self.items.remove(index);
        match item.relation_id {
            Some(relation_id) => self.pending.push(PendingOp::Remove {
                relation_id,
                term: item.value.value().to_term(),
            }),
            None => self.pending.retain(|op| *op != PendingOp::Append(item.key)),
        }
        item
    }

    /// Replace `old` with `new` in place. Returns false if `old` is absent.
    pub fn replace(&mut self, lib: &Library, old: &PropertyValue, new: impl Into<ObjectValue>) -> Result<bool> {
        let Some(index) = self.index_of(lib, old)? else {
            return Ok(false);
        };
        let value = self.resolve(lib, new.into())?;
        let removed = self.remove_at(index);
        let key = self.take_key();
        self.items.insert(index, Item { key, value, relation_id: None, order: removed.order });
        self.pending.push(PendingOp::Append(key));
        Ok(true)
    }

    /// Clear the collection in both stores right away, whether or not it was
    /// loaded. Queued operations are dropped.
    pub fn remove_all(&mut self, lib: &Library) -> Result<usize> {
        let mut removed = 0;
        if let Some(subject_id) = self.subject_id {
            removed = lib.records().delete_relations(subject_id, &self.predicate)?;
        }
        let triples = lib
            .triples()
            .delete(&TriplePattern::subject_predicate(self.subject.as_str(), self.predicate.as_str()), None)?;
        debug!(
            "Cleared <{}> <{}>: {} relations, {} triples",
            self.subject, self.predicate, removed, triples
        );
        self.items.clear();
        self.pending.clear();
        self.state = CollectionState::Loaded;
        Ok(removed)
    }

    /// Clear, then queue the new values
    pub fn replace_all<I, V>(&mut self, lib: &Library, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<ObjectValue>,
    {
        self.remove_all(lib)?;
        self.append_all(lib, values)
    }

    /// Write one value to both stores immediately, bypassing the queue.
    /// The subject must already have a record.
    pub fn write_direct(&mut self, lib: &Library, value: impl Into<ObjectValue>) -> Result<()> {
        let Some(subject_id) = self.subject_id else {
            return Err(Error::UnsavedSource(self.subject.to_string()));
        };
        let value = self.resolve(lib, value.into())?;
        let relation_id = self.write_item(lib, subject_id, &value, None)?;
        if self.is_loaded() {
            let key = self.take_key();
            self.items.push(Item { key, value, relation_id: Some(relation_id), order: None });
        }
        Ok(())
    }

    /// Mark an untouched collection as loaded and empty without reading
    /// the stores
    pub fn init_as_empty(&mut self) -> Result<()> {
        if self.is_loaded() {
            return Err(Error::InvalidState(format!(
                "collection <{}> <{}> is already loaded",
                self.subject, self.predicate
            )));
        }
        self.items.clear();
        self.pending.clear();
        self.state = CollectionState::Loaded;
        Ok(())
    }

    // ========== Persistence ==========

    /// Write the queued operations. Collection state is left untouched so a
    /// rolled-back save can be retried; see `finish_flush`.
    pub(crate) fn flush(&self, lib: &Library, subject_id: i64) -> Result<FlushReport> {
        let mut report = FlushReport::default();
        for op in &self.pending {
            match op {
                PendingOp::Append(key) => {
                    let Some(item) = self.items.iter().find(|i| i.key == *key) else {
                        continue;
                    };
                    let relation_id = self.write_item(lib, subject_id, &item.value, item.order)?;
                    report.created.push((*key, relation_id));
                }
                PendingOp::Remove { relation_id, term } => {
                    lib.records().delete_relation(*relation_id)?;
                    // The triple store holds one triple for repeated equal values
                    if !lib.records().has_relation_to(subject_id, &self.predicate, term)? {
                        let triple = Triple::new(self.subject.as_str(), self.predicate.as_str(), term.clone());
                        lib.triples().delete(&TriplePattern::exact(&triple), None)?;
                    }
                    report.removed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Record a committed flush
    pub(crate) fn finish_flush(&mut self, report: FlushReport) {
        self.pending.clear();
        if !self.is_loaded() {
            // Persisted now; a later load brings them back from the store
            self.items.clear();
            return;
        }
        for (key, relation_id) in report.created {
            if let Some(item) = self.items.iter_mut().find(|i| i.key == key) {
                item.relation_id = Some(relation_id);
                if let ItemValue::Pending { uri, .. } = &item.value {
                    item.value = ItemValue::Resource(uri.clone());
                }
            }
        }
    }

    /// Insert the relation row and its triple
    fn write_item(&self, lib: &Library, subject_id: i64, value: &ItemValue, order: Option<i64>) -> Result<i64> {
        let target = match value {
            ItemValue::Literal(v) => RelationTarget::Property(lib.records().insert_property(v)?),
            ItemValue::Resource(uri) => RelationTarget::Source(lib.resolve_source_id(uri, None)?),
            ItemValue::Pending { uri, source } => RelationTarget::Source(lib.resolve_source_id(uri, Some(source))?),
        };
        let relation_id = lib.records().insert_relation(subject_id, &self.predicate, target, order)?;
        let triple = Triple::new(self.subject.as_str(), self.predicate.as_str(), value.value().to_term());
        lib.triples().add(&triple, lib.context())?;
        Ok(relation_id)
    }

    // ========== Value resolution ==========

    fn resolve(&self, lib: &Library, value: ObjectValue) -> Result<ItemValue> {
        match value {
            ObjectValue::Literal(text) => {
                let trimmed = text.trim();
                if self.force_resource {
                    return self.resolve_uri(lib, lib.namespaces().build_query_uri(trimmed)?);
                }
                if let Some(inner) = trimmed.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                    return self.resolve_uri(lib, lib.namespaces().build_query_uri(inner)?);
                }
                Ok(ItemValue::Literal(text))
            }
            ObjectValue::Resource(uri) => self.resolve_uri(lib, uri),
            ObjectValue::Source(source) => {
                if self.force_resource || !source.is_new_record() {
                    return self.resolve_uri(lib, source.uri().clone());
                }
                let uri = source.uri().clone();
                if uri == self.subject || lib.records().exists_uri(uri.as_str())? {
                    return Ok(ItemValue::Resource(uri));
                }
                let shared = lib.intern_unsaved(source);
                Ok(ItemValue::Pending { uri, source: shared })
            }
        }
    }

    fn resolve_uri(&self, lib: &Library, uri: SourceUri) -> Result<ItemValue> {
        if uri == self.subject || lib.records().exists_uri(uri.as_str())? {
            return Ok(ItemValue::Resource(uri));
        }
        match lib.unsaved_source(uri.as_str()) {
            Some(source) => Ok(ItemValue::Pending { uri, source }),
            // Created on flush if still missing then
            None => Ok(ItemValue::Resource(uri)),
        }
    }

    fn take_key(&mut self) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }
}
