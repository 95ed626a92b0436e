//! Source entities
//!
//! A `Source` is a row in the record store and a subject in the triple
//! store at the same time. Relational columns are buffered until `save`;
//! predicates live in per-predicate [`PredicateCollection`]s.
//!
//! Saving runs three steps inside one record-store transaction:
//! 1. delete the dupe triples (column values mirrored as `talia_db:<column>`)
//! 2. validate and write the record
//! 3. write fresh dupe triples and flush every dirty collection
//!
//! The triple store is not covered by the transaction. If step 2 fails the
//! deletions from step 1 stay; [`SaveProgress`] records how far a save got so
//! a retry can repair the triple store.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::classifier::Attribute;
use crate::collection::{FlushReport, ObjectValue, PredicateCollection, PropertyValue};
use crate::library::Library;
use crate::record::{ColumnDescriptor, DbValue, SourceRecord, ValidationErrors};
use crate::term::{Term, Triple, TriplePattern};
use crate::triple_store::TripleStore;
use crate::uri::{RDF_TYPE, RDFS_LABEL, SourceUri};
use crate::{Error, Result};

/// Lifecycle of a Source instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    /// Built in memory, no record yet
    New,
    Persisted,
    /// Terminal
    Destroyed,
}

impl SourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceState::New => "new",
            SourceState::Persisted => "persisted",
            SourceState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How far the last save got
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveProgress {
    /// Step 1 done: number of dupe triples deleted
    pub dupes_removed: Option<usize>,
    /// Step 2 done (not yet committed)
    pub record_written: bool,
    /// Step 3: number of dupe triples written
    pub dupes_written: Option<usize>,
    /// Step 3: relations created or removed by collection flushes
    pub relations_flushed: Option<usize>,
    /// The record-store transaction committed
    pub committed: bool,
}

impl SaveProgress {
    pub fn is_complete(&self) -> bool {
        self.committed
    }

    /// The triple store was touched but the record store rolled back, so the
    /// dupe triples may be missing until the next successful save
    pub fn needs_repair(&self) -> bool {
        self.dupes_removed.is_some() && !self.committed
    }
}

/// Result of the dynamic attribute accessor
#[derive(Debug)]
pub enum AttributeRef<'a> {
    Column(DbValue),
    Predicate(&'a mut PredicateCollection),
}

impl AttributeRef<'_> {
    pub fn is_column(&self) -> bool {
        matches!(self, AttributeRef::Column(_))
    }
}

/// Outcome of a save that ran inside another save's transaction. Applied
/// when the outermost transaction commits, dropped when it rolls back.
#[derive(Debug)]
struct DeferredSave {
    was_new: bool,
    reports: Vec<(String, FlushReport)>,
}

/// A dual-natured library entity
#[derive(Debug)]
pub struct Source {
    uri: SourceUri,
    record: SourceRecord,
    state: SourceState,
    collections: BTreeMap<String, PredicateCollection>,
    errors: ValidationErrors,
    last_save: SaveProgress,
    deferred: Option<DeferredSave>,
}

impl Source {
    /// Build an unsaved source with column defaults
    pub(crate) fn build(uri: SourceUri, columns: &[ColumnDescriptor]) -> Self {
        Self {
            record: SourceRecord::new(uri.as_str(), columns),
            uri,
            state: SourceState::New,
            collections: BTreeMap::new(),
            errors: ValidationErrors::new(),
            last_save: SaveProgress::default(),
            deferred: None,
        }
    }

    /// Wrap a record loaded from the record store
    pub(crate) fn from_record(record: SourceRecord) -> Result<Self> {
        Ok(Self {
            uri: SourceUri::parse(&record.uri)?,
            record,
            state: SourceState::Persisted,
            collections: BTreeMap::new(),
            errors: ValidationErrors::new(),
            last_save: SaveProgress::default(),
            deferred: None,
        })
    }

    pub fn uri(&self) -> &SourceUri {
        &self.uri
    }

    pub fn id(&self) -> Option<i64> {
        self.record.id
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn is_new_record(&self) -> bool {
        self.state == SourceState::New
    }

    pub fn record(&self) -> &SourceRecord {
        &self.record
    }

    /// Validation messages from the last save
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn last_save(&self) -> &SaveProgress {
        &self.last_save
    }

    // ========== Relational columns ==========

    pub fn column(&self, name: &str) -> Option<&DbValue> {
        self.record.get(name)
    }

    /// Buffer a column value until the next save
    pub fn set_column(&mut self, name: &str, value: impl Into<DbValue>) -> Result<()> {
        if !self.record.columns.contains_key(name) {
            return Err(Error::InvalidAttribute(format!("'{}' is not a writable column", name)));
        }
        self.record.set(name, value.into());
        Ok(())
    }

    fn set_column_json(&mut self, column: &ColumnDescriptor, value: &Value) -> Result<()> {
        if column.name == "uri" {
            if value.as_str() == Some(self.uri.as_str()) {
                return Ok(());
            }
            return Err(Error::InvalidAttribute("uri cannot be changed".to_string()));
        }
        let value = DbValue::from_json(column, value)?;
        self.set_column(&column.name, value)
    }

    // ========== Predicates ==========

    /// The collection for a full predicate URI, created on first use
    pub fn collection_for(&mut self, predicate: &str) -> &mut PredicateCollection {
        let subject = &self.uri;
        let subject_id = self.record.id;
        self.collections
            .entry(predicate.to_string())
            .or_insert_with(|| PredicateCollection::new(subject.clone(), subject_id, predicate))
    }

    /// The collection for a predicate name (`prefix:name`, URI or bare name)
    pub fn predicate(&mut self, lib: &Library, name: &str) -> Result<&mut PredicateCollection> {
        match lib.classifier().classify(name) {
            Attribute::Column(column) => Err(Error::InvalidAttribute(format!(
                "'{}' is a relational column, not a predicate",
                column.name
            ))),
            Attribute::Registered(predicate) | Attribute::Unregistered(predicate) => {
                Ok(self.collection_for(&predicate))
            }
        }
    }

    /// Dynamic accessor: a column value or the predicate collection
    pub fn attribute(&mut self, lib: &Library, name: &str) -> Result<AttributeRef<'_>> {
        match lib.classifier().classify(name) {
            Attribute::Column(column) if column.name == "uri" => {
                Ok(AttributeRef::Column(DbValue::Text(self.uri.to_string())))
            }
            Attribute::Column(column) => Ok(AttributeRef::Column(
                self.record.get(&column.name).cloned().unwrap_or_default(),
            )),
            Attribute::Registered(predicate) | Attribute::Unregistered(predicate) => {
                Ok(AttributeRef::Predicate(self.collection_for(&predicate)))
            }
        }
    }

    /// Dynamic setter. Columns are buffered; a predicate is replaced right
    /// away (cleared in both stores, new values queued).
    pub fn set_attribute(&mut self, lib: &Library, name: &str, value: &Value) -> Result<()> {
        match lib.classifier().classify(name) {
            Attribute::Column(column) => self.set_column_json(&column, value),
            Attribute::Registered(predicate) | Attribute::Unregistered(predicate) => {
                let values = object_values(value)?;
                self.collection_for(&predicate).replace_all(lib, values)
            }
        }
    }

    pub fn types(&mut self, lib: &Library) -> Result<Vec<PropertyValue>> {
        self.collection_for(RDF_TYPE).values(lib)
    }

    pub fn predicate_set(&mut self, lib: &Library, name: &str, value: impl Into<ObjectValue>) -> Result<()> {
        self.predicate(lib, name)?.append(lib, value)
    }

    /// Append only if the value is not present yet
    pub fn predicate_set_uniq(&mut self, lib: &Library, name: &str, value: impl Into<ObjectValue>) -> Result<()> {
        let value = value.into();
        let probe = match &value {
            ObjectValue::Literal(v) => PropertyValue::Literal(v.clone()),
            ObjectValue::Resource(uri) => PropertyValue::Resource(uri.clone()),
            ObjectValue::Source(source) => PropertyValue::Resource(source.uri().clone()),
        };
        let collection = self.predicate(lib, name)?;
        if !collection.contains(lib, &probe)? {
            collection.append(lib, value)?;
        }
        Ok(())
    }

    /// Replace all values of a predicate with one value
    pub fn predicate_replace(&mut self, lib: &Library, name: &str, value: impl Into<ObjectValue>) -> Result<()> {
        let collection = self.predicate(lib, name)?;
        collection.remove_all(lib)?;
        collection.append(lib, value)
    }

    /// Write a value to both stores immediately. An unsaved Source given as
    /// the value is saved first.
    pub fn write_predicate_direct(&mut self, lib: &Library, name: &str, value: impl Into<ObjectValue>) -> Result<()> {
        let value = match value.into() {
            ObjectValue::Source(mut source) if source.is_new_record() => {
                source.save(lib)?;
                ObjectValue::Resource(source.uri().clone())
            }
            other => other,
        };
        self.predicate(lib, name)?.write_direct(lib, value)
    }

    /// Predicates used where this source is the subject
    pub fn direct_predicates(&self, lib: &Library) -> Result<Vec<String>> {
        lib.records().direct_predicates(self.require_id()?)
    }

    /// Predicates used where this source is the object
    pub fn inverse_predicates(&self, lib: &Library) -> Result<Vec<String>> {
        lib.records().inverse_predicates(self.require_id()?)
    }

    /// Sources pointing at this one through the predicate
    pub fn inverse(&self, lib: &Library, name: &str) -> Result<Vec<Source>> {
        let predicate = lib
            .classifier()
            .classify(name)
            .predicate()
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidAttribute(format!("'{}' is a relational column", name)))?;
        lib.records()
            .inverse_subjects(self.require_id()?, &predicate)?
            .into_iter()
            .map(Source::from_record)
            .collect()
    }

    /// Label values (rdfs:label unless another predicate is given), falling
    /// back to the local name of the URI
    pub fn labels(&mut self, lib: &Library, predicate: Option<&str>) -> Result<Vec<String>> {
        let values = match predicate {
            Some(name) => self.predicate(lib, name)?.values(lib)?,
            None => self.collection_for(RDFS_LABEL).values(lib)?,
        };
        if values.is_empty() {
            return Ok(vec![self.uri.local_name().to_string()]);
        }
        Ok(values.into_iter().map(|v| v.as_str().to_string()).collect())
    }

    pub fn label(&mut self, lib: &Library, predicate: Option<&str>) -> Result<String> {
        Ok(self.labels(lib, predicate)?.into_iter().next().unwrap_or_default())
    }

    /// All predicate values: persisted predicates plus collections touched
    /// in memory
    pub fn properties(&mut self, lib: &Library) -> Result<BTreeMap<String, Vec<PropertyValue>>> {
        let mut predicates: Vec<String> = match self.record.id {
            Some(id) => lib.records().direct_predicates(id)?,
            None => Vec::new(),
        };
        predicates.extend(self.collections.keys().cloned());
        predicates.sort();
        predicates.dedup();

        let mut properties = BTreeMap::new();
        for predicate in predicates {
            let values = self.collection_for(&predicate).values(lib)?;
            if !values.is_empty() {
                properties.insert(predicate, values);
            }
        }
        Ok(properties)
    }

    fn require_id(&self) -> Result<i64> {
        match (self.state, self.record.id) {
            (SourceState::Persisted, Some(id)) => Ok(id),
            _ => Err(Error::UnsavedSource(self.uri.to_string())),
        }
    }

    // ========== Bulk attributes ==========

    /// Set columns and add predicate values from a mixed map, then save
    pub fn update_attributes(&mut self, lib: &Library, attributes: &Map<String, Value>) -> Result<()> {
        self.assign_attributes(lib, attributes, false)?;
        self.save(lib)
    }

    /// Set columns and replace predicate values from a mixed map, then save
    pub fn rewrite_attributes(&mut self, lib: &Library, attributes: &Map<String, Value>) -> Result<()> {
        self.assign_attributes(lib, attributes, true)?;
        self.save(lib)
    }

    fn assign_attributes(&mut self, lib: &Library, attributes: &Map<String, Value>, overwrite: bool) -> Result<()> {
        let split = lib.classifier().split(attributes);
        for (column, value) in &split.columns {
            self.set_column_json(column, value)?;
        }
        for (predicate, values) in split.predicates {
            let values = values.iter().map(object_value).collect::<Result<Vec<_>>>()?;
            let collection = self.collection_for(&predicate);
            if overwrite {
                collection.replace_all(lib, values)?;
            } else {
                collection.append_all(lib, values)?;
            }
        }
        Ok(())
    }

    // ========== Persistence ==========

    /// Save the source. Validation failures come back as `Error::Validation`
    /// and are kept in `errors()`.
    pub fn save(&mut self, lib: &Library) -> Result<()> {
        self.save_with(lib, false)
    }

    /// Save a related Source while another save's transaction is open.
    /// Collection and cache bookkeeping waits for `commit_deferred`.
    pub(crate) fn save_nested(&mut self, lib: &Library) -> Result<()> {
        self.save_with(lib, true)
    }

    fn save_with(&mut self, lib: &Library, nested: bool) -> Result<()> {
        if self.state == SourceState::Destroyed {
            return Err(Error::InvalidState(format!("{} has been destroyed", self.uri)));
        }
        self.errors = ValidationErrors::new();
        let was_new = self.is_new_record();
        let mut progress = SaveProgress::default();

        let outcome = lib.transaction(|| self.save_steps(lib, &mut progress));
        match outcome {
            Ok(reports) if nested => {
                debug!("Saved {} (id {:?}) pending the enclosing commit", self.uri, self.record.id);
                self.deferred = Some(DeferredSave { was_new, reports });
                self.last_save = progress;
                Ok(())
            }
            Ok(reports) => {
                progress.committed = true;
                self.finish_flushes(reports);
                self.state = SourceState::Persisted;
                lib.forget_unsaved(self.uri.as_str());
                info!(
                    "Saved {} (id {:?}, {} relation changes)",
                    self.uri,
                    self.record.id,
                    progress.relations_flushed.unwrap_or_default()
                );
                self.last_save = progress;
                Ok(())
            }
            Err(e) => {
                if was_new {
                    self.bind_id(None);
                }
                warn!("Save of {} failed: {}", self.uri, e);
                if progress.needs_repair() {
                    warn!("Dupe triples of {} were removed and not rewritten", self.uri);
                }
                self.last_save = progress;
                Err(e)
            }
        }
    }

    /// Complete a nested save after the outermost transaction committed
    pub(crate) fn commit_deferred(&mut self, lib: &Library) {
        let Some(deferred) = self.deferred.take() else {
            return;
        };
        self.finish_flushes(deferred.reports);
        self.state = SourceState::Persisted;
        self.last_save.committed = true;
        lib.forget_unsaved(self.uri.as_str());
        info!("Saved {} (id {:?}) with its referencing source", self.uri, self.record.id);
    }

    /// Forget a nested save whose enclosing transaction rolled back. Queued
    /// collection operations are kept, so the next save writes them again.
    pub(crate) fn abandon_deferred(&mut self) {
        let Some(deferred) = self.deferred.take() else {
            return;
        };
        if deferred.was_new {
            self.bind_id(None);
        }
        warn!("Save of {} rolled back with its referencing source", self.uri);
    }

    fn finish_flushes(&mut self, reports: Vec<(String, FlushReport)>) {
        for (predicate, report) in reports {
            if let Some(collection) = self.collections.get_mut(&predicate) {
                collection.finish_flush(report);
            }
        }
    }

    /// Save, reporting validation failure as `Ok(false)`
    pub fn save_lenient(&mut self, lib: &Library) -> Result<bool> {
        match self.save(lib) {
            Ok(()) => Ok(true),
            Err(Error::Validation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn save_steps(&mut self, lib: &Library, progress: &mut SaveProgress) -> Result<Vec<(String, FlushReport)>> {
        let namespaces = lib.namespaces();

        // Step 1: outside the transaction's protection
        let mut removed = 0;
        for column in self.record.columns.keys() {
            let pattern = TriplePattern::subject_predicate(self.uri.as_str(), namespaces.db_field_predicate(column));
            removed += lib.triples().delete(&pattern, None)?;
        }
        progress.dupes_removed = Some(removed);

        // Step 2
        self.validate(lib)?;
        let id = match lib.records().id_for_uri(self.uri.as_str())? {
            Some(id) => {
                lib.records().update_source(id, &self.record)?;
                id
            }
            None => lib.records().insert_source(&self.record)?,
        };
        self.bind_id(Some(id));
        progress.record_written = true;

        // Step 3
        let mut written = 0;
        for (column, value) in &self.record.columns {
            if let Some(lexical) = value.lexical() {
                let triple = Triple::new(self.uri.as_str(), namespaces.db_field_predicate(column), Term::literal(lexical));
                lib.triples().add(&triple, lib.context())?;
                written += 1;
            }
        }
        progress.dupes_written = Some(written);

        let mut reports = Vec::new();
        let mut flushed = 0;
        for (predicate, collection) in &self.collections {
            if collection.is_clean() {
                continue;
            }
            let report = collection.flush(lib, id)?;
            flushed += report.created() + report.removed;
            reports.push((predicate.clone(), report));
        }
        progress.relations_flushed = Some(flushed);
        debug!("{}: {} dupes removed, {} written", self.uri, removed, written);
        Ok(reports)
    }

    fn validate(&mut self, lib: &Library) -> Result<()> {
        let mut errors = ValidationErrors::new();
        if self.uri.as_str() == lib.namespaces().local() {
            errors.add("uri", "cannot be the bare local namespace");
        }
        for column in lib.classifier().columns() {
            if column.name == "uri" || !column.required {
                continue;
            }
            if self.record.get(&column.name).is_none_or(DbValue::is_null) {
                errors.add(column.name.clone(), "can't be blank");
            }
        }
        if self.is_new_record() && lib.records().exists_uri(self.uri.as_str())? {
            errors.add("uri", "has already been taken");
        }
        if errors.is_empty() {
            return Ok(());
        }
        self.errors = errors.clone();
        Err(Error::Validation(errors))
    }

    fn bind_id(&mut self, id: Option<i64>) {
        self.record.id = id;
        for collection in self.collections.values_mut() {
            collection.bind_subject(id);
        }
    }

    /// Delete the record, every relation it takes part in, and every triple
    /// with this source as subject or object
    pub fn destroy(&mut self, lib: &Library) -> Result<()> {
        if self.state == SourceState::Destroyed {
            return Ok(());
        }
        if let Some(id) = self.record.id {
            let removed = lib.transaction(|| {
                let removed = lib.records().delete_relations_touching(id)?;
                lib.records().delete_source(id)?;
                Ok(removed)
            })?;
            debug!("Removed {} relations of {}", removed, self.uri);
        }
        let about = lib.triples().delete(&TriplePattern::about(self.uri.as_str()), None)?;
        let pointing = lib.triples().delete(&TriplePattern::pointing_to(self.uri.as_str()), None)?;
        lib.forget_unsaved(self.uri.as_str());

        self.bind_id(None);
        self.collections.clear();
        self.state = SourceState::Destroyed;
        info!("Destroyed {} ({} triples removed)", self.uri, about + pointing);
        Ok(())
    }
}

/// Turn a JSON attribute value into collection inputs
fn object_values(value: &Value) -> Result<Vec<ObjectValue>> {
    match value {
        Value::Array(items) => items.iter().map(object_value).collect(),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![object_value(other)?]),
    }
}

fn object_value(value: &Value) -> Result<ObjectValue> {
    match value {
        Value::String(s) => Ok(ObjectValue::Literal(s.clone())),
        Value::Number(n) => Ok(ObjectValue::Literal(n.to_string())),
        Value::Bool(b) => Ok(ObjectValue::Literal(b.to_string())),
        Value::Object(map) => match map.get("uri").and_then(Value::as_str) {
            Some(uri) => Ok(ObjectValue::Resource(SourceUri::parse(uri)?)),
            None => Err(Error::InvalidAttribute(format!("unsupported predicate value {}", value))),
        },
        other => Err(Error::InvalidAttribute(format!("unsupported predicate value {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_source_defaults() {
        let lib = Library::open_in_memory().unwrap();
        let source = lib.new_source("http://www.test.org/valid", &[]).unwrap();
        assert!(source.is_new_record());
        assert_eq!(source.id(), None);
        assert_eq!(source.column("workflow_state"), Some(&DbValue::Integer(0)));
        assert_eq!(source.column("primary_source"), Some(&DbValue::Boolean(false)));
    }

    #[test]
    fn test_save_writes_dupes() {
        let lib = Library::open_in_memory().unwrap();
        let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
        source.set_column("workflow_state", 3).unwrap();
        source.save(&lib).unwrap();

        let progress = source.last_save();
        assert!(progress.is_complete());
        assert_eq!(progress.dupes_written, Some(2));

        let pattern = TriplePattern::subject_predicate("http://x.org/a", lib.namespaces().db_field_predicate("workflow_state"));
        let dupes = lib.triples().matching(&pattern).unwrap();
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].object, Term::literal("3"));

        source.set_column("workflow_state", 4).unwrap();
        source.save(&lib).unwrap();
        let dupes = lib.triples().matching(&pattern).unwrap();
        assert_eq!(dupes, vec![Triple::new("http://x.org/a", pattern.predicate.clone().unwrap(), Term::literal("4"))]);
    }

    #[test]
    fn test_set_column_rejects_unknown() {
        let lib = Library::open_in_memory().unwrap();
        let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
        assert!(matches!(source.set_column("nonsense", 1), Err(Error::InvalidAttribute(_))));
    }

    #[test]
    fn test_attribute_routing() {
        let lib = Library::open_in_memory().unwrap();
        let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
        assert!(source.attribute(&lib, "workflow_state").unwrap().is_column());
        assert!(matches!(
            source.attribute(&lib, "uri").unwrap(),
            AttributeRef::Column(DbValue::Text(uri)) if uri == "http://x.org/a"
        ));
        match source.attribute(&lib, "dcns:title").unwrap() {
            AttributeRef::Predicate(c) => assert_eq!(c.predicate(), "http://purl.org/dc/elements/1.1/title"),
            AttributeRef::Column(_) => panic!("expected predicate"),
        }
        assert!(source.predicate(&lib, "name").is_err());
    }

    #[test]
    fn test_set_attribute_replaces() {
        let lib = Library::open_in_memory().unwrap();
        let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
        source.predicate_set(&lib, "dcns:title", "old").unwrap();
        source.set_attribute(&lib, "dcns:title", &json!(["new", "newer"])).unwrap();
        source.set_attribute(&lib, "workflow_state", &json!("7")).unwrap();
        source.save(&lib).unwrap();

        let mut loaded = lib.find("http://x.org/a").unwrap();
        let titles = loaded.predicate(&lib, "dcns:title").unwrap().values(&lib).unwrap();
        assert_eq!(titles, vec![PropertyValue::from("new"), PropertyValue::from("newer")]);
        assert_eq!(loaded.column("workflow_state"), Some(&DbValue::Integer(7)));
    }

    #[test]
    fn test_update_appends_rewrite_replaces() {
        let lib = Library::open_in_memory().unwrap();
        let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
        source.predicate_set(&lib, "dcns:title", "first").unwrap();
        source.save(&lib).unwrap();

        let update = json!({ "dcns:title": "second", "workflow_state": 2 });
        source.update_attributes(&lib, update.as_object().unwrap()).unwrap();
        let mut loaded = lib.find("http://x.org/a").unwrap();
        assert_eq!(
            loaded.predicate(&lib, "dcns:title").unwrap().values(&lib).unwrap(),
            vec![PropertyValue::from("first"), PropertyValue::from("second")]
        );

        let rewrite = json!({ "dcns:title": ["third"], "workflow_state": 5 });
        source.rewrite_attributes(&lib, rewrite.as_object().unwrap()).unwrap();
        let mut loaded = lib.find("http://x.org/a").unwrap();
        assert_eq!(
            loaded.predicate(&lib, "dcns:title").unwrap().values(&lib).unwrap(),
            vec![PropertyValue::from("third")]
        );
        assert_eq!(loaded.column("workflow_state"), Some(&DbValue::Integer(5)));
        let pattern = TriplePattern::subject_predicate("http://x.org/a", "http://purl.org/dc/elements/1.1/title");
        assert_eq!(lib.triples().matching(&pattern).unwrap().len(), 1);
    }

    #[test]
    fn test_uri_is_immutable() {
        let lib = Library::open_in_memory().unwrap();
        let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
        assert!(source.set_attribute(&lib, "uri", &json!("http://x.org/b")).is_err());
        assert!(source.set_attribute(&lib, "uri", &json!("http://x.org/a")).is_ok());
    }

    #[test]
    fn test_validation_local_namespace() {
        let lib = Library::open_in_memory().unwrap();
        let mut source = lib.new_source(lib.namespaces().local(), &[]).unwrap();
        assert!(!source.save_lenient(&lib).unwrap());
        assert_eq!(source.errors().on("uri"), vec!["cannot be the bare local namespace"]);
        assert!(source.is_new_record());
        assert_eq!(source.id(), None);
    }

    #[test]
    fn test_validation_required_column() {
        let lib = Library::open_in_memory().unwrap();
        let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
        source.set_column("primary_source", DbValue::Null).unwrap();
        let err = source.save(&lib).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(source.errors().on("primary_source"), vec!["can't be blank"]);
        assert!(!lib.exists("http://x.org/a").unwrap());
    }

    #[test]
    fn test_labels_fallback() {
        let lib = Library::open_in_memory().unwrap();
        let mut source = lib.new_source("http://x.org/things/moby", &[]).unwrap();
        assert_eq!(source.labels(&lib, None).unwrap(), vec!["moby"]);
        source.collection_for(RDFS_LABEL).append(&lib, "Moby Dick").unwrap();
        assert_eq!(source.label(&lib, None).unwrap(), "Moby Dick");
    }

    #[test]
    fn test_direct_predicates_need_record() {
        let lib = Library::open_in_memory().unwrap();
        let source = lib.new_source("http://x.org/a", &[]).unwrap();
        assert!(matches!(source.direct_predicates(&lib), Err(Error::UnsavedSource(_))));
        assert!(matches!(source.inverse_predicates(&lib), Err(Error::UnsavedSource(_))));
    }

    #[test]
    fn test_predicate_set_uniq_and_replace() {
        let lib = Library::open_in_memory().unwrap();
        let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
        source.predicate_set_uniq(&lib, "dcns:subject", "whales").unwrap();
        source.predicate_set_uniq(&lib, "dcns:subject", "whales").unwrap();
        assert_eq!(source.predicate(&lib, "dcns:subject").unwrap().len(&lib).unwrap(), 1);

        source.predicate_replace(&lib, "dcns:subject", "ships").unwrap();
        assert_eq!(
            source.predicate(&lib, "dcns:subject").unwrap().values(&lib).unwrap(),
            vec![PropertyValue::from("ships")]
        );
    }

    #[test]
    fn test_inverse() {
        let lib = Library::open_in_memory().unwrap();
        let mut author = lib.new_source("http://x.org/melville", &[]).unwrap();
        author.save(&lib).unwrap();

        let mut book = lib.new_source("http://x.org/moby", &[]).unwrap();
        book.predicate_set(&lib, "dcns:creator", author.uri()).unwrap();
        book.save(&lib).unwrap();

        let books = author.inverse(&lib, "dcns:creator").unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].uri().as_str(), "http://x.org/moby");
        assert_eq!(author.inverse_predicates(&lib).unwrap(), vec!["http://purl.org/dc/elements/1.1/creator"]);
    }

    #[test]
    fn test_write_predicate_direct_saves_value() {
        let lib = Library::open_in_memory().unwrap();
        let mut book = lib.new_source("http://x.org/moby", &[]).unwrap();
        book.save(&lib).unwrap();
        let author = lib.new_source("http://x.org/melville", &[]).unwrap();
        book.write_predicate_direct(&lib, "dcns:creator", author).unwrap();

        assert!(lib.exists("http://x.org/melville").unwrap());
        assert_eq!(book.direct_predicates(&lib).unwrap(), vec!["http://purl.org/dc/elements/1.1/creator"]);
    }

    #[test]
    fn test_destroy() {
        let lib = Library::open_in_memory().unwrap();
        let mut author = lib.new_source("http://x.org/melville", &[]).unwrap();
        author.save(&lib).unwrap();
        let mut book = lib.new_source("http://x.org/moby", &[]).unwrap();
        book.predicate_set(&lib, "dcns:creator", author.uri()).unwrap();
        book.predicate_set(&lib, "dcns:title", "Moby Dick").unwrap();
        book.save(&lib).unwrap();

        author.destroy(&lib).unwrap();
        assert_eq!(author.state(), SourceState::Destroyed);
        assert!(!lib.exists("http://x.org/melville").unwrap());
        assert!(lib.triples().matching(&TriplePattern::pointing_to("http://x.org/melville")).unwrap().is_empty());

        let mut book = lib.find("http://x.org/moby").unwrap();
        assert!(book.predicate(&lib, "dcns:creator").unwrap().values(&lib).unwrap().is_empty());
        assert_eq!(book.predicate(&lib, "dcns:title").unwrap().len(&lib).unwrap(), 1);
        assert!(author.save(&lib).is_err());
    }
}
