//! The library context
//!
//! A `Library` owns both stores, the namespace registry, the attribute
//! classifier and the cache of unsaved Sources. Sources don't hold a
//! reference to it; every operation that touches storage takes `&Library`.
//!
//! The model is single-threaded: one logical operation owns a Source and its
//! collections for a whole read-modify-save cycle.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::classifier::AttributeClassifier;
use crate::collection::UnsavedSourceCache;
use crate::config::{LibraryConfig, ensure_db_dir};
use crate::query::{FindOptions, QueryEngine};
use crate::record::ColumnDescriptor;
use crate::source::Source;
use crate::storage::{DbStats, SqliteStore, SqliteTripleStore};
use crate::triple_store::{MemoryTripleStore, TripleStore};
use crate::uri::{Namespaces, RDF_TYPE, SourceUri};
use crate::{Error, Result};

pub struct Library {
    records: SqliteStore,
    triples: Box<dyn TripleStore>,
    namespaces: Namespaces,
    columns: Vec<ColumnDescriptor>,
    classifier: AttributeClassifier,
    unsaved: RefCell<UnsavedSourceCache>,
    rdf_context: Option<String>,
    default_types: Vec<String>,
    tx_depth: Cell<usize>,
    /// Sources saved inside an open transaction, with the depth they were
    /// saved at
    nested_saves: RefCell<Vec<(usize, Rc<RefCell<Source>>)>>,
}

impl Library {
    /// Assemble a library from already opened stores
    pub fn new(records: SqliteStore, triples: Box<dyn TripleStore>, config: &LibraryConfig) -> Result<Self> {
        let namespaces = config.build_namespaces();
        let columns = records.content_columns()?;
        let classifier = AttributeClassifier::new(columns.clone(), namespaces.clone());
        if config.rdf_context.is_some() && !triples.supports_contexts() {
            warn!("Triple store '{}' ignores contexts; rdf_context is unused", triples.name());
        }
        Ok(Self {
            records,
            triples,
            namespaces,
            columns,
            classifier,
            unsaved: RefCell::new(UnsavedSourceCache::new()),
            rdf_context: config.rdf_context.clone(),
            default_types: config.default_types.clone(),
            tx_depth: Cell::new(0),
            nested_saves: RefCell::new(Vec::new()),
        })
    }

    /// Open the stores named by the config, relative to `base`
    pub fn open(config: &LibraryConfig, base: &Path) -> Result<Self> {
        let records_path = config.records_path_in(base);
        ensure_db_dir(&records_path)?;
        let records = SqliteStore::open(&records_path)?;

        let triples: Box<dyn TripleStore> = match config.triples_path_in(base) {
            Some(path) => {
                ensure_db_dir(&path)?;
                Box::new(SqliteTripleStore::open(&path)?)
            }
            None => Box::new(MemoryTripleStore::new()),
        };
        info!("Opened library at {} ({} triple store)", records_path.display(), triples.name());
        Self::new(records, triples, config)
    }

    /// In-memory record store and triple store with the default config
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(&LibraryConfig::default())
    }

    pub fn open_in_memory_with(config: &LibraryConfig) -> Result<Self> {
        Self::new(SqliteStore::open_in_memory()?, Box::new(MemoryTripleStore::new()), config)
    }

    pub fn records(&self) -> &SqliteStore {
        &self.records
    }

    pub fn triples(&self) -> &dyn TripleStore {
        self.triples.as_ref()
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    pub fn classifier(&self) -> &AttributeClassifier {
        &self.classifier
    }

    /// Content columns of the record store
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Context for triple writes, if configured and supported
    pub fn context(&self) -> Option<&str> {
        self.rdf_context
            .as_deref()
            .filter(|_| self.triples.supports_contexts())
    }

    /// Run `f` inside a record-store transaction. Nested calls use a
    /// savepoint, so an inner failure only undoes the inner work.
    pub fn transaction<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let depth = self.tx_depth.get();
        let savepoint = format!("semlib_{}", depth);
        if depth == 0 {
            self.records.begin_transaction()?;
        } else {
            self.records.savepoint(&savepoint)?;
        }
        self.tx_depth.set(depth + 1);
        let result = f();
        self.tx_depth.set(depth);

        match result {
            Ok(value) => {
                let finished = if depth == 0 {
                    self.records.commit()
                } else {
                    self.records.release_savepoint(&savepoint)
                };
                if let Err(e) = finished {
                    self.undo(depth, &savepoint);
                    return Err(e);
                }
                if depth == 0 {
                    self.settle_nested_saves(depth, true);
                }
                Ok(value)
            }
            Err(e) => {
                self.undo(depth, &savepoint);
                Err(e)
            }
        }
    }

    fn undo(&self, depth: usize, savepoint: &str) {
        let undone = if depth == 0 {
            self.records.rollback()
        } else {
            self.records.rollback_to_savepoint(savepoint)
        };
        if let Err(e) = undone {
            warn!("Rollback failed: {}", e);
        }
        self.settle_nested_saves(depth, false);
    }

    /// Commit or abandon the nested saves made deeper than `depth`
    fn settle_nested_saves(&self, depth: usize, committed: bool) {
        let settled: Vec<_> = {
            let mut nested = self.nested_saves.borrow_mut();
            let (settled, kept): (Vec<_>, Vec<_>) = nested.drain(..).partition(|(saved_at, _)| *saved_at > depth);
            *nested = kept;
            settled
        };
        for (_, shared) in settled {
            let Ok(mut source) = shared.try_borrow_mut() else {
                warn!("Nested save left unsettled: source is borrowed");
                continue;
            };
            if committed {
                source.commit_deferred(self);
            } else {
                source.abandon_deferred();
            }
        }
    }

    // ========== Sources ==========

    /// Build a Source for the URI (bare names go to the local namespace).
    ///
    /// An existing record is loaded, unless types were given: asking to
    /// create a typed Source over an existing one fails with
    /// `DuplicateIdentifier`. A new Source gets the given types plus the
    /// configured default types.
    pub fn new_source(&self, uri: &str, types: &[&str]) -> Result<Source> {
        let uri = self.namespaces.build_query_uri(uri)?;
        if let Some(record) = self.records.find_by_uri(uri.as_str())? {
            if !types.is_empty() {
                return Err(Error::DuplicateIdentifier(uri.to_string()));
            }
            return Source::from_record(record);
        }

        let mut source = Source::build(uri, &self.columns);
        let type_collection = source.collection_for(RDF_TYPE);
        let defaults = self.default_types.iter().map(String::as_str);
        for type_uri in types.iter().copied().chain(defaults) {
            type_collection.append(self, type_uri)?;
        }
        Ok(source)
    }

    /// Find one Source by URI
    pub fn find(&self, uri: &str) -> Result<Source> {
        QueryEngine::new(self).find(uri)
    }

    /// Find several Sources by URI, failing if any is missing
    pub fn find_many(&self, uris: &[&str]) -> Result<Vec<Source>> {
        QueryEngine::new(self).find_many(uris)
    }

    pub fn find_first(&self, options: &FindOptions) -> Result<Option<Source>> {
        QueryEngine::new(self).find_first(options)
    }

    pub fn find_all(&self, options: &FindOptions) -> Result<Vec<Source>> {
        QueryEngine::new(self).find_all(options)
    }

    pub fn count(&self, options: &FindOptions) -> Result<usize> {
        QueryEngine::new(self).count(options)
    }

    pub fn find_by_uri_token(&self, token: &str, options: &FindOptions) -> Result<Vec<Source>> {
        QueryEngine::new(self).find_by_uri_token(token, options)
    }

    pub fn find_by_partial_local(&self, prefix: &str, local_part: &str, options: &FindOptions) -> Result<Vec<Source>> {
        QueryEngine::new(self).find_by_partial_local(prefix, local_part, options)
    }

    pub fn find_by_partial_uri(&self, fragment: &str, options: &FindOptions) -> Result<Vec<Source>> {
        QueryEngine::new(self).find_by_partial_uri(fragment, options)
    }

    /// Whether a record exists. The triple store is not consulted.
    pub fn exists(&self, uri: &str) -> Result<bool> {
        let uri = self.namespaces.build_query_uri(uri)?;
        self.records.exists_uri(uri.as_str())
    }

    // ========== Unsaved source cache ==========

    pub(crate) fn intern_unsaved(&self, source: Source) -> Rc<RefCell<Source>> {
        self.unsaved.borrow_mut().intern(source)
    }

    /// A Source appended somewhere before it was saved
    pub fn unsaved_source(&self, uri: &str) -> Option<Rc<RefCell<Source>>> {
        self.unsaved.borrow().get(uri)
    }

    pub(crate) fn forget_unsaved(&self, uri: &str) {
        if self.unsaved.borrow_mut().remove(uri).is_some() {
            debug!("Dropped {} from the unsaved source cache", uri);
        }
    }

    pub fn unsaved_count(&self) -> usize {
        self.unsaved.borrow().len()
    }

    pub fn clear_unsaved_cache(&self) {
        self.unsaved.borrow_mut().clear();
    }

    /// Scope the unsaved source cache to one import run. The cache is
    /// cleared when the run starts and when the returned guard drops.
    pub fn import_run(&self) -> ImportRun<'_> {
        self.clear_unsaved_cache();
        ImportRun { library: self }
    }

    /// Record id for a related URI, saving the pending Source (or a bare
    /// new one) if no record exists yet
    pub(crate) fn resolve_source_id(
        &self,
        uri: &SourceUri,
        pending: Option<&Rc<RefCell<Source>>>,
    ) -> Result<i64> {
        if let Some(id) = self.records.id_for_uri(uri.as_str())? {
            return Ok(id);
        }
        let shared = match pending {
            Some(source) => Rc::clone(source),
            None => self.intern_unsaved(Source::build(uri.clone(), &self.columns)),
        };
        let mut source = shared
            .try_borrow_mut()
            .map_err(|_| Error::InvalidState(format!("{} is already being saved", uri)))?;
        let depth = self.tx_depth.get();
        if depth == 0 {
            source.save(self)?;
        } else {
            source.save_nested(self)?;
            self.nested_saves.borrow_mut().push((depth, Rc::clone(&shared)));
        }
        source
            .id()
            .ok_or_else(|| Error::InvalidState(format!("{} has no id after save", uri)))
    }

    pub fn stats(&self) -> Result<LibraryStats> {
        Ok(LibraryStats {
            records: self.records.stats()?,
            triples: self.triples.len()?,
            triple_store: self.triples.name(),
            unsaved: self.unsaved_count(),
        })
    }
}

/// Guard returned by [`Library::import_run`]
pub struct ImportRun<'a> {
    library: &'a Library,
}

impl ImportRun<'_> {
    pub fn library(&self) -> &Library {
        self.library
    }
}

impl Drop for ImportRun<'_> {
    fn drop(&mut self) {
        let leftover = self.library.unsaved_count();
        if leftover > 0 {
            debug!("Import run left {} unsaved sources behind", leftover);
        }
        self.library.clear_unsaved_cache();
    }
}

/// Library statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct LibraryStats {
    pub records: DbStats,
    pub triples: usize,
    pub triple_store: &'static str,
    pub unsaved: usize,
}

impl fmt::Display for LibraryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.records)?;
        writeln!(f, "  Triples: {} ({})", self.triples, self.triple_store)?;
        writeln!(f, "  Unsaved sources: {}", self.unsaved)
    }
}
