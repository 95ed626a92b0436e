//! End-to-end behavior of the dual store: save protocol, predicate
//! collections and finders working together.

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use semlib::config::{LibraryConfig, MEMORY_TRIPLES};
use semlib::term::{QueryPattern, Triple};
use semlib::{
    DbValue, Error, FindOptions, Library, MemoryTripleStore, PropertyValue, Result, SqliteStore, Term,
    TriplePattern, TripleStore,
};

const BOOK: &str = "http://ex.org/Book";
const TITLE: &str = "http://purl.org/dc/elements/1.1/title";

fn library() -> Library {
    Library::open_in_memory().unwrap()
}

fn create(lib: &Library, uri: &str, types: &[&str]) {
    lib.new_source(uri, types).unwrap().save(lib).unwrap();
}

fn uris(lib: &Library, options: &FindOptions) -> Vec<String> {
    lib.find_all(options)
        .unwrap()
        .iter()
        .map(|s| s.uri().to_string())
        .collect()
}

/// Triple store that can be switched to fail on writes, optionally only
/// for one predicate
struct FlakyTripleStore {
    inner: Rc<MemoryTripleStore>,
    fail_writes: Rc<Cell<bool>>,
    failing_predicate: Option<String>,
}

impl TripleStore for FlakyTripleStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn add(&self, triple: &Triple, context: Option<&str>) -> Result<()> {
        let targeted = self.failing_predicate.as_ref().is_none_or(|p| *p == triple.predicate);
        if self.fail_writes.get() && targeted {
            return Err(Error::TripleStore("connection lost".to_string()));
        }
        self.inner.add(triple, context)
    }

    fn delete(&self, pattern: &TriplePattern, context: Option<&str>) -> Result<usize> {
        self.inner.delete(pattern, context)
    }

    fn matching(&self, pattern: &TriplePattern) -> Result<Vec<Triple>> {
        self.inner.matching(pattern)
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }
}

fn flaky_library(failing_predicate: Option<&str>) -> (Library, Rc<MemoryTripleStore>, Rc<Cell<bool>>) {
    let inner = Rc::new(MemoryTripleStore::new());
    let fail_writes = Rc::new(Cell::new(false));
    let store = FlakyTripleStore {
        inner: Rc::clone(&inner),
        fail_writes: Rc::clone(&fail_writes),
        failing_predicate: failing_predicate.map(str::to_string),
    };
    let lib = Library::new(
        SqliteStore::open_in_memory().unwrap(),
        Box::new(store),
        &LibraryConfig::default(),
    )
    .unwrap();
    (lib, inner, fail_writes)
}

#[test]
fn test_columns_survive_save_and_find() {
    let lib = library();
    let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
    source.set_column("workflow_state", 7).unwrap();
    source.set_column("primary_source", true).unwrap();
    source.set_column("name", "Alpha").unwrap();
    source.save(&lib).unwrap();

    let found = lib.find("http://x.org/a").unwrap();
    for column in ["workflow_state", "primary_source", "name"] {
        assert_eq!(found.column(column), source.column(column), "column {}", column);
    }
}

#[test]
fn test_workflow_state_scenario() {
    let lib = library();
    let mut source = lib.new_source("http://x/a", &[]).unwrap();
    source.set_column("workflow_state", 3).unwrap();
    source.set_column("primary_source", false).unwrap();
    source.save(&lib).unwrap();

    assert!(lib.exists("http://x/a").unwrap());
    let found = lib.find("http://x/a").unwrap();
    assert_eq!(found.column("workflow_state"), Some(&DbValue::Integer(3)));
}

#[test]
fn test_appended_value_is_persisted() {
    let lib = library();
    let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
    source.predicate(&lib, "dcns:title").unwrap().append(&lib, "Faust").unwrap();
    source.save(&lib).unwrap();

    let mut found = lib.find("http://x.org/a").unwrap();
    let titles = found.predicate(&lib, "dcns:title").unwrap();
    assert!(titles.contains(&lib, &PropertyValue::from("Faust")).unwrap());

    let triple = Triple::new("http://x.org/a", TITLE, Term::literal("Faust"));
    assert!(lib.triples().contains(&TriplePattern::exact(&triple)).unwrap());
}

#[test]
fn test_remove_all_writes_through_without_save() {
    let lib = library();
    let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
    source
        .predicate(&lib, "dcns:title")
        .unwrap()
        .append_all(&lib, ["Faust", "Faust II"])
        .unwrap();
    source.save(&lib).unwrap();

    // never loaded, never saved afterwards
    let mut loaded = lib.find("http://x.org/a").unwrap();
    let titles = loaded.predicate(&lib, "dcns:title").unwrap();
    assert_eq!(titles.remove_all(&lib).unwrap(), 2);
    assert!(titles.is_empty(&lib).unwrap());

    let mut fresh = lib.find("http://x.org/a").unwrap();
    assert!(fresh.predicate(&lib, "dcns:title").unwrap().values(&lib).unwrap().is_empty());
    let pattern = TriplePattern::subject_predicate("http://x.org/a", TITLE);
    assert!(lib.triples().matching(&pattern).unwrap().is_empty());
}

#[test]
fn test_second_save_changes_nothing() {
    let lib = library();
    let mut source = lib.new_source("http://x.org/a", &[BOOK]).unwrap();
    source.predicate(&lib, "dcns:title").unwrap().append(&lib, "Faust").unwrap();
    source.save(&lib).unwrap();

    let stats = lib.stats().unwrap();
    let about = || -> HashSet<Triple> {
        lib.triples().matching(&TriplePattern::about("http://x.org/a")).unwrap().into_iter().collect()
    };
    let triples = about();

    source.save(&lib).unwrap();
    let again = lib.stats().unwrap();
    assert_eq!(again.records.relations, stats.records.relations);
    assert_eq!(again.records.properties, stats.records.properties);
    assert_eq!(again.triples, stats.triples);
    assert_eq!(about(), triples);
}

#[test]
fn test_find_first_is_first_of_find_all() {
    let lib = library();
    for n in 0..4 {
        create(&lib, &format!("http://x.org/{}", n), &[BOOK]);
    }
    let options = FindOptions::new().type_of(BOOK).order_by_desc("uri");
    let first = lib.find_first(&options).unwrap().unwrap();
    let all = lib.find_all(&options.clone().limit(1)).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(first.uri(), all[0].uri());
    assert_eq!(first.uri().as_str(), "http://x.org/3");

    assert!(lib.find_first(&FindOptions::new().type_of("http://ex.org/Film")).unwrap().is_none());
}

#[test]
fn test_pages_cover_the_full_result() {
    let lib = library();
    for n in 0..7 {
        create(&lib, &format!("http://x.org/{}", n), &[BOOK]);
    }
    create(&lib, "http://x.org/other", &[]);

    let full = uris(&lib, &FindOptions::new().type_of(BOOK));
    assert_eq!(full.len(), 7);

    for plan in [FindOptions::new().type_of(BOOK), FindOptions::new().type_of(BOOK).force_rdf()] {
        let mut paged = Vec::new();
        let mut offset = 0;
        loop {
            let page = uris(&lib, &plan.clone().limit(3).offset(offset));
            if page.is_empty() {
                break;
            }
            paged.extend(page);
            offset += 3;
        }
        assert_eq!(paged, full);
    }
}

#[test]
fn test_shared_unsaved_related_source_is_saved_once() {
    let lib = library();
    let run = lib.import_run();

    let mut a = lib.new_source("http://x.org/a", &[]).unwrap();
    let mut b = lib.new_source("http://x.org/b", &[]).unwrap();
    let first = lib.new_source("http://x.org/shared", &[]).unwrap();
    let second = lib.new_source("http://x.org/shared", &[]).unwrap();

    a.predicate(&lib, "author").unwrap().append(&lib, first).unwrap();
    b.predicate(&lib, "editor").unwrap().append(&lib, second).unwrap();
    assert_eq!(run.library().unsaved_count(), 1);

    a.save(&lib).unwrap();
    b.save(&lib).unwrap();
    drop(run);

    let shared = FindOptions::new().where_eq("uri", "http://x.org/shared");
    assert_eq!(lib.count(&shared).unwrap(), 1);
    assert_eq!(lib.stats().unwrap().records.sources, 3);
    assert_eq!(lib.unsaved_count(), 0);

    let mut b = lib.find("http://x.org/b").unwrap();
    let editors = b.predicate(&lib, "editor").unwrap().values(&lib).unwrap();
    assert_eq!(editors, vec![PropertyValue::Resource("http://x.org/shared".parse().unwrap())]);
}

#[test]
fn test_type_filter_returns_typed_sources_only() {
    let lib = library();
    for n in 0..3 {
        create(&lib, &format!("http://x.org/book{}", n), &[BOOK]);
    }
    for n in 0..2 {
        create(&lib, &format!("http://x.org/plain{}", n), &[]);
    }
    assert_eq!(lib.find_all(&FindOptions::new().type_of(BOOK)).unwrap().len(), 3);
    assert_eq!(lib.count(&FindOptions::new().type_of(BOOK)).unwrap(), 3);
}

#[test]
fn test_failed_validation_leaves_dupes_removed() {
    let lib = library();
    let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
    source.set_column("workflow_state", 3).unwrap();
    source.save(&lib).unwrap();

    let dupe = TriplePattern::subject_predicate("http://x.org/a", lib.namespaces().db_field_predicate("workflow_state"));
    assert_eq!(lib.triples().matching(&dupe).unwrap().len(), 1);

    source.set_column("workflow_state", DbValue::Null).unwrap();
    let err = source.save(&lib).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(source.errors().on("workflow_state"), vec!["can't be blank"]);

    // step 1 is outside the relational transaction
    assert!(source.last_save().needs_repair());
    assert!(lib.triples().matching(&dupe).unwrap().is_empty());
    let stored = lib.find("http://x.org/a").unwrap();
    assert_eq!(stored.column("workflow_state"), Some(&DbValue::Integer(3)));

    source.set_column("workflow_state", 4).unwrap();
    source.save(&lib).unwrap();
    assert!(source.last_save().is_complete());
    assert_eq!(
        lib.triples().matching(&dupe).unwrap()[0].object,
        Term::literal("4")
    );
}

#[test]
fn test_triple_store_failure_rolls_back_and_retry_succeeds() {
    let (lib, inner, fail_writes) = flaky_library(None);
    let mut source = lib.new_source("http://x.org/a", &[BOOK]).unwrap();
    source.predicate(&lib, "dcns:title").unwrap().append(&lib, "Faust").unwrap();

    fail_writes.set(true);
    let err = source.save(&lib).unwrap_err();
    assert!(matches!(err, Error::TripleStore(_)));
    assert!(source.is_new_record());
    assert!(!lib.exists("http://x.org/a").unwrap());
    assert_eq!(lib.stats().unwrap().records.relations, 0);

    fail_writes.set(false);
    source.save(&lib).unwrap();
    assert!(lib.exists("http://x.org/a").unwrap());

    let mut found = lib.find("http://x.org/a").unwrap();
    assert_eq!(found.predicate(&lib, "dcns:title").unwrap().len(&lib).unwrap(), 1);
    let typed = inner
        .query(&[QueryPattern::new(
            semlib::term::PatternNode::var("s"),
            semlib::term::PatternNode::uri(semlib::uri::RDF_TYPE),
            semlib::term::PatternNode::uri(BOOK),
        )])
        .unwrap();
    assert_eq!(typed.len(), 1);
}

#[test]
fn test_retry_after_rollback_keeps_related_source_values() {
    let (lib, inner, fail_writes) = flaky_library(Some("http://purl.org/dc/elements/1.1/subject"));
    let _run = lib.import_run();

    let mut b = lib.new_source("http://x.org/b", &[]).unwrap();
    b.predicate(&lib, "dcns:title").unwrap().append(&lib, "B title").unwrap();
    let mut a = lib.new_source("http://x.org/a", &[]).unwrap();
    // "author" sorts before dcns:subject, so b is saved before the failing write
    a.predicate(&lib, "author").unwrap().append(&lib, b).unwrap();
    a.predicate(&lib, "dcns:subject").unwrap().append(&lib, "Drama").unwrap();

    fail_writes.set(true);
    assert!(matches!(a.save(&lib), Err(Error::TripleStore(_))));
    assert!(!lib.exists("http://x.org/a").unwrap());
    assert!(!lib.exists("http://x.org/b").unwrap());
    assert_eq!(lib.unsaved_count(), 1);
    let pending = lib.unsaved_source("http://x.org/b").unwrap();
    assert!(pending.borrow().is_new_record());
    assert_eq!(pending.borrow().id(), None);

    fail_writes.set(false);
    a.save(&lib).unwrap();
    assert_eq!(lib.unsaved_count(), 0);
    assert!(pending.borrow().last_save().is_complete());

    let mut b = lib.find("http://x.org/b").unwrap();
    assert_eq!(
        b.predicate(&lib, "dcns:title").unwrap().values(&lib).unwrap(),
        vec![PropertyValue::from("B title")]
    );
    let mut a = lib.find("http://x.org/a").unwrap();
    assert_eq!(
        a.predicate(&lib, "author").unwrap().values(&lib).unwrap(),
        vec![PropertyValue::Resource("http://x.org/b".parse().unwrap())]
    );
    let title = Triple::new("http://x.org/b", TITLE, Term::literal("B title"));
    assert!(inner.contains(&TriplePattern::exact(&title)).unwrap());
}

#[test]
fn test_removing_a_repeated_value_keeps_both_stores_in_sync() {
    let lib = library();
    let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
    source.predicate(&lib, "dcns:title").unwrap().append_all(&lib, ["a", "a"]).unwrap();
    source.save(&lib).unwrap();

    let mut loaded = lib.find("http://x.org/a").unwrap();
    assert!(loaded.predicate(&lib, "dcns:title").unwrap().remove(&lib, &"a".into()).unwrap());
    loaded.save(&lib).unwrap();

    let mut fresh = lib.find("http://x.org/a").unwrap();
    assert_eq!(
        fresh.predicate(&lib, "dcns:title").unwrap().values(&lib).unwrap(),
        vec![PropertyValue::from("a")]
    );
    let federated = FindOptions::new().where_eq("dcns:title", "a");
    let relational = FindOptions::new().find_through("dcns:title", "a");
    assert_eq!(lib.count(&federated).unwrap(), 1);
    assert_eq!(lib.count(&relational).unwrap(), 1);

    assert!(fresh.predicate(&lib, "dcns:title").unwrap().remove(&lib, &"a".into()).unwrap());
    fresh.save(&lib).unwrap();
    assert_eq!(lib.count(&federated).unwrap(), 0);
    assert_eq!(lib.count(&relational).unwrap(), 0);
}

#[test]
fn test_duplicate_identifier_is_raised_at_construction() {
    let lib = library();
    create(&lib, "http://x.org/a", &[]);
    assert!(matches!(
        lib.new_source("http://x.org/a", &[BOOK]),
        Err(Error::DuplicateIdentifier(uri)) if uri == "http://x.org/a"
    ));
    assert!(!lib.new_source("http://x.org/a", &[]).unwrap().is_new_record());
}

#[test]
fn test_custom_joins_with_find_through_fail_before_io() {
    let lib = library();
    let options = FindOptions::new()
        .joins("JOIN nowhere")
        .find_through("author", "http://x.org/goethe");
    assert!(matches!(lib.find_all(&options), Err(Error::InvalidQuery(_))));
    assert!(matches!(lib.count(&options), Err(Error::InvalidQuery(_))));
}

#[test]
fn test_direct_write_on_unsaved_source_fails() {
    let lib = library();
    let mut source = lib.new_source("http://x.org/a", &[]).unwrap();
    let err = source.write_predicate_direct(&lib, "dcns:title", "Faust").unwrap_err();
    assert!(matches!(err, Error::UnsavedSource(_)));
}

#[test]
fn test_not_found() {
    let lib = library();
    create(&lib, "http://x.org/a", &[]);
    assert!(matches!(lib.find("http://x.org/nope"), Err(Error::SourceNotFound(_))));
    assert!(matches!(
        lib.find_many(&["http://x.org/a", "http://x.org/nope"]),
        Err(Error::SourceNotFound(_))
    ));
    assert!(lib.find_all(&FindOptions::new().where_eq("name", "nope")).unwrap().is_empty());
}

#[test]
fn test_save_lenient_keeps_errors() {
    let lib = library();
    let mut source = lib.new_source("http://localnode.org/", &[]).unwrap();
    assert!(!source.save_lenient(&lib).unwrap());
    assert!(!source.errors().is_empty());
    assert!(!lib.exists("http://localnode.org/").unwrap());
}

#[test]
fn test_destroy_removes_both_sides() {
    let lib = library();
    let mut goethe = lib.new_source("http://x.org/goethe", &[]).unwrap();
    goethe.save(&lib).unwrap();
    let mut faust = lib.new_source("http://x.org/faust", &[BOOK]).unwrap();
    faust.predicate(&lib, "author").unwrap().append(&lib, "<http://x.org/goethe>").unwrap();
    faust.save(&lib).unwrap();

    goethe.destroy(&lib).unwrap();
    assert!(!lib.exists("http://x.org/goethe").unwrap());
    assert!(lib.triples().matching(&TriplePattern::pointing_to("http://x.org/goethe")).unwrap().is_empty());

    let mut faust = lib.find("http://x.org/faust").unwrap();
    assert!(faust.predicate(&lib, "author").unwrap().values(&lib).unwrap().is_empty());
    assert_eq!(faust.types(&lib).unwrap().len(), 1);
}

#[test]
fn test_file_backed_library_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let config = LibraryConfig::default();
    {
        let lib = Library::open(&config, dir.path()).unwrap();
        let mut source = lib.new_source("faust", &[BOOK]).unwrap();
        source.predicate(&lib, "dcns:title").unwrap().append(&lib, "Faust").unwrap();
        source.save(&lib).unwrap();
    }

    let lib = Library::open(&config, dir.path()).unwrap();
    assert_eq!(lib.triples().name(), "sqlite");
    let mut source = lib.find("faust").unwrap();
    assert_eq!(source.uri().as_str(), "http://localnode.org/faust");
    assert_eq!(
        source.predicate(&lib, "dcns:title").unwrap().first(&lib).unwrap(),
        Some(PropertyValue::from("Faust"))
    );
    let found = lib.find_all(&FindOptions::new().where_eq("dcns:title", "Faust")).unwrap();
    assert_eq!(found.len(), 1);

    let mut memory = config.clone();
    memory.triples = Some(MEMORY_TRIPLES.to_string());
    let lib = Library::open(&memory, dir.path()).unwrap();
    assert_eq!(lib.triples().name(), "memory");
}
