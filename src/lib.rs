//! # semlib - Semantic digital-library data layer
//!
//! A Source is both a relational record and an RDF subject. semlib keeps the
//! two views in sync.
//!
//! semlib provides:
//! - A validated URI identity for every Source
//! - A SQLite-backed record store (sources, semantic relations, literal properties)
//! - A pluggable triple store (in-memory or SQLite) with pattern queries
//! - Lazy predicate collections with deferred appends and immediate clears
//! - A save protocol that mirrors relational columns into the triple store
//! - A query translator for hybrid relational / RDF find requests

pub mod uri;
pub mod term;
pub mod record;
pub mod classifier;
pub mod collection;
pub mod source;
pub mod library;
pub mod storage;
pub mod triple_store;
pub mod query;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use uri::{Namespaces, SourceUri};
pub use term::{Term, Triple, TriplePattern};
pub use record::{ColumnDescriptor, ColumnType, DbValue, SourceRecord, ValidationErrors};
pub use classifier::{Attribute, AttributeClassifier};
pub use collection::{ObjectValue, PredicateCollection, PropertyValue, UnsavedSourceCache};
pub use source::{AttributeRef, SaveProgress, Source, SourceState};
pub use library::Library;
pub use query::{FindOptions, QueryPlan, QuerySpec};
pub use storage::{SqliteStore, SqliteTripleStore};
pub use triple_store::{MemoryTripleStore, TripleStore};

/// Result type alias for semlib operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for semlib operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Triple store error: {0}")]
    TripleStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Source already exists, cannot create with new type information: {0}")]
    DuplicateIdentifier(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Cannot write predicates on unsaved source {0}")]
    UnsavedSource(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}
