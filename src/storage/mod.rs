//! Storage Layer - SQLite-backed persistence
//!
//! The record store is the system of record for Source existence, with tables:
//! - active_sources(uri, name, workflow_state, primary_source)
//! - semantic_relations(subject_id, predicate_uri, object_type, object_id, rel_order)
//! - semantic_properties(value)
//!
//! `SqliteTripleStore` keeps RDF triples in a separate database (or the same
//! file) behind the `TripleStore` trait.

pub mod schema;
pub mod sqlite;
pub mod triples;

pub use sqlite::{DbStats, FatRelation, RelationObject, RelationTarget, SqliteStore};
pub use triples::SqliteTripleStore;
