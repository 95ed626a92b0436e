//! Database schema definitions

/// SQL to create the sources table.
///
/// Every column except `id` and `uri` is a content column: it is reported by
/// `SqliteStore::content_columns` and mirrored into the triple store on save.
pub const CREATE_SOURCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS active_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uri TEXT NOT NULL UNIQUE,
    name TEXT,
    workflow_state INTEGER NOT NULL DEFAULT 0,
    primary_source BOOLEAN NOT NULL DEFAULT 0
)
"#;

/// SQL to create the semantic relations table.
/// One row per RDF statement whose subject is a Source. The object is
/// polymorphic: another Source or a literal property row.
pub const CREATE_RELATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS semantic_relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id INTEGER NOT NULL REFERENCES active_sources(id),
    predicate_uri TEXT NOT NULL,
    object_type TEXT NOT NULL CHECK (object_type IN ('source', 'property')),
    object_id INTEGER NOT NULL,
    rel_order INTEGER
)
"#;

/// SQL to create the literal properties table
pub const CREATE_PROPERTIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS semantic_properties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    value TEXT NOT NULL
)
"#;

/// SQL to create the triples table used by `SqliteTripleStore`
pub const CREATE_TRIPLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS triples (
    subject TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object TEXT NOT NULL,
    object_kind TEXT NOT NULL,
    context TEXT NOT NULL DEFAULT '',
    UNIQUE(subject, predicate, object, object_kind, context)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_relations_predicate ON semantic_relations(predicate_uri)",
    "CREATE INDEX IF NOT EXISTS idx_relations_subject ON semantic_relations(subject_id)",
    "CREATE INDEX IF NOT EXISTS idx_relations_object ON semantic_relations(object_type, object_id)",
];

pub const CREATE_TRIPLE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_triples_predicate_object ON triples(predicate, object)",
    "CREATE INDEX IF NOT EXISTS idx_triples_object ON triples(object)",
];

/// Columns of `active_sources` that are not content columns
pub const IDENTITY_COLUMNS: &[&str] = &["id", "uri"];

/// All record-store schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_SOURCES_TABLE,
        CREATE_RELATIONS_TABLE,
        CREATE_PROPERTIES_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// All triple-store schema creation statements
pub fn triple_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_TRIPLES_TABLE];
    stmts.extend(CREATE_TRIPLE_INDEXES.iter().copied());
    stmts
}
