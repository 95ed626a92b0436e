//! SQLite record store implementation

use std::path::Path;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use crate::Result;
use crate::record::{ColumnDescriptor, ColumnType, DbValue, SourceRecord};
use crate::term::Term;
use super::schema;

/// SQLite-backed record store for Sources and their semantic relations
pub struct SqliteStore {
    conn: Connection,
}

/// Target of a relation row being inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationTarget {
    Source(i64),
    Property(i64),
}

impl RelationTarget {
    fn parts(&self) -> (&'static str, i64) {
        match self {
            RelationTarget::Source(id) => ("source", *id),
            RelationTarget::Property(id) => ("property", *id),
        }
    }
}

/// Object of a loaded relation, already joined with its target row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationObject {
    Source { id: i64, uri: String },
    Property { id: i64, value: String },
}

/// A "fat" relation: one joined row carrying enough data to build the
/// related item without a further query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatRelation {
    pub id: i64,
    pub predicate: String,
    pub object: RelationObject,
    pub order: Option<i64>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Describe the content columns of the sources table
    /// (everything except the identity columns)
    pub fn content_columns(&self) -> Result<Vec<ColumnDescriptor>> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(active_sources)")?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(1)?;
            let declared: String = row.get(2)?;
            let not_null: bool = row.get(3)?;
            let default: Option<String> = row.get(4)?;
            Ok((name, declared, not_null, default))
        })?;

        let mut columns = Vec::new();
        for row in rows {
            let (name, declared, required, default) = row?;
            if schema::IDENTITY_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            let column_type = ColumnType::from_declared(&declared);
            columns.push(ColumnDescriptor {
                name,
                column_type,
                required,
                default: parse_default(column_type, default.as_deref()),
            });
        }
        Ok(columns)
    }

    // ========== Source Record Operations ==========

    /// Insert a new record, returning its id
    pub fn insert_source(&self, record: &SourceRecord) -> Result<i64> {
        let mut names = vec!["uri".to_string()];
        let mut values = vec![DbValue::Text(record.uri.clone())];
        for (name, value) in &record.columns {
            names.push(quote_ident(name));
            values.push(value.clone());
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO active_sources ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Write all columns of an existing record
    pub fn update_source(&self, id: i64, record: &SourceRecord) -> Result<()> {
        let mut assignments = vec!["uri = ?1".to_string()];
        let mut values = vec![DbValue::Text(record.uri.clone())];
        for (name, value) in &record.columns {
            values.push(value.clone());
            assignments.push(format!("{} = ?{}", quote_ident(name), values.len()));
        }
        values.push(DbValue::Integer(id));
        let sql = format!(
            "UPDATE active_sources SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len()
        );
        self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    /// Get a record by URI
    pub fn find_by_uri(&self, uri: &str) -> Result<Option<SourceRecord>> {
        let mut records = self.query_sources(
            "SELECT * FROM active_sources WHERE uri = ?1",
            &[DbValue::Text(uri.to_string())],
        )?;
        Ok(records.pop())
    }

    /// Get a record by id
    pub fn find_by_id(&self, id: i64) -> Result<Option<SourceRecord>> {
        let mut records = self.query_sources(
            "SELECT * FROM active_sources WHERE id = ?1",
            &[DbValue::Integer(id)],
        )?;
        Ok(records.pop())
    }

    /// Get the records for a list of URIs, in no particular order.
    /// Missing URIs are simply absent from the result.
    pub fn find_by_uris(&self, uris: &[String]) -> Result<Vec<SourceRecord>> {
        let list = serde_json::to_string(uris)?;
        self.query_sources(
            "SELECT * FROM active_sources WHERE uri IN (SELECT value FROM json_each(?1)) ORDER BY id",
            &[DbValue::Text(list)],
        )
    }

    /// Check if a record with this URI exists
    pub fn exists_uri(&self, uri: &str) -> Result<bool> {
        Ok(self.id_for_uri(uri)?.is_some())
    }

    /// Look up the id of the record with this URI
    pub fn id_for_uri(&self, uri: &str) -> Result<Option<i64>> {
        self.conn
            .query_row("SELECT id FROM active_sources WHERE uri = ?1", [uri], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    /// Delete a record (relations must be removed first)
    pub fn delete_source(&self, id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM active_sources WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Run a SELECT over `active_sources` and map every row to a record.
    /// The statement must select all columns of `active_sources`.
    pub fn query_sources(&self, sql: &str, values: &[DbValue]) -> Result<Vec<SourceRecord>> {
        let types: Vec<(String, ColumnType)> = self
            .content_columns()?
            .into_iter()
            .map(|c| (c.name, c.column_type))
            .collect();

        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();

        let records = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let mut record = SourceRecord {
                    id: None,
                    uri: String::new(),
                    columns: Default::default(),
                };
                for (idx, name) in names.iter().enumerate() {
                    match name.as_str() {
                        "id" => record.id = Some(row.get(idx)?),
                        "uri" => record.uri = row.get(idx)?,
                        other => {
                            if let Some((_, column_type)) = types.iter().find(|(n, _)| n == other) {
                                let value: DbValue = row.get(idx)?;
                                record.columns.insert(other.to_string(), value.typed(*column_type));
                            }
                        }
                    }
                }
                Ok(record)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Run a `SELECT COUNT(...)` statement
    pub fn count_query(&self, sql: &str, values: &[DbValue]) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Count all records
    pub fn count_sources(&self) -> Result<usize> {
        self.count_query("SELECT COUNT(*) FROM active_sources", &[])
    }

    // ========== Relation Operations ==========

    /// Insert a literal property row, returning its id
    pub fn insert_property(&self, value: &str) -> Result<i64> {
        self.conn
            .execute("INSERT INTO semantic_properties (value) VALUES (?1)", [value])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert a relation row, returning its id
    pub fn insert_relation(
        &self,
        subject_id: i64,
        predicate: &str,
        target: RelationTarget,
        order: Option<i64>,
    ) -> Result<i64> {
        let (object_type, object_id) = target.parts();
        self.conn.execute(
            r#"
            INSERT INTO semantic_relations (subject_id, predicate_uri, object_type, object_id, rel_order)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![subject_id, predicate, object_type, object_id, order],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Delete one relation (and its literal property, if any)
    pub fn delete_relation(&self, id: i64) -> Result<()> {
        self.conn.execute(
            r#"
            DELETE FROM semantic_properties WHERE id IN (
                SELECT object_id FROM semantic_relations WHERE id = ?1 AND object_type = 'property'
            )
            "#,
            [id],
        )?;
        self.conn.execute("DELETE FROM semantic_relations WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Delete all relations for a (subject, predicate) pair, returning how
    /// many rows went away
    pub fn delete_relations(&self, subject_id: i64, predicate: &str) -> Result<usize> {
        self.conn.execute(
            r#"
            DELETE FROM semantic_properties WHERE id IN (
                SELECT object_id FROM semantic_relations
                WHERE subject_id = ?1 AND predicate_uri = ?2 AND object_type = 'property'
            )
            "#,
            params![subject_id, predicate],
        )?;
        let removed = self.conn.execute(
            "DELETE FROM semantic_relations WHERE subject_id = ?1 AND predicate_uri = ?2",
            params![subject_id, predicate],
        )?;
        Ok(removed)
    }

    /// Delete every relation in which the source takes part, as subject or
    /// as object
    pub fn delete_relations_touching(&self, source_id: i64) -> Result<usize> {
        self.conn.execute(
            r#"
            DELETE FROM semantic_properties WHERE id IN (
                SELECT object_id FROM semantic_relations
                WHERE subject_id = ?1 AND object_type = 'property'
            )
            "#,
            [source_id],
        )?;
        let removed = self.conn.execute(
            r#"
            DELETE FROM semantic_relations
            WHERE subject_id = ?1 OR (object_type = 'source' AND object_id = ?1)
            "#,
            [source_id],
        )?;
        Ok(removed)
    }

    /// Load the relations of one (subject, predicate) pair, joined with
    /// their objects. Explicitly ordered relations come first.
    pub fn fat_relations(&self, subject_id: i64, predicate: &str) -> Result<Vec<FatRelation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT r.id, r.predicate_uri, r.object_type, r.object_id, r.rel_order, s.uri, p.value
            FROM semantic_relations r
            LEFT JOIN active_sources s ON r.object_type = 'source' AND s.id = r.object_id
            LEFT JOIN semantic_properties p ON r.object_type = 'property' AND p.id = r.object_id
            WHERE r.subject_id = ?1 AND r.predicate_uri = ?2
            ORDER BY r.rel_order IS NULL, r.rel_order, r.id
            "#,
        )?;

        let rows = stmt
            .query_map(params![subject_id, predicate], |row| {
                let id: i64 = row.get(0)?;
                let predicate: String = row.get(1)?;
                let object_type: String = row.get(2)?;
                let object_id: i64 = row.get(3)?;
                let order: Option<i64> = row.get(4)?;
                let uri: Option<String> = row.get(5)?;
                let value: Option<String> = row.get(6)?;
                let object = match (object_type.as_str(), uri, value) {
                    ("source", Some(uri), _) => Some(RelationObject::Source { id: object_id, uri }),
                    ("property", _, Some(value)) => Some(RelationObject::Property { id: object_id, value }),
                    _ => None,
                };
                Ok(object.map(|object| FatRelation { id, predicate, object, order }))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Dangling relations (target row gone) are skipped
        Ok(rows.into_iter().flatten().collect())
    }

    /// Count relations for a (subject, predicate) pair without loading them
    pub fn count_relations(&self, subject_id: i64, predicate: &str) -> Result<usize> {
        self.count_query(
            "SELECT COUNT(*) FROM semantic_relations WHERE subject_id = ?1 AND predicate_uri = ?2",
            &[DbValue::Integer(subject_id), DbValue::Text(predicate.to_string())],
        )
    }

    /// Whether any relation of the (subject, predicate) pair still points at
    /// the given object
    pub fn has_relation_to(&self, subject_id: i64, predicate: &str, object: &Term) -> Result<bool> {
        let found = self.conn.query_row(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM semantic_relations r
                LEFT JOIN active_sources s ON r.object_type = 'source' AND s.id = r.object_id
                LEFT JOIN semantic_properties p ON r.object_type = 'property' AND p.id = r.object_id
                WHERE r.subject_id = ?1 AND r.predicate_uri = ?2
                  AND CASE ?3 WHEN 'uri' THEN s.uri = ?4 ELSE p.value = ?4 END
            )
            "#,
            params![subject_id, predicate, object.kind_str(), object.value()],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Predicates used by relations of which the source is the subject
    pub fn direct_predicates(&self, subject_id: i64) -> Result<Vec<String>> {
        self.distinct_predicates(
            "SELECT DISTINCT predicate_uri FROM semantic_relations WHERE subject_id = ?1 ORDER BY predicate_uri",
            subject_id,
        )
    }

    /// Predicates used by relations of which the source is the object
    pub fn inverse_predicates(&self, object_id: i64) -> Result<Vec<String>> {
        self.distinct_predicates(
            r#"
            SELECT DISTINCT predicate_uri FROM semantic_relations
            WHERE object_type = 'source' AND object_id = ?1 ORDER BY predicate_uri
            "#,
            object_id,
        )
    }

    fn distinct_predicates(&self, sql: &str, id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let predicates = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(predicates)
    }

    /// The records that point at the given source through the predicate
    pub fn inverse_subjects(&self, object_id: i64, predicate: &str) -> Result<Vec<SourceRecord>> {
        self.query_sources(
            r#"
            SELECT DISTINCT active_sources.* FROM active_sources
            JOIN semantic_relations r ON r.subject_id = active_sources.id
            WHERE r.object_type = 'source' AND r.object_id = ?1 AND r.predicate_uri = ?2
            ORDER BY active_sources.id
            "#,
            &[DbValue::Integer(object_id), DbValue::Text(predicate.to_string())],
        )
    }

    // ========== Transactions ==========

    /// Begin a transaction
    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", [])?;
        Ok(())
    }

    /// Commit a transaction
    pub fn commit(&self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Rollback a transaction
    pub fn rollback(&self) -> Result<()> {
        self.conn.execute("ROLLBACK", [])?;
        Ok(())
    }

    /// Open a savepoint (usable inside a transaction)
    pub fn savepoint(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!("SAVEPOINT {}", name))?;
        Ok(())
    }

    /// Release a savepoint, keeping its changes
    pub fn release_savepoint(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!("RELEASE SAVEPOINT {}", name))?;
        Ok(())
    }

    /// Undo everything since the savepoint and release it
    pub fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}", name))?;
        Ok(())
    }

    /// True while an explicit transaction is open
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            sources: self.count_sources()?,
            relations: self.count_query("SELECT COUNT(*) FROM semantic_relations", &[])?,
            properties: self.count_query("SELECT COUNT(*) FROM semantic_properties", &[])?,
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn parse_default(column_type: ColumnType, default: Option<&str>) -> DbValue {
    let Some(raw) = default else {
        return DbValue::Null;
    };
    let raw = raw.trim().trim_matches('\'');
    if raw.eq_ignore_ascii_case("null") {
        return DbValue::Null;
    }
    match column_type {
        ColumnType::Integer => raw.parse().map(DbValue::Integer).unwrap_or(DbValue::Null),
        ColumnType::Real => raw.parse().map(DbValue::Real).unwrap_or(DbValue::Null),
        ColumnType::Boolean => DbValue::Boolean(matches!(raw, "1" | "true" | "TRUE")),
        ColumnType::Text => DbValue::Text(raw.to_string()),
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub sources: usize,
    pub relations: usize,
    pub properties: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Record Store Statistics:")?;
        writeln!(f, "  Sources: {}", self.sources)?;
        writeln!(f, "  Relations: {}", self.relations)?;
        writeln!(f, "  Properties: {}", self.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(store: &SqliteStore, uri: &str) -> SourceRecord {
        let columns = store.content_columns().unwrap();
        SourceRecord::new(uri, &columns)
    }

    #[test]
    fn test_content_columns() {
        let store = SqliteStore::open_in_memory().unwrap();
        let columns = store.content_columns().unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "workflow_state", "primary_source"]);

        let primary = &columns[2];
        assert_eq!(primary.column_type, ColumnType::Boolean);
        assert!(primary.required);
        assert_eq!(primary.default, DbValue::Boolean(false));
        assert_eq!(columns[1].default, DbValue::Integer(0));
        assert_eq!(columns[0].default, DbValue::Null);
    }

    #[test]
    fn test_source_crud() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut record = sample_record(&store, "http://www.test.org/valid");
        record.set("workflow_state", DbValue::Integer(3));
        let id = store.insert_source(&record).unwrap();

        let loaded = store.find_by_uri("http://www.test.org/valid").unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.get("workflow_state"), Some(&DbValue::Integer(3)));
        assert_eq!(loaded.get("primary_source"), Some(&DbValue::Boolean(false)));

        record.set("workflow_state", DbValue::Integer(15));
        store.update_source(id, &record).unwrap();
        let reloaded = store.find_by_id(id).unwrap().unwrap();
        assert_eq!(reloaded.get("workflow_state"), Some(&DbValue::Integer(15)));

        assert!(store.exists_uri("http://www.test.org/valid").unwrap());
        store.delete_source(id).unwrap();
        assert!(!store.exists_uri("http://www.test.org/valid").unwrap());
    }

    #[test]
    fn test_unique_uri() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = sample_record(&store, "http://x.org/a");
        store.insert_source(&record).unwrap();
        assert!(store.insert_source(&record).is_err());
    }

    #[test]
    fn test_find_by_uris() {
        let store = SqliteStore::open_in_memory().unwrap();
        for uri in ["http://x.org/a", "http://x.org/b", "http://x.org/c"] {
            store.insert_source(&sample_record(&store, uri)).unwrap();
        }
        let found = store
            .find_by_uris(&["http://x.org/c".to_string(), "http://x.org/a".to_string(), "http://x.org/z".to_string()])
            .unwrap();
        let uris: Vec<_> = found.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["http://x.org/a", "http://x.org/c"]);
    }

    #[test]
    fn test_relation_crud() {
        let store = SqliteStore::open_in_memory().unwrap();
        let subject = store.insert_source(&sample_record(&store, "http://x.org/book")).unwrap();
        let author = store.insert_source(&sample_record(&store, "http://x.org/author")).unwrap();

        let prop = store.insert_property("Moby Dick").unwrap();
        store.insert_relation(subject, "http://x.org/title", RelationTarget::Property(prop), None).unwrap();
        store.insert_relation(subject, "http://x.org/author", RelationTarget::Source(author), None).unwrap();

        let titles = store.fat_relations(subject, "http://x.org/title").unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].object, RelationObject::Property { id: prop, value: "Moby Dick".to_string() });

        let authors = store.fat_relations(subject, "http://x.org/author").unwrap();
        assert!(matches!(&authors[0].object, RelationObject::Source { uri, .. } if uri == "http://x.org/author"));

        assert_eq!(store.direct_predicates(subject).unwrap().len(), 2);
        assert_eq!(store.inverse_predicates(author).unwrap(), vec!["http://x.org/author"]);
        assert_eq!(store.inverse_subjects(author, "http://x.org/author").unwrap()[0].uri, "http://x.org/book");

        assert_eq!(store.delete_relations(subject, "http://x.org/title").unwrap(), 1);
        assert_eq!(store.count_relations(subject, "http://x.org/title").unwrap(), 0);
        assert_eq!(store.stats().unwrap().properties, 0);

        assert_eq!(store.delete_relations_touching(author).unwrap(), 1);
        assert_eq!(store.stats().unwrap().relations, 0);
    }

    #[test]
    fn test_has_relation_to() {
        let store = SqliteStore::open_in_memory().unwrap();
        let subject = store.insert_source(&sample_record(&store, "http://x.org/book")).unwrap();
        let author = store.insert_source(&sample_record(&store, "http://x.org/author")).unwrap();
        let first = store.insert_property("a").unwrap();
        let first = store.insert_relation(subject, "http://x.org/title", RelationTarget::Property(first), None).unwrap();
        let second = store.insert_property("a").unwrap();
        store.insert_relation(subject, "http://x.org/title", RelationTarget::Property(second), None).unwrap();
        store.insert_relation(subject, "http://x.org/author", RelationTarget::Source(author), None).unwrap();

        let title = Term::literal("a");
        store.delete_relation(first).unwrap();
        assert!(store.has_relation_to(subject, "http://x.org/title", &title).unwrap());
        assert!(!store.has_relation_to(subject, "http://x.org/title", &Term::uri("a")).unwrap());
        assert!(store.has_relation_to(subject, "http://x.org/author", &Term::uri("http://x.org/author")).unwrap());
        assert!(!store.has_relation_to(subject, "http://x.org/author", &Term::literal("http://x.org/author")).unwrap());

        store.delete_relations(subject, "http://x.org/title").unwrap();
        assert!(!store.has_relation_to(subject, "http://x.org/title", &title).unwrap());
    }

    #[test]
    fn test_relation_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let subject = store.insert_source(&sample_record(&store, "http://x.org/list")).unwrap();
        for (value, order) in [("c", None), ("b", Some(2)), ("a", Some(1))] {
            let prop = store.insert_property(value).unwrap();
            store.insert_relation(subject, "http://x.org/item", RelationTarget::Property(prop), order).unwrap();
        }
        let values: Vec<_> = store
            .fat_relations(subject, "http://x.org/item")
            .unwrap()
            .into_iter()
            .map(|r| match r.object {
                RelationObject::Property { value, .. } => value,
                RelationObject::Source { uri, .. } => uri,
            })
            .collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_transaction_rollback() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.begin_transaction().unwrap();
        assert!(store.in_transaction());
        store.insert_source(&sample_record(&store, "http://x.org/a")).unwrap();
        store.rollback().unwrap();
        assert!(!store.in_transaction());
        assert_eq!(store.count_sources().unwrap(), 0);
    }
}
