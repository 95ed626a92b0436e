//! SQLite-backed triple store
//!
//! Quads live in a single `triples` table. The connection sits behind a
//! mutex so the store satisfies the `&self` contract of `TripleStore`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params_from_iter, types::Value};

use crate::term::{Term, Triple, TriplePattern};
use crate::triple_store::TripleStore;
use crate::{Error, Result};
use super::schema;

/// Persistent triple store
pub struct SqliteTripleStore {
    conn: Mutex<Connection>,
}

impl SqliteTripleStore {
    /// Open a triple database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory triple database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        for stmt in schema::triple_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::TripleStore("triple database lock poisoned".to_string()))
    }
}

/// Build the WHERE clause for a pattern (plus an optional context)
fn where_clause(pattern: &TriplePattern, context: Option<&str>) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    let mut push = |column: &str, value: String| {
        values.push(Value::Text(value));
        conditions.push(format!("{} = ?{}", column, values.len()));
    };

    if let Some(subject) = &pattern.subject {
        push("subject", subject.clone());
    }
    if let Some(predicate) = &pattern.predicate {
        push("predicate", predicate.clone());
    }
    if let Some(object) = &pattern.object {
        push("object", object.value().to_string());
        push("object_kind", object.kind_str().to_string());
    }
    if let Some(context) = context {
        push("context", context.to_string());
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

impl TripleStore for SqliteTripleStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn add(&self, triple: &Triple, context: Option<&str>) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT OR IGNORE INTO triples (subject, predicate, object, object_kind, context)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            rusqlite::params![
                triple.subject,
                triple.predicate,
                triple.object.value(),
                triple.object.kind_str(),
                context.unwrap_or_default(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, pattern: &TriplePattern, context: Option<&str>) -> Result<usize> {
        let (clause, values) = where_clause(pattern, context);
        let sql = format!("DELETE FROM triples{}", clause);
        let removed = self.conn()?.execute(&sql, params_from_iter(values))?;
        Ok(removed)
    }

    fn matching(&self, pattern: &TriplePattern) -> Result<Vec<Triple>> {
        let (clause, values) = where_clause(pattern, None);
        let sql = format!(
            "SELECT DISTINCT subject, predicate, object, object_kind FROM triples{} ORDER BY subject, predicate, object_kind DESC, object",
            clause
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let triples = stmt
            .query_map(params_from_iter(values), |row| {
                let kind: String = row.get(3)?;
                Ok(Triple::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    Term::from_parts(&kind, row.get(2)?),
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(triples)
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM triples", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn supports_contexts(&self) -> bool {
        true
    }
}
