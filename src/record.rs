//! Relational side of a Source
//!
//! A `SourceRecord` is one row of the `active_sources` table: the URI plus the
//! content columns reported by the record store. Column values are kept as
//! loosely typed [`DbValue`]s and coerced through the column's declared type.

use crate::{Error, Result};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a content column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
}

impl ColumnType {
    /// Map a SQLite declared type (as reported by `PRAGMA table_info`)
    pub fn from_declared(declared: &str) -> Self {
        let declared = declared.to_uppercase();
        if declared.contains("BOOL") {
            ColumnType::Boolean
        } else if declared.contains("INT") {
            ColumnType::Integer
        } else if declared.contains("REAL") || declared.contains("FLOA") || declared.contains("DOUB") {
            ColumnType::Real
        } else {
            ColumnType::Text
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
        }
    }
}

/// Description of one content column of the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    /// `NOT NULL` constraint
    pub required: bool,
    /// Value used for freshly built records
    pub default: DbValue,
}

/// A relational column value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::Integer(i) => Some(*i),
            DbValue::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DbValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Lexical form used for dupe literals and condition matching.
    /// `None` for NULL.
    pub fn lexical(&self) -> Option<String> {
        match self {
            DbValue::Null => None,
            DbValue::Boolean(b) => Some(b.to_string()),
            DbValue::Integer(i) => Some(i.to_string()),
            DbValue::Real(r) => Some(r.to_string()),
            DbValue::Text(s) => Some(s.clone()),
        }
    }

    /// Coerce a JSON value into the given column type, the way a form value
    /// would be typecast before it reaches the database.
    pub fn from_json(column: &ColumnDescriptor, value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value;
        let invalid = || {
            Error::InvalidAttribute(format!(
                "cannot store {} in {} column '{}'",
                value, column.column_type.as_str(), column.name
            ))
        };
        let coerced = match (column.column_type, value) {
            (_, Value::Null) => DbValue::Null,
            (ColumnType::Integer, Value::Number(n)) => DbValue::Integer(n.as_i64().ok_or_else(invalid)?),
            (ColumnType::Integer, Value::String(s)) => {
                DbValue::Integer(s.trim().parse().map_err(|_| invalid())?)
            }
            (ColumnType::Integer, Value::Bool(b)) => DbValue::Integer(*b as i64),
            (ColumnType::Real, Value::Number(n)) => DbValue::Real(n.as_f64().ok_or_else(invalid)?),
            (ColumnType::Real, Value::String(s)) => DbValue::Real(s.trim().parse().map_err(|_| invalid())?),
            (ColumnType::Boolean, Value::Bool(b)) => DbValue::Boolean(*b),
            (ColumnType::Boolean, Value::Number(n)) => DbValue::Boolean(n.as_i64() != Some(0)),
            (ColumnType::Boolean, Value::String(s)) => match s.trim() {
                "true" | "1" | "yes" => DbValue::Boolean(true),
                "false" | "0" | "no" => DbValue::Boolean(false),
                _ => return Err(invalid()),
            },
            (ColumnType::Text, Value::String(s)) => DbValue::Text(s.clone()),
            (ColumnType::Text, Value::Number(n)) => DbValue::Text(n.to_string()),
            (ColumnType::Text, Value::Bool(b)) => DbValue::Text(b.to_string()),
            _ => return Err(invalid()),
        };
        Ok(coerced)
    }

    /// Normalize a value read back from SQLite through the declared type
    pub fn typed(self, column_type: ColumnType) -> Self {
        match (column_type, self) {
            (ColumnType::Boolean, DbValue::Integer(i)) => DbValue::Boolean(i != 0),
            (ColumnType::Real, DbValue::Integer(i)) => DbValue::Real(i as f64),
            (_, other) => other,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DbValue::Null => serde_json::Value::Null,
            DbValue::Boolean(b) => serde_json::Value::Bool(*b),
            DbValue::Integer(i) => serde_json::Value::from(*i),
            DbValue::Real(r) => serde_json::Value::from(*r),
            DbValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lexical() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "NULL"),
        }
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Integer(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Integer(v.into())
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Boolean(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl ToSql for DbValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            DbValue::Null => ToSqlOutput::from(rusqlite::types::Null),
            DbValue::Boolean(b) => ToSqlOutput::from(*b),
            DbValue::Integer(i) => ToSqlOutput::from(*i),
            DbValue::Real(r) => ToSqlOutput::from(*r),
            DbValue::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for DbValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => DbValue::Null,
            ValueRef::Integer(i) => DbValue::Integer(i),
            ValueRef::Real(r) => DbValue::Real(r),
            ValueRef::Text(t) => DbValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => DbValue::Text(String::from_utf8_lossy(b).into_owned()),
        })
    }
}

/// One row of the `active_sources` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Database id, `None` until first inserted
    pub id: Option<i64>,
    pub uri: String,
    pub columns: BTreeMap<String, DbValue>,
}

impl SourceRecord {
    /// Build an unsaved record with the column defaults
    pub fn new(uri: impl Into<String>, columns: &[ColumnDescriptor]) -> Self {
        Self {
            id: None,
            uri: uri.into(),
            columns: columns
                .iter()
                .map(|c| (c.name.clone(), c.default.clone()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&DbValue> {
        self.columns.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: DbValue) {
        self.columns.insert(column.into(), value);
    }
}

/// A single field-level validation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Collected validation messages for one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn on(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| format!("{} {}", e.field, e.message))
            .collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_messages().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn column(name: &str, column_type: ColumnType) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            column_type,
            required: false,
            default: DbValue::Null,
        }
    }

    #[test]
    fn test_declared_types() {
        assert_eq!(ColumnType::from_declared("INTEGER"), ColumnType::Integer);
        assert_eq!(ColumnType::from_declared("BOOLEAN"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_declared("varchar(255)"), ColumnType::Text);
        assert_eq!(ColumnType::from_declared("double"), ColumnType::Real);
    }

    #[test]
    fn test_json_coercion() {
        let state = column("workflow_state", ColumnType::Integer);
        assert_eq!(DbValue::from_json(&state, &json!(3)).unwrap(), DbValue::Integer(3));
        assert_eq!(DbValue::from_json(&state, &json!("15")).unwrap(), DbValue::Integer(15));
        assert!(DbValue::from_json(&state, &json!("many")).is_err());

        let primary = column("primary_source", ColumnType::Boolean);
        assert_eq!(DbValue::from_json(&primary, &json!(false)).unwrap(), DbValue::Boolean(false));
        assert_eq!(DbValue::from_json(&primary, &json!("true")).unwrap(), DbValue::Boolean(true));
        assert_eq!(DbValue::from_json(&primary, &json!(null)).unwrap(), DbValue::Null);

        let name = column("name", ColumnType::Text);
        assert!(DbValue::from_json(&name, &json!(["a"])).is_err());
    }

    #[test]
    fn test_lexical_forms() {
        assert_eq!(DbValue::Integer(3).lexical().as_deref(), Some("3"));
        assert_eq!(DbValue::Boolean(false).lexical().as_deref(), Some("false"));
        assert_eq!(DbValue::Null.lexical(), None);
        assert_eq!(DbValue::Integer(1).typed(ColumnType::Boolean), DbValue::Boolean(true));
    }

    #[test]
    fn test_validation_errors() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());
        errors.add("uri", "has already been taken");
        errors.add("primary_source", "can't be blank");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.on("uri"), vec!["has already been taken"]);
        assert_eq!(errors.to_string(), "uri has already been taken, primary_source can't be blank");
    }
}
