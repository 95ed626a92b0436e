//! Attribute Classifier
//!
//! Decides, once per attribute name, whether a name addresses a relational
//! column or an RDF predicate, and splits mixed attribute maps accordingly.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::record::{ColumnDescriptor, ColumnType, DbValue};
use crate::uri::{Namespaces, is_uri};

/// Where an attribute name routes to
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// A relational column of the record store
    Column(ColumnDescriptor),
    /// A predicate given as a registered `prefix:name` shortcut or a full URI
    Registered(String),
    /// A bare name, placed in the default namespace
    Unregistered(String),
}

impl Attribute {
    pub fn is_column(&self) -> bool {
        matches!(self, Attribute::Column(_))
    }

    /// The predicate URI, if this attribute is not a column
    pub fn predicate(&self) -> Option<&str> {
        match self {
            Attribute::Column(_) => None,
            Attribute::Registered(uri) | Attribute::Unregistered(uri) => Some(uri),
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Attribute::Column(_) => "column",
            Attribute::Registered(_) => "registered",
            Attribute::Unregistered(_) => "unregistered",
        }
    }
}

/// An attribute map split into its relational and predicate halves
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitAttributes {
    pub columns: Vec<(ColumnDescriptor, Value)>,
    /// (predicate URI, values) in input order
    pub predicates: Vec<(String, Vec<Value>)>,
}

/// Lookup table from attribute name to column or predicate.
///
/// Built from the record store's content columns plus `uri`.
#[derive(Debug, Clone)]
pub struct AttributeClassifier {
    columns: BTreeMap<String, ColumnDescriptor>,
    namespaces: Namespaces,
}

impl AttributeClassifier {
    pub fn new(content_columns: Vec<ColumnDescriptor>, namespaces: Namespaces) -> Self {
        let mut columns: BTreeMap<String, ColumnDescriptor> = content_columns
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        columns.insert(
            "uri".to_string(),
            ColumnDescriptor {
                name: "uri".to_string(),
                column_type: ColumnType::Text,
                required: true,
                default: DbValue::Null,
            },
        );
        Self { columns, namespaces }
    }

    pub fn classify(&self, name: &str) -> Attribute {
        if let Some(column) = self.columns.get(name) {
            return Attribute::Column(column.clone());
        }
        if let Some(expanded) = self.namespaces.expand(name) {
            return Attribute::Registered(expanded);
        }
        if is_uri(name) {
            return Attribute::Registered(name.to_string());
        }
        Attribute::Unregistered(format!("{}{}", self.namespaces.default_namespace(), name))
    }

    pub fn is_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.get(name)
    }

    /// All known columns, `uri` included
    pub fn columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.values()
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Split a mixed attribute map. Arrays become ordered multi-value lists,
    /// `null` on a predicate becomes an empty list.
    pub fn split<'a, I>(&self, attributes: I) -> SplitAttributes
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut split = SplitAttributes::default();
        for (name, value) in attributes {
            match self.classify(name) {
                Attribute::Column(column) => split.columns.push((column, value.clone())),
                Attribute::Registered(predicate) | Attribute::Unregistered(predicate) => {
                    let values = match value {
                        Value::Array(items) => items.clone(),
                        Value::Null => Vec::new(),
                        other => vec![other.clone()],
                    };
                    split.predicates.push((predicate, values));
                }
            }
        }
        split
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classifier() -> AttributeClassifier {
        let columns = vec![
            ColumnDescriptor {
                name: "workflow_state".to_string(),
                column_type: ColumnType::Integer,
                required: true,
                default: DbValue::Integer(0),
            },
            ColumnDescriptor {
                name: "name".to_string(),
                column_type: ColumnType::Text,
                required: false,
                default: DbValue::Null,
            },
        ];
        AttributeClassifier::new(columns, Namespaces::default())
    }

    #[test]
    fn test_classify_column() {
        let c = classifier();
        assert!(c.classify("workflow_state").is_column());
        assert!(c.classify("uri").is_column());
        assert!(c.is_column("name"));
    }

    #[test]
    fn test_classify_predicates() {
        let c = classifier();
        assert_eq!(
            c.classify("dcns:title"),
            Attribute::Registered("http://purl.org/dc/elements/1.1/title".to_string())
        );
        assert_eq!(
            c.classify("http://x.org/pred"),
            Attribute::Registered("http://x.org/pred".to_string())
        );
        assert_eq!(
            c.classify("author"),
            Attribute::Unregistered("http://default.semlib.org/author".to_string())
        );
    }

    #[test]
    fn test_split_preserves_order() {
        let c = classifier();
        let attributes = json!({
            "workflow_state": 3,
            "dcns:creator": ["Melville", "Hawthorne"],
            "title": "Moby Dick",
        });
        let map = attributes.as_object().unwrap();
        let split = c.split(map);

        assert_eq!(split.columns.len(), 1);
        assert_eq!(split.columns[0].0.name, "workflow_state");

        let creator = split
            .predicates
            .iter()
            .find(|(p, _)| p == "http://purl.org/dc/elements/1.1/creator")
            .unwrap();
        assert_eq!(creator.1, vec![json!("Melville"), json!("Hawthorne")]);
        assert!(split.predicates.iter().any(|(p, v)| p == "http://default.semlib.org/title" && v.len() == 1));
    }

    #[test]
    fn test_classify_is_pure() {
        let c = classifier();
        assert_eq!(c.classify("author"), c.classify("author"));
    }
}
